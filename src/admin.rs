//! Administrative operations over users and statistics
use super::access::{Actor, Capability, Role};
use super::directory::{StudentProfile, User, UserDirectory, UserFilter};
use super::error::{LeaveError, LeaveResult};
use super::reports::{self, LeaveStatistics};
use super::store::LeaveStore;
use std::sync::Arc;

pub struct AdminService {
    directory: Arc<UserDirectory>,
    store: LeaveStore,
}

impl AdminService {
    pub fn new(directory: Arc<UserDirectory>, store: LeaveStore) -> Self {
        Self { directory, store }
    }

    fn authorize(&self, actor: &Actor, capability: Capability) -> LeaveResult<()> {
        if !actor.can(capability) {
            return Err(LeaveError::Forbidden(format!(
                "role {} may not {capability}",
                actor.role
            )));
        }
        match self.directory.find_by_id(&actor.id)? {
            Some(user) if user.is_active => Ok(()),
            _ => Err(LeaveError::Forbidden(format!(
                "account {} is not an active user",
                actor.id
            ))),
        }
    }

    fn forbid_self(actor: &Actor, target: &str, action: &str) -> LeaveResult<()> {
        if actor.id == target {
            tracing::warn!(actor = %actor.id, action, "self-administration refused");
            return Err(LeaveError::Forbidden(format!("cannot {action} your own account")));
        }
        Ok(())
    }

    pub fn list_users(&self, actor: &Actor, filter: &UserFilter) -> LeaveResult<Vec<User>> {
        self.authorize(actor, Capability::ManageUsers)
            .and_then(|_| self.directory.list(filter))
            .inspect_err(|e| e.log("list_users"))
    }

    /// Change another user's role. Moving a user to `student` needs their
    /// student profile unless they already have one.
    pub fn change_role(
        &self,
        actor: &Actor,
        target: &str,
        role: Role,
        student: Option<StudentProfile>,
    ) -> LeaveResult<User> {
        self.authorize(actor, Capability::ManageUsers)
            .and_then(|_| Self::forbid_self(actor, target, "change the role of"))
            .and_then(|_| self.directory.update_role(target, role, student))
            .inspect_err(|e| e.log("change_role"))
    }

    /// Activate or deactivate another user
    pub fn set_active(&self, actor: &Actor, target: &str, active: bool) -> LeaveResult<User> {
        self.authorize(actor, Capability::ManageUsers)
            .and_then(|_| Self::forbid_self(actor, target, "change the active status of"))
            .and_then(|_| self.directory.update_active_status(target, active))
            .inspect_err(|e| e.log("set_active"))
    }

    pub fn statistics(&self, actor: &Actor) -> LeaveResult<LeaveStatistics> {
        self.authorize(actor, Capability::ViewStatistics)
            .and_then(|_| reports::collect(&self.store, &self.directory))
            .inspect_err(|e| e.log("statistics"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ProfileAttrs;

    fn setup() -> (AdminService, Actor, Actor) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let directory = Arc::new(UserDirectory::open(&db, "college.edu").unwrap());
        let admin = directory
            .create("admin@college.edu", ProfileAttrs::new("Admin", Role::Admin))
            .unwrap();
        let caretaker = directory
            .create("care@college.edu", ProfileAttrs::new("Caretaker", Role::Caretaker))
            .unwrap();
        let service = AdminService::new(directory, LeaveStore::open(&db).unwrap());
        (
            service,
            Actor::new(admin.id, admin.role),
            Actor::new(caretaker.id, caretaker.role),
        )
    }

    #[test]
    fn admin_cannot_change_own_role_or_deactivate_self() {
        let (service, admin, _) = setup();
        let err = service
            .change_role(&admin, &admin.id, Role::Warden, None)
            .unwrap_err();
        assert!(matches!(err, LeaveError::Forbidden(_)));

        let err = service.set_active(&admin, &admin.id, false).unwrap_err();
        assert!(matches!(err, LeaveError::Forbidden(_)));
    }

    #[test]
    fn admin_manages_other_users() {
        let (service, admin, caretaker) = setup();
        let promoted = service
            .change_role(&admin, &caretaker.id, Role::Warden, None)
            .unwrap();
        assert_eq!(promoted.role, Role::Warden);

        let disabled = service.set_active(&admin, &caretaker.id, false).unwrap();
        assert!(!disabled.is_active);
        assert_eq!(service.list_users(&admin, &UserFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn non_admins_are_refused() {
        let (service, admin, caretaker) = setup();
        assert!(matches!(
            service.list_users(&caretaker, &UserFilter::default()),
            Err(LeaveError::Forbidden(_))
        ));
        assert!(matches!(
            service.set_active(&caretaker, &admin.id, false),
            Err(LeaveError::Forbidden(_))
        ));
        match service.statistics(&caretaker) {
            Err(LeaveError::Forbidden(message)) => assert!(message.contains("view statistics")),
            other => panic!("expected forbidden, got {other:?}"),
        }
        match service.list_users(&caretaker, &UserFilter::default()) {
            Err(LeaveError::Forbidden(message)) => assert!(message.contains("manage users")),
            other => panic!("expected forbidden, got {other:?}"),
        }
        assert_eq!(service.statistics(&admin).unwrap().total, 0);
    }
}
