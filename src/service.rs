//! Service layer API for the leave request lifecycle
use super::access::{Actor, Capability};
use super::directory::{User, UserDirectory};
use super::error::{LeaveError, LeaveResult};
use super::leave::{LeaveDraft, LeaveRequest, LeaveStatus, TimeStamp};
use super::store::LeaveStore;
use super::utils;
use super::validation;
use std::sync::Arc;

pub struct LeaveService {
    store: LeaveStore,
    directory: Arc<UserDirectory>,
}

impl LeaveService {
    pub fn new(store: LeaveStore, directory: Arc<UserDirectory>) -> Self {
        Self { store, directory }
    }

    pub fn store(&self) -> &LeaveStore {
        &self.store
    }

    /// The actor must still exist and be active
    fn resolve(&self, actor: &Actor) -> LeaveResult<User> {
        match self.directory.find_by_id(&actor.id)? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(LeaveError::Forbidden(format!(
                "account {} is deactivated",
                actor.id
            ))),
            None => Err(LeaveError::Forbidden(format!(
                "unknown account {}",
                actor.id
            ))),
        }
    }

    fn require(actor: &Actor, capability: Capability, action: &str) -> LeaveResult<()> {
        if !actor.can(capability) {
            tracing::warn!(actor = %actor.id, role = %actor.role, action, "capability missing");
            return Err(LeaveError::Forbidden(format!(
                "role {} may not {action}",
                actor.role
            )));
        }
        Ok(())
    }

    /// Submit a new leave request on behalf of the acting student
    pub fn submit(&self, actor: &Actor, draft: &LeaveDraft) -> LeaveResult<LeaveRequest> {
        self.submit_inner(actor, draft)
            .inspect_err(|e| e.log("submit"))
    }

    fn submit_inner(&self, actor: &Actor, draft: &LeaveDraft) -> LeaveResult<LeaveRequest> {
        Self::require(actor, Capability::SubmitLeave, "submit leave requests")?;
        self.resolve(actor)?;

        // Validate against the student's other requests. The create only lands
        // if none were added since `seen`, otherwise validate again.
        loop {
            let seen = self.store.student_version(&actor.id)?;
            let now = TimeStamp::new();
            let existing = self.store.find_by_student(&actor.id)?;
            let valid = validation::validate_draft(draft, &existing, &now)?;

            let leave = valid.into_request(utils::new_leave_id()?, actor.id.clone(), now);
            if !self.store.create(&leave, seen)? {
                tracing::debug!(student = %actor.id, "requests changed during submit, revalidating");
                continue;
            }

            tracing::info!(
                leave_id = %leave.id,
                student = %leave.student,
                leave_type = %leave.leave_type,
                days = leave.duration_days(),
                urgent = leave.is_urgent,
                "leave request submitted"
            );
            return Ok(leave);
        }
    }

    /// Approve a pending request. Remarks default to empty.
    pub fn approve(
        &self,
        actor: &Actor,
        leave_id: &str,
        remarks: Option<&str>,
    ) -> LeaveResult<LeaveRequest> {
        let remarks = remarks.unwrap_or_default();
        self.decide(actor, leave_id, LeaveStatus::Approved, remarks)
            .inspect_err(|e| e.log("approve"))
    }

    /// Reject a pending request. Remarks are mandatory.
    pub fn reject(&self, actor: &Actor, leave_id: &str, remarks: &str) -> LeaveResult<LeaveRequest> {
        self.decide(actor, leave_id, LeaveStatus::Rejected, remarks)
            .inspect_err(|e| e.log("reject"))
    }

    fn decide(
        &self,
        actor: &Actor,
        leave_id: &str,
        status: LeaveStatus,
        remarks: &str,
    ) -> LeaveResult<LeaveRequest> {
        Self::require(actor, Capability::ApproveLeave, "decide leave requests")?;
        self.resolve(actor)?;
        validation::validate_remarks(remarks, status == LeaveStatus::Rejected)?;

        let current = self.store.get(leave_id)?;
        if current.status != LeaveStatus::Pending {
            return Err(LeaveError::InvalidTransition(format!(
                "leave request {leave_id} is already {}",
                current.status
            )));
        }

        // Conditional write: only lands if the stored document is still the pending one read above
        let decided = current.decided(status, &actor.id, remarks.to_string(), TimeStamp::new());
        self.store.update_status(&current, &decided)?;

        tracing::info!(
            leave_id = %leave_id,
            actor = %actor.id,
            role = %actor.role,
            status = %status,
            "leave request decided"
        );
        Ok(decided)
    }

    /// Withdraw a pending request. Only the owning student may cancel.
    pub fn cancel(&self, actor: &Actor, leave_id: &str) -> LeaveResult<()> {
        self.cancel_inner(actor, leave_id)
            .inspect_err(|e| e.log("cancel"))
    }

    fn cancel_inner(&self, actor: &Actor, leave_id: &str) -> LeaveResult<()> {
        self.resolve(actor)?;
        let current = self.store.get(leave_id)?;

        if !current.is_owned_by(&actor.id) {
            return Err(LeaveError::Forbidden(
                "only the owning student can cancel a leave request".into(),
            ));
        }
        if current.status != LeaveStatus::Pending {
            return Err(LeaveError::InvalidTransition(format!(
                "leave request {leave_id} is {} and can no longer be cancelled",
                current.status
            )));
        }

        self.store.delete(&current)?;
        tracing::info!(leave_id = %leave_id, student = %actor.id, "leave request cancelled");
        Ok(())
    }

    /// Fetch one request. Visible to its owner and to staff who can review it.
    pub fn view(&self, actor: &Actor, leave_id: &str) -> LeaveResult<LeaveRequest> {
        self.view_inner(actor, leave_id)
            .inspect_err(|e| e.log("view"))
    }

    fn view_inner(&self, actor: &Actor, leave_id: &str) -> LeaveResult<LeaveRequest> {
        self.resolve(actor)?;
        let leave = self.store.get(leave_id)?;
        if leave.is_owned_by(&actor.id) || actor.can(Capability::ViewAllLeave) || actor.is_admin() {
            return Ok(leave);
        }
        Err(LeaveError::Forbidden(format!(
            "leave request {leave_id} belongs to another student"
        )))
    }

    /// The acting student's own requests, newest first
    pub fn list_own(&self, actor: &Actor) -> LeaveResult<Vec<LeaveRequest>> {
        self.resolve(actor)
            .and_then(|_| {
                Self::require(actor, Capability::SubmitLeave, "list own leave requests")?;
                self.store.find_by_student(&actor.id)
            })
            .inspect_err(|e| e.log("list_own"))
    }

    /// Requests awaiting a decision, earliest start first
    pub fn list_pending(&self, actor: &Actor) -> LeaveResult<Vec<LeaveRequest>> {
        self.resolve(actor)
            .and_then(|_| {
                Self::require(actor, Capability::ApproveLeave, "list pending requests")?;
                self.store.find_pending()
            })
            .inspect_err(|e| e.log("list_pending"))
    }

    /// One student's history, for that student or for reviewing staff
    pub fn list_for_student(&self, actor: &Actor, student_id: &str) -> LeaveResult<Vec<LeaveRequest>> {
        self.resolve(actor)
            .and_then(|_| {
                if actor.id != student_id {
                    Self::require(actor, Capability::ViewAllLeave, "view other students' requests")?;
                }
                self.store.find_by_student(student_id)
            })
            .inspect_err(|e| e.log("list_for_student"))
    }
}
