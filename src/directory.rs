//! Identity directory: user records keyed by id with a unique email index
use super::access::{Capability, Role};
use super::error::{LeaveError, LeaveResult, ValidationError, Violations};
use super::leave::TimeStamp;
use super::store::to_cbor;
use super::utils;
use super::validation;
use chrono::Utc;
use sled::transaction::abort;
use sled::{Db, Transactional, Tree};

const USERS_TREE: &str = "users";
const EMAIL_INDEX_TREE: &str = "users_by_email";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    #[n(0)]
    pub student_id: String,
    #[n(1)]
    pub year: u8,
}

impl StudentProfile {
    pub fn new(student_id: &str, year: u8) -> Self {
        Self {
            student_id: student_id.to_string(),
            year,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub display_name: String,
    #[n(2)]
    pub email: String, // lower-cased
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub student: Option<StudentProfile>, // present iff role is student
    #[n(5)]
    pub department: Option<String>,
    #[n(6)]
    pub hostel: Option<String>,
    #[n(7)]
    pub room: Option<String>,
    #[n(8)]
    pub phone: Option<String>,
    #[n(9)]
    pub external_id: Option<String>,
    #[n(10)]
    pub avatar_url: Option<String>,
    #[n(11)]
    pub is_active: bool,
    #[n(12)]
    pub last_login: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub created_at: TimeStamp<Utc>,
}

/// Attributes supplied when a user record is first created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileAttrs {
    pub display_name: String,
    pub role: Role,
    pub student: Option<StudentProfile>,
    pub department: Option<String>,
    pub hostel: Option<String>,
    pub room: Option<String>,
    pub phone: Option<String>,
    pub external_id: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileAttrs {
    pub fn new(display_name: &str, role: Role) -> Self {
        Self {
            display_name: display_name.to_string(),
            role,
            student: None,
            department: None,
            hostel: None,
            room: None,
            phone: None,
            external_id: None,
            avatar_url: None,
        }
    }
    pub fn student(display_name: &str, profile: StudentProfile) -> Self {
        Self::new(display_name, Role::Student).set_student(profile)
    }
    pub fn set_student(mut self, profile: StudentProfile) -> Self {
        self.student = Some(profile);
        self
    }
    pub fn set_department(mut self, department: &str) -> Self {
        self.department = Some(department.to_string());
        self
    }
    pub fn set_external(mut self, external_id: &str, avatar_url: Option<&str>) -> Self {
        self.external_id = Some(external_id.to_string());
        self.avatar_url = avatar_url.map(str::to_string);
        self
    }
}

/// Self-service profile changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub department: Option<String>,
    pub hostel: Option<String>,
    pub room: Option<String>,
    pub phone: Option<String>,
    pub year: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.role.is_none_or(|role| user.role == role)
            && self.active.is_none_or(|active| user.is_active == active)
    }
}

pub struct UserDirectory {
    users: Tree,
    by_email: Tree,
    email_domain: String,
}

fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_user(user: &User) -> LeaveResult<()> {
    let mut violations = Violations::new();
    violations.extend(validation::validate_user_profile(user));
    violations.into_result()
}

impl UserDirectory {
    pub fn open(db: &Db, email_domain: &str) -> LeaveResult<Self> {
        Ok(Self {
            users: db.open_tree(USERS_TREE)?,
            by_email: db.open_tree(EMAIL_INDEX_TREE)?,
            email_domain: email_domain.to_string(),
        })
    }

    pub fn email_domain(&self) -> &str {
        &self.email_domain
    }

    pub fn has_capability(role: Role, capability: Capability) -> bool {
        role.has_capability(capability)
    }

    pub fn find_by_id(&self, id: &str) -> LeaveResult<Option<User>> {
        match self.users.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Self::find_by_id`] but absence is an error
    pub fn get(&self, id: &str) -> LeaveResult<User> {
        self.find_by_id(id)?
            .ok_or_else(|| LeaveError::NotFound(format!("user {id}")))
    }

    pub fn find_by_email(&self, email: &str) -> LeaveResult<Option<User>> {
        match self.by_email.get(normalise_email(email).as_bytes())? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id).into_owned();
                self.find_by_id(&id)
            }
            None => Ok(None),
        }
    }

    /// Create a user, failing with `Conflict` when the email is already taken
    pub fn create(&self, email: &str, attrs: ProfileAttrs) -> LeaveResult<User> {
        let email = normalise_email(email);
        let mut violations = Violations::new();
        violations.check(validation::validate_email_domain(&email, &self.email_domain));

        let user = User {
            id: utils::new_user_id()?,
            display_name: attrs.display_name,
            email,
            role: attrs.role,
            student: attrs.student,
            department: attrs.department,
            hostel: attrs.hostel,
            room: attrs.room,
            phone: attrs.phone,
            external_id: attrs.external_id,
            avatar_url: attrs.avatar_url,
            is_active: true,
            last_login: None,
            created_at: TimeStamp::new(),
        };
        violations.extend(validation::validate_user_profile(&user));
        violations.into_result()?;

        // the record and its email claim land together or not at all
        let bytes = to_cbor(&user)?;
        (&self.users, &self.by_email).transaction(|(users, by_email)| {
            if by_email.get(user.email.as_bytes())?.is_some() {
                return abort(LeaveError::Conflict(format!(
                    "email {} is already registered",
                    user.email
                )));
            }
            users.insert(user.id.as_bytes(), bytes.as_slice())?;
            by_email.insert(user.email.as_bytes(), user.id.as_bytes())?;
            Ok(())
        })?;

        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Idempotent upsert keyed on email, used on first sign-in
    pub fn find_or_create(&self, email: &str, attrs: ProfileAttrs) -> LeaveResult<User> {
        if let Some(user) = self.find_by_email(email)? {
            return Ok(user);
        }
        match self.create(email, attrs) {
            Err(LeaveError::Conflict(reason)) => self
                .find_by_email(email)?
                .ok_or(LeaveError::Conflict(reason)),
            other => other,
        }
    }

    pub fn update_role(
        &self,
        id: &str,
        role: Role,
        student: Option<StudentProfile>,
    ) -> LeaveResult<User> {
        let user = self.modify(id, |user| {
            user.role = role;
            user.student = if role == Role::Student {
                student.clone().or_else(|| user.student.clone())
            } else {
                None
            };
        })?;
        tracing::info!(user_id = %id, role = %role, "user role changed");
        Ok(user)
    }

    pub fn update_active_status(&self, id: &str, active: bool) -> LeaveResult<User> {
        let user = self.modify(id, |user| user.is_active = active)?;
        tracing::info!(user_id = %id, active, "user active status changed");
        Ok(user)
    }

    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> LeaveResult<User> {
        if update.year.is_some() {
            let current = self.get(id)?;
            if current.role != Role::Student {
                return Err(ValidationError::InvalidStudentProfile(
                    "only students have a year of study".into(),
                )
                .into());
            }
        }
        self.modify(id, |user| {
            if let Some(name) = &update.display_name {
                user.display_name = name.clone();
            }
            if let Some(department) = &update.department {
                user.department = Some(department.clone());
            }
            if let Some(hostel) = &update.hostel {
                user.hostel = Some(hostel.clone());
            }
            if let Some(room) = &update.room {
                user.room = Some(room.clone());
            }
            if let Some(phone) = &update.phone {
                user.phone = Some(phone.clone());
            }
            if let (Some(year), Some(profile)) = (update.year, user.student.as_mut()) {
                profile.year = year;
            }
        })
    }

    pub fn record_login(&self, id: &str, at: TimeStamp<Utc>) -> LeaveResult<User> {
        self.modify(id, |user| user.last_login = Some(at.clone()))
    }

    /// Users matching `filter`, oldest account first
    pub fn list(&self, filter: &UserFilter) -> LeaveResult<Vec<User>> {
        let mut users = Vec::new();
        for entry in self.users.iter() {
            let (_, bytes) = entry?;
            let user: User = minicbor::decode(&bytes)?;
            if filter.matches(&user) {
                users.push(user);
            }
        }
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    /// Read-modify-write guarded by compare-and-swap, retried until the
    /// write lands on the revision it was computed from.
    fn modify(&self, id: &str, change: impl Fn(&mut User)) -> LeaveResult<User> {
        loop {
            let current = self
                .users
                .get(id.as_bytes())?
                .ok_or_else(|| LeaveError::NotFound(format!("user {id}")))?;
            let mut user: User = minicbor::decode(&current)?;
            change(&mut user);
            check_user(&user)?;

            let swapped =
                self.users
                    .compare_and_swap(id.as_bytes(), Some(&current), Some(to_cbor(&user)?))?;
            if swapped.is_ok() {
                return Ok(user);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> UserDirectory {
        let db = sled::Config::new().temporary(true).open().unwrap();
        UserDirectory::open(&db, "college.edu").unwrap()
    }

    #[test]
    fn create_and_lookup_by_email_case_insensitively() {
        let dir = directory();
        let user = dir
            .create(
                "Meera@College.edu",
                ProfileAttrs::student("Meera Iyer", StudentProfile::new("CS21B001", 2)),
            )
            .unwrap();

        assert_eq!(user.email, "meera@college.edu");
        assert!(user.is_active);
        assert_eq!(dir.find_by_email("MEERA@college.edu").unwrap(), Some(user.clone()));
        assert_eq!(dir.find_by_id(&user.id).unwrap(), Some(user));
    }

    #[test]
    fn duplicate_email_conflicts_but_find_or_create_is_idempotent() {
        let dir = directory();
        let attrs = ProfileAttrs::new("Warden Das", Role::Warden);
        let first = dir.find_or_create("das@college.edu", attrs.clone()).unwrap();
        let second = dir.find_or_create("das@college.edu", attrs.clone()).unwrap();
        assert_eq!(first.id, second.id);

        let err = dir.create("das@college.edu", attrs).unwrap_err();
        assert!(matches!(err, LeaveError::Conflict(_)));
    }

    #[test]
    fn student_fields_required_exactly_for_students() {
        let dir = directory();
        let err = dir
            .create("nofields@college.edu", ProfileAttrs::new("No Fields", Role::Student))
            .unwrap_err();
        assert!(matches!(err, LeaveError::Validation(_)));

        let err = dir
            .create(
                "staff@college.edu",
                ProfileAttrs::new("Staff", Role::Caretaker).set_student(StudentProfile::new("X1", 1)),
            )
            .unwrap_err();
        assert!(matches!(err, LeaveError::Validation(_)));

        let err = dir
            .create("outsider@gmail.com", ProfileAttrs::new("Outsider", Role::Admin))
            .unwrap_err();
        assert!(matches!(err, LeaveError::Validation(_)));
    }

    #[test]
    fn role_change_keeps_student_invariant() {
        let dir = directory();
        let user = dir
            .create(
                "kiran@college.edu",
                ProfileAttrs::student("Kiran", StudentProfile::new("ME20B010", 4)),
            )
            .unwrap();

        let promoted = dir.update_role(&user.id, Role::Caretaker, None).unwrap();
        assert_eq!(promoted.role, Role::Caretaker);
        assert!(promoted.student.is_none());

        // back to student without a profile is refused
        assert!(dir.update_role(&user.id, Role::Student, None).is_err());
        let demoted = dir
            .update_role(&user.id, Role::Student, Some(StudentProfile::new("ME20B010", 4)))
            .unwrap();
        assert_eq!(demoted.student.unwrap().year, 4);
    }

    #[test]
    fn list_filters_by_role_and_activity() {
        let dir = directory();
        let warden = dir
            .create("w@college.edu", ProfileAttrs::new("Warden", Role::Warden))
            .unwrap();
        dir.create("c@college.edu", ProfileAttrs::new("Caretaker", Role::Caretaker))
            .unwrap();
        dir.update_active_status(&warden.id, false).unwrap();

        let inactive = dir
            .list(&UserFilter {
                active: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, warden.id);

        let caretakers = dir
            .list(&UserFilter {
                role: Some(Role::Caretaker),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(caretakers.len(), 1);
        assert_eq!(dir.list(&UserFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn profile_update_validates_phone() {
        let dir = directory();
        let user = dir
            .create(
                "anu@college.edu",
                ProfileAttrs::student("Anu", StudentProfile::new("EE22B005", 1)),
            )
            .unwrap();
        let bad = ProfileUpdate {
            phone: Some("123".into()),
            ..Default::default()
        };
        assert!(dir.update_profile(&user.id, &bad).is_err());

        let good = ProfileUpdate {
            phone: Some("9988776655".into()),
            hostel: Some("Ganga".into()),
            year: Some(2),
            ..Default::default()
        };
        let updated = dir.update_profile(&user.id, &good).unwrap();
        assert_eq!(updated.hostel.as_deref(), Some("Ganga"));
        assert_eq!(updated.student.unwrap().year, 2);
    }

    #[test]
    fn concurrent_find_or_create_converges_on_one_record() {
        let dir = directory();
        let barrier = std::sync::Barrier::new(8);
        let ids: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (dir, barrier) = (&dir, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        dir.find_or_create(
                            "newcomer@college.edu",
                            ProfileAttrs::student("Newcomer", StudentProfile::new("ME24B010", 1)),
                        )
                        .map(|user| user.id)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(dir.list(&UserFilter::default()).unwrap().len(), 1);
        assert_eq!(
            dir.find_by_email("newcomer@college.edu").unwrap().map(|u| u.id),
            Some(ids[0].clone())
        );
    }
}
