//! Business-rule checks for leave requests and user records.
//!
//! Every function here is pure: it inspects its inputs and reports what is
//! wrong without touching the store or correcting anything. Callers gather the
//! results into a [`Violations`] batch so a client sees every problem at once.
use super::access::Role;
use super::directory::User;
use super::error::{ValidationError, Violations};
use super::leave::{ContactBlock, LeaveDraft, LeaveRequest, TimeStamp, ValidatedDraft};
use chrono::Utc;

pub const REASON_MIN: usize = 5;
pub const REASON_MAX: usize = 500;
pub const REMARKS_MAX: usize = 500;
pub const URGENT_REASON_MAX: usize = 300;
pub const ADDRESS_MIN: usize = 5;
pub const ADDRESS_MAX: usize = 200;
pub const CONTACT_NAME_MIN: usize = 2;
pub const CONTACT_NAME_MAX: usize = 100;
pub const RELATIONSHIP_MIN: usize = 2;
pub const RELATIONSHIP_MAX: usize = 50;
pub const DISPLAY_NAME_MIN: usize = 2;
pub const DISPLAY_NAME_MAX: usize = 100;
pub const STUDENT_ID_MAX: usize = 32;
pub const PHONE_DIGITS: usize = 10;

fn char_len(value: &str) -> usize {
    value.trim().chars().count()
}

pub fn validate_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = char_len(value);
    if len < min || len > max {
        return Err(ValidationError::FieldLength { field, min, max });
    }
    Ok(())
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == PHONE_DIGITS && phone.bytes().all(|b| b.is_ascii_digit())
}

/// Fails when the leave starts before `now`, ends before it starts, or
/// cannot be stored
pub fn validate_date_range(
    from: &TimeStamp<Utc>,
    to: &TimeStamp<Utc>,
    now: &TimeStamp<Utc>,
) -> Result<(), ValidationError> {
    if !from.is_storable() || !to.is_storable() {
        return Err(ValidationError::DateOutOfRange);
    }
    if from < now || to < from {
        return Err(ValidationError::InvalidDateRange);
    }
    Ok(())
}

/// Fails when `[from, to]` intersects any pending or approved request.
/// Rejected requests never block new ones.
pub fn validate_no_overlap<'a>(
    existing: impl IntoIterator<Item = &'a LeaveRequest>,
    from: &TimeStamp<Utc>,
    to: &TimeStamp<Utc>,
) -> Result<(), ValidationError> {
    match existing
        .into_iter()
        .find(|leave| leave.status.reserves_dates() && leave.overlaps(from, to))
    {
        Some(clash) => Err(ValidationError::OverlappingRequest(clash.id.clone())),
        None => Ok(()),
    }
}

pub fn validate_urgency(is_urgent: bool, urgent_reason: Option<&str>) -> Result<(), ValidationError> {
    let reason = urgent_reason.unwrap_or_default();
    if is_urgent && reason.trim().is_empty() {
        return Err(ValidationError::MissingUrgentReason);
    }
    if char_len(reason) > URGENT_REASON_MAX {
        return Err(ValidationError::FieldLength {
            field: "urgent_reason",
            min: 0,
            max: URGENT_REASON_MAX,
        });
    }
    Ok(())
}

/// Reports one violation per offending field
pub fn validate_contact_block(block: &ContactBlock) -> Vec<ValidationError> {
    let mut found = Vec::new();
    let mut length = |field: &'static str, value: &str, min: usize, max: usize| {
        if validate_length(field, value, min, max).is_err() {
            found.push(ValidationError::InvalidContact {
                field,
                reason: format!("must be between {min} and {max} characters"),
            });
        }
    };
    let emergency = &block.emergency_contact;
    length("address", &block.address, ADDRESS_MIN, ADDRESS_MAX);
    length(
        "emergency_contact.name",
        &emergency.name,
        CONTACT_NAME_MIN,
        CONTACT_NAME_MAX,
    );
    length(
        "emergency_contact.relationship",
        &emergency.relationship,
        RELATIONSHIP_MIN,
        RELATIONSHIP_MAX,
    );

    for (field, phone) in [
        ("phone", block.phone.as_str()),
        ("emergency_contact.phone", emergency.phone.as_str()),
    ] {
        if !is_valid_phone(phone) {
            found.push(ValidationError::InvalidContact {
                field,
                reason: format!("must be exactly {PHONE_DIGITS} digits"),
            });
        }
    }
    found
}

pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    validate_length("reason", reason, REASON_MIN, REASON_MAX)
}

/// Remarks are optional on approval and mandatory on rejection
pub fn validate_remarks(remarks: &str, required: bool) -> Result<(), ValidationError> {
    if required && remarks.trim().is_empty() {
        return Err(ValidationError::MissingRemarks);
    }
    validate_length("remarks", remarks, 0, REMARKS_MAX)
}

pub fn validate_email_domain(email: &str, domain: &str) -> Result<(), ValidationError> {
    let email = email.trim().to_lowercase();
    let suffix = format!("@{}", domain.trim().trim_start_matches('@').to_lowercase());
    let local_ok = email
        .strip_suffix(&suffix)
        .is_some_and(|local| !local.is_empty() && !local.contains('@'));
    if !local_ok {
        return Err(ValidationError::InvalidEmailDomain(email));
    }
    Ok(())
}

/// Checks the invariants a stored user record must satisfy
pub fn validate_user_profile(user: &User) -> Vec<ValidationError> {
    let mut found = Vec::new();
    if let Err(e) = validate_length(
        "display_name",
        &user.display_name,
        DISPLAY_NAME_MIN,
        DISPLAY_NAME_MAX,
    ) {
        found.push(e);
    }

    match (user.role, &user.student) {
        (Role::Student, None) => found.push(ValidationError::InvalidStudentProfile(
            "students require a student id and year".into(),
        )),
        (Role::Student, Some(profile)) => {
            if validate_length("student_id", &profile.student_id, 1, STUDENT_ID_MAX).is_err() {
                found.push(ValidationError::InvalidStudentProfile(format!(
                    "student id must be between 1 and {STUDENT_ID_MAX} characters"
                )));
            }
            if !(1..=4).contains(&profile.year) {
                found.push(ValidationError::InvalidStudentProfile(
                    "year must be between 1 and 4".into(),
                ));
            }
        }
        (_, Some(_)) => found.push(ValidationError::InvalidStudentProfile(
            "only students carry a student profile".into(),
        )),
        (_, None) => {}
    }

    if user.phone.as_deref().is_some_and(|phone| !is_valid_phone(phone)) {
        found.push(ValidationError::InvalidPhone("phone"));
    }
    found
}

/// Validate a student's draft against their existing requests.
///
/// Missing fields and rule violations are reported together.
pub fn validate_draft<'a>(
    draft: &LeaveDraft,
    existing: impl IntoIterator<Item = &'a LeaveRequest>,
    now: &TimeStamp<Utc>,
) -> Result<ValidatedDraft, Violations> {
    let mut violations = Violations::new();

    if draft.from_date.is_none() {
        violations.push(ValidationError::MissingField("from_date"));
    }
    if draft.to_date.is_none() {
        violations.push(ValidationError::MissingField("to_date"));
    }
    if let (Some(from), Some(to)) = (&draft.from_date, &draft.to_date) {
        violations.check(validate_date_range(from, to, now));
        violations.check(validate_no_overlap(existing, from, to));
    }

    match &draft.reason {
        Some(reason) => violations.check(validate_reason(reason)),
        None => violations.push(ValidationError::MissingField("reason")),
    }
    if draft.leave_type.is_none() {
        violations.push(ValidationError::MissingField("leave_type"));
    }
    match &draft.contact {
        Some(contact) => violations.extend(validate_contact_block(contact)),
        None => violations.push(ValidationError::MissingField("contact")),
    }
    violations.check(validate_urgency(
        draft.is_urgent,
        draft.urgent_reason.as_deref(),
    ));

    match (
        &draft.from_date,
        &draft.to_date,
        &draft.reason,
        draft.leave_type,
        &draft.contact,
    ) {
        (Some(from), Some(to), Some(reason), Some(leave_type), Some(contact))
            if violations.is_empty() =>
        {
            Ok(ValidatedDraft {
                from_date: from.clone(),
                to_date: to.clone(),
                reason: reason.clone(),
                leave_type,
                contact: contact.clone(),
                is_urgent: draft.is_urgent,
                urgent_reason: draft.urgent_reason.clone(),
            })
        }
        _ => Err(violations),
    }
}
