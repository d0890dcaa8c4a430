//! Leave request documents, drafts and the timestamp type they share
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Documents store timestamps as i64 nanoseconds, which spans 1677 to 2262
    pub fn is_storable(&self) -> bool {
        self.0.timestamp_nanos_opt().is_some()
    }
}

// `Utc` itself is not ordered, so the derive would never apply
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaveType {
    #[n(0)]
    Day,
    #[n(1)]
    Home,
}

impl LeaveType {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaveType::Day => "day",
            LeaveType::Home => "home",
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(LeaveType::Day),
            "home" => Ok(LeaveType::Home),
            _ => Err(format!("Invalid leave type: {s}")),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaveStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

impl LeaveStatus {
    pub const ALL: [LeaveStatus; 3] = [
        LeaveStatus::Pending,
        LeaveStatus::Approved,
        LeaveStatus::Rejected,
    ];

    pub fn is_terminal(self) -> bool {
        self != LeaveStatus::Pending
    }
    /// Pending and approved requests reserve their dates; rejected ones release them
    pub fn reserves_dates(self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
    pub fn as_str(self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "rejected" => Ok(LeaveStatus::Rejected),
            _ => Err(format!("Invalid leave status: {s}")),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct EmergencyContact {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub relationship: String,
    #[n(2)]
    pub phone: String,
}

/// Where the student can be reached while away
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactBlock {
    #[n(0)]
    pub address: String,
    #[n(1)]
    pub phone: String,
    #[n(2)]
    pub emergency_contact: EmergencyContact,
}

impl ContactBlock {
    pub fn new(address: &str, phone: &str, emergency_contact: EmergencyContact) -> Self {
        Self {
            address: address.to_string(),
            phone: phone.to_string(),
            emergency_contact,
        }
    }
}

impl EmergencyContact {
    pub fn new(name: &str, relationship: &str, phone: &str) -> Self {
        Self {
            name: name.to_string(),
            relationship: relationship.to_string(),
            phone: phone.to_string(),
        }
    }
}

/// A student's unvalidated leave application.
///
/// Built up field by field, then checked as a whole by
/// [`crate::validation::validate_draft`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaveDraft {
    pub(crate) from_date: Option<TimeStamp<Utc>>,
    pub(crate) to_date: Option<TimeStamp<Utc>>,
    pub(crate) reason: Option<String>,
    pub(crate) leave_type: Option<LeaveType>,
    pub(crate) contact: Option<ContactBlock>,
    pub(crate) is_urgent: bool,
    pub(crate) urgent_reason: Option<String>,
}

impl LeaveDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_from_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.from_date = Some(date);
        self
    }
    pub fn set_to_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.to_date = Some(date);
        self
    }
    pub fn set_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
    pub fn set_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = Some(leave_type);
        self
    }
    pub fn set_contact(mut self, contact: ContactBlock) -> Self {
        self.contact = Some(contact);
        self
    }
    pub fn set_urgent_flag(mut self, is_urgent: bool) -> Self {
        self.is_urgent = is_urgent;
        self
    }
    /// Mark the request urgent along with the justification
    pub fn set_urgent(mut self, reason: &str) -> Self {
        self.is_urgent = true;
        self.urgent_reason = Some(reason.to_string());
        self
    }
}

/// A draft whose fields have all passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub from_date: TimeStamp<Utc>,
    pub to_date: TimeStamp<Utc>,
    pub reason: String,
    pub leave_type: LeaveType,
    pub contact: ContactBlock,
    pub is_urgent: bool,
    pub urgent_reason: Option<String>,
}

impl ValidatedDraft {
    pub fn into_request(self, id: String, student: String, created_at: TimeStamp<Utc>) -> LeaveRequest {
        LeaveRequest {
            id,
            student,
            from_date: self.from_date,
            to_date: self.to_date,
            reason: self.reason,
            leave_type: self.leave_type,
            status: LeaveStatus::Pending,
            remarks: String::new(),
            approved_by: None,
            approved_at: None,
            contact: self.contact,
            is_urgent: self.is_urgent,
            urgent_reason: self.urgent_reason,
            created_at,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub student: String, // owning user id
    #[n(2)]
    pub from_date: TimeStamp<Utc>,
    #[n(3)]
    pub to_date: TimeStamp<Utc>,
    #[n(4)]
    pub reason: String,
    #[n(5)]
    pub leave_type: LeaveType,
    #[n(6)]
    pub status: LeaveStatus,
    #[n(7)]
    pub remarks: String,
    #[n(8)]
    pub approved_by: Option<String>,
    #[n(9)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub contact: ContactBlock,
    #[n(11)]
    pub is_urgent: bool,
    #[n(12)]
    pub urgent_reason: Option<String>,
    #[n(13)]
    pub created_at: TimeStamp<Utc>,
}

impl LeaveRequest {
    /// Whole calendar days covered, counting both endpoints
    pub fn duration_days(&self) -> i64 {
        let from = self.from_date.to_datetime_utc().date_naive();
        let to = self.to_date.to_datetime_utc().date_naive();
        (to - from).num_days() + 1
    }
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LeaveStatus::Pending && self.from_date.to_datetime_utc() < now
    }
    /// Inclusive interval intersection with `[from, to]`
    pub fn overlaps(&self, from: &TimeStamp<Utc>, to: &TimeStamp<Utc>) -> bool {
        self.from_date <= *to && self.to_date >= *from
    }
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.student == user_id
    }
    /// The document as it reads after leaving `pending`
    pub fn decided(
        &self,
        status: LeaveStatus,
        approver: &str,
        remarks: String,
        at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            status,
            remarks,
            approved_by: Some(approver.to_string()),
            approved_at: Some(at),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(from: DateTime<Utc>, to: DateTime<Utc>) -> LeaveRequest {
        ValidatedDraft {
            from_date: from.into(),
            to_date: to.into(),
            reason: "family function".into(),
            leave_type: LeaveType::Home,
            contact: ContactBlock::default(),
            is_urgent: false,
            urgent_reason: None,
        }
        .into_request("leave_x".into(), "user_x".into(), TimeStamp::new())
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::from(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
        let later = TimeStamp::from(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 1).unwrap());

        assert!(earlier < later);
        assert_eq!(earlier.cmp(&earlier.clone()), Ordering::Equal);
        let mut stamps = vec![later.clone(), earlier.clone()];
        stamps.sort();
        assert_eq!(stamps, vec![earlier, later]);
    }

    #[test]
    fn far_future_timestamps_are_not_storable() {
        assert!(TimeStamp::new().is_storable());
        let far = TimeStamp::from(Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap());
        assert!(!far.is_storable());
        assert!(minicbor::to_vec(&far).is_err());
    }

    #[test]
    fn duration_counts_both_endpoints() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 3, 12, 18, 0, 0).unwrap();
        assert_eq!(request(from, to).duration_days(), 3);
        assert_eq!(request(from, from).duration_days(), 1);
    }

    #[test]
    fn only_pending_requests_in_the_past_are_overdue() {
        let now = Utc::now();
        let mut leave = request(now - Duration::days(1), now + Duration::days(1));
        assert!(leave.is_overdue(now));

        leave.status = LeaveStatus::Approved;
        assert!(!leave.is_overdue(now));

        let future = request(now + Duration::days(1), now + Duration::days(2));
        assert!(!future.is_overdue(now));
    }

    #[test]
    fn decided_copy_records_approver() {
        let now = Utc::now();
        let leave = request(now + Duration::days(1), now + Duration::days(2));
        let at = TimeStamp::new();
        let decided = leave.decided(LeaveStatus::Rejected, "user_warden", "no".into(), at.clone());

        assert_eq!(decided.status, LeaveStatus::Rejected);
        assert_eq!(decided.approved_by.as_deref(), Some("user_warden"));
        assert_eq!(decided.approved_at, Some(at));
        assert_eq!(decided.id, leave.id);
        assert_eq!(leave.status, LeaveStatus::Pending);
    }
}
