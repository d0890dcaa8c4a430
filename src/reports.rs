//! Read-only rollups over stored leave requests
use super::directory::UserDirectory;
use super::error::LeaveResult;
use super::leave::{LeaveRequest, LeaveStatus};
use super::store::LeaveStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const UNASSIGNED_DEPARTMENT: &str = "unassigned";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeaveStatistics {
    pub total: u64,
    pub overdue: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    pub by_department: BTreeMap<String, u64>,
    pub by_month: BTreeMap<String, u64>, // keyed by from date, YYYY-MM
}

/// Group `leaves` by status, type, department and starting month.
///
/// `department_of` maps a student id to their department, if known.
pub fn aggregate<'a>(
    leaves: impl IntoIterator<Item = &'a LeaveRequest>,
    department_of: impl Fn(&str) -> Option<String>,
    now: DateTime<Utc>,
) -> LeaveStatistics {
    let mut stats = LeaveStatistics {
        by_status: LeaveStatus::ALL
            .iter()
            .map(|status| (status.to_string(), 0))
            .collect(),
        ..Default::default()
    };

    for leave in leaves {
        stats.total += 1;
        if leave.is_overdue(now) {
            stats.overdue += 1;
        }
        *stats.by_status.entry(leave.status.to_string()).or_default() += 1;
        *stats.by_type.entry(leave.leave_type.to_string()).or_default() += 1;

        let department = department_of(&leave.student).unwrap_or_else(|| UNASSIGNED_DEPARTMENT.to_string());
        *stats.by_department.entry(department).or_default() += 1;

        let month = leave.from_date.to_datetime_utc().format("%Y-%m").to_string();
        *stats.by_month.entry(month).or_default() += 1;
    }
    stats
}

/// Statistics over every stored request
pub fn collect(store: &LeaveStore, directory: &UserDirectory) -> LeaveResult<LeaveStatistics> {
    let leaves = store.all()?;

    // one directory lookup per distinct student
    let mut departments: HashMap<String, Option<String>> = HashMap::new();
    for leave in &leaves {
        if !departments.contains_key(&leave.student) {
            let department = directory
                .find_by_id(&leave.student)?
                .and_then(|user| user.department);
            departments.insert(leave.student.clone(), department);
        }
    }

    Ok(aggregate(
        &leaves,
        |student| departments.get(student).cloned().flatten(),
        Utc::now(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave::{ContactBlock, LeaveType, TimeStamp, ValidatedDraft};
    use chrono::TimeZone;

    fn leave(student: &str, month: u32, leave_type: LeaveType, status: LeaveStatus) -> LeaveRequest {
        let from = Utc.with_ymd_and_hms(2030, month, 3, 8, 0, 0).unwrap();
        let mut leave = ValidatedDraft {
            from_date: TimeStamp::from(from),
            to_date: TimeStamp::from(from),
            reason: "errand in town".into(),
            leave_type,
            contact: ContactBlock::default(),
            is_urgent: false,
            urgent_reason: None,
        }
        .into_request(format!("leave_{student}_{month}"), student.into(), TimeStamp::new());
        leave.status = status;
        leave
    }

    #[test]
    fn groups_by_every_dimension() {
        let leaves = vec![
            leave("a", 1, LeaveType::Day, LeaveStatus::Pending),
            leave("a", 2, LeaveType::Home, LeaveStatus::Approved),
            leave("b", 2, LeaveType::Home, LeaveStatus::Rejected),
        ];
        let now = Utc.with_ymd_and_hms(2030, 1, 15, 0, 0, 0).unwrap();
        let stats = aggregate(
            &leaves,
            |student| (student == "a").then(|| "Physics".to_string()),
            now,
        );

        assert_eq!(stats.total, 3);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.by_status["pending"], 1);
        assert_eq!(stats.by_status["approved"], 1);
        assert_eq!(stats.by_status["rejected"], 1);
        assert_eq!(stats.by_type["home"], 2);
        assert_eq!(stats.by_department["Physics"], 2);
        assert_eq!(stats.by_department[UNASSIGNED_DEPARTMENT], 1);
        assert_eq!(stats.by_month["2030-02"], 2);
    }

    #[test]
    fn empty_store_reports_zero_for_each_status() {
        let stats = aggregate([], |_| None, Utc::now());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_status.len(), 3);
        assert!(stats.by_status.values().all(|count| *count == 0));
    }
}
