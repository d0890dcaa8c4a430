//! Property-based tests for the leave request state machine
//!
//! Random sequences of approve / reject / cancel calls are replayed against a
//! single request and the observable state is compared with a simple model:
//!
//! 1. Terminal stability - once approved or rejected, nothing changes it
//! 2. Single decision - at most one approve/reject ever succeeds
//! 3. Cancellation - only the owner, only while pending, and it is final
//! 4. Failures leave the stored document untouched

use chrono::{Duration, Utc};
use leave_approval::{
    Actor, ContactBlock, EmergencyContact, LeaveApp, LeaveDraft, LeaveError, LeaveStatus,
    LeaveType, Role,
    directory::{ProfileAttrs, StudentProfile},
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Approve,
    Reject,
    RejectWithoutRemarks,
    CancelByOwner,
    CancelByOther,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Approve),
        Just(Op::Reject),
        Just(Op::RejectWithoutRemarks),
        Just(Op::CancelByOwner),
        Just(Op::CancelByOther),
    ]
}

struct World {
    app: LeaveApp,
    owner: Actor,
    other: Actor,
    warden: Actor,
}

fn world() -> World {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let app = LeaveApp::new(&db, "college.edu").unwrap();
    let student = |email: &str, id: &str| {
        let user = app
            .directory
            .create(email, ProfileAttrs::student("Prop Student", StudentProfile::new(id, 1)))
            .unwrap();
        Actor::new(user.id, user.role)
    };
    let owner = student("owner@college.edu", "P1");
    let other = student("other@college.edu", "P2");
    let warden = app
        .directory
        .create("warden@college.edu", ProfileAttrs::new("Warden", Role::Warden))
        .unwrap();
    World {
        owner,
        other,
        warden: Actor::new(warden.id, warden.role),
        app,
    }
}

fn draft() -> LeaveDraft {
    let now = Utc::now();
    LeaveDraft::new()
        .set_from_date((now + Duration::days(2)).into())
        .set_to_date((now + Duration::days(3)).into())
        .set_reason("generated leave request")
        .set_leave_type(LeaveType::Home)
        .set_contact(ContactBlock::new(
            "1 Test Street, Chennai",
            "9000000000",
            EmergencyContact::new("Guardian", "Uncle", "9111111111"),
        ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_lifecycle_matches_model(ops in prop::collection::vec(op_strategy(), 1..=8)) {
        let w = world();
        let leave = w.app.leaves.submit(&w.owner, &draft()).unwrap();

        // model: Some(status) while the document exists, None once cancelled
        let mut model = Some(LeaveStatus::Pending);
        let mut decisions = 0;

        for op in ops {
            let before = w.app.leaves.view(&w.warden, &leave.id).ok();
            let outcome = match op {
                Op::Approve => w.app.leaves.approve(&w.warden, &leave.id, None).map(|_| ()),
                Op::Reject => w.app.leaves.reject(&w.warden, &leave.id, "not now").map(|_| ()),
                Op::RejectWithoutRemarks => w.app.leaves.reject(&w.warden, &leave.id, "").map(|_| ()),
                Op::CancelByOwner => w.app.leaves.cancel(&w.owner, &leave.id),
                Op::CancelByOther => w.app.leaves.cancel(&w.other, &leave.id),
            };

            match (&op, model, &outcome) {
                (Op::Approve, Some(LeaveStatus::Pending), Ok(())) => {
                    model = Some(LeaveStatus::Approved);
                    decisions += 1;
                }
                (Op::Reject, Some(LeaveStatus::Pending), Ok(())) => {
                    model = Some(LeaveStatus::Rejected);
                    decisions += 1;
                }
                (Op::CancelByOwner, Some(LeaveStatus::Pending), Ok(())) => model = None,
                (Op::RejectWithoutRemarks, _, Err(LeaveError::Validation(_))) => {}
                (Op::CancelByOther, Some(_), Err(LeaveError::Forbidden(_))) => {}
                (Op::Approve | Op::Reject | Op::CancelByOwner, Some(status), Err(LeaveError::InvalidTransition(_)))
                    if status.is_terminal() => {}
                (_, None, Err(LeaveError::NotFound(_))) => {}
                (op, model, outcome) => {
                    prop_assert!(false, "unexpected {:?} -> {:?} in state {:?}", op, outcome, model);
                }
            }

            // refused operations leave the document exactly as it was
            if outcome.is_err() {
                let after = w.app.leaves.view(&w.warden, &leave.id).ok();
                prop_assert_eq!(before, after);
            }
        }

        prop_assert!(decisions <= 1);
        let stored = w.app.leaves.view(&w.warden, &leave.id).ok().map(|l| l.status);
        prop_assert_eq!(stored, model);
    }
}
