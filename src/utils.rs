//! Identifier generation
use super::error::{LeaveError, LeaveResult};
use bech32::Bech32m;
use uuid7::uuid7;

pub const USER_HRP: &str = "user_";
pub const LEAVE_HRP: &str = "leave_";

// construct a unique time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> LeaveResult<String> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| LeaveError::Internal(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| LeaveError::Internal(e.to_string()))
}

pub fn new_user_id() -> LeaveResult<String> {
    new_uuid_to_bech32(USER_HRP)
}

pub fn new_leave_id() -> LeaveResult<String> {
    new_uuid_to_bech32(LEAVE_HRP)
}
