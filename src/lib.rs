//! Role-based leave request approval.
//!
//! Students submit leave requests, caretakers, wardens and admins decide them,
//! and admins manage accounts and read aggregate statistics. Documents are kept
//! in an embedded sled database and every state change is a single
//! compare-and-swap write.

pub mod access;
pub mod admin;
pub mod app;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod leave;
pub mod reports;
pub mod service;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod validation;

pub use access::{Actor, Capability, Role};
pub use app::LeaveApp;
pub use error::{LeaveError, LeaveResult, ValidationError, Violations};
pub use leave::{ContactBlock, EmergencyContact, LeaveDraft, LeaveRequest, LeaveStatus, LeaveType, TimeStamp};
