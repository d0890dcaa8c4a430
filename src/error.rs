//! Error types shared by every layer of the leave workflow
use std::fmt;

/// A single business-rule violation found while validating input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("from date must not be in the past and to date must not precede from date")]
    InvalidDateRange,
    #[error("leave dates must fall between 1677 and 2262")]
    DateOutOfRange,
    #[error("requested dates overlap existing leave request {0}")]
    OverlappingRequest(String),
    #[error("urgent requests must state a reason")]
    MissingUrgentReason,
    #[error("invalid contact field '{field}': {reason}")]
    InvalidContact { field: &'static str, reason: String },
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' must be between {min} and {max} characters")]
    FieldLength {
        field: &'static str,
        min: usize,
        max: usize,
    },
    #[error("email '{0}' is not on the institution's domain")]
    InvalidEmailDomain(String),
    #[error("invalid student profile: {0}")]
    InvalidStudentProfile(String),
    #[error("field '{0}' must be exactly 10 digits")]
    InvalidPhone(&'static str),
    #[error("rejecting a request requires remarks")]
    MissingRemarks,
}

/// Every violation found in one validation pass.
///
/// Validation never stops at the first failed rule, so callers receive the
/// complete list in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<ValidationError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, violation: ValidationError) {
        self.0.push(violation);
    }
    /// Record the outcome of a single-rule check
    pub fn check(&mut self, outcome: Result<(), ValidationError>) {
        if let Err(violation) = outcome {
            self.0.push(violation);
        }
    }
    pub fn extend(&mut self, violations: impl IntoIterator<Item = ValidationError>) {
        self.0.extend(violations);
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
    pub fn contains(&self, violation: &ValidationError) -> bool {
        self.0.contains(violation)
    }
    /// Ok when nothing was recorded, otherwise the whole batch as an error
    pub fn into_result(self) -> Result<(), LeaveError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(LeaveError::Validation(self))
        }
    }
}

impl From<ValidationError> for Violations {
    fn from(value: ValidationError) -> Self {
        Self(vec![value])
    }
}

impl IntoIterator for Violations {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LeaveError {
    #[error("validation failed: {0}")]
    Validation(Violations),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("identity credential was rejected")]
    InvalidCredential,
    #[error("session token has expired")]
    Expired,
    #[error("session token is invalid")]
    InvalidToken,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Store(#[from] sled::Error),
    #[error("failed to decode stored document: {0}")]
    Codec(#[from] minicbor::decode::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type LeaveResult<T> = Result<T, LeaveError>;

impl From<ValidationError> for LeaveError {
    fn from(value: ValidationError) -> Self {
        LeaveError::Validation(value.into())
    }
}

impl From<sled::transaction::TransactionError<LeaveError>> for LeaveError {
    fn from(value: sled::transaction::TransactionError<LeaveError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => LeaveError::Store(e),
        }
    }
}

impl From<Violations> for LeaveError {
    fn from(value: Violations) -> Self {
        LeaveError::Validation(value)
    }
}

impl LeaveError {
    /// Stable machine readable code for clients
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::Expired => "TOKEN_EXPIRED",
            Self::InvalidToken => "TOKEN_INVALID",
            Self::Conflict(_) => "CONFLICT",
            Self::Store(_) | Self::Codec(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status a transport layer should answer with
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::InvalidCredential | Self::Expired | Self::InvalidToken => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::InvalidTransition(_) | Self::Conflict(_) => 409,
            Self::Store(_) | Self::Codec(_) | Self::Internal(_) => 500,
        }
    }

    /// Failures that are the service's fault rather than the caller's
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Codec(_) | Self::Internal(_))
    }

    /// Message safe to hand back to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }

    /// Record the error with the operation that produced it
    pub fn log(&self, operation: &str) {
        if self.is_internal() {
            tracing::error!(operation, error = %self, code = self.code(), "internal failure");
        } else {
            tracing::debug!(operation, error = %self, code = self.code(), "request refused");
        }
    }
}
