//! CSI error types and the mapping from appliance failures onto them.
//!
//! All caller-facing failures are represented by the [`CsiError`] enum, which
//! derives [`thiserror::Error`] and converts into a [`tonic::Status`] carrying
//! the matching gRPC status code.
//!
//! The second half of this module is the error taxonomy: every call site
//! that talks to the appliance names the failures it anticipates as a list
//! of [`Expect`] entries, and [`transform`] turns a [`RestError`] into the
//! [`CsiError`] the caller should see.

use thiserror::Error;
use tonic::Code;

use crate::rest::RestError;

/// Unified error type for CSI controller operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CsiError {
    /// The caller supplied a malformed or unsupported request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Credentials were missing or rejected by the appliance.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The appliance is not in a state that allows the operation.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The target path, export or entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target exists in a state incompatible with the request.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The appliance could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An unclassified internal or appliance failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// The operation is not supported by this controller.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl CsiError {
    /// The gRPC status code reported to the caller.
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::Unauthenticated(_) => Code::Unauthenticated,
            Self::FailedPrecondition(_) => Code::FailedPrecondition,
            Self::NotFound(_) => Code::NotFound,
            Self::AlreadyExists(_) => Code::AlreadyExists,
            Self::Unavailable(_) => Code::Unavailable,
            Self::Internal(_) => Code::Internal,
            Self::Unimplemented(_) => Code::Unimplemented,
        }
    }

    /// The human readable part of the error, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::Unauthenticated(m)
            | Self::FailedPrecondition(m)
            | Self::NotFound(m)
            | Self::AlreadyExists(m)
            | Self::Unavailable(m)
            | Self::Internal(m)
            | Self::Unimplemented(m) => m,
        }
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<CsiError> for tonic::Status {
    fn from(err: CsiError) -> Self {
        tonic::Status::new(err.code(), err.message())
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// An appliance failure a call site knows how to report.
///
/// Matches on the HTTP status code and, when given, the appliance's error
/// class as well.
#[derive(Debug, Clone)]
pub struct Expect {
    status: u16,
    error_class: Option<&'static str>,
    error: CsiError,
}

impl Expect {
    /// Report any appliance error with `status` as `error`.
    pub fn status(status: u16, error: CsiError) -> Self {
        Self {
            status,
            error_class: None,
            error,
        }
    }

    /// Report an appliance error with `status` and `error_class` as `error`.
    pub fn class(status: u16, error_class: &'static str, error: CsiError) -> Self {
        Self {
            status,
            error_class: Some(error_class),
            error,
        }
    }

    fn matches(&self, status: u16, error_class: &str) -> bool {
        self.status == status && self.error_class.is_none_or(|class| class == error_class)
    }
}

/// Map a transport failure onto the caller-facing error.
///
/// The first matching [`Expect`] wins. Appliance errors nobody anticipated
/// become [`CsiError::Internal`], except a lingering 401 which is still an
/// authentication failure.
pub fn transform(err: RestError, expected: impl IntoIterator<Item = Expect>) -> CsiError {
    match err {
        RestError::Appliance(appliance) => {
            if let Some(hit) = expected
                .into_iter()
                .find(|e| e.matches(appliance.status_code, &appliance.error_class))
            {
                return hit.error;
            }
            if appliance.status_code == 401 {
                CsiError::Unauthenticated(format!("appliance rejected session: {appliance}"))
            } else {
                CsiError::Internal(format!("unhandled error: {appliance}"))
            }
        }
        e @ RestError::Auth(_) => CsiError::Unauthenticated(e.to_string()),
        RestError::Http(e) => CsiError::Unavailable(e.to_string()),
        e @ (RestError::Decode(_) | RestError::Version(_)) => CsiError::internal(e),
    }
}
