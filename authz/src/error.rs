//! Error types for authorization.

use authz_openfga::OpenFgaError;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use std::fmt;

/// Validation errors from the object codec.
///
/// These are always caller bugs and are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The type prefix is not a known object type.
    UnknownObjectType(String),
    /// The object type requires a project and none was given.
    MissingProject(&'static str),
    /// The number of identifier elements is outside the type's bounds.
    InvalidArity {
        object_type: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::UnknownObjectType(t) => {
                write!(f, "Missing validator for object of type {t:?}")
            }
            ObjectError::MissingProject(t) => {
                write!(f, "Authorization objects of type {t:?} require a project")
            }
            ObjectError::InvalidArity {
                object_type,
                min,
                max,
                actual,
            } => {
                if actual < min {
                    write!(
                        f,
                        "Authorization objects of type {object_type:?} require at least {min} components to be uniquely identifiable"
                    )
                } else {
                    write!(
                        f,
                        "Authorization objects of type {object_type:?} require at most {max} components to be uniquely identifiable"
                    )
                }
            }
        }
    }
}

impl std::error::Error for ObjectError {}

/// Errors returned by authorizers and the driver registry.
#[derive(Debug)]
pub enum AuthError {
    /// No driver is registered under this name.
    UnknownDriver(String),
    /// An object failed validation.
    Object(ObjectError),
    /// The policy denied the request. Carries a human readable reason.
    Forbidden(String),
    /// The relationship store has not been reached yet.
    ServiceOffline,
    /// Invalid driver configuration.
    Config(String),
    /// The request could not be interpreted.
    Request(String),
    /// A call to the relationship store failed.
    Backend(OpenFgaError),
    /// A reconciliation batch failed.
    SyncFailure(String),
    /// The policy script could not be run.
    Script(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::UnknownDriver(name) => write!(f, "Unknown driver: {name:?}"),
            AuthError::Object(err) => write!(f, "{err}"),
            AuthError::Forbidden(msg) => write!(f, "{msg}"),
            AuthError::ServiceOffline => write!(
                f,
                "The authorization server is currently offline, please try again later"
            ),
            AuthError::Config(msg) => write!(f, "{msg}"),
            AuthError::Request(msg) => write!(f, "{msg}"),
            AuthError::Backend(err) => write!(f, "{err}"),
            AuthError::SyncFailure(msg) => write!(f, "Failed OpenFGA resource sync: {msg}"),
            AuthError::Script(msg) => {
                write!(f, "Authorization scriptlet execution failed with error: {msg}")
            }
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Object(err) => Some(err),
            AuthError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ObjectError> for AuthError {
    fn from(err: ObjectError) -> Self {
        AuthError::Object(err)
    }
}

impl From<OpenFgaError> for AuthError {
    fn from(err: OpenFgaError) -> Self {
        match err {
            OpenFgaError::InvalidConfig(msg) => AuthError::Config(msg),
            other => AuthError::Backend(other),
        }
    }
}

impl AuthError {
    /// Shorthand for a [`AuthError::Forbidden`] with the given reason.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        AuthError::Forbidden(msg.into())
    }

    /// HTTP status this error maps to at the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Forbidden(_) | AuthError::ServiceOffline => StatusCode::FORBIDDEN,
            AuthError::Object(_) | AuthError::Request(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is a policy denial.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::Forbidden(_))
    }

    /// Whether the relationship store could not be consulted.
    pub fn is_offline(&self) -> bool {
        matches!(self, AuthError::ServiceOffline)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), axum::Json(body)).into_response()
    }
}
