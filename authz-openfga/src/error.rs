//! Error types for relationship store operations.

use std::fmt;

/// A single tuple operation that the store rejected during a
/// non-transactional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleFailure {
    /// `"write"` or `"delete"`.
    pub operation: &'static str,
    pub user: String,
    pub relation: String,
    pub object: String,
    pub message: String,
}

impl fmt::Display for TupleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.operation == "delete" {
            "delete tuple from"
        } else {
            "write tuple to"
        };
        write!(
            f,
            "Failed to {} OpenFGA store (user: {:?}; relation: {:?}; object: {:?}): {}",
            verb, self.user, self.relation, self.object, self.message
        )
    }
}

/// Errors that can occur when interacting with OpenFGA.
#[derive(Debug)]
pub enum OpenFgaError {
    /// Failed to connect to the OpenFGA server.
    ConnectionFailed(String),
    /// The OpenFGA server answered with a non-success status.
    ServerError { status: u16, message: String },
    /// The request timed out.
    Timeout,
    /// Invalid configuration.
    InvalidConfig(String),
    /// A response (or the built-in model) could not be decoded.
    Decode(String),
    /// The store holds a model written against another schema version.
    SchemaMismatch { existing: String, builtin: String },
    /// One or more tuples failed in a non-transactional write.
    TupleFailures(Vec<TupleFailure>),
}

impl fmt::Display for OpenFgaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenFgaError::ConnectionFailed(msg) => write!(f, "OpenFGA connection failed: {}", msg),
            OpenFgaError::ServerError { status, message } => {
                write!(f, "OpenFGA server error ({}): {}", status, message)
            }
            OpenFgaError::Timeout => write!(f, "OpenFGA request timed out"),
            OpenFgaError::InvalidConfig(msg) => write!(f, "Invalid OpenFGA config: {}", msg),
            OpenFgaError::Decode(msg) => write!(f, "Failed to decode OpenFGA payload: {}", msg),
            OpenFgaError::SchemaMismatch { existing, builtin } => write!(
                f,
                "Existing OpenFGA model has schema version {:?}, but our model has version {:?}",
                existing, builtin
            ),
            OpenFgaError::TupleFailures(failures) => match failures.as_slice() {
                [single] => write!(f, "{}", single),
                many => {
                    write!(f, "{} tuple operations failed:", many.len())?;
                    for failure in many {
                        write!(f, "\n  - {}", failure)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

impl std::error::Error for OpenFgaError {}

impl From<reqwest::Error> for OpenFgaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpenFgaError::Timeout
        } else if err.is_connect() {
            OpenFgaError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            OpenFgaError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            OpenFgaError::ServerError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            OpenFgaError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OpenFgaError {
    fn from(err: serde_json::Error) -> Self {
        OpenFgaError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(operation: &'static str, object: &str) -> TupleFailure {
        TupleFailure {
            operation,
            user: "server:incus".into(),
            relation: "server".into(),
            object: object.into(),
            message: "boom".into(),
        }
    }

    #[test]
    fn single_tuple_failure_is_reported_verbatim() {
        let err = OpenFgaError::TupleFailures(vec![failure("write", "certificate:fp1")]);
        assert_eq!(
            err.to_string(),
            "Failed to write tuple to OpenFGA store (user: \"server:incus\"; relation: \"server\"; object: \"certificate:fp1\"): boom"
        );
    }

    #[test]
    fn multiple_tuple_failures_are_aggregated() {
        let err = OpenFgaError::TupleFailures(vec![
            failure("write", "certificate:fp1"),
            failure("delete", "storage_pool:local"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 tuple operations failed:"));
        assert!(msg.contains("delete tuple from"));
        assert!(msg.contains("storage_pool:local"));
    }
}
