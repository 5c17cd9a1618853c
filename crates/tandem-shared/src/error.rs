use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::UserId;

/// Errors surfaced to a live connection as `error` events.
///
/// Each variant maps to exactly one wire-level [`ErrorReason`]; the display
/// string becomes the human-readable `detail` field.
#[derive(Error, Debug)]
pub enum RelayError {
    /// An application event arrived before the connection authenticated.
    #[error("connection is not authenticated")]
    Unauthenticated,

    /// The relationship gate denied a send.
    #[error("not authorized to message user {0}")]
    Unauthorized(UserId),

    /// A referenced identity or record does not exist (or is deactivated).
    #[error("not found: {0}")]
    NotFound(String),

    /// The durable backend rejected or failed an operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The inbound frame violated the event schema.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

impl RelayError {
    /// The machine-readable reason carried on the wire.
    pub fn reason(&self) -> ErrorReason {
        match self {
            RelayError::Unauthenticated => ErrorReason::Unauthenticated,
            RelayError::Unauthorized(_) => ErrorReason::Unauthorized,
            RelayError::NotFound(_) => ErrorReason::NotFound,
            RelayError::StoreUnavailable(_) => ErrorReason::StoreUnavailable,
            RelayError::MalformedEvent(_) => ErrorReason::MalformedEvent,
        }
    }
}

/// Wire-level error discriminant for `error` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    Unauthenticated,
    Unauthorized,
    NotFound,
    StoreUnavailable,
    MalformedEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_mapping() {
        assert_eq!(
            RelayError::Unauthenticated.reason(),
            ErrorReason::Unauthenticated
        );
        assert_eq!(
            RelayError::Unauthorized(UserId(4)).reason(),
            ErrorReason::Unauthorized
        );
        assert_eq!(
            RelayError::StoreUnavailable("disk full".into()).reason(),
            ErrorReason::StoreUnavailable
        );
    }

    #[test]
    fn reason_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorReason::MalformedEvent).unwrap();
        assert_eq!(json, "\"malformed_event\"");
    }
}
