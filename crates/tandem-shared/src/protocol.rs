//! Wire protocol for the persistent connection.
//!
//! Events travel as JSON text frames. Both directions are closed tagged
//! enums decoded exactly once at the connection boundary, so an unknown or
//! ill-shaped `type` is rejected there and never reaches dispatch.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorReason, RelayError};
use crate::types::{ConnectionRecord, Message, UserId, UserSummary};

/// Events a client may send over a live connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Authenticate the connection under a claimed identity. Must be the
    /// first event; everything else is rejected until it succeeds.
    Auth { user_id: UserId },

    /// Relay a message to another identity.
    SendMessage { receiver_id: UserId, body: String },

    /// Mark everything the counterparty sent to us as read.
    MarkRead { counterparty_id: UserId },
}

/// Events the server pushes to a live connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authentication succeeded; the connection now belongs to `user_id`.
    AuthAck { user_id: UserId },

    /// An operation failed; reported only to the offending connection.
    Error { reason: ErrorReason, detail: String },

    /// Delivery confirmation to the sender, carrying the persisted message.
    MessageSent { message: Message },

    /// A new message for the recipient, decorated with sender metadata.
    NewMessage { message: Message, sender: UserSummary },

    /// Acknowledgement of a mark-read request.
    MessagesMarkedRead { counterparty_id: UserId },

    /// Someone requested a connection with the recipient.
    ConnectionRequest {
        record: ConnectionRecord,
        requester: UserSummary,
    },

    /// A connection record the recipient is party to changed status.
    ConnectionUpdated { record: ConnectionRecord },

    /// The counterparty cleared the shared conversation.
    ConversationCleared { with_id: UserId },
}

impl ClientEvent {
    /// Decode one inbound text frame.
    pub fn from_json(raw: &str) -> Result<Self, RelayError> {
        serde_json::from_str(raw).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }
}

impl ServerEvent {
    /// Encode for an outbound text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Build an `error` event from a relay error.
    pub fn from_error(err: &RelayError) -> Self {
        ServerEvent::Error {
            reason: err.reason(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_auth_event() {
        let ev = ClientEvent::from_json(r#"{"type":"auth","user_id":42}"#).unwrap();
        assert_eq!(ev, ClientEvent::Auth { user_id: UserId(42) });
    }

    #[test]
    fn decodes_send_message_event() {
        let ev =
            ClientEvent::from_json(r#"{"type":"send_message","receiver_id":2,"body":"hi"}"#)
                .unwrap();
        assert_eq!(
            ev,
            ClientEvent::SendMessage {
                receiver_id: UserId(2),
                body: "hi".to_string(),
            }
        );
    }

    #[test]
    fn rejects_unknown_event_type() {
        let err = ClientEvent::from_json(r#"{"type":"shrug"}"#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedEvent(_)));
    }

    #[test]
    fn rejects_missing_fields() {
        let err = ClientEvent::from_json(r#"{"type":"send_message","body":"hi"}"#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedEvent(_)));
    }

    #[test]
    fn server_event_carries_snake_case_tag() {
        let json = ServerEvent::MessagesMarkedRead {
            counterparty_id: UserId(7),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"messages_marked_read""#));
        assert!(json.contains(r#""counterparty_id":7"#));
    }

    #[test]
    fn error_event_from_relay_error() {
        let ev = ServerEvent::from_error(&RelayError::Unauthorized(UserId(9)));
        match ev {
            ServerEvent::Error { reason, detail } => {
                assert_eq!(reason, ErrorReason::Unauthorized);
                assert!(detail.contains('9'));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
