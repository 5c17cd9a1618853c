//! The relay engine: per-connection protocol state machine, the
//! validate -> authorize -> persist -> confirm -> fan-out pipeline, and the
//! secondary relationship notifications.
//!
//! Each live connection has exactly one [`Session`]; its worker feeds
//! decoded [`ClientEvent`]s through [`RelayEngine::handle_event`] in arrival
//! order, so per-connection ordering needs no extra machinery. The engine
//! owns the registry and never emits a delivery event for a message that
//! has not durably persisted.

use tokio::sync::mpsc;
use uuid::Uuid;

use tandem_shared::protocol::{ClientEvent, ServerEvent};
use tandem_shared::types::{ConnectionRecord, UserId, UserProfile};
use tandem_shared::RelayError;
use tandem_store::StoreError;

use crate::authorizer::RelationshipAuthorizer;
use crate::db::SharedDb;
use crate::registry::{ConnHandle, ConnId, ConnectionRegistry};

/// How a persistence side effect's failure propagates.
///
/// Attached explicitly to each operation instead of being an accident of
/// error-handling placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failure aborts the operation and is reported to the initiator.
    MustSucceed,
    /// Failure is logged; the operation reports completion anyway.
    BestEffort,
}

impl FailurePolicy {
    /// Apply the policy to a store result. `BestEffort` swallows the error
    /// into a log line and yields `None`.
    pub fn absorb<T>(
        self,
        result: Result<T, StoreError>,
        op: &str,
    ) -> Result<Option<T>, StoreError> {
        match (self, result) {
            (_, Ok(v)) => Ok(Some(v)),
            (FailurePolicy::MustSucceed, Err(e)) => Err(e),
            (FailurePolicy::BestEffort, Err(e)) => {
                tracing::warn!(op, error = %e, "best-effort operation failed");
                Ok(None)
            }
        }
    }
}

/// Per-connection protocol state: `Connected` (no identity yet) ->
/// `Authenticated` (identity set) -> closed when the transport drops.
pub struct Session {
    pub conn_id: ConnId,
    tx: mpsc::UnboundedSender<ServerEvent>,
    identity: Option<UserId>,
}

impl Session {
    /// A fresh, unauthenticated session around the connection's event
    /// channel.
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            tx,
            identity: None,
        }
    }

    /// The identity this connection authenticated as, if any.
    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    fn handle(&self) -> ConnHandle {
        ConnHandle::new(self.conn_id, self.tx.clone())
    }

    /// Push an event to this connection only. A closed channel means the
    /// connection is mid-teardown; nothing to do.
    fn push(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    /// Report an error to this connection only (used by the transport
    /// layer for frames that fail to decode).
    pub(crate) fn push_error(&self, err: &RelayError) {
        self.push(ServerEvent::from_error(err));
    }
}

/// The orchestrator for all live-connection traffic.
pub struct RelayEngine {
    db: SharedDb,
    registry: ConnectionRegistry,
    authorizer: RelationshipAuthorizer,
    max_message_bytes: usize,
}

impl RelayEngine {
    pub fn new(db: SharedDb, max_message_bytes: usize) -> Self {
        Self {
            authorizer: RelationshipAuthorizer::new(db.clone()),
            db,
            registry: ConnectionRegistry::new(),
            max_message_bytes,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Dispatch one inbound event for a session. Errors are reported to the
    /// offending connection only and never tear it down.
    pub async fn handle_event(&self, session: &mut Session, event: ClientEvent) {
        let result = match event {
            ClientEvent::Auth { user_id } => self.handle_auth(session, user_id).await,
            ClientEvent::SendMessage { receiver_id, body } => {
                self.handle_send(session, receiver_id, body).await
            }
            ClientEvent::MarkRead { counterparty_id } => {
                self.handle_mark_read(session, counterparty_id).await
            }
        };

        if let Err(err) = result {
            session.push_error(&err);
        }
    }

    /// Transport closed: release the session's registry entry. No further
    /// events are possible for this connection.
    pub async fn disconnect(&self, session: &Session) {
        if let Some(identity) = session.identity {
            self.registry.deregister(identity, session.conn_id).await;
        }
    }

    async fn handle_auth(&self, session: &mut Session, user_id: UserId) -> Result<(), RelayError> {
        if session.identity.is_some() {
            return Err(RelayError::MalformedEvent(
                "connection is already authenticated".into(),
            ));
        }
        if !user_id.is_valid() {
            return Err(RelayError::MalformedEvent(format!(
                "invalid user id: {user_id}"
            )));
        }

        let profile = self.lookup_user(user_id).await?;
        if !profile.active {
            // Deactivated accounts are filtered from presence entirely.
            return Err(RelayError::NotFound(format!(
                "user {user_id} is deactivated"
            )));
        }

        self.registry.register(user_id, session.handle()).await;
        session.identity = Some(user_id);

        tracing::info!(user = %user_id, conn = %session.conn_id, "connection authenticated");
        session.push(ServerEvent::AuthAck { user_id });
        Ok(())
    }

    async fn handle_send(
        &self,
        session: &Session,
        receiver_id: UserId,
        body: String,
    ) -> Result<(), RelayError> {
        let sender_id = session.identity.ok_or(RelayError::Unauthenticated)?;

        if !receiver_id.is_valid() {
            return Err(RelayError::MalformedEvent(format!(
                "invalid receiver id: {receiver_id}"
            )));
        }
        if receiver_id == sender_id {
            return Err(RelayError::MalformedEvent(
                "sender and receiver must be distinct".into(),
            ));
        }
        if body.is_empty() {
            return Err(RelayError::MalformedEvent("empty message body".into()));
        }
        if body.len() > self.max_message_bytes {
            return Err(RelayError::MalformedEvent(format!(
                "message body exceeds {} bytes",
                self.max_message_bytes
            )));
        }

        // Authorization gate: always before persistence, never after.
        let allowed = self
            .authorizer
            .can_message(sender_id, receiver_id)
            .await
            .map_err(store_unavailable)?;
        if !allowed {
            return Err(RelayError::Unauthorized(receiver_id));
        }

        // Persist, and grab the sender's summary for event decoration while
        // we hold the store.
        let (message, sender_summary) = {
            let db = self.db.lock().await;
            let summary = db.get_user(sender_id).map_err(store_unavailable)?.summary();
            let message = db
                .append_message(sender_id, receiver_id, &body)
                .map_err(store_unavailable)?;
            (message, summary)
        };

        // The message is durable; confirm to the sender first, then fan out.
        session.push(ServerEvent::MessageSent {
            message: message.clone(),
        });

        self.fan_out(
            receiver_id,
            ServerEvent::NewMessage {
                message,
                sender: sender_summary,
            },
        )
        .await;

        Ok(())
    }

    async fn handle_mark_read(
        &self,
        session: &Session,
        counterparty_id: UserId,
    ) -> Result<(), RelayError> {
        let identity = session.identity.ok_or(RelayError::Unauthenticated)?;

        if !counterparty_id.is_valid() {
            return Err(RelayError::MalformedEvent(format!(
                "invalid counterparty id: {counterparty_id}"
            )));
        }

        {
            let db = self.db.lock().await;
            FailurePolicy::MustSucceed
                .absorb(db.mark_read(counterparty_id, identity), "mark_read")
                .map_err(store_unavailable)?;
        }

        // Ack goes to the requesting connection only; no cross-party
        // broadcast for read receipts.
        session.push(ServerEvent::MessagesMarkedRead { counterparty_id });
        Ok(())
    }

    // -------------------------------------------------------------------
    // Secondary notifications
    //
    // The state change is persisted by the caller before any of these run;
    // if the counterparty is offline the notification is simply lost and
    // they observe the new state on their next read.
    // -------------------------------------------------------------------

    /// Push a freshly created connection request to the receiver.
    pub async fn notify_connection_request(&self, record: &ConnectionRecord) {
        let requester = match self.lookup_user(record.requester_id).await {
            Ok(profile) => profile.summary(),
            Err(err) => {
                tracing::warn!(error = %err, "skipping connection-request notification");
                return;
            }
        };

        self.fan_out(
            record.receiver_id,
            ServerEvent::ConnectionRequest {
                record: record.clone(),
                requester,
            },
        )
        .await;
    }

    /// Push an accepted/rejected status change to the party that did not
    /// perform it.
    pub async fn notify_connection_updated(&self, record: &ConnectionRecord, actor: UserId) {
        let recipient = record.counterparty_of(actor);
        self.fan_out(
            recipient,
            ServerEvent::ConnectionUpdated {
                record: record.clone(),
            },
        )
        .await;
    }

    /// Tell the counterparty that `cleared_by` wiped their shared
    /// conversation.
    pub async fn notify_conversation_cleared(&self, cleared_by: UserId, counterparty: UserId) {
        self.fan_out(
            counterparty,
            ServerEvent::ConversationCleared { with_id: cleared_by },
        )
        .await;
    }

    /// Deliver one event to every live connection of `user`. Handles that
    /// fail to accept are dead and get deregistered; this never blocks or
    /// fails the triggering operation.
    async fn fan_out(&self, user: UserId, event: ServerEvent) {
        let handles = self.registry.live_handles_for(user).await;
        for handle in handles {
            if !handle.send(event.clone()) {
                self.registry.deregister(user, handle.conn_id).await;
            }
        }
    }

    async fn lookup_user(&self, user_id: UserId) -> Result<UserProfile, RelayError> {
        let db = self.db.lock().await;
        match db.get_user(user_id) {
            Ok(profile) => Ok(profile),
            Err(StoreError::NotFound) => {
                Err(RelayError::NotFound(format!("unknown user {user_id}")))
            }
            Err(other) => Err(store_unavailable(other)),
        }
    }
}

fn store_unavailable(err: StoreError) -> RelayError {
    RelayError::StoreUnavailable(err.to_string())
}
