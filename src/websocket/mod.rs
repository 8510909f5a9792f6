use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::websocket::message_types::ChatEvent;

pub mod handlers;
pub mod message_types;

pub type ConnectionId = Uuid;

struct Subscriber {
    id: ConnectionId,
    tx: UnboundedSender<ChatEvent>,
}

/// In-process delivery fabric: maps a session id to the connections
/// currently subscribed to it. Events published to a session are fanned out
/// to every live member, best-effort and at-most-once; per-session ordering
/// follows publish order. Nothing is buffered for absent members -
/// reconnecting clients recover through the cursor-based fetch.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to the session's delivery group and returns its
    /// handle plus the receiving end of its event stream.
    pub async fn join(&self, session_id: Uuid) -> (ConnectionId, UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = unbounded_channel();
        let id = Uuid::new_v4();
        let mut guard = self.inner.write().await;
        guard
            .entry(session_id)
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    /// Removes one subscriber. Runs on every disconnect path; empty groups
    /// are dropped so the map does not accumulate dead sessions.
    pub async fn leave(&self, session_id: Uuid, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&session_id) {
            list.retain(|s| s.id != connection_id);
            if list.is_empty() {
                guard.remove(&session_id);
            }
        }
    }

    /// Fans an event out to every current member of the session group,
    /// pruning subscribers whose receiving task has gone away.
    pub async fn publish(&self, session_id: Uuid, event: ChatEvent) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&session_id) {
            list.retain(|s| s.tx.send(event.clone()).is_ok());
            if list.is_empty() {
                guard.remove(&session_id);
            }
        }
    }

    pub async fn group_size(&self, session_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&session_id).map(|l| l.len()).unwrap_or(0)
    }
}
