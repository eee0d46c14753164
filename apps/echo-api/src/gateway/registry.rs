//! Live connections, who they belong to, and which streams they listen on.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use echo_common::id::{prefix, prefixed_ulid};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use super::events::{Outbound, ServerFrame};

/// Close code sent to connections dropped by the idle sweep.
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;
/// Frames queued per connection before it is treated as a stalled reader.
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn generate() -> Self {
        Self(prefixed_ulid(prefix::CONNECTION))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who an authenticated connection speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedUser {
    pub user_id: String,
    pub username: String,
    pub avatar: String,
}

struct ConnectionEntry {
    tx: mpsc::Sender<Outbound>,
    user: Option<ConnectedUser>,
    last_activity: Instant,
    streams: HashSet<String>,
}

/// Recipients of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every authenticated connection.
    World,
    /// Connections subscribed to the named stream.
    Stream(String),
    /// The current connection of each listed identity.
    Users(Vec<String>),
}

/// Shared registry of gateway connections.
///
/// A connection is registered as soon as the socket opens and only starts
/// receiving broadcasts once promoted with an identity.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// Identity ID to its most recently authenticated connection.
    by_user: DashMap<String, ConnectionId>,
    streams: DashMap<String, HashSet<ConnectionId>>,
    /// Held for the whole of one fan-out so audiences see a single order.
    fanout: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tx: mpsc::Sender<Outbound>) -> ConnectionId {
        let id = ConnectionId::generate();
        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                tx,
                user: None,
                last_activity: Instant::now(),
                streams: HashSet::new(),
            },
        );
        id
    }

    /// Attach an identity. The identity's previous connection, if any, stays
    /// open but is no longer the one [`by_identity`](Self::by_identity) returns.
    pub fn promote(&self, id: &ConnectionId, user: ConnectedUser) -> bool {
        let previous = {
            let Some(mut entry) = self.connections.get_mut(id) else {
                return false;
            };
            entry.last_activity = Instant::now();
            entry.user.replace(user.clone())
        };

        if let Some(previous) = previous.filter(|p| p.user_id != user.user_id) {
            self.by_user.remove_if(&previous.user_id, |_, conn| conn == id);
        }
        self.by_user.insert(user.user_id, id.clone());
        true
    }

    /// Forget a connection and every stream subscription it holds.
    /// Returns false if it was already gone.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let Some((_, entry)) = self.connections.remove(id) else {
            return false;
        };

        for stream in &entry.streams {
            self.streams.remove_if_mut(stream, |_, members| {
                members.remove(id);
                members.is_empty()
            });
        }
        if let Some(user) = &entry.user {
            self.by_user.remove_if(&user.user_id, |_, conn| conn == id);
        }
        true
    }

    pub fn by_identity(&self, user_id: &str) -> Option<ConnectionId> {
        self.by_user.get(user_id).map(|c| c.value().clone())
    }

    pub fn identity(&self, id: &ConnectionId) -> Option<ConnectedUser> {
        self.connections.get(id).and_then(|e| e.user.clone())
    }

    /// Authenticated connections only.
    pub fn all(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|e| e.user.is_some())
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn join_stream(&self, name: &str, id: &ConnectionId) -> bool {
        // The entry guard blocks a concurrent `remove` until both sides agree.
        let Some(mut entry) = self.connections.get_mut(id) else {
            return false;
        };
        entry.streams.insert(name.to_string());
        self.streams
            .entry(name.to_string())
            .or_default()
            .insert(id.clone());
        true
    }

    pub fn leave_stream(&self, name: &str, id: &ConnectionId) -> bool {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.streams.remove(name);
        }
        let mut removed = false;
        self.streams.remove_if_mut(name, |_, members| {
            removed = members.remove(id);
            members.is_empty()
        });
        removed
    }

    pub fn subscribers(&self, name: &str) -> Vec<ConnectionId> {
        self.streams
            .get(name)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, name: &str, id: &ConnectionId) -> bool {
        self.streams
            .get(name)
            .is_some_and(|members| members.contains(id))
    }

    pub fn touch(&self, id: &ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Queue a frame for one connection. Returns false if it is gone.
    pub fn send(&self, id: &ConnectionId, frame: &ServerFrame) -> bool {
        self.send_raw(id, Outbound::Frame(frame.encode()))
    }

    /// A connection whose queue is full is dropped rather than waited on, so
    /// one slow reader never holds up a fan-out.
    fn send_raw(&self, id: &ConnectionId, outbound: Outbound) -> bool {
        let result = match self.connections.get(id) {
            Some(entry) => entry.tx.try_send(outbound),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "outbound queue full, dropping connection");
                self.remove(id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Deliver `frame` to every member of `audience`. Returns the recipient count.
    pub fn broadcast(&self, audience: &Audience, frame: &ServerFrame) -> usize {
        let text = frame.encode();
        let _order = self.fanout.lock();

        let recipients = match audience {
            Audience::World => self.all(),
            Audience::Stream(name) => self.subscribers(name),
            Audience::Users(user_ids) => {
                let mut seen = HashSet::new();
                user_ids
                    .iter()
                    .filter_map(|u| self.by_identity(u))
                    .filter(|c| seen.insert(c.clone()))
                    .collect()
            }
        };

        recipients
            .iter()
            .filter(|id| self.send_raw(id, Outbound::Frame(text.clone())))
            .count()
    }

    /// Close and drop connections idle for longer than `timeout`.
    pub fn sweep_idle(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.sweep_idle_at(Instant::now(), timeout)
    }

    pub fn sweep_idle_at(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        let idle: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|e| now.saturating_duration_since(e.last_activity) > timeout)
            .map(|e| e.key().clone())
            .collect();

        for id in &idle {
            self.send_raw(
                id,
                Outbound::Close {
                    code: CLOSE_IDLE_TIMEOUT,
                    reason: "Idle timeout",
                },
            );
            self.remove(id);
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
