//! Connection registry and chat subscriber index.
//!
//! The two maps are exact inverses: a connection appears in a chat's
//! subscriber set iff that chat id appears in the connection's chat set.
//! Every mutation spans both maps inside a single critical section, so a
//! concurrent reader can never observe a half-applied register or
//! unregister.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Opaque handle for one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One entry of a fanout snapshot: enough to deliver without re-entering
/// the registry.
pub struct Subscriber {
    pub conn: ConnId,
    pub user_id: i32,
    pub tx: mpsc::UnboundedSender<ServerEvent>,
}

struct ConnEntry {
    user_id: i32,
    chats: HashSet<i32>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct Indexes {
    connections: HashMap<ConnId, ConnEntry>,
    subscribers: HashMap<i32, HashSet<ConnId>>,
}

/// Shared registry of all live chat connections.
pub struct ChatRegistry {
    inner: RwLock<Indexes>,
    next_id: AtomicU64,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indexes::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an authenticated connection and subscribe it to its chats.
    ///
    /// `tx` is the connection's outbound queue; fanout pushes events into it
    /// rather than writing to the socket directly.
    pub fn register(
        &self,
        user_id: i32,
        chats: HashSet<i32>,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnId {
        let conn = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.write();
        for &chat_id in &chats {
            inner.subscribers.entry(chat_id).or_default().insert(conn);
        }
        inner.connections.insert(conn, ConnEntry { user_id, chats, tx });
        conn
    }

    /// Remove a connection from both indexes. Idempotent: the disconnect and
    /// error paths may race to unregister the same connection.
    pub fn unregister(&self, conn: ConnId) {
        let mut inner = self.inner.write();
        let Some(entry) = inner.connections.remove(&conn) else {
            return;
        };
        for chat_id in entry.chats {
            if let Some(subs) = inner.subscribers.get_mut(&chat_id) {
                subs.remove(&conn);
                if subs.is_empty() {
                    inner.subscribers.remove(&chat_id);
                }
            }
        }
    }

    /// Whether the connection was subscribed to the chat at connect time.
    /// This is the authorization check for inbound frames.
    pub fn is_member(&self, conn: ConnId, chat_id: i32) -> bool {
        self.inner
            .read()
            .connections
            .get(&conn)
            .is_some_and(|e| e.chats.contains(&chat_id))
    }

    /// The chat ids a connection is subscribed to.
    pub fn chats_of(&self, conn: ConnId) -> Option<HashSet<i32>> {
        self.inner.read().connections.get(&conn).map(|e| e.chats.clone())
    }

    /// Snapshot of a chat's live subscribers. Delivery happens outside the
    /// lock; a connection that unregisters after the snapshot simply misses
    /// the event.
    pub fn subscribers_of(&self, chat_id: i32) -> Vec<Subscriber> {
        let inner = self.inner.read();
        let Some(subs) = inner.subscribers.get(&chat_id) else {
            return Vec::new();
        };
        subs.iter()
            .filter_map(|conn| {
                inner.connections.get(conn).map(|e| Subscriber {
                    conn: *conn,
                    user_id: e.user_id,
                    tx: e.tx.clone(),
                })
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }
}

impl Default for ChatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
