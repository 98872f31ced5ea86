// ============================
// mafia-backend-lib/src/rooms.rs
// ============================
//! Explicit socket-room membership.
//!
//! Maps a room identifier to the set of live connection handles, so the
//! fan-out behavior is reproducible without a socket-library room
//! primitive. One registry instance exists per namespace (game, chat);
//! the event type they carry differs.
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Registry of rooms and their current member connections.
///
/// Members are keyed by connection id so a connection can be removed
/// without comparing sender handles. A member left behind by a dead
/// connection is skipped at broadcast time.
pub struct RoomRegistry<E> {
    rooms: DashMap<String, HashMap<Uuid, mpsc::Sender<E>>>,
}

impl<E: Clone + Send + 'static> RoomRegistry<E> {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room, creating the room if needed.
    pub fn join(&self, room: &str, conn: Uuid, tx: mpsc::Sender<E>) {
        self.rooms.entry(room.to_string()).or_default().insert(conn, tx);
    }

    /// Remove a connection from a room. Empty membership sets are dropped;
    /// this is independent of any chat transcript kept for the room.
    pub fn leave(&self, room: &str, conn: Uuid) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                drop(members);
                self.rooms.remove_if(room, |_, m| m.is_empty());
            }
        }
    }

    /// Number of connections currently joined to `room`.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    /// Send `event` to every current member of `room`, including the
    /// sender's own connection if it is joined.
    ///
    /// The member set is snapshotted before sending so the map is not
    /// held across an await. Sends to closed connections are logged and
    /// skipped; delivery is best effort.
    pub async fn broadcast(&self, room: &str, event: E) {
        let targets: Vec<(Uuid, mpsc::Sender<E>)> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .map(|(conn, tx)| (*conn, tx.clone()))
                .collect(),
            None => return,
        };

        for (conn, tx) in targets {
            if tx.send(event.clone()).await.is_err() {
                tracing::debug!(%room, %conn, "dropping broadcast to closed connection");
            }
        }
    }
}

impl<E: Clone + Send + 'static> Default for RoomRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
