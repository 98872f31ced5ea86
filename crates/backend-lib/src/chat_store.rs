// ============================
// mafia-backend-lib/src/chat_store.rs
// ============================
//! In-memory chat transcripts, keyed by room name.
//!
//! Rooms live for the process lifetime and are never garbage collected,
//! even when no connection is joined (known resource-growth caveat).
//! Transcripts are append-only; snapshots are always the full history.
use dashmap::DashMap;
use mafia_common::ChatEntry;

/// Owned store of per-room chat transcripts.
///
/// Appends are atomic per room; the store holds no connection state and
/// does not know who is currently joined.
#[derive(Default)]
pub struct ChatRoomStore {
    rooms: DashMap<String, Vec<ChatEntry>>,
}

impl ChatRoomStore {
    pub fn new() -> Self {
        ChatRoomStore {
            rooms: DashMap::new(),
        }
    }

    /// Ensure a transcript exists for `room`. Idempotent: calling on an
    /// existing room never truncates its entries.
    pub fn init_chat(&self, room: &str) {
        self.rooms.entry(room.to_string()).or_default();
    }

    /// Append an entry to a room's transcript. An unknown room is
    /// auto-initialized first, so appends never silently vanish.
    pub fn add_to_chat(&self, room: &str, entry: ChatEntry) {
        self.rooms.entry(room.to_string()).or_default().push(entry);
    }

    /// Snapshot the full ordered transcript for `room`. Unknown rooms
    /// read as empty, not as an error.
    pub fn return_chat(&self, room: &str) -> Vec<ChatEntry> {
        self.rooms
            .get(room)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }
}
