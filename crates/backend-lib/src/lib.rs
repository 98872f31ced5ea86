// ============================
// mafia-backend-lib/src/lib.rs
// ============================
//! Backend library for the mafia party-game server.
//!
//! The REST layer (`api`) owns all real state transitions through the
//! record store; the two realtime channels (`game_channel`,
//! `chat_channel`) only fan out refetch signals and chat transcripts to
//! socket-room members.

pub mod api;
pub mod auth;
pub mod chat_channel;
pub mod chat_store;
pub mod config;
pub mod error;
pub mod game_channel;
pub mod records;
pub mod rooms;
pub mod router;

use std::sync::Arc;

use mafia_common::{ChatServerEvent, GameServerEvent};

use crate::chat_store::ChatRoomStore;
use crate::config::Settings;
use crate::records::RecordStore;
use crate::rooms::RoomRegistry;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings manager
    pub settings: Arc<Settings>,
    /// Record persistence backend
    pub records: Arc<dyn RecordStore>,
    /// Per-room chat transcripts
    pub chat_store: Arc<ChatRoomStore>,
    /// Game socket-room membership
    pub game_rooms: Arc<RoomRegistry<GameServerEvent>>,
    /// Chat socket-room membership
    pub chat_rooms: Arc<RoomRegistry<ChatServerEvent>>,
}

impl AppState {
    /// Create a new application state
    pub fn new(records: Arc<dyn RecordStore>, settings: Settings) -> Self {
        AppState {
            settings: Arc::new(settings),
            records,
            chat_store: Arc::new(ChatRoomStore::new()),
            game_rooms: Arc::new(RoomRegistry::new()),
            chat_rooms: Arc::new(RoomRegistry::new()),
        }
    }
}
