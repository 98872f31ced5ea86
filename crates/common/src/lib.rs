// ============================
// mafia-common/src/lib.rs
// ============================
//! Wire and record types shared between the backend library and binary.
//!
//! Socket events are JSON text frames discriminated by an `event` tag;
//! chat transcript entries are discriminated by a `type` tag. The field
//! spellings (`userID`, `gameID`, `newchat`, ...) are part of the client
//! protocol and must not drift.

use serde::{Deserialize, Serialize};

/// One entry in a chat room transcript.
///
/// Entries are immutable once appended; insertion order is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEntry {
    Notice { text: String },
    Message { sender: String, text: String },
}

impl ChatEntry {
    pub fn notice(text: impl Into<String>) -> Self {
        ChatEntry::Notice { text: text.into() }
    }

    pub fn message(sender: impl Into<String>, text: impl Into<String>) -> Self {
        ChatEntry::Message {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

/// Client-to-server events on the default (game) socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameClientEvent {
    Join {
        #[serde(rename = "userID")]
        user_id: String,
        #[serde(rename = "gameID")]
        game_id: String,
    },
    UpdateStage {
        id: String,
        stage: String,
    },
}

/// Server-to-client events on the default (game) socket.
///
/// These carry no payload: `fetchGame` and `fetchAll` instruct clients to
/// re-pull authoritative state from the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameServerEvent {
    Connect,
    FetchGame,
    FetchAll,
}

/// Client-to-server events on the `/chat` socket.
///
/// `authenticate` must be the first frame on the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ChatClientEvent {
    Authenticate { token: String },
    Room { room: String },
    Message { room: String, text: String },
}

/// Server-to-client events on the `/chat` socket.
///
/// `newchat` always carries the room's full transcript, not a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ChatServerEvent {
    #[serde(rename = "newchat")]
    NewChat { entries: Vec<ChatEntry> },
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A game session. `stage` is an opaque client-driven label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub players: Vec<String>,
    pub stage: String,
}

/// A player: one user's seat in one game, with an assigned role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub user: String,
    pub game: String,
    pub name: String,
    pub role: String,
    /// Alive flag; players start alive.
    pub status: bool,
}
