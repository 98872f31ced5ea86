// ============================
// mafia-backend-lib/src/game_channel.rs
// ============================
//! Default-namespace realtime game channel, served at `GET /ws`.
//!
//! This channel carries no game state. Its only job is fan-out of
//! payload-less refetch signals: whenever a participant joins, changes
//! the stage, or drops, every socket in that game's room is told to
//! re-pull authoritative state from the REST API.
//!
//! Failures from the record store are logged and dropped; no error is
//! surfaced to the emitting client. The visible symptom is that the
//! expected refetch signal never arrives.
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use mafia_common::{GameClientEvent, GameServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::records::RecordStore;
use crate::rooms::RoomRegistry;
use crate::AppState;

/// Per-connection state on the game socket.
///
/// `user_id`/`game_id` are populated by the `join` event and consumed on
/// disconnect. A connection is in at most one game room at a time.
pub struct GameConnection {
    pub id: Uuid,
    user_id: Option<String>,
    game_id: Option<String>,
}

impl GameConnection {
    pub fn new() -> Self {
        GameConnection {
            id: Uuid::new_v4(),
            user_id: None,
            game_id: None,
        }
    }
}

impl Default for GameConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Event handlers for the game channel, shared across connections.
pub struct GameChannel {
    rooms: Arc<RoomRegistry<GameServerEvent>>,
    records: Arc<dyn RecordStore>,
}

impl GameChannel {
    pub fn new(rooms: Arc<RoomRegistry<GameServerEvent>>, records: Arc<dyn RecordStore>) -> Self {
        GameChannel { rooms, records }
    }

    /// Associate the connection with a user and game, join the game's
    /// room, and tell every member (the joiner included) to refetch.
    pub async fn handle_join(
        &self,
        conn: &mut GameConnection,
        tx: mpsc::Sender<GameServerEvent>,
        user_id: String,
        game_id: String,
    ) {
        tracing::info!(user = %user_id, game = %game_id, "connection joined game room");

        conn.user_id = Some(user_id);
        if let Some(previous) = conn.game_id.replace(game_id.clone()) {
            // at most one game room per connection
            self.rooms.leave(&previous, conn.id);
        }

        self.rooms.join(&game_id, conn.id, tx);
        self.rooms.broadcast(&game_id, GameServerEvent::FetchGame).await;
    }

    /// Persist a stage change, then tell the game's room to refetch.
    /// On persistence failure: log and drop, no retry.
    pub async fn handle_update_stage(&self, game_id: &str, stage: &str) {
        match self.records.update_game_stage(game_id, stage).await {
            Ok(_) => {
                self.rooms.broadcast(game_id, GameServerEvent::FetchAll).await;
            },
            Err(err) => {
                tracing::error!(game = %game_id, %stage, %err, "stage update failed, dropping refetch signal");
            },
        }
    }

    /// Remove the tracked player record and tell the remaining room
    /// members to refetch. On persistence failure: log and drop.
    pub async fn handle_disconnect(&self, conn: &GameConnection) {
        let (Some(game_id), Some(user_id)) = (&conn.game_id, &conn.user_id) else {
            // never joined a game
            return;
        };

        self.rooms.leave(game_id, conn.id);

        match self.records.remove_player(game_id, user_id).await {
            Ok(()) => {
                self.rooms.broadcast(game_id, GameServerEvent::FetchAll).await;
            },
            Err(err) => {
                tracing::error!(game = %game_id, user = %user_id, %err, "player removal failed, dropping refetch signal");
            },
        }
    }
}

/// Handler for game WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Channel carrying server events destined for this client
    let (tx, mut rx) = mpsc::channel::<GameServerEvent>(32);

    let channel = GameChannel::new(state.game_rooms.clone(), state.records.clone());
    let mut conn = GameConnection::new();

    // Forward room broadcasts to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(%err, "failed to serialize game event");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Immediate acknowledgment to the new socket
    if tx.send(GameServerEvent::Connect).await.is_err() {
        send_task.abort();
        return;
    }

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<GameClientEvent>(&text) {
                Ok(GameClientEvent::Join { user_id, game_id }) => {
                    channel
                        .handle_join(&mut conn, tx.clone(), user_id, game_id)
                        .await;
                },
                Ok(GameClientEvent::UpdateStage { id, stage }) => {
                    channel.handle_update_stage(&id, &stage).await;
                },
                Err(err) => {
                    tracing::warn!(%err, "ignoring malformed game event");
                },
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    channel.handle_disconnect(&conn).await;
    send_task.abort();
}
