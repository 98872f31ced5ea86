// ============================
// mafia-backend-lib/src/chat_channel.rs
// ============================
//! Authenticated chat channel, served at `GET /chat`.
//!
//! Per-connection state machine: unauthenticated -> authenticated ->
//! (room-joined)* -> disconnected. The first frame must be an
//! `authenticate` event carrying a token signed with the shared secret;
//! if none arrives within [`AUTH_TIMEOUT`] the connection is dropped
//! without ever becoming a room member.
//!
//! Every `newchat` broadcast carries the room's full transcript rather
//! than a delta. That trades bandwidth for simplicity: clients never
//! merge or reorder, they just replace. Acceptable for party-game room
//! sizes and session lengths.
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, Stream, StreamExt};
use mafia_common::{ChatClientEvent, ChatEntry, ChatServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::auth::validate_token;
use crate::chat_store::ChatRoomStore;
use crate::error::AppError;
use crate::records::RecordStore;
use crate::rooms::RoomRegistry;
use crate::AppState;

/// How long a new connection has to present a valid token. This is the
/// only timeout in the system.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(15);

/// An authenticated chat connection. Unlike the game socket, a chat
/// connection may be joined to any number of rooms.
#[derive(Debug)]
pub struct ChatConnection {
    pub id: Uuid,
    pub username: String,
    rooms: Vec<String>,
}

/// Event handlers for the chat channel, shared across connections.
pub struct ChatChannel {
    rooms: Arc<RoomRegistry<ChatServerEvent>>,
    store: Arc<ChatRoomStore>,
    records: Arc<dyn RecordStore>,
}

impl ChatChannel {
    pub fn new(
        rooms: Arc<RoomRegistry<ChatServerEvent>>,
        store: Arc<ChatRoomStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        ChatChannel {
            rooms,
            store,
            records,
        }
    }

    /// Validate the handshake token and resolve the subject's username.
    ///
    /// A token that validates but names an unknown user is an error: the
    /// caller closes the socket rather than leaving it connected with no
    /// usable identity.
    pub async fn authenticate(
        &self,
        secret: &str,
        token: &str,
    ) -> Result<ChatConnection, AppError> {
        let claims = validate_token(secret, token)?;
        let user = self.records.find_user_by_id(&claims.sub).await?;

        Ok(ChatConnection {
            id: Uuid::new_v4(),
            username: user.name,
            rooms: Vec::new(),
        })
    }

    /// Join a named room: record membership, append a join notice, and
    /// broadcast the full updated transcript to every room member.
    pub async fn handle_room(
        &self,
        conn: &mut ChatConnection,
        tx: mpsc::Sender<ChatServerEvent>,
        room: String,
    ) {
        tracing::info!(username = %conn.username, %room, "joined chat room");

        self.rooms.join(&room, conn.id, tx);
        if !conn.rooms.contains(&room) {
            conn.rooms.push(room.clone());
        }

        self.store.init_chat(&room);
        self.store.add_to_chat(
            &room,
            ChatEntry::notice(format!("{} joined chat.", conn.username)),
        );
        self.broadcast_transcript(&room).await;
    }

    /// Append a message and broadcast the full updated transcript.
    pub async fn handle_message(&self, conn: &ChatConnection, room: String, text: String) {
        tracing::debug!(username = %conn.username, %room, "message received");

        self.store
            .add_to_chat(&room, ChatEntry::message(conn.username.clone(), text));
        self.broadcast_transcript(&room).await;
    }

    /// Leave every joined room, appending a departure notice to each and
    /// broadcasting the updated transcript to the remaining members.
    pub async fn handle_disconnect(&self, conn: &ChatConnection) {
        tracing::info!(username = %conn.username, "left the chat");

        for room in &conn.rooms {
            self.rooms.leave(room, conn.id);
            self.store.add_to_chat(
                room,
                ChatEntry::notice(format!("{} has left the chat.", conn.username)),
            );
            self.broadcast_transcript(room).await;
        }
    }

    async fn broadcast_transcript(&self, room: &str) {
        let entries = self.store.return_chat(room);
        self.rooms
            .broadcast(room, ChatServerEvent::NewChat { entries })
            .await;
    }
}

/// Handler for chat WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let channel = ChatChannel::new(
        state.chat_rooms.clone(),
        state.chat_store.clone(),
        state.records.clone(),
    );

    // Handshake: first frame must be a valid authenticate event, within
    // the timeout window. Anything else closes the connection before it
    // becomes a member of anything.
    let token = match timeout(AUTH_TIMEOUT, first_token(&mut stream)).await {
        Ok(Some(token)) => token,
        Ok(None) => return,
        Err(_) => {
            let err = AppError::AuthTimeout;
            tracing::warn!(%err, "chat handshake timed out, closing connection");
            return;
        },
    };

    let mut conn = match channel
        .authenticate(&state.settings.auth_secret, &token)
        .await
    {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!(%err, "chat authentication failed, closing connection");
            return;
        },
    };

    tracing::info!(username = %conn.username, "authenticated and connected to chat");

    // Channel carrying transcript broadcasts destined for this client
    let (tx, mut rx) = mpsc::channel::<ChatServerEvent>(32);

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(%err, "failed to serialize chat event");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ChatClientEvent>(&text) {
                Ok(ChatClientEvent::Room { room }) => {
                    channel.handle_room(&mut conn, tx.clone(), room).await;
                },
                Ok(ChatClientEvent::Message { room, text }) => {
                    channel.handle_message(&conn, room, text).await;
                },
                Ok(ChatClientEvent::Authenticate { .. }) => {
                    // already authenticated; ignore
                },
                Err(err) => {
                    tracing::warn!(%err, "ignoring malformed chat event");
                },
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    channel.handle_disconnect(&conn).await;
    send_task.abort();
}

/// Wait for the handshake frame. Returns `None` if the stream ends or
/// the first text frame is not an authenticate event.
async fn first_token<S>(stream: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                return match serde_json::from_str::<ChatClientEvent>(&text) {
                    Ok(ChatClientEvent::Authenticate { token }) => Some(token),
                    _ => None,
                };
            },
            Message::Close(_) => return None,
            _ => {},
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, issue_token};
    use crate::records::MemoryRecords;
    use mafia_common::User;

    const SECRET: &str = "test-secret";

    async fn setup_with_users(names: &[&str]) -> (ChatChannel, Arc<RoomRegistry<ChatServerEvent>>, Vec<User>) {
        let rooms = Arc::new(RoomRegistry::new());
        let store = Arc::new(ChatRoomStore::new());
        let records = Arc::new(MemoryRecords::new());

        let mut users = Vec::new();
        let hash = hash_password("Password123!").unwrap();
        for name in names {
            let email = format!("{}@example.com", name.to_lowercase());
            users.push(records.create_user(name, &email, &hash).await.unwrap());
        }

        let channel = ChatChannel::new(rooms.clone(), store, records);
        (channel, rooms, users)
    }

    async fn authed(channel: &ChatChannel, user: &User) -> ChatConnection {
        let token = issue_token(SECRET, &user.id).unwrap();
        channel.authenticate(SECRET, &token).await.unwrap()
    }

    fn transcripts(rx: &mut mpsc::Receiver<ChatServerEvent>) -> Vec<Vec<ChatEntry>> {
        let mut all = Vec::new();
        while let Ok(ChatServerEvent::NewChat { entries }) = rx.try_recv() {
            all.push(entries);
        }
        all
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_times_out_unauthenticated() {
        // a client that never sends a frame: the handshake window elapses
        // and the connection closes without ever becoming a room member
        let (_channel, rooms, _) = setup_with_users(&[]).await;

        let mut stream = futures_util::stream::pending::<Result<Message, axum::Error>>();
        let handshake = timeout(AUTH_TIMEOUT, first_token(&mut stream)).await;
        assert!(handshake.is_err());
        assert_eq!(rooms.member_count("r1"), 0);
    }

    #[tokio::test]
    async fn test_first_frame_must_be_an_authenticate_event() {
        // non-text frames are skipped; the first text frame decides
        let frames: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Ping(Vec::new().into())),
            Ok(Message::Text(r#"{"event":"room","room":"r1"}"#.into())),
        ];
        let mut stream = futures_util::stream::iter(frames);
        assert_eq!(first_token(&mut stream).await, None);

        let frames: Vec<Result<Message, axum::Error>> = vec![Ok(Message::Text(
            r#"{"event":"authenticate","token":"abc"}"#.into(),
        ))];
        let mut stream = futures_util::stream::iter(frames);
        assert_eq!(first_token(&mut stream).await, Some("abc".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let (channel, rooms, _) = setup_with_users(&[]).await;
        let err = channel.authenticate(SECRET, "garbage").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
        // never authenticated, never a member
        assert_eq!(rooms.member_count("r1"), 0);
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let (channel, _, _) = setup_with_users(&[]).await;
        let token = issue_token(SECRET, "no-such-user").unwrap();
        let err = channel.authenticate(SECRET, &token).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_join_and_message_transcripts() {
        let (channel, _, users) = setup_with_users(&["Alice", "Bob"]).await;

        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        let mut alice = authed(&channel, &users[0]).await;
        let mut bob = authed(&channel, &users[1]).await;

        channel.handle_room(&mut alice, tx_a, "r1".to_string()).await;
        let broadcasts = transcripts(&mut rx_a);
        assert_eq!(
            broadcasts,
            vec![vec![ChatEntry::notice("Alice joined chat.")]]
        );

        channel.handle_room(&mut bob, tx_b, "r1".to_string()).await;
        // the next broadcast is the two-notice transcript, in join order
        let expected_after_bob = vec![
            ChatEntry::notice("Alice joined chat."),
            ChatEntry::notice("Bob joined chat."),
        ];
        assert_eq!(transcripts(&mut rx_a), vec![expected_after_bob.clone()]);
        assert_eq!(transcripts(&mut rx_b), vec![expected_after_bob]);

        channel
            .handle_message(&alice, "r1".to_string(), "hi".to_string())
            .await;
        let expected_after_message = vec![
            ChatEntry::notice("Alice joined chat."),
            ChatEntry::notice("Bob joined chat."),
            ChatEntry::message("Alice", "hi"),
        ];
        assert_eq!(transcripts(&mut rx_a), vec![expected_after_message.clone()]);
        assert_eq!(transcripts(&mut rx_b), vec![expected_after_message]);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_every_joined_room() {
        let (channel, rooms, users) = setup_with_users(&["Alice", "Bob"]).await;

        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        let mut alice = authed(&channel, &users[0]).await;
        let mut bob = authed(&channel, &users[1]).await;

        channel
            .handle_room(&mut alice, tx_a.clone(), "r1".to_string())
            .await;
        channel.handle_room(&mut alice, tx_a, "r2".to_string()).await;
        channel.handle_room(&mut bob, tx_b, "r1".to_string()).await;
        transcripts(&mut rx_a);
        transcripts(&mut rx_b);

        channel.handle_disconnect(&alice).await;

        // Alice is out of both rooms and receives nothing further
        assert!(transcripts(&mut rx_a).is_empty());
        assert_eq!(rooms.member_count("r1"), 1);
        assert_eq!(rooms.member_count("r2"), 0);

        // Bob sees exactly one updated r1 transcript ending in the notice
        let bob_broadcasts = transcripts(&mut rx_b);
        assert_eq!(bob_broadcasts.len(), 1);
        assert_eq!(
            bob_broadcasts[0].last().unwrap(),
            &ChatEntry::notice("Alice has left the chat.")
        );
    }

    #[tokio::test]
    async fn test_rejoining_same_room_tracks_it_once() {
        let (channel, _, users) = setup_with_users(&["Alice"]).await;

        let (tx, mut rx) = mpsc::channel(32);
        let mut alice = authed(&channel, &users[0]).await;
        channel
            .handle_room(&mut alice, tx.clone(), "r1".to_string())
            .await;
        channel.handle_room(&mut alice, tx, "r1".to_string()).await;
        transcripts(&mut rx);

        channel.handle_disconnect(&alice).await;

        // exactly one departure notice despite the double join
        let transcript = channel.store.return_chat("r1");
        let departures = transcript
            .iter()
            .filter(|e| matches!(e, ChatEntry::Notice { text } if text == "Alice has left the chat."))
            .count();
        assert_eq!(departures, 1);
    }

    #[tokio::test]
    async fn test_message_to_unjoined_room_still_appends() {
        let (channel, _, users) = setup_with_users(&["Alice", "Bob"]).await;

        let (tx_b, mut rx_b) = mpsc::channel(32);
        let alice = authed(&channel, &users[0]).await;
        let mut bob = authed(&channel, &users[1]).await;

        channel.handle_room(&mut bob, tx_b, "r1".to_string()).await;
        transcripts(&mut rx_b);

        // Alice never joined r1 but her message lands and fans out
        channel
            .handle_message(&alice, "r1".to_string(), "drive-by".to_string())
            .await;
        let broadcasts = transcripts(&mut rx_b);
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(
            broadcasts[0].last().unwrap(),
            &ChatEntry::message("Alice", "drive-by")
        );
    }
}
