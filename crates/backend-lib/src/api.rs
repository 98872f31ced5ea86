// ============================
// mafia-backend-lib/src/api.rs
// ============================
//! REST CRUD layer.
//!
//! Thin request/response handlers over the record store. Clients drive
//! all real state through here; the sockets only ever say "refetch".
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use mafia_common::{Game, Player, User};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, issue_token};
use crate::error::AppError;
use crate::records::RecordStore;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    #[serde(default)]
    pub players: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlayersRequest {
    pub id: String,
    pub players: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlayersRequest {
    #[serde(rename = "gameId")]
    pub game_id: String,
    #[serde(rename = "userIds")]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlayersQuery {
    pub game: String,
}

/// The `/api` routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/users", get(list_users))
        .route("/user/{id}", get(get_user))
        .route("/games", post(create_game).get(list_games).put(update_players))
        .route("/createplayers", post(create_players))
        .route("/players", get(list_players))
        .route("/players/{id}", get(get_player))
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "welcome to our mafia game api!" }))
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let hash = hash_password(&req.password)?;
    let user = state
        .records
        .create_user(&req.name, &req.email, &hash)
        .await?;
    let token = issue_token(&state.settings.auth_secret, &user.id)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .records
        .authenticate_user(&req.email, &req.password)
        .await?;
    let token = issue_token(&state.settings.auth_secret, &user.id)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.records.list_users().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.records.find_user_by_id(&id).await?))
}

async fn create_game(
    State(state): State<AppState>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<Game>, AppError> {
    Ok(Json(state.records.create_game(req.players).await?))
}

async fn list_games(State(state): State<AppState>) -> Result<Json<Vec<Game>>, AppError> {
    Ok(Json(state.records.list_games().await?))
}

async fn update_players(
    State(state): State<AppState>,
    Json(req): Json<UpdatePlayersRequest>,
) -> Result<Json<Game>, AppError> {
    Ok(Json(
        state
            .records
            .update_game_players(&req.id, req.players)
            .await?,
    ))
}

async fn create_players(
    State(state): State<AppState>,
    Json(req): Json<CreatePlayersRequest>,
) -> Result<Json<Vec<Player>>, AppError> {
    Ok(Json(
        state
            .records
            .create_players(&req.game_id, &req.user_ids)
            .await?,
    ))
}

async fn list_players(
    State(state): State<AppState>,
    Query(query): Query<PlayersQuery>,
) -> Result<Json<Vec<Player>>, AppError> {
    Ok(Json(state.records.players_in_game(&query.game).await?))
}

async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Player>, AppError> {
    Ok(Json(state.records.find_player(&id).await?))
}
