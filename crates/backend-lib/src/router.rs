// ============================
// mafia-backend-lib/src/router.rs
// ============================
//! Top-level router: REST API plus both realtime endpoints.
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{api, chat_channel, game_channel, AppState};

/// Create the application router.
///
/// `/ws` is the game channel, `/chat` the authenticated chat channel,
/// `/api` the CRUD layer. The CORS origin follows the deployment flavor;
/// credentialed requests are allowed from that single origin.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static(
            state.settings.deployment.allowed_origin(),
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(index))
        .route("/ws", get(game_channel::ws_handler))
        .route("/chat", get(chat_channel::ws_handler))
        .nest("/api", api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn index() -> &'static str {
    "hello world, it's a mafia!"
}
