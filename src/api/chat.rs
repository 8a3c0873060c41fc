use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::chat::{get_chat_history, post_chat_message};

/// Chat routes accept anonymous visitors and pick up the user from a token when present.
pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat/", post(post_chat_message))
        .route("/api/chat/history/", get(get_chat_history))
}
