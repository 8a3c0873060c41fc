use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::info;

use crate::app_state::AppState;
use crate::db::models::chat::{ChatHistoryParams, ChatMessage, ChatRequest};
use crate::db::models::product::PublicProductFilterParams;
use crate::db::queries::public::fetch_public_products;
use crate::middleware::auth::optional_claims;
use crate::utils::api_response::ApiResponse;
use crate::utils::assistant::CATALOG_CONTEXT_LIMIT;
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::{Json, Query};

const HISTORY_LIMIT: i64 = 20;
const ANONYMOUS_SESSION: &str = "anonymous";

/// Ask the product assistant a question. Authentication is optional.
#[utoipa::path(
    post,
    path = "/api/chat/",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant answer", body = ChatMessage),
        (status = 400, description = "Message is required"),
        (status = 500, description = "AI service error")
    ),
    tag = "Chat"
)]
pub async fn post_chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> AppResult<ApiResponse<ChatMessage>> {
    let user_message = payload.message.trim();
    if user_message.is_empty() {
        return Err(AppError::BadRequest("Message is required".to_string()));
    }

    let user_id = match optional_claims(&headers, &state.config) {
        Some(claims) => Some(claims.user_id()?),
        None => None,
    };
    let session_id = payload
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_SESSION);

    let catalog = fetch_public_products(
        &state.pool,
        &PublicProductFilterParams::default(),
        Some(CATALOG_CONTEXT_LIMIT),
    )
    .await?;

    let ai_response = state.assistant.reply(user_message, &catalog).await?;

    let message = sqlx::query_as::<_, ChatMessage>(
        r#"
        INSERT INTO chat_messages (user_id, session_id, user_message, ai_response)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_message, ai_response, created_at
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(user_message)
    .bind(&ai_response)
    .fetch_one(&state.pool)
    .await?;

    info!("💬 Chat message {} answered (user: {:?})", message.id, user_id);
    Ok(ApiResponse::success(StatusCode::OK, "Chat response", message))
}

/// Last messages of the authenticated user, or of `session_id` for anonymous visitors.
#[utoipa::path(
    get,
    path = "/api/chat/history/",
    params(ChatHistoryParams),
    responses(
        (status = 200, description = "Chat history, newest first", body = [ChatMessage])
    ),
    tag = "Chat"
)]
pub async fn get_chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ChatHistoryParams>,
) -> AppResult<ApiResponse<Vec<ChatMessage>>> {
    let messages = if let Some(claims) = optional_claims(&headers, &state.config) {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, user_message, ai_response, created_at FROM chat_messages
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(claims.user_id()?)
        .bind(HISTORY_LIMIT)
        .fetch_all(&state.pool)
        .await?
    } else if let Some(session_id) = params
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ANONYMOUS_SESSION)
    {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, user_message, ai_response, created_at FROM chat_messages
            WHERE user_id IS NULL AND session_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(HISTORY_LIMIT)
        .fetch_all(&state.pool)
        .await?
    } else {
        Vec::new()
    };

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Chat history retrieved successfully",
        messages,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(post_chat_message, get_chat_history),
    components(schemas(ChatMessage, ChatRequest)),
    tags(
        (name = "Chat", description = "Product assistant")
    )
)]
pub struct ChatDoc;
