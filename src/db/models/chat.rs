use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, Deserialize, Debug, Clone, FromRow, ToSchema)]
pub struct ChatMessage {
    pub id: i32,
    pub user_message: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// Identifies anonymous visitors across requests
    pub session_id: Option<String>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
pub struct ChatHistoryParams {
    pub session_id: Option<String>,
}
