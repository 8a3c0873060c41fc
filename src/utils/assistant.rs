use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::models::product::PublicProduct;

/// How many approved products are handed to the model as context.
pub const CATALOG_CONTEXT_LIMIT: i64 = 20;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("OPENAI_API_KEY is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("upstream response contained no message")]
    EmptyResponse,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone, Debug)]
pub struct ChatAssistant {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize, Serialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl ChatAssistant {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Answer a shopper's question using only the given catalog.
    pub async fn reply(
        &self,
        user_message: &str,
        catalog: &[PublicProduct],
    ) -> Result<String, AssistantError> {
        let api_key = self.api_key.as_deref().ok_or(AssistantError::NotConfigured)?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(catalog) },
                { "role": "user", "content": user_message },
            ],
            "max_tokens": 400,
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Assistant upstream returned {}", status);
            return Err(AssistantError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let answer = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AssistantError::EmptyResponse)?;

        info!("Assistant answered with {} characters", answer.len());
        Ok(answer)
    }
}

pub fn system_prompt(catalog: &[PublicProduct]) -> String {
    let product_data = catalog
        .iter()
        .map(|p| {
            format!(
                "- {}: {} | Price: ${} | Business: {}",
                p.name, p.description, p.price, p.business_name
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a helpful product assistant for an e-commerce marketplace. \
         Answer questions about these approved products:\n\n{product_data}\n\n\
         Instructions:\n\
         - Be concise and friendly\n\
         - If asked about products not in the list, politely say they're not currently available\n\
         - When recommending products, mention the price and business name\n\
         - If asked about price ranges, filter and list matching products\n\
         - Keep responses under 200 words"
    )
}
