use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::db::models::product::TransitionError;
use crate::utils::api_response::{field_errors, ApiResponse};
use crate::utils::assistant::AssistantError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    JsonBody(#[from] JsonRejection),
    #[error(transparent)]
    PathParams(#[from] PathRejection),
    #[error(transparent)]
    QueryParams(#[from] QueryRejection),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("AI service error: {0}")]
    Assistant(#[from] AssistantError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) | AppError::Transition(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::JsonBody(rejection) => rejection.status(),
            AppError::PathParams(rejection) => rejection.status(),
            AppError::QueryParams(rejection) => rejection.status(),
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_)
            | AppError::Token(_)
            | AppError::Hashing(_)
            | AppError::Assistant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when a database error is a unique-constraint violation.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == "23505")
            .unwrap_or(false)
    }
}

impl From<AppError> for ApiResponse<()> {
    fn from(err: AppError) -> Self {
        let status = err.status();
        match err {
            AppError::Validation(errors) => {
                ApiResponse::error(status, "Validation failed", Some(field_errors(&errors)))
            }
            AppError::JsonBody(ref rejection) => {
                warn!("Rejected request body: {}", rejection.body_text());
                ApiResponse::error(status, rejection.body_text(), None)
            }
            AppError::PathParams(ref rejection) => {
                ApiResponse::error(status, rejection.body_text(), None)
            }
            AppError::QueryParams(ref rejection) => {
                ApiResponse::error(status, rejection.body_text(), None)
            }
            AppError::Database(sqlx::Error::RowNotFound) => {
                ApiResponse::error(status, "Resource not found", None)
            }
            AppError::Database(ref e) => {
                error!("❌ Database error: {}", e);
                ApiResponse::error(status, "Database error", None)
            }
            AppError::Token(ref e) => {
                error!("❌ Token error: {}", e);
                ApiResponse::error(status, "Token generation failed", None)
            }
            AppError::Hashing(ref e) => {
                error!("❌ Password hashing error: {}", e);
                ApiResponse::error(status, "Password hashing failed", None)
            }
            AppError::Assistant(ref e) => {
                error!("❌ Assistant error: {}", e);
                ApiResponse::error(status, "AI service error", None)
            }
            other => ApiResponse::error(status, other.to_string(), None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::product::{ProductStatus, Transition};

    #[test]
    fn transition_errors_are_bad_requests() {
        let err: AppError = ProductStatus::Draft
            .apply(Transition::Approve)
            .unwrap_err()
            .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = ApiResponse::<()>::from(err);
        assert_eq!(
            body.message,
            "Only pending products can be approved. Current status: draft"
        );
    }

    #[test]
    fn database_details_are_not_leaked() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiResponse::<()>::from(err);
        assert_eq!(body.message, "Database error");
        assert!(body.errors.is_none());
    }

    #[test]
    fn upstream_assistant_body_is_not_leaked() {
        let err = AppError::Assistant(AssistantError::Upstream {
            status: 401,
            body: "Incorrect API key provided: sk-live-1234".to_string(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_string(&ApiResponse::<()>::from(err)).unwrap();
        assert!(body.contains("AI service error"));
        assert!(!body.contains("sk-live"));
        assert!(!body.contains("errors"));
    }

    #[test]
    fn validation_errors_carry_field_messages() {
        use validator::Validate;

        let product: crate::db::models::product::NewProduct =
            serde_json::from_str(r#"{"name": "", "price": "5.00"}"#).unwrap();
        let body = ApiResponse::<()>::from(AppError::from(product.validate().unwrap_err()));
        assert_eq!(body.status_code, 400);
        let errors = body.errors.expect("field errors");
        assert_eq!(errors["name"], vec!["Name must be 1-255 characters."]);
    }

    #[test]
    fn not_found_message() {
        let body = ApiResponse::<()>::from(AppError::NotFound("Product"));
        assert_eq!(body.status_code, 404);
        assert_eq!(body.message, "Product not found");
    }
}
