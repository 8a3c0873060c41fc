use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use headers::{Cookie, HeaderMapExt};
use moka::sync::Cache; // ✅ High-performance TTL Cache
use tracing::{debug, error, warn};

use crate::api::auth::{decode_token, Claims, TokenType, ACCESS_COOKIE};
use crate::app_state::AppState;
use crate::config::Config;
use crate::db::models::product::ProductStatus;
use crate::db::models::user::{Role, UserRow};
use crate::db::queries::user::fetch_user_by_id;
use crate::utils::error::AppError;
use crate::utils::permissions::{is_allowed, ProductAction};

/// ✅ **Current-user cache using `moka`**, keyed by user id
pub type UserCache = Arc<Cache<i32, CurrentUser>>;

/// ✅ **Initialize the `moka` Cache**
pub fn create_user_cache(ttl_secs: u64) -> UserCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs))
            .max_capacity(10_000)
            .build(),
    )
}

/// The authenticated caller, as loaded from the database (not from the token),
/// so role changes and deactivation take effect without waiting for token expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub business_id: Option<i32>,
    pub is_active: bool,
}

impl From<&UserRow> for CurrentUser {
    fn from(row: &UserRow) -> Self {
        CurrentUser {
            id: row.id,
            email: row.email.clone(),
            role: row.role,
            business_id: row.business_id,
            is_active: row.is_active,
        }
    }
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// ✅ **Check the permission matrix for a product in `status`**
    pub fn can(&self, status: ProductStatus, action: ProductAction) -> bool {
        is_allowed(self.role, status, action)
    }

    /// Role gate for `action`, before any product is looked at.
    pub fn require_role_for(&self, action: ProductAction) -> Result<(), AppError> {
        if action.role_allows(self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(action.role_denied_message().to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You must be an Admin to perform this action.".to_string(),
            ))
        }
    }

    /// Business every scoped query is filtered by.
    pub fn business_id(&self) -> Result<i32, AppError> {
        self.business_id.ok_or_else(|| {
            AppError::Forbidden("Your account is not attached to a business.".to_string())
        })
    }
}

/// Access token from the `access_token` cookie, falling back to `Authorization: Bearer`.
pub fn token_from_headers(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    if let Some(token) = headers
        .typed_get::<Cookie>()
        .and_then(|cookies| cookies.get(ACCESS_COOKIE).map(str::to_string))
    {
        return Ok(Some(token));
    }

    let Some(auth_header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let token_str = auth_header
        .to_str()
        .map_err(|_| AppError::BadRequest("Invalid Authorization header format".to_string()))?;

    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::BadRequest("Invalid token format (missing 'Bearer ' prefix)".to_string())
    })?;

    Ok(Some(token.to_string()))
}

/// Claims of a valid access token if the request carries one; never rejects.
pub fn optional_claims(headers: &HeaderMap, config: &Config) -> Option<Claims> {
    let token = token_from_headers(headers).ok().flatten()?;
    decode_token(config, &token, TokenType::Access).ok()
}

/// ✅ **JWT Middleware** (Handles Token Authentication)
pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = token_from_headers(req.headers())
        .map_err(IntoResponse::into_response)?
        .ok_or_else(|| {
            warn!("Request without credentials to {}", req.uri().path());
            AppError::Unauthorized("Authentication credentials were not provided.".to_string())
                .into_response()
        })?;

    let claims = decode_token(&state.config, &token, TokenType::Access).map_err(|e| {
        warn!("JWT decoding failed: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string()).into_response()
    })?;

    debug!("JWT decoded successfully for user {}", claims.sub);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// ✅ **Current-user middleware with `moka`**
///
/// Runs after [`jwt_middleware`]; resolves the token subject to a live, active user.
pub async fn current_user_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        error!("Missing JWT claims in request");
        AppError::Unauthorized("Missing JWT claims in request".to_string()).into_response()
    })?;

    let user_id = claims.user_id().map_err(IntoResponse::into_response)?;

    let current = match state.user_cache.get(&user_id) {
        Some(cached) => cached,
        None => {
            let row = fetch_user_by_id(&state.pool, user_id)
                .await
                .map_err(|e| AppError::Database(e).into_response())?
                .ok_or_else(|| {
                    AppError::Unauthorized("User not found".to_string()).into_response()
                })?;
            let current = CurrentUser::from(&row);
            state.user_cache.insert(user_id, current.clone());
            current
        }
    };

    if !current.is_active {
        warn!("🔒 Request from deactivated account: {}", current.email);
        return Err(
            AppError::Unauthorized("User account is disabled.".to_string()).into_response(),
        );
    }

    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}
