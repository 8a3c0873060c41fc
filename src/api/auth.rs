use axum::{
    body::Bytes,
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Extension, Router,
};
use bcrypt::verify;
use chrono::{Duration, Utc};
use headers::{Cookie, HeaderMapExt};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::config::Config;
use crate::db::models::user::{Role, User, UserRow};
use crate::db::queries::user::{fetch_user_by_email, fetch_user_by_id, revoke_token};
use crate::middleware::auth::CurrentUser;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::Json;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
const INVALID_TOKEN: &str = "Invalid or expired token.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims used for authentication.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject - User ID as String
    pub sub: String,
    pub email: String,
    /// Role at the time the token was issued; handlers use the live role instead.
    pub role: Role,
    pub token_type: TokenType,
    /// Unique token id, used to revoke refresh tokens
    pub jti: String,
    pub iat: usize,
    /// Expiration timestamp (UNIX TIME)
    pub exp: usize,
}

impl Claims {
    /// Converts `sub` (user ID) to `i32`, or returns a descriptive error.
    pub fn user_id(&self) -> Result<i32, AppError> {
        self.sub
            .parse::<i32>()
            .map_err(|_| AppError::Unauthorized("Invalid user ID format in token".to_string()))
    }

    pub fn jti(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.jti)
            .map_err(|_| AppError::Unauthorized("Invalid token id".to_string()))
    }

    pub fn expires_at(&self) -> chrono::DateTime<Utc> {
        chrono::DateTime::from_timestamp(self.exp as i64, 0).unwrap_or_else(Utc::now)
    }
}

fn token_lifetime(config: &Config, token_type: TokenType) -> Duration {
    match token_type {
        TokenType::Access => Duration::minutes(config.access_token_ttl_minutes),
        TokenType::Refresh => Duration::days(config.refresh_token_ttl_days),
    }
}

/// Sign a token of `token_type` for `user`.
pub fn issue_token(
    config: &Config,
    user_id: i32,
    email: &str,
    role: Role,
    token_type: TokenType,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role,
        token_type,
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp() as usize,
        exp: (now + token_lifetime(config, token_type)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verify signature and expiry, and that the token is of the expected type.
pub fn decode_token(config: &Config, token: &str, expected: TokenType) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("Token rejected: {}", e);
        AppError::Unauthorized(INVALID_TOKEN.to_string())
    })?;

    if data.claims.token_type != expected {
        return Err(AppError::Unauthorized("Token has wrong type".to_string()));
    }
    Ok(data.claims)
}

fn auth_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn expired_cookie(name: &str) -> String {
    format!("{name}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax")
}

/// Represents a request to log in
#[derive(Serialize, Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of login and refresh responses; tokens are also set as HttpOnly cookies.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct AuthPayload {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh token may be sent in the body by clients that cannot use cookies.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct Capabilities {
    pub can_create: bool,
    pub can_approve: bool,
    pub can_manage_users: bool,
}

impl Capabilities {
    pub fn for_role(role: Role) -> Self {
        Capabilities {
            can_create: role.can_author(),
            can_approve: role.can_approve(),
            can_manage_users: role.is_admin(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub capabilities: Capabilities,
}

type CookieHeaders = AppendHeaders<[(axum::http::HeaderName, String); 2]>;

fn issue_session(config: &Config, row: UserRow) -> AppResult<(CookieHeaders, AuthPayload)> {
    let access_token = issue_token(config, row.id, &row.email, row.role, TokenType::Access)?;
    let refresh_token = issue_token(config, row.id, &row.email, row.role, TokenType::Refresh)?;

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            auth_cookie(
                ACCESS_COOKIE,
                &access_token,
                token_lifetime(config, TokenType::Access).num_seconds(),
                config.cookie_secure,
            ),
        ),
        (
            SET_COOKIE,
            auth_cookie(
                REFRESH_COOKIE,
                &refresh_token,
                token_lifetime(config, TokenType::Refresh).num_seconds(),
                config.cookie_secure,
            ),
        ),
    ]);

    Ok((
        cookies,
        AuthPayload {
            user: User::from(row),
            access_token,
            refresh_token,
        },
    ))
}

/// Refresh token from the cookie, or from a JSON body when no cookie is present.
fn refresh_token_from(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    headers
        .typed_get::<Cookie>()
        .and_then(|cookies| cookies.get(REFRESH_COOKIE).map(str::to_string))
        .or_else(|| {
            serde_json::from_slice::<RefreshRequest>(body)
                .ok()
                .and_then(|req| req.refresh_token)
        })
        .filter(|token| !token.is_empty())
}

/// Handles user login
///
/// # Returns
/// * `200 OK` - user, access and refresh tokens (also set as cookies).
/// * `401 Unauthorized` - If credentials are incorrect.
/// * `403 Forbidden` - If the account is deactivated.
#[utoipa::path(
    post,
    path = "/api/auth/login/",
    tag = "Authentication",
    request_body(
        content = LoginRequest,
        description = "User login details",
    ),
    responses(
        (status = 200, description = "Successful login", body = AuthPayload),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account deactivated"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let invalid = || AppError::Unauthorized("Invalid email or password.".to_string());

    let Some(user) = fetch_user_by_email(&state.pool, &payload.email).await? else {
        warn!("❌ Login attempt for non-existent user: {}", payload.email);
        return Err(invalid());
    };

    if !verify(&payload.password, &user.password_hash)? {
        warn!("❌ Invalid password attempt for user: {}", payload.email);
        return Err(invalid());
    }

    if !user.is_active {
        warn!("🔒 Login attempt for deactivated account: {}", payload.email);
        return Err(AppError::Forbidden(
            "This account has been deactivated.".to_string(),
        ));
    }

    let (cookies, body) = issue_session(&state.config, user)?;
    info!("✅ Login successful for user: {}", payload.email);
    Ok((cookies, ApiResponse::success(StatusCode::OK, "Login successful", body)))
}

/// Rotates the refresh token: the presented one is revoked and a new pair is issued.
#[utoipa::path(
    post,
    path = "/api/auth/refresh/",
    tag = "Authentication",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookie is sent"),
    responses(
        (status = 200, description = "Tokens rotated", body = AuthPayload),
        (status = 401, description = "Refresh token missing, invalid, expired or already used")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let raw = refresh_token_from(&headers, &body)
        .ok_or_else(|| AppError::Unauthorized("Refresh token not found.".to_string()))?;

    let claims = decode_token(&state.config, &raw, TokenType::Refresh)?;

    // Single use: only the request that records the jti gets new tokens.
    if !revoke_token(&state.pool, claims.jti()?, claims.expires_at()).await? {
        warn!("Reuse of revoked refresh token for user {}", claims.sub);
        return Err(AppError::Unauthorized("Token is blacklisted".to_string()));
    }

    let user = fetch_user_by_id(&state.pool, claims.user_id()?)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;

    let (cookies, body) = issue_session(&state.config, user)?;
    Ok((cookies, ApiResponse::success(StatusCode::OK, "Token refreshed", body)))
}

/// Revokes the refresh token (if any) and clears both auth cookies.
#[utoipa::path(
    post,
    path = "/api/auth/logout/",
    tag = "Authentication",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookie is sent"),
    responses(
        (status = 200, description = "Logged out successfully"),
        (status = 401, description = "Not authenticated")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    if let Some(raw) = refresh_token_from(&headers, &body) {
        // An already invalid token needs no revocation.
        if let Ok(claims) = decode_token(&state.config, &raw, TokenType::Refresh) {
            revoke_token(&state.pool, claims.jti()?, claims.expires_at()).await?;
        }
    }

    info!("User {} logged out", current_user.email);
    let cookies = AppendHeaders([
        (SET_COOKIE, expired_cookie(ACCESS_COOKIE)),
        (SET_COOKIE, expired_cookie(REFRESH_COOKIE)),
    ]);
    Ok((cookies, ApiResponse::success(StatusCode::OK, "Logged out successfully.", ())))
}

#[utoipa::path(
    get,
    path = "/api/auth/me/",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current authenticated user info", body = MeResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<ApiResponse<MeResponse>> {
    let row = fetch_user_by_id(&state.pool, current_user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Authenticated user info",
        MeResponse {
            capabilities: Capabilities::for_role(row.role),
            user: User::from(row),
        },
    ))
}

/// Public authentication routes.
///
/// # Routes
/// - `POST /api/auth/login/` → Authenticate and receive tokens.
/// - `POST /api/auth/refresh/` → Rotate the refresh token.
///
/// # Example Usage
/// ```sh
/// curl -X POST http://localhost:8000/api/auth/login/ -H "Content-Type: application/json" -d '{"email": "admin@acme.com", "password": "password123"}'
/// ```
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/refresh/", post(refresh))
}

/// Authentication routes that require a valid access token.
pub fn secure_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout/", post(logout))
        .route("/api/auth/me/", get(me))
}

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::openapi::Components;
use utoipa::Modify;
use utoipa::OpenApi;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.clone().unwrap_or(Components::default());

        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );

        openapi.components = Some(components);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(login, refresh, logout, me),
    components(
        schemas(LoginRequest, AuthPayload, RefreshRequest, MeResponse, Capabilities)
    ),
    tags(
        (name = "Authentication", description = "User Auth Endpoints")
    ),
    modifiers(&SecurityAddon)
)]
pub struct AuthDoc;
