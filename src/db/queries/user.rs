use axum::{extract::State, http::StatusCode, Extension};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::models::user::{
    normalize_email, ChangePassword, NewUser, Role, UpdateUser, User, UserRow,
};
use crate::middleware::auth::CurrentUser;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::{Json, Path};

const USER_SELECT: &str = r#"
    SELECT u.id, u.email, u.password_hash, u.first_name, u.last_name, u.role,
           u.business_id, u.is_active, u.date_joined,
           b.name AS business_name, b.email AS business_email, b.created_at AS business_created_at
    FROM users u
    LEFT JOIN businesses b ON b.id = u.business_id
"#;

// Lookup helpers shared with auth and middleware

pub async fn fetch_user_by_id(pool: &PgPool, id: i32) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE LOWER(u.email) = $1"))
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
}

/// Users by id, for embedding `created_by` / `approved_by` in product responses.
pub async fn fetch_users_by_ids(pool: &PgPool, ids: &[i32]) -> Result<Vec<UserRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

async fn fetch_business_user(pool: &PgPool, id: i32, business_id: i32) -> AppResult<UserRow> {
    sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = $1 AND u.business_id = $2"))
        .bind(id)
        .bind(business_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Records a token id as revoked. Returns `false` if it was already revoked.
pub async fn revoke_token(
    pool: &PgPool,
    jti: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO revoked_tokens (jti, expires_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING",
    )
    .bind(jti)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Drops revocation records whose tokens would be rejected as expired anyway.
pub async fn purge_expired_revocations(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// API Handlers

#[utoipa::path(
    get,
    path = "/api/users/",
    responses(
        (status = 200, description = "List users of the caller's business", body = [User]),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_all_users(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<ApiResponse<Vec<User>>> {
    current_user.require_admin()?;
    let business_id = current_user.business_id()?;

    let users = sqlx::query_as::<_, UserRow>(&format!(
        "{USER_SELECT} WHERE u.business_id = $1 ORDER BY u.date_joined"
    ))
    .bind(business_id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Users retrieved successfully",
        users.into_iter().map(User::from).collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/users/",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created in the caller's business", body = User),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_user(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<NewUser>,
) -> AppResult<ApiResponse<User>> {
    current_user.require_admin()?;
    let business_id = current_user.business_id()?;
    payload.validate()?;

    let password_hash = hash(&payload.password, DEFAULT_COST)?;
    let role = payload.role.unwrap_or(Role::Viewer);

    let id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, role, business_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(normalize_email(&payload.email))
    .bind(password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(role)
    .bind(business_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if AppError::is_unique_violation(&e) {
            AppError::Conflict("A user with this email already exists.".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    let user = fetch_business_user(&pool, id, business_id).await?;
    info!("👤 {} created user {} ({})", current_user.email, user.email, user.role);

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "User created successfully",
        User::from(user),
    ))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/",
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Retrieve a single user", body = User),
        (status = 404, description = "User not found in the caller's business")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_user(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<ApiResponse<User>> {
    current_user.require_admin()?;
    let user = fetch_business_user(&pool, id, current_user.business_id()?).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "User retrieved successfully",
        User::from(user),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/users/{id}/",
    request_body = UpdateUser,
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User updated successfully", body = User),
        (status = 400, description = "No fields provided, validation failed, or target is the caller"),
        (status = 404, description = "User not found in the caller's business")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(update): Json<UpdateUser>,
) -> AppResult<ApiResponse<User>> {
    current_user.require_admin()?;
    let business_id = current_user.business_id()?;

    if id == current_user.id {
        return Err(AppError::BadRequest(
            "You cannot change your own role or status.".to_string(),
        ));
    }
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".to_string()));
    }
    update.validate()?;

    let mut query_builder = QueryBuilder::new("UPDATE users SET ");
    let mut separated = query_builder.separated(", ");
    if let Some(first_name) = &update.first_name {
        separated.push("first_name = ").push_bind_unseparated(first_name);
    }
    if let Some(last_name) = &update.last_name {
        separated.push("last_name = ").push_bind_unseparated(last_name);
    }
    if let Some(role) = update.role {
        separated.push("role = ").push_bind_unseparated(role);
    }
    if let Some(is_active) = update.is_active {
        separated.push("is_active = ").push_bind_unseparated(is_active);
    }
    query_builder
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" AND business_id = ")
        .push_bind(business_id);

    let result = query_builder.build().execute(&state.pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User"));
    }

    // Role and activity are cached for the auth middleware.
    state.user_cache.invalidate(&id);

    let user = fetch_business_user(&state.pool, id, business_id).await?;
    info!("👤 {} updated user {}", current_user.email, user.email);

    Ok(ApiResponse::success(
        StatusCode::OK,
        "User updated successfully",
        User::from(user),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}/",
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted successfully"),
        (status = 400, description = "Admins cannot delete themselves"),
        (status = 404, description = "User not found in the caller's business")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<ApiResponse<()>> {
    current_user.require_admin()?;
    let business_id = current_user.business_id()?;

    if id == current_user.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account.".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND business_id = $2")
        .bind(id)
        .bind(business_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User"));
    }
    state.user_cache.invalidate(&id);
    info!("👤 {} deleted user {}", current_user.email, id);

    Ok(ApiResponse::success(StatusCode::OK, "User deleted successfully", ()))
}

/// Any authenticated user can change their own password.
#[utoipa::path(
    post,
    path = "/api/users/change-password/",
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password updated successfully"),
        (status = 400, description = "Old password incorrect or new password too short")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<ChangePassword>,
) -> AppResult<ApiResponse<()>> {
    payload.validate()?;

    let user = fetch_user_by_id(&pool, current_user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if !verify(&payload.old_password, &user.password_hash).unwrap_or(false) {
        return Err(AppError::BadRequest("Old password is incorrect.".to_string()));
    }

    let new_password_hash = hash(&payload.new_password, DEFAULT_COST)?;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(new_password_hash)
        .bind(current_user.id)
        .execute(&pool)
        .await?;

    info!("🔑 Password changed for {}", current_user.email);
    Ok(ApiResponse::success(StatusCode::OK, "Password updated successfully.", ()))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        get_all_users,
        create_user,
        get_user,
        update_user,
        delete_user,
        change_password,
    ),
    components(
        schemas(User, NewUser, UpdateUser, ChangePassword, Role)
    ),
    tags(
        (name = "Users", description = "User Management API")
    )
)]
pub struct UserDoc;
