use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Extension};
use sqlx::{PgPool, QueryBuilder};
use tracing::{info, warn};
use validator::Validate;

use crate::db::models::product::{
    validate_price, NewProduct, Product, ProductFilterParams, ProductRow, ProductStatus,
    Transition, UpdateProduct,
};
use crate::db::models::user::{Role, User};
use crate::db::queries::user::fetch_users_by_ids;
use crate::middleware::auth::CurrentUser;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::{Json, Path, Query};
use crate::utils::permissions::{allowed_actions, ProductAction};

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.price, p.status, p.business_id,
           b.name AS business_name, p.created_by, p.approved_by, p.created_at, p.updated_at
    FROM products p
    JOIN businesses b ON b.id = p.business_id
"#;

// Utility Functions

async fn fetch_product(pool: &PgPool, id: i32, business_id: i32) -> AppResult<ProductRow> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} WHERE p.id = $1 AND p.business_id = $2"
    ))
    .bind(id)
    .bind(business_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Product"))
}

/// Expands rows into API products: embeds creator/approver and the caller's allowed actions.
pub async fn hydrate_products(
    pool: &PgPool,
    rows: Vec<ProductRow>,
    role: Role,
) -> AppResult<Vec<Product>> {
    let mut ids: Vec<i32> = rows
        .iter()
        .flat_map(|row| [row.created_by, row.approved_by])
        .flatten()
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let users: HashMap<i32, User> = fetch_users_by_ids(pool, &ids)
        .await?
        .into_iter()
        .map(|row| (row.id, User::from(row)))
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| Product {
            created_by: row.created_by.and_then(|id| users.get(&id).cloned()),
            approved_by: row.approved_by.and_then(|id| users.get(&id).cloned()),
            allowed_actions: allowed_actions(role, row.status),
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            status: row.status,
            business_name: row.business_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect())
}

async fn hydrate_product(pool: &PgPool, row: ProductRow, role: Role) -> AppResult<Product> {
    hydrate_products(pool, vec![row], role)
        .await?
        .pop()
        .ok_or(AppError::NotFound("Product"))
}

// API Handlers

#[utoipa::path(
    get,
    path = "/api/products/",
    params(ProductFilterParams),
    responses(
        (status = 200, description = "Products of the caller's business, newest first", body = [Product]),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_products(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Query(params): Query<ProductFilterParams>,
) -> AppResult<ApiResponse<Vec<Product>>> {
    let business_id = current_user.business_id()?;

    let mut query_builder = QueryBuilder::new(PRODUCT_SELECT);
    query_builder.push(" WHERE p.business_id = ").push_bind(business_id);

    if let Some(status) = params.status {
        query_builder.push(" AND p.status = ").push_bind(status);
    }
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        query_builder
            .push(" AND p.name ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
    query_builder.push(" ORDER BY p.created_at DESC, p.id DESC");

    let rows = query_builder
        .build_query_as::<ProductRow>()
        .fetch_all(&pool)
        .await?;

    let products = hydrate_products(&pool, rows, current_user.role).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Products retrieved successfully",
        products,
    ))
}

#[utoipa::path(
    post,
    path = "/api/products/",
    request_body = NewProduct,
    responses(
        (status = 201, description = "Draft product created", body = Product),
        (status = 400, description = "Invalid name or price"),
        (status = 403, description = "Editor role or above required")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<NewProduct>,
) -> AppResult<ApiResponse<Product>> {
    current_user.require_role_for(ProductAction::Create)?;
    let business_id = current_user.business_id()?;
    payload.validate()?;
    validate_price(&payload.price).map_err(|msg| AppError::BadRequest(msg.to_string()))?;

    let id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO products (name, description, price, status, business_id, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&payload.price)
    .bind(ProductStatus::Draft)
    .bind(business_id)
    .bind(current_user.id)
    .fetch_one(&pool)
    .await?;

    info!("📦 {} created product {} as draft", current_user.email, id);
    let row = fetch_product(&pool, id, business_id).await?;
    let product = hydrate_product(&pool, row, current_user.role).await?;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Product created successfully",
        product,
    ))
}

/// Retrieves a single product by ID
#[utoipa::path(
    get,
    path = "/api/products/{product_id}/",
    params(
        ("product_id" = i32, Path, description = "ID of the product to retrieve")
    ),
    responses(
        (status = 200, description = "Product retrieved successfully", body = Product),
        (status = 404, description = "Product not found")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(product_id): Path<i32>,
) -> AppResult<ApiResponse<Product>> {
    let row = fetch_product(&pool, product_id, current_user.business_id()?).await?;
    let product = hydrate_product(&pool, row, current_user.role).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Product retrieved successfully",
        product,
    ))
}

/// Updates name, description or price. Approved products are editable by admins only.
#[utoipa::path(
    patch,
    path = "/api/products/{product_id}/",
    request_body = UpdateProduct,
    params(
        ("product_id" = i32, Path, description = "ID of the product to update")
    ),
    responses(
        (status = 200, description = "Product updated successfully", body = Product),
        (status = 400, description = "No fields, invalid values, or product is approved"),
        (status = 403, description = "Editor role or above required"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Product was approved while the edit was in flight")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(product_id): Path<i32>,
    Json(update): Json<UpdateProduct>,
) -> AppResult<ApiResponse<Product>> {
    current_user.require_role_for(ProductAction::Edit)?;
    let business_id = current_user.business_id()?;

    if update.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".to_string()));
    }
    update.validate()?;
    if let Some(price) = &update.price {
        validate_price(price).map_err(|msg| AppError::BadRequest(msg.to_string()))?;
    }

    let product = fetch_product(&pool, product_id, business_id).await?;
    if !current_user.can(product.status, ProductAction::Edit) {
        return Err(AppError::BadRequest(
            "Approved products cannot be edited. Please contact an Admin.".to_string(),
        ));
    }

    write_product_update(&pool, product_id, business_id, &update, !current_user.is_admin()).await?;

    info!("📦 {} edited product {}", current_user.email, product_id);
    let row = fetch_product(&pool, product_id, business_id).await?;
    let product = hydrate_product(&pool, row, current_user.role).await?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Product updated successfully",
        product,
    ))
}

/// Hard delete, admins only, regardless of status.
#[utoipa::path(
    delete,
    path = "/api/products/{product_id}/",
    params(
        ("product_id" = i32, Path, description = "ID of the product to delete")
    ),
    responses(
        (status = 200, description = "Product deleted successfully"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Product not found")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn delete_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(product_id): Path<i32>,
) -> AppResult<ApiResponse<()>> {
    current_user.require_role_for(ProductAction::Delete)?;
    let business_id = current_user.business_id()?;

    let result = sqlx::query("DELETE FROM products WHERE id = $1 AND business_id = $2")
        .bind(product_id)
        .bind(business_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Product"));
    }

    info!("🗑️ {} deleted product {}", current_user.email, product_id);
    Ok(ApiResponse::success(StatusCode::OK, "Product deleted successfully", ()))
}

/// Writes the provided fields. With `only_unapproved`, the row must still be
/// unapproved at write time; otherwise the edit lost a race and is a conflict.
pub async fn write_product_update(
    pool: &PgPool,
    product_id: i32,
    business_id: i32,
    update: &UpdateProduct,
    only_unapproved: bool,
) -> AppResult<()> {
    let mut query_builder = QueryBuilder::new("UPDATE products SET ");
    let mut separated = query_builder.separated(", ");
    if let Some(name) = &update.name {
        separated.push("name = ").push_bind_unseparated(name.trim());
    }
    if let Some(description) = &update.description {
        separated.push("description = ").push_bind_unseparated(description);
    }
    if let Some(price) = &update.price {
        separated.push("price = ").push_bind_unseparated(price);
    }
    separated.push("updated_at = NOW()");
    query_builder
        .push(" WHERE id = ")
        .push_bind(product_id)
        .push(" AND business_id = ")
        .push_bind(business_id);
    if only_unapproved {
        query_builder
            .push(" AND status <> ")
            .push_bind(ProductStatus::Approved);
    }

    let result = query_builder.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        warn!("Edit of product {} lost a race with approval", product_id);
        return Err(AppError::Conflict(
            "Product changed while it was being edited. Reload and try again.".to_string(),
        ));
    }
    Ok(())
}

/// Moves a product from `expected` to `next` only if it is still in `expected`.
pub async fn set_status_if(
    pool: &PgPool,
    product_id: i32,
    business_id: i32,
    expected: ProductStatus,
    next: ProductStatus,
    approved_by: Option<i32>,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET status = $1, approved_by = $2, updated_at = NOW()
        WHERE id = $3 AND business_id = $4 AND status = $5
        "#,
    )
    .bind(next)
    .bind(approved_by)
    .bind(product_id)
    .bind(business_id)
    .bind(expected)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(
            "Product {} left {} before it could move to {}",
            product_id, expected, next
        );
        return Err(AppError::Conflict(
            "Product status changed concurrently. Reload and try again.".to_string(),
        ));
    }
    Ok(())
}

/// Applies a workflow transition with a compare-and-set on the current status.
async fn transition_product(
    pool: &PgPool,
    current_user: &CurrentUser,
    product_id: i32,
    transition: Transition,
) -> AppResult<Product> {
    current_user.require_role_for(transition.action())?;
    let business_id = current_user.business_id()?;

    let product = fetch_product(pool, product_id, business_id).await?;
    let next = product.status.apply(transition)?;

    let approved_by = match transition {
        Transition::Approve => Some(current_user.id),
        Transition::Reject => None,
        Transition::Submit => product.approved_by,
    };

    set_status_if(pool, product_id, business_id, product.status, next, approved_by).await?;

    info!(
        "🔁 {} moved product {} from {} to {}",
        current_user.email, product_id, product.status, next
    );
    let row = fetch_product(pool, product_id, business_id).await?;
    hydrate_product(pool, row, current_user.role).await
}

#[utoipa::path(
    post,
    path = "/api/products/{product_id}/submit/",
    params(
        ("product_id" = i32, Path, description = "ID of the draft product")
    ),
    responses(
        (status = 200, description = "Product moved to pending_approval", body = Product),
        (status = 400, description = "Product is not a draft"),
        (status = 403, description = "Editor role or above required"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Status changed concurrently")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn submit_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(product_id): Path<i32>,
) -> AppResult<ApiResponse<Product>> {
    let product = transition_product(&pool, &current_user, product_id, Transition::Submit).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Product submitted for approval",
        product,
    ))
}

#[utoipa::path(
    post,
    path = "/api/products/{product_id}/approve/",
    params(
        ("product_id" = i32, Path, description = "ID of the pending product")
    ),
    responses(
        (status = 200, description = "Product approved", body = Product),
        (status = 400, description = "Product is not pending approval"),
        (status = 403, description = "Approver role or above required"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Status changed concurrently")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn approve_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(product_id): Path<i32>,
) -> AppResult<ApiResponse<Product>> {
    let product = transition_product(&pool, &current_user, product_id, Transition::Approve).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Product approved", product))
}

#[utoipa::path(
    post,
    path = "/api/products/{product_id}/reject/",
    params(
        ("product_id" = i32, Path, description = "ID of the pending product")
    ),
    responses(
        (status = 200, description = "Product returned to draft", body = Product),
        (status = 400, description = "Product is not pending approval"),
        (status = 403, description = "Approver role or above required"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Status changed concurrently")
    ),
    tag = "Products",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn reject_product(
    State(pool): State<PgPool>,
    Extension(current_user): Extension<CurrentUser>,
    Path(product_id): Path<i32>,
) -> AppResult<ApiResponse<Product>> {
    let product = transition_product(&pool, &current_user, product_id, Transition::Reject).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Product returned to draft",
        product,
    ))
}

/// Escapes `%`, `_` and `\` so user input matches literally inside `ILIKE`.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        get_products,
        create_product,
        get_product,
        update_product,
        delete_product,
        submit_product,
        approve_product,
        reject_product,
    ),
    components(
        schemas(Product, NewProduct, UpdateProduct, ProductStatus, ProductAction)
    ),
    tags(
        (name = "Products", description = "Product catalog and approval workflow")
    )
)]
pub struct ProductDoc;
