use axum::{extract::State, http::StatusCode};
use sqlx::{PgPool, QueryBuilder};

use crate::db::models::product::{ProductStatus, PublicProduct, PublicProductFilterParams};
use crate::db::queries::product::escape_like;
use crate::utils::api_response::ApiResponse;
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::{Path, Query};

const PUBLIC_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.price, b.name AS business_name, p.created_at
    FROM products p
    JOIN businesses b ON b.id = p.business_id
"#;

/// Approved products across all businesses, newest first.
pub async fn fetch_public_products(
    pool: &PgPool,
    params: &PublicProductFilterParams,
    limit: Option<i64>,
) -> Result<Vec<PublicProduct>, sqlx::Error> {
    let mut query_builder = QueryBuilder::new(PUBLIC_SELECT);
    query_builder
        .push(" WHERE p.status = ")
        .push_bind(ProductStatus::Approved);

    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        query_builder
            .push(" AND p.name ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
    if let Some(min_price) = params.min_price() {
        query_builder.push(" AND p.price >= ").push_bind(min_price);
    }
    if let Some(max_price) = params.max_price() {
        query_builder.push(" AND p.price <= ").push_bind(max_price);
    }
    query_builder.push(" ORDER BY p.created_at DESC, p.id DESC");
    if let Some(limit) = limit {
        query_builder.push(" LIMIT ").push_bind(limit);
    }

    query_builder
        .build_query_as::<PublicProduct>()
        .fetch_all(pool)
        .await
}

#[utoipa::path(
    get,
    path = "/api/products/public/products/",
    params(PublicProductFilterParams),
    responses(
        (status = 200, description = "Approved products", body = [PublicProduct])
    ),
    tag = "Storefront"
)]
pub async fn get_public_products(
    State(pool): State<PgPool>,
    Query(params): Query<PublicProductFilterParams>,
) -> AppResult<ApiResponse<Vec<PublicProduct>>> {
    let products = fetch_public_products(&pool, &params, None).await?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Products retrieved successfully",
        products,
    ))
}

#[utoipa::path(
    get,
    path = "/api/products/public/products/{product_id}/",
    params(
        ("product_id" = i32, Path, description = "ID of an approved product")
    ),
    responses(
        (status = 200, description = "Approved product", body = PublicProduct),
        (status = 404, description = "Product not found or not approved")
    ),
    tag = "Storefront"
)]
pub async fn get_public_product(
    State(pool): State<PgPool>,
    Path(product_id): Path<i32>,
) -> AppResult<ApiResponse<PublicProduct>> {
    let product = sqlx::query_as::<_, PublicProduct>(&format!(
        "{PUBLIC_SELECT} WHERE p.id = $1 AND p.status = $2"
    ))
    .bind(product_id)
    .bind(ProductStatus::Approved)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Product"))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Product retrieved successfully",
        product,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(get_public_products, get_public_product),
    components(schemas(PublicProduct)),
    tags(
        (name = "Storefront", description = "Public catalog of approved products")
    )
)]
pub struct PublicDoc;
