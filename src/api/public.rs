use crate::app_state::AppState;
use crate::db::queries::public::{get_public_product, get_public_products};
use axum::{routing::get, Router};

/// Storefront routes; no authentication.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products/public/products/", get(get_public_products))
        .route(
            "/api/products/public/products/{product_id}/",
            get(get_public_product),
        )
}
