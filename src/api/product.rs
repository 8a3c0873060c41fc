use crate::db::queries::product::{
    approve_product, create_product, delete_product, get_product, get_products, reject_product,
    submit_product, update_product,
};

use crate::app_state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Defines the product routes to be used in the main router
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products/", get(get_products).post(create_product)) // List (filterable) and create drafts
        .route(
            "/api/products/{product_id}/",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/api/products/{product_id}/submit/", post(submit_product)) // draft -> pending_approval
        .route("/api/products/{product_id}/approve/", post(approve_product)) // pending_approval -> approved
        .route("/api/products/{product_id}/reject/", post(reject_product)) // pending_approval -> draft
}
