pub mod auth;
pub mod chat;
pub mod health;
pub mod product;
pub mod public;
pub mod user;

use std::future::Future;
use std::time::Duration;

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::db::queries::chat::ChatDoc;
use crate::db::queries::product::ProductDoc;
use crate::db::queries::public::PublicDoc;
use crate::db::queries::user::UserDoc;
use crate::middleware::auth::{current_user_middleware, jwt_middleware};
use crate::middleware::request_logger::log_requests;
use auth::AuthDoc;

const REQUEST_BODY_LIMIT: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn openapi() -> utoipa::openapi::OpenApi {
    AuthDoc::openapi()
        .merge_from(ProductDoc::openapi())
        .merge_from(PublicDoc::openapi())
        .merge_from(UserDoc::openapi())
        .merge_from(ChatDoc::openapi())
}

fn cors_layer(frontend_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!("FRONTEND_ORIGIN {:?} is not a valid origin; cross-origin requests are disabled", frontend_origin);
            layer
        }
    }
}

/// Full application router with every layer applied.
pub fn app(state: AppState) -> Router {
    let merged_doc = openapi();

    // Public routes
    let public_routes = Router::new()
        .merge(auth::auth_routes())
        .merge(public::public_routes())
        .merge(chat::chat_routes());

    // Private routes
    let private_routes = Router::new()
        .merge(product::product_routes())
        .merge(user::user_routes())
        .merge(auth::secure_auth_routes())
        .route_layer(from_fn_with_state(state.clone(), current_user_middleware))
        .route_layer(from_fn_with_state(state.clone(), jwt_middleware));

    Router::new()
        .merge(health::health_routes())
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", merged_doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", merged_doc).path("/rapidoc"))
        .layer(from_fn(log_requests))
        .layer(RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.frontend_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves, waits for in-flight requests, then closes the pool.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pool = state.pool.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("🛠️ Closing database pool...");
    pool.close().await;
    info!("✅ Database pool closed.");
    Ok(())
}
