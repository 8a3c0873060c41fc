//! Router-level tests that never reach the database: every request here is
//! answered by the auth layers, the role gates or input validation.

use std::time::Duration;

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

use common::{request, send, token};
use marketplace::api::{app, serve};
use marketplace::api::auth::TokenType;
use marketplace::db::models::user::Role;
use marketplace::middleware::auth::CurrentUser;
use marketplace::{AppState, Config};

const ADMIN: i32 = 1;
const APPROVER: i32 = 2;
const EDITOR: i32 = 3;
const VIEWER: i32 = 4;
const DEACTIVATED: i32 = 5;
const UNATTACHED: i32 = 6;

fn cached_user(id: i32, role: Role) -> CurrentUser {
    CurrentUser {
        id,
        email: format!("user{id}@acme.com"),
        role,
        business_id: Some(1),
        is_active: true,
    }
}

/// App backed by a pool that never connects, with the user cache pre-filled.
fn test_app() -> (Router, AppState) {
    let config = Config::for_tests();
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    let state = AppState::new(pool, config);

    state.user_cache.insert(ADMIN, cached_user(ADMIN, Role::Admin));
    state.user_cache.insert(APPROVER, cached_user(APPROVER, Role::Approver));
    state.user_cache.insert(EDITOR, cached_user(EDITOR, Role::Editor));
    state.user_cache.insert(VIEWER, cached_user(VIEWER, Role::Viewer));
    state.user_cache.insert(
        DEACTIVATED,
        CurrentUser {
            is_active: false,
            ..cached_user(DEACTIVATED, Role::Editor)
        },
    );
    state.user_cache.insert(
        UNATTACHED,
        CurrentUser {
            business_id: None,
            ..cached_user(UNATTACHED, Role::Admin)
        },
    );

    (app(state.clone()), state)
}

#[tokio::test]
async fn liveness_does_not_need_the_database() {
    let (app, _) = test_app();
    let (status, body) = send(app, request(Method::GET, "/health/live", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn private_routes_require_credentials() {
    let (app, _) = test_app();
    for uri in ["/api/products/", "/api/users/", "/api/auth/me/"] {
        let (status, body) = send(app.clone(), request(Method::GET, uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["success"], false);
        assert_eq!(body["status_code"], 401);
    }
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let (app, _) = test_app();
    let (status, _) = send(app, request(Method::GET, "/api/products/", Some("not-a-jwt"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_cannot_be_used_as_access_token() {
    let (app, state) = test_app();
    let refresh = token(&state, EDITOR, Role::Editor, TokenType::Refresh);
    let (status, _) = send(app, request(Method::GET, "/api/products/", Some(&refresh), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_authorization_header_is_bad_request() {
    let (app, _) = test_app();
    let req = Request::builder()
        .uri("/api/products/")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivated_user_is_rejected_even_with_a_valid_token() {
    let (app, state) = test_app();
    let access = token(&state, DEACTIVATED, Role::Editor, TokenType::Access);
    let (status, body) = send(app, request(Method::GET, "/api/products/", Some(&access), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User account is disabled.");
}

#[tokio::test]
async fn access_cookie_is_accepted() {
    let (app, state) = test_app();
    let access = token(&state, VIEWER, Role::Viewer, TokenType::Access);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/products/")
        .header(header::COOKIE, format!("access_token={access}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "Thing", "price": "1.00" }).to_string()))
        .unwrap();
    // Past authentication, stopped by the role gate.
    let (status, _) = send(app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn viewer_cannot_create_products() {
    let (app, state) = test_app();
    let access = token(&state, VIEWER, Role::Viewer, TokenType::Access);
    let body = json!({ "name": "Widget", "description": "", "price": "9.99" });
    let (status, body) =
        send(app, request(Method::POST, "/api/products/", Some(&access), Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You need Editor role or above to perform this action.");
}

#[tokio::test]
async fn editor_cannot_approve_or_reject() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    for uri in ["/api/products/7/approve/", "/api/products/7/reject/"] {
        let (status, _) = send(app.clone(), request(Method::POST, uri, Some(&access), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn only_admins_delete_products() {
    let (app, state) = test_app();
    for (id, role) in [(APPROVER, Role::Approver), (EDITOR, Role::Editor), (VIEWER, Role::Viewer)] {
        let access = token(&state, id, role, TokenType::Access);
        let (status, _) =
            send(app.clone(), request(Method::DELETE, "/api/products/7/", Some(&access), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{role}");
    }
}

#[tokio::test]
async fn viewer_cannot_submit_or_edit() {
    let (app, state) = test_app();
    let access = token(&state, VIEWER, Role::Viewer, TokenType::Access);
    let (status, _) =
        send(app.clone(), request(Method::POST, "/api/products/7/submit/", Some(&access), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let patch = json!({ "name": "Renamed" });
    let (status, _) =
        send(app, request(Method::PATCH, "/api/products/7/", Some(&access), Some(patch))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let (app, state) = test_app();
    for (id, role) in [(APPROVER, Role::Approver), (EDITOR, Role::Editor), (VIEWER, Role::Viewer)] {
        let access = token(&state, id, role, TokenType::Access);
        let (status, body) =
            send(app.clone(), request(Method::GET, "/api/users/", Some(&access), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{role}");
        assert_eq!(body["message"], "You must be an Admin to perform this action.");
    }
}

#[tokio::test]
async fn account_without_business_sees_nothing() {
    let (app, state) = test_app();
    let access = token(&state, UNATTACHED, Role::Admin, TokenType::Access);
    let (status, _) = send(app, request(Method::GET, "/api/products/", Some(&access), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn editor_create_with_invalid_price_is_rejected_before_touching_the_database() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    for price in ["0", "-5.00", "1.999"] {
        let body = json!({ "name": "Widget", "price": price });
        let (status, _) =
            send(app.clone(), request(Method::POST, "/api/products/", Some(&access), Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "price {price}");
    }
}

#[tokio::test]
async fn editor_create_with_empty_name_fails_validation() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    let body = json!({ "name": "", "price": "5.00" });
    let (status, body) =
        send(app, request(Method::POST, "/api/products/", Some(&access), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_object());
}

#[tokio::test]
async fn shutdown_finishes_requests_before_closing_the_pool() {
    let (_, state) = test_app();
    let pool = state.pool.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state, async {
        let _ = stopped.await;
    }));

    // Readiness waits on the pool, so the request is still running at shutdown.
    let in_flight = tokio::spawn(reqwest::get(format!("http://{addr}/health/ready")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.send(()).unwrap();

    // Answered by the handler rather than dropped mid-flight.
    let response = in_flight.await.unwrap().unwrap();
    assert!(matches!(response.status().as_u16(), 200 | 503), "{}", response.status());
    server.await.unwrap().unwrap();
    assert!(pool.is_closed());
}

#[tokio::test]
async fn whitespace_name_is_rejected() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    let body = json!({ "name": "   ", "price": "5.00" });
    let (status, body) =
        send(app, request(Method::POST, "/api/products/", Some(&access), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["name"][0], "Name must be 1-255 characters.");
}

#[tokio::test]
async fn huge_price_exponent_is_rejected_quickly() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    let body = json!({ "name": "Widget", "price": "1e4000000" });
    let started = std::time::Instant::now();
    let (status, _) =
        send(app, request(Method::POST, "/api/products/", Some(&access), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn malformed_body_still_uses_the_envelope() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    let body = json!({ "name": "x" });
    let (status, body) =
        send(app.clone(), request(Method::POST, "/api/products/", Some(&access), Some(body))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["status_code"], 422);
    assert!(body["message"].as_str().unwrap().contains("price"));

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/products/")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn non_numeric_product_id_uses_the_envelope() {
    let (app, state) = test_app();
    let access = token(&state, ADMIN, Role::Admin, TokenType::Access);
    let (status, body) =
        send(app, request(Method::DELETE, "/api/products/abc/", Some(&access), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unusable_refresh_token_gets_a_fixed_message() {
    let (app, _) = test_app();
    let body = json!({ "refresh_token": "a.b.c" });
    let (status, body) = send(app, request(Method::POST, "/api/auth/refresh/", None, Some(body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token.");
}

#[tokio::test]
async fn refresh_without_a_token_is_unauthorized() {
    let (app, _) = test_app();
    let (status, body) = send(app, request(Method::POST, "/api/auth/refresh/", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Refresh token not found.");
}

#[tokio::test]
async fn refresh_rejects_an_access_token() {
    let (app, state) = test_app();
    let access = token(&state, EDITOR, Role::Editor, TokenType::Access);
    let body = json!({ "refresh_token": access });
    let (status, _) = send(app, request(Method::POST, "/api/auth/refresh/", None, Some(body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_requires_a_message() {
    let (app, _) = test_app();
    for body in [json!({ "message": "   " }), json!({})] {
        let (status, body) =
            send(app.clone(), request(Method::POST, "/api/chat/", None, Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Message is required");
    }
}

#[tokio::test]
async fn anonymous_chat_history_without_session_is_empty() {
    let (app, _) = test_app();
    let (status, body) = send(app, request(Method::GET, "/api/chat/history/", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn cors_preflight_allows_the_frontend_with_credentials() {
    let (app, state) = test_app();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/products/")
        .header(header::ORIGIN, state.config.frontend_origin.as_str())
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        state.config.frontend_origin.as_str()
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn openapi_document_lists_the_workflow_endpoints() {
    let (app, _) = test_app();
    let (status, body) =
        send(app, request(Method::GET, "/api-docs/openapi.json", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().expect("paths");
    for path in [
        "/api/auth/login/",
        "/api/products/{product_id}/approve/",
        "/api/products/public/products/",
        "/api/chat/",
    ] {
        assert!(paths.contains_key(path), "{path}");
    }
}
