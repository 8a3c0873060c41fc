//! Product workflow against a real database. Each test gets a fresh,
//! migrated database from `#[sqlx::test]`.

mod common;

use std::str::FromStr;

use axum::http::{Method, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use sqlx::PgPool;

use common::{request, send, token};
use marketplace::api::app;
use marketplace::api::auth::TokenType;
use marketplace::db::models::product::{ProductStatus, UpdateProduct};
use marketplace::db::models::user::Role;
use marketplace::db::queries::product::{set_status_if, write_product_update};
use marketplace::db::queries::user::fetch_user_by_email;
use marketplace::utils::error::AppError;
use marketplace::{AppState, Config};

const LOCKED: &str = "Approved products cannot be edited. Please contact an Admin.";

struct Tenant {
    business_id: i32,
    admin: i32,
    approver: i32,
    editor: i32,
}

struct Harness {
    app: Router,
    state: AppState,
    acme: Tenant,
    globex: Tenant,
}

impl Harness {
    async fn new(pool: PgPool) -> Self {
        let acme = tenant(&pool, "acme").await;
        let globex = tenant(&pool, "globex").await;
        let state = AppState::new(pool, Config::for_tests());
        Self {
            app: app(state.clone()),
            state,
            acme,
            globex,
        }
    }

    fn bearer(&self, id: i32, role: Role) -> String {
        token(&self.state, id, role, TokenType::Access)
    }

    async fn call(&self, method: Method, uri: &str, bearer: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(self.app.clone(), request(method, uri, Some(bearer), body)).await
    }

    async fn create_draft(&self, name: &str) -> i64 {
        let editor = self.bearer(self.acme.editor, Role::Editor);
        let body = json!({ "name": name, "description": "Test item", "price": "19.99" });
        let (status, body) = self.call(Method::POST, "/api/products/", &editor, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }
}

async fn tenant(pool: &PgPool, slug: &str) -> Tenant {
    let business_id: i32 =
        sqlx::query_scalar("INSERT INTO businesses (name, email) VALUES ($1, $2) RETURNING id")
            .bind(format!("{slug} inc"))
            .bind(format!("contact@{slug}.com"))
            .fetch_one(pool)
            .await
            .unwrap();

    let mut ids = Vec::new();
    for role in [Role::Admin, Role::Approver, Role::Editor] {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, role, business_id)
            VALUES ($1, 'unused', 'Test', 'User', $2, $3)
            RETURNING id
            "#,
        )
        .bind(format!("{role}@{slug}.com"))
        .bind(role)
        .bind(business_id)
        .fetch_one(pool)
        .await
        .unwrap();
        ids.push(id);
    }

    Tenant {
        business_id,
        admin: ids[0],
        approver: ids[1],
        editor: ids[2],
    }
}

fn public_names(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}

#[sqlx::test(migrations = "./migrations")]
async fn draft_is_submitted_approved_and_locked(pool: PgPool) {
    let h = Harness::new(pool).await;
    let editor = h.bearer(h.acme.editor, Role::Editor);
    let approver = h.bearer(h.acme.approver, Role::Approver);
    let admin = h.bearer(h.acme.admin, Role::Admin);

    let body = json!({ "name": "  Widget  ", "description": "Blue", "price": "19.99" });
    let (status, body) = h.call(Method::POST, "/api/products/", &editor, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let product = &body["data"];
    assert_eq!(product["status"], "draft");
    assert_eq!(product["name"], "Widget");
    assert_eq!(product["allowed_actions"], json!(["edit", "submit"]));
    assert_eq!(product["created_by"]["id"], h.acme.editor);
    assert_eq!(product["approved_by"], Value::Null);
    let id = product["id"].as_i64().unwrap();

    let (status, body) =
        h.call(Method::POST, &format!("/api/products/{id}/submit/"), &editor, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending_approval");

    let (status, _) =
        h.call(Method::POST, &format!("/api/products/{id}/approve/"), &editor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) =
        h.call(Method::POST, &format!("/api/products/{id}/approve/"), &approver, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["approved_by"]["id"], h.acme.approver);

    // A second approval finds the product no longer pending.
    let (status, body) =
        h.call(Method::POST, &format!("/api/products/{id}/approve/"), &approver, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only pending products can be approved. Current status: approved");

    let patch = json!({ "price": "24.50" });
    let (status, body) =
        h.call(Method::PATCH, &format!("/api/products/{id}/"), &editor, Some(patch.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], LOCKED);

    let (status, body) =
        h.call(Method::PATCH, &format!("/api/products/{id}/"), &admin, Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(
        BigDecimal::from_str(body["data"]["price"].as_str().unwrap()).unwrap(),
        BigDecimal::from_str("24.50").unwrap()
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn rejection_returns_to_draft_and_clears_approver(pool: PgPool) {
    let h = Harness::new(pool.clone()).await;
    let editor = h.bearer(h.acme.editor, Role::Editor);
    let approver = h.bearer(h.acme.approver, Role::Approver);
    let id = h.create_draft("Gadget").await;

    // Rejecting a draft is a state error, not a permission error.
    let (status, _) =
        h.call(Method::POST, &format!("/api/products/{id}/reject/"), &approver, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        h.call(Method::POST, &format!("/api/products/{id}/submit/"), &editor, None).await;
    assert_eq!(status, StatusCode::OK);

    // A stale approver left behind on the row must not survive rejection.
    sqlx::query("UPDATE products SET approved_by = $1 WHERE id = $2")
        .bind(h.acme.approver)
        .bind(id as i32)
        .execute(&pool)
        .await
        .unwrap();

    let (status, body) =
        h.call(Method::POST, &format!("/api/products/{id}/reject/"), &approver, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["approved_by"], Value::Null);

    // Editable again once back in draft.
    let patch = json!({ "name": "Gadget v2" });
    let (status, body) =
        h.call(Method::PATCH, &format!("/api/products/{id}/"), &editor, Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Gadget v2");
}

#[sqlx::test(migrations = "./migrations")]
async fn other_businesses_see_not_found(pool: PgPool) {
    let h = Harness::new(pool).await;
    let id = h.create_draft("Private").await;
    let outsider = h.bearer(h.globex.admin, Role::Admin);

    let (status, body) = h.call(Method::GET, &format!("/api/products/{id}/"), &outsider, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let patch = json!({ "name": "Hijacked" });
    let (status, _) =
        h.call(Method::PATCH, &format!("/api/products/{id}/"), &outsider, Some(patch)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        h.call(Method::POST, &format!("/api/products/{id}/submit/"), &outsider, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.call(Method::DELETE, &format!("/api/products/{id}/"), &outsider, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h.call(Method::GET, "/api/products/", &outsider, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[sqlx::test(migrations = "./migrations")]
async fn storefront_lists_only_approved_products(pool: PgPool) {
    let h = Harness::new(pool).await;
    let editor = h.bearer(h.acme.editor, Role::Editor);
    let approver = h.bearer(h.acme.approver, Role::Approver);

    let draft = h.create_draft("Draft Lamp").await;
    let pending = h.create_draft("Pending Lamp").await;
    let approved = h.create_draft("Approved Lamp").await;
    for id in [pending, approved] {
        let (status, _) =
            h.call(Method::POST, &format!("/api/products/{id}/submit/"), &editor, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) =
        h.call(Method::POST, &format!("/api/products/{approved}/approve/"), &approver, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send(h.app.clone(), request(Method::GET, "/api/products/public/products/", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public_names(&body), vec!["Approved Lamp".to_string()]);
    assert_eq!(body["data"][0]["business_name"], "acme inc");

    let (status, body) = send(
        h.app.clone(),
        request(Method::GET, "/api/products/public/products/?search=lamp&max_price=1e20", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public_names(&body), vec!["Approved Lamp".to_string()]);

    for id in [draft, pending] {
        let uri = format!("/api/products/public/products/{id}/");
        let (status, _) = send(h.app.clone(), request(Method::GET, &uri, None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let uri = format!("/api/products/public/products/{approved}/");
    let (status, body) = send(h.app.clone(), request(Method::GET, &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Approved Lamp");
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_status_write_is_a_conflict(pool: PgPool) {
    let h = Harness::new(pool.clone()).await;
    let id = h.create_draft("Racy").await as i32;
    let business_id = h.acme.business_id;

    set_status_if(&pool, id, business_id, ProductStatus::Draft, ProductStatus::PendingApproval, None)
        .await
        .unwrap();

    // A second writer that still believes the product is a draft loses.
    let err = set_status_if(&pool, id, business_id, ProductStatus::Draft, ProductStatus::PendingApproval, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");

    set_status_if(
        &pool,
        id,
        business_id,
        ProductStatus::PendingApproval,
        ProductStatus::Approved,
        Some(h.acme.approver),
    )
    .await
    .unwrap();

    // An editor's write that read the product before approval must not land.
    let update = UpdateProduct {
        name: Some("Sneaky".into()),
        description: None,
        price: None,
    };
    let err = write_product_update(&pool, id, business_id, &update, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");

    let name: String = sqlx::query_scalar("SELECT name FROM products WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "Racy");

    // Admin writes are not restricted by status.
    write_product_update(&pool, id, business_id, &update, false)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn emails_are_unique_regardless_of_case(pool: PgPool) {
    let h = Harness::new(pool.clone()).await;
    let admin = h.bearer(h.acme.admin, Role::Admin);
    let new_user = |email: &str| {
        json!({
            "email": email,
            "first_name": "Bob",
            "last_name": "Builder",
            "role": "editor",
            "password": "password123"
        })
    };

    let (status, body) =
        h.call(Method::POST, "/api/users/", &admin, Some(new_user("Bob@Acme.com"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email"], "bob@acme.com");

    let (status, body) =
        h.call(Method::POST, "/api/users/", &admin, Some(new_user("bob@acme.com"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "A user with this email already exists.");

    let stored = fetch_user_by_email(&pool, "BOB@acme.COM").await.unwrap().unwrap();
    assert_eq!(stored.email, "bob@acme.com");

    let login = json!({ "email": " BOB@ACME.COM ", "password": "password123" });
    let (status, body) = send(
        h.app.clone(),
        request(Method::POST, "/api/auth/login/", None, Some(login)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
