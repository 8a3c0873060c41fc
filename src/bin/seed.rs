//! Seeds a demo business with one user per role and a few products.
//!
//! Safe to run repeatedly: existing rows are left alone.

use anyhow::Context;
use bcrypt::{hash, DEFAULT_COST};
use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::str::FromStr;
use tracing::info;

use marketplace::db::models::product::ProductStatus;
use marketplace::db::models::user::Role;
use marketplace::db::pool::{get_db_pool, run_migrations};
use marketplace::telemetry::init_tracing;
use marketplace::Config;

const DEMO_PASSWORD: &str = "password123";

const DEMO_USERS: [(&str, &str, &str, Role); 4] = [
    ("admin@acme.com", "Ada", "Admin", Role::Admin),
    ("approver@acme.com", "Arne", "Approver", Role::Approver),
    ("editor@acme.com", "Edda", "Editor", Role::Editor),
    ("viewer@acme.com", "Vic", "Viewer", Role::Viewer),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(None)?;

    let pool = get_db_pool(&config).await?;
    run_migrations(&pool).await?;

    let business_id = seed_business(&pool).await?;
    let password_hash = hash(DEMO_PASSWORD, DEFAULT_COST)?;

    let mut user_ids = Vec::with_capacity(DEMO_USERS.len());
    for (email, first_name, last_name, role) in DEMO_USERS {
        let id = seed_user(&pool, business_id, email, first_name, last_name, role, &password_hash)
            .await?;
        user_ids.push((role, id));
    }
    let user_id = |wanted: Role| {
        user_ids
            .iter()
            .find(|(role, _)| *role == wanted)
            .map(|(_, id)| *id)
    };

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE business_id = $1")
        .bind(business_id)
        .fetch_one(&pool)
        .await?;

    if existing == 0 {
        let products = [
            (
                "Widget Pro",
                "Our best-selling widget, now with extra sprockets.",
                "29.99",
                ProductStatus::Approved,
                user_id(Role::Editor),
                user_id(Role::Approver),
            ),
            (
                "Gadget Lite",
                "A lightweight gadget for everyday use.",
                "9.99",
                ProductStatus::PendingApproval,
                user_id(Role::Editor),
                None,
            ),
            (
                "Super Doohickey",
                "Still being written up.",
                "149.00",
                ProductStatus::Draft,
                user_id(Role::Admin),
                None,
            ),
        ];

        for (name, description, price, status, created_by, approved_by) in products {
            sqlx::query(
                r#"
                INSERT INTO products (name, description, price, status, business_id, created_by, approved_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(name)
            .bind(description)
            .bind(BigDecimal::from_str(price)?)
            .bind(status)
            .bind(business_id)
            .bind(created_by)
            .bind(approved_by)
            .execute(&pool)
            .await?;
            info!("Seeded product {} ({})", name, status);
        }
    } else {
        info!("Business already has {} products; skipping product seed", existing);
    }

    info!("✅ Seed complete. Log in with any demo account and '{}'", DEMO_PASSWORD);
    pool.close().await;
    Ok(())
}

async fn seed_business(pool: &PgPool) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO businesses (name, email)
        VALUES ('Acme Corp', 'contact@acme.com')
        ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .fetch_one(pool)
    .await
}

async fn seed_user(
    pool: &PgPool,
    business_id: i32,
    email: &str,
    first_name: &str,
    last_name: &str,
    role: Role,
    password_hash: &str,
) -> Result<i32, sqlx::Error> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, role, business_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT ((LOWER(email))) DO UPDATE SET email = EXCLUDED.email
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .bind(role)
    .bind(business_id)
    .fetch_one(pool)
    .await?;
    info!("Seeded {} ({})", email, role);
    Ok(id)
}
