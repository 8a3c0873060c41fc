use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::user::*;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/", get(get_all_users).post(create_user))
        .route(
            "/api/users/{id}/",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/api/users/change-password/", post(change_password))
}
