use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::db::models::business::Business;

/// Global role of a user. Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Editor,
    Approver,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Approver, Role::Editor, Role::Viewer];

    /// Position in the role hierarchy (admin = 4 … viewer = 1).
    pub fn rank(self) -> u8 {
        match self {
            Role::Viewer => 1,
            Role::Editor => 2,
            Role::Approver => 3,
            Role::Admin => 4,
        }
    }

    pub fn has_min_role(self, min: Role) -> bool {
        self.rank() >= min.rank()
    }

    /// Admin, approver and editor may create, edit and submit products.
    pub fn can_author(self) -> bool {
        self.has_min_role(Role::Editor)
    }

    /// Admin and approver may approve or reject products.
    pub fn can_approve(self) -> bool {
        self.has_min_role(Role::Approver)
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Approver => "approver",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row shape of `users` joined with its business.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub business_id: Option<i32>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub business_name: Option<String>,
    pub business_email: Option<String>,
    pub business_created_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub fn business(&self) -> Option<Business> {
        match (
            self.business_id,
            &self.business_name,
            &self.business_email,
            self.business_created_at,
        ) {
            (Some(id), Some(name), Some(email), Some(created_at)) => Some(Business {
                id,
                name: name.clone(),
                email: email.clone(),
                created_at,
            }),
            _ => None,
        }
    }
}

/// Canonical form of an email address, used for storage and lookup alike.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Public representation of a user. Never carries the password hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub business: Option<Business>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let business = row.business();
        User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role: row.role,
            business,
            is_active: row.is_active,
            date_joined: row.date_joined,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct NewUser {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 150, message = "First name must be 1-150 characters."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150, message = "Last name must be 1-150 characters."))]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters."))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 150, message = "First name must be 1-150 characters."))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 150, message = "Last name must be 1-150 characters."))]
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePassword {
    pub old_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters."))]
    pub new_password: String,
}
