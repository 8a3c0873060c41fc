//! Role × product-status permission matrix.
//!
//! Every handler and every `allowed_actions` list goes through [`is_allowed`],
//! so the UI affordances a client renders always agree with what the API enforces.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::product::ProductStatus;
use crate::db::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductAction {
    Create,
    Edit,
    Submit,
    Approve,
    Reject,
    Delete,
}

impl ProductAction {
    pub const ALL: [ProductAction; 6] = [
        ProductAction::Create,
        ProductAction::Edit,
        ProductAction::Submit,
        ProductAction::Approve,
        ProductAction::Reject,
        ProductAction::Delete,
    ];

    /// Actions that target an existing product, in display order.
    pub const PER_PRODUCT: [ProductAction; 5] = [
        ProductAction::Edit,
        ProductAction::Submit,
        ProductAction::Approve,
        ProductAction::Reject,
        ProductAction::Delete,
    ];

    /// Role gate for the action, independent of product status.
    pub fn role_allows(self, role: Role) -> bool {
        match self {
            ProductAction::Create | ProductAction::Edit | ProductAction::Submit => role.can_author(),
            ProductAction::Approve | ProductAction::Reject => role.can_approve(),
            ProductAction::Delete => role.is_admin(),
        }
    }

    /// Message returned when [`ProductAction::role_allows`] fails.
    pub fn role_denied_message(self) -> &'static str {
        match self {
            ProductAction::Create | ProductAction::Edit | ProductAction::Submit => {
                "You need Editor role or above to perform this action."
            }
            ProductAction::Approve | ProductAction::Reject => {
                "You need Approver role or above to perform this action."
            }
            ProductAction::Delete => "You must be an Admin to perform this action.",
        }
    }
}

/// Whether `role` may perform `action` on a product currently in `status`.
///
/// For `Create` the status is ignored.
pub fn is_allowed(role: Role, status: ProductStatus, action: ProductAction) -> bool {
    match action {
        ProductAction::Create => role.can_author(),
        ProductAction::Edit => {
            role.is_admin() || (status != ProductStatus::Approved && role.can_author())
        }
        ProductAction::Submit => status == ProductStatus::Draft && role.can_author(),
        ProductAction::Approve | ProductAction::Reject => {
            status == ProductStatus::PendingApproval && role.can_approve()
        }
        ProductAction::Delete => role.is_admin(),
    }
}

/// Per-product actions available to `role` while the product is in `status`.
pub fn allowed_actions(role: Role, status: ProductStatus) -> Vec<ProductAction> {
    ProductAction::PER_PRODUCT
        .into_iter()
        .filter(|action| is_allowed(role, status, *action))
        .collect()
}
