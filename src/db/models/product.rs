use bigdecimal::num_bigint::Sign;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::db::models::user::User;
use crate::utils::permissions::ProductAction;

/// Largest price the `NUMERIC(10, 2)` column can hold is 99,999,999.99.
const PRICE_MAX_DIGITS: i64 = 10;
const PRICE_DECIMAL_PLACES: i64 = 2;
const PRICE_INTEGER_DIGITS: i64 = PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "product_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    PendingApproval,
    Approved,
}

/// Workflow moves between product states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Only draft products can be submitted. Current status: {0}")]
    NotDraft(ProductStatus),
    #[error("Only pending products can be approved. Current status: {0}")]
    NotPendingForApproval(ProductStatus),
    #[error("Only pending products can be rejected. Current status: {0}")]
    NotPendingForRejection(ProductStatus),
}

impl ProductStatus {
    pub const ALL: [ProductStatus; 3] = [
        ProductStatus::Draft,
        ProductStatus::PendingApproval,
        ProductStatus::Approved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::PendingApproval => "pending_approval",
            ProductStatus::Approved => "approved",
        }
    }

    /// Next status after `transition`, or the reason it is not defined from here.
    pub fn apply(self, transition: Transition) -> Result<ProductStatus, TransitionError> {
        match (self, transition) {
            (ProductStatus::Draft, Transition::Submit) => Ok(ProductStatus::PendingApproval),
            (ProductStatus::PendingApproval, Transition::Approve) => Ok(ProductStatus::Approved),
            (ProductStatus::PendingApproval, Transition::Reject) => Ok(ProductStatus::Draft),
            (current, Transition::Submit) => Err(TransitionError::NotDraft(current)),
            (current, Transition::Approve) => Err(TransitionError::NotPendingForApproval(current)),
            (current, Transition::Reject) => Err(TransitionError::NotPendingForRejection(current)),
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Transition {
    pub fn action(self) -> ProductAction {
        match self {
            Transition::Submit => ProductAction::Submit,
            Transition::Approve => ProductAction::Approve,
            Transition::Reject => ProductAction::Reject,
        }
    }
}

/// Row shape of `products` joined with its business name.
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub status: ProductStatus,
    pub business_id: i32,
    pub business_name: String,
    pub created_by: Option<i32>,
    pub approved_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product as seen by dashboard users, including what the caller may do with it.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub description: String,
    #[schema(value_type = String, example = "29.99")]
    pub price: BigDecimal,
    pub status: ProductStatus,
    pub business_name: String,
    pub created_by: Option<User>,
    pub approved_by: Option<User>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub allowed_actions: Vec<ProductAction>,
}

/// Storefront representation of an approved product.
#[derive(Serialize, Deserialize, Debug, Clone, FromRow, ToSchema)]
pub struct PublicProduct {
    pub id: i32,
    pub name: String,
    pub description: String,
    #[schema(value_type = String, example = "29.99")]
    pub price: BigDecimal,
    pub business_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Validate, ToSchema)]
pub struct NewProduct {
    #[validate(
        length(max = 255, message = "Name must be 1-255 characters."),
        custom(function = "validate_product_name")
    )]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(value_type = String, example = "29.99")]
    pub price: BigDecimal,
}

/// Partial update. Status is only changed through the workflow endpoints.
#[derive(Deserialize, Debug, Validate, ToSchema)]
pub struct UpdateProduct {
    #[validate(
        length(max = 255, message = "Name must be 1-255 characters."),
        custom(function = "validate_product_name")
    )]
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, example = "29.99")]
    pub price: Option<BigDecimal>,
}

/// Names are stored trimmed, so whitespace alone counts as empty.
fn validate_product_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Name must be 1-255 characters.".into());
        return Err(err);
    }
    Ok(())
}

impl UpdateProduct {
    /// Checks if all fields in `UpdateProduct` are `None`, indicating no updates were provided.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.price.is_none()
    }
}

#[derive(Deserialize, Debug, Default, IntoParams)]
pub struct ProductFilterParams {
    pub status: Option<ProductStatus>,
    /// Case-insensitive match on product name
    pub search: Option<String>,
}

/// Price bounds arrive as raw strings; values that do not parse are ignored.
#[derive(Deserialize, Debug, Default, IntoParams)]
pub struct PublicProductFilterParams {
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

impl PublicProductFilterParams {
    /// Prices have two decimals, so `price >= 9.991` is `price >= 10.00`.
    pub fn min_price(&self) -> Option<BigDecimal> {
        parse_price_bound(self.min_price.as_deref(), RoundingMode::Ceiling)
    }

    /// Prices have two decimals, so `price <= 9.999` is `price <= 9.99`.
    pub fn max_price(&self) -> Option<BigDecimal> {
        parse_price_bound(self.max_price.as_deref(), RoundingMode::Floor)
    }
}

/// Number of digits left of the decimal point, computed without expanding the value.
/// Zero and values below one give zero or a negative count.
fn integer_digits(value: &BigDecimal) -> i64 {
    let normalized = value.normalized();
    let (_, scale) = normalized.as_bigint_and_exponent();
    (normalized.digits() as i64).saturating_sub(scale)
}

/// Parses a storefront bound and brings it into the range `NUMERIC(10, 2)` can compare.
///
/// Anything larger than every storable price is clamped just above the maximum,
/// anything closer to zero than a cent becomes zero.
fn parse_price_bound(raw: Option<&str>, rounding: RoundingMode) -> Option<BigDecimal> {
    let value = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<BigDecimal>().ok())?;

    if value.is_zero() {
        return Some(value);
    }
    let digits = integer_digits(&value);
    if digits > PRICE_INTEGER_DIGITS {
        let ceiling = BigDecimal::new(1.into(), -PRICE_INTEGER_DIGITS);
        return Some(if value.sign() == Sign::Minus { -ceiling } else { ceiling });
    }
    if digits < -PRICE_DECIMAL_PLACES {
        return Some(BigDecimal::zero());
    }
    let (_, scale) = value.as_bigint_and_exponent();
    if scale > PRICE_DECIMAL_PLACES {
        return Some(value.with_scale_round(PRICE_DECIMAL_PLACES, rounding));
    }
    Some(value)
}

/// Price must be positive and fit `NUMERIC(10, 2)`.
///
/// Only the exponent and mantissa length are inspected; the value is never rescaled.
pub fn validate_price(price: &BigDecimal) -> Result<(), &'static str> {
    if price.sign() != Sign::Plus {
        return Err("Price must be greater than zero.");
    }
    let (_, scale) = price.normalized().as_bigint_and_exponent();
    if scale > PRICE_DECIMAL_PLACES {
        return Err("Price must have at most 2 decimal places.");
    }
    if integer_digits(price) > PRICE_INTEGER_DIGITS {
        return Err("Price must have at most 8 digits before the decimal point.");
    }
    Ok(())
}
