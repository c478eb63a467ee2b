use bigdecimal::{BigDecimal, RoundingMode};
use uuid::Uuid;

use super::catalog::CatalogEntry;
use super::errors::DomainError;

/// Rounds to the currency unit (two decimal places, half-up).
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// Buyer-side inputs that influence the unit price.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingContext {
    pub is_wholesale: bool,
    pub wholesale_discount_pct: BigDecimal,
    pub is_intra_state: bool,
}

impl PricingContext {
    pub fn retail(is_intra_state: bool) -> Self {
        Self {
            is_wholesale: false,
            wholesale_discount_pct: BigDecimal::from(0),
            is_intra_state,
        }
    }
}

/// Resolves the authoritative unit price for a selection.
///
/// Precedence is variant price, model price, product selling price, then MRP.
/// Client-declared prices never enter here. The wholesale discount is applied
/// to the resolved price and rounded once, afterwards.
pub fn resolve_unit_price(
    entry: &CatalogEntry,
    model_id: Option<Uuid>,
    variant_id: Option<Uuid>,
    is_wholesale: bool,
    wholesale_discount_pct: &BigDecimal,
) -> Result<BigDecimal, DomainError> {
    let variant_price = variant_id
        .and_then(|v| entry.variant(model_id, v))
        .and_then(|v| v.price.clone());
    let model_price = model_id
        .and_then(|m| entry.model(m))
        .and_then(|m| m.price.clone());

    let base = variant_price
        .or(model_price)
        .or_else(|| entry.selling_price.clone())
        .unwrap_or_else(|| entry.mrp.clone());

    let zero = BigDecimal::from(0);
    if base < zero {
        return Err(DomainError::Internal(format!(
            "negative catalog price for product {}",
            entry.product_id
        )));
    }

    if !is_wholesale || *wholesale_discount_pct <= zero {
        return Ok(base);
    }
    if *wholesale_discount_pct > BigDecimal::from(100) {
        return Err(DomainError::invalid(format!(
            "wholesale discount {wholesale_discount_pct}% exceeds 100%"
        )));
    }

    let hundred = BigDecimal::from(100);
    let discounted = &base * (&hundred - wholesale_discount_pct) / hundred;
    Ok(round_money(&discounted))
}
