//! Stock and sale rules shared by the POS cart and the authoritative server paths.
//!
//! The cart calls these for fast feedback; checkout and inventory adjustments call
//! the same functions inside their database transactions, where the result is final.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::transaction::PaymentMethod;
use crate::errors::ServiceError;

/// Largest mismatch tolerated between a declared sale total and the computed one.
pub const TOTAL_TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockRuleError {
    #[error("Insufficient stock for {name} (SKU {sku}): only {available} available, {requested} requested")]
    InsufficientStock {
        name: String,
        sku: String,
        available: i32,
        requested: i32,
    },
    #[error("Quantity must be greater than zero (got {0})")]
    NonPositiveQuantity(i32),
    #[error("Quantity must not be negative (got {0})")]
    NegativeQuantity(i32),
    #[error("Unit price must not be negative")]
    NegativePrice,
    #[error("A sale needs at least one item")]
    EmptySale,
    #[error("Product {0} appears with different unit prices")]
    ConflictingPrices(Uuid),
    #[error("Declared total {declared} does not match item total {computed}")]
    TotalMismatch { declared: Decimal, computed: Decimal },
    #[error("Cash payments need an amount received")]
    MissingAmountReceived,
    #[error("Amount received {received} is less than the total {total}")]
    InsufficientPayment { received: Decimal, total: Decimal },
}

impl From<StockRuleError> for ServiceError {
    fn from(err: StockRuleError) -> Self {
        match err {
            StockRuleError::InsufficientStock { .. } => {
                ServiceError::InsufficientStock(err.to_string())
            }
            other => ServiceError::ValidationError(other.to_string()),
        }
    }
}

/// Requested quantities on sales and transfers must be strictly positive.
pub fn check_requested_quantity(quantity: i32) -> Result<(), StockRuleError> {
    if quantity <= 0 {
        return Err(StockRuleError::NonPositiveQuantity(quantity));
    }
    Ok(())
}

/// Absolute stock levels may be zero but never negative.
pub fn check_stock_level(quantity: i32) -> Result<(), StockRuleError> {
    if quantity < 0 {
        return Err(StockRuleError::NegativeQuantity(quantity));
    }
    Ok(())
}

/// The sufficiency rule: `requested` units can be taken only if `available >= requested`.
pub fn check_sufficiency(
    name: &str,
    sku: &str,
    available: i32,
    requested: i32,
) -> Result<(), StockRuleError> {
    check_requested_quantity(requested)?;
    if available < requested {
        return Err(StockRuleError::InsufficientStock {
            name: name.to_string(),
            sku: sku.to_string(),
            available: available.max(0),
            requested,
        });
    }
    Ok(())
}

/// A product needs reordering once its total stock is at or below its reorder level.
pub fn needs_reorder(total_quantity: i64, reorder_level: i32) -> bool {
    total_quantity <= i64::from(reorder_level)
}

pub fn low_stock_message(name: &str, sku: &str, quantity: i64, reorder_level: i32) -> String {
    format!(
        "Low stock alert: {} (SKU {}) has {} units remaining, at or below reorder level {}",
        name, sku, quantity, reorder_level
    )
}

/// One requested sale line after duplicate products have been folded together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl MergedLine {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// Validates lines and merges repeated products, keeping first-seen order.
pub fn merge_lines<I>(lines: I) -> Result<Vec<MergedLine>, StockRuleError>
where
    I: IntoIterator<Item = (Uuid, i32, Decimal)>,
{
    let mut merged: Vec<MergedLine> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for (product_id, quantity, unit_price) in lines {
        check_requested_quantity(quantity)?;
        if unit_price.is_sign_negative() && !unit_price.is_zero() {
            return Err(StockRuleError::NegativePrice);
        }

        match positions.get(&product_id) {
            Some(&idx) => {
                let line = &mut merged[idx];
                if line.unit_price != unit_price {
                    return Err(StockRuleError::ConflictingPrices(product_id));
                }
                line.quantity = line.quantity.saturating_add(quantity);
            }
            None => {
                positions.insert(product_id, merged.len());
                merged.push(MergedLine {
                    product_id,
                    quantity,
                    unit_price,
                });
            }
        }
    }

    if merged.is_empty() {
        return Err(StockRuleError::EmptySale);
    }
    Ok(merged)
}

pub fn subtotal(lines: &[MergedLine]) -> Decimal {
    lines.iter().map(MergedLine::line_total).sum()
}

/// The declared total must match the item total within [`TOTAL_TOLERANCE`].
pub fn check_declared_total(computed: Decimal, declared: Decimal) -> Result<(), StockRuleError> {
    if (computed - declared).abs() > TOTAL_TOLERANCE {
        return Err(StockRuleError::TotalMismatch { declared, computed });
    }
    Ok(())
}

/// Change owed to the customer. Cash requires an amount covering the total;
/// other methods may omit it and never produce change.
pub fn change_due(
    method: PaymentMethod,
    total: Decimal,
    amount_received: Option<Decimal>,
) -> Result<Option<Decimal>, StockRuleError> {
    match (method, amount_received) {
        (PaymentMethod::Cash, None) => Err(StockRuleError::MissingAmountReceived),
        (PaymentMethod::Cash, Some(received)) if received < total => {
            Err(StockRuleError::InsufficientPayment { received, total })
        }
        (PaymentMethod::Cash, Some(received)) => Ok(Some(received - total)),
        (_, _) => Ok(None),
    }
}
