use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::transaction::PaymentMethod;
use crate::services::checkout::{CheckoutLine, CheckoutRequest};
use crate::stock_rules::{self, StockRuleError};

/// What the till knows about a product when it is scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub unit_price: Decimal,
    /// Units on hand at the till's location when the snapshot was taken
    pub available: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartLine {
    pub product: ProductSnapshot,
    pub quantity: i32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.product.unit_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    Cart,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Initial,
    Completed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error(transparent)]
    Stock(#[from] StockRuleError),
    #[error("Cart is in the {actual:?} stage, expected {expected:?}")]
    WrongStage {
        expected: CheckoutStage,
        actual: CheckoutStage,
    },
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Product {0} is not in the cart")]
    UnknownProduct(Uuid),
    #[error("Payment has already been completed")]
    AlreadyPaid,
}

/// Two-step till flow: items are collected in the `Cart` stage, then the sale moves
/// to `Payment` where it is settled once. Every quantity change is checked against
/// the snapshot's availability with the same rule the server enforces.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Cart {
    location_id: Uuid,
    lines: Vec<CartLine>,
    stage: CheckoutStage,
    payment: PaymentState,
    payment_method: Option<PaymentMethod>,
    amount_received: Option<Decimal>,
}

impl Cart {
    pub fn new(location_id: Uuid) -> Self {
        Self {
            location_id,
            lines: Vec::new(),
            stage: CheckoutStage::Cart,
            payment: PaymentState::Initial,
            payment_method: None,
            amount_received: None,
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn stage(&self) -> CheckoutStage {
        self.stage
    }

    pub fn payment_state(&self) -> PaymentState {
        self.payment
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn item_count(&self) -> i32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn total(&self) -> Decimal {
        self.subtotal()
    }

    fn ensure_stage(&self, expected: CheckoutStage) -> Result<(), CartError> {
        if self.stage != expected {
            return Err(CartError::WrongStage {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    /// Adds units of a product, merging with an existing line.
    pub fn add_item(&mut self, product: ProductSnapshot, quantity: i32) -> Result<(), CartError> {
        self.ensure_stage(CheckoutStage::Cart)?;
        stock_rules::check_requested_quantity(quantity)?;

        match self
            .lines
            .iter_mut()
            .find(|line| line.product.product_id == product.product_id)
        {
            Some(line) => {
                let wanted = line.quantity.saturating_add(quantity);
                stock_rules::check_sufficiency(
                    &product.name,
                    &product.sku,
                    product.available,
                    wanted,
                )?;
                // a fresher snapshot replaces the old one
                line.product = product;
                line.quantity = wanted;
            }
            None => {
                stock_rules::check_sufficiency(
                    &product.name,
                    &product.sku,
                    product.available,
                    quantity,
                )?;
                self.lines.push(CartLine { product, quantity });
            }
        }
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: i32) -> Result<(), CartError> {
        self.ensure_stage(CheckoutStage::Cart)?;
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        let line = self
            .lines
            .iter_mut()
            .find(|line| line.product.product_id == product_id)
            .ok_or(CartError::UnknownProduct(product_id))?;
        stock_rules::check_sufficiency(
            &line.product.name,
            &line.product.sku,
            line.product.available,
            quantity,
        )?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        self.ensure_stage(CheckoutStage::Cart)?;
        let before = self.lines.len();
        self.lines
            .retain(|line| line.product.product_id != product_id);
        if self.lines.len() == before {
            return Err(CartError::UnknownProduct(product_id));
        }
        Ok(())
    }

    pub fn proceed_to_payment(&mut self) -> Result<(), CartError> {
        self.ensure_stage(CheckoutStage::Cart)?;
        if self.lines.is_empty() {
            return Err(CartError::EmptyCart);
        }
        self.stage = CheckoutStage::Payment;
        Ok(())
    }

    pub fn back_to_cart(&mut self) -> Result<(), CartError> {
        self.ensure_stage(CheckoutStage::Payment)?;
        if self.payment == PaymentState::Completed {
            return Err(CartError::AlreadyPaid);
        }
        self.stage = CheckoutStage::Cart;
        Ok(())
    }

    /// Change owed for a cash tender of `amount_received`.
    pub fn change_due(&self, amount_received: Decimal) -> Result<Decimal, CartError> {
        let change =
            stock_rules::change_due(PaymentMethod::Cash, self.total(), Some(amount_received))?;
        Ok(change.unwrap_or(Decimal::ZERO))
    }

    /// Settles the cart and returns the request to submit to checkout.
    pub fn complete_payment(
        &mut self,
        method: PaymentMethod,
        amount_received: Option<Decimal>,
    ) -> Result<CheckoutRequest, CartError> {
        self.ensure_stage(CheckoutStage::Payment)?;
        if self.payment == PaymentState::Completed {
            return Err(CartError::AlreadyPaid);
        }
        stock_rules::change_due(method, self.total(), amount_received)?;

        self.payment = PaymentState::Completed;
        self.payment_method = Some(method);
        self.amount_received = amount_received;
        Ok(self.to_request())
    }

    pub fn to_request(&self) -> CheckoutRequest {
        CheckoutRequest {
            location_id: self.location_id,
            items: self
                .lines
                .iter()
                .map(|line| CheckoutLine {
                    product_id: line.product.product_id,
                    quantity: line.quantity,
                    unit_price: line.product.unit_price,
                })
                .collect(),
            payment_method: self.payment_method.unwrap_or(PaymentMethod::Cash),
            total: self.total(),
            amount_received: self.amount_received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn snapshot(name: &str, price: Decimal, available: i32) -> ProductSnapshot {
        ProductSnapshot {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            sku: format!("SKU-{}", name.to_uppercase()),
            unit_price: price,
            available,
        }
    }

    #[test]
    fn adding_beyond_availability_uses_server_message() {
        let mut cart = Cart::new(Uuid::new_v4());
        let tea = snapshot("tea", dec!(3.00), 2);

        let err = cart.add_item(tea, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for tea (SKU SKU-TEA): only 2 available, 5 requested"
        );
        assert!(cart.lines().is_empty());
    }

    #[test]
    fn merging_lines_respects_ceiling() {
        let mut cart = Cart::new(Uuid::new_v4());
        let beans = snapshot("beans", dec!(12.50), 3);

        cart.add_item(beans.clone(), 2).unwrap();
        assert_matches!(
            cart.add_item(beans.clone(), 2),
            Err(CartError::Stock(StockRuleError::InsufficientStock { available: 3, .. }))
        );
        cart.add_item(beans, 1).unwrap();
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), dec!(37.50));
    }

    #[test]
    fn set_quantity_zero_removes_line() {
        let mut cart = Cart::new(Uuid::new_v4());
        let milk = snapshot("milk", dec!(1.20), 10);
        let id = milk.product_id;
        cart.add_item(milk, 1).unwrap();

        cart.set_quantity(id, 4).unwrap();
        assert_eq!(cart.item_count(), 4);
        cart.set_quantity(id, 0).unwrap();
        assert!(cart.lines().is_empty());
        assert_eq!(cart.set_quantity(id, 1), Err(CartError::UnknownProduct(id)));
    }

    #[test]
    fn stage_transitions_are_enforced() {
        let mut cart = Cart::new(Uuid::new_v4());
        assert_eq!(cart.proceed_to_payment(), Err(CartError::EmptyCart));

        let bread = snapshot("bread", dec!(2.00), 5);
        cart.add_item(bread.clone(), 1).unwrap();
        cart.proceed_to_payment().unwrap();
        assert_eq!(cart.stage(), CheckoutStage::Payment);

        assert_matches!(
            cart.add_item(bread, 1),
            Err(CartError::WrongStage {
                expected: CheckoutStage::Cart,
                actual: CheckoutStage::Payment
            })
        );

        cart.back_to_cart().unwrap();
        assert_eq!(cart.stage(), CheckoutStage::Cart);
    }

    #[test]
    fn cash_payment_builds_checkout_request() {
        let location = Uuid::new_v4();
        let mut cart = Cart::new(location);
        let coffee = snapshot("coffee", dec!(4.25), 8);
        let coffee_id = coffee.product_id;
        cart.add_item(coffee, 2).unwrap();
        cart.proceed_to_payment().unwrap();

        assert_eq!(cart.change_due(dec!(10)).unwrap(), dec!(1.50));
        assert_matches!(
            cart.complete_payment(PaymentMethod::Cash, Some(dec!(5))),
            Err(CartError::Stock(StockRuleError::InsufficientPayment { .. }))
        );
        assert_eq!(cart.payment_state(), PaymentState::Initial);

        let request = cart
            .complete_payment(PaymentMethod::Cash, Some(dec!(10)))
            .unwrap();
        assert_eq!(request.location_id, location);
        assert_eq!(request.total, dec!(8.50));
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].product_id, coffee_id);
        assert_eq!(request.items[0].quantity, 2);
        assert_eq!(cart.payment_state(), PaymentState::Completed);

        assert_eq!(
            cart.complete_payment(PaymentMethod::Cash, Some(dec!(10))),
            Err(CartError::AlreadyPaid)
        );
        assert_eq!(cart.back_to_cart(), Err(CartError::AlreadyPaid));
    }

    #[test]
    fn card_payment_needs_no_tender() {
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_item(snapshot("soap", dec!(3.10), 4), 1).unwrap();
        cart.proceed_to_payment().unwrap();

        let request = cart.complete_payment(PaymentMethod::Card, None).unwrap();
        assert_eq!(request.payment_method, PaymentMethod::Card);
        assert_eq!(request.amount_received, None);
    }
}
