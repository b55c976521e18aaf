//! Point-of-sale session state kept on the till before a sale is submitted.

pub mod cart;

pub use cart::{Cart, CartError, CartLine, CheckoutStage, PaymentState, ProductSnapshot};
