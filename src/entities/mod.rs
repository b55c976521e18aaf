//! sea-orm entities backing the retail POS schema.

pub mod business;
pub mod location;
pub mod notification_outbox;
pub mod product;
pub mod product_stock;
pub mod stock_alert;
pub mod stock_movement;
pub mod supplier;
pub mod transaction;
pub mod transaction_item;
