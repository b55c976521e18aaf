use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::stock::stock_totals;
use crate::entities::transaction::{self, PaymentMethod, TransactionStatus};
use crate::entities::{product, transaction_item};
use crate::errors::ServiceError;
use crate::stock_rules;

const TOP_PRODUCT_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct SalesRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaymentMethodTotal {
    pub payment_method: PaymentMethod,
    pub transaction_count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub units_sold: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SalesSummary {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub transaction_count: u64,
    pub revenue: Decimal,
    pub units_sold: i64,
    pub average_ticket: Decimal,
    pub by_payment_method: Vec<PaymentMethodTotal>,
    pub top_products: Vec<TopProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InventorySummary {
    pub product_count: u64,
    pub total_units: i64,
    pub low_stock_count: u64,
    pub out_of_stock_count: u64,
    /// Units valued at cost price, or sale price when no cost is recorded
    pub stock_value: Decimal,
}

/// Folds completed sales and their items into a summary.
pub fn summarize_sales(
    transactions: &[transaction::Model],
    items: &[transaction_item::Model],
    range: &SalesRange,
) -> SalesSummary {
    let completed: Vec<&transaction::Model> = transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
        .collect();
    let completed_ids: std::collections::HashSet<Uuid> = completed.iter().map(|t| t.id).collect();

    let revenue: Decimal = completed.iter().map(|t| t.total).sum();
    let transaction_count = completed.len() as u64;
    let average_ticket = if transaction_count == 0 {
        Decimal::ZERO
    } else {
        (revenue / Decimal::from(transaction_count)).round_dp(2)
    };

    let mut by_method: HashMap<PaymentMethod, PaymentMethodTotal> = HashMap::new();
    for t in &completed {
        let entry = by_method
            .entry(t.payment_method)
            .or_insert_with(|| PaymentMethodTotal {
                payment_method: t.payment_method,
                transaction_count: 0,
                revenue: Decimal::ZERO,
            });
        entry.transaction_count += 1;
        entry.revenue += t.total;
    }
    let mut by_payment_method: Vec<PaymentMethodTotal> = by_method.into_values().collect();
    by_payment_method.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.payment_method.to_string().cmp(&b.payment_method.to_string()))
    });

    let mut products: HashMap<Uuid, TopProduct> = HashMap::new();
    let mut units_sold = 0_i64;
    for item in items.iter().filter(|i| completed_ids.contains(&i.transaction_id)) {
        units_sold += i64::from(item.quantity);
        let entry = products.entry(item.product_id).or_insert_with(|| TopProduct {
            product_id: item.product_id,
            name: item.product_name.clone(),
            sku: item.sku.clone(),
            units_sold: 0,
            revenue: Decimal::ZERO,
        });
        entry.units_sold += i64::from(item.quantity);
        entry.revenue += item.line_total;
    }
    let mut top_products: Vec<TopProduct> = products.into_values().collect();
    top_products.sort_by(|a, b| {
        b.units_sold
            .cmp(&a.units_sold)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.name.cmp(&b.name))
    });
    top_products.truncate(TOP_PRODUCT_LIMIT);

    SalesSummary {
        from: range.from,
        to: range.to,
        transaction_count,
        revenue,
        units_sold,
        average_ticket,
        by_payment_method,
        top_products,
    }
}

pub fn summarize_inventory(
    products: &[product::Model],
    totals: &HashMap<Uuid, i64>,
) -> InventorySummary {
    let mut summary = InventorySummary {
        product_count: products.len() as u64,
        total_units: 0,
        low_stock_count: 0,
        out_of_stock_count: 0,
        stock_value: Decimal::ZERO,
    };

    for product in products {
        let units = totals.get(&product.id).copied().unwrap_or(0);
        summary.total_units += units;
        if units <= 0 {
            summary.out_of_stock_count += 1;
        }
        if stock_rules::needs_reorder(units, product.reorder_level) {
            summary.low_stock_count += 1;
        }
        let unit_value = product.cost_price.unwrap_or(product.price);
        summary.stock_value += unit_value * Decimal::from(units);
    }
    summary
}

#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn sales_summary(
        &self,
        business_id: Uuid,
        range: SalesRange,
    ) -> Result<SalesSummary, ServiceError> {
        let mut query = transaction::Entity::find()
            .filter(transaction::Column::BusinessId.eq(business_id))
            .filter(transaction::Column::Status.eq(TransactionStatus::Completed));
        if let Some(from) = range.from {
            query = query.filter(transaction::Column::CreatedAt.gte(from));
        }
        if let Some(to) = range.to {
            query = query.filter(transaction::Column::CreatedAt.lte(to));
        }
        let transactions = query.all(&*self.db).await?;

        let items = if transactions.is_empty() {
            Vec::new()
        } else {
            transaction_item::Entity::find()
                .filter(
                    transaction_item::Column::TransactionId
                        .is_in(transactions.iter().map(|t| t.id)),
                )
                .all(&*self.db)
                .await?
        };

        let summary = summarize_sales(&transactions, &items, &range);
        info!(
            transactions = summary.transaction_count,
            revenue = %summary.revenue,
            "Sales summary generated"
        );
        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn inventory_summary(&self, business_id: Uuid) -> Result<InventorySummary, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::BusinessId.eq(business_id))
            .all(&*self.db)
            .await?;
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let totals = stock_totals(&*self.db, &ids).await?;
        Ok(summarize_inventory(&products, &totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sale(method: PaymentMethod, total: Decimal, status: TransactionStatus) -> transaction::Model {
        let id = Uuid::new_v4();
        transaction::Model {
            id,
            business_id: Uuid::nil(),
            location_id: Uuid::nil(),
            receipt_number: transaction::receipt_number(id, Utc::now()),
            payment_method: method,
            subtotal: total,
            total,
            amount_received: None,
            change_given: None,
            status,
            created_at: Utc::now(),
            voided_at: None,
        }
    }

    fn item(transaction_id: Uuid, product_id: Uuid, name: &str, qty: i32, price: Decimal) -> transaction_item::Model {
        transaction_item::Model {
            id: Uuid::new_v4(),
            transaction_id,
            product_id,
            product_name: name.to_string(),
            sku: name.to_uppercase(),
            quantity: qty,
            unit_price: price,
            line_total: price * Decimal::from(qty),
        }
    }

    #[test]
    fn sales_summary_ignores_voided_sales() {
        let tea = Uuid::new_v4();
        let cake = Uuid::new_v4();
        let a = sale(PaymentMethod::Cash, dec!(9.00), TransactionStatus::Completed);
        let b = sale(PaymentMethod::Card, dec!(4.00), TransactionStatus::Completed);
        let voided = sale(PaymentMethod::Card, dec!(100.00), TransactionStatus::Voided);
        let items = vec![
            item(a.id, tea, "tea", 3, dec!(3.00)),
            item(b.id, cake, "cake", 1, dec!(4.00)),
            item(voided.id, cake, "cake", 25, dec!(4.00)),
        ];

        let summary = summarize_sales(&[a, b, voided], &items, &SalesRange::default());
        assert_eq!(summary.transaction_count, 2);
        assert_eq!(summary.revenue, dec!(13.00));
        assert_eq!(summary.units_sold, 4);
        assert_eq!(summary.average_ticket, dec!(6.50));
        assert_eq!(summary.top_products[0].product_id, tea);
        assert_eq!(summary.by_payment_method[0].payment_method, PaymentMethod::Cash);
        assert_eq!(summary.by_payment_method.len(), 2);
    }

    #[test]
    fn empty_sales_have_zero_average() {
        let summary = summarize_sales(&[], &[], &SalesRange::default());
        assert_eq!(summary.average_ticket, Decimal::ZERO);
        assert!(summary.top_products.is_empty());
    }

    #[test]
    fn inventory_value_prefers_cost_price() {
        let now = Utc::now();
        let base = product::Model {
            id: Uuid::new_v4(),
            business_id: Uuid::nil(),
            name: "Rice".into(),
            sku: "RICE".into(),
            category: None,
            description: None,
            price: dec!(5.00),
            cost_price: Some(dec!(3.00)),
            reorder_level: 10,
            supplier_id: None,
            expiry_date: None,
            created_at: now,
            updated_at: now,
        };
        let no_cost = product::Model {
            id: Uuid::new_v4(),
            sku: "SALT".into(),
            cost_price: None,
            price: dec!(2.00),
            reorder_level: 0,
            ..base.clone()
        };
        let totals = HashMap::from([(base.id, 20), (no_cost.id, 0)]);

        let summary = summarize_inventory(&[base, no_cost], &totals);
        assert_eq!(summary.product_count, 2);
        assert_eq!(summary.total_units, 20);
        assert_eq!(summary.stock_value, dec!(60.00));
        assert_eq!(summary.out_of_stock_count, 1);
        // zero units at reorder level zero still counts as low
        assert_eq!(summary.low_stock_count, 1);
    }
}
