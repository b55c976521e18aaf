use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Retail POS API",
        version = "0.1.0",
        description = r#"
# Retail POS API

Inventory and point-of-sale backend for small retailers.

## Tenancy

Every endpoint except `POST /api/businesses` and the health probes acts on the
business named in the `X-Business-Id` header. Unknown ids are rejected with 404.

## Checkout

`POST /api/transactions` records a sale atomically: every line is decremented
with a conditional update inside one database transaction, and a single short
line rolls the whole sale back. Products that fall to their reorder level raise
a low-stock alert, delivered through the notification outbox.

## Errors

```json
{
  "error": "Bad Request",
  "message": "Insufficient stock for Espresso Beans (SKU BEAN-01): only 2 available, 5 requested",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "businesses", description = "Onboarding, settings and locations"),
        (name = "products", description = "Catalog and stock breakdown"),
        (name = "inventory", description = "Stock levels, adjustments, transfers and the movement ledger"),
        (name = "transactions", description = "Checkout and sales history"),
        (name = "alerts", description = "Low-stock alerts"),
        (name = "suppliers", description = "Supplier directory"),
        (name = "analytics", description = "Sales and inventory summaries"),
        (name = "health", description = "Health probes")
    ),
    paths(
        crate::health::health_check,
        crate::health::liveness,
        crate::handlers::businesses::create_business,
        crate::handlers::businesses::get_current_business,
        crate::handlers::businesses::update_current_business,
        crate::handlers::businesses::list_locations,
        crate::handlers::businesses::create_location,
        crate::handlers::businesses::update_location,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::expiring_products,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::set_stock,
        crate::handlers::inventory::adjust_stock,
        crate::handlers::inventory::transfer_stock,
        crate::handlers::inventory::list_movements,
        crate::handlers::transactions::list_transactions,
        crate::handlers::transactions::checkout,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::void_transaction,
        crate::handlers::alerts::list_alerts,
        crate::handlers::alerts::mark_alerts_read,
        crate::handlers::alerts::mark_alert_read,
        crate::handlers::alerts::unread_count,
        crate::handlers::suppliers::list_suppliers,
        crate::handlers::suppliers::create_supplier,
        crate::handlers::suppliers::get_supplier,
        crate::handlers::suppliers::update_supplier,
        crate::handlers::analytics::sales_summary,
        crate::handlers::analytics::inventory_summary,
    ),
    components(schemas(crate::errors::ErrorResponse, crate::ListQuery))
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_checkout_and_void() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Retail POS API"));
        assert!(json.contains("/api/transactions"));
        assert!(json.contains("/api/transactions/{id}/void"));
        assert!(json.contains("/api/locations/{id}"));
        assert!(json.contains("X-Business-Id"));
    }
}
