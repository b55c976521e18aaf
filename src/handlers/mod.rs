//! HTTP handlers, one router per resource.

pub mod alerts;
pub mod analytics;
pub mod businesses;
pub mod common;
pub mod inventory;
pub mod products;
pub mod suppliers;
pub mod transactions;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    alerts::AlertService, analytics::AnalyticsService, business::BusinessService,
    checkout::CheckoutService, inventory::InventoryService, products::ProductService,
    suppliers::SupplierService,
};
use crate::AppState;

/// Header selecting the tenant a request acts on.
pub const BUSINESS_ID_HEADER: &str = "x-business-id";

#[derive(Clone)]
pub struct AppServices {
    pub businesses: Arc<BusinessService>,
    pub products: Arc<ProductService>,
    pub inventory: Arc<InventoryService>,
    pub checkout: Arc<CheckoutService>,
    pub alerts: Arc<AlertService>,
    pub suppliers: Arc<SupplierService>,
    pub analytics: Arc<AnalyticsService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            businesses: Arc::new(BusinessService::new(db_pool.clone(), event_sender.clone())),
            products: Arc::new(ProductService::new(db_pool.clone(), event_sender.clone())),
            inventory: Arc::new(InventoryService::new(db_pool.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(db_pool.clone(), event_sender)),
            alerts: Arc::new(AlertService::new(db_pool.clone())),
            suppliers: Arc::new(SupplierService::new(db_pool.clone())),
            analytics: Arc::new(AnalyticsService::new(db_pool)),
        }
    }
}

/// The business a request is scoped to, taken from the `X-Business-Id` header.
///
/// This selects a tenant; it does not authenticate the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessContext {
    pub business_id: Uuid,
}

impl BusinessContext {
    pub fn parse(value: Option<&str>) -> Result<Self, ServiceError> {
        let raw = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Missing X-Business-Id header".to_string()))?;
        let business_id = Uuid::parse_str(raw).map_err(|_| {
            ServiceError::BadRequest("X-Business-Id header must be a UUID".to_string())
        })?;
        Ok(Self { business_id })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for BusinessContext {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(BUSINESS_ID_HEADER)
            .map(|value| value.to_str().unwrap_or_default());
        let context = Self::parse(header)?;

        // unknown tenants are rejected before any handler runs
        crate::services::business::load_business(&*state.db, context.business_id).await?;
        Ok(context)
    }
}
