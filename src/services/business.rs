use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::entities::stock_alert::AlertChannel;
use crate::entities::{business, location};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

pub const DEFAULT_LOCATION_NAME: &str = "Main Store";
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBusinessInput {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 32, message = "phone must be 3 to 32 characters"))]
    pub phone: Option<String>,
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
    pub alert_channel: Option<AlertChannel>,
    /// Name of the location created with the business
    #[validate(length(min = 1, max = 200))]
    pub location_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBusinessInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 32, message = "phone must be 3 to 32 characters"))]
    pub phone: Option<String>,
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
    pub alert_channel: Option<AlertChannel>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLocationInput {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    pub address: Option<String>,
}

/// Partial location update. `is_active: false` closes the location to sales
/// and stock movements without deleting its history.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLocationInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BusinessWithLocations {
    #[serde(flatten)]
    pub business: business::Model,
    pub locations: Vec<location::Model>,
}

/// Loads a business by id.
pub(crate) async fn load_business<C>(conn: &C, business_id: Uuid) -> Result<business::Model, ServiceError>
where
    C: ConnectionTrait,
{
    business::Entity::find_by_id(business_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Business", business_id))
}

/// Loads a location and checks that it belongs to `business_id`.
pub(crate) async fn ensure_location<C>(
    conn: &C,
    business_id: Uuid,
    location_id: Uuid,
) -> Result<location::Model, ServiceError>
where
    C: ConnectionTrait,
{
    location::Entity::find_by_id(location_id)
        .filter(location::Column::BusinessId.eq(business_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Location", location_id))
}

/// Like [`ensure_location`], but also rejects deactivated locations.
pub(crate) async fn ensure_active_location<C>(
    conn: &C,
    business_id: Uuid,
    location_id: Uuid,
) -> Result<location::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let location = ensure_location(conn, business_id, location_id).await?;
    if !location.is_active {
        return Err(ServiceError::InvalidOperation(format!(
            "Location {} is inactive",
            location.name
        )));
    }
    Ok(location)
}

/// Onboarding and tenant settings.
#[derive(Clone)]
pub struct BusinessService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl BusinessService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a business together with its first location.
    #[instrument(skip(self))]
    pub async fn create_business(
        &self,
        input: CreateBusinessInput,
    ) -> Result<BusinessWithLocations, ServiceError> {
        input.validate()?;

        let created = db::with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let business_id = Uuid::new_v4();
                let business = business::ActiveModel {
                    id: Set(business_id),
                    name: Set(input.name.trim().to_string()),
                    email: Set(input.email),
                    phone: Set(input.phone),
                    currency: Set(input
                        .currency
                        .map(|c| c.to_uppercase())
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())),
                    alert_channel: Set(input.alert_channel.unwrap_or(AlertChannel::Email)),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                let location = location::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    business_id: Set(business_id),
                    name: Set(input
                        .location_name
                        .unwrap_or_else(|| DEFAULT_LOCATION_NAME.to_string())),
                    address: Set(input.address),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                Ok(BusinessWithLocations {
                    business,
                    locations: vec![location],
                })
            })
        })
        .await?;

        info!(business_id = %created.business.id, "Business onboarded");
        self.event_sender
            .send_or_log(Event::BusinessCreated(created.business.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_business(&self, business_id: Uuid) -> Result<BusinessWithLocations, ServiceError> {
        let business = load_business(&*self.db, business_id).await?;
        let locations = self.list_locations(business_id).await?;
        Ok(BusinessWithLocations {
            business,
            locations,
        })
    }

    #[instrument(skip(self))]
    pub async fn update_business(
        &self,
        business_id: Uuid,
        input: UpdateBusinessInput,
    ) -> Result<business::Model, ServiceError> {
        input.validate()?;
        let existing = load_business(&*self.db, business_id).await?;

        let mut active: business::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = input.email {
            active.email = Set(Some(email));
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(currency) = input.currency {
            active.currency = Set(currency.to_uppercase());
        }
        if let Some(channel) = input.alert_channel {
            active.alert_channel = Set(channel);
        }

        let updated = active.update(&*self.db).await?;
        info!(business_id = %business_id, "Business updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn create_location(
        &self,
        business_id: Uuid,
        input: CreateLocationInput,
    ) -> Result<location::Model, ServiceError> {
        input.validate()?;
        load_business(&*self.db, business_id).await?;

        let location = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            name: Set(input.name.trim().to_string()),
            address: Set(input.address),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(location_id = %location.id, "Location created");
        Ok(location)
    }

    #[instrument(skip(self))]
    pub async fn update_location(
        &self,
        business_id: Uuid,
        location_id: Uuid,
        input: UpdateLocationInput,
    ) -> Result<location::Model, ServiceError> {
        input.validate()?;
        let existing = ensure_location(&*self.db, business_id, location_id).await?;

        let mut active: location::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(address) = input.address {
            active.address = Set(Some(address));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db).await?;
        info!(location_id = %location_id, is_active = updated.is_active, "Location updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn list_locations(&self, business_id: Uuid) -> Result<Vec<location::Model>, ServiceError> {
        Ok(location::Entity::find()
            .filter(location::Column::BusinessId.eq(business_id))
            .order_by_asc(location::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
