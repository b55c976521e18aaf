use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::Page;
use crate::entities::supplier;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSupplierInput {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    pub contact_name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSupplierInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub contact_name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DatabaseConnection>,
}

impl SupplierService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_supplier(
        &self,
        business_id: Uuid,
        input: CreateSupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let supplier = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            name: Set(input.name.trim().to_string()),
            contact_name: Set(input.contact_name),
            email: Set(input.email),
            phone: Set(input.phone),
            address: Set(input.address),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(supplier_id = %supplier.id, "Supplier created");
        Ok(supplier)
    }

    #[instrument(skip(self))]
    pub async fn list_suppliers(
        &self,
        business_id: Uuid,
        search: Option<String>,
        page: Page,
    ) -> Result<(Vec<supplier::Model>, u64), ServiceError> {
        let mut query =
            supplier::Entity::find().filter(supplier::Column::BusinessId.eq(business_id));
        if let Some(term) = search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(supplier::Column::Name.contains(term))
                    .add(supplier::Column::ContactName.contains(term))
                    .add(supplier::Column::Email.contains(term)),
            );
        }

        let paginator = query
            .order_by_asc(supplier::Column::Name)
            .paginate(&*self.db, page.limit);
        let total = paginator.num_items().await?;
        let suppliers = paginator.fetch_page(page.index()).await?;
        Ok((suppliers, total))
    }

    #[instrument(skip(self))]
    pub async fn get_supplier(
        &self,
        business_id: Uuid,
        supplier_id: Uuid,
    ) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(supplier_id)
            .filter(supplier::Column::BusinessId.eq(business_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))
    }

    #[instrument(skip(self))]
    pub async fn update_supplier(
        &self,
        business_id: Uuid,
        supplier_id: Uuid,
        input: UpdateSupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_supplier(business_id, supplier_id).await?;

        let mut active: supplier::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(contact_name) = input.contact_name {
            active.contact_name = Set(Some(contact_name));
        }
        if let Some(email) = input.email {
            active.email = Set(Some(email));
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = input.address {
            active.address = Set(Some(address));
        }

        let updated = active.update(&*self.db).await?;
        info!(supplier_id = %supplier_id, "Supplier updated");
        Ok(updated)
    }
}
