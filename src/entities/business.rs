use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::stock_alert::AlertChannel;

/// A tenant: every product, location, sale and alert belongs to exactly one business.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "businesses")]
#[schema(as = Business)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Recipient for email alerts
    pub email: Option<String>,
    /// Recipient for SMS and WhatsApp alerts
    pub phone: Option<String>,
    pub currency: String,
    /// Channel new low-stock alerts are tagged with and delivered over
    pub alert_channel: AlertChannel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Recipient for the configured alert channel, if one is on file.
    pub fn alert_recipient(&self) -> Option<&str> {
        let recipient = match self.alert_channel {
            AlertChannel::Email => self.email.as_deref(),
            AlertChannel::Sms | AlertChannel::Whatsapp => self.phone.as_deref(),
        };
        recipient.filter(|value| !value.trim().is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::location::Entity")]
    Locations,
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Locations.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert && matches!(active_model.created_at, ActiveValue::NotSet) {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn business(channel: AlertChannel) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Corner Shop".into(),
            email: Some("owner@corner.shop".into()),
            phone: Some("  ".into()),
            currency: "USD".into(),
            alert_channel: channel,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn recipient_follows_alert_channel() {
        assert_eq!(
            business(AlertChannel::Email).alert_recipient(),
            Some("owner@corner.shop")
        );
        // blank phone numbers count as missing
        assert_eq!(business(AlertChannel::Sms).alert_recipient(), None);
    }
}
