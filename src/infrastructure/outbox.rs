use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::{NotificationSink, OrderNotification};
use crate::schema::commerce_order_outbox;

use super::models::NewOutboxEventRow;

/// Writes order notifications to the outbox table. Debezium's EventRouter SMT
/// derives the Kafka topic from `aggregate_type`.
pub struct DieselOutboxSink {
    pool: DbPool,
}

impl DieselOutboxSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl NotificationSink for DieselOutboxSink {
    fn publish(&self, notification: &OrderNotification) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        diesel::insert_into(commerce_order_outbox::table)
            .values(&NewOutboxEventRow {
                id: Uuid::new_v4(),
                aggregate_type: "Order".to_string(),
                aggregate_id: notification.order_id.to_string(),
                event_type: notification.event_type.clone(),
                payload: notification.payload.clone(),
            })
            .execute(&mut conn)?;

        log::debug!(
            "Queued {} for order {} in outbox",
            notification.event_type,
            notification.order_id
        );
        Ok(())
    }
}
