use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::{AuditEntry, AuditLog};
use crate::schema::audit_log;

use super::models::NewAuditRow;

pub struct DieselAuditLog {
    pool: DbPool,
}

impl DieselAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AuditLog for DieselAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), DomainError> {
        log::info!(target: "audit", "{} {} by {}", entry.action, entry.aggregate_id, entry.actor);

        let mut conn = self.pool.get()?;
        diesel::insert_into(audit_log::table)
            .values(&NewAuditRow {
                id: Uuid::new_v4(),
                aggregate_id: entry.aggregate_id,
                action: entry.action.clone(),
                actor: entry.actor.clone(),
                details: entry.details.clone(),
            })
            .execute(&mut conn)?;
        Ok(())
    }
}
