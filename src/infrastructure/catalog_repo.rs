//! Catalog reads and the conditional stock writes backing reservations.

use std::collections::HashMap;
use std::time::Duration;

use diesel::prelude::*;
use diesel::result::Error as DieselError;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::catalog::{CatalogEntry, StockTarget};
use crate::domain::errors::DomainError;
use crate::domain::ports::{CatalogService, StockLedger};
use crate::schema::{product_models, product_variants, products};

use super::models::{assemble_entry, ProductModelRow, ProductRow, ProductVariantRow};

pub struct DieselCatalog {
    pool: DbPool,
}

impl DieselCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CatalogService for DieselCatalog {
    fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, CatalogEntry>, DomainError> {
        let mut conn = self.pool.get()?;

        // One snapshot for products, models and variants.
        conn.build_transaction()
            .read_only()
            .repeatable_read()
            .run::<_, DomainError, _>(|conn| {
                let rows = products::table
                    .filter(products::id.eq_any(ids.to_vec()))
                    .select(ProductRow::as_select())
                    .load::<ProductRow>(conn)?;

                let models = ProductModelRow::belonging_to(&rows)
                    .select(ProductModelRow::as_select())
                    .load::<ProductModelRow>(conn)?
                    .grouped_by(&rows);
                let variants = ProductVariantRow::belonging_to(&rows)
                    .select(ProductVariantRow::as_select())
                    .load::<ProductVariantRow>(conn)?
                    .grouped_by(&rows);

                Ok(rows
                    .into_iter()
                    .zip(models)
                    .zip(variants)
                    .map(|((product, models), variants)| {
                        (product.id, assemble_entry(product, models, variants))
                    })
                    .collect())
            })
    }
}

/// Stock counters in Postgres. Every decrement is a single guarded `UPDATE`
/// so the row lock, not the caller, decides who gets the last unit.
pub struct DieselStockLedger {
    pool: DbPool,
    timeout: Duration,
}

impl DieselStockLedger {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn is_statement_timeout(e: &DieselError) -> bool {
    match e {
        DieselError::DatabaseError(_, info) => info.message().contains("statement timeout"),
        _ => false,
    }
}

/// `UPDATE ... SET stock = stock + delta WHERE <target> [AND stock >= -delta]`
fn apply_delta(
    conn: &mut PgConnection,
    target: &StockTarget,
    delta: i32,
    guarded: bool,
) -> QueryResult<usize> {
    let floor = if guarded { -delta } else { i32::MIN };
    match *target {
        StockTarget::Product(id) => diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::stock.ge(floor)),
        )
        .set(products::stock.eq(products::stock + delta))
        .execute(conn),
        StockTarget::Model {
            product_id,
            model_id,
        } => diesel::update(
            product_models::table
                .filter(product_models::id.eq(model_id))
                .filter(product_models::product_id.eq(product_id))
                .filter(product_models::stock.ge(floor)),
        )
        .set(product_models::stock.eq(product_models::stock + delta))
        .execute(conn),
        StockTarget::Variant {
            product_id,
            variant_id,
        } => diesel::update(
            product_variants::table
                .filter(product_variants::id.eq(variant_id))
                .filter(product_variants::product_id.eq(product_id))
                .filter(product_variants::stock.ge(floor)),
        )
        .set(product_variants::stock.eq(product_variants::stock + delta))
        .execute(conn),
    }
}

impl StockLedger for DieselStockLedger {
    fn try_decrement(&self, target: &StockTarget, quantity: i32) -> Result<bool, DomainError> {
        let product_id = target.product_id();
        let mut conn = self.pool.get().map_err(|e| {
            log::warn!("No connection for stock decrement of {}: {}", product_id, e);
            DomainError::StockTimeout(product_id)
        })?;

        let timeout_ms = self.timeout.as_millis();
        let result = conn.transaction::<_, DieselError, _>(|conn| {
            diesel::sql_query(format!("SET LOCAL statement_timeout = {timeout_ms}")).execute(conn)?;
            apply_delta(conn, target, -quantity, true)
        });

        match result {
            Ok(rows) => Ok(rows == 1),
            Err(e) if is_statement_timeout(&e) => {
                log::warn!(
                    "Stock decrement of {} timed out after {}ms",
                    product_id,
                    timeout_ms
                );
                Err(DomainError::StockTimeout(product_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn increment(&self, target: &StockTarget, quantity: i32) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let rows = apply_delta(&mut conn, target, quantity, false)?;
        if rows == 0 {
            return Err(DomainError::ProductNotFound(target.product_id()));
        }
        Ok(())
    }
}
