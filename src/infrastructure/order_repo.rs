use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::Order;
use crate::domain::ports::{ListResult, OrderRepository};
use crate::domain::workflow::{OrderStatus, PaymentStatus, StatusEvent};
use crate::schema::{order_lines, order_status_events, orders};

use super::models::{
    NewOrderLineRow, NewOrderRow, NewStatusEventRow, OrderLineRow, OrderRow, StatusEventRow,
};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

fn is_invoice_clash(e: &DieselError) -> bool {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => info
            .constraint_name()
            .map_or(true, |name| name.contains("invoice")),
        _ => false,
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Distinguishes "no such order" from "the guarded column moved" after a
/// conditional update touched no rows.
fn missed_update(conn: &mut PgConnection, id: Uuid, what: String) -> DomainError {
    let exists = diesel::select(diesel::dsl::exists(orders::table.filter(orders::id.eq(id))))
        .get_result::<bool>(conn);
    match exists {
        Ok(true) => DomainError::ConcurrentConflict(what),
        Ok(false) => DomainError::OrderNotFound,
        Err(e) => e.into(),
    }
}

impl OrderRepository for DieselOrderRepository {
    fn insert(&self, order: &Order, initial_event: &StatusEvent) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            diesel::insert_into(orders::table)
                .values(&NewOrderRow::from(order))
                .execute(conn)
                .map_err(|e| {
                    if is_invoice_clash(&e) {
                        DomainError::DuplicateInvoice(order.invoice_number.clone())
                    } else {
                        e.into()
                    }
                })?;

            let lines: Vec<NewOrderLineRow> = order
                .lines
                .iter()
                .zip(1..)
                .map(|(line, line_no)| NewOrderLineRow::new(order.id, line_no, line))
                .collect();
            diesel::insert_into(order_lines::table)
                .values(&lines)
                .execute(conn)?;

            diesel::insert_into(order_status_events::table)
                .values(&NewStatusEventRow::from(initial_event))
                .execute(conn)?;

            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let order = orders::table
            .filter(orders::id.eq(id))
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(order) = order else {
            return Ok(None);
        };

        let lines = OrderLineRow::belonging_to(&order)
            .select(OrderLineRow::as_select())
            .order(order_lines::line_no.asc())
            .load::<OrderLineRow>(&mut conn)?;

        order.into_order(lines).map(Some)
    }

    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let offset = page.saturating_sub(1).saturating_mul(limit).max(0);
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = orders::table.count().get_result(conn)?;

            let rows = orders::table
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<OrderRow>(conn)?;

            let lines = OrderLineRow::belonging_to(&rows)
                .select(OrderLineRow::as_select())
                .order(order_lines::line_no.asc())
                .load::<OrderLineRow>(conn)?;

            let items = lines
                .grouped_by(&rows)
                .into_iter()
                .zip(rows)
                .map(|(lines, row)| row.into_order(lines))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ListResult { items, total })
        })
    }

    fn transition(&self, id: Uuid, expected: OrderStatus, event: &StatusEvent) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(id))
                    .filter(orders::status.eq(expected.as_str())),
            )
            .set((
                orders::status.eq(event.status.as_str()),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

            if updated == 0 {
                return Err(missed_update(
                    conn,
                    id,
                    format!("order {id} is no longer {expected}"),
                ));
            }

            diesel::insert_into(order_status_events::table)
                .values(&NewStatusEventRow::from(event))
                .execute(conn)?;
            Ok(())
        })
    }

    fn set_payment_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        let updated = diesel::update(
            orders::table
                .filter(orders::id.eq(id))
                .filter(orders::payment_status.eq(expected.as_str())),
        )
        .set((
            orders::payment_status.eq(new.as_str()),
            orders::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        if updated == 0 {
            return Err(missed_update(
                &mut conn,
                id,
                format!("payment of order {id} is no longer {expected}"),
            ));
        }
        Ok(())
    }

    fn apply_tax_exemption(&self, order: &Order) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(order.id))
                    .filter(orders::tax_exempt.eq(false)),
            )
            .set((
                orders::subtotal.eq(&order.subtotal),
                orders::tax_total.eq(&order.tax_total),
                orders::grand_total.eq(&order.grand_total),
                orders::tax_exempt.eq(true),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

            if updated == 0 {
                return Err(missed_update(
                    conn,
                    order.id,
                    format!("order {} already exempted", order.id),
                ));
            }

            for (line, line_no) in order.lines.iter().zip(1..) {
                diesel::update(
                    order_lines::table
                        .filter(order_lines::order_id.eq(order.id))
                        .filter(order_lines::line_no.eq(line_no)),
                )
                .set((
                    order_lines::cgst.eq(&line.tax.cgst),
                    order_lines::sgst.eq(&line.tax.sgst),
                    order_lines::igst.eq(&line.tax.igst),
                    order_lines::line_total.eq(&line.line_total),
                ))
                .execute(conn)?;
            }
            Ok(())
        })
    }

    fn status_events(&self, id: Uuid) -> Result<Vec<StatusEvent>, DomainError> {
        let mut conn = self.pool.get()?;

        order_status_events::table
            .filter(order_status_events::order_id.eq(id))
            .select(StatusEventRow::as_select())
            .order(order_status_events::created_at.asc())
            .load::<StatusEventRow>(&mut conn)?
            .into_iter()
            .map(StatusEvent::try_from)
            .collect()
    }
}
