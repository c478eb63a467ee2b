use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use super::catalog::{CatalogEntry, StockTarget};
use super::errors::DomainError;
use super::order::Order;
use super::workflow::{OrderStatus, PaymentStatus, StatusEvent};

pub trait CatalogService: Send + Sync + 'static {
    /// Fetches every requested product in a single read. Missing ids are simply
    /// absent from the map.
    fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, CatalogEntry>, DomainError>;
}

/// Atomic access to the stock counters. The conditional decrement must hold at
/// the storage layer, not in process memory.
pub trait StockLedger: Send + Sync + 'static {
    /// Decrements `target` by `quantity` only if the live counter still covers
    /// it. Returns `false` when it does not.
    fn try_decrement(&self, target: &StockTarget, quantity: i32) -> Result<bool, DomainError>;

    /// Unconditionally adds `quantity` back to `target`.
    fn increment(&self, target: &StockTarget, quantity: i32) -> Result<(), DomainError>;
}

pub trait TaxPolicy: Send + Sync + 'static {
    fn is_intra_state(&self, shipping_address: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<Order>,
    pub total: i64,
}

pub trait OrderRepository: Send + Sync + 'static {
    /// Persists the order, its lines and its first status event atomically.
    /// A clash on the invoice number yields `DomainError::DuplicateInvoice`.
    fn insert(&self, order: &Order, initial_event: &StatusEvent) -> Result<(), DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError>;
    /// Moves the order to `event.status` only if it is still in `expected`,
    /// appending `event` in the same unit of work. Yields
    /// `DomainError::ConcurrentConflict` when the status moved underneath.
    fn transition(&self, id: Uuid, expected: OrderStatus, event: &StatusEvent) -> Result<(), DomainError>;
    fn set_payment_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<(), DomainError>;
    /// Rewrites line taxes and order totals of an exempted order.
    fn apply_tax_exemption(&self, order: &Order) -> Result<(), DomainError>;
    fn status_events(&self, id: Uuid) -> Result<Vec<StatusEvent>, DomainError>;
}

/// Outbound order event. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderNotification {
    pub order_id: Uuid,
    pub event_type: String,
    pub payload: Value,
}

pub trait NotificationSink: Send + Sync + 'static {
    fn publish(&self, notification: &OrderNotification) -> Result<(), DomainError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub aggregate_id: Uuid,
    pub action: String,
    pub actor: String,
    pub details: Value,
}

pub trait AuditLog: Send + Sync + 'static {
    fn record(&self, entry: &AuditEntry) -> Result<(), DomainError>;
}

pub trait InvoiceNumbers: Send + Sync + 'static {
    /// Proposes an invoice number for `date`. Uniqueness is enforced by the
    /// repository; callers retry on `DuplicateInvoice`.
    fn next(&self, date: NaiveDate) -> String;
}
