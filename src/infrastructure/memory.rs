//! In-process implementations of every port.
//!
//! The stock counters live behind one mutex, so the conditional decrement is
//! atomic within this process only. Multi-process deployments use the Diesel
//! adapters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::domain::catalog::{CatalogEntry, StockTarget};
use crate::domain::errors::DomainError;
use crate::domain::order::Order;
use crate::domain::ports::{
    AuditEntry, AuditLog, CatalogService, ListResult, NotificationSink, OrderNotification,
    OrderRepository, StockLedger,
};
use crate::domain::workflow::{OrderStatus, PaymentStatus, StatusEvent};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DomainError> {
    mutex
        .lock()
        .map_err(|_| DomainError::Internal("in-memory store lock poisoned".to_string()))
}

// ── Catalog + stock ledger ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Arc<Mutex<HashMap<Uuid, CatalogEntry>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: CatalogEntry) {
        if let Ok(mut entries) = lock(&self.entries) {
            entries.insert(entry.product_id, entry);
        }
    }

    /// Current value of one stock counter, if it exists.
    pub fn stock(&self, target: &StockTarget) -> Option<i32> {
        let mut entries = lock(&self.entries).ok()?;
        let value = counter_mut(&mut entries, target).map(|c| *c);
        value
    }
}

fn counter_mut<'m>(
    entries: &'m mut HashMap<Uuid, CatalogEntry>,
    target: &StockTarget,
) -> Option<&'m mut i32> {
    let entry = entries.get_mut(&target.product_id())?;
    match *target {
        StockTarget::Product(_) => Some(&mut entry.stock),
        StockTarget::Model { model_id, .. } => entry
            .models
            .iter_mut()
            .find(|m| m.id == model_id)
            .map(|m| &mut m.stock),
        StockTarget::Variant { variant_id, .. } => entry
            .variants
            .iter_mut()
            .chain(entry.models.iter_mut().flat_map(|m| m.variants.iter_mut()))
            .find(|v| v.id == variant_id)
            .map(|v| &mut v.stock),
    }
}

impl CatalogService for InMemoryCatalog {
    fn fetch(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, CatalogEntry>, DomainError> {
        let entries = lock(&self.entries)?;
        let found = ids
            .iter()
            .filter_map(|id| entries.get(id).map(|e| (*id, e.clone())))
            .collect();
        Ok(found)
    }
}

impl StockLedger for InMemoryCatalog {
    fn try_decrement(&self, target: &StockTarget, quantity: i32) -> Result<bool, DomainError> {
        let mut entries = lock(&self.entries)?;
        let counter = counter_mut(&mut entries, target)
            .ok_or(DomainError::ProductNotFound(target.product_id()))?;
        if *counter < quantity {
            return Ok(false);
        }
        *counter -= quantity;
        Ok(true)
    }

    fn increment(&self, target: &StockTarget, quantity: i32) -> Result<(), DomainError> {
        let mut entries = lock(&self.entries)?;
        let counter = counter_mut(&mut entries, target)
            .ok_or(DomainError::ProductNotFound(target.product_id()))?;
        *counter += quantity;
        Ok(())
    }
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct OrderTables {
    orders: Vec<Order>,
    events: HashMap<Uuid, Vec<StatusEvent>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    tables: Arc<Mutex<OrderTables>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        lock(&self.tables).map(|t| t.orders.len()).unwrap_or(0)
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn insert(&self, order: &Order, initial_event: &StatusEvent) -> Result<(), DomainError> {
        let mut tables = lock(&self.tables)?;
        if tables
            .orders
            .iter()
            .any(|o| o.invoice_number == order.invoice_number)
        {
            return Err(DomainError::DuplicateInvoice(order.invoice_number.clone()));
        }
        tables.orders.push(order.clone());
        tables
            .events
            .insert(order.id, vec![initial_event.clone()]);
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let tables = lock(&self.tables)?;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let offset = page.saturating_sub(1).saturating_mul(limit).max(0) as usize;
        let tables = lock(&self.tables)?;
        let mut items: Vec<Order> = tables.orders.iter().rev().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ListResult {
            total: items.len() as i64,
            items: items.into_iter().skip(offset).take(limit.max(0) as usize).collect(),
        })
    }

    fn transition(&self, id: Uuid, expected: OrderStatus, event: &StatusEvent) -> Result<(), DomainError> {
        let mut tables = lock(&self.tables)?;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(DomainError::OrderNotFound)?;
        if order.status != expected {
            return Err(DomainError::conflict(format!(
                "order {id} is {} not {expected}",
                order.status
            )));
        }
        order.status = event.status;
        tables.events.entry(id).or_default().push(event.clone());
        Ok(())
    }

    fn set_payment_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<(), DomainError> {
        let mut tables = lock(&self.tables)?;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(DomainError::OrderNotFound)?;
        if order.payment_status != expected {
            return Err(DomainError::conflict(format!(
                "payment of order {id} is {} not {expected}",
                order.payment_status
            )));
        }
        order.payment_status = new;
        Ok(())
    }

    fn apply_tax_exemption(&self, order: &Order) -> Result<(), DomainError> {
        let mut tables = lock(&self.tables)?;
        let stored = tables
            .orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or(DomainError::OrderNotFound)?;
        if stored.tax_exempt {
            return Err(DomainError::conflict(format!("order {} already exempted", order.id)));
        }
        stored.lines = order.lines.clone();
        stored.subtotal = order.subtotal.clone();
        stored.tax_total = order.tax_total.clone();
        stored.grand_total = order.grand_total.clone();
        stored.tax_exempt = true;
        Ok(())
    }

    fn status_events(&self, id: Uuid) -> Result<Vec<StatusEvent>, DomainError> {
        let tables = lock(&self.tables)?;
        Ok(tables.events.get(&id).cloned().unwrap_or_default())
    }
}

// ── Notifications and audit ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    published: Arc<Mutex<Vec<OrderNotification>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<OrderNotification> {
        lock(&self.published).map(|p| p.clone()).unwrap_or_default()
    }
}

impl NotificationSink for InMemoryOutbox {
    fn publish(&self, notification: &OrderNotification) -> Result<(), DomainError> {
        lock(&self.published)?.push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        lock(&self.entries).map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<(), DomainError> {
        log::info!(target: "audit", "{} {} by {}", entry.action, entry.aggregate_id, entry.actor);
        lock(&self.entries)?.push(entry.clone());
        Ok(())
    }
}
