use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::application::reservation::{restore_stock, ReservationCoordinator};
use crate::domain::catalog::LineItemRequest;
use crate::domain::errors::DomainError;
use crate::domain::order::{Customer, Order, OrderDetails, PaymentMethod, ReservedLineItem};
use crate::domain::ports::{
    AuditEntry, AuditLog, CatalogService, InvoiceNumbers, ListResult, NotificationSink,
    OrderNotification, OrderRepository, StockLedger, TaxPolicy,
};
use crate::domain::pricing::PricingContext;
use crate::domain::workflow::{next_status, Actor, OrderStatus, PaymentStatus, StatusEvent};

const MAX_INVOICE_ATTEMPTS: usize = 5;
const MAX_PAGE_SIZE: i64 = 100;

/// External collaborators and storage the service is wired with.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn CatalogService>,
    pub ledger: Arc<dyn StockLedger>,
    pub orders: Arc<dyn OrderRepository>,
    pub tax_policy: Arc<dyn TaxPolicy>,
    pub notifications: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditLog>,
    pub invoices: Arc<dyn InvoiceNumbers>,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub lines: Vec<LineItemRequest>,
    pub shipping_address: String,
    /// Defaults to the shipping address.
    pub billing_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub customer: Customer,
    /// Set by the authenticated caller layer, never by the client body.
    pub is_wholesale: bool,
}

#[derive(Debug, Clone)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub invoice_number: String,
    pub status: OrderStatus,
    pub grand_total: BigDecimal,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StatusChanged {
    pub order: Order,
    pub event: StatusEvent,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub order: Order,
    pub event: StatusEvent,
    pub restored_lines: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OrderUpdated {
    pub order: Order,
    pub warnings: Vec<String>,
}

pub struct OrderService {
    ports: Ports,
    wholesale_discount_pct: BigDecimal,
}

impl OrderService {
    pub fn new(ports: Ports, wholesale_discount_pct: BigDecimal) -> Self {
        Self {
            ports,
            wholesale_discount_pct,
        }
    }

    /// Reserves stock, prices the lines and persists the order.
    ///
    /// Any failure after stock was taken gives it back before returning. Side
    /// effects after the order is stored are best effort and only produce
    /// warnings.
    pub fn create_order(&self, cmd: CreateOrder) -> Result<OrderPlaced, DomainError> {
        let shipping_address = cmd.shipping_address.trim().to_string();
        let billing_address = cmd
            .billing_address
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| shipping_address.clone());
        let details = OrderDetails {
            customer: cmd.customer,
            shipping_address,
            billing_address,
            payment_method: cmd.payment_method,
        };
        details.validate()?;

        let ctx = PricingContext {
            is_wholesale: cmd.is_wholesale,
            wholesale_discount_pct: self.wholesale_discount_pct.clone(),
            is_intra_state: self.ports.tax_policy.is_intra_state(&details.shipping_address),
        };

        let coordinator =
            ReservationCoordinator::new(self.ports.catalog.as_ref(), self.ports.ledger.as_ref());
        let reservation = coordinator.reserve(&cmd.lines, &ctx)?;

        let today = Utc::now().date_naive();
        let mut attempt = 1;
        let order = loop {
            let invoice_number = self.ports.invoices.next(today);
            let order = match Order::place(invoice_number, details.clone(), reservation.lines().to_vec()) {
                Ok(order) => order,
                Err(e) => {
                    reservation.release();
                    return Err(e);
                }
            };
            let event = StatusEvent::new(order.id, OrderStatus::Placed, &Actor::system(), "Order placed");

            match self.ports.orders.insert(&order, &event) {
                Ok(()) => break order,
                Err(DomainError::DuplicateInvoice(number)) if attempt < MAX_INVOICE_ATTEMPTS => {
                    log::warn!("Invoice number {} already taken, retrying", number);
                    attempt += 1;
                }
                Err(e) => {
                    log::warn!("Persisting order failed, releasing reserved stock: {}", e);
                    reservation.release();
                    return Err(e);
                }
            }
        };
        reservation.commit();

        log::info!(
            "Order {} placed as {} ({} lines, total {})",
            order.id,
            order.invoice_number,
            order.lines.len(),
            order.grand_total
        );

        let mut warnings = Vec::new();
        self.publish(&mut warnings, &order, "OrderPlaced");
        self.audit(
            &mut warnings,
            AuditEntry {
                aggregate_id: order.id,
                action: "order.created".to_string(),
                actor: customer_ref(&order.customer),
                details: json!({
                    "invoice_number": order.invoice_number,
                    "grand_total": order.grand_total.to_string(),
                    "wholesale": ctx.is_wholesale,
                    "intra_state": ctx.is_intra_state,
                    "declared_price_mismatches": declared_price_mismatches(&cmd.lines, &order.lines),
                }),
            },
        );

        Ok(OrderPlaced {
            order_id: order.id,
            invoice_number: order.invoice_number,
            status: order.status,
            grand_total: order.grand_total,
            warnings,
        })
    }

    pub fn get_order(&self, id: Uuid) -> Result<Order, DomainError> {
        self.ports
            .orders
            .find_by_id(id)?
            .ok_or(DomainError::OrderNotFound)
    }

    pub fn list_orders(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.ports.orders.list(page.clamp(1, i64::MAX / limit), limit)
    }

    pub fn status_history(&self, id: Uuid) -> Result<Vec<StatusEvent>, DomainError> {
        self.get_order(id)?;
        self.ports.orders.status_events(id)
    }

    /// Applies one workflow transition. Cancellation goes through
    /// [`OrderService::cancel_order`] so stock is always restored.
    pub fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        note: &str,
        actor: &Actor,
    ) -> Result<StatusChanged, DomainError> {
        if new_status == OrderStatus::Cancelled {
            let cancellation = self.cancel_order(id, note, actor)?;
            return Ok(StatusChanged {
                order: cancellation.order,
                event: cancellation.event,
                warnings: cancellation.warnings,
            });
        }

        let order = self.get_order(id)?;
        let next = next_status(order.status, new_status)?;
        let event = StatusEvent::new(id, next, actor, note);
        self.ports.orders.transition(id, order.status, &event)?;

        log::info!("Order {} moved {} -> {} by {}", id, order.status, next, actor.id);

        let order = Order {
            status: next,
            ..order
        };
        let mut warnings = Vec::new();
        self.publish(&mut warnings, &order, "OrderStatusChanged");
        self.audit(
            &mut warnings,
            AuditEntry {
                aggregate_id: id,
                action: "order.status_changed".to_string(),
                actor: actor.id.clone(),
                details: json!({ "status": next.as_str(), "note": note, "role": actor.role.as_str() }),
            },
        );

        Ok(StatusChanged {
            order,
            event,
            warnings,
        })
    }

    /// Cancels the order and puts every non-on-demand line back on the exact
    /// counter it was taken from.
    ///
    /// The status write is a compare-and-set, so of two concurrent cancels
    /// only one restores stock; the other sees `AlreadyCancelled`.
    pub fn cancel_order(&self, id: Uuid, reason: &str, actor: &Actor) -> Result<Cancellation, DomainError> {
        let order = self.get_order(id)?;
        next_status(order.status, OrderStatus::Cancelled)?;

        let event = StatusEvent::new(id, OrderStatus::Cancelled, actor, reason);
        match self.ports.orders.transition(id, order.status, &event) {
            Ok(()) => {}
            Err(DomainError::ConcurrentConflict(msg)) => {
                return match self.ports.orders.find_by_id(id)? {
                    Some(current) if current.status == OrderStatus::Cancelled => {
                        Err(DomainError::AlreadyCancelled)
                    }
                    _ => Err(DomainError::ConcurrentConflict(msg)),
                };
            }
            Err(e) => return Err(e),
        }

        let mut warnings = Vec::new();
        let mut restored_lines = 0;
        for line in order.restorable_lines() {
            match restore_stock(self.ports.ledger.as_ref(), &line.stock_target(), line.quantity) {
                Ok(()) => restored_lines += 1,
                Err(e) => {
                    log::error!(
                        "Order {} cancelled but {} units of product {} were not restored: {}",
                        id,
                        line.quantity,
                        line.product_id,
                        e
                    );
                    warnings.push(format!(
                        "stock for product {} was not restored: {}",
                        line.product_id, e
                    ));
                }
            }
        }

        log::info!(
            "Order {} cancelled by {}, {} line(s) restocked",
            id,
            actor.id,
            restored_lines
        );

        let order = Order {
            status: OrderStatus::Cancelled,
            ..order
        };
        self.publish(&mut warnings, &order, "OrderCancelled");
        self.audit(
            &mut warnings,
            AuditEntry {
                aggregate_id: id,
                action: "order.cancelled".to_string(),
                actor: actor.id.clone(),
                details: json!({ "reason": reason, "restored_lines": restored_lines }),
            },
        );

        Ok(Cancellation {
            order,
            event,
            restored_lines,
            warnings,
        })
    }

    pub fn update_payment_status(
        &self,
        id: Uuid,
        new_status: PaymentStatus,
        actor: &Actor,
    ) -> Result<OrderUpdated, DomainError> {
        let order = self.get_order(id)?;
        let next = order.payment_status.transition(new_status, order.status)?;
        self.ports
            .orders
            .set_payment_status(id, order.payment_status, next)?;

        log::info!("Order {} payment {} -> {}", id, order.payment_status, next);

        let mut warnings = Vec::new();
        self.audit(
            &mut warnings,
            AuditEntry {
                aggregate_id: id,
                action: "order.payment_status_changed".to_string(),
                actor: actor.id.clone(),
                details: json!({ "from": order.payment_status.as_str(), "to": next.as_str() }),
            },
        );

        Ok(OrderUpdated {
            order: Order {
                payment_status: next,
                ..order
            },
            warnings,
        })
    }

    /// Zeroes GST on every line of the order and recomputes its totals.
    pub fn mark_tax_exempt(&self, id: Uuid, note: &str, actor: &Actor) -> Result<OrderUpdated, DomainError> {
        let order = self.get_order(id)?;
        let exempt = order.exempt_from_tax()?;
        self.ports.orders.apply_tax_exemption(&exempt)?;

        log::info!(
            "Order {} marked tax exempt by {}, total {} -> {}",
            id,
            actor.id,
            order.grand_total,
            exempt.grand_total
        );

        let mut warnings = Vec::new();
        self.audit(
            &mut warnings,
            AuditEntry {
                aggregate_id: id,
                action: "order.tax_exempted".to_string(),
                actor: actor.id.clone(),
                details: json!({
                    "note": note,
                    "previous_tax_total": order.tax_total.to_string(),
                    "grand_total": exempt.grand_total.to_string(),
                }),
            },
        );

        Ok(OrderUpdated {
            order: exempt,
            warnings,
        })
    }

    fn publish(&self, warnings: &mut Vec<String>, order: &Order, event_type: &str) {
        let notification = OrderNotification {
            order_id: order.id,
            event_type: event_type.to_string(),
            payload: order_payload(order),
        };
        if let Err(e) = self.ports.notifications.publish(&notification) {
            log::warn!("{} notification for order {} failed: {}", event_type, order.id, e);
            warnings.push(format!("{event_type} notification failed: {e}"));
        }
    }

    fn audit(&self, warnings: &mut Vec<String>, entry: AuditEntry) {
        if let Err(e) = self.ports.audit.record(&entry) {
            log::warn!("Audit entry {} for {} failed: {}", entry.action, entry.aggregate_id, e);
            warnings.push(format!("audit entry {} failed: {e}", entry.action));
        }
    }
}

fn customer_ref(customer: &Customer) -> String {
    match customer {
        Customer::Registered(id) => id.to_string(),
        Customer::Guest(contact) => format!("guest:{}", contact.email),
    }
}

fn order_payload(order: &Order) -> Value {
    let lines: Vec<Value> = order
        .lines
        .iter()
        .map(|l| {
            json!({
                "product_id": l.product_id,
                "model_id": l.model_id,
                "variant_id": l.variant_id,
                "quantity": l.quantity,
                "unit_price": l.unit_price.to_string(),
                "line_total": l.line_total.to_string(),
            })
        })
        .collect();

    json!({
        "order_id": order.id,
        "invoice_number": order.invoice_number,
        "status": order.status.as_str(),
        "payment_status": order.payment_status.as_str(),
        "grand_total": order.grand_total.to_string(),
        "lines": lines,
    })
}

/// Client-declared prices that disagree with what was charged. Lines line up
/// with requests because the coordinator keeps request order.
fn declared_price_mismatches(requests: &[LineItemRequest], lines: &[ReservedLineItem]) -> Vec<Value> {
    requests
        .iter()
        .zip(lines)
        .filter_map(|(req, line)| {
            let declared = req.declared_price.as_ref()?;
            (*declared != line.unit_price).then(|| {
                json!({
                    "product_id": line.product_id,
                    "declared": declared.to_string(),
                    "charged": line.unit_price.to_string(),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use super::*;
    use crate::application::invoice::RandomInvoiceNumbers;
    use crate::domain::catalog::{CatalogEntry, StockTarget};
    use crate::domain::order::GuestContact;
    use crate::domain::tax::HomeStatePolicy;
    use crate::domain::workflow::ActorRole;
    use crate::infrastructure::memory::{
        InMemoryAuditLog, InMemoryCatalog, InMemoryOrderRepository, InMemoryOutbox,
    };

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).expect("valid decimal")
    }

    struct Harness {
        catalog: InMemoryCatalog,
        orders: InMemoryOrderRepository,
        outbox: InMemoryOutbox,
        audit: InMemoryAuditLog,
        service: OrderService,
    }

    fn ports(
        catalog: &InMemoryCatalog,
        orders: Arc<dyn OrderRepository>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditLog>,
        invoices: Arc<dyn InvoiceNumbers>,
    ) -> Ports {
        Ports {
            catalog: Arc::new(catalog.clone()),
            ledger: Arc::new(catalog.clone()),
            orders,
            tax_policy: Arc::new(HomeStatePolicy::new("Kerala")),
            notifications,
            audit,
            invoices,
        }
    }

    fn harness() -> Harness {
        let catalog = InMemoryCatalog::new();
        let orders = InMemoryOrderRepository::new();
        let outbox = InMemoryOutbox::new();
        let audit = InMemoryAuditLog::new();
        let service = OrderService::new(
            ports(
                &catalog,
                Arc::new(orders.clone()),
                Arc::new(outbox.clone()),
                Arc::new(audit.clone()),
                Arc::new(RandomInvoiceNumbers),
            ),
            dec("10"),
        );
        Harness {
            catalog,
            orders,
            outbox,
            audit,
            service,
        }
    }

    fn add_product(catalog: &InMemoryCatalog, price: &str, stock: i32, on_demand: bool) -> Uuid {
        let product_id = Uuid::new_v4();
        catalog.insert(CatalogEntry {
            product_id,
            mrp: dec(price),
            selling_price: Some(dec(price)),
            gst_rate: dec("12"),
            on_demand,
            stock,
            models: vec![],
            variants: vec![],
        });
        product_id
    }

    fn stock(h: &Harness, product_id: Uuid) -> i32 {
        h.catalog
            .stock(&StockTarget::Product(product_id))
            .expect("known product")
    }

    fn command(lines: Vec<LineItemRequest>) -> CreateOrder {
        CreateOrder {
            lines,
            shipping_address: "MG Road, Kochi, Kerala".to_string(),
            billing_address: None,
            payment_method: PaymentMethod::CashOnDelivery,
            customer: Customer::Registered(Uuid::new_v4()),
            is_wholesale: false,
        }
    }

    fn staff() -> Actor {
        Actor::new("staff-7", ActorRole::Staff)
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn publish(&self, _: &OrderNotification) -> Result<(), DomainError> {
            Err(DomainError::Internal("broker unreachable".to_string()))
        }
    }

    impl AuditLog for FailingSink {
        fn record(&self, _: &AuditEntry) -> Result<(), DomainError> {
            Err(DomainError::Internal("audit table locked".to_string()))
        }
    }

    /// Refuses every insert, as a lost database connection would.
    struct BrokenRepository(InMemoryOrderRepository);

    impl OrderRepository for BrokenRepository {
        fn insert(&self, _: &Order, _: &StatusEvent) -> Result<(), DomainError> {
            Err(DomainError::Internal("connection reset".to_string()))
        }
        fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
            self.0.find_by_id(id)
        }
        fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
            self.0.list(page, limit)
        }
        fn transition(&self, id: Uuid, expected: OrderStatus, event: &StatusEvent) -> Result<(), DomainError> {
            self.0.transition(id, expected, event)
        }
        fn set_payment_status(&self, id: Uuid, expected: PaymentStatus, new: PaymentStatus) -> Result<(), DomainError> {
            self.0.set_payment_status(id, expected, new)
        }
        fn apply_tax_exemption(&self, order: &Order) -> Result<(), DomainError> {
            self.0.apply_tax_exemption(order)
        }
        fn status_events(&self, id: Uuid) -> Result<Vec<StatusEvent>, DomainError> {
            self.0.status_events(id)
        }
    }

    /// Serves a fixed number of reads, then reports a lost connection.
    struct FadingReads {
        inner: InMemoryOrderRepository,
        reads_left: Mutex<u32>,
    }

    impl OrderRepository for FadingReads {
        fn insert(&self, order: &Order, event: &StatusEvent) -> Result<(), DomainError> {
            self.inner.insert(order, event)
        }
        fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
            let mut reads_left = self.reads_left.lock().unwrap();
            if *reads_left == 0 {
                return Err(DomainError::Internal("connection reset".to_string()));
            }
            *reads_left -= 1;
            self.inner.find_by_id(id)
        }
        fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
            self.inner.list(page, limit)
        }
        fn transition(&self, id: Uuid, expected: OrderStatus, event: &StatusEvent) -> Result<(), DomainError> {
            self.inner.transition(id, expected, event)
        }
        fn set_payment_status(&self, id: Uuid, expected: PaymentStatus, new: PaymentStatus) -> Result<(), DomainError> {
            self.inner.set_payment_status(id, expected, new)
        }
        fn apply_tax_exemption(&self, order: &Order) -> Result<(), DomainError> {
            self.inner.apply_tax_exemption(order)
        }
        fn status_events(&self, id: Uuid) -> Result<Vec<StatusEvent>, DomainError> {
            self.inner.status_events(id)
        }
    }

    /// Never manages to put stock back.
    struct StuckIncrements {
        inner: InMemoryCatalog,
        attempts: Mutex<u32>,
    }

    impl StockLedger for StuckIncrements {
        fn try_decrement(&self, target: &StockTarget, quantity: i32) -> Result<bool, DomainError> {
            self.inner.try_decrement(target, quantity)
        }
        fn increment(&self, _: &StockTarget, _: i32) -> Result<(), DomainError> {
            *self.attempts.lock().unwrap() += 1;
            Err(DomainError::Internal("connection reset".to_string()))
        }
    }

    struct ScriptedInvoices(Mutex<VecDeque<u32>>);

    impl InvoiceNumbers for ScriptedInvoices {
        fn next(&self, date: NaiveDate) -> String {
            let suffix = self.0.lock().unwrap().pop_front().unwrap_or(9999);
            crate::application::invoice::format_invoice_number(date, suffix)
        }
    }

    #[test]
    fn create_order_reserves_prices_and_persists() {
        let h = harness();
        let p = add_product(&h.catalog, "250.00", 5, false);

        let placed = h
            .service
            .create_order(command(vec![LineItemRequest::new(p, 2).with_declared_price(dec("1.00"))]))
            .unwrap();

        assert_eq!(placed.status, OrderStatus::Placed);
        // 500.00 + 12% intra-state GST
        assert_eq!(placed.grand_total, dec("560.00"));
        assert!(placed.invoice_number.starts_with("INV-"));
        assert!(placed.warnings.is_empty());
        assert_eq!(stock(&h, p), 3);

        let order = h.service.get_order(placed.order_id).unwrap();
        assert_eq!(order.lines[0].tax.cgst, dec("30.00"));
        assert_eq!(order.lines[0].tax.sgst, dec("30.00"));
        assert_eq!(order.billing_address, order.shipping_address);

        let events = h.service.status_history(placed.order_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::Placed);
        assert!(events[0].system_generated);

        assert_eq!(h.outbox.published()[0].event_type, "OrderPlaced");
        let audit = h.audit.entries();
        assert_eq!(audit[0].action, "order.created");
        assert_eq!(audit[0].details["declared_price_mismatches"][0]["charged"], "250.00");
    }

    #[test]
    fn second_item_short_leaves_first_item_untouched() {
        let h = harness();
        let first = add_product(&h.catalog, "10.00", 5, false);
        let second = add_product(&h.catalog, "10.00", 1, false);

        let err = h
            .service
            .create_order(command(vec![
                LineItemRequest::new(first, 3),
                LineItemRequest::new(second, 2),
            ]))
            .unwrap_err();

        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: second,
                available: 1
            }
        );
        assert_eq!(stock(&h, first), 5);
        assert_eq!(stock(&h, second), 1);
        assert_eq!(h.orders.count(), 0);
        assert!(h.outbox.published().is_empty());
    }

    #[test]
    fn cancelling_restores_stock_exactly_once() {
        let h = harness();
        let stocked = add_product(&h.catalog, "40.00", 6, false);
        let on_demand = add_product(&h.catalog, "15.00", 0, true);

        let placed = h
            .service
            .create_order(command(vec![
                LineItemRequest::new(stocked, 4),
                LineItemRequest::new(on_demand, 3),
            ]))
            .unwrap();
        assert_eq!(stock(&h, stocked), 2);

        h.service
            .update_status(placed.order_id, OrderStatus::Packed, "packed", &staff())
            .unwrap();
        h.service
            .update_status(placed.order_id, OrderStatus::AssignedToBus, "bus 12", &staff())
            .unwrap();

        let cancelled = h
            .service
            .cancel_order(placed.order_id, "customer changed mind", &staff())
            .unwrap();
        assert_eq!(cancelled.restored_lines, 1);
        assert_eq!(stock(&h, stocked), 6);
        assert_eq!(stock(&h, on_demand), 0);

        let again = h
            .service
            .cancel_order(placed.order_id, "retry", &staff())
            .unwrap_err();
        assert_eq!(again, DomainError::AlreadyCancelled);
        assert_eq!(stock(&h, stocked), 6);

        let statuses: Vec<OrderStatus> = h
            .service
            .status_history(placed.order_id)
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Placed,
                OrderStatus::Packed,
                OrderStatus::AssignedToBus,
                OrderStatus::Cancelled
            ]
        );
    }

    #[test]
    fn cancel_via_status_update_also_restocks() {
        let h = harness();
        let p = add_product(&h.catalog, "5.00", 2, false);
        let placed = h
            .service
            .create_order(command(vec![LineItemRequest::new(p, 2)]))
            .unwrap();

        let changed = h
            .service
            .update_status(placed.order_id, OrderStatus::Cancelled, "out of area", &staff())
            .unwrap();

        assert_eq!(changed.order.status, OrderStatus::Cancelled);
        assert_eq!(changed.event.status, OrderStatus::Cancelled);
        assert_eq!(stock(&h, p), 2);
    }

    #[test]
    fn delivered_cannot_skip_assigned_to_bus() {
        let h = harness();
        let p = add_product(&h.catalog, "5.00", 2, false);
        let placed = h
            .service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap();

        let err = h
            .service
            .update_status(placed.order_id, OrderStatus::Delivered, "", &staff())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::IllegalTransition {
                from: OrderStatus::Placed,
                to: OrderStatus::Delivered
            }
        );

        h.service
            .update_status(placed.order_id, OrderStatus::Packed, "", &staff())
            .unwrap();
        assert!(h
            .service
            .update_status(placed.order_id, OrderStatus::Delivered, "", &staff())
            .is_err());
        assert_eq!(
            h.service.get_order(placed.order_id).unwrap().status,
            OrderStatus::Packed
        );
    }

    #[test]
    fn delivered_orders_cannot_be_cancelled() {
        let h = harness();
        let p = add_product(&h.catalog, "5.00", 2, false);
        let id = h
            .service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap()
            .order_id;
        for s in [OrderStatus::Packed, OrderStatus::AssignedToBus, OrderStatus::Delivered] {
            h.service.update_status(id, s, "", &staff()).unwrap();
        }

        assert!(matches!(
            h.service.cancel_order(id, "too late", &staff()),
            Err(DomainError::IllegalTransition { .. })
        ));
        assert_eq!(stock(&h, p), 1);
    }

    #[test]
    fn side_effect_failures_are_warnings_only() {
        let catalog = InMemoryCatalog::new();
        let orders = InMemoryOrderRepository::new();
        let service = OrderService::new(
            ports(
                &catalog,
                Arc::new(orders.clone()),
                Arc::new(FailingSink),
                Arc::new(FailingSink),
                Arc::new(RandomInvoiceNumbers),
            ),
            dec("0"),
        );
        let p = add_product(&catalog, "5.00", 2, false);

        let placed = service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap();

        assert_eq!(placed.warnings.len(), 2);
        assert_eq!(orders.count(), 1);

        let cancelled = service.cancel_order(placed.order_id, "", &staff()).unwrap();
        assert_eq!(cancelled.restored_lines, 1);
        assert_eq!(cancelled.warnings.len(), 2);
    }

    #[test]
    fn failed_persistence_gives_stock_back() {
        let catalog = InMemoryCatalog::new();
        let service = OrderService::new(
            ports(
                &catalog,
                Arc::new(BrokenRepository(InMemoryOrderRepository::new())),
                Arc::new(InMemoryOutbox::new()),
                Arc::new(InMemoryAuditLog::new()),
                Arc::new(RandomInvoiceNumbers),
            ),
            dec("0"),
        );
        let p = add_product(&catalog, "5.00", 3, false);

        let err = service
            .create_order(command(vec![LineItemRequest::new(p, 3)]))
            .unwrap_err();

        assert!(matches!(err, DomainError::Internal(_)));
        assert_eq!(catalog.stock(&StockTarget::Product(p)), Some(3));
    }

    #[test]
    fn invoice_collisions_are_retried() {
        let catalog = InMemoryCatalog::new();
        let orders = InMemoryOrderRepository::new();
        let service = OrderService::new(
            ports(
                &catalog,
                Arc::new(orders.clone()),
                Arc::new(InMemoryOutbox::new()),
                Arc::new(InMemoryAuditLog::new()),
                Arc::new(ScriptedInvoices(Mutex::new(VecDeque::from(vec![1, 1, 1, 2])))),
            ),
            dec("0"),
        );
        let p = add_product(&catalog, "5.00", 3, false);

        let first = service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap();
        let second = service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap();

        assert!(first.invoice_number.ends_with("-0001"));
        assert!(second.invoice_number.ends_with("-0002"));
        assert_eq!(orders.count(), 2);
    }

    #[test]
    fn exhausted_invoice_retries_release_stock() {
        let catalog = InMemoryCatalog::new();
        let service = OrderService::new(
            ports(
                &catalog,
                Arc::new(InMemoryOrderRepository::new()),
                Arc::new(InMemoryOutbox::new()),
                Arc::new(InMemoryAuditLog::new()),
                Arc::new(ScriptedInvoices(Mutex::new(VecDeque::from(vec![7; 6])))),
            ),
            dec("0"),
        );
        let p = add_product(&catalog, "5.00", 3, false);

        service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap();
        let err = service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap_err();

        assert!(matches!(err, DomainError::DuplicateInvoice(_)));
        assert_eq!(catalog.stock(&StockTarget::Product(p)), Some(2));
    }

    #[test]
    fn invalid_guest_is_rejected_before_reserving() {
        let h = harness();
        let p = add_product(&h.catalog, "5.00", 3, false);
        let mut cmd = command(vec![LineItemRequest::new(p, 1)]);
        cmd.customer = Customer::Guest(GuestContact {
            name: "Ravi".to_string(),
            email: String::new(),
            phone: None,
        });

        assert!(matches!(
            h.service.create_order(cmd),
            Err(DomainError::InvalidRequest(_))
        ));
        assert_eq!(stock(&h, p), 3);
    }

    #[test]
    fn blank_shipping_address_is_rejected() {
        let h = harness();
        let p = add_product(&h.catalog, "5.00", 3, false);
        let mut cmd = command(vec![LineItemRequest::new(p, 1)]);
        cmd.shipping_address = "   ".to_string();

        assert!(matches!(
            h.service.create_order(cmd),
            Err(DomainError::InvalidRequest(_))
        ));
    }

    #[test]
    fn wholesale_inter_state_order() {
        let h = harness();
        let p = add_product(&h.catalog, "100.00", 3, false);
        let mut cmd = command(vec![LineItemRequest::new(p, 1)]);
        cmd.is_wholesale = true;
        cmd.shipping_address = "Park Street, Kolkata, West Bengal".to_string();

        let placed = h.service.create_order(cmd).unwrap();
        let order = h.service.get_order(placed.order_id).unwrap();

        // 10% wholesale discount, then 12% IGST
        assert_eq!(order.lines[0].unit_price, dec("90.00"));
        assert_eq!(order.lines[0].tax.igst, dec("10.80"));
        assert_eq!(order.grand_total, dec("100.80"));
    }

    #[test]
    fn payment_and_tax_corrections() {
        let h = harness();
        let p = add_product(&h.catalog, "100.00", 3, false);
        let id = h
            .service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap()
            .order_id;

        let paid = h
            .service
            .update_payment_status(id, PaymentStatus::Paid, &staff())
            .unwrap();
        assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
        assert!(matches!(
            h.service.update_payment_status(id, PaymentStatus::Failed, &staff()),
            Err(DomainError::IllegalPaymentTransition { .. })
        ));

        let exempt = h.service.mark_tax_exempt(id, "SEZ unit", &staff()).unwrap();
        assert_eq!(exempt.order.grand_total, dec("100.00"));
        let stored = h.service.get_order(id).unwrap();
        assert!(stored.tax_exempt);
        assert_eq!(stored.tax_total, dec("0"));

        h.service.cancel_order(id, "", &staff()).unwrap();
        assert!(h.service.mark_tax_exempt(id, "", &staff()).is_err());
        let refunded = h
            .service
            .update_payment_status(id, PaymentStatus::Refunded, &staff())
            .unwrap();
        assert_eq!(refunded.order.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let h = harness();
        let id = Uuid::new_v4();
        assert_eq!(h.service.get_order(id), Err(DomainError::OrderNotFound));
        assert_eq!(
            h.service.cancel_order(id, "", &staff()).unwrap_err(),
            DomainError::OrderNotFound
        );
    }

    #[test]
    fn listing_clamps_paging() {
        let h = harness();
        let p = add_product(&h.catalog, "1.00", 10, false);
        for _ in 0..3 {
            h.service
                .create_order(command(vec![LineItemRequest::new(p, 1)]))
                .unwrap();
        }

        let page = h.service.list_orders(0, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        let page = h.service.list_orders(2, 2).unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn huge_page_is_empty_and_store_stays_usable() {
        let h = harness();
        let p = add_product(&h.catalog, "1.00", 10, false);
        let placed = h
            .service
            .create_order(command(vec![LineItemRequest::new(p, 1)]))
            .unwrap();

        let page = h.service.list_orders(i64::MAX, 100).unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items.is_empty());
        let page = h.service.list_orders(i64::MAX, i64::MAX).unwrap();
        assert!(page.items.is_empty());

        assert_eq!(h.service.get_order(placed.order_id).unwrap().id, placed.order_id);
    }

    #[test]
    fn unrestorable_stock_is_a_warning_on_a_cancelled_order() {
        let catalog = InMemoryCatalog::new();
        let orders = InMemoryOrderRepository::new();
        let ledger = Arc::new(StuckIncrements {
            inner: catalog.clone(),
            attempts: Mutex::new(0),
        });
        let mut wiring = ports(
            &catalog,
            Arc::new(orders.clone()),
            Arc::new(InMemoryOutbox::new()),
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(RandomInvoiceNumbers),
        );
        wiring.ledger = ledger.clone() as Arc<dyn StockLedger>;
        let service = OrderService::new(wiring, dec("10"));
        let p = add_product(&catalog, "20.00", 4, false);

        let placed = service
            .create_order(command(vec![LineItemRequest::new(p, 3)]))
            .unwrap();
        let cancelled = service
            .cancel_order(placed.order_id, "customer request", &staff())
            .unwrap();

        assert_eq!(cancelled.restored_lines, 0);
        assert_eq!(cancelled.warnings.len(), 1);
        assert!(cancelled.warnings[0].contains("not restored"));
        assert_eq!(*ledger.attempts.lock().unwrap(), 3);
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(
            service.get_order(placed.order_id).unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(catalog.stock(&StockTarget::Product(p)), Some(1));
    }

    #[test]
    fn cancel_through_status_update_does_not_reread() {
        let catalog = InMemoryCatalog::new();
        let repo = Arc::new(FadingReads {
            inner: InMemoryOrderRepository::new(),
            reads_left: Mutex::new(1),
        });
        let service = OrderService::new(
            ports(
                &catalog,
                repo.clone() as Arc<dyn OrderRepository>,
                Arc::new(InMemoryOutbox::new()),
                Arc::new(InMemoryAuditLog::new()),
                Arc::new(RandomInvoiceNumbers),
            ),
            dec("10"),
        );
        let p = add_product(&catalog, "20.00", 4, false);
        let placed = service
            .create_order(command(vec![LineItemRequest::new(p, 2)]))
            .unwrap();

        let changed = service
            .update_status(placed.order_id, OrderStatus::Cancelled, "changed mind", &staff())
            .unwrap();

        assert_eq!(changed.order.id, placed.order_id);
        assert_eq!(changed.order.status, OrderStatus::Cancelled);
        assert_eq!(changed.event.status, OrderStatus::Cancelled);
        assert_eq!(catalog.stock(&StockTarget::Product(p)), Some(4));
        assert_eq!(*repo.reads_left.lock().unwrap(), 0);
    }
}
