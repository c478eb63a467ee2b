#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use uuid::Uuid;

use fulfillment_engine::application::invoice::RandomInvoiceNumbers;
use fulfillment_engine::application::order_service::{OrderService, Ports};
use fulfillment_engine::domain::catalog::CatalogEntry;
use fulfillment_engine::domain::tax::HomeStatePolicy;
use fulfillment_engine::infrastructure::memory::{
    InMemoryAuditLog, InMemoryCatalog, InMemoryOrderRepository, InMemoryOutbox,
};

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).expect("valid decimal")
}

pub struct Backend {
    pub catalog: InMemoryCatalog,
    pub orders: InMemoryOrderRepository,
    pub outbox: InMemoryOutbox,
    pub service: OrderService,
}

/// Order service over in-memory adapters, selling from Kerala with a 10%
/// wholesale discount.
pub fn in_memory_backend() -> Backend {
    let catalog = InMemoryCatalog::new();
    let orders = InMemoryOrderRepository::new();
    let outbox = InMemoryOutbox::new();
    let ports = Ports {
        catalog: Arc::new(catalog.clone()),
        ledger: Arc::new(catalog.clone()),
        orders: Arc::new(orders.clone()),
        tax_policy: Arc::new(HomeStatePolicy::new("Kerala")),
        notifications: Arc::new(outbox.clone()),
        audit: Arc::new(InMemoryAuditLog::new()),
        invoices: Arc::new(RandomInvoiceNumbers),
    };
    Backend {
        catalog,
        orders,
        outbox,
        service: OrderService::new(ports, dec("10")),
    }
}

pub fn stocked_product(catalog: &InMemoryCatalog, price: &str, gst: u32, stock: i32) -> Uuid {
    let product_id = Uuid::new_v4();
    catalog.insert(CatalogEntry {
        product_id,
        mrp: dec(price),
        selling_price: None,
        gst_rate: BigDecimal::from(gst),
        on_demand: false,
        stock,
        models: vec![],
        variants: vec![],
    });
    product_id
}
