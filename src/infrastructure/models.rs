use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::catalog::{CatalogEntry, CatalogModel, CatalogVariant};
use crate::domain::errors::DomainError;
use crate::domain::order::{Customer, GuestContact, Order, PaymentMethod, ReservedLineItem};
use crate::domain::tax::TaxSplit;
use crate::domain::workflow::{Actor, ActorRole, OrderStatus, PaymentStatus, StatusEvent};
use crate::schema::{
    audit_log, commerce_order_outbox, order_lines, order_status_events, orders, product_models,
    product_variants, products,
};

// ── Catalog ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub mrp: BigDecimal,
    pub selling_price: Option<BigDecimal>,
    pub gst_rate: BigDecimal,
    pub on_demand: bool,
    pub stock: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = product_models)]
#[diesel(belongs_to(ProductRow, foreign_key = product_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductModelRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: Option<BigDecimal>,
    pub stock: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = product_variants)]
#[diesel(belongs_to(ProductRow, foreign_key = product_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductVariantRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub model_id: Option<Uuid>,
    pub price: Option<BigDecimal>,
    pub stock: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProductRow {
    pub id: Uuid,
    pub name: String,
    pub mrp: BigDecimal,
    pub selling_price: Option<BigDecimal>,
    pub gst_rate: BigDecimal,
    pub on_demand: bool,
    pub stock: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = product_models)]
pub struct NewProductModelRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Option<BigDecimal>,
    pub stock: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = product_variants)]
pub struct NewProductVariantRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub model_id: Option<Uuid>,
    pub name: String,
    pub price: Option<BigDecimal>,
    pub stock: i32,
}

/// Nests models and variants under their product. Variants with a `model_id`
/// go under that model, the rest hang off the product.
pub fn assemble_entry(
    product: ProductRow,
    models: Vec<ProductModelRow>,
    variants: Vec<ProductVariantRow>,
) -> CatalogEntry {
    let mut models: Vec<CatalogModel> = models
        .into_iter()
        .map(|m| CatalogModel {
            id: m.id,
            price: m.price,
            stock: m.stock,
            variants: vec![],
        })
        .collect();
    let mut loose = Vec::new();

    for v in variants {
        let variant = CatalogVariant {
            id: v.id,
            price: v.price,
            stock: v.stock,
        };
        match v.model_id.and_then(|mid| models.iter_mut().find(|m| m.id == mid)) {
            Some(model) => model.variants.push(variant),
            None => loose.push(variant),
        }
    }

    CatalogEntry {
        product_id: product.id,
        mrp: product.mrp,
        selling_price: product.selling_price,
        gst_rate: product.gst_rate,
        on_demand: product.on_demand,
        stock: product.stock,
        models,
        variants: loose,
    }
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub shipping_address: String,
    pub billing_address: String,
    pub payment_method: String,
    pub status: String,
    pub payment_status: String,
    pub subtotal: BigDecimal,
    pub tax_total: BigDecimal,
    pub grand_total: BigDecimal,
    pub tax_exempt: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub shipping_address: String,
    pub billing_address: String,
    pub payment_method: String,
    pub status: String,
    pub payment_status: String,
    pub subtotal: BigDecimal,
    pub tax_total: BigDecimal,
    pub grand_total: BigDecimal,
    pub tax_exempt: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for NewOrderRow {
    fn from(order: &Order) -> Self {
        let (customer_id, guest) = match &order.customer {
            Customer::Registered(id) => (Some(*id), None),
            Customer::Guest(contact) => (None, Some(contact)),
        };
        Self {
            id: order.id,
            invoice_number: order.invoice_number.clone(),
            customer_id,
            guest_name: guest.map(|g| g.name.clone()),
            guest_email: guest.map(|g| g.email.clone()),
            guest_phone: guest.and_then(|g| g.phone.clone()),
            shipping_address: order.shipping_address.clone(),
            billing_address: order.billing_address.clone(),
            payment_method: order.payment_method.as_str().to_string(),
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            subtotal: order.subtotal.clone(),
            tax_total: order.tax_total.clone(),
            grand_total: order.grand_total.clone(),
            tax_exempt: order.tax_exempt,
            created_at: order.created_at,
        }
    }
}

#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, Associations,
)]
#[diesel(table_name = order_lines)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub model_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub gst_rate: BigDecimal,
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub igst: BigDecimal,
    pub line_total: BigDecimal,
    pub on_demand: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_lines)]
pub struct NewOrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub model_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub gst_rate: BigDecimal,
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub igst: BigDecimal,
    pub line_total: BigDecimal,
    pub on_demand: bool,
}

impl NewOrderLineRow {
    pub fn new(order_id: Uuid, line_no: i32, line: &ReservedLineItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            line_no,
            product_id: line.product_id,
            model_id: line.model_id,
            variant_id: line.variant_id,
            quantity: line.quantity,
            unit_price: line.unit_price.clone(),
            gst_rate: line.gst_rate.clone(),
            cgst: line.tax.cgst.clone(),
            sgst: line.tax.sgst.clone(),
            igst: line.tax.igst.clone(),
            line_total: line.line_total.clone(),
            on_demand: line.on_demand,
        }
    }
}

impl From<OrderLineRow> for ReservedLineItem {
    fn from(row: OrderLineRow) -> Self {
        Self {
            product_id: row.product_id,
            model_id: row.model_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            gst_rate: row.gst_rate,
            tax: TaxSplit {
                cgst: row.cgst,
                sgst: row.sgst,
                igst: row.igst,
            },
            line_total: row.line_total,
            on_demand: row.on_demand,
        }
    }
}

impl OrderRow {
    /// Rebuilds the aggregate. `lines` must already be in `line_no` order.
    pub fn into_order(self, lines: Vec<OrderLineRow>) -> Result<Order, DomainError> {
        let customer = match (self.customer_id, self.guest_email) {
            (Some(id), _) => Customer::Registered(id),
            (None, Some(email)) => Customer::Guest(GuestContact {
                name: self.guest_name.unwrap_or_default(),
                email,
                phone: self.guest_phone,
            }),
            (None, None) => {
                return Err(DomainError::Internal(format!(
                    "order {} has neither a customer nor a guest",
                    self.id
                )))
            }
        };

        Ok(Order {
            id: self.id,
            invoice_number: self.invoice_number,
            customer,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            payment_method: PaymentMethod::from_str(&self.payment_method)?,
            status: OrderStatus::from_str(&self.status)?,
            payment_status: PaymentStatus::from_str(&self.payment_status)?,
            lines: lines.into_iter().map(ReservedLineItem::from).collect(),
            subtotal: self.subtotal,
            tax_total: self.tax_total,
            grand_total: self.grand_total,
            tax_exempt: self.tax_exempt,
            created_at: self.created_at,
        })
    }
}

// ── Status events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_status_events)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatusEventRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub actor_id: String,
    pub actor_role: String,
    pub note: String,
    pub system_generated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_status_events)]
pub struct NewStatusEventRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub actor_id: String,
    pub actor_role: String,
    pub note: String,
    pub system_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&StatusEvent> for NewStatusEventRow {
    fn from(event: &StatusEvent) -> Self {
        Self {
            id: event.id,
            order_id: event.order_id,
            status: event.status.as_str().to_string(),
            actor_id: event.actor.id.clone(),
            actor_role: event.actor.role.as_str().to_string(),
            note: event.note.clone(),
            system_generated: event.system_generated,
            created_at: event.created_at,
        }
    }
}

impl TryFrom<StatusEventRow> for StatusEvent {
    type Error = DomainError;

    fn try_from(row: StatusEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            status: OrderStatus::from_str(&row.status)?,
            actor: Actor::new(row.actor_id, ActorRole::from_str(&row.actor_role)?),
            note: row.note,
            system_generated: row.system_generated,
            created_at: row.created_at,
        })
    }
}

// ── Outbox and audit ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = commerce_order_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = commerce_order_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = audit_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditRow {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub action: String,
    pub actor: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_log)]
pub struct NewAuditRow {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub action: String,
    pub actor: String,
    pub details: Value,
}
