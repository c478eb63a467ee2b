use std::str::FromStr;

use actix_web::{web, HttpRequest, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::order_service::{CreateOrder, OrderService};
use crate::domain::catalog::LineItemRequest;
use crate::domain::errors::DomainError;
use crate::domain::order::{Customer, GuestContact, Order, PaymentMethod, ReservedLineItem};
use crate::domain::workflow::{Actor, ActorRole, OrderStatus, PaymentStatus, StatusEvent};
use crate::errors::AppError;

/// Set by the authenticating gateway in front of this service.
pub const WHOLESALE_HEADER: &str = "X-Wholesale-Customer";

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub model_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    /// Price the client displayed, e.g. "9.99". Audited, never charged.
    pub declared_price: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuestContactDto {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub lines: Vec<CreateOrderLineRequest>,
    pub shipping_address: String,
    /// Defaults to the shipping address.
    pub billing_address: Option<String>,
    pub payment_method: PaymentMethod,
    /// Exactly one of `customer_id` and `guest` must be given.
    pub customer_id: Option<Uuid>,
    pub guest: Option<GuestContactDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub status: OrderStatus,
    pub grand_total: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActorDto {
    pub id: String,
    pub role: ActorRole,
}

impl TryFrom<ActorDto> for Actor {
    type Error = DomainError;

    fn try_from(dto: ActorDto) -> Result<Self, Self::Error> {
        let actor = Actor::new(dto.id, dto.role);
        actor.validate()?;
        Ok(actor)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: String,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: String,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaxExemptRequest {
    #[serde(default)]
    pub note: String,
    pub actor: ActorDto,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub product_id: Uuid,
    pub model_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: String,
    pub gst_rate: String,
    pub cgst: String,
    pub sgst: String,
    pub igst: String,
    pub line_total: String,
    pub on_demand: bool,
}

impl From<&ReservedLineItem> for OrderLineResponse {
    fn from(l: &ReservedLineItem) -> Self {
        Self {
            product_id: l.product_id,
            model_id: l.model_id,
            variant_id: l.variant_id,
            quantity: l.quantity,
            unit_price: l.unit_price.to_string(),
            gst_rate: l.gst_rate.to_string(),
            cgst: l.tax.cgst.to_string(),
            sgst: l.tax.sgst.to_string(),
            igst: l.tax.igst.to_string(),
            line_total: l.line_total.to_string(),
            on_demand: l.on_demand,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Option<Uuid>,
    pub guest: Option<GuestContactDto>,
    pub shipping_address: String,
    pub billing_address: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: String,
    pub tax_total: String,
    pub grand_total: String,
    pub tax_exempt: bool,
    pub created_at: String,
    pub lines: Vec<OrderLineResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        let (customer_id, guest) = match &o.customer {
            Customer::Registered(id) => (Some(*id), None),
            Customer::Guest(g) => (
                None,
                Some(GuestContactDto {
                    name: g.name.clone(),
                    email: g.email.clone(),
                    phone: g.phone.clone(),
                }),
            ),
        };
        Self {
            id: o.id,
            invoice_number: o.invoice_number.clone(),
            customer_id,
            guest,
            shipping_address: o.shipping_address.clone(),
            billing_address: o.billing_address.clone(),
            payment_method: o.payment_method,
            status: o.status,
            payment_status: o.payment_status,
            subtotal: o.subtotal.to_string(),
            tax_total: o.tax_total.to_string(),
            grand_total: o.grand_total.to_string(),
            tax_exempt: o.tax_exempt,
            created_at: o.created_at.to_rfc3339(),
            lines: o.lines.iter().map(OrderLineResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusEventResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub note: String,
    pub system_generated: bool,
    pub created_at: String,
}

impl From<&StatusEvent> for StatusEventResponse {
    fn from(e: &StatusEvent) -> Self {
        Self {
            id: e.id,
            status: e.status,
            actor_id: e.actor.id.clone(),
            actor_role: e.actor.role,
            note: e.note.clone(),
            system_generated: e.system_generated,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusChangedResponse {
    pub order: OrderResponse,
    pub event: StatusEventResponse,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancellationResponse {
    pub event: StatusEventResponse,
    pub restored_lines: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderUpdatedResponse {
    pub order: OrderResponse,
    pub warnings: Vec<String>,
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

// ── Request mapping ──────────────────────────────────────────────────────────

fn customer_of(customer_id: Option<Uuid>, guest: Option<GuestContactDto>) -> Result<Customer, DomainError> {
    match (customer_id, guest) {
        (Some(id), None) => Ok(Customer::Registered(id)),
        (None, Some(g)) => Ok(Customer::Guest(GuestContact {
            name: g.name,
            email: g.email,
            phone: g.phone,
        })),
        (Some(_), Some(_)) => Err(DomainError::invalid("give either customer_id or guest, not both")),
        (None, None) => Err(DomainError::invalid("customer_id or guest is required")),
    }
}

fn line_of(l: CreateOrderLineRequest) -> Result<LineItemRequest, DomainError> {
    let declared_price = l
        .declared_price
        .map(|p| {
            BigDecimal::from_str(&p)
                .map_err(|e| DomainError::invalid(format!("invalid declared_price '{p}': {e}")))
        })
        .transpose()?;
    Ok(LineItemRequest {
        product_id: l.product_id,
        quantity: l.quantity,
        model_id: l.model_id,
        variant_id: l.variant_id,
        declared_price,
    })
}

fn is_wholesale(req: &HttpRequest) -> bool {
    req.headers()
        .get(WHOLESALE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

impl CreateOrderRequest {
    fn into_command(self, is_wholesale: bool) -> Result<CreateOrder, DomainError> {
        Ok(CreateOrder {
            customer: customer_of(self.customer_id, self.guest)?,
            lines: self
                .lines
                .into_iter()
                .map(line_of)
                .collect::<Result<_, _>>()?,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            payment_method: self.payment_method,
            is_wholesale,
        })
    }
}

/// Runs a service call on the blocking pool. The closure runs to completion
/// even if the client goes away, so compensation is never cut short.
async fn blocking<T, F>(service: web::Data<OrderService>, f: F) -> Result<T, AppError>
where
    F: FnOnce(&OrderService) -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    web::block(move || f(&service))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Reserves stock for every line, prices and taxes it, and stores the order.
/// Either every line is reserved or none is.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    params(
        ("X-Wholesale-Customer" = Option<bool>, Header, description = "Set by the gateway for wholesale accounts"),
    ),
    responses(
        (status = 201, description = "Order placed", body = CreateOrderResponse),
        (status = 400, description = "Malformed request"),
        (status = 409, description = "Insufficient stock or concurrent conflict"),
        (status = 422, description = "Unknown product"),
        (status = 503, description = "Stock update timed out"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    service: web::Data<OrderService>,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let cmd = body.into_inner().into_command(is_wholesale(&req))?;

    let placed = blocking(service, move |s| s.create_order(cmd)).await?;

    Ok(HttpResponse::Created().json(CreateOrderResponse {
        id: placed.order_id,
        invoice_number: placed.invoice_number,
        status: placed.status,
        grand_total: placed.grand_total.to_string(),
        warnings: placed.warnings,
    }))
}

/// GET /orders/{id}
///
/// Returns the order together with its priced lines.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let order = blocking(service, move |s| s.get_order(order_id)).await?;

    Ok(HttpResponse::Ok().json(OrderResponse::from(&order)))
}

/// GET /orders
///
/// Returns a page of orders, newest first.
/// Use `page` (1-based) and `limit` to control pagination.
#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    service: web::Data<OrderService>,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);

    let result = blocking(service, move |s| s.list_orders(page, limit)).await?;

    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        items: result.items.iter().map(OrderResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

/// GET /orders/{id}/events
#[utoipa::path(
    get,
    path = "/orders/{id}/events",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Status history, oldest first", body = Vec<StatusEventResponse>),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn status_history(
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let events = blocking(service, move |s| s.status_history(order_id)).await?;

    let body: Vec<StatusEventResponse> = events.iter().map(StatusEventResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /orders/{id}/status
///
/// Moves the order one step through the workflow. Requesting `CANCELLED`
/// behaves exactly like the cancel endpoint.
#[utoipa::path(
    post,
    path = "/orders/{id}/status",
    request_body = UpdateStatusRequest,
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Status changed", body = StatusChangedResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Illegal transition or concurrent change"),
    ),
    tag = "orders"
)]
pub async fn update_status(
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let UpdateStatusRequest {
        status,
        note,
        actor,
    } = body.into_inner();
    let actor = Actor::try_from(actor)?;

    let changed = blocking(service, move |s| s.update_status(order_id, status, &note, &actor)).await?;

    Ok(HttpResponse::Ok().json(StatusChangedResponse {
        order: OrderResponse::from(&changed.order),
        event: StatusEventResponse::from(&changed.event),
        warnings: changed.warnings,
    }))
}

/// POST /orders/{id}/cancel
///
/// Cancels the order and puts reserved stock back.
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    request_body = CancelOrderRequest,
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order cancelled", body = CancellationResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Already cancelled or no longer cancellable"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
    body: web::Json<CancelOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let CancelOrderRequest { reason, actor } = body.into_inner();
    let actor = Actor::try_from(actor)?;

    let cancelled = blocking(service, move |s| s.cancel_order(order_id, &reason, &actor)).await?;

    Ok(HttpResponse::Ok().json(CancellationResponse {
        event: StatusEventResponse::from(&cancelled.event),
        restored_lines: cancelled.restored_lines,
        warnings: cancelled.warnings,
    }))
}

/// POST /orders/{id}/payment-status
#[utoipa::path(
    post,
    path = "/orders/{id}/payment-status",
    request_body = UpdatePaymentStatusRequest,
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Payment status changed", body = OrderUpdatedResponse),
        (status = 400, description = "Illegal payment transition"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn update_payment_status(
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
    body: web::Json<UpdatePaymentStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let UpdatePaymentStatusRequest {
        payment_status,
        actor,
    } = body.into_inner();
    let actor = Actor::try_from(actor)?;

    let updated = blocking(service, move |s| {
        s.update_payment_status(order_id, payment_status, &actor)
    })
    .await?;

    Ok(HttpResponse::Ok().json(OrderUpdatedResponse {
        order: OrderResponse::from(&updated.order),
        warnings: updated.warnings,
    }))
}

/// POST /orders/{id}/tax-exempt
///
/// Zeroes GST on every line and recomputes the totals. Only once per order.
#[utoipa::path(
    post,
    path = "/orders/{id}/tax-exempt",
    request_body = TaxExemptRequest,
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order exempted", body = OrderUpdatedResponse),
        (status = 400, description = "Order already exempt"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is cancelled"),
    ),
    tag = "orders"
)]
pub async fn mark_tax_exempt(
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
    body: web::Json<TaxExemptRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let TaxExemptRequest { note, actor } = body.into_inner();
    let actor = Actor::try_from(actor)?;

    let updated = blocking(service, move |s| s.mark_tax_exempt(order_id, &note, &actor)).await?;

    Ok(HttpResponse::Ok().json(OrderUpdatedResponse {
        order: OrderResponse::from(&updated.order),
        warnings: updated.warnings,
    }))
}
