use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::domain::order::PaymentMethod;
use crate::domain::workflow::{ActorRole, OrderStatus, PaymentStatus};
use crate::handlers::orders;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fulfillment Engine API",
        version = "0.1.0",
        description = "Order placement with all-or-nothing stock reservation, GST splitting and the order status workflow."
    ),
    paths(
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::status_history,
        orders::update_status,
        orders::cancel_order,
        orders::update_payment_status,
        orders::mark_tax_exempt,
    ),
    components(schemas(
        orders::CreateOrderRequest,
        orders::CreateOrderLineRequest,
        orders::CreateOrderResponse,
        orders::GuestContactDto,
        orders::ActorDto,
        orders::UpdateStatusRequest,
        orders::CancelOrderRequest,
        orders::UpdatePaymentStatusRequest,
        orders::TaxExemptRequest,
        orders::OrderResponse,
        orders::OrderLineResponse,
        orders::StatusEventResponse,
        orders::StatusChangedResponse,
        orders::CancellationResponse,
        orders::OrderUpdatedResponse,
        orders::ListOrdersResponse,
        OrderStatus,
        PaymentStatus,
        PaymentMethod,
        ActorRole,
    )),
    tags((name = "orders", description = "Order placement and lifecycle"))
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi())
}
