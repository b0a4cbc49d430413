use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bakery Orders API",
        version = "0.1.0",
        description = r#"
# Bakery Orders API

Storefront backend for a bakery: carts, checkout, payment settlement and the
production pipeline of paid orders.

## Flow

1. The client builds a cart under `/carts/{cart_key}`. Identical
   configurations of a product share one line.
2. `POST /checkout` snapshots the cart, prices it and opens a payment
   transaction. The shopper is sent to the returned `url`.
3. The gateway returns the shopper to `/payments/commit` (web) or the mobile
   app posts the token to `/payments/mobile/commit`. A paid pending cart
   becomes exactly one order, however many times the return is replayed.
4. Staff move orders along `received`, `in_production`, `ready`, `delivered`
   or cancel them. Owners are notified on every change.

## Error Handling

Errors share one body shape:

```json
{
  "error": "Bad Request",
  "message": "Validation error: cart is empty",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "carts", description = "Client carts keyed by product configuration"),
        (name = "checkout", description = "Turn a cart into a payment transaction"),
        (name = "payments", description = "Gateway return points"),
        (name = "orders", description = "Paid orders and their fulfillment status"),
        (name = "notifications", description = "Push destination registry"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::health_check,

        // Carts
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_line,
        crate::handlers::carts::set_quantity,
        crate::handlers::carts::remove_line,
        crate::handlers::carts::clear_cart,

        // Checkout and settlement
        crate::handlers::checkout::submit_checkout,
        crate::handlers::payments::web_commit_query,
        crate::handlers::payments::web_commit_form,
        crate::handlers::payments::mobile_commit,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::advance_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::set_delivery_date,
        crate::handlers::orders::delete_order,

        crate::handlers::notifications::register_push_destination,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::ResponseMeta,

            // Cart types
            crate::services::commerce::CartLine,
            crate::services::commerce::RawCartLine,
            crate::handlers::carts::CartView,
            crate::handlers::carts::SetQuantityRequest,

            // Checkout types
            crate::services::commerce::CheckoutRequest,
            crate::services::commerce::CheckoutRedirect,
            crate::services::commerce::DeliveryDetails,
            crate::services::commerce::checkout_service::ClientKind,
            crate::entities::pending_cart::DeliveryType,
            crate::handlers::payments::GatewayReturn,
            crate::handlers::payments::MobileCommitRequest,
            crate::services::commerce::CommitOutcome,

            // Order types
            crate::entities::order::OrderStatus,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderLineResponse,
            crate::services::orders::OrderListResponse,
            crate::handlers::orders::TransitionResponse,
            crate::handlers::orders::DeliveryDateRequest,

            // Notification types
            crate::notifications::PushRegistration,
            crate::handlers::notifications::PushDestinationResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
