use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Product catalog, Stripe-backed checkout and order history for the shoe store.

## Checkout flow

1. `POST /api/orders/create-payment-intent` returns a Stripe client secret.
2. The client confirms the payment with Stripe.
3. `POST /api/orders/complete-order` records the order and decrements stock.

## Authentication

Obtain a token from `POST /auth/login` and send it in the Authorization header,
either as `Bearer <token>` or as the bare token.
"#
    ),
    paths(
        crate::handlers::products::list_products,
        crate::handlers::orders::create_payment_intent,
        crate::handlers::orders::complete_order,
        crate::handlers::orders::my_orders,
        crate::auth::signup_handler,
        crate::auth::login_handler,
        crate::health::health_check,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::products::ProductResponse,
        crate::handlers::products::ProductListResponse,
        crate::handlers::orders::CreatePaymentIntentRequest,
        crate::handlers::orders::PaymentIntentResponse,
        crate::handlers::orders::OrderInfo,
        crate::handlers::orders::CompleteOrderRequest,
        crate::handlers::orders::CompleteOrderResponse,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::MyOrdersResponse,
        crate::auth::SignupRequest,
        crate::auth::SignupResponse,
        crate::auth::LoginRequest,
        crate::auth::LoginResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "products", description = "Catalog"),
        (name = "orders", description = "Checkout and order history"),
        (name = "auth", description = "Accounts and tokens"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
