use super::AppState;
use crate::auth::AuthUser;
use crate::entities::order;
use crate::errors::{ApiJson, ErrorResponse, ServiceError};
use crate::services::{
    checkout::{CompleteOrderInput, PaymentIntentInput},
    UserContext,
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub product_id: Uuid,
    /// Major units, e.g. 89.99
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 89.99)]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub product_id: Uuid,
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub success: bool,
    pub client_secret: String,
    pub order_info: OrderInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOrderRequest {
    pub product_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 89.99)]
    pub amount: Decimal,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOrderResponse {
    pub success: bool,
    pub message: String,
    pub new_stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub product_id: Uuid,
    pub product_name: String,
    /// Minor units
    pub amount_paid: i64,
    pub payment_id: String,
    #[schema(value_type = String, example = "Completed")]
    pub status: order::OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            user_email: model.user_email,
            product_id: model.product_id,
            product_name: model.product_name,
            amount_paid: model.amount_paid,
            payment_id: model.payment_id,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MyOrdersResponse {
    pub success: bool,
    pub orders: Vec<OrderResponse>,
}

/// Start a payment for one unit of a product
#[utoipa::path(
    post,
    path = "/api/orders/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = PaymentIntentResponse,
            headers(("x-request-id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Out of stock, non-positive amount, invalid profile email or malformed body", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 500, description = "Payment gateway error", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, ServiceError> {
    let user = UserContext::from(&auth_user);
    let created = state
        .services
        .checkout
        .create_payment_intent(
            &user,
            PaymentIntentInput {
                product_id: payload.product_id,
                amount: payload.amount,
            },
        )
        .await?;

    Ok(Json(PaymentIntentResponse {
        success: true,
        client_secret: created.client_secret,
        order_info: OrderInfo {
            product_id: created.product_id,
            product_name: created.product_name,
            amount: created.amount,
        },
    }))
}

/// Record an order after the client confirmed payment
#[utoipa::path(
    post,
    path = "/api/orders/complete-order",
    request_body = CompleteOrderRequest,
    responses(
        (status = 200, description = "Order recorded and stock decremented", body = CompleteOrderResponse),
        (status = 400, description = "Product sold out, non-positive amount, missing or malformed paymentIntentId, invalid profile email or malformed body", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 402, description = "Payment not confirmed by the gateway", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
        (status = 409, description = "Payment already used", body = ErrorResponse),
        (status = 500, description = "Order finalization failed", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn complete_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CompleteOrderRequest>,
) -> Result<Json<CompleteOrderResponse>, ServiceError> {
    let user = UserContext::from(&auth_user);
    let completed = state
        .services
        .checkout
        .complete_order(
            &user,
            CompleteOrderInput {
                product_id: payload.product_id,
                amount: payload.amount,
                payment_intent_id: payload.payment_intent_id,
            },
        )
        .await?;

    Ok(Json(CompleteOrderResponse {
        success: true,
        message: "Order successfully processed".to_string(),
        new_stock: completed.new_stock,
    }))
}

/// The caller's order history, newest first
#[utoipa::path(
    get,
    path = "/api/orders/my-orders",
    responses(
        (status = 200, description = "Orders of the authenticated user", body = MyOrdersResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<MyOrdersResponse>, ServiceError> {
    let user = UserContext::from(&auth_user);
    let orders = state.services.orders.list_for_user(&user).await?;
    Ok(Json(MyOrdersResponse {
        success: true,
        orders: orders.into_iter().map(OrderResponse::from).collect(),
    }))
}
