use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Human-readable error description
    #[schema(example = "Product is out of stock.")]
    pub message: String,
    /// Request identifier for support and debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            request_id: current_request_id(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("User profile email is missing or invalid.")]
    InvalidProfile,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Product is out of stock.")]
    OutOfStock(Uuid),

    #[error("Payment {0} has already been used for an order.")]
    DuplicatePayment(String),

    #[error("Payment {0} has not been confirmed.")]
    PaymentNotConfirmed(String),

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] DbErr),

    #[error("Order finalization failed: {0}")]
    OrderFinalization(DbErr),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidProfile | Self::ValidationError(_) | Self::OutOfStock(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicatePayment(_) => StatusCode::CONFLICT,
            Self::PaymentNotConfirmed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::GatewayError(_) | Self::StoreError(_) | Self::OrderFinalization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages; the cause is only logged.
    pub fn response_message(&self) -> String {
        match self {
            Self::GatewayError(_) => "Payment gateway configuration or processing error.".to_string(),
            Self::StoreError(_) => "Internal server error while accessing the store.".to_string(),
            Self::OrderFinalization(_) => {
                "Order finalization failed due to server error.".to_string()
            }
            Self::Unauthenticated(_) => "Authentication required.".to_string(),
            Self::DuplicatePayment(_) => {
                "This payment has already been used to complete an order.".to_string()
            }
            Self::PaymentNotConfirmed(_) => {
                "Payment has not been confirmed by the payment gateway.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        (status, Json(ErrorResponse::new(self.response_message()))).into_response()
    }
}

/// `Json` extractor whose rejections (bad syntax, missing fields, wrong
/// content type) are rendered as a 400 `ErrorResponse`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "Rejected request body");
                Err(ServiceError::ValidationError(rejection.body_text()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("Product not found.".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!payload.success);
        assert_eq!(payload.message, "Product not found.");
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn internal_causes_are_not_rendered() {
        let response = ServiceError::OrderFinalization(DbErr::Custom(
            "connection reset by peer at 10.0.0.3".into(),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            payload.message,
            "Order finalization failed due to server error."
        );
        assert!(payload.request_id.is_none());
    }

    #[test]
    fn gateway_details_are_hidden() {
        let err = ServiceError::GatewayError("Invalid API Key provided: sk_test_***".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.response_message(),
            "Payment gateway configuration or processing error."
        );
    }

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::InvalidProfile.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::OutOfStock(Uuid::new_v4()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::DuplicatePayment("pi_1".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::PaymentNotConfirmed("pi_1".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ServiceError::StoreError(DbErr::Custom("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn out_of_stock_message_is_user_facing() {
        assert_eq!(
            ServiceError::OutOfStock(Uuid::new_v4()).response_message(),
            "Product is out of stock."
        );
    }
}
