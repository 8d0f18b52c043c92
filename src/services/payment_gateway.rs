use crate::config::AppConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Payment intent creation request in minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntentRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt_email: String,
    pub metadata: BTreeMap<String, String>,
}

/// The subset of a gateway payment intent the storefront reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("gateway response could not be decoded: {0}")]
    Decode(String),

    #[error("malformed payment intent id: {0:?}")]
    InvalidIntentId(String),
}

/// Gateway ids are plain tokens such as `pi_3Nx..`; anything else must never
/// reach a request path.
pub fn is_valid_intent_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// External payment provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_payment_intent(&self, intent_id: &str)
        -> Result<PaymentIntent, GatewayError>;
}

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&AppConfig> for StripeConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            secret_key: cfg.stripe_secret_key.clone(),
            api_base: cfg.stripe_api_base.clone(),
            timeout: cfg.stripe_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Stripe REST client: form-encoded requests, secret key as basic-auth user.
#[derive(Clone, Debug)]
pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn decode(response: reqwest::Response) -> Result<PaymentIntent, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| {
                    let kind = envelope.error.kind.unwrap_or_default();
                    envelope.error.message.map(|m| format!("{} ({})", m, kind))
                })
                .unwrap_or(body);
            warn!(status = status.as_u16(), %message, "Stripe API error");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount = request.amount, currency = %request.currency))]
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut params: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency),
            ("receipt_email".to_string(), request.receipt_email),
        ];
        for (key, value) in request.metadata {
            params.push((format!("metadata[{}]", key), value));
        }

        let response = self
            .client
            .post(self.url("payment_intents"))
            .basic_auth(&self.config.secret_key, Some(""))
            .form(&params)
            .send()
            .await?;

        let intent = Self::decode(response).await?;
        info!(intent_id = %intent.id, "PaymentIntent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        if !is_valid_intent_id(intent_id) {
            return Err(GatewayError::InvalidIntentId(intent_id.to_string()));
        }

        let response = self
            .client
            .get(self.url(&format!("payment_intents/{}", intent_id)))
            .basic_auth(&self.config.secret_key, Some(""))
            .send()
            .await?;

        Self::decode(response).await
    }
}
