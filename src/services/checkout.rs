use crate::{
    common::{require_positive_amount, to_minor_units},
    config::AppConfig,
    entities::{order, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::payment_gateway::{is_valid_intent_id, CreateIntentRequest, PaymentGateway},
    services::UserContext,
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    /// Confirm with the gateway that a payment succeeded before fulfilling it.
    pub verify_payments: bool,
}

impl From<&AppConfig> for CheckoutSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            currency: cfg.currency.clone(),
            verify_payments: cfg.verify_payments,
        }
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            verify_payments: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentIntentInput {
    pub product_id: Uuid,
    /// Major units as proposed by the client
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct PaymentIntentCreated {
    pub intent_id: String,
    pub client_secret: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CompleteOrderInput {
    pub product_id: Uuid,
    pub amount: Decimal,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone)]
pub struct CompletedOrder {
    pub order: order::Model,
    pub new_stock: i32,
}

/// Starts payments and turns confirmed payments into orders.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            settings,
        }
    }

    /// Checks the caller and the product, then asks the gateway for a
    /// payment intent. Stock is only checked here, never reserved.
    #[instrument(skip(self, user), fields(product_id = %input.product_id))]
    pub async fn create_payment_intent(
        &self,
        user: &UserContext,
        input: PaymentIntentInput,
    ) -> Result<PaymentIntentCreated, ServiceError> {
        let user_id = user.require_user_id()?;
        let receipt_email = user.require_email()?.to_string();
        let amount = require_positive_amount(input.amount)?;

        let product = product::Entity::find_by_id(input.product_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Product lookup failed while creating payment intent");
                ServiceError::GatewayError(format!("product lookup failed: {}", e))
            })?
            .ok_or_else(|| ServiceError::NotFound("Product not found.".to_string()))?;

        if product.stock < 1 {
            info!(product_id = %product.id, "Rejected payment intent for sold-out product");
            return Err(ServiceError::OutOfStock(product.id));
        }

        if amount != product.price {
            warn!(
                product_id = %product.id,
                proposed = %amount,
                catalog_price = %product.price,
                "Proposed amount differs from catalog price"
            );
        }

        let amount_minor = to_minor_units(amount)?;
        let metadata = BTreeMap::from([
            ("userId".to_string(), user_id.to_string()),
            ("productId".to_string(), product.id.to_string()),
        ]);

        let intent = self
            .gateway
            .create_payment_intent(CreateIntentRequest {
                amount: amount_minor,
                currency: self.settings.currency.clone(),
                receipt_email,
                metadata,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Payment gateway failed to create intent");
                counter!("storefront_checkout.gateway_errors", 1);
                ServiceError::GatewayError(e.to_string())
            })?;

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            error!(intent_id = %intent.id, "Gateway returned an intent without client secret");
            ServiceError::GatewayError(format!("intent {} has no client secret", intent.id))
        })?;

        counter!("storefront_checkout.intents_created", 1);
        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                intent_id: intent.id.clone(),
                product_id: product.id,
                user_id,
                amount_minor,
            });

        info!(intent_id = %intent.id, amount_minor, "Payment intent created");
        Ok(PaymentIntentCreated {
            intent_id: intent.id,
            client_secret,
            product_id: product.id,
            product_name: product.name,
            amount,
        })
    }

    /// Decrements stock and records the order in one transaction.
    ///
    /// The decrement is a single `UPDATE .. WHERE stock > 0 RETURNING`, so
    /// concurrent completions can never oversell or lose an update. A
    /// failure anywhere before commit leaves stock untouched.
    #[instrument(skip(self, user), fields(product_id = %input.product_id, payment_id = %input.payment_intent_id))]
    pub async fn complete_order(
        &self,
        user: &UserContext,
        input: CompleteOrderInput,
    ) -> Result<CompletedOrder, ServiceError> {
        let user_id = user.require_user_id()?;
        let user_email = user.require_email()?.to_string();
        let amount_minor = to_minor_units(require_positive_amount(input.amount)?)?;
        let payment_id = input.payment_intent_id.trim().to_string();
        if payment_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "paymentIntentId is required".to_string(),
            ));
        }
        if !is_valid_intent_id(&payment_id) {
            return Err(ServiceError::ValidationError(
                "paymentIntentId is malformed".to_string(),
            ));
        }

        if self.settings.verify_payments {
            self.verify_payment(&payment_id, amount_minor, user_id, input.product_id)
                .await?;
        }

        let existing = order::Entity::find()
            .filter(order::Column::PaymentId.eq(payment_id.as_str()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::OrderFinalization)?;
        if existing.is_some() {
            warn!("Payment already used for an order");
            counter!("storefront_checkout.duplicate_payments", 1);
            return Err(ServiceError::DuplicatePayment(payment_id));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(ServiceError::OrderFinalization)?;

        let now = Utc::now();
        let decremented = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(1),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::Id.eq(input.product_id))
            .filter(product::Column::Stock.gt(0))
            .exec_with_returning(&txn)
            .await
            .map_err(ServiceError::OrderFinalization)?;

        let Some(product) = decremented.into_iter().next() else {
            let still_exists = product::Entity::find_by_id(input.product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::OrderFinalization)?;
            txn.rollback()
                .await
                .map_err(ServiceError::OrderFinalization)?;

            return Err(match still_exists {
                None => {
                    error!("Product vanished before order completion; payment captured without order");
                    ServiceError::NotFound(
                        "Product not found during order completion. Stock not reduced."
                            .to_string(),
                    )
                }
                Some(_) => {
                    error!("Product sold out after payment; order not fulfilled, refund required");
                    counter!("storefront_checkout.paid_but_sold_out", 1);
                    ServiceError::OutOfStock(input.product_id)
                }
            });
        };

        let new_order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            user_email: Set(user_email),
            product_id: Set(product.id),
            product_name: Set(product.name.clone()),
            amount_paid: Set(amount_minor),
            payment_id: Set(payment_id.clone()),
            status: Set(order::OrderStatus::Completed),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // Dropping `txn` on error rolls the decrement back.
        let order = new_order.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                warn!("Concurrent completion with the same payment id");
                counter!("storefront_checkout.duplicate_payments", 1);
                ServiceError::DuplicatePayment(payment_id.clone())
            } else {
                error!(error = %e, "Failed to persist order; stock decrement rolled back");
                ServiceError::OrderFinalization(e)
            }
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit order");
            ServiceError::OrderFinalization(e)
        })?;

        counter!("storefront_checkout.orders_completed", 1);
        self.event_sender
            .send_or_log(Event::OrderCompleted {
                order_id: order.id,
                product_id: product.id,
                payment_id: order.payment_id.clone(),
                new_stock: product.stock,
            });
        if product.stock == 0 {
            self.event_sender.send_or_log(Event::ProductSoldOut(product.id));
        }

        info!(order_id = %order.id, new_stock = product.stock, "Order completed");
        Ok(CompletedOrder {
            order,
            new_stock: product.stock,
        })
    }

    /// The intent must have succeeded, carry exactly the claimed amount, cover
    /// the current catalog price and belong to this user and product.
    async fn verify_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::OrderFinalization)?
            .ok_or_else(|| {
                ServiceError::NotFound(
                    "Product not found during order completion. Stock not reduced.".to_string(),
                )
            })?;
        let price_minor = to_minor_units(product.price)?;

        let intent = self
            .gateway
            .retrieve_payment_intent(payment_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Could not retrieve payment intent for verification");
                ServiceError::GatewayError(e.to_string())
            })?;

        let metadata_matches = intent.metadata.get("userId") == Some(&user_id.to_string())
            && intent.metadata.get("productId") == Some(&product_id.to_string());

        if !intent.is_succeeded()
            || intent.amount != amount_minor
            || intent.amount < price_minor
            || !metadata_matches
        {
            warn!(
                status = %intent.status,
                charged = intent.amount,
                claimed = amount_minor,
                catalog_price = price_minor,
                metadata_matches,
                "Payment not confirmed by gateway"
            );
            counter!("storefront_checkout.unconfirmed_payments", 1);
            return Err(ServiceError::PaymentNotConfirmed(payment_id.to_string()));
        }
        Ok(())
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
