pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payment_gateway;

use crate::errors::ServiceError;
use uuid::Uuid;

/// Identity of the caller as seen by the services, built from the JWT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            email: Some(email.into()),
            name: None,
        }
    }

    pub fn require_user_id(&self) -> Result<Uuid, ServiceError> {
        self.user_id.ok_or_else(|| {
            tracing::error!("Authenticated request carries no user id");
            ServiceError::Unauthenticated("user id missing from token".to_string())
        })
    }

    /// The profile email, if it is usable as a receipt address.
    pub fn require_email(&self) -> Result<&str, ServiceError> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| crate::common::is_plausible_email(email))
            .ok_or(ServiceError::InvalidProfile)
    }
}
