use crate::{entities::order, errors::ServiceError, services::UserContext};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::{error, instrument};

/// Order history lookups.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self, user))]
    pub async fn list_for_user(
        &self,
        user: &UserContext,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let user_id = user.require_user_id()?;

        order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, %user_id, "Failed to fetch orders");
                ServiceError::StoreError(e)
            })
    }
}
