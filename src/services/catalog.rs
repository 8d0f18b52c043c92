use crate::{
    entities::product::{self, Category},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// A product as read from a seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock: i32,
    pub category: Category,
    pub image: String,
}

/// Read access to the product catalog, plus bulk import for seeding.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Every product, unfiltered and unpaginated.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        product::Entity::find().all(&*self.db).await.map_err(|e| {
            error!(error = %e, "Failed to fetch products");
            ServiceError::StoreError(e)
        })
    }

    /// Inserts `products` in one transaction, optionally wiping the catalog first.
    #[instrument(skip(self, products), fields(count = products.len()))]
    pub async fn import_products(
        &self,
        products: Vec<NewProduct>,
        replace: bool,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let txn = self.db.begin().await?;

        if replace {
            let removed = product::Entity::delete_many().exec(&txn).await?;
            info!(removed = removed.rows_affected, "Cleared existing products");
        }

        let mut created = Vec::with_capacity(products.len());
        for input in products {
            let model = product::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(input.name),
                price: Set(input.price),
                stock: Set(input.stock),
                category: Set(input.category),
                image: Set(input.image),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| match e {
                sea_orm::DbErr::Custom(msg) => ServiceError::ValidationError(msg),
                other => ServiceError::StoreError(other),
            })?;
            created.push(model);
        }

        txn.commit().await?;
        info!(count = created.len(), "Imported products");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    async fn catalog() -> CatalogService {
        CatalogService::new(Arc::new(test_pool().await))
    }

    fn shoe(name: &str, stock: i32) -> NewProduct {
        NewProduct {
            name: name.into(),
            price: dec!(89.99),
            stock,
            category: Category::Sneaker,
            image: "/images/shoe.png".into(),
        }
    }

    #[tokio::test]
    async fn import_trims_names_and_lists_everything() {
        let catalog = catalog().await;
        catalog
            .import_products(vec![shoe("  Runner  ", 3), shoe("Trail", 0)], false)
            .await
            .unwrap();

        let mut names: Vec<_> = catalog
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Runner", "Trail"]);
    }

    #[tokio::test]
    async fn replace_clears_previous_catalog() {
        let catalog = catalog().await;
        catalog.import_products(vec![shoe("Old", 1)], false).await.unwrap();
        catalog.import_products(vec![shoe("New", 1)], true).await.unwrap();

        let products = catalog.list_products().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "New");
    }

    #[tokio::test]
    async fn invalid_product_aborts_the_whole_import() {
        let catalog = catalog().await;
        let result = catalog
            .import_products(vec![shoe("Fine", 1), shoe("Broken", -1)], false)
            .await;

        assert_matches!(result, Err(ServiceError::ValidationError(_)));
        assert!(catalog.list_products().await.unwrap().is_empty());
    }
}
