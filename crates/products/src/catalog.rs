use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfloor_core::{DepartmentId, typed_aggregate_id};

typed_aggregate_id!(
    /// Product identifier (catalog key, also the inventory record key).
    ProductId
);

/// What the catalog reports about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub unit: String,
    pub department_id: DepartmentId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product catalog unavailable: {0}")]
    Unavailable(String),
}

/// `getProduct(id) -> {price, unit, departmentRef}`.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogProduct>, CatalogError>;
}

#[async_trait]
impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogProduct>, CatalogError> {
        (**self).get_product(id).await
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, CatalogProduct>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: CatalogProduct) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product.id, product);
        }
    }

    /// Reprice a product (simulates a catalog update between client fetch and submit).
    pub fn set_price(&self, id: ProductId, price: u64) {
        if let Ok(mut products) = self.products.write() {
            if let Some(p) = products.get_mut(&id) {
                p.price = price;
            }
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogProduct>, CatalogError> {
        let products = self
            .products
            .read()
            .map_err(|_| CatalogError::Unavailable("lock poisoned".to_string()))?;
        Ok(products.get(&id).cloned())
    }
}
