//! Product catalog seam.
//!
//! The catalog itself (names, units, prices, departments) is owned by an
//! external service. Production only needs lookups: price-at-creation checks
//! and the owning department when a product's inventory record is created.

pub mod catalog;

pub use catalog::{CatalogError, CatalogProduct, InMemoryCatalog, ProductCatalog, ProductId};
