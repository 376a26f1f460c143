//! # Canonical Catalog
//!
//! The platform-independent data model for products, variants and inventory,
//! the persistence contract over it, and the mapping engine that translates
//! between canonical and platform shapes.

pub mod mapper;
pub mod model;
pub mod store;

pub use model::{
    ConnectionStatus, EntityRef, InventoryLevel, PlatformConnection, PlatformProductMapping,
    PlatformType, Product, ProductVariant, ScanSummary, SyncStatus,
};
pub use store::CatalogStore;
