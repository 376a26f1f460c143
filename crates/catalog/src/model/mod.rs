//! Canonical entities and their cross-cutting invariants.
//!
//! Entities reference each other by id, never by back-pointer; every lookup
//! goes through the store. Ownership is row-level: each entity carries the
//! `user_id` of its owner and every store write path checks it.

pub mod connection;
pub mod inventory;
pub mod mapping;
pub mod product;
pub mod refs;
pub mod variant;

pub use connection::{ConnectionStatus, PlatformConnection, PlatformType, ScanSummary};
pub use inventory::InventoryLevel;
pub use mapping::{PlatformProductMapping, SyncStatus};
pub use product::Product;
pub use refs::EntityRef;
pub use variant::ProductVariant;
