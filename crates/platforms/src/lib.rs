//! # Platform Adapters
//!
//! One adapter per external commerce platform, all behind the
//! [`PlatformAdapter`] capability trait: fetch, product CRUD, absolute
//! inventory sets, webhook verification and parsing. Adapters own the I/O
//! shape only; every domain invariant lives in the catalog crate.

pub mod adapter;
pub mod clover;
pub mod http;
pub mod shopify;
pub mod square;
pub mod types;

pub use adapter::{AdapterRegistry, PlatformAdapter};
pub use clover::CloverAdapter;
pub use shopify::ShopifyAdapter;
pub use square::SquareAdapter;
pub use types::{
    CreateProductResult, FetchAllResult, InventoryUpdate, PlatformCredentials, WebhookEvent,
    WebhookHeaders,
};
