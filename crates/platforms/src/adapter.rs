use crate::types::{
    CreateProductResult, FetchAllResult, InventoryUpdate, PlatformCredentials, WebhookEvent,
    WebhookHeaders,
};
use async_trait::async_trait;
use channelsync_catalog::mapper::{PlatformLocationData, PlatformProductData, PlatformProductInput};
use channelsync_catalog::model::{PlatformConnection, PlatformType};
use channelsync_catalog::store::ConnectionLocator;
use channelsync_core::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability contract every platform integration implements.
///
/// All methods that reach the platform take the connection row plus its
/// decrypted credentials; webhook verification and parsing are pure and run
/// before any connection is identified.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform_type(&self) -> PlatformType;

    /// Paginated traversal of the full catalog. Products are yielded fully
    /// hydrated: every variant page and nested inventory page has been
    /// drained before a product appears in the result.
    async fn fetch_all(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<FetchAllResult>;

    /// Bounded batch lookup (at most 250 ids per call; callers batch).
    /// Missing ids are dropped from the result, not errors.
    async fn fetch_by_ids(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        ids: &[String],
    ) -> Result<Vec<PlatformProductData>>;

    /// Create a product with its variants and absolute inventory for every
    /// target location (0 where canonical data is absent).
    async fn create_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        input: &PlatformProductInput,
    ) -> Result<CreateProductResult>;

    /// Idempotent update. Variants carrying a platform id keep it; variants
    /// without one are created as additions.
    async fn update_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        platform_product_id: &str,
        input: &PlatformProductInput,
    ) -> Result<()>;

    /// Idempotent delete: missing-on-platform is success.
    async fn delete_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        platform_product_id: &str,
    ) -> Result<()>;

    /// Absolute inventory set, never a delta.
    async fn set_inventory(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        updates: &[InventoryUpdate],
    ) -> Result<()>;

    async fn list_locations(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<Vec<PlatformLocationData>>;

    /// Constant-time MAC verification of a raw webhook body. Fails with
    /// `WebhookSignatureInvalid`.
    fn verify_webhook(&self, raw_body: &[u8], headers: &WebhookHeaders) -> Result<()>;

    /// Parse a verified webhook into a normalized event.
    fn parse_webhook(&self, raw_body: &[u8], headers: &WebhookHeaders) -> Result<WebhookEvent>;

    /// Which connection field routes this webhook, and its value.
    fn connection_locator(
        &self,
        raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<(ConnectionLocator, String)>;
}

/// Maps a platform type to its adapter instance.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<PlatformType, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform_type(), adapter);
    }

    pub fn get(&self, platform_type: PlatformType) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<PlatformType> {
        self.adapters.keys().copied().collect()
    }
}
