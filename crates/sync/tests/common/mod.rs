//! Shared harness for the sync scenario tests: an in-memory store, a
//! scriptable platform adapter, a recording queue and a collecting
//! activity sink.

use async_trait::async_trait;
use channelsync_catalog::mapper::{
    PlatformLocationData, PlatformProductData, PlatformProductInput,
};
use channelsync_catalog::model::{
    ConnectionStatus, PlatformConnection, PlatformType, Product, ProductVariant,
};
use channelsync_catalog::store::memory::InMemoryCatalogStore;
use channelsync_catalog::store::{CatalogStore, ConnectionLocator};
use channelsync_core::activity::{ActivityEntry, ActivityLogger, ActivitySink};
use channelsync_core::config::{QueueOverrides, SecurityConfig};
use channelsync_core::jobs::{
    JobId, JobProgress, JobQueue, JobStatus, QueueSpec, QueuedJob,
};
use channelsync_core::security::CredentialVault;
use channelsync_core::{Error, ErrorCode, Result};
use channelsync_platforms::adapter::{AdapterRegistry, PlatformAdapter};
use channelsync_platforms::types::{
    CreateProductResult, FetchAllResult, InventoryUpdate, PlatformCredentials, WebhookEvent,
    WebhookHeaders,
};
use channelsync_sync::context::SyncContext;
use channelsync_sync::push::PushCoordinator;
use channelsync_sync::queues;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const VAULT_KEY: &str = "0123456789abcdef0123456789abcdef";

/// A platform call observed by the mock adapter.
#[derive(Debug, Clone)]
pub enum RecordedCall {
    FetchAll {
        connection_id: Uuid,
    },
    Create {
        connection_id: Uuid,
        input: PlatformProductInput,
    },
    Update {
        connection_id: Uuid,
        platform_product_id: String,
    },
    Delete {
        connection_id: Uuid,
        platform_product_id: String,
    },
    SetInventory {
        connection_id: Uuid,
        updates: Vec<InventoryUpdate>,
    },
}

/// Scriptable adapter: serves a canned catalog, records every call, and
/// fails on demand.
pub struct MockAdapter {
    platform: PlatformType,
    pub catalog: Mutex<Vec<PlatformProductData>>,
    pub locations: Mutex<Vec<PlatformLocationData>>,
    pub calls: Mutex<Vec<RecordedCall>>,
    /// Error returned by the next mutating call, then cleared.
    pub fail_next: Mutex<Option<ErrorCode>>,
    counter: AtomicU64,
}

impl MockAdapter {
    pub fn new(platform: PlatformType) -> Arc<Self> {
        Arc::new(Self {
            platform,
            catalog: Mutex::new(Vec::new()),
            locations: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            counter: AtomicU64::new(0),
        })
    }

    pub fn set_catalog(
        &self,
        products: Vec<PlatformProductData>,
        locations: Vec<PlatformLocationData>,
    ) {
        *self.catalog.lock().unwrap() = products;
        *self.locations.lock().unwrap() = locations;
    }

    pub fn fail_next_with(&self, code: ErrorCode) {
        *self.fail_next.lock().unwrap() = Some(code);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RecordedCall::Create { .. }))
            .count()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Delete {
                    platform_product_id,
                    ..
                } => Some(platform_product_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_inventory_calls(&self) -> Vec<Vec<InventoryUpdate>> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::SetInventory { updates, .. } => Some(updates.clone()),
                _ => None,
            })
            .collect()
    }

    fn take_failure(&self) -> Option<Error> {
        self.fail_next
            .lock()
            .unwrap()
            .take()
            .map(|code| Error::new(code, "scripted failure"))
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform_type(&self) -> PlatformType {
        self.platform
    }

    async fn fetch_all(
        &self,
        connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
    ) -> Result<FetchAllResult> {
        self.calls.lock().unwrap().push(RecordedCall::FetchAll {
            connection_id: connection.id,
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(FetchAllResult {
            products: self.catalog.lock().unwrap().clone(),
            locations: self.locations.lock().unwrap().clone(),
        })
    }

    async fn fetch_by_ids(
        &self,
        _connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
        ids: &[String],
    ) -> Result<Vec<PlatformProductData>> {
        Ok(self
            .catalog
            .lock()
            .unwrap()
            .iter()
            .filter(|product| ids.contains(&product.platform_product_id))
            .cloned()
            .collect())
    }

    async fn create_product(
        &self,
        connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
        input: &PlatformProductInput,
    ) -> Result<CreateProductResult> {
        self.calls.lock().unwrap().push(RecordedCall::Create {
            connection_id: connection.id,
            input: input.clone(),
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }

        let serial = self.counter.fetch_add(1, Ordering::SeqCst);
        let platform_product_id = format!("{}-prod-{}", self.platform, serial);
        let variant_ids = input
            .variants
            .iter()
            .map(|variant| {
                (
                    variant.canonical_variant_id,
                    format!("{}-var-{}", self.platform, variant.canonical_variant_id),
                )
            })
            .collect();

        Ok(CreateProductResult {
            platform_product_id,
            variant_ids,
        })
    }

    async fn update_product(
        &self,
        connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
        platform_product_id: &str,
        _input: &PlatformProductInput,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::Update {
            connection_id: connection.id,
            platform_product_id: platform_product_id.to_string(),
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(())
    }

    async fn delete_product(
        &self,
        connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
        platform_product_id: &str,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::Delete {
            connection_id: connection.id,
            platform_product_id: platform_product_id.to_string(),
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(())
    }

    async fn set_inventory(
        &self,
        connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
        updates: &[InventoryUpdate],
    ) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall::SetInventory {
            connection_id: connection.id,
            updates: updates.to_vec(),
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(())
    }

    async fn list_locations(
        &self,
        _connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
    ) -> Result<Vec<PlatformLocationData>> {
        Ok(self.locations.lock().unwrap().clone())
    }

    fn verify_webhook(&self, _raw_body: &[u8], headers: &WebhookHeaders) -> Result<()> {
        match headers.get("x-mock-signature").map(String::as_str) {
            Some("valid") => Ok(()),
            _ => Err(Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "mock signature mismatch",
            )),
        }
    }

    fn parse_webhook(&self, raw_body: &[u8], _headers: &WebhookHeaders) -> Result<WebhookEvent> {
        Ok(serde_json::from_slice(raw_body)?)
    }

    fn connection_locator(
        &self,
        _raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<(ConnectionLocator, String)> {
        let shop = headers
            .get("x-mock-shop")
            .cloned()
            .ok_or_else(|| Error::new(ErrorCode::InvalidInput, "missing mock shop header"))?;
        Ok((ConnectionLocator::ShopDomain, shop))
    }
}

/// Queue that records enqueued jobs instead of touching Redis.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<(String, QueuedJob)>>,
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, spec: &QueueSpec, job: QueuedJob) -> Result<JobId> {
        let id = job.id.clone();
        self.jobs
            .lock()
            .unwrap()
            .push((spec.name.to_string(), job));
        Ok(id)
    }

    async fn dequeue(&self, _spec: &QueueSpec, _worker_id: &str) -> Result<Option<QueuedJob>> {
        Ok(None)
    }

    async fn get_status(&self, _spec: &QueueSpec, _job_id: &JobId) -> Result<Option<JobStatus>> {
        Ok(None)
    }

    async fn update_status(
        &self,
        _spec: &QueueSpec,
        _job_id: &JobId,
        _status: JobStatus,
    ) -> Result<()> {
        Ok(())
    }

    async fn record_progress(
        &self,
        _spec: &QueueSpec,
        _job_id: &JobId,
        _progress: JobProgress,
    ) -> Result<()> {
        Ok(())
    }

    async fn recover_stalled(&self, _spec: &QueueSpec) -> Result<u32> {
        Ok(0)
    }

    async fn dead_letter_count(&self, _spec: &QueueSpec) -> Result<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Activity sink that keeps entries for assertions.
#[derive(Default)]
pub struct CollectingActivitySink {
    pub entries: Mutex<Vec<ActivityEntry>>,
}

impl CollectingActivitySink {
    pub fn event_types(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl ActivitySink for CollectingActivitySink {
    async fn record(&self, entry: ActivityEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Everything a scenario needs, wired the way the API binary wires it.
pub struct Harness {
    pub user_id: Uuid,
    pub store: Arc<InMemoryCatalogStore>,
    pub context: Arc<SyncContext>,
    pub coordinator: Arc<PushCoordinator>,
    pub queue: Arc<RecordingQueue>,
    pub activity: Arc<CollectingActivitySink>,
    pub vault: Arc<CredentialVault>,
    pub adapters: HashMap<PlatformType, Arc<MockAdapter>>,
}

impl Harness {
    pub fn new(platforms: &[PlatformType]) -> Self {
        let store = Arc::new(InMemoryCatalogStore::new());
        let vault = Arc::new(
            CredentialVault::new(&SecurityConfig {
                credential_encryption_key: VAULT_KEY.to_string(),
            })
            .unwrap(),
        );
        let activity = Arc::new(CollectingActivitySink::default());
        let queue = Arc::new(RecordingQueue::default());

        let mut registry = AdapterRegistry::new();
        let mut adapters = HashMap::new();
        for platform in platforms {
            let adapter = MockAdapter::new(*platform);
            registry.register(Arc::clone(&adapter) as Arc<dyn PlatformAdapter>);
            adapters.insert(*platform, adapter);
        }

        let context = SyncContext::new(
            Arc::clone(&store) as Arc<dyn CatalogStore>,
            registry,
            Arc::clone(&vault),
            ActivityLogger::new(Arc::clone(&activity) as Arc<dyn ActivitySink>),
        );

        let coordinator = Arc::new(PushCoordinator::new(
            Arc::clone(&context),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            queues::push_operations_spec(&QueueOverrides::default()),
        ));

        Self {
            user_id: Uuid::new_v4(),
            store,
            context,
            coordinator,
            queue,
            activity,
            vault,
            adapters,
        }
    }

    pub fn adapter(&self, platform: PlatformType) -> &Arc<MockAdapter> {
        self.adapters.get(&platform).expect("adapter registered")
    }

    /// Seed a connection in the given state with vault-encrypted mock
    /// credentials.
    pub async fn seed_connection(
        &self,
        platform: PlatformType,
        status: ConnectionStatus,
        is_enabled: bool,
    ) -> PlatformConnection {
        let credentials = self
            .vault
            .encrypt_string(r#"{"access_token":"mock-token"}"#)
            .unwrap();
        let mut connection = PlatformConnection::new(
            self.user_id,
            platform,
            format!("{} store", platform),
            credentials,
        );
        connection.status = status;
        connection.is_enabled = is_enabled;
        connection.platform_specific_data = serde_json::json!({
            "shop": format!("{}.example.com", platform),
            "merchantId": format!("merchant-{}", platform),
        });
        self.store.insert_connection(connection).await.unwrap()
    }

    /// Seed one canonical product with variants, returning the rows.
    pub async fn seed_product(
        &self,
        title: &str,
        skus: &[Option<&str>],
    ) -> (Product, Vec<ProductVariant>) {
        let product = Product::new(self.user_id, title);
        let product = self
            .store
            .upsert_products(self.user_id, vec![product])
            .await
            .unwrap()
            .remove(0);

        let mut variants = Vec::new();
        for (index, sku) in skus.iter().enumerate() {
            let mut variant = ProductVariant::new(
                product.id,
                self.user_id,
                title,
                Decimal::new(1000 + index as i64 * 100, 2),
            );
            variant.sku = sku.map(str::to_string);
            variants.push(variant);
        }
        let variants = self
            .store
            .upsert_variants(self.user_id, variants)
            .await
            .unwrap();

        (product, variants)
    }
}

/// Build a platform product fixture with `(variant id, sku, [(location, qty)])`.
pub fn platform_product(
    product_id: &str,
    title: &str,
    variants: &[(&str, &str, &[(Option<&str>, i64)])],
) -> PlatformProductData {
    use channelsync_catalog::mapper::{PlatformInventoryData, PlatformVariantData};

    PlatformProductData {
        platform_product_id: product_id.to_string(),
        title: title.to_string(),
        description: None,
        image_urls: Vec::new(),
        is_archived: false,
        variants: variants
            .iter()
            .map(|(variant_id, sku, inventory)| PlatformVariantData {
                platform_variant_id: variant_id.to_string(),
                sku: Some(sku.to_string()),
                barcode: None,
                title: title.to_string(),
                description: None,
                price: Decimal::new(1999, 2),
                compare_at_price: None,
                cost: None,
                weight: None,
                weight_unit: None,
                options: HashMap::new(),
                is_taxable: true,
                tax_code: None,
                requires_shipping: true,
                image_url: None,
                inventory: inventory
                    .iter()
                    .map(|(location, quantity)| PlatformInventoryData {
                        platform_location_id: location.map(str::to_string),
                        quantity: *quantity,
                    })
                    .collect(),
                updated_at: None,
            })
            .collect(),
        variants_count: Some(variants.len() as u64),
    }
}

pub fn location(id: &str, name: &str, is_default: bool) -> PlatformLocationData {
    PlatformLocationData {
        platform_location_id: id.to_string(),
        name: name.to_string(),
        is_default,
    }
}
