use channelsync_catalog::store::CatalogStore;
use channelsync_catalog::model::PlatformConnection;
use channelsync_core::activity::ActivityLogger;
use channelsync_core::security::CredentialVault;
use channelsync_core::{Error, ErrorCode, Result};
use channelsync_platforms::adapter::{AdapterRegistry, PlatformAdapter};
use channelsync_platforms::types::PlatformCredentials;
use std::sync::Arc;

/// Shared services every processor needs.
///
/// Constructed once at startup and handed to workers by reference counting.
/// Credentials are decrypted per job through [`SyncContext::credentials`]
/// and never cached here.
pub struct SyncContext {
    pub store: Arc<dyn CatalogStore>,
    pub adapters: AdapterRegistry,
    pub vault: Arc<CredentialVault>,
    pub activity: ActivityLogger,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        adapters: AdapterRegistry,
        vault: Arc<CredentialVault>,
        activity: ActivityLogger,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            adapters,
            vault,
            activity,
        })
    }

    /// Adapter for a connection's platform, or a configuration error when
    /// the platform was never registered.
    pub fn adapter_for(&self, connection: &PlatformConnection) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(connection.platform_type)
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::ConfigurationError,
                    format!("no adapter registered for {}", connection.platform_type),
                )
            })
    }

    /// Decrypt a connection's credentials for the duration of one job.
    pub fn credentials(&self, connection: &PlatformConnection) -> Result<PlatformCredentials> {
        let raw = self
            .vault
            .decrypt_string(&connection.encrypted_credentials)?;
        PlatformCredentials::from_json(&raw)
    }
}
