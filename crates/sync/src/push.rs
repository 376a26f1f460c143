//! Push coordinator: fans canonical changes out to every linked, enabled
//! connection and manages mapping-row lifecycle and per-connection error
//! state.
//!
//! Every `execute_*` is at-least-once under queue retry. Idempotency comes
//! from upserts on declared unique keys, absolute inventory sets, and
//! delete treating missing-on-platform as success. A connection that
//! already holds a mapping for a product is skipped by the create path, so
//! a retried job converges instead of duplicating platform products.

use crate::context::SyncContext;
use crate::jobs::{PushJobData, push_job_types};
use crate::queues;
use channelsync_catalog::mapper::platform::{build_platform_input, PushMode};
use channelsync_catalog::model::{
    ConnectionStatus, PlatformConnection, PlatformProductMapping, SyncStatus,
};
use channelsync_core::activity::events;
use channelsync_core::jobs::{JobId, JobQueue, QueueSpec, QueuedJob};
use channelsync_core::{Error, ErrorCode, Result};
use channelsync_platforms::types::InventoryUpdate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct PushCoordinator {
    context: Arc<SyncContext>,
    queue: Arc<dyn JobQueue>,
    push_spec: QueueSpec,
}

impl PushCoordinator {
    pub fn new(
        context: Arc<SyncContext>,
        queue: Arc<dyn JobQueue>,
        push_spec: QueueSpec,
    ) -> Self {
        debug_assert_eq!(push_spec.name, queues::PUSH_OPERATIONS);
        Self {
            context,
            queue,
            push_spec,
        }
    }

    // === Enqueue entry points ===

    pub async fn queue_product_create(&self, user_id: Uuid, product_id: Uuid) -> Result<JobId> {
        self.enqueue(user_id, push_job_types::PRODUCT_CREATE, product_id)
            .await
    }

    pub async fn queue_product_update(&self, user_id: Uuid, product_id: Uuid) -> Result<JobId> {
        self.enqueue(user_id, push_job_types::PRODUCT_UPDATE, product_id)
            .await
    }

    pub async fn queue_product_delete(&self, user_id: Uuid, product_id: Uuid) -> Result<JobId> {
        self.enqueue(user_id, push_job_types::PRODUCT_DELETE, product_id)
            .await
    }

    pub async fn queue_inventory_update(&self, user_id: Uuid, variant_id: Uuid) -> Result<JobId> {
        self.enqueue(user_id, push_job_types::INVENTORY_UPDATE, variant_id)
            .await
    }

    /// Pushes are refused while any of the user's enabled connections is
    /// mid-scan or mid-reconcile; confirmation is what flips a connection
    /// to `syncing` and opens the gate.
    async fn enqueue(&self, user_id: Uuid, job_type: &str, entity_id: Uuid) -> Result<JobId> {
        let connections = self.context.store.list_enabled_connections(user_id).await?;
        if let Some(busy) = connections.iter().find(|c| c.status.is_busy()) {
            return Err(Error::new(
                ErrorCode::ConnectionBusy,
                format!(
                    "connection {} is {}; pushes are refused until it settles",
                    busy.id, busy.status
                ),
            ));
        }

        let data = serde_json::to_value(PushJobData { user_id, entity_id })?;
        let job = QueuedJob::new(job_type, data, self.push_spec.max_attempts);
        self.queue.enqueue(&self.push_spec, job).await
    }

    // === Execution ===

    /// Create the product on every enabled connection that does not hold a
    /// mapping for it yet.
    pub async fn execute_product_create(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let product = self
            .context
            .store
            .get_product(user_id, product_id)
            .await?
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "product not found"))?;

        let variants = self
            .context
            .store
            .get_variants_for_product(user_id, product_id)
            .await?;

        // Most platforms reject products without variants.
        if variants.is_empty() {
            self.context
                .activity
                .warning(
                    user_id,
                    "Product",
                    product_id,
                    events::PRODUCT_PUSH_CREATED_SKIPPED,
                    "product has no variants; nothing to push",
                    serde_json::Value::Null,
                )
                .await;
            return Ok(());
        }

        let mut levels = Vec::new();
        for variant in &variants {
            levels.extend(
                self.context
                    .store
                    .get_levels_for_variant(user_id, variant.id)
                    .await?,
            );
        }

        let mut transient: Option<Error> = None;

        for connection in self.context.store.list_enabled_connections(user_id).await? {
            if connection.status.is_busy() {
                debug!(connection_id = %connection.id, "connection busy; skipping create");
                continue;
            }

            // Retry convergence: a mapped connection already has it.
            if self
                .context
                .store
                .get_mapping_for_variant(connection.id, variants[0].id)
                .await?
                .is_some()
            {
                debug!(connection_id = %connection.id, "product already mapped; skipping create");
                continue;
            }

            let adapter = self.context.adapter_for(&connection)?;
            let credentials = self.context.credentials(&connection)?;

            let locations = match adapter.list_locations(&connection, &credentials).await {
                Ok(locations) => locations,
                Err(err) => {
                    self.record_connection_failure(
                        &connection,
                        user_id,
                        product_id,
                        events::PRODUCT_PUSH_CREATED_FAILED,
                        &err,
                        true,
                        &mut transient,
                    )
                    .await;
                    continue;
                }
            };
            let target_locations: Vec<Option<String>> = locations
                .iter()
                .map(|location| Some(location.platform_location_id.clone()))
                .collect();

            let outcome = build_platform_input(
                &product,
                &variants,
                &levels,
                &target_locations,
                &PushMode::Create,
            );
            for (variant_id, reason) in &outcome.dropped {
                self.context
                    .activity
                    .warning(
                        user_id,
                        "ProductVariant",
                        *variant_id,
                        events::PRODUCT_PUSH_CREATED_SKIPPED,
                        reason.clone(),
                        serde_json::json!({ "connectionId": connection.id }),
                    )
                    .await;
            }
            let Some(input) = outcome.input else {
                // Nothing pushable: no platform call, no mapping rows.
                continue;
            };

            match adapter.create_product(&connection, &credentials, &input).await {
                Ok(created) => {
                    for variant_input in &input.variants {
                        let Some(platform_variant_id) =
                            created.variant_ids.get(&variant_input.canonical_variant_id)
                        else {
                            warn!(
                                connection_id = %connection.id,
                                canonical_variant_id = %variant_input.canonical_variant_id,
                                "platform did not return a variant id; mapping not created"
                            );
                            continue;
                        };

                        let mut mapping = PlatformProductMapping::new(
                            connection.id,
                            variant_input.canonical_variant_id,
                            created.platform_product_id.clone(),
                            Some(platform_variant_id.clone()),
                        )
                        .with_platform_sku(variant_input.sku.clone());
                        mapping.mark_synced();
                        self.context.store.upsert_mapping(mapping).await?;
                    }

                    self.context
                        .store
                        .touch_connection_sync(connection.id, true)
                        .await?;
                    self.context
                        .activity
                        .success(
                            user_id,
                            "Product",
                            product_id,
                            events::PRODUCT_PUSH_CREATED_SUCCESS,
                            format!("created on {}", connection.platform_type),
                            serde_json::json!({
                                "connectionId": connection.id,
                                "platformProductId": created.platform_product_id,
                            }),
                        )
                        .await;
                    info!(
                        connection_id = %connection.id,
                        platform_product_id = %created.platform_product_id,
                        "product created on platform"
                    );
                }
                Err(err) => {
                    self.record_connection_failure(
                        &connection,
                        user_id,
                        product_id,
                        events::PRODUCT_PUSH_CREATED_FAILED,
                        &err,
                        true,
                        &mut transient,
                    )
                    .await;
                }
            }
        }

        match transient {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Update the product on every enabled connection that already maps it.
    /// Connections without a mapping are skipped with a warning — create
    /// and update have different business implications, so no implicit
    /// creation happens here.
    pub async fn execute_product_update(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let product = self
            .context
            .store
            .get_product(user_id, product_id)
            .await?
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "product not found"))?;

        let variants = self
            .context
            .store
            .get_variants_for_product(user_id, product_id)
            .await?;
        if variants.is_empty() {
            return Ok(());
        }

        let mut levels = Vec::new();
        for variant in &variants {
            levels.extend(
                self.context
                    .store
                    .get_levels_for_variant(user_id, variant.id)
                    .await?,
            );
        }

        let mut transient: Option<Error> = None;

        for connection in self.context.store.list_enabled_connections(user_id).await? {
            if connection.status.is_busy() {
                continue;
            }

            let mappings = self
                .context
                .store
                .get_mappings_for_product(connection.id, product_id)
                .await?;
            let Some(primary) = mappings.first() else {
                self.context
                    .activity
                    .warning(
                        user_id,
                        "Product",
                        product_id,
                        events::PRODUCT_PUSH_UPDATED_SKIPPED,
                        "no mapping for connection; update skipped",
                        serde_json::json!({ "connectionId": connection.id }),
                    )
                    .await;
                continue;
            };
            let platform_product_id = primary.platform_product_id.clone();

            let mapped_variant_ids: HashMap<Uuid, String> = mappings
                .iter()
                .filter_map(|mapping| {
                    mapping
                        .platform_variant_id
                        .clone()
                        .map(|platform_id| (mapping.product_variant_id, platform_id))
                })
                .collect();

            let target_locations: Vec<Option<String>> = levels
                .iter()
                .filter(|level| level.platform_connection_id == connection.id)
                .map(|level| level.platform_location_id.clone())
                .collect();

            let outcome = build_platform_input(
                &product,
                &variants,
                &levels,
                &target_locations,
                &PushMode::Update { mapped_variant_ids },
            );
            let Some(input) = outcome.input else {
                continue;
            };

            let adapter = self.context.adapter_for(&connection)?;
            let credentials = self.context.credentials(&connection)?;

            match adapter
                .update_product(&connection, &credentials, &platform_product_id, &input)
                .await
            {
                Ok(()) => {
                    for mapping in &mappings {
                        self.context
                            .store
                            .update_mapping_sync_status(mapping.id, SyncStatus::Success, None)
                            .await?;
                    }
                    self.context
                        .store
                        .touch_connection_sync(connection.id, true)
                        .await?;
                    self.context
                        .activity
                        .success(
                            user_id,
                            "Product",
                            product_id,
                            events::PRODUCT_PUSH_UPDATED_SUCCESS,
                            format!("updated on {}", connection.platform_type),
                            serde_json::json!({ "connectionId": connection.id }),
                        )
                        .await;
                }
                Err(err) => {
                    if err.code == ErrorCode::PlatformRejectedInput {
                        for mapping in &mappings {
                            self.context
                                .store
                                .update_mapping_sync_status(
                                    mapping.id,
                                    SyncStatus::Error,
                                    Some(err.to_string()),
                                )
                                .await?;
                        }
                    }
                    self.record_connection_failure(
                        &connection,
                        user_id,
                        product_id,
                        events::PRODUCT_PUSH_UPDATED_FAILED,
                        &err,
                        false,
                        &mut transient,
                    )
                    .await;
                }
            }
        }

        match transient {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Delete the product from every enabled connection, one call per
    /// connection, removing mapping rows on success. A failing mapping
    /// never poisons the connection status; only the per-mapping record
    /// carries the error.
    pub async fn execute_product_delete(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let mut transient: Option<Error> = None;

        for connection in self.context.store.list_enabled_connections(user_id).await? {
            if connection.status.is_busy() {
                continue;
            }

            let mappings = self
                .context
                .store
                .get_mappings_for_product(connection.id, product_id)
                .await?;
            let Some(primary) = mappings.first() else {
                continue;
            };
            let platform_product_id = primary.platform_product_id.clone();

            let adapter = self.context.adapter_for(&connection)?;
            let credentials = self.context.credentials(&connection)?;

            match adapter
                .delete_product(&connection, &credentials, &platform_product_id)
                .await
            {
                Ok(()) => {
                    for mapping in &mappings {
                        self.context.store.delete_mapping(mapping.id).await?;
                    }
                    self.context
                        .activity
                        .success(
                            user_id,
                            "Product",
                            product_id,
                            events::PRODUCT_PUSH_DELETED_SUCCESS,
                            format!("deleted on {}", connection.platform_type),
                            serde_json::json!({
                                "connectionId": connection.id,
                                "platformProductId": platform_product_id,
                            }),
                        )
                        .await;
                }
                Err(err) => {
                    for mapping in &mappings {
                        self.context
                            .store
                            .update_mapping_sync_status(
                                mapping.id,
                                SyncStatus::Error,
                                Some(err.to_string()),
                            )
                            .await?;
                    }
                    self.context
                        .activity
                        .error(
                            user_id,
                            "Product",
                            product_id,
                            events::PRODUCT_PUSH_DELETED_FAILED,
                            err.to_string(),
                            serde_json::json!({ "connectionId": connection.id }),
                        )
                        .await;
                    if err.is_retryable() && transient.is_none() {
                        transient = Some(err);
                    }
                }
            }
        }

        match transient {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Push a variant's canonical inventory to every enabled connection
    /// that maps it, one absolute `set_inventory` per connection.
    pub async fn execute_inventory_update(&self, user_id: Uuid, variant_id: Uuid) -> Result<()> {
        self.context
            .store
            .get_variant(user_id, variant_id)
            .await?
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "variant not found"))?;

        let levels = self
            .context
            .store
            .get_levels_for_variant(user_id, variant_id)
            .await?;

        let mut transient: Option<Error> = None;

        for connection in self.context.store.list_enabled_connections(user_id).await? {
            if connection.status.is_busy() {
                continue;
            }

            let mapping = self
                .context
                .store
                .get_mapping_for_variant(connection.id, variant_id)
                .await?;
            let Some(mapping) = mapping else {
                self.context
                    .activity
                    .warning(
                        user_id,
                        "ProductVariant",
                        variant_id,
                        events::INVENTORY_PUSH_SKIPPED,
                        "no mapping for connection; inventory push skipped",
                        serde_json::json!({ "connectionId": connection.id }),
                    )
                    .await;
                continue;
            };
            let Some(platform_variant_id) = mapping.platform_variant_id.clone() else {
                self.context
                    .activity
                    .warning(
                        user_id,
                        "ProductVariant",
                        variant_id,
                        events::INVENTORY_PUSH_SKIPPED,
                        "mapping has no platform variant id; inventory push skipped",
                        serde_json::json!({ "connectionId": connection.id }),
                    )
                    .await;
                continue;
            };

            let updates: Vec<InventoryUpdate> = levels
                .iter()
                .filter(|level| level.platform_connection_id == connection.id)
                .map(|level| InventoryUpdate {
                    platform_product_id: mapping.platform_product_id.clone(),
                    platform_variant_id: platform_variant_id.clone(),
                    platform_location_id: level.platform_location_id.clone(),
                    quantity: level.quantity,
                })
                .collect();
            if updates.is_empty() {
                debug!(connection_id = %connection.id, "no levels for connection; nothing to set");
                continue;
            }

            let adapter = self.context.adapter_for(&connection)?;
            let credentials = self.context.credentials(&connection)?;

            match adapter.set_inventory(&connection, &credentials, &updates).await {
                Ok(()) => {
                    self.context
                        .store
                        .update_mapping_sync_status(mapping.id, SyncStatus::Success, None)
                        .await?;
                    self.context
                        .store
                        .touch_connection_sync(connection.id, true)
                        .await?;
                    self.context
                        .activity
                        .success(
                            user_id,
                            "ProductVariant",
                            variant_id,
                            events::INVENTORY_PUSH_SUCCESS,
                            format!("inventory set on {}", connection.platform_type),
                            serde_json::json!({
                                "connectionId": connection.id,
                                "updates": updates.len(),
                            }),
                        )
                        .await;
                }
                Err(err) => {
                    self.record_connection_failure(
                        &connection,
                        user_id,
                        variant_id,
                        events::INVENTORY_PUSH_FAILED,
                        &err,
                        false,
                        &mut transient,
                    )
                    .await;
                }
            }
        }

        match transient {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Shared failure bookkeeping: activity entry, connection error flip
    /// where the operation calls for it, and transient capture for the
    /// queue retry. Credential rejections always flip the connection; a
    /// user must re-authorize before anything else can succeed.
    async fn record_connection_failure(
        &self,
        connection: &PlatformConnection,
        user_id: Uuid,
        entity_id: Uuid,
        event_type: &str,
        err: &Error,
        flip_on_any_failure: bool,
        transient: &mut Option<Error>,
    ) {
        warn!(
            connection_id = %connection.id,
            code = %err.code,
            error = %err,
            "push failed for connection"
        );

        let _ = self
            .context
            .store
            .touch_connection_sync(connection.id, false)
            .await;
        if flip_on_any_failure || err.code == ErrorCode::PlatformAuthRejected {
            let _ = self
                .context
                .store
                .update_connection_status(connection.id, ConnectionStatus::Error)
                .await;
        }

        self.context
            .activity
            .error(
                user_id,
                "Product",
                entity_id,
                event_type,
                err.to_string(),
                serde_json::json!({
                    "connectionId": connection.id,
                    "code": err.code,
                }),
            )
            .await;

        if err.is_retryable() && transient.is_none() {
            *transient = Some(err.clone());
        }
    }
}
