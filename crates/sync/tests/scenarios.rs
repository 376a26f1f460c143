//! End-to-end scenarios for the sync core, driven over the in-memory store
//! and scriptable adapters.

mod common;

use channelsync_catalog::model::{ConnectionStatus, PlatformType, SyncStatus};
use channelsync_catalog::store::CatalogStore;
use channelsync_core::activity::events;
use channelsync_core::jobs::{JobContext, JobId};
use channelsync_core::ErrorCode;
use channelsync_platforms::types::{WebhookEvent, WebhookHeaders};
use channelsync_sync::ingest::{IngestOutcome, WebhookIngestor};
use channelsync_sync::queues;
use channelsync_sync::scan::InitialScanProcessor;
use channelsync_sync::webhook::WebhookProcessor;
use channelsync_core::config::QueueOverrides;
use common::{location, platform_product, Harness};
use std::collections::HashMap;
use std::sync::Arc;

fn job_context() -> JobContext {
    JobContext::new(JobId::new(), "test", 1, 3)
}

/// Happy-path scan: two products, three variants, two locations, four
/// inventory levels with exact quantities; summary recorded and the
/// connection handed over for review.
#[tokio::test]
async fn initial_scan_happy_path() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let connection = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Connecting, true)
        .await;

    let adapter = harness.adapter(PlatformType::Shopify);
    adapter.set_catalog(
        vec![
            platform_product(
                "p1",
                "Widget",
                &[
                    ("v1", "A", &[(Some("L1"), 5), (Some("L2"), 0)]),
                    ("v2", "B", &[(Some("L1"), 3)]),
                ],
            ),
            platform_product("p2", "Gadget", &[("v3", "C", &[(Some("L2"), 7)])]),
        ],
        vec![location("L1", "Main", true), location("L2", "Annex", false)],
    );

    let processor = InitialScanProcessor::new(Arc::clone(&harness.context));
    let summary = processor
        .run(connection.id, harness.user_id, &job_context())
        .await
        .unwrap();

    assert_eq!(summary.count_products, 2);
    assert_eq!(summary.count_variants, 3);
    assert_eq!(summary.count_locations, 2);

    // Exact canonical rows.
    assert_eq!(harness.store.products_for_user(harness.user_id).len(), 2);
    let variants = harness
        .store
        .get_variants_for_user(harness.user_id)
        .await
        .unwrap();
    assert_eq!(variants.len(), 3);

    let levels = harness.store.all_levels();
    assert_eq!(levels.len(), 4);
    let quantity_for = |sku: &str, location: &str| {
        let variant = variants
            .iter()
            .find(|v| v.sku.as_deref() == Some(sku))
            .unwrap();
        levels
            .iter()
            .find(|level| {
                level.product_variant_id == variant.id
                    && level.platform_location_id.as_deref() == Some(location)
            })
            .map(|level| level.quantity)
    };
    assert_eq!(quantity_for("A", "L1"), Some(5));
    assert_eq!(quantity_for("A", "L2"), Some(0));
    assert_eq!(quantity_for("B", "L1"), Some(3));
    assert_eq!(quantity_for("C", "L2"), Some(7));

    // Connection state and persisted summary.
    let connection = harness.store.connection(connection.id).unwrap();
    assert_eq!(connection.status, ConnectionStatus::NeedsReview);
    let summary = connection.scan_summary().unwrap();
    assert_eq!(
        (summary.count_products, summary.count_variants, summary.count_locations),
        (2, 3, 2)
    );
    assert!(connection.platform_specific_data["mappingSuggestions"].is_array());
}

/// Re-running a scan converges on the same canonical state instead of
/// duplicating rows.
#[tokio::test]
async fn initial_scan_is_idempotent() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let connection = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Connecting, true)
        .await;

    harness.adapter(PlatformType::Shopify).set_catalog(
        vec![platform_product(
            "p1",
            "Widget",
            &[("v1", "A", &[(Some("L1"), 5)])],
        )],
        vec![location("L1", "Main", true)],
    );

    let processor = InitialScanProcessor::new(Arc::clone(&harness.context));
    processor
        .run(connection.id, harness.user_id, &job_context())
        .await
        .unwrap();
    processor
        .run(connection.id, harness.user_id, &job_context())
        .await
        .unwrap();

    assert_eq!(harness.store.products_for_user(harness.user_id).len(), 1);
    assert_eq!(
        harness
            .store
            .get_variants_for_user(harness.user_id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(harness.store.all_levels().len(), 1);
}

/// Scan against an empty platform: no products, no error, review state.
#[tokio::test]
async fn scan_with_zero_locations_completes_cleanly() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let connection = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Connecting, true)
        .await;
    // Adapter serves an empty catalog by default.

    let processor = InitialScanProcessor::new(Arc::clone(&harness.context));
    let summary = processor
        .run(connection.id, harness.user_id, &job_context())
        .await
        .unwrap();

    assert_eq!(summary.count_products, 0);
    assert_eq!(summary.count_locations, 0);
    assert!(harness.store.products_for_user(harness.user_id).is_empty());
    assert_eq!(
        harness.store.connection(connection.id).unwrap().status,
        ConnectionStatus::NeedsReview
    );
}

/// A failed scan flips the connection to error and re-throws for retry.
#[tokio::test]
async fn scan_failure_flips_connection_to_error() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let connection = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Connecting, true)
        .await;
    harness
        .adapter(PlatformType::Shopify)
        .fail_next_with(ErrorCode::PlatformTransient);

    let processor = InitialScanProcessor::new(Arc::clone(&harness.context));
    let err = processor
        .run(connection.id, harness.user_id, &job_context())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(
        harness.store.connection(connection.id).unwrap().status,
        ConnectionStatus::Error
    );
}

/// S3: push create to two connections where one fails transiently. The
/// healthy connection gets its mapping, the failing one flips to error,
/// both outcomes land in the activity log, and the retry converges without
/// duplicating the healthy platform's product.
#[tokio::test]
async fn push_create_partial_failure_and_retry() {
    let harness = Harness::new(&[PlatformType::Shopify, PlatformType::Square]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    let square = harness
        .seed_connection(PlatformType::Square, ConnectionStatus::Syncing, true)
        .await;

    let (product, variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;
    harness
        .adapter(PlatformType::Square)
        .fail_next_with(ErrorCode::PlatformTransient);

    let err = harness
        .coordinator
        .execute_product_create(harness.user_id, product.id)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // Shopify mapped; Square errored.
    assert_eq!(harness.store.mappings_for_connection(shopify.id).len(), 1);
    assert!(harness.store.mappings_for_connection(square.id).is_empty());
    assert_eq!(
        harness.store.connection(square.id).unwrap().status,
        ConnectionStatus::Error
    );

    let event_types = harness.activity.event_types();
    assert!(event_types.contains(&events::PRODUCT_PUSH_CREATED_SUCCESS.to_string()));
    assert!(event_types.contains(&events::PRODUCT_PUSH_CREATED_FAILED.to_string()));

    // Square recovers; the retried job creates only the missing mapping.
    harness
        .coordinator
        .execute_product_create(harness.user_id, product.id)
        .await
        .unwrap();

    assert_eq!(harness.store.mappings_for_connection(square.id).len(), 1);
    assert_eq!(harness.adapter(PlatformType::Shopify).create_calls(), 1);
    assert_eq!(harness.adapter(PlatformType::Square).create_calls(), 2);

    let mapping = &harness.store.mappings_for_connection(square.id)[0];
    assert_eq!(mapping.product_variant_id, variants[0].id);
    assert_eq!(mapping.sync_status, SyncStatus::Success);
}

/// Create push where every variant lacks a SKU: no platform call, a
/// warning in the activity log, and no mapping rows.
#[tokio::test]
async fn push_create_without_skus_makes_no_platform_calls() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;

    let (product, _variants) = harness.seed_product("No Sku Product", &[None, None]).await;

    harness
        .coordinator
        .execute_product_create(harness.user_id, product.id)
        .await
        .unwrap();

    assert_eq!(harness.adapter(PlatformType::Shopify).create_calls(), 0);
    assert!(harness.store.mappings_for_connection(shopify.id).is_empty());
    assert!(harness
        .activity
        .event_types()
        .contains(&events::PRODUCT_PUSH_CREATED_SKIPPED.to_string()));
}

/// Update without a mapping is skipped with a warning, never an implicit
/// create.
#[tokio::test]
async fn push_update_skips_unmapped_connections() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;

    let (product, _variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;

    harness
        .coordinator
        .execute_product_update(harness.user_id, product.id)
        .await
        .unwrap();

    let adapter = harness.adapter(PlatformType::Shopify);
    assert_eq!(adapter.create_calls(), 0);
    assert!(adapter
        .calls()
        .iter()
        .all(|call| !matches!(call, common::RecordedCall::Update { .. })));
    assert!(harness
        .activity
        .event_types()
        .contains(&events::PRODUCT_PUSH_UPDATED_SKIPPED.to_string()));
}

/// S5: delete fan-out issues one platform call per connection, removes
/// every mapping row, and records a success entry per connection.
#[tokio::test]
async fn push_delete_cascades_mappings() {
    let harness = Harness::new(&[PlatformType::Shopify, PlatformType::Clover]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    let clover = harness
        .seed_connection(PlatformType::Clover, ConnectionStatus::Syncing, true)
        .await;

    let (product, _variants) = harness
        .seed_product("Doomed", &[Some("SKU-1"), Some("SKU-2")])
        .await;

    // Map on both platforms through the create path.
    harness
        .coordinator
        .execute_product_create(harness.user_id, product.id)
        .await
        .unwrap();
    assert_eq!(harness.store.mappings_for_connection(shopify.id).len(), 2);
    assert_eq!(harness.store.mappings_for_connection(clover.id).len(), 2);

    harness
        .coordinator
        .execute_product_delete(harness.user_id, product.id)
        .await
        .unwrap();

    // One delete call per connection, not per variant.
    assert_eq!(harness.adapter(PlatformType::Shopify).delete_calls().len(), 1);
    assert_eq!(harness.adapter(PlatformType::Clover).delete_calls().len(), 1);
    assert!(harness.store.mappings_for_connection(shopify.id).is_empty());
    assert!(harness.store.mappings_for_connection(clover.id).is_empty());

    let deleted_successes = harness
        .activity
        .event_types()
        .iter()
        .filter(|event| *event == events::PRODUCT_PUSH_DELETED_SUCCESS)
        .count();
    assert_eq!(deleted_successes, 2);
}

/// Inventory update for a variant with no mapping anywhere: no platform
/// calls, one warning per connection.
#[tokio::test]
async fn inventory_update_without_mappings_warns_per_connection() {
    let harness = Harness::new(&[PlatformType::Shopify, PlatformType::Square]);
    harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    harness
        .seed_connection(PlatformType::Square, ConnectionStatus::Syncing, true)
        .await;

    let (_product, variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;

    harness
        .coordinator
        .execute_inventory_update(harness.user_id, variants[0].id)
        .await
        .unwrap();

    assert!(harness
        .adapter(PlatformType::Shopify)
        .set_inventory_calls()
        .is_empty());
    assert!(harness
        .adapter(PlatformType::Square)
        .set_inventory_calls()
        .is_empty());

    let skips = harness
        .activity
        .event_types()
        .iter()
        .filter(|event| *event == events::INVENTORY_PUSH_SKIPPED)
        .count();
    assert_eq!(skips, 2);
}

/// S4: an inventory webhook updates one canonical level and fans the new
/// quantity out to other mapped connections — never back to the origin.
#[tokio::test]
async fn inventory_webhook_fans_out_with_origin_suppression() {
    let harness = Harness::new(&[PlatformType::Shopify, PlatformType::Clover]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    let clover = harness
        .seed_connection(PlatformType::Clover, ConnectionStatus::Syncing, true)
        .await;

    let (product, variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;
    let variant = &variants[0];

    // Variant mapped on both platforms (via the create path), with a level
    // on each connection.
    harness
        .coordinator
        .execute_product_create(harness.user_id, product.id)
        .await
        .unwrap();
    let shopify_platform_variant = harness.store.mappings_for_connection(shopify.id)[0]
        .platform_variant_id
        .clone()
        .unwrap();

    use channelsync_catalog::model::InventoryLevel;
    harness
        .store
        .upsert_inventory_levels(
            harness.user_id,
            vec![
                InventoryLevel::new(variant.id, shopify.id, Some("L1".into()), 9),
                InventoryLevel::new(variant.id, clover.id, None, 9),
            ],
        )
        .await
        .unwrap();

    let processor = WebhookProcessor::new(
        Arc::clone(&harness.context),
        Arc::clone(&harness.coordinator),
    );
    processor
        .process(
            shopify.id,
            harness.user_id,
            WebhookEvent::InventoryChanged {
                platform_variant_id: shopify_platform_variant,
                platform_location_id: Some("L1".into()),
                quantity: 4,
            },
        )
        .await
        .unwrap();

    // Canonical level updated to the webhook quantity.
    let levels = harness
        .store
        .get_levels_for_variant(harness.user_id, variant.id)
        .await
        .unwrap();
    let shopify_level = levels
        .iter()
        .find(|level| {
            level.platform_connection_id == shopify.id
                && level.platform_location_id.as_deref() == Some("L1")
        })
        .unwrap();
    assert_eq!(shopify_level.quantity, 4);

    // Clover received the new absolute quantity at its own location;
    // Shopify received no echo.
    let clover_sets = harness.adapter(PlatformType::Clover).set_inventory_calls();
    assert_eq!(clover_sets.len(), 1);
    assert_eq!(clover_sets[0].len(), 1);
    assert_eq!(clover_sets[0][0].quantity, 4);
    assert!(clover_sets[0][0].platform_location_id.is_none());
    assert!(harness
        .adapter(PlatformType::Shopify)
        .set_inventory_calls()
        .is_empty());
}

/// An update webhook whose payload equals the canonical state is a no-op
/// at the persistence layer and triggers no outbound calls.
#[tokio::test]
async fn identical_update_webhook_is_a_noop() {
    let harness = Harness::new(&[PlatformType::Shopify, PlatformType::Square]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    harness
        .seed_connection(PlatformType::Square, ConnectionStatus::Syncing, true)
        .await;

    // Seed canonical state through a created webhook so the origin mapping
    // and origin-key provenance exist.
    let incoming = platform_product("p1", "Widget", &[("v1", "SKU-1", &[])]);
    let processor = WebhookProcessor::new(
        Arc::clone(&harness.context),
        Arc::clone(&harness.coordinator),
    );
    processor
        .process(
            shopify.id,
            harness.user_id,
            WebhookEvent::ProductCreated {
                product: incoming.clone(),
            },
        )
        .await
        .unwrap();

    let square_creates_before = harness.adapter(PlatformType::Square).create_calls();

    // Identical payload again, as an update.
    processor
        .process(
            shopify.id,
            harness.user_id,
            WebhookEvent::ProductUpdated { product: incoming },
        )
        .await
        .unwrap();

    // No duplicate canonical rows, no further outbound calls.
    assert_eq!(harness.store.products_for_user(harness.user_id).len(), 1);
    assert_eq!(
        harness.adapter(PlatformType::Square).create_calls(),
        square_creates_before
    );
    let shopify_adapter = harness.adapter(PlatformType::Shopify);
    assert!(shopify_adapter
        .calls()
        .iter()
        .all(|call| !matches!(call, common::RecordedCall::Update { .. })));
}

/// Pushes are refused while a connection is mid-scan.
#[tokio::test]
async fn pushes_refused_while_scanning() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Scanning, true)
        .await;
    let (product, _variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;

    let err = harness
        .coordinator
        .queue_product_create(harness.user_id, product.id)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ConnectionBusy);
    assert!(harness.queue.jobs.lock().unwrap().is_empty());
}

/// Accepted pushes land on the push-operations queue.
#[tokio::test]
async fn queued_pushes_land_on_the_push_queue() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    let (product, _variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;

    harness
        .coordinator
        .queue_product_create(harness.user_id, product.id)
        .await
        .unwrap();

    let jobs = harness.queue.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].0, queues::PUSH_OPERATIONS);
    assert_eq!(jobs[0].1.job_type, "product-create");
}

/// S6: a webhook with a bad signature is rejected with 401 semantics and
/// nothing is enqueued.
#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;

    let ingestor = WebhookIngestor::new(
        Arc::clone(&harness.context),
        Arc::clone(&harness.queue) as Arc<dyn channelsync_core::jobs::JobQueue>,
        queues::webhook_processing_spec(&QueueOverrides::default()),
    );

    let mut headers = WebhookHeaders::new();
    headers.insert("x-mock-signature".to_string(), "forged".to_string());
    headers.insert("x-mock-shop".to_string(), "shopify.example.com".to_string());

    let outcome = ingestor
        .ingest(PlatformType::Shopify, b"{}", &headers)
        .await;

    assert_eq!(outcome, IngestOutcome::SignatureRejected);
    assert!(harness.queue.jobs.lock().unwrap().is_empty());
}

/// A valid webhook for a disabled connection is acknowledged and dropped.
#[tokio::test]
async fn webhook_for_disabled_connection_is_acknowledged_and_dropped() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, false)
        .await;

    let ingestor = WebhookIngestor::new(
        Arc::clone(&harness.context),
        Arc::clone(&harness.queue) as Arc<dyn channelsync_core::jobs::JobQueue>,
        queues::webhook_processing_spec(&QueueOverrides::default()),
    );

    let mut headers = WebhookHeaders::new();
    headers.insert("x-mock-signature".to_string(), "valid".to_string());
    headers.insert("x-mock-shop".to_string(), "shopify.example.com".to_string());

    let event = serde_json::to_vec(&WebhookEvent::ProductDeleted {
        platform_product_id: "p1".to_string(),
    })
    .unwrap();
    let outcome = ingestor
        .ingest(PlatformType::Shopify, &event, &headers)
        .await;

    assert_eq!(outcome, IngestOutcome::Disabled);
    assert!(harness.queue.jobs.lock().unwrap().is_empty());
}

/// A verified, routable webhook is accepted and enqueued asynchronously.
#[tokio::test]
async fn accepted_webhook_is_enqueued() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let connection = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;

    let ingestor = WebhookIngestor::new(
        Arc::clone(&harness.context),
        Arc::clone(&harness.queue) as Arc<dyn channelsync_core::jobs::JobQueue>,
        queues::webhook_processing_spec(&QueueOverrides::default()),
    );

    let mut headers = WebhookHeaders::new();
    headers.insert("x-mock-signature".to_string(), "valid".to_string());
    headers.insert("x-mock-shop".to_string(), "shopify.example.com".to_string());

    let event = serde_json::to_vec(&WebhookEvent::ProductDeleted {
        platform_product_id: "p1".to_string(),
    })
    .unwrap();
    let outcome = ingestor
        .ingest(PlatformType::Shopify, &event, &headers)
        .await;
    assert_eq!(outcome, IngestOutcome::Accepted);

    // The enqueue runs on a detached task; give it a moment.
    for _ in 0..50 {
        if !harness.queue.jobs.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let jobs = harness.queue.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].0, queues::WEBHOOK_PROCESSING);
    let payload: HashMap<String, serde_json::Value> =
        serde_json::from_value(jobs[0].1.data.clone()).unwrap();
    assert_eq!(
        payload["connection_id"],
        serde_json::json!(connection.id)
    );
}

/// Repeated webhooks for a SKU-less platform variant converge on one
/// canonical row: the origin mapping resolves the real variant id, so an
/// update edits in place instead of minting a duplicate.
#[tokio::test]
async fn sku_less_webhook_updates_converge_on_one_variant() {
    use channelsync_catalog::mapper::PlatformProductData;
    use rust_decimal::Decimal;

    fn sku_less_product(price: Decimal) -> PlatformProductData {
        let mut product = platform_product("p1", "Mystery Box", &[("v1", "ignored", &[])]);
        product.variants[0].sku = None;
        product.variants[0].price = price;
        product
    }

    let harness = Harness::new(&[PlatformType::Shopify]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;

    let processor = WebhookProcessor::new(
        Arc::clone(&harness.context),
        Arc::clone(&harness.coordinator),
    );
    processor
        .process(
            shopify.id,
            harness.user_id,
            WebhookEvent::ProductCreated {
                product: sku_less_product(Decimal::new(1000, 2)),
            },
        )
        .await
        .unwrap();

    let variants = harness
        .store
        .get_variants_for_user(harness.user_id)
        .await
        .unwrap();
    assert_eq!(variants.len(), 1);
    let variant_id = variants[0].id;
    assert_eq!(harness.store.mappings_for_connection(shopify.id).len(), 1);

    // A price change arrives for the same platform variant.
    processor
        .process(
            shopify.id,
            harness.user_id,
            WebhookEvent::ProductUpdated {
                product: sku_less_product(Decimal::new(1250, 2)),
            },
        )
        .await
        .unwrap();

    let variants = harness
        .store
        .get_variants_for_user(harness.user_id)
        .await
        .unwrap();
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].id, variant_id);
    assert_eq!(variants[0].price, Decimal::new(1250, 2));
    assert_eq!(harness.store.products_for_user(harness.user_id).len(), 1);

    let mappings = harness.store.mappings_for_connection(shopify.id);
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].product_variant_id, variant_id);
}

/// Round-trip law: fields that enter through a scan come back out of the
/// push input builder unchanged — SKU, barcode, price, options and the
/// per-location quantities.
#[tokio::test]
async fn scanned_fields_survive_to_the_push_input() {
    use channelsync_catalog::mapper::platform::{build_platform_input, PushMode};
    use channelsync_catalog::mapper::{PlatformInventoryData, PlatformProductData, PlatformVariantData};
    use rust_decimal::Decimal;

    let harness = Harness::new(&[PlatformType::Shopify]);
    let connection = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Connecting, true)
        .await;

    let mut options = HashMap::new();
    options.insert("Size".to_string(), "M".to_string());

    harness.adapter(PlatformType::Shopify).set_catalog(
        vec![PlatformProductData {
            platform_product_id: "p1".to_string(),
            title: "Field Jacket".to_string(),
            description: Some("Waxed cotton".to_string()),
            image_urls: vec!["https://img/jacket.png".to_string()],
            is_archived: false,
            variants: vec![PlatformVariantData {
                platform_variant_id: "v1".to_string(),
                sku: Some("JKT-M".to_string()),
                barcode: Some("0700000001".to_string()),
                title: "Field Jacket".to_string(),
                description: None,
                price: Decimal::new(18950, 2),
                compare_at_price: Some(Decimal::new(21000, 2)),
                cost: None,
                weight: Some(Decimal::new(1200, 3)),
                weight_unit: Some("kg".to_string()),
                options,
                is_taxable: true,
                tax_code: None,
                requires_shipping: true,
                image_url: None,
                inventory: vec![PlatformInventoryData {
                    platform_location_id: Some("L1".to_string()),
                    quantity: 5,
                }],
                updated_at: None,
            }],
            variants_count: Some(1),
        }],
        vec![location("L1", "Main", true)],
    );

    InitialScanProcessor::new(Arc::clone(&harness.context))
        .run(connection.id, harness.user_id, &job_context())
        .await
        .unwrap();

    let product = harness.store.products_for_user(harness.user_id).remove(0);
    let variants = harness
        .store
        .get_variants_for_product(harness.user_id, product.id)
        .await
        .unwrap();
    let levels = harness
        .store
        .get_levels_for_variant(harness.user_id, variants[0].id)
        .await
        .unwrap();

    let outcome = build_platform_input(
        &product,
        &variants,
        &levels,
        &[Some("L1".to_string())],
        &PushMode::Create,
    );
    let input = outcome.input.unwrap();

    assert_eq!(input.title, "Field Jacket");
    assert_eq!(input.description.as_deref(), Some("Waxed cotton"));
    let variant = &input.variants[0];
    assert_eq!(variant.sku.as_deref(), Some("JKT-M"));
    assert_eq!(variant.barcode.as_deref(), Some("0700000001"));
    assert_eq!(variant.price, Decimal::new(18950, 2));
    assert_eq!(variant.compare_at_price, Some(Decimal::new(21000, 2)));
    assert_eq!(variant.weight, Some(Decimal::new(1200, 3)));
    assert_eq!(variant.weight_unit.as_deref(), Some("kg"));
    assert_eq!(variant.options.get("Size").map(String::as_str), Some("M"));
    assert_eq!(variant.quantities.len(), 1);
    assert_eq!(variant.quantities[0].quantity, 5);
}

/// A disabled connection is invisible to the push fan-out.
#[tokio::test]
async fn disabled_connections_are_skipped_by_pushes() {
    let harness = Harness::new(&[PlatformType::Shopify]);
    let shopify = harness
        .seed_connection(PlatformType::Shopify, ConnectionStatus::Syncing, true)
        .await;
    let (product, _variants) = harness.seed_product("Widget", &[Some("SKU-1")]).await;

    harness.store.set_connection_enabled(shopify.id, false);

    harness
        .coordinator
        .execute_product_create(harness.user_id, product.id)
        .await
        .unwrap();

    assert_eq!(harness.adapter(PlatformType::Shopify).create_calls(), 0);
    assert!(harness.store.mappings_for_connection(shopify.id).is_empty());
}
