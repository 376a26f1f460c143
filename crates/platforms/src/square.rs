//! Square adapter over the Catalog, Inventory and Locations APIs.
//!
//! Catalog objects arrive as ITEM objects with nested ITEM_VARIATION
//! children; inventory counts are retrieved in batches per variation id.
//! Creates use Square's client-object-id mechanism, whose `id_mappings`
//! response gives the canonical → platform variant pairing directly.

use crate::adapter::PlatformAdapter;
use crate::http;
use crate::types::{
    CreateProductResult, FetchAllResult, InventoryUpdate, PlatformCredentials, WebhookEvent,
    WebhookHeaders,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use channelsync_catalog::mapper::{
    PlatformInventoryData, PlatformLocationData, PlatformProductData, PlatformProductInput,
    PlatformVariantData,
};
use channelsync_catalog::model::{PlatformConnection, PlatformType};
use channelsync_catalog::store::ConnectionLocator;
use channelsync_core::config::PlatformEndpointConfig;
use channelsync_core::{Error, ErrorCode, Result};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";
const INVENTORY_BATCH: usize = 100;

pub struct SquareAdapter {
    config: PlatformEndpointConfig,
    client: reqwest::Client,
}

// === Wire shapes ===

#[derive(Debug, Deserialize)]
struct CatalogListEnvelope {
    #[serde(default)]
    objects: Vec<CatalogObject>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogObject {
    id: String,
    #[serde(rename = "type")]
    object_type: String,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    item_data: Option<ItemData>,
    #[serde(default)]
    item_variation_data: Option<ItemVariationData>,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemData {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    variations: Vec<CatalogObject>,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemVariationData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    upc: Option<String>,
    #[serde(default)]
    price_money: Option<Money>,
}

#[derive(Debug, Clone, Deserialize)]
struct Money {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct InventoryCountsEnvelope {
    #[serde(default)]
    counts: Vec<InventoryCount>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InventoryCount {
    catalog_object_id: String,
    #[serde(default)]
    location_id: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationsEnvelope {
    #[serde(default)]
    locations: Vec<SquareLocation>,
}

#[derive(Debug, Clone, Deserialize)]
struct SquareLocation {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UpsertEnvelope {
    catalog_object: CatalogObject,
    #[serde(default)]
    id_mappings: Vec<IdMapping>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdMapping {
    client_object_id: String,
    object_id: String,
}

#[derive(Debug, Deserialize)]
struct SquareWebhookPayload {
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl SquareAdapter {
    pub fn new(config: PlatformEndpointConfig) -> Result<Self> {
        let client = http::build_client(config.request_timeout_secs)?;
        Ok(Self { config, client })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        credentials: &PlatformCredentials,
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(http::transport_error)?;
        let response = http::check_response(response).await?;
        response.json::<T>().await.map_err(http::transport_error)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        credentials: &PlatformCredentials,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&credentials.access_token)
            .json(body)
            .send()
            .await
            .map_err(http::transport_error)?;
        let response = http::check_response(response).await?;
        response.json::<T>().await.map_err(http::transport_error)
    }

    /// Batch-retrieve inventory counts for a set of variation ids.
    async fn fetch_counts(
        &self,
        credentials: &PlatformCredentials,
        variation_ids: &[String],
    ) -> Result<HashMap<String, Vec<PlatformInventoryData>>> {
        let mut by_variation: HashMap<String, Vec<PlatformInventoryData>> = HashMap::new();

        for chunk in variation_ids.chunks(INVENTORY_BATCH) {
            let mut cursor: Option<String> = None;
            loop {
                let mut body = serde_json::json!({ "catalog_object_ids": chunk });
                if let Some(cursor_value) = &cursor {
                    body["cursor"] = serde_json::json!(cursor_value);
                }

                let envelope: InventoryCountsEnvelope = self
                    .post_json(
                        &format!(
                            "{}/v2/inventory/counts/batch-retrieve",
                            self.config.api_base_url
                        ),
                        credentials,
                        &body,
                    )
                    .await?;

                for count in envelope.counts {
                    let quantity = count
                        .quantity
                        .as_deref()
                        .and_then(|q| q.parse::<i64>().ok())
                        .unwrap_or(0);
                    by_variation
                        .entry(count.catalog_object_id)
                        .or_default()
                        .push(PlatformInventoryData {
                            platform_location_id: count.location_id,
                            quantity,
                        });
                }

                cursor = envelope.cursor;
                if cursor.is_none() {
                    break;
                }
            }
        }

        Ok(by_variation)
    }

    /// ITEM object → neutral shape. Square keeps its own variation names as
    /// the canonical variant title.
    fn to_platform_product(
        object: CatalogObject,
        inventory: &HashMap<String, Vec<PlatformInventoryData>>,
    ) -> Option<PlatformProductData> {
        let item = object.item_data?;
        let updated_at = object.updated_at;

        let variants: Vec<PlatformVariantData> = item
            .variations
            .into_iter()
            .filter_map(|variation| {
                let data = variation.item_variation_data?;
                Some(PlatformVariantData {
                    platform_variant_id: variation.id.clone(),
                    sku: data.sku.filter(|sku| !sku.is_empty()),
                    barcode: data.upc.filter(|upc| !upc.is_empty()),
                    title: data.name.unwrap_or_else(|| item.name.clone()),
                    description: None,
                    price: data
                        .price_money
                        .map(|money| Decimal::new(money.amount, 2))
                        .unwrap_or_default(),
                    compare_at_price: None,
                    cost: None,
                    weight: None,
                    weight_unit: None,
                    options: HashMap::new(),
                    is_taxable: true,
                    tax_code: None,
                    requires_shipping: true,
                    image_url: None,
                    inventory: inventory.get(&variation.id).cloned().unwrap_or_default(),
                    updated_at: variation.updated_at.or(updated_at),
                })
            })
            .collect();

        let variants_count = variants.len() as u64;
        Some(PlatformProductData {
            platform_product_id: object.id,
            title: item.name,
            description: item.description,
            image_urls: item.image_urls,
            is_archived: object.is_deleted,
            variants,
            variants_count: Some(variants_count),
        })
    }

    /// Neutral input → catalog upsert payload with client object ids.
    ///
    /// Client ids are the canonical variant ids, so the response's
    /// `id_mappings` pair the two sides without any SKU matching.
    fn to_upsert_payload(
        input: &PlatformProductInput,
        platform_product_id: Option<&str>,
    ) -> serde_json::Value {
        let variations: Vec<serde_json::Value> = input
            .variants
            .iter()
            .map(|variant| {
                let id = variant
                    .platform_variant_id
                    .clone()
                    .unwrap_or_else(|| format!("#{}", variant.canonical_variant_id));
                serde_json::json!({
                    "type": "ITEM_VARIATION",
                    "id": id,
                    "item_variation_data": {
                        "name": variant.title,
                        "sku": variant.sku,
                        "upc": variant.barcode,
                        "pricing_type": "FIXED_PRICING",
                        "price_money": {
                            "amount": (variant.price * Decimal::new(100, 0)).trunc().to_i64().unwrap_or(0),
                            "currency": "USD"
                        }
                    }
                })
            })
            .collect();

        serde_json::json!({
            "idempotency_key": Uuid::new_v4().to_string(),
            "object": {
                "type": "ITEM",
                "id": platform_product_id.map(str::to_string).unwrap_or_else(|| "#product".to_string()),
                "item_data": {
                    "name": input.title,
                    "description": input.description,
                    "variations": variations
                }
            }
        })
    }
}

#[async_trait]
impl PlatformAdapter for SquareAdapter {
    fn platform_type(&self) -> PlatformType {
        PlatformType::Square
    }

    async fn fetch_all(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<FetchAllResult> {
        let locations = self.list_locations(connection, credentials).await?;

        let mut products = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut url = format!("{}/v2/catalog/list?types=ITEM", self.config.api_base_url);
            if let Some(cursor_value) = &cursor {
                url.push_str(&format!("&cursor={}", cursor_value));
            }

            let envelope: CatalogListEnvelope = self.get_json(&url, credentials).await?;

            for object in envelope.objects {
                if object.object_type != "ITEM" || object.is_deleted {
                    continue;
                }

                let variation_ids: Vec<String> = object
                    .item_data
                    .as_ref()
                    .map(|item| item.variations.iter().map(|v| v.id.clone()).collect())
                    .unwrap_or_default();
                let counts = self.fetch_counts(credentials, &variation_ids).await?;

                if let Some(product) = Self::to_platform_product(object, &counts) {
                    products.push(product);
                }
            }

            cursor = envelope.cursor;
            if cursor.is_none() {
                break;
            }
        }

        debug!(products = products.len(), "square fetch_all complete");
        Ok(FetchAllResult {
            products,
            locations,
        })
    }

    async fn fetch_by_ids(
        &self,
        _connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        ids: &[String],
    ) -> Result<Vec<PlatformProductData>> {
        if ids.len() > 250 {
            return Err(Error::new(
                ErrorCode::InvalidInput,
                "fetch_by_ids is bounded to 250 ids per call",
            ));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({ "object_ids": ids, "include_related_objects": false });
        #[derive(Debug, Deserialize)]
        struct BatchEnvelope {
            #[serde(default)]
            objects: Vec<CatalogObject>,
        }

        let envelope: BatchEnvelope = self
            .post_json(
                &format!("{}/v2/catalog/batch-retrieve", self.config.api_base_url),
                credentials,
                &body,
            )
            .await?;

        let mut products = Vec::new();
        for object in envelope.objects {
            let variation_ids: Vec<String> = object
                .item_data
                .as_ref()
                .map(|item| item.variations.iter().map(|v| v.id.clone()).collect())
                .unwrap_or_default();
            let counts = self.fetch_counts(credentials, &variation_ids).await?;
            if let Some(product) = Self::to_platform_product(object, &counts) {
                products.push(product);
            }
        }

        Ok(products)
    }

    async fn create_product(
        &self,
        _connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        input: &PlatformProductInput,
    ) -> Result<CreateProductResult> {
        let payload = Self::to_upsert_payload(input, None);
        let envelope: UpsertEnvelope = self
            .post_json(
                &format!("{}/v2/catalog/object", self.config.api_base_url),
                credentials,
                &payload,
            )
            .await?;

        let mut variant_ids = HashMap::new();
        for mapping in &envelope.id_mappings {
            let Some(client_id) = mapping.client_object_id.strip_prefix('#') else {
                continue;
            };
            if let Ok(canonical_id) = client_id.parse::<Uuid>() {
                variant_ids.insert(canonical_id, mapping.object_id.clone());
            }
        }

        // Seed absolute quantities for every requested location.
        let mut changes = Vec::new();
        for variant in &input.variants {
            let Some(platform_variant_id) = variant_ids.get(&variant.canonical_variant_id) else {
                continue;
            };
            for quantity in &variant.quantities {
                let Some(location_id) = &quantity.platform_location_id else {
                    continue;
                };
                changes.push(serde_json::json!({
                    "type": "PHYSICAL_COUNT",
                    "physical_count": {
                        "catalog_object_id": platform_variant_id,
                        "location_id": location_id,
                        "state": "IN_STOCK",
                        "quantity": quantity.quantity.to_string(),
                        "occurred_at": chrono::Utc::now().to_rfc3339(),
                    }
                }));
            }
        }
        if !changes.is_empty() {
            let body = serde_json::json!({
                "idempotency_key": Uuid::new_v4().to_string(),
                "changes": changes,
            });
            let _: serde_json::Value = self
                .post_json(
                    &format!("{}/v2/inventory/changes/batch-create", self.config.api_base_url),
                    credentials,
                    &body,
                )
                .await?;
        }

        Ok(CreateProductResult {
            platform_product_id: envelope.catalog_object.id,
            variant_ids,
        })
    }

    async fn update_product(
        &self,
        _connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        platform_product_id: &str,
        input: &PlatformProductInput,
    ) -> Result<()> {
        let payload = Self::to_upsert_payload(input, Some(platform_product_id));
        let _: UpsertEnvelope = self
            .post_json(
                &format!("{}/v2/catalog/object", self.config.api_base_url),
                credentials,
                &payload,
            )
            .await?;
        Ok(())
    }

    async fn delete_product(
        &self,
        _connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        platform_product_id: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/v2/catalog/object/{}",
            self.config.api_base_url, platform_product_id
        );
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(http::transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(platform_product_id, "object already absent on square");
            return Ok(());
        }

        http::check_response(response).await?;
        Ok(())
    }

    async fn set_inventory(
        &self,
        _connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        updates: &[InventoryUpdate],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let changes: Vec<serde_json::Value> = updates
            .iter()
            .filter_map(|update| {
                let location_id = update.platform_location_id.as_ref()?;
                Some(serde_json::json!({
                    "type": "PHYSICAL_COUNT",
                    "physical_count": {
                        "catalog_object_id": update.platform_variant_id,
                        "location_id": location_id,
                        "state": "IN_STOCK",
                        "quantity": update.quantity.to_string(),
                        "occurred_at": chrono::Utc::now().to_rfc3339(),
                    }
                }))
            })
            .collect();

        if changes.is_empty() {
            return Ok(());
        }

        let body = serde_json::json!({
            "idempotency_key": Uuid::new_v4().to_string(),
            "changes": changes,
        });
        let _: serde_json::Value = self
            .post_json(
                &format!("{}/v2/inventory/changes/batch-create", self.config.api_base_url),
                credentials,
                &body,
            )
            .await?;

        Ok(())
    }

    async fn list_locations(
        &self,
        _connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<Vec<PlatformLocationData>> {
        let envelope: LocationsEnvelope = self
            .get_json(
                &format!("{}/v2/locations", self.config.api_base_url),
                credentials,
            )
            .await?;

        Ok(envelope
            .locations
            .into_iter()
            .enumerate()
            .map(|(index, location)| PlatformLocationData {
                platform_location_id: location.id,
                name: location.name,
                is_default: index == 0,
            })
            .collect())
    }

    fn verify_webhook(&self, raw_body: &[u8], headers: &WebhookHeaders) -> Result<()> {
        let signature = headers.get(SIGNATURE_HEADER).ok_or_else(|| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "missing square signature header",
            )
        })?;

        let expected = BASE64.decode(signature.as_bytes()).map_err(|_| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "square signature header is not valid base64",
            )
        })?;

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|e| Error::new(ErrorCode::ConfigurationError, e.to_string()))?;
        mac.update(raw_body);
        mac.verify_slice(&expected).map_err(|_| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "square webhook signature mismatch",
            )
        })
    }

    fn parse_webhook(&self, raw_body: &[u8], _headers: &WebhookHeaders) -> Result<WebhookEvent> {
        let payload: SquareWebhookPayload = serde_json::from_slice(raw_body)?;

        match payload.event_type.as_str() {
            "catalog.object.created" | "catalog.object.updated" => {
                let object: CatalogObject =
                    serde_json::from_value(payload.data["object"].clone())?;
                let product = Self::to_platform_product(object, &HashMap::new()).ok_or_else(
                    || Error::new(ErrorCode::InvalidInput, "webhook object is not an ITEM"),
                )?;
                if payload.event_type == "catalog.object.created" {
                    Ok(WebhookEvent::ProductCreated { product })
                } else {
                    Ok(WebhookEvent::ProductUpdated { product })
                }
            }
            "catalog.object.deleted" => {
                let id = payload.data["object_id"].as_str().ok_or_else(|| {
                    Error::new(ErrorCode::InvalidInput, "delete webhook without object id")
                })?;
                Ok(WebhookEvent::ProductDeleted {
                    platform_product_id: id.to_string(),
                })
            }
            "inventory.count.updated" => {
                let count: InventoryCount =
                    serde_json::from_value(payload.data["object"].clone())?;
                Ok(WebhookEvent::InventoryChanged {
                    platform_variant_id: count.catalog_object_id,
                    platform_location_id: count.location_id,
                    quantity: count
                        .quantity
                        .as_deref()
                        .and_then(|q| q.parse::<i64>().ok())
                        .unwrap_or(0)
                        .max(0),
                })
            }
            other => Err(Error::new(
                ErrorCode::InvalidInput,
                format!("unsupported square webhook type: {}", other),
            )),
        }
    }

    fn connection_locator(
        &self,
        raw_body: &[u8],
        _headers: &WebhookHeaders,
    ) -> Result<(ConnectionLocator, String)> {
        let payload: SquareWebhookPayload = serde_json::from_slice(raw_body)?;
        let merchant_id = payload.merchant_id.ok_or_else(|| {
            Error::new(ErrorCode::InvalidInput, "square webhook without merchant id")
        })?;
        Ok((ConnectionLocator::MerchantId, merchant_id))
    }
}
