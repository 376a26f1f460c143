//! Shopify adapter over the REST Admin API.
//!
//! Uses `since_id` pagination for products and variants, drains nested
//! variant pages before yielding a product, and attaches inventory levels
//! fetched per inventory item. Webhooks are verified with the
//! HMAC-SHA256/base64 scheme Shopify signs with.

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
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const PAGE_LIMIT: usize = 250;
const INVENTORY_ITEM_BATCH: usize = 50;

const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
const TOPIC_HEADER: &str = "x-shopify-topic";
const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

pub struct ShopifyAdapter {
    config: PlatformEndpointConfig,
    client: reqwest::Client,
}

// === Wire shapes ===

#[derive(Debug, Deserialize)]
struct ProductsEnvelope {
    products: Vec<ShopifyProduct>,
}

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    product: ShopifyProduct,
}

#[derive(Debug, Deserialize)]
struct VariantsEnvelope {
    variants: Vec<ShopifyVariant>,
}

#[derive(Debug, Deserialize)]
struct VariantEnvelope {
    variant: ShopifyVariant,
}

#[derive(Debug, Deserialize)]
struct LocationsEnvelope {
    locations: Vec<ShopifyLocation>,
}

#[derive(Debug, Deserialize)]
struct InventoryLevelsEnvelope {
    inventory_levels: Vec<ShopifyInventoryLevel>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShopifyProduct {
    id: i64,
    title: String,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    images: Vec<ShopifyImage>,
    #[serde(default)]
    options: Vec<ShopifyOption>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShopifyImage {
    #[serde(default)]
    src: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShopifyOption {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ShopifyVariant {
    id: i64,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    barcode: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    compare_at_price: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    weight_unit: Option<String>,
    #[serde(default)]
    option1: Option<String>,
    #[serde(default)]
    option2: Option<String>,
    #[serde(default)]
    option3: Option<String>,
    #[serde(default = "default_true")]
    taxable: bool,
    #[serde(default = "default_true")]
    requires_shipping: bool,
    #[serde(default)]
    inventory_item_id: Option<i64>,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct ShopifyLocation {
    id: i64,
    name: String,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ShopifyInventoryLevel {
    inventory_item_id: i64,
    location_id: i64,
    #[serde(default)]
    available: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InventoryWebhookPayload {
    #[serde(default)]
    variant_id: Option<i64>,
    #[serde(default)]
    inventory_item_id: Option<i64>,
    #[serde(default)]
    location_id: Option<i64>,
    #[serde(default)]
    available: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ProductWriteEnvelope {
    product: serde_json::Value,
}

impl ShopifyAdapter {
    pub fn new(config: PlatformEndpointConfig) -> Result<Self> {
        let client = http::build_client(config.request_timeout_secs)?;
        Ok(Self { config, client })
    }

    fn base_url(&self, connection: &PlatformConnection) -> Result<String> {
        let shop = connection.shop_domain().ok_or_else(|| {
            Error::new(
                ErrorCode::InvalidInput,
                "shopify connection has no shop domain recorded",
            )
        })?;
        Ok(self.config.api_base_url.replace("{shop}", shop))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        credentials: &PlatformCredentials,
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("X-Shopify-Access-Token", &credentials.access_token)
            .send()
            .await
            .map_err(http::transport_error)?;

        let response = http::check_response(response).await?;
        response.json::<T>().await.map_err(http::transport_error)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        credentials: &PlatformCredentials,
        body: &impl Serialize,
    ) -> Result<T> {
        let response = self
            .client
            .request(method, url)
            .header("X-Shopify-Access-Token", &credentials.access_token)
            .json(body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let response = http::check_response(response).await?;
        response.json::<T>().await.map_err(http::transport_error)
    }

    /// Drain remaining variant pages for a product whose inline page was
    /// full.
    async fn hydrate_variants(
        &self,
        base_url: &str,
        credentials: &PlatformCredentials,
        product: &mut ShopifyProduct,
    ) -> Result<()> {
        if product.variants.len() < PAGE_LIMIT {
            return Ok(());
        }

        let mut since_id = product.variants.last().map(|v| v.id).unwrap_or(0);
        loop {
            let url = format!(
                "{}/products/{}/variants.json?limit={}&since_id={}",
                base_url, product.id, PAGE_LIMIT, since_id
            );
            let page: VariantsEnvelope = self.get_json(&url, credentials).await?;
            let page_len = page.variants.len();
            if let Some(last) = page.variants.last() {
                since_id = last.id;
            }
            product.variants.extend(page.variants);
            if page_len < PAGE_LIMIT {
                break;
            }
        }

        debug!(
            product_id = product.id,
            variants = product.variants.len(),
            "hydrated variant pages"
        );
        Ok(())
    }

    /// Inventory levels for a set of inventory items, keyed by item id.
    async fn fetch_inventory_levels(
        &self,
        base_url: &str,
        credentials: &PlatformCredentials,
        item_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<PlatformInventoryData>>> {
        let mut by_item: HashMap<i64, Vec<PlatformInventoryData>> = HashMap::new();

        for chunk in item_ids.chunks(INVENTORY_ITEM_BATCH) {
            let ids = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let url = format!(
                "{}/inventory_levels.json?inventory_item_ids={}&limit={}",
                base_url, ids, PAGE_LIMIT
            );
            let envelope: InventoryLevelsEnvelope = self.get_json(&url, credentials).await?;
            for level in envelope.inventory_levels {
                by_item
                    .entry(level.inventory_item_id)
                    .or_default()
                    .push(PlatformInventoryData {
                        platform_location_id: Some(level.location_id.to_string()),
                        quantity: level.available.unwrap_or(0),
                    });
            }
        }

        Ok(by_item)
    }

    /// Shopify → neutral shape. The canonical variant title carries the
    /// product title on this platform.
    fn to_platform_product(
        product: ShopifyProduct,
        inventory: &HashMap<i64, Vec<PlatformInventoryData>>,
    ) -> PlatformProductData {
        let option_names: Vec<String> = product.options.iter().map(|o| o.name.clone()).collect();
        let product_title = product.title.clone();
        let variants_count = product.variants.len() as u64;

        let variants = product
            .variants
            .into_iter()
            .map(|variant| {
                let mut options = HashMap::new();
                for (index, value) in [&variant.option1, &variant.option2, &variant.option3]
                    .into_iter()
                    .enumerate()
                {
                    if let (Some(name), Some(value)) = (option_names.get(index), value) {
                        options.insert(name.clone(), value.clone());
                    }
                }

                let inventory_levels = variant
                    .inventory_item_id
                    .and_then(|item_id| inventory.get(&item_id).cloned())
                    .unwrap_or_default();

                PlatformVariantData {
                    platform_variant_id: variant.id.to_string(),
                    sku: variant.sku.filter(|sku| !sku.is_empty()),
                    barcode: variant.barcode.filter(|barcode| !barcode.is_empty()),
                    title: product_title.clone(),
                    description: None,
                    price: variant
                        .price
                        .as_deref()
                        .and_then(|p| Decimal::from_str(p).ok())
                        .unwrap_or_default(),
                    compare_at_price: variant
                        .compare_at_price
                        .as_deref()
                        .and_then(|p| Decimal::from_str(p).ok()),
                    cost: None,
                    weight: variant
                        .weight
                        .and_then(|w| Decimal::try_from(w).ok()),
                    weight_unit: variant.weight_unit,
                    options,
                    is_taxable: variant.taxable,
                    tax_code: None,
                    requires_shipping: variant.requires_shipping,
                    image_url: None,
                    inventory: inventory_levels,
                    updated_at: variant.updated_at,
                }
            })
            .collect();

        PlatformProductData {
            platform_product_id: product.id.to_string(),
            title: product.title,
            description: product.body_html,
            image_urls: product.images.into_iter().filter_map(|i| i.src).collect(),
            is_archived: product.status.as_deref() == Some("archived"),
            variants,
            variants_count: Some(variants_count),
        }
    }

    /// Neutral input → Shopify product write payload.
    fn to_write_payload(input: &PlatformProductInput, product_id: Option<&str>) -> ProductWriteEnvelope {
        let mut option_names: Vec<String> = Vec::new();
        for variant in &input.variants {
            for name in variant.options.keys() {
                if !option_names.contains(name) {
                    option_names.push(name.clone());
                }
            }
        }

        let variants: Vec<serde_json::Value> = input
            .variants
            .iter()
            .map(|variant| {
                let mut value = serde_json::json!({
                    "sku": variant.sku,
                    "barcode": variant.barcode,
                    "price": variant.price.to_string(),
                    "taxable": variant.is_taxable,
                    "requires_shipping": variant.requires_shipping,
                });
                if let Some(compare_at) = variant.compare_at_price {
                    value["compare_at_price"] = serde_json::json!(compare_at.to_string());
                }
                if let Some(weight) = variant.weight {
                    value["weight"] = serde_json::json!(weight.to_string());
                    value["weight_unit"] = serde_json::json!(variant.weight_unit);
                }
                if let Some(platform_variant_id) = &variant.platform_variant_id {
                    if let Ok(id) = platform_variant_id.parse::<i64>() {
                        value["id"] = serde_json::json!(id);
                    }
                }
                for (index, name) in option_names.iter().enumerate() {
                    if let Some(option_value) = variant.options.get(name) {
                        value[format!("option{}", index + 1)] = serde_json::json!(option_value);
                    }
                }
                value
            })
            .collect();

        let mut product = serde_json::json!({
            "title": input.title,
            "body_html": input.description,
            "variants": variants,
            "options": option_names
                .iter()
                .map(|name| serde_json::json!({"name": name}))
                .collect::<Vec<_>>(),
            "images": input
                .image_urls
                .iter()
                .map(|src| serde_json::json!({"src": src}))
                .collect::<Vec<_>>(),
        });
        if let Some(id) = product_id.and_then(|id| id.parse::<i64>().ok()) {
            product["id"] = serde_json::json!(id);
        }

        ProductWriteEnvelope { product }
    }

    /// Pair created platform variants back to canonical ids, by SKU first,
    /// then by position.
    fn pair_variant_ids(
        input: &PlatformProductInput,
        created: &[ShopifyVariant],
    ) -> HashMap<Uuid, String> {
        let mut pairs = HashMap::new();

        for (index, requested) in input.variants.iter().enumerate() {
            let by_sku = requested.sku.as_deref().and_then(|sku| {
                created.iter().find(|candidate| {
                    candidate
                        .sku
                        .as_deref()
                        .map(|s| s.eq_ignore_ascii_case(sku))
                        .unwrap_or(false)
                })
            });

            let matched = by_sku.or_else(|| created.get(index));
            if let Some(platform_variant) = matched {
                pairs.insert(
                    requested.canonical_variant_id,
                    platform_variant.id.to_string(),
                );
            }
        }

        pairs
    }

    async fn set_one_level(
        &self,
        base_url: &str,
        credentials: &PlatformCredentials,
        inventory_item_id: i64,
        location_id: i64,
        quantity: i64,
    ) -> Result<()> {
        let url = format!("{}/inventory_levels/set.json", base_url);
        let body = serde_json::json!({
            "location_id": location_id,
            "inventory_item_id": inventory_item_id,
            "available": quantity,
        });
        let _: serde_json::Value = self
            .send_json(reqwest::Method::POST, &url, credentials, &body)
            .await?;
        Ok(())
    }

    async fn default_location_id(
        &self,
        base_url: &str,
        credentials: &PlatformCredentials,
    ) -> Result<i64> {
        let envelope: LocationsEnvelope = self
            .get_json(&format!("{}/locations.json", base_url), credentials)
            .await?;
        envelope
            .locations
            .iter()
            .find(|l| l.primary)
            .or_else(|| envelope.locations.first())
            .map(|l| l.id)
            .ok_or_else(|| {
                Error::new(ErrorCode::PlatformRejectedInput, "shop has no locations")
            })
    }
}

#[async_trait]
impl PlatformAdapter for ShopifyAdapter {
    fn platform_type(&self) -> PlatformType {
        PlatformType::Shopify
    }

    async fn fetch_all(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<FetchAllResult> {
        let base_url = self.base_url(connection)?;

        let locations = self.list_locations(connection, credentials).await?;

        let mut products = Vec::new();
        let mut since_id = 0_i64;
        loop {
            let url = format!(
                "{}/products.json?limit={}&since_id={}",
                base_url, PAGE_LIMIT, since_id
            );
            let page: ProductsEnvelope = self.get_json(&url, credentials).await?;
            let page_len = page.products.len();

            for mut product in page.products {
                since_id = since_id.max(product.id);
                self.hydrate_variants(&base_url, credentials, &mut product)
                    .await?;

                let item_ids: Vec<i64> = product
                    .variants
                    .iter()
                    .filter_map(|v| v.inventory_item_id)
                    .collect();
                let inventory = self
                    .fetch_inventory_levels(&base_url, credentials, &item_ids)
                    .await?;

                products.push(Self::to_platform_product(product, &inventory));
            }

            if page_len < PAGE_LIMIT {
                break;
            }
        }

        debug!(
            products = products.len(),
            locations = locations.len(),
            "shopify fetch_all complete"
        );
        Ok(FetchAllResult {
            products,
            locations,
        })
    }

    async fn fetch_by_ids(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        ids: &[String],
    ) -> Result<Vec<PlatformProductData>> {
        if ids.len() > PAGE_LIMIT {
            return Err(Error::new(
                ErrorCode::InvalidInput,
                format!("fetch_by_ids is bounded to {} ids per call", PAGE_LIMIT),
            ));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let base_url = self.base_url(connection)?;
        let url = format!(
            "{}/products.json?ids={}&limit={}",
            base_url,
            ids.join(","),
            PAGE_LIMIT
        );
        let page: ProductsEnvelope = self.get_json(&url, credentials).await?;

        let mut products = Vec::new();
        for mut product in page.products {
            self.hydrate_variants(&base_url, credentials, &mut product)
                .await?;
            let item_ids: Vec<i64> = product
                .variants
                .iter()
                .filter_map(|v| v.inventory_item_id)
                .collect();
            let inventory = self
                .fetch_inventory_levels(&base_url, credentials, &item_ids)
                .await?;
            products.push(Self::to_platform_product(product, &inventory));
        }

        Ok(products)
    }

    async fn create_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        input: &PlatformProductInput,
    ) -> Result<CreateProductResult> {
        let base_url = self.base_url(connection)?;
        let payload = Self::to_write_payload(input, None);

        let envelope: ProductEnvelope = self
            .send_json(
                reqwest::Method::POST,
                &format!("{}/products.json", base_url),
                credentials,
                &payload,
            )
            .await?;

        let variant_ids = Self::pair_variant_ids(input, &envelope.product.variants);

        // Set absolute quantities for every requested location.
        for requested in &input.variants {
            let Some(platform_variant_id) = variant_ids.get(&requested.canonical_variant_id)
            else {
                continue;
            };
            let created = envelope
                .product
                .variants
                .iter()
                .find(|v| v.id.to_string() == *platform_variant_id);
            let Some(item_id) = created.and_then(|v| v.inventory_item_id) else {
                warn!(
                    platform_variant_id = %platform_variant_id,
                    "created variant has no inventory item id; skipping quantities"
                );
                continue;
            };

            for quantity in &requested.quantities {
                let Some(location) = &quantity.platform_location_id else {
                    continue;
                };
                let Ok(location_id) = location.parse::<i64>() else {
                    continue;
                };
                self.set_one_level(&base_url, credentials, item_id, location_id, quantity.quantity)
                    .await?;
            }
        }

        Ok(CreateProductResult {
            platform_product_id: envelope.product.id.to_string(),
            variant_ids,
        })
    }

    async fn update_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        platform_product_id: &str,
        input: &PlatformProductInput,
    ) -> Result<()> {
        let base_url = self.base_url(connection)?;
        let payload = Self::to_write_payload(input, Some(platform_product_id));

        let _: ProductEnvelope = self
            .send_json(
                reqwest::Method::PUT,
                &format!("{}/products/{}.json", base_url, platform_product_id),
                credentials,
                &payload,
            )
            .await?;

        Ok(())
    }

    async fn delete_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        platform_product_id: &str,
    ) -> Result<()> {
        let base_url = self.base_url(connection)?;
        let url = format!("{}/products/{}.json", base_url, platform_product_id);

        let response = self
            .client
            .delete(&url)
            .header("X-Shopify-Access-Token", &credentials.access_token)
            .send()
            .await
            .map_err(http::transport_error)?;

        // Already gone counts as deleted.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(platform_product_id, "product already absent on shopify");
            return Ok(());
        }

        http::check_response(response).await?;
        Ok(())
    }

    async fn set_inventory(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        updates: &[InventoryUpdate],
    ) -> Result<()> {
        let base_url = self.base_url(connection)?;
        let mut default_location: Option<i64> = None;

        for update in updates {
            let variant_id: i64 = update.platform_variant_id.parse().map_err(|_| {
                Error::new(
                    ErrorCode::InvalidInput,
                    format!("invalid shopify variant id {}", update.platform_variant_id),
                )
            })?;

            let envelope: VariantEnvelope = self
                .get_json(
                    &format!("{}/variants/{}.json", base_url, variant_id),
                    credentials,
                )
                .await?;
            let Some(item_id) = envelope.variant.inventory_item_id else {
                warn!(variant_id, "variant has no inventory item; skipping");
                continue;
            };

            let location_id = match &update.platform_location_id {
                Some(location) => location.parse::<i64>().map_err(|_| {
                    Error::new(
                        ErrorCode::InvalidInput,
                        format!("invalid shopify location id {}", location),
                    )
                })?,
                None => {
                    if default_location.is_none() {
                        default_location =
                            Some(self.default_location_id(&base_url, credentials).await?);
                    }
                    default_location.unwrap_or_default()
                }
            };

            self.set_one_level(&base_url, credentials, item_id, location_id, update.quantity)
                .await?;
        }

        Ok(())
    }

    async fn list_locations(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<Vec<PlatformLocationData>> {
        let base_url = self.base_url(connection)?;
        let envelope: LocationsEnvelope = self
            .get_json(&format!("{}/locations.json", base_url), credentials)
            .await?;

        Ok(envelope
            .locations
            .into_iter()
            .map(|location| PlatformLocationData {
                platform_location_id: location.id.to_string(),
                name: location.name,
                is_default: location.primary,
            })
            .collect())
    }

    fn verify_webhook(&self, raw_body: &[u8], headers: &WebhookHeaders) -> Result<()> {
        let signature = headers.get(HMAC_HEADER).ok_or_else(|| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "missing shopify hmac header",
            )
        })?;

        let expected = BASE64.decode(signature.as_bytes()).map_err(|_| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "shopify hmac header is not valid base64",
            )
        })?;

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|e| Error::new(ErrorCode::ConfigurationError, e.to_string()))?;
        mac.update(raw_body);
        mac.verify_slice(&expected).map_err(|_| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "shopify webhook signature mismatch",
            )
        })
    }

    fn parse_webhook(&self, raw_body: &[u8], headers: &WebhookHeaders) -> Result<WebhookEvent> {
        let topic = headers
            .get(TOPIC_HEADER)
            .map(String::as_str)
            .unwrap_or_default();

        match topic {
            "products/create" | "products/update" => {
                let wire: ShopifyProduct = serde_json::from_slice(raw_body)?;
                let product = Self::to_platform_product(wire, &HashMap::new());
                if topic == "products/create" {
                    Ok(WebhookEvent::ProductCreated { product })
                } else {
                    Ok(WebhookEvent::ProductUpdated { product })
                }
            }
            "products/delete" => {
                let wire: serde_json::Value = serde_json::from_slice(raw_body)?;
                let id = wire
                    .get("id")
                    .and_then(|id| id.as_i64())
                    .ok_or_else(|| {
                        Error::new(ErrorCode::InvalidInput, "delete webhook without product id")
                    })?;
                Ok(WebhookEvent::ProductDeleted {
                    platform_product_id: id.to_string(),
                })
            }
            "inventory_levels/update" => {
                let wire: InventoryWebhookPayload = serde_json::from_slice(raw_body)?;
                let variant_key = wire
                    .variant_id
                    .or(wire.inventory_item_id)
                    .ok_or_else(|| {
                        Error::new(
                            ErrorCode::InvalidInput,
                            "inventory webhook without a variant reference",
                        )
                    })?;
                Ok(WebhookEvent::InventoryChanged {
                    platform_variant_id: variant_key.to_string(),
                    platform_location_id: wire.location_id.map(|id| id.to_string()),
                    quantity: wire.available.unwrap_or(0).max(0),
                })
            }
            other => Err(Error::new(
                ErrorCode::InvalidInput,
                format!("unsupported shopify webhook topic: {}", other),
            )),
        }
    }

    fn connection_locator(
        &self,
        _raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<(ConnectionLocator, String)> {
        let shop = headers.get(SHOP_DOMAIN_HEADER).ok_or_else(|| {
            Error::new(
                ErrorCode::InvalidInput,
                "missing shopify shop domain header",
            )
        })?;
        Ok((ConnectionLocator::ShopDomain, shop.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelsync_catalog::mapper::{LocationQuantity, PlatformVariantInput};

    fn adapter() -> ShopifyAdapter {
        ShopifyAdapter::new(PlatformEndpointConfig {
            api_base_url: "https://{shop}/admin/api/2024-01".to_string(),
            webhook_secret: "shpss_test_secret".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn webhook_verification_accepts_valid_mac() {
        let adapter = adapter();
        let body = br#"{"id": 1}"#;
        let mut headers = WebhookHeaders::new();
        headers.insert(
            HMAC_HEADER.to_string(),
            sign("shpss_test_secret", body),
        );

        assert!(adapter.verify_webhook(body, &headers).is_ok());
    }

    #[test]
    fn webhook_verification_rejects_bad_mac() {
        let adapter = adapter();
        let body = br#"{"id": 1}"#;
        let mut headers = WebhookHeaders::new();
        headers.insert(
            HMAC_HEADER.to_string(),
            sign("a-different-secret", body),
        );

        let err = adapter.verify_webhook(body, &headers).unwrap_err();
        assert_eq!(err.code, ErrorCode::WebhookSignatureInvalid);
    }

    #[test]
    fn webhook_verification_rejects_missing_header() {
        let adapter = adapter();
        let err = adapter
            .verify_webhook(b"{}", &WebhookHeaders::new())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::WebhookSignatureInvalid);
    }

    #[test]
    fn product_webhook_maps_variant_title_from_product() {
        let adapter = adapter();
        let body = serde_json::json!({
            "id": 42,
            "title": "Classic Tee",
            "options": [{"name": "Size"}],
            "variants": [
                {"id": 1, "sku": "TEE-S", "price": "19.99", "option1": "S"},
                {"id": 2, "sku": "TEE-M", "price": "19.99", "option1": "M"}
            ]
        });
        let mut headers = WebhookHeaders::new();
        headers.insert(TOPIC_HEADER.to_string(), "products/update".to_string());

        let event = adapter
            .parse_webhook(body.to_string().as_bytes(), &headers)
            .unwrap();
        let WebhookEvent::ProductUpdated { product } = event else {
            panic!("expected product update");
        };

        assert_eq!(product.platform_product_id, "42");
        assert_eq!(product.variants.len(), 2);
        // Canonical variant title carries the product title on Shopify.
        assert!(product.variants.iter().all(|v| v.title == "Classic Tee"));
        assert_eq!(
            product.variants[0].options.get("Size").map(String::as_str),
            Some("S")
        );
        assert_eq!(product.variants[0].price, Decimal::new(1999, 2));
    }

    #[test]
    fn inventory_webhook_normalizes() {
        let adapter = adapter();
        let body = serde_json::json!({
            "variant_id": 77,
            "location_id": 11,
            "available": 4
        });
        let mut headers = WebhookHeaders::new();
        headers.insert(
            TOPIC_HEADER.to_string(),
            "inventory_levels/update".to_string(),
        );

        let event = adapter
            .parse_webhook(body.to_string().as_bytes(), &headers)
            .unwrap();
        let WebhookEvent::InventoryChanged {
            platform_variant_id,
            platform_location_id,
            quantity,
        } = event
        else {
            panic!("expected inventory change");
        };

        assert_eq!(platform_variant_id, "77");
        assert_eq!(platform_location_id.as_deref(), Some("11"));
        assert_eq!(quantity, 4);
    }

    #[test]
    fn locator_reads_shop_domain() {
        let adapter = adapter();
        let mut headers = WebhookHeaders::new();
        headers.insert(
            SHOP_DOMAIN_HEADER.to_string(),
            "demo.myshopify.com".to_string(),
        );

        let (locator, value) = adapter.connection_locator(b"{}", &headers).unwrap();
        assert_eq!(locator, ConnectionLocator::ShopDomain);
        assert_eq!(value, "demo.myshopify.com");
    }

    #[test]
    fn variant_pairing_prefers_sku_over_position() {
        let input = PlatformProductInput {
            title: "Tee".to_string(),
            description: None,
            image_urls: vec![],
            variants: vec![
                PlatformVariantInput {
                    canonical_variant_id: Uuid::new_v4(),
                    platform_variant_id: None,
                    sku: Some("TEE-M".to_string()),
                    barcode: None,
                    title: "Tee".to_string(),
                    price: Decimal::new(1999, 2),
                    compare_at_price: None,
                    weight: None,
                    weight_unit: None,
                    options: HashMap::new(),
                    is_taxable: true,
                    tax_code: None,
                    requires_shipping: true,
                    image_url: None,
                    quantities: vec![LocationQuantity {
                        platform_location_id: Some("11".to_string()),
                        quantity: 0,
                    }],
                },
            ],
        };

        // Platform returned the variants in a different order than sent.
        let created = vec![
            ShopifyVariant {
                id: 900,
                sku: Some("OTHER".to_string()),
                barcode: None,
                price: None,
                compare_at_price: None,
                weight: None,
                weight_unit: None,
                option1: None,
                option2: None,
                option3: None,
                taxable: true,
                requires_shipping: true,
                inventory_item_id: None,
                updated_at: None,
            },
            ShopifyVariant {
                id: 901,
                sku: Some("tee-m".to_string()),
                barcode: None,
                price: None,
                compare_at_price: None,
                weight: None,
                weight_unit: None,
                option1: None,
                option2: None,
                option3: None,
                taxable: true,
                requires_shipping: true,
                inventory_item_id: None,
                updated_at: None,
            },
        ];

        let pairs = ShopifyAdapter::pair_variant_ids(&input, &created);
        assert_eq!(
            pairs.get(&input.variants[0].canonical_variant_id).map(String::as_str),
            Some("901")
        );
    }
}
