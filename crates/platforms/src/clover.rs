//! Clover adapter over the v3 merchant inventory API.
//!
//! Clover items are flat — no variant dimension — so each item maps to a
//! single-variant product whose variant id equals the item id. Merchants
//! have one implicit stock location; `list_locations` reports it as the
//! default. Clover offers no per-event MAC, so webhook verification is a
//! constant-time shared-secret comparison on the `X-Clover-Auth` header;
//! unauthenticated ingestion is rejected outright.

use crate::adapter::PlatformAdapter;
use crate::http;
use crate::types::{
    CreateProductResult, FetchAllResult, InventoryUpdate, PlatformCredentials, WebhookEvent,
    WebhookHeaders,
};
use async_trait::async_trait;
use channelsync_catalog::mapper::{
    PlatformInventoryData, PlatformLocationData, PlatformProductData, PlatformProductInput,
    PlatformVariantData,
};
use channelsync_catalog::model::{PlatformConnection, PlatformType};
use channelsync_catalog::store::ConnectionLocator;
use channelsync_core::config::PlatformEndpointConfig;
use channelsync_core::{Error, ErrorCode, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const AUTH_HEADER: &str = "x-clover-auth";
const PAGE_LIMIT: usize = 250;

pub struct CloverAdapter {
    config: PlatformEndpointConfig,
    client: reqwest::Client,
}

// === Wire shapes ===

#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(default)]
    elements: Vec<CloverItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct CloverItem {
    id: String,
    name: String,
    /// Price in cents.
    #[serde(default)]
    price: Option<i64>,
    #[serde(default)]
    sku: Option<String>,
    /// Clover calls the barcode field `code`.
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    hidden: bool,
    #[serde(rename = "itemStock", default)]
    item_stock: Option<CloverStock>,
    #[serde(rename = "modifiedTime", default)]
    modified_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct CloverStock {
    #[serde(default)]
    quantity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloverWebhookPayload {
    #[serde(rename = "merchantId", default)]
    merchant_id: Option<String>,
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    item: Option<CloverItem>,
    #[serde(rename = "itemId", default)]
    item_id: Option<String>,
    #[serde(default)]
    quantity: Option<i64>,
}

/// Constant-time byte comparison; the difference accumulator keeps the
/// loop length independent of where a mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

impl CloverAdapter {
    pub fn new(config: PlatformEndpointConfig) -> Result<Self> {
        let client = http::build_client(config.request_timeout_secs)?;
        Ok(Self { config, client })
    }

    fn merchant_base(&self, connection: &PlatformConnection) -> Result<String> {
        let merchant_id = connection.merchant_id().ok_or_else(|| {
            Error::new(
                ErrorCode::InvalidInput,
                "clover connection has no merchant id recorded",
            )
        })?;
        Ok(format!(
            "{}/v3/merchants/{}",
            self.config.api_base_url, merchant_id
        ))
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

    /// Item → single-variant neutral product.
    fn to_platform_product(item: CloverItem) -> PlatformProductData {
        let inventory = item
            .item_stock
            .as_ref()
            .and_then(|stock| stock.quantity)
            .map(|quantity| {
                vec![PlatformInventoryData {
                    platform_location_id: None,
                    quantity: quantity.max(0.0) as i64,
                }]
            })
            .unwrap_or_default();

        let updated_at = item
            .modified_time
            .and_then(chrono::DateTime::from_timestamp_millis);

        let variant = PlatformVariantData {
            platform_variant_id: item.id.clone(),
            sku: item.sku.filter(|sku| !sku.is_empty()),
            barcode: item.code.filter(|code| !code.is_empty()),
            title: item.name.clone(),
            description: None,
            price: item
                .price
                .map(|cents| Decimal::new(cents, 2))
                .unwrap_or_default(),
            compare_at_price: None,
            cost: None,
            weight: None,
            weight_unit: None,
            options: HashMap::new(),
            is_taxable: true,
            tax_code: None,
            requires_shipping: false,
            image_url: None,
            inventory,
            updated_at,
        };

        PlatformProductData {
            platform_product_id: item.id,
            title: item.name,
            description: None,
            image_urls: Vec::new(),
            is_archived: item.hidden,
            variants: vec![variant],
            variants_count: Some(1),
        }
    }

    fn to_item_payload(input: &PlatformProductInput) -> serde_json::Value {
        // Clover has no variant dimension; the first variant carries the
        // item's price and identifiers.
        let variant = input.variants.first();
        serde_json::json!({
            "name": input.title,
            "price": variant
                .map(|v| (v.price * Decimal::new(100, 0)).trunc().to_i64().unwrap_or(0))
                .unwrap_or(0),
            "sku": variant.and_then(|v| v.sku.clone()),
            "code": variant.and_then(|v| v.barcode.clone()),
        })
    }
}

#[async_trait]
impl PlatformAdapter for CloverAdapter {
    fn platform_type(&self) -> PlatformType {
        PlatformType::Clover
    }

    async fn fetch_all(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
    ) -> Result<FetchAllResult> {
        let base = self.merchant_base(connection)?;
        let locations = self.list_locations(connection, credentials).await?;

        let mut products = Vec::new();
        let mut offset = 0usize;
        loop {
            let url = format!(
                "{}/items?expand=itemStock&limit={}&offset={}",
                base, PAGE_LIMIT, offset
            );
            let envelope: ItemsEnvelope = self.get_json(&url, credentials).await?;
            let page_len = envelope.elements.len();

            products.extend(envelope.elements.into_iter().map(Self::to_platform_product));

            if page_len < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        debug!(products = products.len(), "clover fetch_all complete");
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
        if ids.len() > 250 {
            return Err(Error::new(
                ErrorCode::InvalidInput,
                "fetch_by_ids is bounded to 250 ids per call",
            ));
        }

        let base = self.merchant_base(connection)?;
        let mut products = Vec::new();
        for id in ids {
            let url = format!("{}/items/{}?expand=itemStock", base, id);
            match self.get_json::<CloverItem>(&url, credentials).await {
                Ok(item) => products.push(Self::to_platform_product(item)),
                // Missing ids are dropped from the result.
                Err(err) if err.code == ErrorCode::PlatformRejectedInput => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(products)
    }

    async fn create_product(
        &self,
        connection: &PlatformConnection,
        credentials: &PlatformCredentials,
        input: &PlatformProductInput,
    ) -> Result<CreateProductResult> {
        let base = self.merchant_base(connection)?;
        let payload = Self::to_item_payload(input);

        let item: CloverItem = self
            .post_json(&format!("{}/items", base), credentials, &payload)
            .await?;

        let mut variant_ids = HashMap::new();
        if let Some(variant) = input.variants.first() {
            variant_ids.insert(variant.canonical_variant_id, item.id.clone());

            // Clover stock is single-location; the first quantity wins.
            if let Some(quantity) = variant.quantities.first() {
                let body = serde_json::json!({ "quantity": quantity.quantity });
                let _: serde_json::Value = self
                    .post_json(
                        &format!("{}/item_stocks/{}", base, item.id),
                        credentials,
                        &body,
                    )
                    .await?;
            }
        }

        Ok(CreateProductResult {
            platform_product_id: item.id,
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
        let base = self.merchant_base(connection)?;
        let payload = Self::to_item_payload(input);
        let _: CloverItem = self
            .post_json(
                &format!("{}/items/{}", base, platform_product_id),
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
        let base = self.merchant_base(connection)?;
        let response = self
            .client
            .delete(format!("{}/items/{}", base, platform_product_id))
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(http::transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(platform_product_id, "item already absent on clover");
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
        let base = self.merchant_base(connection)?;

        for update in updates {
            let body = serde_json::json!({ "quantity": update.quantity });
            let _: serde_json::Value = self
                .post_json(
                    &format!("{}/item_stocks/{}", base, update.platform_variant_id),
                    credentials,
                    &body,
                )
                .await?;
        }

        Ok(())
    }

    async fn list_locations(
        &self,
        connection: &PlatformConnection,
        _credentials: &PlatformCredentials,
    ) -> Result<Vec<PlatformLocationData>> {
        // One implicit location per merchant.
        let merchant_id = connection.merchant_id().unwrap_or("clover");
        Ok(vec![PlatformLocationData {
            platform_location_id: merchant_id.to_string(),
            name: connection.display_name.clone(),
            is_default: true,
        }])
    }

    fn verify_webhook(&self, _raw_body: &[u8], headers: &WebhookHeaders) -> Result<()> {
        let provided = headers.get(AUTH_HEADER).ok_or_else(|| {
            Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "missing clover auth header",
            )
        })?;

        if self.config.webhook_secret.is_empty() {
            return Err(Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "clover webhook secret is not configured",
            ));
        }

        if !constant_time_eq(provided.as_bytes(), self.config.webhook_secret.as_bytes()) {
            return Err(Error::new(
                ErrorCode::WebhookSignatureInvalid,
                "clover auth token mismatch",
            ));
        }
        Ok(())
    }

    fn parse_webhook(&self, raw_body: &[u8], _headers: &WebhookHeaders) -> Result<WebhookEvent> {
        let payload: CloverWebhookPayload = serde_json::from_slice(raw_body)?;

        match payload.event_type.as_str() {
            "ITEM_CREATED" | "ITEM_UPDATED" => {
                let item = payload.item.ok_or_else(|| {
                    Error::new(ErrorCode::InvalidInput, "item webhook without item body")
                })?;
                let product = Self::to_platform_product(item);
                if payload.event_type == "ITEM_CREATED" {
                    Ok(WebhookEvent::ProductCreated { product })
                } else {
                    Ok(WebhookEvent::ProductUpdated { product })
                }
            }
            "ITEM_DELETED" => {
                let id = payload
                    .item_id
                    .or(payload.item.map(|item| item.id))
                    .ok_or_else(|| {
                        Error::new(ErrorCode::InvalidInput, "delete webhook without item id")
                    })?;
                Ok(WebhookEvent::ProductDeleted {
                    platform_product_id: id,
                })
            }
            "STOCK_UPDATED" => {
                let id = payload.item_id.ok_or_else(|| {
                    Error::new(ErrorCode::InvalidInput, "stock webhook without item id")
                })?;
                Ok(WebhookEvent::InventoryChanged {
                    platform_variant_id: id,
                    platform_location_id: None,
                    quantity: payload.quantity.unwrap_or(0).max(0),
                })
            }
            other => Err(Error::new(
                ErrorCode::InvalidInput,
                format!("unsupported clover webhook type: {}", other),
            )),
        }
    }

    fn connection_locator(
        &self,
        raw_body: &[u8],
        _headers: &WebhookHeaders,
    ) -> Result<(ConnectionLocator, String)> {
        let payload: CloverWebhookPayload = serde_json::from_slice(raw_body)?;
        let merchant_id = payload.merchant_id.ok_or_else(|| {
            Error::new(ErrorCode::InvalidInput, "clover webhook without merchant id")
        })?;
        Ok((ConnectionLocator::MerchantId, merchant_id))
    }
}
