use super::{CatalogStore, ConnectionLocator};
use crate::model::product::VariantImage;
use crate::model::{
    ConnectionStatus, InventoryLevel, PlatformConnection, PlatformProductMapping, PlatformType,
    Product, ProductVariant, SyncStatus,
};
use async_trait::async_trait;
use channelsync_core::{DatabasePool, Error, ErrorCode, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the catalog store.
///
/// Upserts bind one statement per row inside the batch methods; the batches
/// the processors produce are bounded by platform page sizes, and per-row
/// statements keep the conflict handling readable.
pub struct PgCatalogStore {
    db: DatabasePool,
}

impl PgCatalogStore {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    fn pool(&self) -> &PgPool {
        &self.db.pool
    }

    fn check_ownership(expected: Uuid, actual: Uuid, entity: &str) -> Result<()> {
        if expected != actual {
            return Err(Error::new(
                ErrorCode::AuthorizationFailed,
                format!("{} does not belong to the calling user", entity),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn upsert_products(&self, user_id: Uuid, products: Vec<Product>) -> Result<Vec<Product>> {
        let mut persisted = Vec::with_capacity(products.len());

        for product in products {
            Self::check_ownership(user_id, product.user_id, "product")?;

            let row = match &product.origin_key {
                Some(origin_key) => {
                    sqlx::query_as::<_, Product>(
                        "INSERT INTO products
                         (id, user_id, is_archived, title, description, image_urls, origin_key, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                         ON CONFLICT (origin_key) WHERE origin_key IS NOT NULL DO UPDATE SET
                             is_archived = EXCLUDED.is_archived,
                             title = EXCLUDED.title,
                             description = EXCLUDED.description,
                             image_urls = EXCLUDED.image_urls,
                             updated_at = EXCLUDED.updated_at
                         RETURNING *",
                    )
                    .bind(product.id)
                    .bind(product.user_id)
                    .bind(product.is_archived)
                    .bind(&product.title)
                    .bind(&product.description)
                    .bind(&product.image_urls)
                    .bind(origin_key)
                    .bind(product.created_at)
                    .bind(Utc::now())
                    .fetch_one(self.pool())
                    .await?
                }
                None => {
                    sqlx::query_as::<_, Product>(
                        "INSERT INTO products
                         (id, user_id, is_archived, title, description, image_urls, origin_key, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $8)
                         ON CONFLICT (id) DO UPDATE SET
                             is_archived = EXCLUDED.is_archived,
                             title = EXCLUDED.title,
                             description = EXCLUDED.description,
                             image_urls = EXCLUDED.image_urls,
                             updated_at = EXCLUDED.updated_at
                         RETURNING *",
                    )
                    .bind(product.id)
                    .bind(product.user_id)
                    .bind(product.is_archived)
                    .bind(&product.title)
                    .bind(&product.description)
                    .bind(&product.image_urls)
                    .bind(product.created_at)
                    .bind(Utc::now())
                    .fetch_one(self.pool())
                    .await?
                }
            };

            persisted.push(row);
        }

        Ok(persisted)
    }

    async fn get_product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND user_id = $2",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(product)
    }

    async fn delete_product(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND user_id = $2")
            .bind(product_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::new(ErrorCode::ResourceNotFound, "product not found"));
        }
        Ok(())
    }

    async fn upsert_variants(
        &self,
        user_id: Uuid,
        variants: Vec<ProductVariant>,
    ) -> Result<Vec<ProductVariant>> {
        let mut persisted = Vec::with_capacity(variants.len());

        for variant in variants {
            Self::check_ownership(user_id, variant.user_id, "product variant")?;

            let row = match variant.effective_sku() {
                Some(_) => {
                    // The SKU key is case-insensitive; the incoming casing
                    // wins on conflict.
                    sqlx::query_as::<_, ProductVariant>(
                        "INSERT INTO product_variants
                         (id, product_id, user_id, sku, barcode, title, description, price,
                          compare_at_price, cost, weight, weight_unit, options, is_taxable,
                          tax_code, requires_shipping, image_id, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
                         ON CONFLICT (user_id, lower(sku)) WHERE sku IS NOT NULL DO UPDATE SET
                             product_id = EXCLUDED.product_id,
                             sku = EXCLUDED.sku,
                             barcode = EXCLUDED.barcode,
                             title = EXCLUDED.title,
                             description = EXCLUDED.description,
                             price = EXCLUDED.price,
                             compare_at_price = EXCLUDED.compare_at_price,
                             cost = EXCLUDED.cost,
                             weight = EXCLUDED.weight,
                             weight_unit = EXCLUDED.weight_unit,
                             options = EXCLUDED.options,
                             is_taxable = EXCLUDED.is_taxable,
                             tax_code = EXCLUDED.tax_code,
                             requires_shipping = EXCLUDED.requires_shipping,
                             image_id = EXCLUDED.image_id,
                             updated_at = EXCLUDED.updated_at
                         RETURNING *",
                    )
                    .bind(variant.id)
                    .bind(variant.product_id)
                    .bind(variant.user_id)
                    .bind(variant.effective_sku())
                    .bind(&variant.barcode)
                    .bind(&variant.title)
                    .bind(&variant.description)
                    .bind(variant.price)
                    .bind(variant.compare_at_price)
                    .bind(variant.cost)
                    .bind(variant.weight)
                    .bind(&variant.weight_unit)
                    .bind(&variant.options)
                    .bind(variant.is_taxable)
                    .bind(&variant.tax_code)
                    .bind(variant.requires_shipping)
                    .bind(&variant.image_id)
                    .bind(variant.created_at)
                    .bind(Utc::now())
                    .fetch_one(self.pool())
                    .await?
                }
                None => {
                    sqlx::query_as::<_, ProductVariant>(
                        "INSERT INTO product_variants
                         (id, product_id, user_id, sku, barcode, title, description, price,
                          compare_at_price, cost, weight, weight_unit, options, is_taxable,
                          tax_code, requires_shipping, image_id, created_at, updated_at)
                         VALUES ($1, $2, $3, NULL, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                         ON CONFLICT (id) DO UPDATE SET
                             product_id = EXCLUDED.product_id,
                             sku = EXCLUDED.sku,
                             barcode = EXCLUDED.barcode,
                             title = EXCLUDED.title,
                             description = EXCLUDED.description,
                             price = EXCLUDED.price,
                             compare_at_price = EXCLUDED.compare_at_price,
                             cost = EXCLUDED.cost,
                             weight = EXCLUDED.weight,
                             weight_unit = EXCLUDED.weight_unit,
                             options = EXCLUDED.options,
                             is_taxable = EXCLUDED.is_taxable,
                             tax_code = EXCLUDED.tax_code,
                             requires_shipping = EXCLUDED.requires_shipping,
                             image_id = EXCLUDED.image_id,
                             updated_at = EXCLUDED.updated_at
                         RETURNING *",
                    )
                    .bind(variant.id)
                    .bind(variant.product_id)
                    .bind(variant.user_id)
                    .bind(&variant.barcode)
                    .bind(&variant.title)
                    .bind(&variant.description)
                    .bind(variant.price)
                    .bind(variant.compare_at_price)
                    .bind(variant.cost)
                    .bind(variant.weight)
                    .bind(&variant.weight_unit)
                    .bind(&variant.options)
                    .bind(variant.is_taxable)
                    .bind(&variant.tax_code)
                    .bind(variant.requires_shipping)
                    .bind(&variant.image_id)
                    .bind(variant.created_at)
                    .bind(Utc::now())
                    .fetch_one(self.pool())
                    .await?
                }
            };

            persisted.push(row);
        }

        Ok(persisted)
    }

    async fn get_variant(&self, user_id: Uuid, variant_id: Uuid) -> Result<Option<ProductVariant>> {
        let variant = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE id = $1 AND user_id = $2",
        )
        .bind(variant_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(variant)
    }

    async fn get_variants_for_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<ProductVariant>> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE product_id = $1 AND user_id = $2
             ORDER BY created_at ASC",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(variants)
    }

    async fn get_variants_for_user(&self, user_id: Uuid) -> Result<Vec<ProductVariant>> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(variants)
    }

    async fn upsert_variant_images(&self, user_id: Uuid, images: Vec<VariantImage>) -> Result<()> {
        for image in images {
            // Ownership travels through the variant row.
            sqlx::query(
                "INSERT INTO variant_images (product_variant_id, image_url, position)
                 SELECT $1, $2, $3
                 WHERE EXISTS (SELECT 1 FROM product_variants WHERE id = $1 AND user_id = $4)
                 ON CONFLICT (product_variant_id, position) DO UPDATE SET
                     image_url = EXCLUDED.image_url",
            )
            .bind(image.product_variant_id)
            .bind(&image.image_url)
            .bind(image.position)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }

    async fn upsert_inventory_levels(
        &self,
        user_id: Uuid,
        levels: Vec<InventoryLevel>,
    ) -> Result<Vec<InventoryLevel>> {
        let mut persisted = Vec::with_capacity(levels.len());

        for level in levels {
            let row = sqlx::query_as::<_, InventoryLevel>(
                "INSERT INTO inventory_levels
                 (id, product_variant_id, platform_connection_id, platform_location_id, quantity, last_platform_update_at)
                 SELECT $1, $2, $3, $4, $5, $6
                 WHERE EXISTS (SELECT 1 FROM product_variants WHERE id = $2 AND user_id = $7)
                 ON CONFLICT (product_variant_id, platform_connection_id, COALESCE(platform_location_id, '')) DO UPDATE SET
                     quantity = EXCLUDED.quantity,
                     last_platform_update_at = EXCLUDED.last_platform_update_at
                 RETURNING *",
            )
            .bind(level.id)
            .bind(level.product_variant_id)
            .bind(level.platform_connection_id)
            .bind(&level.platform_location_id)
            .bind(level.quantity)
            .bind(level.last_platform_update_at)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;

            match row {
                Some(row) => persisted.push(row),
                None => {
                    return Err(Error::new(
                        ErrorCode::AuthorizationFailed,
                        "inventory level references a variant the calling user does not own",
                    ))
                }
            }
        }

        Ok(persisted)
    }

    async fn get_levels_for_variant(
        &self,
        user_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Vec<InventoryLevel>> {
        let levels = sqlx::query_as::<_, InventoryLevel>(
            "SELECT il.* FROM inventory_levels il
             JOIN product_variants pv ON pv.id = il.product_variant_id
             WHERE il.product_variant_id = $1 AND pv.user_id = $2",
        )
        .bind(variant_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(levels)
    }

    async fn insert_connection(
        &self,
        connection: PlatformConnection,
    ) -> Result<PlatformConnection> {
        let row = sqlx::query_as::<_, PlatformConnection>(
            "INSERT INTO platform_connections
             (id, user_id, platform_type, display_name, is_enabled, status,
              platform_specific_data, encrypted_credentials, last_sync_attempt_at,
              last_sync_success_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING *",
        )
        .bind(connection.id)
        .bind(connection.user_id)
        .bind(connection.platform_type)
        .bind(&connection.display_name)
        .bind(connection.is_enabled)
        .bind(connection.status)
        .bind(&connection.platform_specific_data)
        .bind(&connection.encrypted_credentials)
        .bind(connection.last_sync_attempt_at)
        .bind(connection.last_sync_success_at)
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    async fn get_connection(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> Result<Option<PlatformConnection>> {
        let connection = sqlx::query_as::<_, PlatformConnection>(
            "SELECT * FROM platform_connections WHERE id = $1 AND user_id = $2",
        )
        .bind(connection_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(connection)
    }

    async fn list_enabled_connections(&self, user_id: Uuid) -> Result<Vec<PlatformConnection>> {
        let connections = sqlx::query_as::<_, PlatformConnection>(
            "SELECT * FROM platform_connections WHERE user_id = $1 AND is_enabled = TRUE
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(connections)
    }

    async fn find_connections_by_locator(
        &self,
        platform_type: PlatformType,
        locator: ConnectionLocator,
        value: &str,
    ) -> Result<Vec<PlatformConnection>> {
        let key = match locator {
            ConnectionLocator::ShopDomain => "shop",
            ConnectionLocator::MerchantId => "merchantId",
        };

        let connections = sqlx::query_as::<_, PlatformConnection>(
            "SELECT * FROM platform_connections
             WHERE platform_type = $1 AND platform_specific_data ->> $2 = $3
             ORDER BY created_at ASC",
        )
        .bind(platform_type)
        .bind(key)
        .bind(value)
        .fetch_all(self.pool())
        .await?;

        Ok(connections)
    }

    async fn update_connection_status(
        &self,
        connection_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE platform_connections SET status = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(connection_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn patch_connection_data(
        &self,
        connection_id: Uuid,
        patch: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE platform_connections
             SET platform_specific_data = platform_specific_data || $1, updated_at = $2
             WHERE id = $3",
        )
        .bind(&patch)
        .bind(Utc::now())
        .bind(connection_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn touch_connection_sync(&self, connection_id: Uuid, success: bool) -> Result<()> {
        if success {
            sqlx::query(
                "UPDATE platform_connections
                 SET last_sync_attempt_at = $1, last_sync_success_at = $1, updated_at = $1
                 WHERE id = $2",
            )
            .bind(Utc::now())
            .bind(connection_id)
            .execute(self.pool())
            .await?;
        } else {
            sqlx::query(
                "UPDATE platform_connections
                 SET last_sync_attempt_at = $1, updated_at = $1
                 WHERE id = $2",
            )
            .bind(Utc::now())
            .bind(connection_id)
            .execute(self.pool())
            .await?;
        }

        Ok(())
    }

    async fn upsert_mapping(
        &self,
        mapping: PlatformProductMapping,
    ) -> Result<PlatformProductMapping> {
        let row = sqlx::query_as::<_, PlatformProductMapping>(
            "INSERT INTO platform_product_mappings
             (id, platform_connection_id, product_variant_id, platform_product_id,
              platform_variant_id, platform_sku, is_enabled, sync_status,
              sync_error_message, last_synced_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (platform_connection_id, product_variant_id) DO UPDATE SET
                 platform_product_id = EXCLUDED.platform_product_id,
                 platform_variant_id = EXCLUDED.platform_variant_id,
                 platform_sku = EXCLUDED.platform_sku,
                 is_enabled = EXCLUDED.is_enabled,
                 sync_status = EXCLUDED.sync_status,
                 sync_error_message = EXCLUDED.sync_error_message,
                 last_synced_at = EXCLUDED.last_synced_at,
                 updated_at = EXCLUDED.updated_at
             RETURNING *",
        )
        .bind(mapping.id)
        .bind(mapping.platform_connection_id)
        .bind(mapping.product_variant_id)
        .bind(&mapping.platform_product_id)
        .bind(&mapping.platform_variant_id)
        .bind(&mapping.platform_sku)
        .bind(mapping.is_enabled)
        .bind(mapping.sync_status)
        .bind(&mapping.sync_error_message)
        .bind(mapping.last_synced_at)
        .bind(mapping.created_at)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    async fn get_mapping_for_variant(
        &self,
        connection_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Option<PlatformProductMapping>> {
        let mapping = sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT * FROM platform_product_mappings
             WHERE platform_connection_id = $1 AND product_variant_id = $2",
        )
        .bind(connection_id)
        .bind(variant_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(mapping)
    }

    async fn get_mapping_by_platform_variant(
        &self,
        connection_id: Uuid,
        platform_variant_id: &str,
    ) -> Result<Option<PlatformProductMapping>> {
        let mapping = sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT * FROM platform_product_mappings
             WHERE platform_connection_id = $1 AND platform_variant_id = $2",
        )
        .bind(connection_id)
        .bind(platform_variant_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(mapping)
    }

    async fn get_mappings_by_platform_product(
        &self,
        connection_id: Uuid,
        platform_product_id: &str,
    ) -> Result<Vec<PlatformProductMapping>> {
        let mappings = sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT * FROM platform_product_mappings
             WHERE platform_connection_id = $1 AND platform_product_id = $2",
        )
        .bind(connection_id)
        .bind(platform_product_id)
        .fetch_all(self.pool())
        .await?;

        Ok(mappings)
    }

    async fn get_mappings_for_product(
        &self,
        connection_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<PlatformProductMapping>> {
        let mappings = sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT m.* FROM platform_product_mappings m
             JOIN product_variants pv ON pv.id = m.product_variant_id
             WHERE m.platform_connection_id = $1 AND pv.product_id = $2",
        )
        .bind(connection_id)
        .bind(product_id)
        .fetch_all(self.pool())
        .await?;

        Ok(mappings)
    }

    async fn delete_mapping(&self, mapping_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM platform_product_mappings WHERE id = $1")
            .bind(mapping_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn update_mapping_sync_status(
        &self,
        mapping_id: Uuid,
        status: SyncStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE platform_product_mappings
             SET sync_status = $1,
                 sync_error_message = $2,
                 last_synced_at = CASE WHEN $1 = 'success'::mapping_sync_status THEN $3 ELSE last_synced_at END,
                 updated_at = $3
             WHERE id = $4",
        )
        .bind(status)
        .bind(&error_message)
        .bind(Utc::now())
        .bind(mapping_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}
