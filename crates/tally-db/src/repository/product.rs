//! # Product Repository
//!
//! The catalog rows recovery restores and config push reads.
//!
//! Upserts are keyed on the cloud-provided `local_id` and write only the
//! fields the record carries, so replaying the same snapshot leaves the
//! table byte-identical.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::ProductRecord;

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    sku: Option<String>,
    barcode: Option<String>,
    price_cents: i64,
    category: Option<String>,
    stock: i64,
    is_active: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        ProductRecord {
            local_id: row.id,
            name: row.name,
            sku: row.sku,
            barcode: row.barcode,
            price_cents: row.price_cents,
            category: row.category,
            stock: row.stock,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for product rows.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts the product, or overwrites the row with the same id.
    pub async fn upsert(&self, product: &ProductRecord) -> DbResult<()> {
        debug!(id = %product.local_id, "Upserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, barcode, price_cents, category, stock, is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                sku = excluded.sku,
                barcode = excluded.barcode,
                price_cents = excluded.price_cents,
                category = excluded.category,
                stock = excluded.stock,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.local_id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(product.price_cents)
        .bind(&product.category)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ProductRecord>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, sku, barcode, price_cents, category, stock, is_active, updated_at
            FROM products WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProductRecord::from))
    }

    /// Lists every product, active or not, ordered by id.
    pub async fn list_all(&self) -> DbResult<Vec<ProductRecord>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, sku, barcode, price_cents, category, stock, is_active, updated_at
            FROM products ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    /// Counts product rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
