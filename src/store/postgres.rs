//! Bulk upsert of products into PostgreSQL.
//!
//! A batch is converted into one array per column and written with a single
//! `INSERT ... SELECT FROM UNNEST(...)` statement inside a transaction.
//! Conflicts on `slug` update every column except `id`, `slug` and
//! `created_at`.

use super::{ProductStore, StoreError, dedupe_by_slug};
use crate::import::serializer::{decode_json_field, serialize_json_fields};
use crate::models::{Product, ProductStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

const UPSERT_SQL: &str = r#"INSERT INTO products (
        id, title, slug, content,
        price, old_price, discount_percentage,
        quantity, in_stock,
        image_cover, image_thumbnail,
        container_type, container_size, production_year, condition,
        location_city, location_district, location_country,
        type, is_new, is_hot_sale, is_featured, is_bulk_sale, accept_offers, status,
        colors, all_prices, technical_specs, user_info,
        created_at, updated_at
    )
    SELECT
        id, title, slug, content,
        price, old_price, discount_percentage,
        quantity, in_stock,
        image_cover, image_thumbnail,
        container_type, container_size, production_year, condition,
        location_city, location_district, location_country,
        type, is_new, is_hot_sale, is_featured, is_bulk_sale, accept_offers, status,
        colors::jsonb, all_prices::jsonb, technical_specs::jsonb, user_info::jsonb,
        NOW(), NOW()
    FROM UNNEST(
        $1::uuid[],
        $2::text[],
        $3::text[],
        $4::text[],
        $5::float8[],
        $6::float8[],
        $7::int2[],
        $8::int4[],
        $9::bool[],
        $10::text[],
        $11::text[],
        $12::text[],
        $13::text[],
        $14::int2[],
        $15::text[],
        $16::text[],
        $17::text[],
        $18::text[],
        $19::text[],
        $20::bool[],
        $21::bool[],
        $22::bool[],
        $23::bool[],
        $24::bool[],
        $25::text[],
        $26::text[],
        $27::text[],
        $28::text[],
        $29::text[]
    ) AS t (
        id, title, slug, content,
        price, old_price, discount_percentage,
        quantity, in_stock,
        image_cover, image_thumbnail,
        container_type, container_size, production_year, condition,
        location_city, location_district, location_country,
        type, is_new, is_hot_sale, is_featured, is_bulk_sale, accept_offers, status,
        colors, all_prices, technical_specs, user_info
    )
    ON CONFLICT (slug) DO UPDATE
    SET title = EXCLUDED.title,
        content = EXCLUDED.content,
        price = EXCLUDED.price,
        old_price = EXCLUDED.old_price,
        discount_percentage = EXCLUDED.discount_percentage,
        quantity = EXCLUDED.quantity,
        in_stock = EXCLUDED.in_stock,
        image_cover = EXCLUDED.image_cover,
        image_thumbnail = EXCLUDED.image_thumbnail,
        container_type = EXCLUDED.container_type,
        container_size = EXCLUDED.container_size,
        production_year = EXCLUDED.production_year,
        condition = EXCLUDED.condition,
        location_city = EXCLUDED.location_city,
        location_district = EXCLUDED.location_district,
        location_country = EXCLUDED.location_country,
        type = EXCLUDED.type,
        is_new = EXCLUDED.is_new,
        is_hot_sale = EXCLUDED.is_hot_sale,
        is_featured = EXCLUDED.is_featured,
        is_bulk_sale = EXCLUDED.is_bulk_sale,
        accept_offers = EXCLUDED.accept_offers,
        status = EXCLUDED.status,
        colors = EXCLUDED.colors,
        all_prices = EXCLUDED.all_prices,
        technical_specs = EXCLUDED.technical_specs,
        user_info = EXCLUDED.user_info,
        updated_at = NOW()"#;

const SELECT_COLUMNS: &str = r#"id, title, slug, content,
        price::float8 AS price, old_price::float8 AS old_price, discount_percentage,
        quantity, in_stock,
        image_cover, image_thumbnail,
        container_type, container_size, production_year, condition,
        location_city, location_district, location_country,
        type, is_new, is_hot_sale, is_featured, is_bulk_sale, accept_offers, status,
        colors::text AS colors, all_prices::text AS all_prices,
        technical_specs::text AS technical_specs, user_info::text AS user_info"#;

/// Product batch in columnar form for UNNEST-based bulk insertion.
///
/// All vectors must have the same length; index `i` across every vector
/// describes one product.
#[derive(Debug, Default)]
struct ProductColumns {
    ids: Vec<Uuid>,
    titles: Vec<String>,
    slugs: Vec<String>,
    contents: Vec<Option<String>>,
    prices: Vec<f64>,
    old_prices: Vec<Option<f64>>,
    discount_percentages: Vec<Option<i16>>,
    quantities: Vec<i32>,
    in_stock: Vec<bool>,
    image_covers: Vec<Option<String>>,
    image_thumbnails: Vec<Option<String>>,
    container_types: Vec<Option<String>>,
    container_sizes: Vec<Option<String>>,
    production_years: Vec<Option<i16>>,
    conditions: Vec<Option<String>>,
    location_cities: Vec<Option<String>>,
    location_districts: Vec<Option<String>>,
    location_countries: Vec<Option<String>>,
    types: Vec<Option<String>>,
    is_new: Vec<bool>,
    is_hot_sale: Vec<bool>,
    is_featured: Vec<bool>,
    is_bulk_sale: Vec<bool>,
    accept_offers: Vec<bool>,
    statuses: Vec<String>,
    colors: Vec<Option<String>>,
    all_prices: Vec<Option<String>>,
    technical_specs: Vec<Option<String>>,
    user_infos: Vec<Option<String>>,
}

impl ProductColumns {
    fn build(products: &[&Product]) -> Result<Self, serde_json::Error> {
        let mut columns = Self::default();

        for product in products {
            let encoded = serialize_json_fields(product)?;

            columns.ids.push(product.id);
            columns.titles.push(product.title.clone());
            columns.slugs.push(product.slug.clone());
            columns.contents.push(product.content.clone());
            columns.prices.push(product.price);
            columns.old_prices.push(product.old_price);
            columns.discount_percentages.push(product.discount_percentage);
            columns.quantities.push(product.quantity);
            columns.in_stock.push(product.in_stock);
            columns.image_covers.push(product.image_cover.clone());
            columns.image_thumbnails.push(product.image_thumbnail.clone());
            columns.container_types.push(product.container_type.clone());
            columns.container_sizes.push(product.container_size.clone());
            columns.production_years.push(product.production_year);
            columns
                .conditions
                .push(product.condition.map(|c| c.as_str().to_string()));
            columns.location_cities.push(product.location_city.clone());
            columns.location_districts.push(product.location_district.clone());
            columns.location_countries.push(product.location_country.clone());
            columns
                .types
                .push(product.product_type.map(|t| t.as_str().to_string()));
            columns.is_new.push(product.is_new);
            columns.is_hot_sale.push(product.is_hot_sale);
            columns.is_featured.push(product.is_featured);
            columns.is_bulk_sale.push(product.is_bulk_sale);
            columns.accept_offers.push(product.accept_offers);
            columns.statuses.push(product.status.as_str().to_string());
            columns.colors.push(encoded.colors);
            columns.all_prices.push(encoded.all_prices);
            columns.technical_specs.push(encoded.technical_specs);
            columns.user_infos.push(encoded.user_info);
        }

        Ok(columns)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write(&self, products: &[Product]) -> Result<u64, StoreError> {
        let batch = dedupe_by_slug(products);
        let columns = ProductColumns::build(&batch)?;

        let mut transaction = self.pool.begin().await?;

        let result = sqlx::query(UPSERT_SQL)
            .bind(&columns.ids)
            .bind(&columns.titles)
            .bind(&columns.slugs)
            .bind(&columns.contents)
            .bind(&columns.prices)
            .bind(&columns.old_prices)
            .bind(&columns.discount_percentages)
            .bind(&columns.quantities)
            .bind(&columns.in_stock)
            .bind(&columns.image_covers)
            .bind(&columns.image_thumbnails)
            .bind(&columns.container_types)
            .bind(&columns.container_sizes)
            .bind(&columns.production_years)
            .bind(&columns.conditions)
            .bind(&columns.location_cities)
            .bind(&columns.location_districts)
            .bind(&columns.location_countries)
            .bind(&columns.types)
            .bind(&columns.is_new)
            .bind(&columns.is_hot_sale)
            .bind(&columns.is_featured)
            .bind(&columns.is_bulk_sale)
            .bind(&columns.accept_offers)
            .bind(&columns.statuses)
            .bind(&columns.colors)
            .bind(&columns.all_prices)
            .bind(&columns.technical_specs)
            .bind(&columns.user_infos)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        log::trace!("bulk upserted {} products", columns.len());
        Ok(result.rows_affected())
    }
}

impl ProductStore for PgProductStore {
    async fn upsert_batch(&self, products: &[Product]) -> Result<u64, StoreError> {
        if products.is_empty() {
            return Ok(0);
        }

        match self.write(products).await {
            Ok(written) => {
                log::info!("products saved successfully (count: {})", products.len());
                Ok(written)
            }
            Err(err) => {
                log::error!(
                    target: "import_errors",
                    "failed to save products: {} (count: {})",
                    err,
                    products.len()
                );
                Err(err)
            }
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM products WHERE slug = $1");
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| product_from_row(&row)).transpose()
    }

    async fn slug_index(&self) -> Result<HashMap<String, Uuid>, StoreError> {
        let rows: Vec<(String, Uuid)> = sqlx::query_as("SELECT slug, id FROM products")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let status: String = row.try_get("status")?;
    let condition: Option<String> = row.try_get("condition")?;
    let product_type: Option<String> = row.try_get("type")?;

    Ok(Product {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        price: row.try_get("price")?,
        old_price: row.try_get("old_price")?,
        discount_percentage: row.try_get("discount_percentage")?,
        quantity: row.try_get("quantity")?,
        in_stock: row.try_get("in_stock")?,
        image_cover: row.try_get("image_cover")?,
        image_thumbnail: row.try_get("image_thumbnail")?,
        container_type: row.try_get("container_type")?,
        container_size: row.try_get("container_size")?,
        production_year: row.try_get("production_year")?,
        condition: condition.map(|c| c.parse()).transpose().map_err(decode_error)?,
        location_city: row.try_get("location_city")?,
        location_district: row.try_get("location_district")?,
        location_country: row.try_get("location_country")?,
        product_type: product_type
            .map(|t| t.parse())
            .transpose()
            .map_err(decode_error)?,
        is_new: row.try_get("is_new")?,
        is_hot_sale: row.try_get("is_hot_sale")?,
        is_featured: row.try_get("is_featured")?,
        is_bulk_sale: row.try_get("is_bulk_sale")?,
        accept_offers: row.try_get("accept_offers")?,
        status: status.parse::<ProductStatus>().map_err(decode_error)?,
        colors: decode_json_field(row.try_get("colors")?)?,
        all_prices: decode_json_field(row.try_get("all_prices")?)?,
        technical_specs: decode_json_field(row.try_get("technical_specs")?)?,
        user_info: decode_json_field(row.try_get("user_info")?)?,
    })
}

fn decode_error(err: crate::models::UnknownVariant) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductCondition;
    use crate::store::fixtures::product;
    use serde_json::json;

    #[test]
    fn columns_line_up_per_product() {
        let mut first = product("a");
        first.condition = Some(ProductCondition::Used);
        first.colors = Some(json!(["red"]));
        let second = product("b");

        let columns = ProductColumns::build(&[&first, &second]).unwrap();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns.slugs, vec!["a", "b"]);
        assert_eq!(columns.conditions, vec![Some("used".to_string()), None]);
        assert_eq!(columns.statuses, vec!["published", "published"]);
        assert_eq!(columns.colors, vec![Some(r#"["red"]"#.to_string()), None]);
        assert_eq!(columns.user_infos.len(), 2);
    }
}
