//! Business rules for mapped products.
//!
//! [`Validator::validate_safe`] always returns a [`ValidationResult`]; the
//! [`Validator::validate`] variant reports the same failures through
//! `Result`. Every failure is logged on the `import_errors` target together
//! with the offending record.

use crate::import::mapper::MappedRecord;
use crate::models::{Product, ProductCondition, ProductStatus, ProductType};
use chrono::Datelike;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

static UUID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern compiles")
});

const TITLE_MAX_CHARS: usize = 500;
const SLUG_MAX_CHARS: usize = 255;
const MIN_PRODUCTION_YEAR: i64 = 1900;

/// Field name to the messages raised for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Lookup of slugs that are already persisted, mapped to the owning product id.
pub trait SlugIndex {
    fn owner_of(&self, slug: &str) -> Option<Uuid>;
}

impl SlugIndex for HashMap<String, Uuid> {
    fn owner_of(&self, slug: &str) -> Option<Uuid> {
        self.get(slug).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub data: Option<Product>,
    pub errors: Option<FieldErrors>,
}

#[derive(Debug, Error)]
#[error("product {product_id} failed validation on {} field(s)", .errors.len())]
pub struct ValidationError {
    pub product_id: String,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone)]
pub struct Validator {
    current_year: i64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::with_current_year(i64::from(chrono::Utc::now().year()))
    }

    /// Pin the year used for the `production_year` upper bound.
    pub fn with_current_year(current_year: i64) -> Self {
        Self { current_year }
    }

    /// Validate without failing. `slugs` enables the slug uniqueness rule.
    pub fn validate_safe(
        &self,
        record: &MappedRecord,
        slugs: Option<&dyn SlugIndex>,
    ) -> ValidationResult {
        match self.check(record, slugs) {
            Ok(product) => ValidationResult {
                valid: true,
                data: Some(product),
                errors: None,
            },
            Err(errors) => {
                log_validation_errors(record, &errors);
                ValidationResult {
                    valid: false,
                    data: None,
                    errors: Some(errors),
                }
            }
        }
    }

    pub fn validate(
        &self,
        record: &MappedRecord,
        slugs: Option<&dyn SlugIndex>,
    ) -> Result<Product, ValidationError> {
        self.check(record, slugs).map_err(|errors| {
            log_validation_errors(record, &errors);
            ValidationError {
                product_id: display_field(record, "id"),
                errors,
            }
        })
    }

    fn check(
        &self,
        record: &MappedRecord,
        slugs: Option<&dyn SlugIndex>,
    ) -> Result<Product, FieldErrors> {
        let mut v = Rules::new(record);

        let id = v.required_string("id").and_then(|raw| {
            if UUID_SHAPE.is_match(raw) {
                Uuid::parse_str(raw).ok()
            } else {
                None
            }
        });
        if id.is_none() && v.is_clean("id") {
            v.fail("id", "The id field must be a valid UUID.");
        }

        let title = v.required_string("title");
        if let Some(title) = title {
            v.max_chars("title", title, TITLE_MAX_CHARS);
        }

        let slug = v.required_string("slug");
        if let Some(slug) = slug {
            v.max_chars("slug", slug, SLUG_MAX_CHARS);
            if let Some(index) = slugs {
                let taken = index
                    .owner_of(slug)
                    .is_some_and(|owner| Some(owner) != id);
                if taken {
                    v.fail("slug", "The slug has already been taken.");
                }
            }
        }

        let content = v.optional_string("content");

        let price = v.required_number("price");
        v.min_number("price", price, 0.0);
        let old_price = v.optional_number("old_price");
        v.min_number("old_price", old_price, 0.0);
        let discount_percentage = v.optional_integer("discount_percentage");
        v.between("discount_percentage", discount_percentage, 0, 100);

        let quantity = v.required_integer("quantity");
        v.between("quantity", quantity, 0, i64::from(i32::MAX));
        let in_stock = v.required_boolean("in_stock");

        let image_cover = v.optional_string("image_cover");
        let image_thumbnail = v.optional_string("image_thumbnail");
        let container_type = v.optional_string("container_type");
        let container_size = v.optional_string("container_size");

        let production_year = v.optional_integer("production_year");
        v.between(
            "production_year",
            production_year,
            MIN_PRODUCTION_YEAR,
            self.current_year + 1,
        );
        let condition = v.optional_enum::<ProductCondition>("condition");

        let location_city = v.optional_string("location_city");
        let location_district = v.optional_string("location_district");
        let location_country = v.optional_string("location_country");

        let product_type = v.optional_enum::<ProductType>("type");
        let is_new = v.optional_boolean("is_new");
        let is_hot_sale = v.optional_boolean("is_hot_sale");
        let is_featured = v.optional_boolean("is_featured");
        let is_bulk_sale = v.optional_boolean("is_bulk_sale");
        let accept_offers = v.optional_boolean("accept_offers");
        let status = v.required_enum::<ProductStatus>("status");

        let colors = v.optional_structured("colors");
        let all_prices = v.optional_structured("all_prices");
        let technical_specs = v.optional_structured("technical_specs");
        let user_info = v.optional_structured("user_info");

        if !v.errors.is_empty() {
            return Err(v.errors);
        }

        // Every required field passed, so each of these is present.
        match (id, title, slug, price, quantity, in_stock, status) {
            (
                Some(id),
                Some(title),
                Some(slug),
                Some(price),
                Some(quantity),
                Some(in_stock),
                Some(status),
            ) => Ok(Product {
                id,
                title: title.to_string(),
                slug: slug.to_string(),
                content,
                price,
                old_price,
                discount_percentage: discount_percentage.map(|d| d as i16),
                quantity: quantity as i32,
                in_stock,
                image_cover,
                image_thumbnail,
                container_type,
                container_size,
                production_year: production_year.map(|year| year as i16),
                condition,
                location_city,
                location_district,
                location_country,
                product_type,
                is_new: is_new.unwrap_or(false),
                is_hot_sale: is_hot_sale.unwrap_or(false),
                is_featured: is_featured.unwrap_or(false),
                is_bulk_sale: is_bulk_sale.unwrap_or(false),
                accept_offers: accept_offers.unwrap_or(false),
                status,
                colors,
                all_prices,
                technical_specs,
                user_info,
            }),
            _ => {
                let mut errors = FieldErrors::new();
                errors
                    .entry("record".to_string())
                    .or_default()
                    .push("The record is incomplete.".to_string());
                Err(errors)
            }
        }
    }
}

/// Accumulates failures field by field; the first failure of a field wins.
struct Rules<'a> {
    record: &'a MappedRecord,
    errors: FieldErrors,
}

impl<'a> Rules<'a> {
    fn new(record: &'a MappedRecord) -> Self {
        Self {
            record,
            errors: FieldErrors::new(),
        }
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    fn is_clean(&self, field: &str) -> bool {
        !self.errors.contains_key(field)
    }

    /// Value of `field`, treating JSON null as absent.
    fn present(&self, field: &str) -> Option<&'a Value> {
        self.record.get(field).filter(|value| !value.is_null())
    }

    fn required(&mut self, field: &str) -> Option<&'a Value> {
        let value = self.present(field).filter(|value| match value {
            Value::String(text) => !text.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        });
        if value.is_none() {
            self.fail(field, format!("The {field} field is required."));
        }
        value
    }

    fn required_string(&mut self, field: &str) -> Option<&'a str> {
        let value = self.required(field)?;
        let text = value.as_str();
        if text.is_none() {
            self.fail(field, format!("The {field} field must be a string."));
        }
        text
    }

    fn optional_string(&mut self, field: &str) -> Option<String> {
        let value = self.present(field)?;
        match value.as_str() {
            Some(text) => Some(text.to_string()),
            None => {
                self.fail(field, format!("The {field} field must be a string."));
                None
            }
        }
    }

    fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.fail(
                field,
                format!("The {field} field must not be greater than {max} characters."),
            );
        }
    }

    fn number(&mut self, field: &str, value: &Value) -> Option<f64> {
        let parsed = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        };
        if parsed.is_none() {
            self.fail(field, format!("The {field} field must be a number."));
        }
        parsed
    }

    fn required_number(&mut self, field: &str) -> Option<f64> {
        let value = self.required(field)?;
        self.number(field, value)
    }

    fn optional_number(&mut self, field: &str) -> Option<f64> {
        let value = self.present(field)?;
        self.number(field, value)
    }

    fn min_number(&mut self, field: &str, value: Option<f64>, min: f64) {
        if value.is_some_and(|n| n < min) {
            self.fail(field, format!("The {field} field must be at least {min}."));
        }
    }

    fn integer(&mut self, field: &str, value: &Value) -> Option<i64> {
        let parsed = match value {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.fail(field, format!("The {field} field must be an integer."));
        }
        parsed
    }

    fn required_integer(&mut self, field: &str) -> Option<i64> {
        let value = self.required(field)?;
        self.integer(field, value)
    }

    fn optional_integer(&mut self, field: &str) -> Option<i64> {
        let value = self.present(field)?;
        self.integer(field, value)
    }

    fn between(&mut self, field: &str, value: Option<i64>, min: i64, max: i64) {
        match value {
            Some(n) if n < min => {
                self.fail(field, format!("The {field} field must be at least {min}."))
            }
            Some(n) if n > max => self.fail(
                field,
                format!("The {field} field must not be greater than {max}."),
            ),
            _ => {}
        }
    }

    fn boolean(&mut self, field: &str, value: &Value) -> Option<bool> {
        let parsed = match value {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(text) => match text.as_str() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.fail(field, format!("The {field} field must be true or false."));
        }
        parsed
    }

    fn required_boolean(&mut self, field: &str) -> Option<bool> {
        let value = self.required(field)?;
        self.boolean(field, value)
    }

    fn optional_boolean(&mut self, field: &str) -> Option<bool> {
        let value = self.present(field)?;
        self.boolean(field, value)
    }

    fn parse_enum<T: FromStr>(&mut self, field: &str, value: &Value) -> Option<T> {
        let parsed = value.as_str().and_then(|text| text.parse::<T>().ok());
        if parsed.is_none() {
            self.fail(field, format!("The selected {field} is invalid."));
        }
        parsed
    }

    fn required_enum<T: FromStr>(&mut self, field: &str) -> Option<T> {
        let value = self.required(field)?;
        self.parse_enum(field, value)
    }

    fn optional_enum<T: FromStr>(&mut self, field: &str) -> Option<T> {
        let value = self.present(field)?;
        self.parse_enum(field, value)
    }

    fn optional_structured(&mut self, field: &str) -> Option<Value> {
        let value = self.present(field)?;
        if value.is_array() || value.is_object() {
            Some(value.clone())
        } else {
            self.fail(field, format!("The {field} field must be an array."));
            None
        }
    }
}

fn display_field(record: &MappedRecord, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "N/A".to_string(),
        Some(other) => other.to_string(),
    }
}

fn log_validation_errors(record: &MappedRecord, errors: &FieldErrors) {
    let context = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "product_id": display_field(record, "id"),
        "slug": display_field(record, "slug"),
        "errors": errors,
        "raw_data": record,
    });
    log::error!(target: "import_errors", "product validation failed: {}", context);
}
