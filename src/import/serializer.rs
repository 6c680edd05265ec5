//! Storage encoding for the opaque JSON-valued product fields.

use crate::models::Product;
use serde_json::Value;

/// JSON text for each structured field; `None` stays SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedJsonFields {
    pub colors: Option<String>,
    pub all_prices: Option<String>,
    pub technical_specs: Option<String>,
    pub user_info: Option<String>,
}

pub fn serialize_json_fields(product: &Product) -> Result<EncodedJsonFields, serde_json::Error> {
    Ok(EncodedJsonFields {
        colors: encode(product.colors.as_ref())?,
        all_prices: encode(product.all_prices.as_ref())?,
        technical_specs: encode(product.technical_specs.as_ref())?,
        user_info: encode(product.user_info.as_ref())?,
    })
}

fn encode(value: Option<&Value>) -> Result<Option<String>, serde_json::Error> {
    value.map(serde_json::to_string).transpose()
}

/// Inverse of the encoding, used when reading rows back.
pub fn decode_json_field(raw: Option<String>) -> Result<Option<Value>, serde_json::Error> {
    raw.as_deref().map(serde_json::from_str).transpose()
}
