use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

/// One product exactly as the upstream API delivered it.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    products: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    current_page: Option<u32>,
    last_page: Option<u32>,
    last_page_url: Option<String>,
    total: Option<u64>,
}

/// A single page of products together with its pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    pub records: Vec<RawRecord>,
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
}

impl PageResponse {
    pub fn new(records: Vec<RawRecord>, current_page: u32, last_page: u32, total: u64) -> Self {
        Self {
            records,
            current_page,
            last_page,
            total,
        }
    }

    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        Ok(Self::from_envelope(envelope))
    }

    fn from_envelope(envelope: Envelope) -> Self {
        let data = envelope.data.unwrap_or_default();
        let pagination = data.pagination.unwrap_or_default();

        // Non-object entries cannot be mapped to anything; keep only objects.
        let records: Vec<RawRecord> = data
            .products
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                other => {
                    log::warn!("skipping non-object product entry: {}", other);
                    None
                }
            })
            .collect();

        let current_page = pagination.current_page.unwrap_or(1).max(1);
        let last_page = resolve_last_page(&pagination).max(1);
        let total = pagination.total.unwrap_or(records.len() as u64);

        Self {
            records,
            current_page,
            last_page,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn is_last_page(&self) -> bool {
        self.current_page >= self.last_page
    }
}

/// The explicit `last_page` wins. The page parameter of `last_page_url` and the
/// raw `total` are legacy fallbacks; `total` counts items rather than pages, so
/// using it is logged.
fn resolve_last_page(pagination: &Pagination) -> u32 {
    if let Some(last_page) = pagination.last_page {
        return last_page;
    }

    if let Some(page) = pagination
        .last_page_url
        .as_deref()
        .and_then(page_from_url)
    {
        return page;
    }

    if let Some(total) = pagination.total {
        log::warn!(
            "pagination has no last_page or last_page_url, falling back to total ({})",
            total
        );
        return u32::try_from(total).unwrap_or(u32::MAX);
    }

    1
}

fn page_from_url(raw: &str) -> Option<u32> {
    let url = Url::parse(raw)
        .or_else(|_| Url::parse("http://placeholder.invalid/").and_then(|base| base.join(raw)))
        .ok()?;

    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> PageResponse {
        PageResponse::from_json(value.to_string().as_bytes()).expect("valid envelope")
    }

    #[test]
    fn explicit_last_page_is_the_source_of_truth() {
        let page = parse(json!({
            "data": {
                "pagination": {
                    "current_page": 2,
                    "last_page": 7,
                    "last_page_url": "https://api.test/products?page=9",
                    "total": 140
                },
                "products": [{"id": "a"}, {"id": "b"}]
            }
        }));

        assert_eq!(page.current_page, 2);
        assert_eq!(page.last_page, 7);
        assert_eq!(page.total, 140);
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more_pages());
    }

    #[test]
    fn last_page_url_is_used_when_last_page_missing() {
        let page = parse(json!({
            "data": {
                "pagination": {
                    "current_page": 1,
                    "last_page_url": "https://api.test/products?sort=asc&page=12",
                    "total": 240
                },
                "products": []
            }
        }));
        assert_eq!(page.last_page, 12);

        let relative = parse(json!({
            "data": {"pagination": {"last_page_url": "/products?page=3"}, "products": []}
        }));
        assert_eq!(relative.last_page, 3);
    }

    #[test]
    fn total_is_the_last_resort() {
        let page = parse(json!({
            "data": {"pagination": {"current_page": 1, "total": 4}, "products": []}
        }));
        assert_eq!(page.last_page, 4);
    }

    #[test]
    fn missing_metadata_defaults_to_a_single_page() {
        let page = parse(json!({"data": {"products": [{"id": "x"}, 5]}}));
        assert_eq!(page.current_page, 1);
        assert_eq!(page.last_page, 1);
        assert_eq!(page.total, 1);
        assert_eq!(page.records.len(), 1);
        assert!(page.is_last_page());
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(PageResponse::from_json(b"<html>").is_err());
    }
}
