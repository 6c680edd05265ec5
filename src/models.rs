use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ProductStatus {
    pub const ALL: [ProductStatus; 3] = [
        ProductStatus::Draft,
        ProductStatus::Published,
        ProductStatus::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Published => "published",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProductStatus::Draft => "Draft",
            ProductStatus::Published => "Published",
            ProductStatus::Archived => "Archived",
        }
    }

    pub fn is_published(self) -> bool {
        matches!(self, ProductStatus::Published)
    }

    pub fn is_draft(self) -> bool {
        matches!(self, ProductStatus::Draft)
    }

    pub fn is_archived(self) -> bool {
        matches!(self, ProductStatus::Archived)
    }
}

impl FromStr for ProductStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ProductStatus::Draft),
            "published" => Ok(ProductStatus::Published),
            "archived" => Ok(ProductStatus::Archived),
            other => Err(UnknownVariant {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductCondition {
    New,
    Used,
    Refurbished,
}

impl ProductCondition {
    pub const ALL: [ProductCondition; 3] = [
        ProductCondition::New,
        ProductCondition::Used,
        ProductCondition::Refurbished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductCondition::New => "new",
            ProductCondition::Used => "used",
            ProductCondition::Refurbished => "refurbished",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProductCondition::New => "New",
            ProductCondition::Used => "Used",
            ProductCondition::Refurbished => "Refurbished",
        }
    }
}

impl FromStr for ProductCondition {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "new" => Ok(ProductCondition::New),
            "used" => Ok(ProductCondition::Used),
            "refurbished" => Ok(ProductCondition::Refurbished),
            other => Err(UnknownVariant {
                kind: "condition",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Sale,
    Rent,
}

impl ProductType {
    pub const ALL: [ProductType; 2] = [ProductType::Sale, ProductType::Rent];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Sale => "sale",
            ProductType::Rent => "rent",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProductType::Sale => "For Sale",
            ProductType::Rent => "For Rent",
        }
    }

    pub fn is_sale(self) -> bool {
        matches!(self, ProductType::Sale)
    }

    pub fn is_rent(self) -> bool {
        matches!(self, ProductType::Rent)
    }
}

impl FromStr for ProductType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sale" => Ok(ProductType::Sale),
            "rent" => Ok(ProductType::Rent),
            other => Err(UnknownVariant {
                kind: "type",
                value: other.to_string(),
            }),
        }
    }
}

/// Validated product, one row of the `products` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: Option<String>,

    pub price: f64,
    pub old_price: Option<f64>,
    pub discount_percentage: Option<i16>,

    pub quantity: i32,
    pub in_stock: bool,

    pub image_cover: Option<String>,
    pub image_thumbnail: Option<String>,

    pub container_type: Option<String>,
    pub container_size: Option<String>,
    pub production_year: Option<i16>,
    pub condition: Option<ProductCondition>,

    pub location_city: Option<String>,
    pub location_district: Option<String>,
    pub location_country: Option<String>,

    #[serde(rename = "type")]
    pub product_type: Option<ProductType>,
    pub is_new: bool,
    pub is_hot_sale: bool,
    pub is_featured: bool,
    pub is_bulk_sale: bool,
    pub accept_offers: bool,
    pub status: ProductStatus,

    pub colors: Option<Value>,
    pub all_prices: Option<Value>,
    pub technical_specs: Option<Value>,
    pub user_info: Option<Value>,
}

impl Product {
    pub fn has_discount(&self) -> bool {
        self.old_price.is_some_and(|old| old > self.price)
    }

    /// Discount derived from the old price when the source did not send one.
    pub fn effective_discount_percentage(&self) -> Option<i16> {
        if self.discount_percentage.is_some() {
            return self.discount_percentage;
        }
        let old = self.old_price.filter(|_| self.has_discount())?;
        Some((((old - self.price) / old) * 100.0).round() as i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_their_wire_names() {
        for status in ProductStatus::ALL {
            assert_eq!(status.as_str().parse::<ProductStatus>(), Ok(status));
        }
        for condition in ProductCondition::ALL {
            assert_eq!(condition.as_str().parse::<ProductCondition>(), Ok(condition));
        }
        for kind in ProductType::ALL {
            assert_eq!(kind.as_str().parse::<ProductType>(), Ok(kind));
        }
        assert!("Published".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(ProductType::Rent.label(), "For Rent");
        assert_eq!(ProductCondition::Refurbished.label(), "Refurbished");
        assert!(ProductStatus::Archived.is_archived());
        assert!(!ProductStatus::Draft.is_published());
    }
}
