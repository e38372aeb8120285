//! Filterable dimensions of a tag, in canonical order.

use serde::{Deserialize, Serialize};

use crate::model::UserTag;

string_enum! {
    /// A filterable dimension. Declaration order is the canonical order.
    pub enum Dimension as "dimension" {
        Origin => "origin",
        BrandId => "brand_id",
        CategoryId => "category_id",
    }
}

/// Optional value for each dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl Dimensions {
    /// Dimensions carried by a tag; empty strings count as absent.
    pub fn of_tag(tag: &UserTag) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Self {
            origin: non_empty(&tag.origin),
            brand_id: non_empty(&tag.product.brand_id),
            category_id: non_empty(&tag.product.category_id),
        }
    }

    pub fn get(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Origin => self.origin.as_deref(),
            Dimension::BrandId => self.brand_id.as_deref(),
            Dimension::CategoryId => self.category_id.as_deref(),
        }
    }

    /// Present dimensions in canonical order.
    pub fn present(&self) -> Vec<(Dimension, &str)> {
        Dimension::ALL
            .iter()
            .filter_map(|dimension| self.get(*dimension).map(|value| (*dimension, value)))
            .collect()
    }
}
