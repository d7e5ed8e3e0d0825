//! Catalog document
//!
//! The aggregate handed to the site generator: filter settings derived from
//! every assembled product, plus the products keyed `product_<i>` in
//! assembly order. Built once after all pages are done, since the category
//! value sets need the whole document.

use crate::product::ProductRecord;
use crate::rules::ProductType;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// Filter definition for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySetting {
    pub label: String,
    /// Distinct observed values, sorted ascending as strings
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySettings {
    pub product_type: CategorySetting,
    pub watt: CategorySetting,
    pub cct: CategorySetting,
    pub ip: CategorySetting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSettings {
    pub categories: CategorySettings,
    pub table_columns: Vec<TableColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogDocument {
    pub settings: CatalogSettings,
    #[serde(serialize_with = "serialize_products")]
    products: Vec<ProductRecord>,
}

const TABLE_COLUMNS: [(&str, &str); 6] = [
    ("model", "모델명"),
    ("watt", "소비전력"),
    ("voltage", "전압"),
    ("cct", "색온도"),
    ("cri", "연색성"),
    ("ip", "방수등급"),
];

/// Key of the product at position `i` in the products map
pub fn product_key(i: usize) -> String {
    format!("product_{}", i)
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    values.cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

fn setting(label: &str, values: Vec<String>) -> CategorySetting {
    CategorySetting {
        label: label.to_string(),
        values,
    }
}

/// Build the catalog from the complete, ordered product list
pub fn build_catalog(products: Vec<ProductRecord>) -> CatalogDocument {
    let product_types = std::iter::once("ALL".to_string())
        .chain(ProductType::ALL.iter().map(|t| t.as_str().to_string()))
        .collect();

    let categories = CategorySettings {
        product_type: setting("제품 타입", product_types),
        watt: setting(
            "소비전력",
            distinct_sorted(products.iter().map(|p| &p.categories.watt)),
        ),
        cct: setting(
            "색온도",
            distinct_sorted(products.iter().map(|p| &p.categories.cct)),
        ),
        ip: setting(
            "방수등급",
            distinct_sorted(products.iter().map(|p| &p.categories.ip)),
        ),
    };

    let table_columns = TABLE_COLUMNS
        .iter()
        .map(|(id, label)| TableColumn {
            id: id.to_string(),
            label: label.to_string(),
        })
        .collect();

    CatalogDocument {
        settings: CatalogSettings {
            categories,
            table_columns,
        },
        products,
    }
}

impl CatalogDocument {
    /// Products in assembly order
    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    /// Look up a product by its map key (`product_<i>`)
    pub fn get(&self, key: &str) -> Option<&ProductRecord> {
        let i: usize = key.strip_prefix("product_")?.parse().ok()?;
        self.products.get(i)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Number of distinct image data URIs across all products
    pub fn image_count(&self) -> usize {
        self.products
            .iter()
            .flat_map(|p| std::iter::once(&p.thumbnail).chain(p.detail_images.iter()))
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_products<S: Serializer>(
    products: &[ProductRecord],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(products.len()))?;
    for (i, product) in products.iter().enumerate() {
        map.serialize_entry(&product_key(i), product)?;
    }
    map.end()
}
