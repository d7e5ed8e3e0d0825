//! Attribute inference rules
//!
//! Each attribute is inferred by walking an ordered table of rules over the
//! upper-cased caption text of a cell. The first rule that produces a value
//! wins; when none does, a default derived from the product index is used so
//! repeated runs over the same document give the same catalog.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Luminaire family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    Downlight,
    Spotlight,
    Tracklight,
}

impl ProductType {
    /// Cycle order used by index-derived defaults
    pub const ALL: [ProductType; 3] = [
        ProductType::Downlight,
        ProductType::Spotlight,
        ProductType::Tracklight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Downlight => "DOWNLIGHT",
            ProductType::Spotlight => "SPOTLIGHT",
            ProductType::Tracklight => "TRACKLIGHT",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred categorical attributes of one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Categories {
    pub product_type: ProductType,
    pub watt: String,
    pub cct: String,
    pub ip: String,
}

/// One entry of an ordered rule table
pub struct Rule<T> {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<T>,
}

impl<T> Rule<T> {
    pub fn apply(&self, text: &str) -> Option<T> {
        (self.extract)(text)
    }
}

/// First rule in `rules` that matches `text`, with the rule's name
pub fn first_match<T>(rules: &[Rule<T>], text: &str) -> Option<(&'static str, T)> {
    rules
        .iter()
        .find_map(|rule| rule.apply(text).map(|value| (rule.name, value)))
}

static WATT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*W").unwrap());
static CCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d{4})\s*K").unwrap());
static IP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IP\s*(\d{2})").unwrap());

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

// Product type

fn spot_keywords(text: &str) -> Option<ProductType> {
    contains_any(text, &["SPOT", "스팟"]).then_some(ProductType::Spotlight)
}

fn track_keywords(text: &str) -> Option<ProductType> {
    contains_any(text, &["TRACK", "트랙", "레일"]).then_some(ProductType::Tracklight)
}

fn down_keywords(text: &str) -> Option<ProductType> {
    contains_any(text, &["DOWN", "다운", "매입"]).then_some(ProductType::Downlight)
}

fn ceiling_keywords(text: &str) -> Option<ProductType> {
    contains_any(text, &["다운라이트", "천장"]).then_some(ProductType::Downlight)
}

fn point_keywords(text: &str) -> Option<ProductType> {
    contains_any(text, &["포인트", "POINT"]).then_some(ProductType::Spotlight)
}

pub static PRODUCT_TYPE_RULES: &[Rule<ProductType>] = &[
    Rule {
        name: "spot",
        extract: spot_keywords,
    },
    Rule {
        name: "track",
        extract: track_keywords,
    },
    Rule {
        name: "down",
        extract: down_keywords,
    },
    Rule {
        name: "ceiling",
        extract: ceiling_keywords,
    },
    Rule {
        name: "point",
        extract: point_keywords,
    },
];

// Wattage

fn watt_value(text: &str) -> Option<String> {
    WATT.captures(text).map(|c| format!("{}W", &c[1]))
}

/// Digits directly before `W`; a model prefix such as `AR111-` is ignored
pub static WATT_RULES: &[Rule<String>] = &[Rule {
    name: "watt",
    extract: watt_value,
}];

// Colour temperature

fn cct_value(text: &str) -> Option<String> {
    CCT.captures(text).map(|c| format!("{}K", &c[1]))
}

fn cct_words(text: &str) -> Option<String> {
    let kelvin = if contains_any(text, &["전구색", "WARM"]) {
        3000
    } else if contains_any(text, &["주광색", "DAYLIGHT"]) {
        6500
    } else if contains_any(text, &["자연색", "NATURAL"]) {
        4000
    } else {
        return None;
    };
    Some(format!("{}K", kelvin))
}

pub static CCT_RULES: &[Rule<String>] = &[
    Rule {
        name: "cct",
        extract: cct_value,
    },
    Rule {
        name: "cct-words",
        extract: cct_words,
    },
];

// Ingress protection

fn ip_value(text: &str) -> Option<String> {
    IP.captures(text).map(|c| format!("IP{}", &c[1]))
}

fn ip_words(text: &str) -> Option<String> {
    if contains_any(text, &["실외", "OUTDOOR", "방수"]) {
        Some("IP65".to_string())
    } else if contains_any(text, &["실내", "INDOOR"]) {
        Some("IP20".to_string())
    } else {
        None
    }
}

pub static IP_RULES: &[Rule<String>] = &[
    Rule {
        name: "ip",
        extract: ip_value,
    },
    Rule {
        name: "ip-words",
        extract: ip_words,
    },
];

// Index-derived defaults

pub fn default_product_type(index: usize) -> ProductType {
    ProductType::ALL[index % 3]
}

pub fn default_watt(index: usize) -> String {
    format!("{}W", 5 + index % 10)
}

pub fn default_cct(index: usize) -> String {
    format!("{}K", 2700 + (index % 3) * 1000)
}

pub fn default_ip(index: usize) -> String {
    let ip = if index % 2 == 0 { "IP20" } else { "IP44" };
    ip.to_string()
}

/// Infer all categories from caption text; matching is case-insensitive
pub fn infer_categories(text: &str, index: usize) -> Categories {
    let text = text.to_uppercase();
    Categories {
        product_type: first_match(PRODUCT_TYPE_RULES, &text)
            .map(|(_, v)| v)
            .unwrap_or_else(|| default_product_type(index)),
        watt: first_match(WATT_RULES, &text)
            .map(|(_, v)| v)
            .unwrap_or_else(|| default_watt(index)),
        cct: first_match(CCT_RULES, &text)
            .map(|(_, v)| v)
            .unwrap_or_else(|| default_cct(index)),
        ip: first_match(IP_RULES, &text)
            .map(|(_, v)| v)
            .unwrap_or_else(|| default_ip(index)),
    }
}
