use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::data::osm::Tagged;
use crate::data::poi::PoiFeature;

pub const UNNAMED_POI: &str = "Unnamed POI";

/// Marker group a POI is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoiCategory {
    Attraction,
    Cafe,
    Park,
    Other,
}

impl PoiCategory {
    /// Cluster layers are created in this order.
    pub const ALL: [PoiCategory; 4] = [
        PoiCategory::Attraction,
        PoiCategory::Cafe,
        PoiCategory::Park,
        PoiCategory::Other,
    ];

    pub fn cluster_name(&self) -> &'static str {
        match self {
            PoiCategory::Attraction => "Attractions",
            PoiCategory::Cafe => "Cafes",
            PoiCategory::Park => "Parks",
            PoiCategory::Other => "Other",
        }
    }

    pub fn icon_color(&self) -> &'static str {
        match self {
            PoiCategory::Attraction => "red",
            PoiCategory::Cafe => "green",
            PoiCategory::Park => "lightgreen",
            PoiCategory::Other => "blue",
        }
    }

    /// Font Awesome icon name.
    pub fn icon_name(&self) -> &'static str {
        match self {
            PoiCategory::Attraction => "star",
            PoiCategory::Cafe => "coffee",
            PoiCategory::Park => "tree",
            PoiCategory::Other => "info",
        }
    }
}

pub struct CategoryRule {
    pub key: &'static str,
    pub value: &'static str,
    pub category: PoiCategory,
}

/// Classification rules; the first matching rule wins, no match means `Other`.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule { key: "tourism", value: "attraction", category: PoiCategory::Attraction },
    CategoryRule { key: "amenity", value: "cafe", category: PoiCategory::Cafe },
    CategoryRule { key: "leisure", value: "park", category: PoiCategory::Park },
];

/// Tags consulted, in order, for the human-readable type of a POI.
pub const TYPE_TAG_KEYS: &[&str] = &["tourism", "amenity", "leisure", "shop"];

pub fn classify(feature: &impl Tagged) -> PoiCategory {
    CATEGORY_RULES
        .iter()
        .find(|rule| feature.has_kv_pair(rule.key, rule.value))
        .map_or(PoiCategory::Other, |rule| rule.category)
}

/// `"ice_cream"` becomes `"Ice Cream"`: underscores to spaces, then every run of
/// letters is capitalized and the rest lowercased.
pub fn humanize(value: &str) -> String {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let re = WORD.get_or_init(|| Regex::new(r"\p{L}+").expect("static regex"));
    let spaced = value.replace('_', " ");
    re.replace_all(&spaced, |caps: &Captures| {
        let mut chars = caps[0].chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>(),
            None => String::new(),
        }
    })
    .into_owned()
}

/// Human type from the first populated tag in `TYPE_TAG_KEYS`.
pub fn type_label(feature: &impl Tagged) -> Option<String> {
    TYPE_TAG_KEYS
        .iter()
        .find_map(|key| feature.tag(key))
        .map(humanize)
}

/// Popup label: the name, then the type on its own line when there is one.
pub fn popup_label(feature: &PoiFeature) -> String {
    let name = feature.name().unwrap_or(UNNAMED_POI);
    match type_label(feature) {
        Some(kind) => format!("{name}\nType: {kind}"),
        None => name.to_string(),
    }
}
