use serde::Serialize;
use serde_json::Value;

use crate::data::geometry::MapCoords;
use crate::map::classify::PoiCategory;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub name: String,
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl TileLayer {
    pub fn openstreetmap() -> Self {
        TileLayer {
            name: "OpenStreetMap".to_string(),
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors"
                .to_string(),
            max_zoom: 19,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PathStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
}

/// Hover text showing one feature property under a caption.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub field: String,
    pub alias: String,
}

/// A styled GeoJSON overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonLayer {
    pub name: String,
    pub data: Value,
    pub style: PathStyle,
    pub tooltip: Option<Tooltip>,
}

impl GeoJsonLayer {
    pub fn feature_count(&self) -> usize {
        self.data["features"].as_array().map_or(0, Vec::len)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Icon {
    pub color: String,
    pub name: String,
    /// Icon font prefix, `fa` for Font Awesome.
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    /// Plain text; lines are separated by `\n`.
    pub text: String,
    pub max_width: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub location: MapCoords,
    pub popup: Popup,
    pub icon: Icon,
}

/// Marker group that merges nearby markers until zoomed in.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerCluster {
    pub name: String,
    pub category: PoiCategory,
    /// Add markers in chunks so large groups do not block the page.
    pub chunked_loading: bool,
    pub markers: Vec<Marker>,
}

impl MarkerCluster {
    pub fn new(category: PoiCategory) -> Self {
        MarkerCluster {
            name: category.cluster_name().to_string(),
            category,
            chunked_loading: true,
            markers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerControl {
    pub layers: Vec<String>,
}

/// A composed interactive map, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDocument {
    pub center: MapCoords,
    pub zoom: u8,
    pub tiles: TileLayer,
    pub network: GeoJsonLayer,
    pub clusters: Vec<MarkerCluster>,
    pub layer_control: LayerControl,
}

impl MapDocument {
    pub fn marker_count(&self) -> usize {
        self.clusters.iter().map(|cluster| cluster.markers.len()).sum()
    }
}
