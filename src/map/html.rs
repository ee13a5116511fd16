use std::fs;
use std::path::Path;

use log::info;
use quick_xml::escape::escape;
use serde::Serialize;

use crate::errors::Result;
use crate::map::document::{Icon, MapDocument, PathStyle, TileLayer, Tooltip};

const LEAFLET_VERSION: &str = "1.9.4";
const MARKERCLUSTER_VERSION: &str = "1.5.3";
const AWESOME_MARKERS_VERSION: &str = "2.0.2";
const FONT_AWESOME_VERSION: &str = "4.7.0";
const PAGE_TITLE: &str = "Interactive Map";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{title}}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{{leaflet}}/dist/leaflet.css">
<link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@{{markercluster}}/dist/MarkerCluster.css">
<link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@{{markercluster}}/dist/MarkerCluster.Default.css">
<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/Leaflet.awesome-markers/{{awesome}}/leaflet.awesome-markers.css">
<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/{{fontawesome}}/css/font-awesome.min.css">
<script src="https://unpkg.com/leaflet@{{leaflet}}/dist/leaflet.js"></script>
<script src="https://unpkg.com/leaflet.markercluster@{{markercluster}}/dist/leaflet.markercluster.js"></script>
<script src="https://cdnjs.cloudflare.com/ajax/libs/Leaflet.awesome-markers/{{awesome}}/leaflet.awesome-markers.js"></script>
<style>html, body, #map { width: 100%; height: 100%; margin: 0; padding: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const view = {{view}};
const map = L.map("map", { center: view.center, zoom: view.zoom });
const tiles = L.tileLayer(view.tiles.url_template, {
  attribution: view.tiles.attribution,
  maxZoom: view.tiles.max_zoom,
}).addTo(map);
const network = L.geoJSON(view.network.data, {
  style: () => view.network.style,
  onEachFeature: (feature, layer) => {
    const tooltip = view.network.tooltip;
    const value = tooltip && feature.properties[tooltip.field];
    if (value) {
      const text = document.createElement("span");
      text.textContent = tooltip.alias + " " + value;
      layer.bindTooltip(text, { sticky: true });
    }
  },
}).addTo(map);
const layers = { [view.tiles.name]: tiles, [view.network.name]: network };
for (const cluster of view.clusters) {
  const group = L.markerClusterGroup({ chunkedLoading: cluster.chunked_loading });
  for (const marker of cluster.markers) {
    const icon = L.AwesomeMarkers.icon({
      icon: marker.icon.name,
      markerColor: marker.icon.color,
      prefix: marker.icon.prefix,
    });
    L.marker(marker.location, { icon: icon })
      .bindPopup(marker.popup_html, { maxWidth: marker.max_width })
      .addTo(group);
  }
  group.addTo(map);
  layers[cluster.name] = group;
}
const baseLayers = {};
const overlays = {};
for (const name of view.layer_control) {
  if (name === view.tiles.name) {
    baseLayers[name] = tiles;
  } else if (layers[name]) {
    overlays[name] = layers[name];
  }
}
L.control.layers(baseLayers, overlays).addTo(map);
</script>
</body>
</html>
"#;

#[derive(Serialize)]
struct MarkerView<'a> {
    location: [f64; 2],
    popup_html: String,
    max_width: u32,
    icon: &'a Icon,
}

#[derive(Serialize)]
struct ClusterView<'a> {
    name: &'a str,
    chunked_loading: bool,
    markers: Vec<MarkerView<'a>>,
}

#[derive(Serialize)]
struct NetworkView<'a> {
    name: &'a str,
    data: &'a serde_json::Value,
    style: &'a PathStyle,
    tooltip: Option<&'a Tooltip>,
}

#[derive(Serialize)]
struct MapView<'a> {
    center: [f64; 2],
    zoom: u8,
    tiles: &'a TileLayer,
    network: NetworkView<'a>,
    clusters: Vec<ClusterView<'a>>,
    layer_control: &'a [String],
}

/// Escapes every line of a plain-text popup and joins them with line breaks.
pub fn popup_html(text: &str) -> String {
    text.lines().map(|line| escape(line).into_owned()).collect::<Vec<_>>().join("<br>")
}

/// JSON that can sit inside a `<script>` element without closing it.
fn script_safe_json(value: &impl Serialize) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

impl MapDocument {
    fn view(&self) -> MapView<'_> {
        MapView {
            center: [self.center.lat, self.center.lon],
            zoom: self.zoom,
            tiles: &self.tiles,
            network: NetworkView {
                name: &self.network.name,
                data: &self.network.data,
                style: &self.network.style,
                tooltip: self.network.tooltip.as_ref(),
            },
            clusters: self
                .clusters
                .iter()
                .map(|cluster| ClusterView {
                    name: &cluster.name,
                    chunked_loading: cluster.chunked_loading,
                    markers: cluster
                        .markers
                        .iter()
                        .map(|marker| MarkerView {
                            location: [marker.location.lat, marker.location.lon],
                            popup_html: popup_html(&marker.popup.text),
                            max_width: marker.popup.max_width,
                            icon: &marker.icon,
                        })
                        .collect(),
                })
                .collect(),
            layer_control: &self.layer_control.layers,
        }
    }

    /// Self-contained page loading Leaflet and its plugins from public CDNs.
    pub fn to_html(&self) -> Result<String> {
        let view = script_safe_json(&self.view())?;
        Ok(TEMPLATE
            .replace("{{title}}", PAGE_TITLE)
            .replace("{{leaflet}}", LEAFLET_VERSION)
            .replace("{{markercluster}}", MARKERCLUSTER_VERSION)
            .replace("{{awesome}}", AWESOME_MARKERS_VERSION)
            .replace("{{fontawesome}}", FONT_AWESOME_VERSION)
            .replace("{{view}}", &view))
    }

    /// Writes the page to `path`, creating missing parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let html = self.to_html()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, html)?;
        info!(path = path.to_string_lossy().as_ref(), markers = self.marker_count(); "Map saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::geometry::MapCoords;
    use crate::map::classify::PoiCategory;
    use crate::map::document::{GeoJsonLayer, LayerControl, Marker, MarkerCluster, Popup};

    fn document(popup: &str) -> MapDocument {
        let mut cafes = MarkerCluster::new(PoiCategory::Cafe);
        cafes.markers.push(Marker {
            location: MapCoords::new(47.8, 13.04),
            popup: Popup {
                text: popup.to_string(),
                max_width: 300,
            },
            icon: Icon {
                color: "green".to_string(),
                name: "coffee".to_string(),
                prefix: "fa".to_string(),
            },
        });
        MapDocument {
            center: MapCoords::new(47.8, 13.04),
            zoom: 14,
            tiles: TileLayer::openstreetmap(),
            network: GeoJsonLayer {
                name: "Street Network".to_string(),
                data: serde_json::json!({ "type": "FeatureCollection", "features": [] }),
                style: PathStyle {
                    color: "#8b0000".to_string(),
                    weight: 2.0,
                    opacity: 0.7,
                },
                tooltip: None,
            },
            clusters: vec![cafes],
            layer_control: LayerControl {
                layers: vec!["OpenStreetMap".to_string(), "Street Network".to_string(), "Cafes".to_string()],
            },
        }
    }

    #[test]
    fn popup_lines_are_escaped_and_joined() {
        assert_eq!(popup_html("A & B\nType: Cafe"), "A &amp; B<br>Type: Cafe");
        assert_eq!(popup_html("<b>bold</b>"), "&lt;b&gt;bold&lt;/b&gt;");
    }

    #[test]
    fn page_embeds_clusters_and_libraries() {
        let html = document("Tomaselli\nType: Cafe").to_html().unwrap();
        assert!(html.contains("<title>Interactive Map</title>"));
        assert!(html.contains("leaflet@1.9.4/dist/leaflet.js"));
        assert!(html.contains("leaflet.markercluster@1.5.3"));
        assert!(html.contains(r#""name":"Cafes""#));
        assert!(html.contains(r#""chunked_loading":true"#));
        assert!(html.contains("Tomaselli<br>Type: Cafe"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn layer_control_order_is_embedded() {
        let html = document("Tomaselli").to_html().unwrap();
        assert!(html.contains(r#""layer_control":["OpenStreetMap","Street Network","Cafes"]"#));
    }

    #[test]
    fn script_content_cannot_close_the_tag() {
        let html = document("</script><script>alert(1)</script>").to_html().unwrap();
        assert_eq!(html.matches("</script>").count(), 4);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("map.html");
        document("Tomaselli").save(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("<!DOCTYPE html>"));
    }
}
