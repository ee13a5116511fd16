use std::collections::HashMap;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::data::geometry::{Geometry, MapCoords};
use crate::data::network::{calculate_graph_centroid, StreetNetwork};
use crate::data::poi::{PoiCollection, PoiFeature};
use crate::errors::Result;
use crate::map::classify::{classify, popup_label, PoiCategory, UNNAMED_POI};
use crate::map::document::{
    GeoJsonLayer, Icon, LayerControl, MapDocument, Marker, MarkerCluster, PathStyle, Popup, TileLayer, Tooltip,
};

pub const DEFAULT_ZOOM: u8 = 14;
pub const NETWORK_LAYER_NAME: &str = "Street Network";
const NETWORK_COLOR: &str = "#8b0000";
const POPUP_MAX_WIDTH: u32 = 300;

/// Edges as a GeoJSON FeatureCollection of LineStrings.
pub fn network_geojson(graph: &StreetNetwork) -> Value {
    let features: Vec<Value> = graph
        .edges
        .iter()
        .map(|edge| {
            let coordinates: Vec<[f64; 2]> = edge.geometry.iter().map(|c| [c.lon, c.lat]).collect();
            json!({
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates },
                "properties": {
                    "u": edge.u,
                    "v": edge.v,
                    "key": edge.key,
                    "osmid": edge.osmid,
                    "name": edge.name,
                    "highway": edge.highway,
                    "oneway": edge.oneway,
                    "length": edge.length,
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

fn network_layer(graph: &StreetNetwork) -> GeoJsonLayer {
    GeoJsonLayer {
        name: NETWORK_LAYER_NAME.to_string(),
        data: network_geojson(graph),
        style: PathStyle {
            color: NETWORK_COLOR.to_string(),
            weight: 2.0,
            opacity: 0.7,
        },
        tooltip: Some(Tooltip {
            field: "name".to_string(),
            alias: "Street Name:".to_string(),
        }),
    }
}

/// Where a feature's marker goes: the point itself, or the centroid of an area.
/// `None` for absent geometry and for geometry kinds that get no marker.
fn representative_point(feature: &PoiFeature) -> Option<Result<MapCoords>> {
    match feature.geometry.as_ref()? {
        Geometry::Point(coords) => Some(Ok(*coords)),
        area @ (Geometry::Polygon(_) | Geometry::MultiPolygon(_)) => Some(area.centroid()),
        Geometry::LineString(_) => None,
    }
}

fn marker_for(feature: &PoiFeature, location: MapCoords) -> Result<(PoiCategory, Marker)> {
    if !location.is_finite() {
        return Err(format!("Non-finite location ({}, {})", location.lat, location.lon).into());
    }
    let category = classify(feature);
    let marker = Marker {
        location,
        popup: Popup {
            text: popup_label(feature),
            max_width: POPUP_MAX_WIDTH,
        },
        icon: Icon {
            color: category.icon_color().to_string(),
            name: category.icon_name().to_string(),
            prefix: "fa".to_string(),
        },
    };
    Ok((category, marker))
}

/// Composes the base map, the street network layer and clustered POI markers.
///
/// Fails only when the graph has no nodes. A POI whose geometry is absent, of an
/// unsupported kind or malformed is skipped.
pub fn create_interactive_map(
    graph: &StreetNetwork,
    pois: &PoiCollection,
    location_name: &str,
    initial_zoom: u8,
) -> Result<MapDocument> {
    info!(location = location_name; "Creating interactive map");

    let center = calculate_graph_centroid(graph)?;
    info!(lat = center.lat, lon = center.lon; "Map will be centered at graph centroid");

    let tiles = TileLayer::openstreetmap();
    let network = network_layer(graph);
    info!(features = network.feature_count(); "Added street network to map");

    info!(count = pois.len(); "Adding Points of Interest to map");
    let mut clusters: HashMap<PoiCategory, MarkerCluster> = PoiCategory::ALL
        .iter()
        .map(|category| (*category, MarkerCluster::new(*category)))
        .collect();

    let mut skipped = 0usize;
    for feature in tqdm::tqdm(pois.iter()) {
        let name = feature.name().unwrap_or(UNNAMED_POI);
        let Some(location) = representative_point(feature) else {
            let geometry = feature.geometry.as_ref().map_or("none", Geometry::geom_type);
            debug!(poi = name, id = feature.id, geometry = geometry; "Skipping POI without point or area geometry");
            skipped += 1;
            continue;
        };
        match location.and_then(|location| marker_for(feature, location)) {
            Ok((category, marker)) => {
                if let Some(cluster) = clusters.get_mut(&category) {
                    cluster.markers.push(marker);
                }
            }
            Err(err) => {
                warn!(poi = name, id = feature.id, err = err.message.as_str(); "Skipping POI due to geometry error");
                skipped += 1;
            }
        }
    }

    let clusters: Vec<MarkerCluster> = PoiCategory::ALL
        .iter()
        .filter_map(|category| clusters.remove(category))
        .collect();
    let layer_control = LayerControl {
        layers: [tiles.name.clone(), network.name.clone()]
            .into_iter()
            .chain(clusters.iter().map(|cluster| cluster.name.clone()))
            .collect(),
    };

    info!(
        markers = clusters.iter().map(|c| c.markers.len()).sum::<usize>(),
        skipped = skipped;
        "Interactive map created successfully"
    );
    Ok(MapDocument {
        center,
        zoom: initial_zoom,
        tiles,
        network,
        clusters,
        layer_control,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::geometry::Ring;
    use crate::data::network::NetworkEdge;
    use crate::data::osm::Tags;
    use crate::data::poi::ElementKind;
    use crate::errors::ErrorKind;

    fn graph() -> StreetNetwork {
        let mut graph = StreetNetwork::new();
        graph.add_node(1, 20.0, 10.0);
        graph.add_node(2, 30.0, 20.0);
        graph.add_node(3, 40.0, 30.0);
        graph.edges.push(NetworkEdge {
            u: 1,
            v: 2,
            key: 0,
            osmid: 100,
            name: Some("Getreidegasse".to_string()),
            highway: Some("pedestrian".to_string()),
            oneway: false,
            reversed: false,
            length: 1.0,
            geometry: vec![MapCoords::new(10.0, 20.0), MapCoords::new(20.0, 30.0)],
        });
        graph
    }

    fn feature(id: u64, geometry: Option<Geometry>, pairs: &[(&str, &str)]) -> PoiFeature {
        PoiFeature {
            kind: ElementKind::Node,
            id,
            geometry,
            tags: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Tags>(),
        }
    }

    fn point(lat: f64, lon: f64) -> Option<Geometry> {
        Some(Geometry::Point(MapCoords::new(lat, lon)))
    }

    fn square() -> Ring {
        vec![
            MapCoords::new(0.0, 0.0),
            MapCoords::new(0.0, 2.0),
            MapCoords::new(2.0, 2.0),
            MapCoords::new(2.0, 0.0),
            MapCoords::new(0.0, 0.0),
        ]
    }

    fn markers(document: &MapDocument, category: PoiCategory) -> &[Marker] {
        &document.clusters.iter().find(|cluster| cluster.category == category).unwrap().markers
    }

    #[test]
    fn castle_and_malformed_record() {
        let pois = PoiCollection {
            features: vec![
                feature(1, point(47.8, 13.04), &[("tourism", "attraction"), ("name", "Castle")]),
                feature(2, None, &[]),
            ],
        };
        let document = create_interactive_map(&graph(), &pois, "Salzburg", DEFAULT_ZOOM).unwrap();
        assert_eq!(document.marker_count(), 1);
        let attractions = markers(&document, PoiCategory::Attraction);
        assert_eq!(attractions.len(), 1);
        assert_eq!(attractions[0].popup.text, "Castle\nType: Attraction");
        assert_eq!(attractions[0].icon.color, "red");
        assert_eq!(attractions[0].icon.name, "star");
    }

    #[test]
    fn centered_on_node_mean() {
        let document = create_interactive_map(&graph(), &PoiCollection::default(), "x", 12).unwrap();
        assert!((document.center.lat - 20.0).abs() < 1e-12);
        assert!((document.center.lon - 30.0).abs() < 1e-12);
        assert_eq!(document.zoom, 12);
    }

    #[test]
    fn empty_graph_fails_fast() {
        let err = create_interactive_map(&StreetNetwork::new(), &PoiCollection::default(), "x", 14).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn polygons_are_placed_at_their_centroid() {
        let pois = PoiCollection {
            features: vec![feature(1, Some(Geometry::Polygon(vec![square()])), &[("leisure", "park")])],
        };
        let document = create_interactive_map(&graph(), &pois, "x", 14).unwrap();
        let parks = markers(&document, PoiCategory::Park);
        assert_eq!(parks[0].location, MapCoords::new(1.0, 1.0));
        assert_eq!(parks[0].icon.color, "lightgreen");
    }

    #[test]
    fn unsupported_and_broken_geometry_is_skipped() {
        let degenerate = vec![
            MapCoords::new(0.0, 0.0),
            MapCoords::new(0.0, 1.0),
            MapCoords::new(0.0, 0.0),
        ];
        let pois = PoiCollection {
            features: vec![
                feature(1, Some(Geometry::LineString(square())), &[("amenity", "cafe")]),
                feature(2, Some(Geometry::Polygon(vec![degenerate])), &[("amenity", "cafe")]),
                feature(3, Some(Geometry::MultiPolygon(vec![])), &[("amenity", "cafe")]),
                feature(4, point(f64::NAN, 13.0), &[("amenity", "cafe")]),
                feature(5, point(47.8, 13.0), &[("amenity", "cafe"), ("name", "Tomaselli")]),
            ],
        };
        let document = create_interactive_map(&graph(), &pois, "x", 14).unwrap();
        assert_eq!(document.marker_count(), 1);
        assert_eq!(markers(&document, PoiCategory::Cafe)[0].popup.text, "Tomaselli\nType: Cafe");
    }

    #[test]
    fn four_clusters_and_layer_control() {
        let document = create_interactive_map(&graph(), &PoiCollection::default(), "x", 14).unwrap();
        let names: Vec<&str> = document.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Attractions", "Cafes", "Parks", "Other"]);
        assert!(document.clusters.iter().all(|c| c.chunked_loading));
        assert_eq!(
            document.layer_control.layers,
            vec!["OpenStreetMap", "Street Network", "Attractions", "Cafes", "Parks", "Other"]
        );
    }

    #[test]
    fn network_layer_is_styled_with_street_names() {
        let document = create_interactive_map(&graph(), &PoiCollection::default(), "x", 14).unwrap();
        assert_eq!(document.network.feature_count(), 1);
        assert_eq!(document.network.style.color, "#8b0000");
        assert_eq!(document.network.style.weight, 2.0);
        assert_eq!(document.network.style.opacity, 0.7);
        let feature = &document.network.data["features"][0];
        assert_eq!(feature["properties"]["name"], "Getreidegasse");
        assert_eq!(feature["geometry"]["coordinates"][0][0], 20.0);
    }

    #[test]
    fn building_twice_is_idempotent() {
        let pois = PoiCollection {
            features: vec![
                feature(1, point(47.8, 13.04), &[("tourism", "attraction")]),
                feature(2, point(47.8, 13.05), &[("amenity", "cafe")]),
                feature(3, point(47.8, 13.06), &[("shop", "bakery")]),
            ],
        };
        let graph = graph();
        let first = create_interactive_map(&graph, &pois, "x", 14).unwrap();
        let second = create_interactive_map(&graph, &pois, "x", 14).unwrap();
        assert_eq!(first.center, second.center);
        for category in PoiCategory::ALL {
            assert_eq!(markers(&first, category).len(), markers(&second, category).len());
        }
        assert_eq!(markers(&first, PoiCategory::Other).len(), 1);
    }
}
