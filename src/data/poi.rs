use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::data::geometry::{ring_contains, stitch_rings, Geometry, MapCoords, Path, Ring};
use crate::data::osm::{MemberType, Node, OsmId, Relation, Tagged, Tags, Way};
use crate::data::OsmMapData;
use crate::errors::{Error, Result};

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[archive(check_bytes)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

/// One geotagged OSM feature. The geometry is absent when it could not be assembled.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct PoiFeature {
    pub kind: ElementKind,
    pub id: OsmId,
    pub geometry: Option<Geometry>,
    pub tags: Tags,
}

impl PoiFeature {
    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }
}

impl Tagged for PoiFeature {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct PoiCollection {
    pub features: Vec<PoiFeature>,
}

impl PoiCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PoiFeature> {
        self.features.iter()
    }

    /// Collects every element matching `filter`, in document order, with its geometry.
    pub fn from_osm(data: &OsmMapData, filter: &TagFilter) -> Self {
        let nodes = data.node_index();
        let ways = data.way_index();
        let coords_of = |way: &Way| -> Option<Path> {
            way.node_ids
                .iter()
                .map(|id| nodes.get(id).map(|node| MapCoords::new(node.lat, node.lon)))
                .collect()
        };

        let mut features = Vec::new();
        for node in data.nodes.iter().filter(|node| filter.matches(&node.tags)) {
            features.push(node_feature(node));
        }
        for way in data.ways.iter().filter(|way| filter.matches(&way.tags)) {
            features.push(PoiFeature {
                kind: ElementKind::Way,
                id: way.id,
                geometry: coords_of(way).map(|path| way_geometry(way, path)),
                tags: way.tags.clone(),
            });
        }
        for relation in data.relations.iter().filter(|relation| filter.matches(&relation.tags)) {
            if !relation.has_kv_pair("type", "multipolygon") {
                continue;
            }
            let member_paths = |role: &str| -> Option<Vec<Path>> {
                relation
                    .members
                    .iter()
                    .filter(|m| m.member_type == MemberType::Way && member_role(&m.role) == role)
                    .map(|m| ways.get(&m.id).and_then(|way| coords_of(*way)))
                    .collect()
            };
            let geometry = member_paths("outer")
                .zip(member_paths("inner"))
                .and_then(|(outer, inner)| multipolygon_geometry(relation, &outer, &inner).ok());
            features.push(PoiFeature {
                kind: ElementKind::Relation,
                id: relation.id,
                geometry,
                tags: relation.tags.clone(),
            });
        }
        PoiCollection { features }
    }
}

fn node_feature(node: &Node) -> PoiFeature {
    PoiFeature {
        kind: ElementKind::Node,
        id: node.id,
        geometry: Some(Geometry::Point(MapCoords::new(node.lat, node.lon))),
        tags: node.tags.clone(),
    }
}

fn member_role(role: &str) -> &str {
    match role {
        "inner" => "inner",
        _ => "outer",
    }
}

enum PolygonRule {
    All,
    Passlist(&'static [&'static str]),
    Blocklist(&'static [&'static str]),
}

/// Keys that make a closed way an area, per the OSM wiki's polygon features list.
const POLYGON_FEATURES: &[(&str, PolygonRule)] = &[
    ("aeroway", PolygonRule::Blocklist(&["taxiway"])),
    ("amenity", PolygonRule::All),
    ("area:highway", PolygonRule::All),
    ("barrier", PolygonRule::Passlist(&["city_wall", "ditch", "hedge", "retaining_wall", "spikes"])),
    ("boundary", PolygonRule::All),
    ("building", PolygonRule::All),
    ("building:part", PolygonRule::All),
    ("craft", PolygonRule::All),
    ("golf", PolygonRule::All),
    ("highway", PolygonRule::Passlist(&["services", "rest_area", "escape", "elevator"])),
    ("historic", PolygonRule::All),
    ("indoor", PolygonRule::All),
    ("landuse", PolygonRule::All),
    ("leisure", PolygonRule::All),
    ("man_made", PolygonRule::Blocklist(&["cutline", "embankment", "pipeline"])),
    ("military", PolygonRule::All),
    ("natural", PolygonRule::Blocklist(&["coastline", "cliff", "ridge", "arete", "tree_row"])),
    ("office", PolygonRule::All),
    ("place", PolygonRule::All),
    ("power", PolygonRule::Passlist(&["plant", "substation", "generator", "transformer"])),
    ("public_transport", PolygonRule::All),
    ("railway", PolygonRule::Passlist(&["station", "turntable", "roundhouse", "platform"])),
    ("ruins", PolygonRule::All),
    ("shop", PolygonRule::All),
    ("tourism", PolygonRule::All),
    ("waterway", PolygonRule::Passlist(&["riverbank", "dock", "boatyard", "dam"])),
];

fn is_area(way: &Way) -> bool {
    if !way.is_closed() || way.node_ids.len() < 4 || way.has_kv_pair("area", "no") {
        return false;
    }
    if way.has_kv_pair("area", "yes") {
        return true;
    }
    POLYGON_FEATURES.iter().any(|(key, rule)| match (way.tag(key), rule) {
        (None, _) => false,
        (Some(_), PolygonRule::All) => true,
        (Some(value), PolygonRule::Passlist(values)) => values.contains(&value),
        (Some(value), PolygonRule::Blocklist(values)) => !values.contains(&value),
    })
}

fn way_geometry(way: &Way, path: Path) -> Geometry {
    if is_area(way) {
        Geometry::Polygon(vec![path])
    } else {
        Geometry::LineString(path)
    }
}

fn multipolygon_geometry(relation: &Relation, outer: &[Path], inner: &[Path]) -> Result<Geometry> {
    let outer_rings = stitch_rings(outer)?;
    if outer_rings.is_empty() {
        return Err(format!("Relation {} has no outer ring", relation.id).into());
    }
    let mut polygons: Vec<Vec<Ring>> = outer_rings.into_iter().map(|ring| vec![ring]).collect();
    for hole in stitch_rings(inner)? {
        let Some(probe) = hole.first() else { continue };
        if let Some(polygon) = polygons.iter_mut().find(|rings| ring_contains(&rings[0], probe)) {
            polygon.push(hole);
        }
    }
    if polygons.len() == 1 {
        Ok(Geometry::Polygon(polygons.remove(0)))
    } else {
        Ok(Geometry::MultiPolygon(polygons))
    }
}

/// Accepted values for one tag key.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    /// `true` accepts any value of the key.
    Present(bool),
    One(String),
    Many(Vec<String>),
}

impl TagValue {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            TagValue::Present(present) => *present,
            TagValue::One(expected) => expected == value,
            TagValue::Many(expected) => expected.iter().any(|e| e == value),
        }
    }
}

/// How the per-key conditions of a filter combine.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyCombination {
    /// Every key must match.
    #[default]
    All,
    /// Any key may match.
    Any,
}

impl KeyCombination {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCombination::All => "all",
            KeyCombination::Any => "any",
        }
    }
}

/// OSM tag filter: values of one key are OR-ed, keys combine per `combine`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TagFilter {
    pub tags: BTreeMap<String, TagValue>,
    #[serde(default)]
    pub combine: KeyCombination,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: TagValue) -> Self {
        self.tags.insert(key.to_string(), value);
        self
    }

    pub fn one(self, key: &str, value: &str) -> Self {
        self.with(key, TagValue::One(value.to_string()))
    }

    pub fn many(self, key: &str, values: &[&str]) -> Self {
        self.with(key, TagValue::Many(values.iter().map(|v| v.to_string()).collect()))
    }

    pub fn combined_with(mut self, combine: KeyCombination) -> Self {
        self.combine = combine;
        self
    }

    /// Rejects filters that could never select anything.
    pub fn validate(&self) -> Result<()> {
        if self.tags.is_empty() {
            return Err(Error::invalid_argument("Malformed tag filter: no tags given"));
        }
        for (key, value) in &self.tags {
            let malformed = key.trim().is_empty()
                || match value {
                    TagValue::Present(present) => !present,
                    TagValue::One(v) => v.is_empty(),
                    TagValue::Many(values) => values.is_empty() || values.iter().any(String::is_empty),
                };
            if malformed {
                return Err(Error::invalid_argument(format!("Malformed tag filter entry for key '{key}'")));
            }
        }
        Ok(())
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        if tags.is_empty() || self.tags.is_empty() {
            return false;
        }
        let mut checks = self
            .tags
            .iter()
            .map(|(key, accepted)| tags.get(key).is_some_and(|value| accepted.accepts(value)));
        match self.combine {
            KeyCombination::All => checks.all(|ok| ok),
            KeyCombination::Any => checks.any(|ok| ok),
        }
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .tags
            .iter()
            .map(|(key, value)| match value {
                TagValue::Present(_) => key.clone(),
                TagValue::One(v) => format!("{key}={v}"),
                TagValue::Many(values) => format!("{key}={}", values.join("|")),
            })
            .collect();
        let separator = match self.combine {
            KeyCombination::All => " & ",
            KeyCombination::Any => " | ",
        };
        f.write_str(&parts.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::osm::Member;
    use crate::errors::ErrorKind;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn node(id: OsmId, lat: f64, lon: f64, pairs: &[(&str, &str)]) -> Node {
        Node { id, lat, lon, tags: tags(pairs) }
    }

    fn way(id: OsmId, node_ids: &[OsmId], pairs: &[(&str, &str)]) -> Way {
        Way { id, node_ids: node_ids.to_vec(), tags: tags(pairs) }
    }

    fn member(id: OsmId, role: &str) -> Member {
        Member { member_type: MemberType::Way, id, role: role.to_string() }
    }

    fn square_nodes() -> Vec<Node> {
        vec![
            node(1, 0.0, 0.0, &[]),
            node(2, 0.0, 1.0, &[]),
            node(3, 1.0, 1.0, &[]),
            node(4, 1.0, 0.0, &[]),
        ]
    }

    #[test]
    fn all_combination_requires_every_key() {
        let filter = TagFilter::new().one("amenity", "cafe").many("cuisine", &["coffee_shop", "cake"]);
        assert!(filter.matches(&tags(&[("amenity", "cafe"), ("cuisine", "cake")])));
        assert!(!filter.matches(&tags(&[("amenity", "cafe")])));
    }

    #[test]
    fn any_combination_is_a_union() {
        let filter = TagFilter::new()
            .many("tourism", &["attraction", "museum"])
            .one("leisure", "park")
            .combined_with(KeyCombination::Any);
        assert!(filter.matches(&tags(&[("leisure", "park")])));
        assert!(filter.matches(&tags(&[("tourism", "museum")])));
        assert!(!filter.matches(&tags(&[("tourism", "hotel")])));
    }

    #[test]
    fn present_value_accepts_any_value() {
        let filter = TagFilter::new().with("shop", TagValue::Present(true));
        assert!(filter.matches(&tags(&[("shop", "bakery")])));
    }

    #[test]
    fn malformed_filters_are_invalid_arguments() {
        assert_eq!(TagFilter::new().validate().unwrap_err().kind, ErrorKind::InvalidArgument);
        let empty_list = TagFilter::new().many("amenity", &[]);
        assert_eq!(empty_list.validate().unwrap_err().kind, ErrorKind::InvalidArgument);
        assert!(TagFilter::new().one("amenity", "cafe").validate().is_ok());
    }

    #[test]
    fn filter_deserializes_single_values_and_lists() {
        let filter: TagFilter = serde_json::from_str(
            r#"{"tags": {"tourism": ["attraction", "museum"], "leisure": "park", "shop": true}, "combine": "any"}"#,
        )
        .unwrap();
        assert_eq!(filter.combine, KeyCombination::Any);
        assert_eq!(filter.tags["leisure"], TagValue::One("park".to_string()));
        assert_eq!(filter.tags["shop"], TagValue::Present(true));
        assert_eq!(filter.to_string(), "leisure=park | shop | tourism=attraction|museum");
    }

    #[test]
    fn assembles_points_polygons_and_lines() {
        let mut nodes = square_nodes();
        nodes.push(node(5, 0.5, 0.5, &[("tourism", "attraction"), ("name", "Castle")]));
        let data = OsmMapData {
            nodes,
            ways: vec![
                way(10, &[1, 2, 3, 4, 1], &[("leisure", "park")]),
                way(11, &[1, 2, 3], &[("leisure", "track")]),
            ],
            relations: vec![],
        };
        let filter = TagFilter::new()
            .with("leisure", TagValue::Present(true))
            .one("tourism", "attraction")
            .combined_with(KeyCombination::Any);
        let pois = PoiCollection::from_osm(&data, &filter);
        assert_eq!(pois.len(), 3);
        assert_eq!(pois.features[0].name(), Some("Castle"));
        assert_eq!(pois.features[0].geometry.as_ref().map(Geometry::geom_type), Some("Point"));
        assert_eq!(pois.features[1].geometry.as_ref().map(Geometry::geom_type), Some("Polygon"));
        assert_eq!(pois.features[2].geometry.as_ref().map(Geometry::geom_type), Some("LineString"));
    }

    #[test]
    fn ways_with_missing_nodes_have_no_geometry() {
        let data = OsmMapData {
            nodes: square_nodes(),
            ways: vec![way(10, &[1, 2, 99, 1], &[("amenity", "cafe")])],
            relations: vec![],
        };
        let pois = PoiCollection::from_osm(&data, &TagFilter::new().one("amenity", "cafe"));
        assert_eq!(pois.len(), 1);
        assert!(pois.features[0].geometry.is_none());
    }

    #[test]
    fn multipolygon_relations_become_polygons() {
        let data = OsmMapData {
            nodes: square_nodes(),
            ways: vec![way(20, &[1, 2, 3], &[]), way(21, &[3, 4, 1], &[])],
            relations: vec![Relation {
                id: 30,
                members: vec![member(20, "outer"), member(21, "")],
                tags: tags(&[("type", "multipolygon"), ("leisure", "park")]),
            }],
        };
        let pois = PoiCollection::from_osm(&data, &TagFilter::new().one("leisure", "park"));
        assert_eq!(pois.len(), 1);
        let centroid = pois.features[0].geometry.as_ref().unwrap().centroid().unwrap();
        assert!((centroid.lat - 0.5).abs() < 1e-12);
        assert!((centroid.lon - 0.5).abs() < 1e-12);
    }
}
