use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::data::geometry::{MapCoords, Path};
use crate::data::osm::{Node, OsmId, Tagged, Way};
use crate::data::OsmMapData;
use crate::errors::{Error, Result};

/// Travel mode the street network is downloaded for.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    #[default]
    Walk,
    Bike,
    Drive,
    DriveService,
    All,
    AllPrivate,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
            NetworkType::Drive => "drive",
            NetworkType::DriveService => "drive_service",
            NetworkType::All => "all",
            NetworkType::AllPrivate => "all_private",
        }
    }

    /// Overpass QL tag filter selecting the ways of this network.
    pub fn overpass_filter(&self) -> String {
        let filter = match self {
            NetworkType::Walk => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|bus_guideway|construction|cycleway|motor|no|planned|platform|proposed|raceway|razed"]"#,
                r#"["foot"!~"no"]["service"!~"private"]"#,
            ),
            NetworkType::Bike => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|bus_guideway|construction|corridor|elevator|escalator|footway|motor|no|planned|platform|proposed|raceway|razed|steps"]"#,
                r#"["bicycle"!~"no"]["service"!~"private"]"#,
            ),
            NetworkType::Drive => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|steps|track"]"#,
                r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
                r#"["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#,
            ),
            NetworkType::DriveService => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|steps|track"]"#,
                r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
                r#"["service"!~"emergency_access|parking|parking_aisle|private"]"#,
            ),
            NetworkType::All => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]"#,
                r#"["service"!~"private"]"#,
            ),
            NetworkType::AllPrivate => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]"#,
            ),
        };
        match self {
            NetworkType::AllPrivate => filter.to_string(),
            _ => format!(r#"{filter}["access"!~"private"]"#),
        }
    }

    /// Walking ignores one-way restrictions.
    pub fn is_bidirectional(&self) -> bool {
        matches!(self, NetworkType::Walk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    Forward,
    Backward,
}

impl Direction {
    fn of(way: &Way, network_type: NetworkType) -> Direction {
        if network_type.is_bidirectional() {
            return Direction::Both;
        }
        match way.tag("oneway") {
            Some("yes" | "true" | "1") => Direction::Forward,
            Some("-1" | "reverse") => Direction::Backward,
            _ if way.has_kv_pair("junction", "roundabout") => Direction::Forward,
            _ => Direction::Both,
        }
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct NetworkNode {
    pub id: OsmId,
    /// Longitude.
    pub x: f64,
    /// Latitude.
    pub y: f64,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct NetworkEdge {
    pub u: OsmId,
    pub v: OsmId,
    /// Distinguishes parallel edges between the same `u` and `v`.
    pub key: u32,
    pub osmid: OsmId,
    pub name: Option<String>,
    pub highway: Option<String>,
    pub oneway: bool,
    pub reversed: bool,
    /// Metres.
    pub length: f64,
    pub geometry: Path,
}

/// Parallel-edge counter per `(u, v)` pair while a network is built.
type EdgeKeys = HashMap<(OsmId, OsmId), u32>;

/// Directed multigraph of a street network.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
#[archive(check_bytes)]
pub struct StreetNetwork {
    pub nodes: HashMap<OsmId, NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

impl StreetNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: OsmId, x: f64, y: f64) {
        self.nodes.insert(id, NetworkNode { id, x, y });
    }

    /// Adds an edge under the next free key for its node pair.
    fn push_edge(&mut self, mut edge: NetworkEdge, keys: &mut EdgeKeys) {
        let next = keys.entry((edge.u, edge.v)).or_insert(0);
        edge.key = *next;
        *next += 1;
        self.edges.push(edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Builds a simplified network from raw OSM ways: graph nodes are way endpoints
    /// and nodes shared between ways, edges keep the intermediate geometry.
    pub fn from_osm(data: &OsmMapData, network_type: NetworkType, retain_all: bool) -> Result<Self> {
        let nodes = data.node_index();

        let mut usage: HashMap<OsmId, usize> = HashMap::new();
        let mut endpoints: HashSet<OsmId> = HashSet::new();
        for way in &data.ways {
            if let (Some(first), Some(last)) = (way.node_ids.first(), way.node_ids.last()) {
                endpoints.insert(*first);
                endpoints.insert(*last);
            }
            for id in &way.node_ids {
                *usage.entry(*id).or_insert(0) += 1;
            }
        }
        let is_graph_node = |id: &OsmId| endpoints.contains(id) || usage.get(id).is_some_and(|n| *n > 1);

        let mut network = StreetNetwork::new();
        let mut keys = EdgeKeys::new();
        for way in &data.ways {
            let ids: Vec<OsmId> = way
                .node_ids
                .iter()
                .copied()
                .filter(|id| nodes.contains_key(id))
                .collect();
            if ids.len() < 2 {
                continue;
            }
            let direction = Direction::of(way, network_type);
            let mut start = 0;
            for i in 1..ids.len() {
                if i == ids.len() - 1 || is_graph_node(&ids[i]) {
                    network.add_way_segment(way, &ids[start..=i], &nodes, direction, &mut keys);
                    start = i;
                }
            }
        }

        if network.nodes.is_empty() {
            return Err(Error::lookup("Found no graph nodes within the requested area"));
        }
        if !retain_all {
            network.retain_largest_component();
        }
        Ok(network)
    }

    fn add_way_segment(
        &mut self,
        way: &Way,
        segment: &[OsmId],
        nodes: &HashMap<OsmId, &Node>,
        direction: Direction,
        keys: &mut EdgeKeys,
    ) {
        let geometry: Path = segment
            .iter()
            .filter_map(|id| nodes.get(id))
            .map(|node| MapCoords::new(node.lat, node.lon))
            .collect();
        let length = geometry.windows(2).map(|pair| pair[0].haversine(&pair[1])).sum();
        let (u, v) = (segment[0], segment[segment.len() - 1]);
        for id in [u, v] {
            if let Some(node) = nodes.get(&id) {
                self.add_node(id, node.lon, node.lat);
            }
        }

        let edge = NetworkEdge {
            u,
            v,
            key: 0,
            osmid: way.id,
            name: way.tag("name").map(str::to_string),
            highway: way.tag("highway").map(str::to_string),
            oneway: direction != Direction::Both,
            reversed: false,
            length,
            geometry,
        };
        if direction != Direction::Backward {
            self.push_edge(edge.clone(), keys);
        }
        if direction != Direction::Forward {
            let mut reverse = edge;
            std::mem::swap(&mut reverse.u, &mut reverse.v);
            reverse.geometry.reverse();
            reverse.reversed = true;
            self.push_edge(reverse, keys);
        }
    }

    /// Drops every node and edge outside the largest weakly connected component.
    /// Ties go to the component holding the smallest node id.
    pub fn retain_largest_component(&mut self) {
        let mut parent: HashMap<OsmId, OsmId> = self.nodes.keys().map(|id| (*id, *id)).collect();

        fn find(parent: &mut HashMap<OsmId, OsmId>, id: OsmId) -> OsmId {
            let mut root = id;
            while let Some(next) = parent.get(&root).copied().filter(|next| *next != root) {
                root = next;
            }
            let mut current = id;
            while current != root {
                let next = parent.get(&current).copied().unwrap_or(root);
                parent.insert(current, root);
                current = next;
            }
            root
        }

        for edge in &self.edges {
            let (a, b) = (find(&mut parent, edge.u), find(&mut parent, edge.v));
            if a != b {
                parent.insert(a.max(b), a.min(b));
            }
        }

        let ids: Vec<OsmId> = self.nodes.keys().copied().collect();
        let mut components: HashMap<OsmId, (usize, OsmId)> = HashMap::new();
        for id in ids {
            let root = find(&mut parent, id);
            let entry = components.entry(root).or_insert((0, id));
            entry.0 += 1;
            entry.1 = entry.1.min(id);
        }
        let Some(largest) = components
            .iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
            .map(|(root, _)| *root)
        else {
            return;
        };

        let keep: HashSet<OsmId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| find(&mut parent, *id) == largest)
            .collect();
        self.nodes.retain(|id, _| keep.contains(id));
        self.edges.retain(|edge| keep.contains(&edge.u) && keep.contains(&edge.v));
    }
}

/// Map-centering point: the mean latitude and longitude over all graph nodes.
pub fn calculate_graph_centroid(graph: &StreetNetwork) -> Result<MapCoords> {
    if graph.nodes.is_empty() {
        return Err(Error::invalid_argument("Graph has no nodes to calculate a centroid."));
    }
    let count = graph.nodes.len() as f64;
    let (sum_y, sum_x) = graph
        .nodes
        .values()
        .fold((0.0, 0.0), |(y, x), node| (y + node.y, x + node.x));
    Ok(MapCoords::new(sum_y / count, sum_x / count))
}
