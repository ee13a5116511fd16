use std::collections::HashMap;

use self::osm::{Node, OsmId, Relation, Way};

pub mod geometry;
pub mod network;
pub mod osm;
pub mod poi;

/// Map data as returned by the Overpass API. Elements keep their document order,
/// nothing is discarded.
#[derive(Debug, Default, Clone)]
pub struct OsmMapData {
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
}

impl OsmMapData {
    pub fn node_index(&self) -> HashMap<OsmId, &Node> {
        self.nodes.iter().map(|node| (node.id, node)).collect()
    }

    pub fn way_index(&self) -> HashMap<OsmId, &Way> {
        self.ways.iter().map(|way| (way.id, way)).collect()
    }
}
