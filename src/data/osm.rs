use std::collections::HashMap;

pub type OsmId = u64;
pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub id: OsmId,
    pub lon: f64,
    pub lat: f64,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Way {
    pub id: OsmId,
    pub node_ids: Vec<OsmId>,
    pub tags: Tags,
}

impl Way {
    pub fn is_closed(&self) -> bool {
        self.node_ids.len() > 1 && self.node_ids.first() == self.node_ids.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub member_type: MemberType,
    pub id: OsmId,
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    pub id: OsmId,
    pub members: Vec<Member>,
    pub tags: Tags,
}

/// Tag lookups shared by every element type.
pub trait Tagged {
    fn tags(&self) -> &Tags;

    fn has_kv_pair(&self, key: &str, value: &str) -> bool {
        self.tags().get(key).is_some_and(|tag_value| tag_value == value)
    }

    /// The tag value, treating empty strings as absent.
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags()
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl Tagged for Node {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Tagged for Way {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Tagged for Relation {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}
