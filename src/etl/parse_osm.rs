use std::collections::HashMap;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::data::osm::{Member, MemberType, Node, OsmId, Relation, Tags, Way};
use crate::data::OsmMapData;
use crate::errors::{Error, Result};

enum ParserState {
    Top,
    Node(Node),
    Way(Way),
    Relation(Relation),
    Remark(String),
}

/// Streaming parser for Overpass XML (`[out:xml]`) responses.
struct OverpassParser {
    state: ParserState,
    data: OsmMapData,
    node_slots: HashMap<OsmId, usize>,
}

impl OverpassParser {
    fn new() -> Self {
        OverpassParser {
            state: ParserState::Top,
            data: OsmMapData::default(),
            node_slots: HashMap::new(),
        }
    }

    fn attribute(el: &BytesStart, name: &[u8]) -> Result<Option<String>> {
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            if attribute.key.as_ref() == name {
                return Ok(Some(attribute.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    fn required(el: &BytesStart, name: &[u8]) -> Result<String> {
        Self::attribute(el, name)?.ok_or_else(|| {
            Error::from(format!(
                "Missing attribute '{}' on <{}>",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(el.name().as_ref()),
            ))
        })
    }

    fn parse_id(el: &BytesStart, name: &[u8]) -> Result<OsmId> {
        Ok(Self::required(el, name)?.parse()?)
    }

    fn parse_node(el: &BytesStart) -> Result<Node> {
        Ok(Node {
            id: Self::parse_id(el, b"id")?,
            lat: Self::required(el, b"lat")?.parse()?,
            lon: Self::required(el, b"lon")?.parse()?,
            tags: Tags::new(),
        })
    }

    fn parse_member(el: &BytesStart) -> Result<Member> {
        let member_type = match Self::required(el, b"type")?.as_str() {
            "node" => MemberType::Node,
            "way" => MemberType::Way,
            "relation" => MemberType::Relation,
            other => return Err(format!("Unknown relation member type '{other}'").into()),
        };
        Ok(Member {
            member_type,
            id: Self::parse_id(el, b"ref")?,
            role: Self::attribute(el, b"role")?.unwrap_or_default(),
        })
    }

    /// A node printed twice (tagged body, then skeleton) keeps its first tags.
    fn push_node(&mut self, node: Node) {
        match self.node_slots.get(&node.id) {
            Some(&slot) => {
                let existing = &mut self.data.nodes[slot];
                if existing.tags.is_empty() {
                    existing.tags = node.tags;
                }
            }
            None => {
                self.node_slots.insert(node.id, self.data.nodes.len());
                self.data.nodes.push(node);
            }
        }
    }

    fn current_tags(&mut self) -> Option<&mut Tags> {
        match &mut self.state {
            ParserState::Node(node) => Some(&mut node.tags),
            ParserState::Way(way) => Some(&mut way.tags),
            ParserState::Relation(relation) => Some(&mut relation.tags),
            _ => None,
        }
    }

    fn start(&mut self, el: &BytesStart) -> Result<()> {
        match el.name().as_ref() {
            b"node" => self.state = ParserState::Node(Self::parse_node(el)?),
            b"way" => {
                self.state = ParserState::Way(Way {
                    id: Self::parse_id(el, b"id")?,
                    ..Default::default()
                })
            }
            b"relation" => {
                self.state = ParserState::Relation(Relation {
                    id: Self::parse_id(el, b"id")?,
                    ..Default::default()
                })
            }
            b"remark" => self.state = ParserState::Remark(String::new()),
            _ => (),
        }
        Ok(())
    }

    fn empty(&mut self, el: &BytesStart) -> Result<()> {
        match el.name().as_ref() {
            b"node" => self.push_node(Self::parse_node(el)?),
            b"way" => self.data.ways.push(Way {
                id: Self::parse_id(el, b"id")?,
                ..Default::default()
            }),
            b"relation" => self.data.relations.push(Relation {
                id: Self::parse_id(el, b"id")?,
                ..Default::default()
            }),
            b"tag" => {
                let key = Self::required(el, b"k")?;
                let value = Self::required(el, b"v")?;
                if let Some(tags) = self.current_tags() {
                    tags.insert(key, value);
                }
            }
            b"nd" => {
                let id = Self::parse_id(el, b"ref")?;
                if let ParserState::Way(way) = &mut self.state {
                    way.node_ids.push(id);
                }
            }
            b"member" => {
                let member = Self::parse_member(el)?;
                if let ParserState::Relation(relation) = &mut self.state {
                    relation.members.push(member);
                }
            }
            _ => (),
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> Result<()> {
        if !matches!(name, b"node" | b"way" | b"relation" | b"remark") {
            return Ok(());
        }
        match std::mem::replace(&mut self.state, ParserState::Top) {
            ParserState::Node(node) => self.push_node(node),
            ParserState::Way(way) => self.data.ways.push(way),
            ParserState::Relation(relation) => self.data.relations.push(relation),
            ParserState::Remark(text) => {
                if text.contains("error") {
                    return Err(format!("Overpass API reported: {}", text.trim()).into());
                }
                warn!(remark = text.trim(); "Overpass API remark");
            }
            ParserState::Top => (),
        }
        Ok(())
    }

    fn parse(mut self, xml: &str) -> Result<OsmMapData> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        loop {
            match reader.read_event()? {
                Event::Eof => break,
                Event::Start(e) => self.start(&e)?,
                Event::Empty(e) => self.empty(&e)?,
                Event::End(e) => self.end(e.name().as_ref())?,
                Event::Text(e) => {
                    if let ParserState::Remark(text) = &mut self.state {
                        text.push_str(&e.unescape()?);
                    }
                }
                _ => (),
            }
        }
        Ok(self.data)
    }
}

pub fn parse_overpass_xml(xml: &str) -> Result<OsmMapData> {
    OverpassParser::new().parse(xml)
}
