use std::path::Path;

use log::{error, info, warn};

use crate::cache;
use crate::data::poi::{KeyCombination, PoiCollection, TagFilter, TagValue};
use crate::errors::{Error, Result};
use crate::etl::parse_osm::parse_overpass_xml;
use crate::etl::{Etl, PoiSource};
use crate::overpass::{AreaId, OsmClient};

pub const ETL_NAME: &str = "points_of_interest";

fn quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn key_condition(key: &str, value: &TagValue) -> String {
    let key = quote(key);
    match value {
        TagValue::Present(_) => format!(r#"["{key}"]"#),
        TagValue::One(v) => format!(r#"["{key}"="{}"]"#, quote(v)),
        TagValue::Many(values) => {
            let alternatives: Vec<String> = values.iter().map(|v| quote(&regex::escape(v))).collect();
            format!(r#"["{key}"~"^({})$"]"#, alternatives.join("|"))
        }
    }
}

/// Overpass QL selecting nodes, ways and relations matching `tags` inside an area.
pub fn poi_query(area: AreaId, tags: &TagFilter, timeout_secs: u64) -> String {
    let conditions: Vec<String> = tags
        .tags
        .iter()
        .map(|(key, value)| key_condition(key, value))
        .collect();
    let groups = match tags.combine {
        KeyCombination::All => vec![conditions.concat()],
        KeyCombination::Any => conditions,
    };
    let statements: String = groups
        .iter()
        .flat_map(|group| {
            ["node", "way", "relation"]
                .into_iter()
                .map(move |element| format!("{element}{group}(area.searchArea);"))
        })
        .collect();
    format!(
        "[out:xml][timeout:{timeout_secs}];area({})->.searchArea;({statements});out body;>;out skel qt;",
        area.0
    )
}

pub struct PoiEtl<'a> {
    client: &'a OsmClient,
    place: &'a str,
    tags: &'a TagFilter,
}

impl<'a> PoiEtl<'a> {
    pub fn new(client: &'a OsmClient, place: &'a str, tags: &'a TagFilter) -> PoiEtl<'a> {
        PoiEtl { client, place, tags }
    }
}

impl Etl for PoiEtl<'_> {
    type Input = String;
    type Output = PoiCollection;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}",
            cache::slug(self.place),
            cache::slug(&self.tags.to_string()),
            self.tags.combine.as_str()
        )
    }

    fn read_cached(&mut self, dir: &Path) -> Result<Self::Output> {
        let bytes = cache::read_compressed(&self.cache_path(dir))?;
        rkyv::from_bytes::<PoiCollection>(&bytes)
            .map_err(|_| Error::from("Could not deserialize points of interest cache."))
    }

    fn extract(&mut self) -> Result<Self::Input> {
        let area = self.client.geocode_area(self.place)?;
        self.client
            .query(&poi_query(area, self.tags, self.client.timeout_secs()))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let data = parse_overpass_xml(&input)?;
        Ok(PoiCollection::from_osm(&data, self.tags))
    }

    fn load(&mut self, dir: &Path, output: &Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 1024>(output)
            .map_err(|_| Error::from("Could not serialize points of interest."))?;
        cache::write_compressed(&self.cache_path(dir), &bytes)
    }
}

/// Downloads the features of `place` matching `tags`.
///
/// A malformed filter is an invalid argument. A failed download and an empty result
/// are both lookup failures, with different messages.
pub fn get_points_of_interest(
    source: &mut impl PoiSource,
    place: &str,
    tags: &TagFilter,
) -> Result<PoiCollection> {
    let filter = tags.to_string();
    info!(place = place, tags = filter.as_str(); "Downloading Points of Interest");
    tags.validate()?;

    let pois = source.fetch_pois(place, tags).map_err(|err| {
        error!(place = place, tags = filter.as_str(), err = err.message.as_str(); "Error downloading POIs");
        Error::lookup(format!(
            "Could not retrieve POIs for '{place}' ({}). Check tags or place name.",
            err.message
        ))
    })?;
    info!(count = pois.len(); "Found POIs of various types");

    if pois.is_empty() {
        warn!(place = place, tags = filter.as_str(); "No POIs found with the given tags");
        return Err(Error::lookup(format!("No POIs found for '{place}' with the specified tags.")));
    }
    Ok(pois)
}
