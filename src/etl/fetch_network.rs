use std::path::Path;

use log::{error, info};

use crate::cache;
use crate::data::network::{NetworkType, StreetNetwork};
use crate::errors::{Error, Result};
use crate::etl::parse_osm::parse_overpass_xml;
use crate::etl::{Etl, NetworkSource};
use crate::overpass::{AreaId, OsmClient};
use crate::FetchConfig;

pub const ETL_NAME: &str = "street_network";

/// Overpass QL selecting the ways of a network inside an area, plus their nodes.
pub fn network_query(area: AreaId, network_type: NetworkType, timeout_secs: u64) -> String {
    format!(
        "[out:xml][timeout:{timeout_secs}];area({})->.searchArea;(way{}(area.searchArea););out body;>;out skel qt;",
        area.0,
        network_type.overpass_filter(),
    )
}

pub struct NetworkEtl<'a> {
    config: &'a FetchConfig,
    client: &'a OsmClient,
    place: &'a str,
    network_type: NetworkType,
}

impl<'a> NetworkEtl<'a> {
    pub fn new(
        config: &'a FetchConfig,
        client: &'a OsmClient,
        place: &'a str,
        network_type: NetworkType,
    ) -> NetworkEtl<'a> {
        NetworkEtl {
            config,
            client,
            place,
            network_type,
        }
    }
}

impl Etl for NetworkEtl<'_> {
    type Input = String;
    type Output = StreetNetwork;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn cache_key(&self) -> String {
        let retain = if self.config.retain_all { "_all" } else { "" };
        format!("{}_{}{retain}", cache::slug(self.place), self.network_type.as_str())
    }

    fn read_cached(&mut self, dir: &Path) -> Result<Self::Output> {
        let bytes = cache::read_compressed(&self.cache_path(dir))?;
        rkyv::from_bytes::<StreetNetwork>(&bytes)
            .map_err(|_| Error::from("Could not deserialize street network cache."))
    }

    fn extract(&mut self) -> Result<Self::Input> {
        let area = self.client.geocode_area(self.place)?;
        self.client
            .query(&network_query(area, self.network_type, self.client.timeout_secs()))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let data = parse_overpass_xml(&input)?;
        StreetNetwork::from_osm(&data, self.network_type, self.config.retain_all)
    }

    fn load(&mut self, dir: &Path, output: &Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 1024>(output)
            .map_err(|_| Error::from("Could not serialize street network."))?;
        cache::write_compressed(&self.cache_path(dir), &bytes)
    }
}

/// Downloads the street network of `place`. Any failure is reported as a lookup
/// failure naming the place.
pub fn get_street_network(
    source: &mut impl NetworkSource,
    place: &str,
    network_type: NetworkType,
) -> Result<StreetNetwork> {
    info!(place = place, network_type = network_type.as_str(); "Downloading street network");
    match source.fetch_network(place, network_type) {
        Ok(graph) => {
            info!(nodes = graph.node_count(), edges = graph.edge_count(); "Street network graph created");
            Ok(graph)
        }
        Err(err) => {
            error!(place = place, err = err.message.as_str(); "Error downloading street network");
            Err(Error::lookup(format!(
                "Could not retrieve street network for '{place}' ({}). Check place name or network type.",
                err.message
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    struct FixtureSource(Option<StreetNetwork>);

    impl NetworkSource for FixtureSource {
        fn fetch_network(&mut self, _place: &str, _network_type: NetworkType) -> Result<StreetNetwork> {
            self.0.clone().ok_or_else(|| "connection refused".into())
        }
    }

    fn offline_config(cache_dir: &Path) -> FetchConfig {
        FetchConfig {
            cache_dir: cache_dir.to_string_lossy().into_owned(),
            nominatim_url: "http://127.0.0.1:9".to_string(),
            overpass_url: "http://127.0.0.1:9/api/interpreter".to_string(),
            timeout_secs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn query_targets_the_geocoded_area() {
        let query = network_query(AreaId(3_600_086_538), NetworkType::Walk, 180);
        assert!(query.starts_with("[out:xml][timeout:180];area(3600086538)->.searchArea;"));
        assert!(query.contains(r#"way["highway"]["area"!~"yes"]"#));
        assert!(query.ends_with("out body;>;out skel qt;"));
    }

    #[test]
    fn cache_keys_differ_for_non_latin_places() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let client = OsmClient::new(&config).unwrap();
        let moscow = NetworkEtl::new(&config, &client, "Москва", NetworkType::Walk).cache_key();
        let tokyo = NetworkEtl::new(&config, &client, "東京都", NetworkType::Walk).cache_key();
        assert_eq!(moscow, "москва_walk");
        assert_ne!(moscow, tokyo);
    }

    #[test]
    fn failures_become_lookup_errors_naming_the_place() {
        let err = get_street_network(&mut FixtureSource(None), "Atlantis", NetworkType::Walk).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lookup);
        assert!(err.message.contains("'Atlantis'"));
        assert!(err.message.contains("connection refused"));
    }

    #[test]
    fn fixture_network_passes_through() {
        let mut graph = StreetNetwork::new();
        graph.add_node(1, 13.04, 47.8);
        let fetched = get_street_network(&mut FixtureSource(Some(graph)), "Salzburg", NetworkType::Drive).unwrap();
        assert_eq!(fetched.node_count(), 1);
    }

    #[test]
    fn cached_network_is_used_without_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let client = OsmClient::new(&config).unwrap();
        let mut graph = StreetNetwork::new();
        graph.add_node(7, 13.05, 47.81);

        let mut etl = NetworkEtl::new(&config, &client, "Salzburg, Austria", NetworkType::Walk);
        etl.load(dir.path(), &graph).unwrap();
        assert!(etl.is_cached(dir.path()).unwrap());

        let cached = etl.process(Some(dir.path())).unwrap();
        assert_eq!(cached.node_count(), 1);
        assert_eq!(cached.nodes[&7].y, 47.81);
    }

    #[test]
    fn corrupt_cache_entry_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let client = OsmClient::new(&config).unwrap();
        let mut etl = NetworkEtl::new(&config, &client, "Salzburg, Austria", NetworkType::Walk);
        cache::write_compressed(&etl.cache_path(dir.path()), b"not an archive").unwrap();

        // The download then fails against the unreachable endpoint.
        assert!(etl.process(Some(dir.path())).is_err());
        assert!(!etl.is_cached(dir.path()).unwrap());
    }
}
