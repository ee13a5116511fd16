use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::FetchConfig;

const RELATION_AREA_OFFSET: u64 = 3_600_000_000;
const WAY_AREA_OFFSET: u64 = 2_400_000_000;

#[derive(Deserialize, Debug)]
struct NominatimPlace {
    osm_type: String,
    osm_id: u64,
    display_name: String,
}

/// Overpass area id derived from the OSM way or relation outlining a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaId(pub u64);

impl AreaId {
    fn from_place(place: &NominatimPlace) -> Option<AreaId> {
        match place.osm_type.as_str() {
            "relation" => Some(AreaId(RELATION_AREA_OFFSET + place.osm_id)),
            "way" => Some(AreaId(WAY_AREA_OFFSET + place.osm_id)),
            _ => None,
        }
    }
}

/// Blocking client for the Nominatim geocoder and the Overpass API.
pub struct OsmClient {
    http: Client,
    nominatim_url: String,
    overpass_url: String,
    timeout_secs: u64,
}

impl OsmClient {
    pub fn new(config: &FetchConfig) -> Result<OsmClient> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(OsmClient {
            http,
            nominatim_url: config.nominatim_url.trim_end_matches('/').to_string(),
            overpass_url: config.overpass_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Resolves a free-text place name to the first result that outlines an area.
    pub fn geocode_area(&self, place: &str) -> Result<AreaId> {
        let url = format!("{}/search", self.nominatim_url);
        let results: Vec<NominatimPlace> = self
            .http
            .get(url)
            .query(&[("q", place), ("format", "json"), ("limit", "10")])
            .send()?
            .error_for_status()?
            .json()?;

        if results.is_empty() {
            return Err(Error::lookup(format!("Nominatim geocoder returned 0 results for '{place}'")));
        }
        let (matched, area) = results
            .iter()
            .find_map(|result| AreaId::from_place(result).map(|area| (result, area)))
            .ok_or_else(|| Error::lookup(format!("'{place}' did not geocode to an area")))?;
        info!(place = place, display_name = matched.display_name.as_str(), area_id = area.0; "Geocoded place");
        Ok(area)
    }

    /// Runs an Overpass QL query and returns the raw response body.
    pub fn query(&self, query: &str) -> Result<String> {
        debug!(query = query; "Querying Overpass API");
        let response = self
            .http
            .post(self.overpass_url.as_str())
            .form(&[("data", query)])
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            let snippet: String = body.chars().take(256).collect();
            return Err(format!("Overpass API returned HTTP {status}: {snippet}").into());
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(osm_type: &str, osm_id: u64) -> NominatimPlace {
        NominatimPlace {
            osm_type: osm_type.to_string(),
            osm_id,
            display_name: "Salzburg, Österreich".to_string(),
        }
    }

    #[test]
    fn area_ids_follow_overpass_offsets() {
        assert_eq!(AreaId::from_place(&place("relation", 86538)), Some(AreaId(3_600_086_538)));
        assert_eq!(AreaId::from_place(&place("way", 42)), Some(AreaId(2_400_000_042)));
        assert_eq!(AreaId::from_place(&place("node", 42)), None);
    }

    #[test]
    fn nominatim_results_deserialize() {
        let results: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"place_id": 1, "osm_type": "relation", "osm_id": 86538, "display_name": "Salzburg", "class": "boundary"}]"#,
        )
        .unwrap();
        assert_eq!(AreaId::from_place(&results[0]), Some(AreaId(3_600_086_538)));
    }
}
