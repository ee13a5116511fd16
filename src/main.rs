mod cache;
mod data;
mod errors;
mod etl;
mod map;
mod overpass;

use std::env;
use std::fs::File;
use std::io;
use std::path::Path;

use log::info;
use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::data::network::NetworkType;
use crate::data::poi::{KeyCombination, TagFilter};
use crate::errors::Result;
use crate::etl::fetch_network::get_street_network;
use crate::etl::fetch_pois::get_points_of_interest;
use crate::etl::OverpassSource;
use crate::map::builder::{create_interactive_map, DEFAULT_ZOOM};

/// How downloads are made and cached.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub use_cache: bool,
    pub cache_dir: String,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Keep every connected component instead of only the largest one.
    pub retain_all: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            use_cache: true,
            cache_dir: "cache".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            user_agent: concat!("osm_poi_map/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 180,
            retain_all: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    pub place: String,
    pub network_type: NetworkType,
    pub tags: TagFilter,
    pub initial_zoom: u8,
    pub output_path: String,
    pub log_level: String,
    pub fetch: FetchConfig,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            place: "Salzburg, Austria".to_string(),
            network_type: NetworkType::Walk,
            tags: TagFilter::new()
                .many("tourism", &["attraction", "museum"])
                .many("amenity", &["cafe", "restaurant"])
                .one("leisure", "park")
                .combined_with(KeyCombination::Any),
            initial_zoom: DEFAULT_ZOOM,
            output_path: "salzburg_interactive_map.html".to_string(),
            log_level: "info".to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

fn load_user_config(path: Option<&str>) -> Result<UserConfig> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| format!("Could not open config file '{path}': {err}"))?;
            Ok(serde_json::from_reader(file)?)
        }
        None => Ok(UserConfig::default()),
    }
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn run(config: &UserConfig) -> Result<()> {
    let mut source = OverpassSource::new(&config.fetch)?;
    let graph = get_street_network(&mut source, &config.place, config.network_type)?;
    let pois = get_points_of_interest(&mut source, &config.place, &config.tags)?;

    let document = create_interactive_map(&graph, &pois, &config.place, config.initial_zoom)?;
    let output_path = Path::new(&config.output_path);
    document.save(output_path)?;
    info!(path = config.output_path.as_str(); "Map written");
    println!("Map saved as {}", output_path.display());
    Ok(())
}

fn main() {
    let config_path = env::args().nth(1);
    let config = match load_user_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            println!("An unexpected error occurred: {err}");
            return;
        }
    };
    setup_logging(&config.log_level);

    if let Err(err) = run(&config) {
        if err.is_user_facing() {
            println!("An error occurred: {err}");
        } else {
            println!("An unexpected error occurred: {err}");
        }
    }
}
