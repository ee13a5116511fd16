pub mod fetch_network;
pub mod fetch_pois;
pub mod parse_osm;

use std::{fs, path::{Path, PathBuf}};
use log::{error, info, warn};

use crate::data::network::{NetworkType, StreetNetwork};
use crate::data::poi::{PoiCollection, TagFilter};
use crate::errors::Result;
use crate::overpass::OsmClient;
use crate::FetchConfig;

use self::fetch_network::NetworkEtl;
use self::fetch_pois::PoiEtl;

/// A download that is extracted from a remote service, transformed into domain data
/// and loaded into an on-disk cache.
pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;
    fn cache_key(&self) -> String;

    fn cache_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.etl_name()).join(format!("{}.rkyv.xz", self.cache_key()))
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(self.cache_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        if self.is_cached(dir)? {
            fs::remove_file(self.cache_path(dir))?;
        }
        Ok(())
    }

    fn read_cached(&mut self, dir: &Path) -> Result<Self::Output>;
    fn extract(&mut self) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: &Self::Output) -> Result<()>;

    /// Runs the pipeline. With a cache directory, a cached value short-circuits the
    /// download and a fresh download is written back.
    fn process(&mut self, cache_dir: Option<&Path>) -> Result<Self::Output> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if let Some(dir) = cache_dir {
            if self.is_cached(dir)? {
                match self.read_cached(dir) {
                    Ok(output) => {
                        info!(etl_name = self.etl_name(); "Using cached value");
                        return Ok(output);
                    }
                    Err(err) => {
                        warn!(etl_name = self.etl_name(), err = err.message.as_str(); "Discarding unreadable cache entry");
                        self.clean(dir)?;
                    }
                }
            }
        }

        info!(etl_name = self.etl_name(); "Extracting");
        let input = self.extract().map_err(|err| {
            error!(etl_name = self.etl_name(), err = err.message.as_str(); "Extraction failed with error");
            err
        })?;

        info!(etl_name = self.etl_name(); "Transforming");
        let output = self.transform(input).map_err(|err| {
            error!(etl_name = self.etl_name(), err = err.message.as_str(); "Transformation failed with error");
            err
        })?;

        if let Some(dir) = cache_dir {
            info!(etl_name = self.etl_name(); "Loading");
            self.load(dir, &output).map_err(|err| {
                error!(etl_name = self.etl_name(), err = err.message.as_str(); "Loading failed with error");
                err
            })?;
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(output)
    }
}

/// Provider of street networks for a place.
pub trait NetworkSource {
    fn fetch_network(&mut self, place: &str, network_type: NetworkType) -> Result<StreetNetwork>;
}

/// Provider of tagged features for a place.
pub trait PoiSource {
    fn fetch_pois(&mut self, place: &str, tags: &TagFilter) -> Result<PoiCollection>;
}

/// Nominatim + Overpass backed provider, caching downloads per `FetchConfig`.
pub struct OverpassSource<'a> {
    config: &'a FetchConfig,
    client: OsmClient,
}

impl<'a> OverpassSource<'a> {
    pub fn new(config: &'a FetchConfig) -> Result<Self> {
        Ok(OverpassSource {
            config,
            client: OsmClient::new(config)?,
        })
    }

    fn cache_dir(&self) -> Option<&Path> {
        self.config.use_cache.then(|| Path::new(&self.config.cache_dir))
    }
}

impl NetworkSource for OverpassSource<'_> {
    fn fetch_network(&mut self, place: &str, network_type: NetworkType) -> Result<StreetNetwork> {
        NetworkEtl::new(self.config, &self.client, place, network_type).process(self.cache_dir())
    }
}

impl PoiSource for OverpassSource<'_> {
    fn fetch_pois(&mut self, place: &str, tags: &TagFilter) -> Result<PoiCollection> {
        PoiEtl::new(&self.client, place, tags).process(self.cache_dir())
    }
}
