//! Session-scoped map service
//!
//! Owns the remote clients and both caches. Every UI interaction calls
//! [`MapService::prepare`] (or [`MapService::execute`]) with a fresh
//! [`MapRequest`]; repeated calls for an unchanged AOI are served from the
//! geometry cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::MapError;
use crate::cache::{CacheStats, ResultCache};
use crate::config::{DefaultsConfig, MapConfig};
use crate::geometry::{GeometryFetcher, OverpassClient};
use crate::import;
use crate::location_resolver::Geocoder;
use crate::models::{
    AoiKey, AoiShape, AreaOfInterest, GeometryCollection, LocationQuery, RenderConfig,
    SearchResult,
};
use crate::pipeline::{
    Boundary, MapRequest, MapSource, PipelineRun, PipelineState, PreparedMap, Renderer,
};
use crate::search::{LocationSearch, NominatimClient, PlaceSearch};

pub struct MapService {
    geocoder: Arc<dyn Geocoder>,
    fetcher: Arc<dyn GeometryFetcher>,
    geometry_cache: ResultCache<AoiKey, Arc<GeometryCollection>>,
    search: LocationSearch,
    defaults: DefaultsConfig,
}

impl MapService {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        fetcher: Arc<dyn GeometryFetcher>,
        places: Arc<dyn PlaceSearch>,
        config: &MapConfig,
    ) -> Self {
        Self {
            geocoder,
            fetcher,
            geometry_cache: ResultCache::unbounded("geometry"),
            search: LocationSearch::new(
                places,
                Duration::from_secs(config.cache.search_ttl_seconds),
                config.search.limit,
            ),
            defaults: config.defaults.clone(),
        }
    }

    /// Service backed by Nominatim and Overpass
    pub fn from_config(config: &MapConfig) -> Result<Self, MapError> {
        let nominatim = Arc::new(NominatimClient::new(&config.search)?);
        let overpass = Arc::new(OverpassClient::new(&config.geometry, &config.search)?);
        info!(
            "Using Nominatim at {} and Overpass at {}",
            config.search.base_url, config.geometry.base_url
        );
        Ok(Self::new(nominatim.clone(), overpass, nominatim, config))
    }

    #[must_use]
    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    /// Place suggestions; never fails
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        self.search.search(query, limit).await
    }

    #[must_use]
    pub fn should_auto_search(&self, query: &str) -> bool {
        LocationSearch::should_auto_search(query)
    }

    pub async fn resolve_aoi(
        &self,
        query: &LocationQuery,
        radius_m: u32,
        shape: AoiShape,
    ) -> Result<AreaOfInterest, MapError> {
        self.geocoder.resolve(query, radius_m, shape).await
    }

    /// Geometries for `aoi`, fetched at most once per AOI for the life of the service
    pub async fn fetch_geometries(
        &self,
        aoi: &AreaOfInterest,
    ) -> Result<Arc<GeometryCollection>, MapError> {
        self.geometry_cache
            .get_or_fetch(aoi.key(), || async {
                self.fetcher.fetch(aoi).await.map(Arc::new)
            })
            .await
    }

    /// Run the state machine for one request. The returned run ends in
    /// `Ready` or `Failed` unless the request could not start.
    #[instrument(skip(self, request), fields(radius_m = request.radius_m))]
    pub async fn execute(&self, request: &MapRequest) -> PipelineRun {
        let mut run = PipelineRun::new();
        if let Err(e) = self.drive(&mut run, request).await {
            warn!("Pipeline stopped while {}: {}", run.stage(), e);
        }
        debug!("Pipeline trace: {:?}", run.trace());
        run
    }

    async fn drive(&self, run: &mut PipelineRun, request: &MapRequest) -> Result<(), MapError> {
        let query = match &request.source {
            MapSource::Boundary(boundary) => {
                return run.accept_boundary(boundary, request.config.clone());
            }
            MapSource::Location(query) => query,
        };

        run.advance(PipelineState::ResolvingAoi)?;
        let resolved = match request.config.validate() {
            Ok(()) => {
                self.resolve_aoi(query, request.radius_m, request.shape())
                    .await
            }
            Err(e) => Err(e),
        };
        let aoi = match resolved {
            Ok(aoi) => aoi,
            Err(e) => return run.advance(PipelineState::Failed(e)),
        };

        run.advance(PipelineState::FetchingGeometry)?;
        match self.fetch_geometries(&aoi).await {
            Ok(geometries) => run.advance(PipelineState::Ready(PreparedMap {
                aoi_bounds: aoi.bounds(),
                geometries,
                config: request.config.clone(),
            })),
            Err(e) => run.advance(PipelineState::Failed(e)),
        }
    }

    /// The prepared map for `request`, or the error that ended its run
    pub async fn prepare(&self, request: &MapRequest) -> Result<PreparedMap, MapError> {
        request.config.validate()?;
        self.execute(request).await.into_result()
    }

    pub async fn render<R: Renderer>(
        &self,
        request: &MapRequest,
        renderer: &R,
    ) -> Result<R::Figure, MapError> {
        let map = self.prepare(request).await?;
        renderer.render(&map)
    }

    /// Parse an uploaded boundary file
    pub fn import_boundary(&self, file_name: &str, bytes: &[u8]) -> Result<Boundary, MapError> {
        Boundary::new(import::import(file_name, bytes)?)
    }

    /// Import an upload and move `run` straight to `Ready`. On failure the run
    /// is left as it was.
    pub fn prepare_upload(
        &self,
        run: &mut PipelineRun,
        file_name: &str,
        bytes: &[u8],
        config: RenderConfig,
    ) -> Result<(), MapError> {
        let boundary = self.import_boundary(file_name, bytes)?;
        run.accept_boundary(&boundary, config)
    }

    #[must_use]
    pub fn search_cache_stats(&self) -> CacheStats {
        self.search.cache_stats()
    }

    #[must_use]
    pub fn geometry_cache_stats(&self) -> CacheStats {
        self.geometry_cache.stats()
    }

    /// Forget every fetched geometry
    pub fn clear_geometry_cache(&self) {
        self.geometry_cache.clear();
    }
}
