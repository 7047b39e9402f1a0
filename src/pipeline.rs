//! Per-request map preparation state machine
//!
//! `Idle → ResolvingAoi → FetchingGeometry → Ready`, with `ResolvingAoi` and
//! `FetchingGeometry` able to end in `Failed`. Requests built from an uploaded
//! boundary skip straight from `Idle` to `Ready`. Every request gets a fresh
//! [`PipelineRun`]; nothing but the caches outlives it.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::MapError;
use crate::models::{AoiShape, Bounds, GeometryCollection, LocationQuery, RenderConfig};

/// Stage of a [`PipelineRun`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ResolvingAoi,
    FetchingGeometry,
    Ready,
    Failed,
}

impl Stage {
    #[must_use]
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Idle, Stage::ResolvingAoi)
                | (Stage::Idle, Stage::Ready)
                | (Stage::ResolvingAoi, Stage::FetchingGeometry)
                | (Stage::ResolvingAoi, Stage::Failed)
                | (Stage::FetchingGeometry, Stage::Ready)
                | (Stage::FetchingGeometry, Stage::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Ready | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::ResolvingAoi => "resolving AOI",
            Stage::FetchingGeometry => "fetching geometry",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Everything a renderer needs for one poster
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMap {
    pub aoi_bounds: Bounds,
    pub geometries: Arc<GeometryCollection>,
    pub config: RenderConfig,
}

/// Draws a prepared map. Implemented outside this crate.
pub trait Renderer {
    type Figure;

    fn render(&self, map: &PreparedMap) -> Result<Self::Figure, MapError>;
}

#[derive(Debug)]
pub enum PipelineState {
    Idle,
    ResolvingAoi,
    FetchingGeometry,
    Ready(PreparedMap),
    Failed(MapError),
}

impl PipelineState {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            PipelineState::Idle => Stage::Idle,
            PipelineState::ResolvingAoi => Stage::ResolvingAoi,
            PipelineState::FetchingGeometry => Stage::FetchingGeometry,
            PipelineState::Ready(_) => Stage::Ready,
            PipelineState::Failed(_) => Stage::Failed,
        }
    }
}

/// One pass through the state machine, with the stages it visited
#[derive(Debug)]
pub struct PipelineRun {
    state: PipelineState,
    trace: Vec<Stage>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            trace: vec![Stage::Idle],
        }
    }

    /// Move to `next`. Illegal transitions leave the run untouched.
    /// `Idle → Ready` is only reachable through [`PipelineRun::accept_boundary`].
    pub fn advance(&mut self, next: PipelineState) -> Result<(), MapError> {
        if self.stage() == Stage::Idle && next.stage() == Stage::Ready {
            return Err(MapError::validation(
                "Only an uploaded boundary can go from idle to ready",
            ));
        }
        self.transition(next)
    }

    /// Finish an idle run with an uploaded boundary as the map extent
    pub fn accept_boundary(
        &mut self,
        boundary: &Boundary,
        config: RenderConfig,
    ) -> Result<(), MapError> {
        if self.stage() != Stage::Idle {
            return Err(MapError::validation(format!(
                "Cannot accept a boundary while {}",
                self.stage()
            )));
        }
        self.transition(PipelineState::Ready(PreparedMap {
            aoi_bounds: boundary.bounds(),
            geometries: Arc::clone(boundary.geometries()),
            config,
        }))
    }

    fn transition(&mut self, next: PipelineState) -> Result<(), MapError> {
        let (from, to) = (self.stage(), next.stage());
        if !from.can_transition_to(to) {
            return Err(MapError::validation(format!(
                "Illegal pipeline transition from {from} to {to}"
            )));
        }
        tracing::debug!("Pipeline {} -> {}", from, to);
        self.state = next;
        self.trace.push(to);
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Stages visited so far, starting with `Idle`
    #[must_use]
    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    /// The prepared map, or the error that ended the run
    pub fn into_result(self) -> Result<PreparedMap, MapError> {
        match self.state {
            PipelineState::Ready(map) => Ok(map),
            PipelineState::Failed(error) => Err(error),
            other => Err(MapError::validation(format!(
                "Pipeline stopped while {}",
                other.stage()
            ))),
        }
    }
}

/// An uploaded boundary together with the bounds used as the map extent
#[derive(Debug, Clone)]
pub struct Boundary {
    geometries: Arc<GeometryCollection>,
    bounds: Bounds,
}

impl Boundary {
    /// Fails when the collection has no extent to draw
    pub fn new(geometries: GeometryCollection) -> Result<Self, MapError> {
        let bounds = geometries
            .total_bounds()
            .ok_or_else(|| MapError::file_format("Boundary contains no geometries"))?;
        Ok(Self {
            geometries: Arc::new(geometries),
            bounds,
        })
    }

    #[must_use]
    pub fn geometries(&self) -> &Arc<GeometryCollection> {
        &self.geometries
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }
}

#[derive(Debug, Clone)]
pub enum MapSource {
    Location(LocationQuery),
    Boundary(Boundary),
}

/// Request-scoped input for one map. The AOI shape is `config.shape`.
#[derive(Debug, Clone)]
pub struct MapRequest {
    pub source: MapSource,
    pub radius_m: u32,
    pub config: RenderConfig,
}

impl MapRequest {
    #[must_use]
    pub fn for_location(query: LocationQuery, radius_m: u32, config: RenderConfig) -> Self {
        Self {
            source: MapSource::Location(query),
            radius_m,
            config,
        }
    }

    #[must_use]
    pub fn for_boundary(boundary: Boundary, config: RenderConfig) -> Self {
        Self {
            source: MapSource::Boundary(boundary),
            radius_m: crate::config::DefaultsConfig::default().radius_m,
            config,
        }
    }

    #[must_use]
    pub fn shape(&self) -> AoiShape {
        self.config.shape
    }
}
