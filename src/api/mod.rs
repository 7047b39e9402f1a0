use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    MapError, export,
    models::{AoiShape, Bounds, FeatureClass, LocationParser, RenderConfig, SearchResult},
    pipeline::MapRequest,
    service::MapService,
};

type ApiState = State<Arc<MapService>>;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

/// Body of `POST /map`
#[derive(Debug, Deserialize)]
pub struct MapBody {
    /// Address or "lat,lon"
    pub location: String,
    pub radius_m: Option<u32>,
    pub rectangular: Option<bool>,
    #[serde(default)]
    pub config: RenderConfig,
}

#[derive(Debug, Serialize)]
pub struct MapResponse {
    pub bounds: Bounds,
    pub feature_count: usize,
    pub feature_classes: BTreeMap<FeatureClass, usize>,
    pub geojson: geojson::GeoJson,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_name: String,
    pub feature_count: usize,
    pub geometry_types: Vec<&'static str>,
    pub bounds: Bounds,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A [`MapError`] rendered as a JSON error response
pub struct ApiError(MapError);

impl From<MapError> for ApiError {
    fn from(err: MapError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MapError::Geocoding { .. } | MapError::Validation { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MapError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            MapError::FileFormat { .. } => StatusCode::BAD_REQUEST,
            MapError::Config { .. } | MapError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::info!("Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(service: Arc<MapService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/map", post(prepare_map))
        .route(
            "/upload",
            post(upload_boundary).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/config", post(export_config))
        .with_state(service)
}

async fn health() -> &'static str {
    "ok"
}

async fn search(
    State(service): ApiState,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchResult>> {
    let results = service.search(&params.q, params.limit.unwrap_or(0)).await;
    Json(results)
}

async fn prepare_map(
    State(service): ApiState,
    Json(body): Json<MapBody>,
) -> Result<Json<MapResponse>, ApiError> {
    let mut config = body.config;
    if let Some(rectangular) = body.rectangular {
        config.shape = AoiShape::from_rectangular(rectangular);
    }
    let radius_m = body.radius_m.unwrap_or(service.defaults().radius_m);
    let request = MapRequest::for_location(LocationParser::parse(&body.location), radius_m, config);

    let map = service.prepare(&request).await?;
    Ok(Json(MapResponse {
        bounds: map.aoi_bounds,
        feature_count: map.geometries.len(),
        feature_classes: map.geometries.class_counts(),
        geojson: export::to_geojson(&map.geometries),
        generated_at: Utc::now(),
    }))
}

async fn upload_boundary(
    State(service): ApiState,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| MapError::file_format(format!("Malformed upload: {e}")))?
        .ok_or_else(|| MapError::file_format("No file in upload"))?;

    let file_name = field
        .file_name()
        .or_else(|| field.name())
        .unwrap_or("upload")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| MapError::file_format(format!("Failed to read {file_name}: {e}")))?;

    let boundary = service.import_boundary(&file_name, &bytes)?;
    Ok(Json(UploadResponse {
        file_name,
        feature_count: boundary.geometries().len(),
        geometry_types: boundary.geometries().geometry_types(),
        bounds: boundary.bounds(),
    }))
}

async fn export_config(Json(config): Json<RenderConfig>) -> Result<Response, ApiError> {
    config.validate()?;
    let json = export::export_config(&config)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"map_config.json\"",
            ),
        ],
        json,
    )
        .into_response())
}
