use crate::config::AppConfig;
use crate::error::StoreError;
use crate::proposals::{self, ProposalMode};
use crate::store::CenterStore;
use crate::types::MedicalCenter;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geo::{HaversineDistance, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

// [lon, lat] keyed by index into the existing-center list
type CenterIndex = GeomWithData<[f64; 2], usize>;

pub type SharedStore = Box<dyn CenterStore + Send>;

pub struct AppState {
    // Only locked from blocking tasks. Serializes writers within this
    // process; repeated calls still append duplicates in append mode.
    pub store: Mutex<SharedStore>,
    pub city: String,
    pub mode: ProposalMode,
}

impl AppState {
    pub fn new(store: SharedStore, city: impl Into<String>, mode: ProposalMode) -> Self {
        Self {
            store: Mutex::new(store),
            city: city.into(),
            mode,
        }
    }
}

#[derive(Deserialize)]
pub struct NearestParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
pub struct NearestResponse {
    pub center: MedicalCenter,
    pub distance_m: f64,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Store(StoreError),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Store(e) => {
                error!("Store failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Internal(msg) => {
                error!("Internal failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/get_medical_centers", get(medical_centers_handler))
        .route("/get_proposed_medical_centers", get(proposed_centers_handler))
        .route("/api/nearest", get(nearest_handler));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn start_server(config: AppConfig, store: SharedStore) -> Result<()> {
    let state = Arc::new(AppState::new(
        store,
        config.proposals.city.clone(),
        config.proposals.mode(),
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = router(state, config.server.static_dir.as_deref());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// Store access does file I/O, so it runs off the async workers
async fn with_store<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut (dyn CenterStore + Send), &AppState) -> Result<T, StoreError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let mut store = state
            .store
            .lock()
            .map_err(|_| ApiError::Internal("store lock poisoned".to_string()))?;
        f(&mut **store, &state).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("store task failed: {}", e)))?
}

pub async fn medical_centers_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MedicalCenter>>, ApiError> {
    let existing = with_store(&state, |store, _| store.filter_suggested(false)).await?;
    Ok(Json(existing))
}

/// Computes and stores a fresh batch of proposals, then returns every
/// suggested row.
pub async fn proposed_centers_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MedicalCenter>>, ApiError> {
    let suggested = with_store(&state, |store, state| {
        proposals::generate_and_persist(store, &state.city, state.mode)
    })
    .await?;
    Ok(Json(suggested))
}

pub async fn nearest_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearestParams>,
) -> Result<Json<Option<NearestResponse>>, ApiError> {
    check_coordinates(params.lat, params.lon)?;
    let existing = with_store(&state, |store, _| store.filter_suggested(false)).await?;
    Ok(Json(nearest_center(existing, params.lat, params.lon)))
}

fn check_coordinates(lat: f64, lon: f64) -> Result<(), ApiError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::BadRequest(format!("lat out of range: {}", lat)));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::BadRequest(format!("lon out of range: {}", lon)));
    }
    Ok(())
}

/// Finds the existing center closest to a point. Centers without usable
/// coordinates are ignored, and a non-finite query point finds nothing.
pub fn nearest_center(centers: Vec<MedicalCenter>, lat: f64, lon: f64) -> Option<NearestResponse> {
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }

    let items: Vec<CenterIndex> = centers
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.location().map(|p| GeomWithData::new([p.x(), p.y()], i)))
        .collect();
    let tree = RTree::bulk_load(items);

    let hit = tree.nearest_neighbor(&[lon, lat])?;
    let [hit_lon, hit_lat] = *hit.geom();
    let distance_m = Point::new(lon, lat).haversine_distance(&Point::new(hit_lon, hit_lat));

    let center = centers.into_iter().nth(hit.data)?;
    Some(NearestResponse { center, distance_m })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn center(name: &str, district: &str, pop: i64, lat: f64, lon: f64) -> MedicalCenter {
        MedicalCenter {
            name: Some(name.to_string()),
            city_district: Some(district.to_string()),
            population_in_district: Some(pop),
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }

    fn state_with(centers: Vec<MedicalCenter>) -> Arc<AppState> {
        let mut store = MemoryStore::new();
        store.insert_batch(centers).unwrap();
        Arc::new(AppState::new(Box::new(store), "Madrid", ProposalMode::Append))
    }

    #[test]
    fn nearest_picks_closest_center() {
        let centers = vec![
            center("Lavapies", "Centro", 1, 40.4085, -3.7010),
            center("Nino Jesus", "Retiro", 1, 40.4180, -3.6730),
        ];
        let hit = nearest_center(centers, 40.419, -3.674).unwrap();
        assert_eq!(hit.center.name.as_deref(), Some("Nino Jesus"));
        assert!(hit.distance_m > 0.0 && hit.distance_m < 500.0);
    }

    #[test]
    fn nearest_on_empty_set_is_none() {
        assert!(nearest_center(Vec::new(), 40.0, -3.0).is_none());
    }

    #[tokio::test]
    async fn listing_excludes_proposals() {
        let state = state_with(vec![
            center("Lavapies", "Centro", 2000, 40.4085, -3.7010),
            center("Nino Jesus", "Retiro", 900, 40.4180, -3.6730),
        ]);

        let Json(proposed) = proposed_centers_handler(State(state.clone())).await.unwrap();
        assert_eq!(proposed.len(), 2);
        assert!(proposed.iter().all(|c| c.is_suggested));
        assert_eq!(proposed[0].city_district.as_deref(), Some("Centro"));

        let Json(existing) = medical_centers_handler(State(state)).await.unwrap();
        assert_eq!(existing.len(), 2);
        assert!(existing.iter().all(|c| !c.is_suggested));
    }

    #[tokio::test]
    async fn repeated_proposal_calls_accumulate_in_append_mode() {
        let state = state_with(vec![center("Lavapies", "Centro", 2000, 40.4085, -3.7010)]);
        proposed_centers_handler(State(state.clone())).await.unwrap();
        let Json(second) = proposed_centers_handler(State(state)).await.unwrap();
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn store_error_maps_to_500() {
        let response = ApiError::Store(StoreError::Constraint("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn nearest_with_nan_query_finds_nothing() {
        let centers = vec![
            center("Lavapies", "Centro", 1, 40.4085, -3.7010),
            center("Nino Jesus", "Retiro", 1, 40.4180, -3.6730),
            center("La Paz", "Fuencarral", 1, 40.4810, -3.6870),
        ];
        assert!(nearest_center(centers.clone(), f64::NAN, -3.0).is_none());
        assert!(nearest_center(centers, 40.4, f64::INFINITY).is_none());
    }

    #[tokio::test]
    async fn nearest_rejects_non_finite_query_with_400() {
        let state = state_with(vec![center("Lavapies", "Centro", 1, 40.4085, -3.7010)]);
        let uri: axum::http::Uri = "/api/nearest?lat=NaN&lon=-3".parse().unwrap();
        let Query(params) = Query::<NearestParams>::try_from_uri(&uri).unwrap();

        let err = nearest_handler(State(state.clone()), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let out_of_range = NearestParams { lat: 40.4, lon: 200.0 };
        let err = nearest_handler(State(state.clone()), Query(out_of_range)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let ok = NearestParams { lat: 40.41, lon: -3.70 };
        let Json(hit) = nearest_handler(State(state), Query(ok)).await.unwrap();
        assert_eq!(hit.unwrap().center.name.as_deref(), Some("Lavapies"));
    }
}
