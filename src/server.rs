use crate::aggregate::{
    aggregate, benefit_range, rank_districts, state_totals, AggregateStats, RankedDistrict,
    Rankings, StatCard, StateTotal,
};
use crate::config::AppConfig;
use crate::join::{hover_text, HoverLabels, JoinReport};
use crate::render::{DisplayOptions, RenderPayload};
use crate::session::{LoadTask, MapSession, SessionError, ViewState};
use crate::types::{CanonicalKey, GeometrySource, HoverDetail};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub session: Arc<RwLock<MapSession>>,
    pub config: AppConfig,
    /// The load currently filling `session`, if any.
    pub load: Mutex<Option<LoadTask>>,
}

impl AppState {
    /// Starts loading `config.input` into a fresh session.
    pub fn spawn(config: AppConfig) -> Self {
        let session = Arc::new(RwLock::new(MapSession::new(config.display.default_source)));
        let load = LoadTask::spawn(config.input.clone(), session.clone());
        Self {
            session,
            config,
            load: Mutex::new(Some(load)),
        }
    }

    fn display(&self, mobile: Option<bool>) -> DisplayOptions {
        DisplayOptions {
            compact: mobile.unwrap_or(self.config.display.mobile),
            labels: self.labels(),
        }
    }

    fn labels(&self) -> HoverLabels {
        HoverLabels {
            benefits: self.config.display.benefit_label.clone(),
            recipients: self.config.display.recipient_label.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

struct ApiError(StatusCode, ErrorBody);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Loading => ApiError(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    status: "loading",
                    message: SessionError::Loading.to_string(),
                },
            ),
            SessionError::Failed(message) => ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    status: "error",
                    message,
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

#[derive(Deserialize)]
pub struct MapParams {
    source: Option<GeometrySource>,
    mobile: Option<bool>,
}

#[derive(Deserialize)]
pub struct SelectionBody {
    source: GeometrySource,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
    source: Option<GeometrySource>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    state: ViewState,
    rejected_rows: usize,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    stats: Option<AggregateStats>,
    cards: Vec<StatCard>,
    rankings: Rankings,
    range: Option<(RankedDistrict, RankedDistrict)>,
    states: Vec<StateTotal>,
    rejected_rows: usize,
}

#[derive(Serialize)]
pub struct MapResponse {
    #[serde(flatten)]
    payload: RenderPayload,
    report: JoinReport,
}

#[derive(Serialize)]
pub struct QueryResponse {
    key: CanonicalKey,
    detail: HoverDetail,
    text: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/map", get(map_handler))
        .route("/api/selection", put(selection_handler))
        .route("/api/reload", post(reload_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/query", get(query_handler));

    if let Some(dir) = &state.config.server.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::spawn(config));
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.session.read().await;
    let rejected_rows = session
        .ready_inputs()
        .map(|inputs| inputs.table.rejected.len())
        .unwrap_or(0);
    Json(StatusResponse {
        state: session.state().clone(),
        rejected_rows,
    })
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapParams>,
) -> Result<Json<MapResponse>, ApiError> {
    let pass = state
        .session
        .read()
        .await
        .render(params.source, &state.display(params.mobile))?;
    Ok(Json(MapResponse {
        payload: pass.payload,
        report: pass.report,
    }))
}

async fn selection_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectionBody>,
) -> Result<Json<ViewState>, ApiError> {
    let mut session = state.session.write().await;
    session.select(body.source)?;
    info!("Selected {} geometry", body.source);
    Ok(Json(session.state().clone()))
}

/// Drops any in-flight load, resets the session and starts loading from scratch.
async fn reload_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ViewState>) {
    let mut load = state.load.lock().await;
    drop(load.take());
    state.session.write().await.reload();
    *load = Some(LoadTask::spawn(state.config.input.clone(), state.session.clone()));
    info!("Reloading map data");
    (StatusCode::ACCEPTED, Json(ViewState::Loading))
}

async fn summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let inputs = state.session.read().await.ready_inputs()?;
    let table = &inputs.table;
    // an empty table still answers, just without stats
    let stats = aggregate(table).ok();
    let cards = stats
        .as_ref()
        .map(|s| s.cards(&state.labels()))
        .unwrap_or_default();

    Ok(Json(SummaryResponse {
        stats,
        cards,
        rankings: rank_districts(table, 10),
        range: benefit_range(table),
        states: state_totals(table),
        rejected_rows: table.rejected.len(),
    }))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Option<QueryResponse>>, ApiError> {
    let (inputs, selection) = {
        let session = state.session.read().await;
        (session.ready_inputs()?, session.selection())
    };
    let source = params
        .source
        .or(selection)
        .unwrap_or(state.config.display.default_source);

    let Some(keyed) = inputs.index(source).locate(params.lon, params.lat) else {
        return Ok(Json(None));
    };

    let record = inputs.table.get(&keyed.key);
    let detail = HoverDetail {
        state: keyed.state.clone(),
        district: keyed.district.clone(),
        benefits: record.map_or(0.0, |r| r.total_benefits),
        population: record.map_or(0.0, |r| r.population),
    };
    let text = hover_text(&keyed.display_name, &detail, &state.labels());

    Ok(Json(Some(QueryResponse {
        key: keyed.key.clone(),
        detail,
        text,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisplayConfig, InputConfig, ServerConfig};
    use crate::data::{fixtures, load_inputs};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_state(input: InputConfig, session: MapSession) -> Arc<AppState> {
        Arc::new(AppState {
            session: Arc::new(RwLock::new(session)),
            config: AppConfig {
                input,
                display: DisplayConfig::default(),
                server: ServerConfig::default(),
            },
            load: Mutex::new(None),
        })
    }

    async fn ready_state(dir: &std::path::Path) -> Arc<AppState> {
        let input = fixtures::write_inputs(dir);
        let mut session = MapSession::new(GeometrySource::Hex);
        session.complete(load_inputs(&input).await.map_err(|e| e.to_string()));
        app_state(input, session)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn map_endpoint_serves_payload() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(ready_state(dir.path()).await);

        let (status, body) = get_json(app, "/api/map?source=geographic&mobile=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["locations"][0], "0605");
        assert_eq!(body["layout"]["height"], 500);
        assert_eq!(body["report"]["matched"], 1);
    }

    #[tokio::test]
    async fn loading_session_answers_503() {
        let dir = tempfile::tempdir().unwrap();
        let state = ready_state(dir.path()).await;
        state.session.write().await.reload();

        let (status, body) = get_json(router(state), "/api/map").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "loading");
    }

    #[tokio::test]
    async fn selection_switches_default_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let state = ready_state(dir.path()).await;
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/selection")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"source": "real"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = get_json(app, "/api/map").await;
        assert_eq!(body["data"][0]["locations"][1], "3612");
    }

    #[tokio::test]
    async fn summary_reports_cards_and_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(ready_state(dir.path()).await);

        let (status, body) = get_json(app, "/api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["district_count"], 2);
        assert_eq!(body["cards"][2]["value"], "2");
        assert_eq!(body["rankings"]["top"][0]["key"], "0201");
        assert_eq!(body["range"][0]["key"], "0605");
        assert_eq!(body["range"][1]["key"], "0201");
        assert_eq!(body["cards"][1]["label"], "SNAP Recipients");
        assert_eq!(body["rejected_rows"], 1);
    }

    #[tokio::test]
    async fn query_finds_district_under_point() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(ready_state(dir.path()).await);

        let (_, body) = get_json(app.clone(), "/api/query?lat=35.5&lon=-119.5&source=geographic").await;
        assert_eq!(body["key"], "0605");
        assert_eq!(
            body["text"],
            "Congressional District 5<br>State FIPS: 06<br>SNAP Benefits: $1.2M<br>Recipients: 50.0K"
        );

        let (_, body) = get_json(app, "/api/query?lat=0.0&lon=0.0&source=geographic").await;
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn reload_recovers_from_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::write_inputs(dir.path());
        let mut session = MapSession::new(GeometrySource::Hex);
        session.complete(Err("failed to read hex.geojson".into()));
        let state = app_state(input, session);
        let app = router(state.clone());

        let (status, _) = get_json(app.clone(), "/api/map").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let load = state.load.lock().await.take().unwrap();
        load.join().await;

        let (status, body) = get_json(app, "/api/map").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["matched"], 2);
    }
}
