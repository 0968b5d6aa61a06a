//! REST API for the roster engine.
//!
//! Provides endpoints for:
//! - Demo data retrieval
//! - Roster editing with undo/redo
//! - Optimizer start/stop, with batches applied in the background
//! - Share links and workbook import/export

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::console::GenerationTimer;
use crate::demo_data::{self, DemoData, DemoRoster};
use crate::domain::{ShiftCode, ShiftType, ShiftTypePatch, Staff};
use crate::dto::{
    AnalyzeResponse, CellAnalysisResponse, CellResponse, DaysRequest, ErrorResponse, GenerateResponse,
    HealthResponse, HistoryResponse, InfoResponse, PaintRequest, RequestResponse, RequirementRequest,
    RosterDto, RosterUpload, ShareResponse, SharedRosterDto, StartDateRequest, TargetsRequest,
};
use crate::error::EngineError;
use crate::interchange::{self, ImportedRoster, Workbook};
use crate::rules::RulePatch;
use crate::session::{OptimizationSession, SessionEvent};
use crate::share;
use crate::store::{HistoryStore, StaffPatch};

/// Horizon of the empty roster the server starts with.
const INITIAL_DAYS: usize = 30;

// ============================================================================
// State
// ============================================================================

/// Application state shared across handlers.
///
/// Lock order is session, then store. The store lock is never held across
/// an `.await`.
pub struct AppState {
    store: Mutex<HistoryStore>,
    session: tokio::sync::Mutex<OptimizationSession>,
    timer: Mutex<Option<GenerationTimer>>,
}

impl AppState {
    /// Builds the state and spawns the task that applies optimizer batches.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        let mut session = OptimizationSession::new(config.clone())?;
        let events = session.take_events().ok_or(EngineError::WorkerUnavailable)?;
        let store = HistoryStore::new(Utc::now().date_naive(), INITIAL_DAYS, &config);

        let state = Arc::new(Self {
            store: Mutex::new(store),
            session: tokio::sync::Mutex::new(session),
            timer: Mutex::new(None),
        });
        tokio::spawn(apply_batches(Arc::downgrade(&state), events));
        Ok(state)
    }

    /// Stops any running optimizer loop before a configuration change.
    async fn halt_generation(&self) {
        let mut session = self.session.lock().await;
        session.stop();
        let was_generating = {
            let mut store = self.store.lock();
            let generating = store.is_generating();
            store.stop_generation();
            generating
        };
        if was_generating {
            info!(epoch = session.epoch(), "Generation halted");
        }
        self.finish_timer();
    }

    fn finish_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.finish();
        }
    }

    async fn apply_event(&self, event: SessionEvent) {
        let session = self.session.lock().await;
        match event {
            SessionEvent::Batch(result) => {
                let result = match session.accept(result) {
                    Ok(result) => result,
                    Err(err) => {
                        debug!(error = %err, "Discarding batch");
                        return;
                    }
                };
                let (generation, score) = (result.generation, result.best_score);
                let applied = self.store.lock().accept_batch(result);
                match applied {
                    Ok(true) => {
                        if let Some(timer) = self.timer.lock().as_mut() {
                            timer.record_batch(generation, score);
                        }
                    }
                    Ok(false) => debug!(generation, "Generation stopped, batch ignored"),
                    Err(err) => warn!(error = %err, generation, "Rejected batch"),
                }
            }
            SessionEvent::Failed(err @ EngineError::StaleResult { .. }) => {
                debug!(error = %err, "Discarding failure from a superseded loop");
            }
            SessionEvent::Failed(err) => {
                warn!(epoch = session.epoch(), error = %err, "Optimizer batch failed");
                self.store.lock().stop_generation();
                self.finish_timer();
            }
        }
    }
}

/// Applies session events in arrival order until the state is dropped.
async fn apply_batches(state: Weak<AppState>, mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(state) = state.upgrade() else {
            break;
        };
        state.apply_event(event).await;
    }
    debug!("Batch applier exited");
}

// ============================================================================
// Errors
// ============================================================================

/// Maps engine errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            EngineError::Configuration(_)
            | EngineError::ShapeMismatch { .. }
            | EngineError::ImportFormat(_)
            | EngineError::InvalidRoster(_)
            | EngineError::Share(_) => StatusCode::BAD_REQUEST,
            EngineError::StaleResult { .. } => StatusCode::CONFLICT,
            EngineError::WorkerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn kind(&self) -> &'static str {
        match self.0 {
            EngineError::Configuration(_) => "CONFIGURATION",
            EngineError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            EngineError::ImportFormat(_) => "IMPORT_FORMAT",
            EngineError::StaleResult { .. } => "STALE_RESULT",
            EngineError::InvalidRoster(_) => "INVALID_ROSTER",
            EngineError::Share(_) => "SHARE",
            EngineError::WorkerUnavailable => "WORKER_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.0.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Router
// ============================================================================

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{id}", get(get_demo_data))
        // Roster
        .route("/roster", get(get_roster).put(put_roster))
        .route("/roster/days", put(set_days))
        .route("/roster/start-date", put(set_start_date))
        .route("/roster/analysis", get(analyze_roster))
        .route("/roster/cells/{staff}/{day}", put(paint_cell))
        .route("/roster/cells/{staff}/{day}/cycle", post(cycle_cell))
        .route("/roster/cells/{staff}/{day}/request", post(toggle_request))
        .route("/roster/cells/{staff}/{day}/analysis", get(analyze_cell))
        .route("/roster/undo", post(undo))
        .route("/roster/redo", post(redo))
        .route("/roster/clear-non-night", post(clear_non_night))
        .route("/roster/mirror-trainees", post(mirror_trainees))
        .route("/roster/staff", post(add_staff))
        .route("/roster/staff/{id}", patch(update_staff).delete(remove_staff))
        .route("/roster/targets", post(distribute_targets))
        .route("/roster/rules/{id}", patch(update_rule))
        .route("/roster/requirement", put(set_requirement))
        .route("/roster/shift-types/{id}", patch(update_shift_type))
        // Optimizer
        .route("/roster/generate", post(start_generation).delete(stop_generation))
        // Share & interchange
        .route("/roster/share", get(share_roster))
        .route("/share/{data}", get(open_share))
        .route("/roster/import", post(import_workbook))
        .route("/roster/export", get(export_workbook))
        .with_state(state)
}

// ============================================================================
// Health & Info
// ============================================================================

/// GET /health - Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// GET /info - Application info endpoint.
async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Roster Engine",
        version: env!("CARGO_PKG_VERSION"),
        solver_engine: "Genetic",
    })
}

/// GET /demo-data - List available demo data sets.
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(demo_data::list_demo_data())
}

/// GET /demo-data/{id} - Get a specific demo roster.
async fn get_demo_data(Path(id): Path<String>) -> Result<Json<DemoRoster>, StatusCode> {
    match id.parse::<DemoData>() {
        Ok(demo) => Ok(Json(demo_data::generate(demo))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

// ============================================================================
// Roster
// ============================================================================

/// GET /roster - Current roster, score and history flags.
async fn get_roster(State(state): State<Arc<AppState>>) -> Json<RosterDto> {
    Json(RosterDto::from_store(&state.store.lock()))
}

/// PUT /roster - Replace the whole roster. Clears history.
async fn put_roster(State(state): State<Arc<AppState>>, Json(upload): Json<RosterUpload>) -> ApiResult<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.import(ImportedRoster {
        staff: upload.staff,
        schedule: upload.schedule,
        start_date: upload.start_date,
        days: upload.days,
    })?;
    info!(staff = store.staff().len(), days = store.days(), "Roster loaded");
    Ok(Json(RosterDto::from_store(&store)))
}

/// PUT /roster/days - Change the horizon length.
async fn set_days(State(state): State<Arc<AppState>>, Json(req): Json<DaysRequest>) -> ApiResult<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.set_days(req.days)?;
    Ok(Json(RosterDto::from_store(&store)))
}

/// PUT /roster/start-date - Move the horizon start.
async fn set_start_date(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartDateRequest>,
) -> Json<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.set_start_date(req.start_date);
    Json(RosterDto::from_store(&store))
}

/// GET /roster/analysis - Penalty per enabled rule.
async fn analyze_roster(State(state): State<Arc<AppState>>) -> ApiResult<AnalyzeResponse> {
    let store = state.store.lock();
    Ok(Json(AnalyzeResponse {
        score: store.score(),
        rules: store.rule_breakdown()?,
    }))
}

/// PUT /roster/cells/{staff}/{day} - Paint one cell.
async fn paint_cell(
    State(state): State<Arc<AppState>>,
    Path((staff_index, day)): Path<(usize, usize)>,
    Json(req): Json<PaintRequest>,
) -> ApiResult<CellResponse> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.paint_cell(staff_index, day, req.code)?;
    Ok(Json(CellResponse {
        staff_index,
        day,
        code: req.code,
        score: store.score(),
    }))
}

/// POST /roster/cells/{staff}/{day}/cycle - Advance one cell to the next shift.
async fn cycle_cell(
    State(state): State<Arc<AppState>>,
    Path((staff_index, day)): Path<(usize, usize)>,
) -> ApiResult<CellResponse> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    let code = store.cycle_cell(staff_index, day)?;
    Ok(Json(CellResponse {
        staff_index,
        day,
        code,
        score: store.score(),
    }))
}

/// POST /roster/cells/{staff}/{day}/request - Cycle the day request.
async fn toggle_request(
    State(state): State<Arc<AppState>>,
    Path((staff_index, day)): Path<(usize, usize)>,
) -> ApiResult<RequestResponse> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    let request = store.toggle_request(staff_index, day)?;
    Ok(Json(RequestResponse {
        staff_index,
        day,
        request,
    }))
}

/// GET /roster/cells/{staff}/{day}/analysis - Rule messages for one cell.
async fn analyze_cell(
    State(state): State<Arc<AppState>>,
    Path((staff_index, day)): Path<(usize, usize)>,
) -> ApiResult<CellAnalysisResponse> {
    let store = state.store.lock();
    let reasons = store.analyze_cell(staff_index, day)?;
    Ok(Json(CellAnalysisResponse {
        staff_index,
        day,
        blame: store.blame().get(staff_index, day),
        reasons,
    }))
}

fn history_response(store: &HistoryStore, changed: bool) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        changed,
        can_undo: store.can_undo(),
        can_redo: store.can_redo(),
    })
}

/// POST /roster/undo
async fn undo(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    let changed = store.undo();
    history_response(&store, changed)
}

/// POST /roster/redo
async fn redo(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    let changed = store.redo();
    history_response(&store, changed)
}

/// POST /roster/clear-non-night - Day and Evening cells become Off.
async fn clear_non_night(State(state): State<Arc<AppState>>) -> Json<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.clear_non_night();
    Json(RosterDto::from_store(&store))
}

/// POST /roster/mirror-trainees - Copy preceptor rows onto trainees.
async fn mirror_trainees(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    let changed = store.mirror_trainees();
    history_response(&store, changed)
}

/// POST /roster/staff - Append a staff member.
async fn add_staff(State(state): State<Arc<AppState>>, Json(staff): Json<Staff>) -> ApiResult<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.add_staff(staff)?;
    Ok(Json(RosterDto::from_store(&store)))
}

/// PATCH /roster/staff/{id} - Edit staff fields.
async fn update_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<StaffPatch>,
) -> ApiResult<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.update_staff(&id, &patch)?;
    Ok(Json(RosterDto::from_store(&store)))
}

/// DELETE /roster/staff/{id}
async fn remove_staff(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.remove_staff(&id)?;
    Ok(Json(RosterDto::from_store(&store)))
}

/// POST /roster/targets - Set a target field for everyone, or spread nights.
async fn distribute_targets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TargetsRequest>,
) -> Json<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    match req.value {
        Some(value) => store.distribute_targets(req.field, value),
        None => store.auto_distribute_targets(),
    }
    Json(RosterDto::from_store(&store))
}

/// PATCH /roster/rules/{id} - Enable, reweight or retune a rule.
async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<RulePatch>,
) -> ApiResult<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.update_rule(&id, &patch)?;
    Ok(Json(RosterDto::from_store(&store)))
}

/// PUT /roster/requirement - Set one headcount cell.
async fn set_requirement(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequirementRequest>,
) -> Json<RosterDto> {
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.set_requirement(req.day_class, req.shift, req.value);
    Json(RosterDto::from_store(&store))
}

/// PATCH /roster/shift-types/{id} - Relabel a shift type.
async fn update_shift_type(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShiftCode>,
    Json(patch): Json<ShiftTypePatch>,
) -> ApiResult<ShiftType> {
    let mut store = state.store.lock();
    Ok(Json(store.update_shift_type(id, &patch)?.clone()))
}

// ============================================================================
// Optimizer
// ============================================================================

/// POST /roster/generate - Start (or restart) the optimizer from the live roster.
async fn start_generation(State(state): State<Arc<AppState>>) -> ApiResult<GenerateResponse> {
    let mut session = state.session.lock().await;
    let payload = {
        let mut store = state.store.lock();
        store.begin_generation()?
    };
    let staff = payload.staff.len();
    let days = payload.days;
    let enabled_rules = payload.rules.iter().filter(|r| r.enabled).count();

    let epoch = match session.initialize(payload).await {
        Ok(epoch) => epoch,
        Err(err) => {
            warn!(error = %err, "Optimizer failed to initialize");
            state.store.lock().stop_generation();
            return Err(err.into());
        }
    };

    let (generation, score) = {
        let store = state.store.lock();
        (store.generation(), store.score())
    };
    state.finish_timer();
    *state.timer.lock() = Some(GenerationTimer::start(epoch, staff, days, enabled_rules, generation, score));
    session.start(generation);
    info!(epoch, generation, "Generation started");

    Ok(Json(GenerateResponse { epoch, generation }))
}

/// DELETE /roster/generate - Stop at the next batch boundary.
async fn stop_generation(State(state): State<Arc<AppState>>) -> Json<RosterDto> {
    state.halt_generation().await;
    Json(RosterDto::from_store(&state.store.lock()))
}

// ============================================================================
// Share & interchange
// ============================================================================

/// GET /roster/share - Encode the roster as a URL-safe token.
async fn share_roster(State(state): State<Arc<AppState>>) -> ApiResult<ShareResponse> {
    let payload = state.store.lock().share_payload();
    Ok(Json(ShareResponse {
        token: share::encode(&payload)?,
    }))
}

/// GET /share/{data} - Read-only roster from a token.
async fn open_share(Path(data): Path<String>) -> ApiResult<SharedRosterDto> {
    let payload = share::decode(&data)?;
    let schedule = payload.matrix()?;
    Ok(Json(SharedRosterDto {
        staff: payload.staff,
        days: payload.days,
        schedule,
    }))
}

/// POST /roster/import - Replace the roster from a workbook.
async fn import_workbook(
    State(state): State<Arc<AppState>>,
    Json(workbook): Json<Workbook>,
) -> ApiResult<RosterDto> {
    let imported = interchange::import_workbook(&workbook)?;
    state.halt_generation().await;
    let mut store = state.store.lock();
    store.import(imported)?;
    info!(staff = store.staff().len(), days = store.days(), "Workbook imported");
    Ok(Json(RosterDto::from_store(&store)))
}

/// GET /roster/export - Full-state workbook.
async fn export_workbook(State(state): State<Arc<AppState>>) -> ApiResult<Workbook> {
    let store = state.store.lock();
    Ok(Json(interchange::export_workbook(
        store.staff(),
        store.schedule(),
        store.start_date(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interchange::{CellValue, Sheet};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> EngineConfig {
        EngineConfig {
            population_size: 12,
            batch_size: 3,
            ..EngineConfig::default()
        }
        .with_random_seed(7)
    }

    fn app() -> (Router, Arc<AppState>) {
        let state = AppState::spawn(test_config()).unwrap();
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn load_small(app: &Router) -> Value {
        let (_, demo) = send(app, "GET", "/demo-data/SMALL", None).await;
        let (status, roster) = send(app, "PUT", "/roster", Some(demo)).await;
        assert_eq!(status, StatusCode::OK, "{}", roster);
        roster
    }

    #[tokio::test]
    async fn test_health_and_demo_list() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");

        let (_, list) = send(&app, "GET", "/demo-data", None).await;
        assert_eq!(list, json!(["SMALL", "LARGE"]));

        let (status, _) = send(&app, "GET", "/demo-data/HUGE", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_roster_then_paint_and_undo() {
        let (app, _) = app();
        let roster = load_small(&app).await;
        assert_eq!(roster["staff"].as_array().unwrap().len(), 12);
        assert_eq!(roster["canUndo"], false);

        let before = send(&app, "GET", "/roster", None).await.1["schedule"]["cells"].clone();
        let (status, _) = send(&app, "POST", "/roster/cells/2/0/cycle", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, history) = send(&app, "POST", "/roster/undo", None).await;
        assert_eq!(history["changed"], true);
        assert_eq!(history["canRedo"], true);
        let after = send(&app, "GET", "/roster", None).await.1["schedule"]["cells"].clone();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let (app, _) = app();
        load_small(&app).await;

        let (status, body) = send(&app, "PUT", "/roster/cells/99/0", Some(json!({ "code": 1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "CONFIGURATION");

        let (status, body) = send(&app, "PUT", "/roster/days", Some(json!({ "days": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

        let (status, body) = send(&app, "GET", "/share/not-a-token", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "SHARE");

        let stale = ApiError(EngineError::StaleResult {
            result_epoch: 1,
            current_epoch: 2,
        });
        assert_eq!(stale.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(EngineError::WorkerUnavailable).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_share_link_round_trip() {
        let (app, _) = app();
        let roster = load_small(&app).await;

        let (_, share) = send(&app, "GET", "/roster/share", None).await;
        let token = share["token"].as_str().unwrap().to_string();
        let (status, shared) = send(&app, "GET", &format!("/share/{}", token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shared["staff"], roster["staff"]);
        assert_eq!(shared["schedule"], roster["schedule"]);
    }

    #[tokio::test]
    async fn test_import_legacy_workbook() {
        let (app, _) = app();
        let mut sheet = Sheet::new("Sheet1", vec!["Name".into()]);
        sheet.push_row([("Name", CellValue::from("Kim"))]);
        sheet.push_row([("Name", CellValue::from("Kim"))]);
        let workbook = Workbook { sheets: vec![sheet] };

        let (status, roster) = send(&app, "POST", "/roster/import", Some(serde_json::to_value(&workbook).unwrap())).await;
        assert_eq!(status, StatusCode::OK, "{}", roster);
        let names: Vec<&str> = roster["staff"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Kim", "Kim(2)"]);

        let empty = Workbook::default();
        let (status, body) = send(&app, "POST", "/roster/import", Some(serde_json::to_value(&empty).unwrap())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "IMPORT_FORMAT");
    }

    #[tokio::test]
    async fn test_export_contains_full_state_sheets() {
        let (app, _) = app();
        load_small(&app).await;
        let (_, workbook) = send(&app, "GET", "/roster/export", None).await;
        let names: Vec<&str> = workbook["sheets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Monthly Schedule", "Staff Config", "Metadata", "Schedule Raw"]);
    }

    #[tokio::test]
    async fn test_generate_applies_batches_until_stopped() {
        let (app, state) = app();
        load_small(&app).await;

        let (status, started) = send(&app, "POST", "/roster/generate", None).await;
        assert_eq!(status, StatusCode::OK, "{}", started);
        assert_eq!(started["epoch"], 1);

        let mut generation = 0;
        for _ in 0..500 {
            generation = state.store.lock().generation();
            if generation > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(generation > 0, "no batch was applied");

        let (_, roster) = send(&app, "DELETE", "/roster/generate", None).await;
        assert_eq!(roster["solverStatus"], "IDLE");
        assert!(state.store.lock().can_undo(), "generation start is an undo point");

        // Batches still in flight after the stop are ignored.
        let frozen = state.store.lock().generation();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.store.lock().generation(), frozen);
    }

    async fn wait_for_batch(state: &AppState) -> u64 {
        for _ in 0..500 {
            let generation = state.store.lock().generation();
            if generation > 0 {
                return generation;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no batch was applied");
    }

    #[tokio::test]
    async fn test_paint_during_generation_survives() {
        let (app, state) = app();
        load_small(&app).await;
        send(&app, "POST", "/roster/generate", None).await;
        wait_for_batch(&state).await;

        let code = (state.store.lock().schedule().get(3, 0) + 1) % 4;
        let (status, body) = send(&app, "PUT", "/roster/cells/3/0", Some(json!({ "code": code }))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(!state.store.lock().is_generating());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(state.store.lock().schedule().get(3, 0), code);

        let (_, roster) = send(&app, "GET", "/roster", None).await;
        assert_eq!(roster["solverStatus"], "IDLE");
    }

    #[tokio::test]
    async fn test_roster_replaced_with_more_staff_during_generation() {
        let (app, state) = app();
        let (_, mut demo) = send(&app, "GET", "/demo-data/SMALL", None).await;
        send(&app, "PUT", "/roster", Some(demo.clone())).await;
        send(&app, "POST", "/roster/generate", None).await;
        wait_for_batch(&state).await;

        demo["staff"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "RES-13", "name": "Newcomer" }));
        let (status, roster) = send(&app, "PUT", "/roster", Some(demo)).await;
        assert_eq!(status, StatusCode::OK, "{}", roster);
        assert_eq!(roster["staff"].as_array().unwrap().len(), 13);
        assert_eq!(roster["schedule"]["staffCount"], 13);

        // Nothing from the old epoch lands on the new roster.
        tokio::time::sleep(Duration::from_millis(80)).await;
        {
            let store = state.store.lock();
            assert!(!store.is_generating());
            assert!(store.schedule().has_shape(13, 28));
            assert_eq!(serde_json::to_value(store.schedule()).unwrap(), roster["schedule"]);
        }

        let (status, restarted) = send(&app, "POST", "/roster/generate", None).await;
        assert_eq!(status, StatusCode::OK, "{}", restarted);
        assert_eq!(restarted["epoch"], 2);
        let start = restarted["generation"].as_u64().unwrap();
        for _ in 0..500 {
            if state.store.lock().generation() > start {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let store = state.store.lock();
        assert!(store.generation() > start, "no batch from the new epoch");
        assert!(store.schedule().has_shape(13, 28));
        assert!(store.blame().has_shape(13, 28));
    }

    #[tokio::test]
    async fn test_shift_type_relabel() {
        let (app, _) = app();
        let (status, shift) = send(&app, "PATCH", "/roster/shift-types/3", Some(json!({ "name": "Overnight" }))).await;
        assert_eq!(status, StatusCode::OK, "{}", shift);
        assert_eq!(shift["name"], "Overnight");
        assert_eq!(shift["code"], "N");

        let (_, roster) = send(&app, "GET", "/roster", None).await;
        assert_eq!(roster["shiftTypes"][3]["name"], "Overnight");

        let (status, _) = send(&app, "PATCH", "/roster/shift-types/8", Some(json!({ "name": "X" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_on_empty_roster_fails() {
        let (app, state) = app();
        let (status, body) = send(&app, "POST", "/roster/generate", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "CONFIGURATION");
        assert!(!state.store.lock().is_generating());
    }
}
