//! DTOs for REST API requests/responses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constraints::RuleScore;
use crate::domain::{BlameMatrix, DayClass, Requirement, ScheduleMatrix, ShiftCode, ShiftType, Staff};
use crate::rules::ConstraintRule;
use crate::session::SessionStatus;
use crate::store::{HistoryStore, TargetField};

/// Full view of the live roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterDto {
    pub staff: Vec<Staff>,
    pub days: usize,
    pub start_date: NaiveDate,
    pub schedule: ScheduleMatrix,
    pub blame: BlameMatrix,
    pub score: f64,
    pub generation: u64,
    pub rules: Vec<ConstraintRule>,
    pub requirement: Requirement,
    pub shift_types: Vec<ShiftType>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub solver_status: SessionStatus,
}

impl RosterDto {
    pub fn from_store(store: &HistoryStore) -> Self {
        Self {
            staff: store.staff().to_vec(),
            days: store.days(),
            start_date: store.start_date(),
            schedule: store.schedule().clone(),
            blame: store.blame().clone(),
            score: store.score(),
            generation: store.generation(),
            rules: store.rules().to_vec(),
            requirement: store.requirement().clone(),
            shift_types: store.shift_types().to_vec(),
            can_undo: store.can_undo(),
            can_redo: store.can_redo(),
            solver_status: if store.is_generating() {
                SessionStatus::Running
            } else {
                SessionStatus::Idle
            },
        }
    }
}

/// Whole-roster replacement. A schedule of the wrong shape is discarded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUpload {
    pub staff: Vec<Staff>,
    #[serde(default)]
    pub schedule: Option<ScheduleMatrix>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub days: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaintRequest {
    pub code: ShiftCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaysRequest {
    pub days: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDateRequest {
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementRequest {
    pub day_class: DayClass,
    pub shift: ShiftCode,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsRequest {
    pub field: TargetField,
    /// Omitted to spread required nights automatically.
    #[serde(default)]
    pub value: Option<u32>,
}

/// Response for a single edited cell.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellResponse {
    pub staff_index: usize,
    pub day: usize,
    pub code: ShiftCode,
    pub score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub staff_index: usize,
    pub day: usize,
    pub request: Option<ShiftCode>,
}

/// Rule messages attributed to one cell.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellAnalysisResponse {
    pub staff_index: usize,
    pub day: usize,
    pub blame: f32,
    pub reasons: Vec<String>,
}

/// Per-rule penalty breakdown.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub score: f64,
    pub rules: Vec<RuleScore>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub epoch: u64,
    pub generation: u64,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub token: String,
}

/// Read-only roster rebuilt from a share token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedRosterDto {
    pub staff: Vec<Staff>,
    pub days: usize,
    pub schedule: ScheduleMatrix,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub changed: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub solver_engine: &'static str,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
