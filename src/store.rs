//! The authoritative roster state with bounded undo/redo.
//!
//! Every manual mutation snapshots the pre-mutation state, clears the redo
//! stack, applies the change and re-scores the schedule. Taking `&mut self`
//! serializes mutations. Accepting optimizer output replaces the schedule
//! without a snapshot; the single snapshot is taken when generation starts.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::constraints::{analyze_cell, evaluate, rule_breakdown, EvalContext, RuleScore};
use crate::domain::{
    default_shift_types, validate_roster, BlameMatrix, DayClass, Requirement, ScheduleMatrix,
    ShiftCode, ShiftType, ShiftTypePatch, Staff, StateSnapshot, DAY, EVENING, NIGHT, OFF,
};
use crate::error::{EngineError, Result};
use crate::interchange::ImportedRoster;
use crate::rules::{default_rules, ConstraintRule, RulePatch};
use crate::session::{BatchResult, InitPayload};
use crate::share::SharePayload;
use crate::solver;

pub use crate::domain::MAX_DAYS;

/// Field set by [`HistoryStore::distribute_targets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetField {
    TargetNight,
    TargetEvening,
    MinOff,
}

fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of one staff member. `null` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPatch {
    pub name: Option<String>,
    pub team: Option<String>,
    pub level: Option<u8>,
    pub target_night: Option<u32>,
    pub target_evening: Option<u32>,
    pub min_off: Option<u32>,
    pub is_preceptor: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub on_training: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub fixed_shift: Option<Option<ShiftCode>>,
    pub forbidden_shifts: Option<BTreeSet<ShiftCode>>,
    pub exclude_from_count: Option<bool>,
    pub is_weekday_day_only: Option<bool>,
    pub prev_shift: Option<ShiftCode>,
}

impl StaffPatch {
    fn apply(&self, staff: &mut Staff) {
        if let Some(name) = &self.name {
            staff.name = name.clone();
        }
        if let Some(team) = &self.team {
            staff.team = team.clone();
        }
        if let Some(level) = self.level {
            staff.level = level;
        }
        if let Some(v) = self.target_night {
            staff.target_night = v;
        }
        if let Some(v) = self.target_evening {
            staff.target_evening = v;
        }
        if let Some(v) = self.min_off {
            staff.min_off = v;
        }
        if let Some(v) = self.is_preceptor {
            staff.is_preceptor = v;
        }
        if let Some(v) = &self.on_training {
            staff.on_training = v.clone();
        }
        if let Some(v) = self.fixed_shift {
            staff.fixed_shift = v;
        }
        if let Some(v) = &self.forbidden_shifts {
            staff.forbidden_shifts = v.clone();
        }
        if let Some(v) = self.exclude_from_count {
            staff.exclude_from_count = v;
        }
        if let Some(v) = self.is_weekday_day_only {
            staff.is_weekday_day_only = v;
        }
        if let Some(v) = self.prev_shift {
            staff.prev_shift = v;
        }
    }
}

/// Next code in the Off → Day → Evening → Night → Off cycle.
fn next_in_cycle(code: ShiftCode) -> ShiftCode {
    if code >= NIGHT {
        OFF
    } else {
        code + 1
    }
}

/// Next request in the none → O → D → E → N → none cycle.
fn next_request(current: Option<ShiftCode>) -> Option<ShiftCode> {
    match current {
        None => Some(OFF),
        Some(OFF) => Some(DAY),
        Some(DAY) => Some(EVENING),
        Some(EVENING) => Some(NIGHT),
        Some(_) => None,
    }
}

/// Owns the live roster, schedule, score, and history stacks.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use roster_engine::config::EngineConfig;
/// use roster_engine::domain::Staff;
/// use roster_engine::store::HistoryStore;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let staff = vec![Staff::new("a", "Kim"), Staff::new("b", "Lee")];
/// let mut store = HistoryStore::with_roster(staff, start, 7, &EngineConfig::default()).unwrap();
///
/// store.cycle_cell(0, 0).unwrap();
/// assert_eq!(store.schedule().get(0, 0), 1);
/// assert!(store.undo());
/// assert_eq!(store.schedule().get(0, 0), 0);
/// assert!(store.can_redo());
/// ```
pub struct HistoryStore {
    staff: Vec<Staff>,
    days: usize,
    start_date: NaiveDate,
    schedule: ScheduleMatrix,
    blame: BlameMatrix,
    score: f64,
    generation: u64,
    rules: Vec<ConstraintRule>,
    requirement: Requirement,
    shift_types: Vec<ShiftType>,
    history: VecDeque<StateSnapshot>,
    future: VecDeque<StateSnapshot>,
    capacity: usize,
    generating: bool,
}

impl HistoryStore {
    /// An empty roster with the default rules and requirement.
    pub fn new(start_date: NaiveDate, days: usize, config: &EngineConfig) -> Self {
        let days = days.clamp(1, MAX_DAYS);
        Self {
            staff: Vec::new(),
            days,
            start_date,
            schedule: ScheduleMatrix::new(0, days),
            blame: BlameMatrix::new(0, days),
            score: 0.0,
            generation: 0,
            rules: default_rules(),
            requirement: Requirement::default(),
            shift_types: default_shift_types(),
            history: VecDeque::new(),
            future: VecDeque::new(),
            capacity: config.history_capacity.max(1),
            generating: false,
        }
    }

    pub fn with_roster(
        staff: Vec<Staff>,
        start_date: NaiveDate,
        days: usize,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut store = Self::new(start_date, days, config);
        store.load_roster(staff, None)?;
        Ok(store)
    }

    pub fn staff(&self) -> &[Staff] {
        &self.staff
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn schedule(&self) -> &ScheduleMatrix {
        &self.schedule
    }

    pub fn blame(&self) -> &BlameMatrix {
        &self.blame
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn shift_types(&self) -> &[ShiftType] {
        &self.shift_types
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Deep copy of the undoable state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            schedule: self.schedule.clone(),
            staff: self.staff.clone(),
            days: self.days,
            start_date: self.start_date,
        }
    }

    fn push_bounded(stack: &mut VecDeque<StateSnapshot>, snapshot: StateSnapshot, capacity: usize) {
        stack.push_back(snapshot);
        while stack.len() > capacity {
            stack.pop_front();
        }
    }

    /// Records the current state as an undo point and clears redo.
    fn checkpoint(&mut self) {
        let snapshot = self.snapshot();
        Self::push_bounded(&mut self.history, snapshot, self.capacity);
        self.future.clear();
    }

    fn restore(&mut self, snapshot: StateSnapshot) {
        self.schedule = snapshot.schedule;
        self.staff = snapshot.staff;
        self.days = snapshot.days;
        self.start_date = snapshot.start_date;
    }

    fn context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.staff, self.days, self.start_date, &self.requirement)
    }

    /// Re-scores the live schedule, reallocating blame if the shape moved.
    fn refresh(&mut self) {
        let (n, days) = (self.staff.len(), self.days);
        if !self.blame.has_shape(n, days) {
            self.blame = BlameMatrix::new(n, days);
        }
        let ctx = EvalContext::new(&self.staff, days, self.start_date, &self.requirement);
        match evaluate(&self.schedule, &ctx, &self.rules, Some(&mut self.blame)) {
            Ok(score) => self.score = score,
            Err(err) => {
                warn!(error = %err, "Failed to score live schedule");
                self.blame.fill(0.0);
                self.score = 0.0;
            }
        }
    }

    fn check_cell(&self, staff_index: usize, day: usize) -> Result<()> {
        if staff_index >= self.staff.len() || day >= self.days {
            return Err(EngineError::Configuration(format!(
                "cell ({}, {}) is outside the {}×{} roster",
                staff_index,
                day,
                self.staff.len(),
                self.days
            )));
        }
        Ok(())
    }

    pub fn staff_index(&self, id: &str) -> Result<usize> {
        self.staff
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| EngineError::InvalidRoster(format!("no staff with id '{}'", id)))
    }

    // ------------------------------------------------------------------
    // Schedule edits
    // ------------------------------------------------------------------

    /// Advances one cell through Off → Day → Evening → Night → Off.
    pub fn cycle_cell(&mut self, staff_index: usize, day: usize) -> Result<ShiftCode> {
        self.check_cell(staff_index, day)?;
        self.checkpoint();
        let next = next_in_cycle(self.schedule.get(staff_index, day));
        self.schedule.set(staff_index, day, next);
        self.refresh();
        Ok(next)
    }

    /// Sets one cell. Returns false, without a snapshot, if it already held `code`.
    pub fn paint_cell(&mut self, staff_index: usize, day: usize, code: ShiftCode) -> Result<bool> {
        self.check_cell(staff_index, day)?;
        if code > NIGHT {
            return Err(EngineError::Configuration(format!("unknown shift code {}", code)));
        }
        if self.schedule.get(staff_index, day) == code {
            return Ok(false);
        }
        self.checkpoint();
        self.schedule.set(staff_index, day, code);
        self.refresh();
        Ok(true)
    }

    /// Turns every Day and Evening into Off, keeping Nights.
    pub fn clear_non_night(&mut self) {
        self.checkpoint();
        for cell in self.schedule.cells_mut() {
            if *cell == DAY || *cell == EVENING {
                *cell = OFF;
            }
        }
        self.refresh();
    }

    /// Copies preceptor rows onto trainees. Snapshots only if something changed.
    pub fn mirror_trainees(&mut self) -> bool {
        let mut mirrored = self.schedule.clone();
        if !solver::mirror_trainees(&mut mirrored, &self.staff) {
            return false;
        }
        self.checkpoint();
        self.schedule = mirrored;
        self.refresh();
        true
    }

    // ------------------------------------------------------------------
    // Staff edits
    // ------------------------------------------------------------------

    /// Applies `patch` to one staff member. The roster must stay valid.
    pub fn update_staff(&mut self, id: &str, patch: &StaffPatch) -> Result<()> {
        let index = self.staff_index(id)?;
        let mut staff = self.staff.clone();
        patch.apply(&mut staff[index]);
        validate_roster(&staff)?;

        self.checkpoint();
        self.staff = staff;
        self.refresh();
        Ok(())
    }

    /// Sets or clears a day request.
    pub fn set_request(&mut self, staff_index: usize, day: usize, code: Option<ShiftCode>) -> Result<()> {
        self.check_cell(staff_index, day)?;
        if let Some(code) = code.filter(|&c| c > NIGHT) {
            return Err(EngineError::Configuration(format!("unknown shift code {}", code)));
        }
        self.checkpoint();
        let requests = &mut self.staff[staff_index].requests;
        match code {
            Some(code) => requests.insert(day, code),
            None => requests.remove(&day),
        };
        self.refresh();
        Ok(())
    }

    /// Cycles a day request: none → O → D → E → N → none.
    pub fn toggle_request(&mut self, staff_index: usize, day: usize) -> Result<Option<ShiftCode>> {
        self.check_cell(staff_index, day)?;
        let next = next_request(self.staff[staff_index].requests.get(&day).copied());
        self.set_request(staff_index, day, next)?;
        Ok(next)
    }

    /// Sets one target field on every staff member.
    ///
    /// Weekday-day-only staff keep their night target.
    pub fn distribute_targets(&mut self, field: TargetField, value: u32) {
        self.checkpoint();
        for staff in &mut self.staff {
            match field {
                TargetField::TargetNight if staff.is_weekday_day_only => {}
                TargetField::TargetNight => staff.target_night = value,
                TargetField::TargetEvening => staff.target_evening = value,
                TargetField::MinOff => staff.min_off = value,
            }
        }
        self.refresh();
    }

    /// Spreads the horizon's required nights across counted staff.
    ///
    /// Each counted, non-weekday-day-only staff member gets the floor share;
    /// the remainder goes one each to the first of them. Weekday-day-only
    /// staff are set to zero.
    pub fn auto_distribute_targets(&mut self) {
        let total: u32 = self
            .requirement
            .day_classes(self.start_date, self.days)
            .into_iter()
            .map(|class| self.requirement.for_class(class).night)
            .sum();
        let active = self
            .staff
            .iter()
            .filter(|s| !s.exclude_from_count && !s.is_weekday_day_only)
            .count() as u32;
        if active == 0 {
            return;
        }

        self.checkpoint();
        let base = total / active;
        let mut remainder = total % active;
        for staff in &mut self.staff {
            if staff.is_weekday_day_only {
                staff.target_night = 0;
            } else if !staff.exclude_from_count {
                staff.target_night = base + u32::from(remainder > 0);
                remainder = remainder.saturating_sub(1);
            }
        }
        self.refresh();
    }

    /// Appends a staff member with an all-off row.
    pub fn add_staff(&mut self, staff: Staff) -> Result<()> {
        let mut roster = self.staff.clone();
        roster.push(staff);
        validate_roster(&roster)?;

        self.checkpoint();
        self.schedule = self.schedule.remapped_rows(&self.staff, &roster);
        self.staff = roster;
        self.refresh();
        Ok(())
    }

    /// Removes a staff member; other rows keep their schedules.
    ///
    /// Trainees of the removed staff member lose their preceptor link.
    pub fn remove_staff(&mut self, id: &str) -> Result<Staff> {
        let index = self.staff_index(id)?;
        let mut roster = self.staff.clone();
        let removed = roster.remove(index);
        for s in &mut roster {
            if s.on_training.as_deref() == Some(id) {
                s.on_training = None;
            }
        }

        self.checkpoint();
        self.schedule = self.schedule.remapped_rows(&self.staff, &roster);
        self.staff = roster;
        self.refresh();
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Horizon edits
    // ------------------------------------------------------------------

    /// Changes the horizon, keeping day `d` at index `d`.
    pub fn set_days(&mut self, days: usize) -> Result<bool> {
        if !(1..=MAX_DAYS).contains(&days) {
            return Err(EngineError::Configuration(format!(
                "horizon of {} days is outside 1..={}",
                days, MAX_DAYS
            )));
        }
        if days == self.days {
            return Ok(false);
        }
        self.checkpoint();
        self.schedule = self.schedule.resized_days(days);
        self.days = days;
        self.refresh();
        Ok(true)
    }

    pub fn set_start_date(&mut self, start_date: NaiveDate) -> bool {
        if start_date == self.start_date {
            return false;
        }
        self.checkpoint();
        self.start_date = start_date;
        self.refresh();
        true
    }

    // ------------------------------------------------------------------
    // Whole-roster replacement
    // ------------------------------------------------------------------

    /// Replaces the roster and clears history.
    ///
    /// A schedule of the wrong shape is discarded for an all-off one.
    pub fn load_roster(&mut self, staff: Vec<Staff>, schedule: Option<ScheduleMatrix>) -> Result<()> {
        validate_roster(&staff)?;
        let schedule = match schedule {
            Some(s) if s.has_shape(staff.len(), self.days) => s,
            Some(s) => {
                warn!(expected = staff.len() * self.days, actual = s.len(), "Discarding mis-shaped schedule");
                ScheduleMatrix::new(staff.len(), self.days)
            }
            None => ScheduleMatrix::new(staff.len(), self.days),
        };
        self.staff = staff;
        self.schedule = schedule;
        self.generation = 0;
        self.history.clear();
        self.future.clear();
        self.refresh();
        Ok(())
    }

    /// Applies a parsed workbook. Nothing changes if the roster is invalid.
    pub fn import(&mut self, imported: ImportedRoster) -> Result<()> {
        validate_roster(&imported.staff)?;
        let days = imported.days.unwrap_or(self.days);
        if !(1..=MAX_DAYS).contains(&days) {
            return Err(EngineError::ImportFormat(format!("horizon of {} days is out of range", days)));
        }
        self.days = days;
        if let Some(start) = imported.start_date {
            self.start_date = start;
        }
        self.load_roster(imported.staff, imported.schedule)
    }

    // ------------------------------------------------------------------
    // Rules and requirements (not part of the snapshot)
    // ------------------------------------------------------------------

    pub fn update_rule(&mut self, id: &str, patch: &RulePatch) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::Configuration(format!("no rule with id '{}'", id)))?;
        patch.apply(rule);
        self.refresh();
        Ok(())
    }

    /// Relabels one entry of the shift catalog. Scores are unaffected.
    pub fn update_shift_type(&mut self, id: ShiftCode, patch: &ShiftTypePatch) -> Result<&ShiftType> {
        let shift = self
            .shift_types
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EngineError::Configuration(format!("unknown shift code {}", id)))?;
        patch.apply(shift);
        Ok(shift)
    }

    pub fn set_rules(&mut self, rules: Vec<ConstraintRule>) {
        self.rules = rules;
        self.refresh();
    }

    /// Sets one headcount cell of the weekday or weekend requirement.
    pub fn set_requirement(&mut self, class: DayClass, shift: ShiftCode, value: u32) {
        self.requirement.for_class_mut(class).set(shift, value);
        self.refresh();
    }

    pub fn replace_requirement(&mut self, requirement: Requirement) {
        self.requirement = requirement;
        self.refresh();
    }

    // ------------------------------------------------------------------
    // Optimizer hand-off
    // ------------------------------------------------------------------

    /// Snapshots once and returns the payload for a new optimizer epoch.
    pub fn begin_generation(&mut self) -> Result<InitPayload> {
        if self.staff.is_empty() {
            return Err(EngineError::Configuration("cannot optimize an empty roster".into()));
        }
        self.checkpoint();
        self.generating = true;
        Ok(InitPayload {
            staff: self.staff.clone(),
            days: self.days,
            start_date: self.start_date,
            rules: self.rules.clone(),
            requirement: self.requirement.clone(),
            warm_start: Some(self.schedule.clone()),
        })
    }

    /// Replaces schedule, score, blame and generation with a batch result.
    ///
    /// Returns false if generation has stopped. A result whose buffers do not
    /// match the live roster is rejected.
    pub fn accept_batch(&mut self, result: BatchResult) -> Result<bool> {
        if !self.generating {
            return Ok(false);
        }
        let n = self.staff.len();
        result.best_schedule.ensure_shape(n, self.days)?;
        result.blame.ensure_shape(n, self.days)?;

        debug!(generation = result.generation, score = result.best_score, "Applying batch");
        self.schedule = result.best_schedule;
        self.blame = result.blame;
        self.score = result.best_score;
        self.generation = result.generation;
        Ok(true)
    }

    pub fn stop_generation(&mut self) {
        self.generating = false;
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.pop_back() else {
            return false;
        };
        let current = self.snapshot();
        Self::push_bounded(&mut self.future, current, self.capacity);
        self.restore(previous);
        self.refresh();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop_back() else {
            return false;
        };
        let current = self.snapshot();
        Self::push_bounded(&mut self.history, current, self.capacity);
        self.restore(next);
        self.refresh();
        true
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    pub fn analyze_cell(&self, staff_index: usize, day: usize) -> Result<Vec<String>> {
        analyze_cell(&self.schedule, &self.context(), &self.rules, staff_index, day)
    }

    pub fn rule_breakdown(&self) -> Result<Vec<RuleScore>> {
        rule_breakdown(&self.schedule, &self.context(), &self.rules)
    }

    pub fn share_payload(&self) -> SharePayload {
        SharePayload {
            staff: self.staff.clone(),
            days: self.days,
            schedule: self.schedule.cells().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleKind;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()
    }

    fn roster() -> Vec<Staff> {
        vec![
            Staff::new("p", "Park").with_level(5).preceptor(),
            Staff::new("t", "Tae").with_level(1).trainee_of("p"),
            Staff::new("k", "Kim").with_team("B"),
            Staff::new("w", "Woo").weekday_day_only(),
        ]
    }

    fn store() -> HistoryStore {
        HistoryStore::with_roster(roster(), start(), 10, &EngineConfig::default()).unwrap()
    }

    fn batch(store: &HistoryStore, code: ShiftCode) -> BatchResult {
        let mut schedule = ScheduleMatrix::new(store.staff().len(), store.days());
        schedule.fill(code);
        BatchResult {
            epoch: 1,
            best_schedule: schedule,
            best_score: -12.5,
            generation: 50,
            blame: BlameMatrix::new(store.staff().len(), store.days()),
        }
    }

    #[test]
    fn test_undo_all_restores_initial_state() {
        let mut store = store();
        store.paint_cell(2, 3, NIGHT).unwrap();
        let initial = store.snapshot();

        store.cycle_cell(0, 0).unwrap();
        store.paint_cell(1, 4, EVENING).unwrap();
        store
            .update_staff("k", &StaffPatch { level: Some(6), ..Default::default() })
            .unwrap();
        store.set_days(14).unwrap();
        store.add_staff(Staff::new("n", "New")).unwrap();
        store.remove_staff("w").unwrap();
        store.set_start_date(start() + chrono::Duration::days(3));
        store.clear_non_night();
        store.toggle_request(0, 2).unwrap();
        store.distribute_targets(TargetField::MinOff, 9);
        let mutations = 10;
        assert_eq!(store.undo_depth(), mutations + 1);

        for _ in 0..mutations {
            assert!(store.undo());
        }
        assert_eq!(store.snapshot(), initial);
        assert!(store.blame().has_shape(4, 10));

        for _ in 0..mutations {
            assert!(store.redo());
        }
        assert_eq!(store.days(), 14);
        assert_eq!(store.staff().len(), 4);
        assert!(!store.can_redo());
    }

    #[test]
    fn test_new_mutation_clears_redo() {
        let mut store = store();
        store.cycle_cell(0, 0).unwrap();
        assert!(store.undo());
        assert!(store.can_redo());
        store.cycle_cell(1, 1).unwrap();
        assert!(!store.can_redo());
        assert!(!store.redo());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = store();
        for i in 0..60 {
            store.cycle_cell(i % 4, i % 10).unwrap();
        }
        assert_eq!(store.undo_depth(), 50);
        let mut undone = 0;
        while store.undo() {
            undone += 1;
        }
        assert_eq!(undone, 50);
        assert!(!store.undo());
    }

    #[test]
    fn test_paint_same_value_is_noop() {
        let mut store = store();
        assert!(!store.paint_cell(0, 0, OFF).unwrap());
        assert!(!store.can_undo());
        assert!(store.paint_cell(0, 0, DAY).unwrap());
        assert!(store.paint_cell(0, 9, 7).is_err());
        assert!(store.paint_cell(9, 0, DAY).is_err());
    }

    #[test]
    fn test_resize_round_trip() {
        let mut store = store();
        for s in 0..4 {
            for d in 0..10 {
                store.paint_cell(s, d, ((s + d) % 4) as u8).unwrap();
            }
        }
        let before = store.schedule().clone();
        store.set_days(20).unwrap();
        store.set_days(10).unwrap();
        assert_eq!(store.schedule(), &before);
        assert!(store.set_days(0).is_err());
        assert!(!store.set_days(10).unwrap());
    }

    #[test]
    fn test_remove_staff_keeps_neighbor_rows() {
        let mut store = store();
        store.paint_cell(0, 0, DAY).unwrap();
        store.paint_cell(2, 0, NIGHT).unwrap();
        store.paint_cell(3, 0, DAY).unwrap();

        store.remove_staff("p").unwrap();
        assert_eq!(store.staff()[0].id, "t");
        assert_eq!(store.staff()[0].on_training, None);
        assert_eq!(store.schedule().get(1, 0), NIGHT);
        assert_eq!(store.schedule().get(2, 0), DAY);
        assert!(store.blame().has_shape(3, 10));
    }

    #[test]
    fn test_mirror_and_clear() {
        let mut store = store();
        store.paint_cell(0, 0, NIGHT).unwrap();
        store.paint_cell(0, 1, DAY).unwrap();
        let depth = store.undo_depth();

        assert!(store.mirror_trainees());
        assert_eq!(store.schedule().row(1), store.schedule().row(0));
        assert_eq!(store.undo_depth(), depth + 1);
        assert!(!store.mirror_trainees());
        assert_eq!(store.undo_depth(), depth + 1);

        store.clear_non_night();
        assert_eq!(store.schedule().get(0, 0), NIGHT);
        assert_eq!(store.schedule().get(0, 1), OFF);
    }

    #[test]
    fn test_invalid_staff_patch_leaves_state() {
        let mut store = store();
        let patch = StaffPatch {
            on_training: Some(Some("ghost".into())),
            ..Default::default()
        };
        assert!(store.update_staff("k", &patch).is_err());
        assert!(!store.can_undo());
        assert!(store.update_staff("missing", &StaffPatch::default()).is_err());
    }

    #[test]
    fn test_staff_patch_null_clears_field() {
        let patch: StaffPatch = serde_json::from_str(r#"{"onTraining":null,"level":4}"#).unwrap();
        assert_eq!(patch.on_training, Some(None));
        assert_eq!(patch.fixed_shift, None);

        let mut store = store();
        store.update_staff("t", &patch).unwrap();
        assert_eq!(store.staff()[1].on_training, None);
        assert_eq!(store.staff()[1].level, 4);
    }

    #[test]
    fn test_unknown_shift_codes_are_rejected() {
        let mut store = store();
        assert!(matches!(store.set_request(2, 0, Some(4)), Err(EngineError::Configuration(_))));

        for patch in [
            r#"{"fixedShift":4}"#,
            r#"{"prevShift":9}"#,
            r#"{"forbiddenShifts":[1,5]}"#,
        ] {
            let patch: StaffPatch = serde_json::from_str(patch).unwrap();
            assert!(matches!(store.update_staff("k", &patch), Err(EngineError::InvalidRoster(_))));
        }
        assert!(store.staff()[2].requests.is_empty());
        assert_eq!(store.staff()[2].fixed_shift, None);
        assert!(!store.can_undo());
    }

    #[test]
    fn test_update_shift_type_relabels_only() {
        let mut store = store();
        let score = store.score();
        let patch: ShiftTypePatch = serde_json::from_str(r#"{"name":"Late","hours":-2}"#).unwrap();
        let updated = store.update_shift_type(EVENING, &patch).unwrap().clone();
        assert_eq!(updated.name, "Late");
        assert_eq!(updated.code, "E");
        assert_eq!(updated.hours, 0.0);
        assert_eq!(store.shift_types()[2], updated);
        assert_eq!(store.score(), score);
        assert!(!store.can_undo());

        assert!(store.update_shift_type(4, &patch).is_err());
    }

    #[test]
    fn test_toggle_request_cycle() {
        let mut store = store();
        let seen: Vec<Option<ShiftCode>> =
            (0..5).map(|_| store.toggle_request(2, 4).unwrap()).collect();
        assert_eq!(seen, vec![Some(OFF), Some(DAY), Some(EVENING), Some(NIGHT), None]);
        assert!(store.staff()[2].requests.is_empty());
    }

    #[test]
    fn test_auto_distribute_targets() {
        let mut store = store();
        // 2024-02-05 is a Monday: 10 days = 8 weekdays + 2 weekend days, 2 nights each.
        store.auto_distribute_targets();
        let nights: Vec<u32> = store.staff().iter().map(|s| s.target_night).collect();
        assert_eq!(nights.iter().sum::<u32>(), 20);
        assert_eq!(nights, vec![7, 7, 6, 0]);
    }

    #[test]
    fn test_distribute_night_skips_weekday_staff() {
        let mut store = store();
        store.distribute_targets(TargetField::TargetNight, 5);
        assert_eq!(store.staff()[0].target_night, 5);
        assert_eq!(store.staff()[3].target_night, 0);
    }

    #[test]
    fn test_generation_snapshots_once() {
        let mut store = store();
        let payload = store.begin_generation().unwrap();
        assert_eq!(payload.staff.len(), 4);
        assert_eq!(store.undo_depth(), 1);

        for _ in 0..3 {
            let result = batch(&store, DAY);
            assert!(store.accept_batch(result).unwrap());
        }
        assert_eq!(store.undo_depth(), 1);
        assert_eq!(store.generation(), 50);
        assert_eq!(store.score(), -12.5);

        store.stop_generation();
        assert!(!store.accept_batch(batch(&store, NIGHT)).unwrap());
        assert_eq!(store.schedule().get(0, 0), DAY);

        assert!(store.undo());
        assert_eq!(store.schedule().get(0, 0), OFF);
    }

    #[test]
    fn test_accept_batch_rejects_other_shape() {
        let mut store = store();
        store.begin_generation().unwrap();
        let stale = batch(&store, NIGHT);
        store.stop_generation();
        store.add_staff(Staff::new("x", "Extra")).unwrap();
        store.begin_generation().unwrap();

        let err = store.accept_batch(stale).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { .. }));
        assert!(store.schedule().cells().iter().all(|&c| c == OFF));
    }

    #[test]
    fn test_begin_generation_requires_staff() {
        let mut store = HistoryStore::new(start(), 7, &EngineConfig::default());
        assert!(matches!(store.begin_generation(), Err(EngineError::Configuration(_))));
        assert!(!store.is_generating());
    }

    #[test]
    fn test_rule_and_requirement_edits_are_not_undoable() {
        let mut store = store();
        let before = store.score();
        store
            .update_rule("c9", &RulePatch { enabled: Some(false), ..Default::default() })
            .unwrap();
        assert!(store.score() > before);
        store.set_requirement(DayClass::Weekday, DAY, 0);
        assert!(!store.can_undo());
        assert!(store.update_rule("nope", &RulePatch::default()).is_err());

        store.set_rules(vec![ConstraintRule::new("x", "X", RuleKind::MinOffDays, 0.0)]);
        assert_eq!(store.score(), 0.0);
    }

    #[test]
    fn test_analyze_cell_and_breakdown() {
        let mut store = store();
        store.set_rules(vec![ConstraintRule::new("f", "Weekday", RuleKind::WeekdayDayOnly, 5.0)]);
        store.paint_cell(3, 0, NIGHT).unwrap();
        assert_eq!(store.score(), -5.0);
        assert_eq!(store.blame().get(3, 0), 5.0);
        assert_eq!(store.analyze_cell(3, 0).unwrap().len(), 1);
        let breakdown = store.rule_breakdown().unwrap();
        assert_eq!(breakdown[0].penalty, 5.0);
    }
}
