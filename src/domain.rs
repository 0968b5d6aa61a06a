//! Domain model for shift rostering.
//!
//! Shift codes are small integers stored in a flat row-major matrix
//! (`staff_index * days + day`). Code 0 is always "off".

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{EngineError, Result};

/// A shift code as stored in the schedule matrix.
pub type ShiftCode = u8;

pub const OFF: ShiftCode = 0;
pub const DAY: ShiftCode = 1;
pub const EVENING: ShiftCode = 2;
pub const NIGHT: ShiftCode = 3;

/// The non-off shifts that carry headcount requirements.
pub const WORK_SHIFTS: [ShiftCode; 3] = [DAY, EVENING, NIGHT];

/// All standard shift codes in cycle order.
pub const ALL_SHIFTS: [ShiftCode; 4] = [OFF, DAY, EVENING, NIGHT];

/// Longest horizon a roster may span.
pub const MAX_DAYS: usize = 366;

/// Returns true if the code is a working shift.
#[inline]
pub fn is_work(code: ShiftCode) -> bool {
    code != OFF
}

/// Letter code used in tables and messages.
///
/// ```
/// use roster_engine::domain::{shift_letter, NIGHT, OFF};
///
/// assert_eq!(shift_letter(NIGHT), 'N');
/// assert_eq!(shift_letter(OFF), 'O');
/// assert_eq!(shift_letter(9), '?');
/// ```
pub fn shift_letter(code: ShiftCode) -> char {
    match code {
        OFF => 'O',
        DAY => 'D',
        EVENING => 'E',
        NIGHT => 'N',
        _ => '?',
    }
}

/// Parses a shift from a letter, digit, or localized label.
///
/// ```
/// use roster_engine::domain::{parse_shift, DAY, OFF, NIGHT};
///
/// assert_eq!(parse_shift("d"), Some(DAY));
/// assert_eq!(parse_shift("OFF"), Some(OFF));
/// assert_eq!(parse_shift("나이트"), Some(NIGHT));
/// assert_eq!(parse_shift("x"), None);
/// ```
pub fn parse_shift(raw: &str) -> Option<ShiftCode> {
    let s = raw.trim().to_uppercase();
    match s.as_str() {
        "D" | "DAY" | "데이" | "1" => Some(DAY),
        "E" | "EVE" | "EVENING" | "이브닝" | "2" => Some(EVENING),
        "N" | "NIGHT" | "나이트" | "3" => Some(NIGHT),
        "O" | "OFF" | "오프" | "휴" | "0" => Some(OFF),
        _ => None,
    }
}

/// A configurable shift type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftType {
    pub id: ShiftCode,
    pub code: String,
    pub name: String,
    pub hours: f32,
    pub is_off: bool,
}

impl ShiftType {
    pub fn new(id: ShiftCode, code: impl Into<String>, name: impl Into<String>, hours: f32) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            hours,
            is_off: id == OFF,
        }
    }
}

/// Relabels a shift type. The numeric id and off flag are fixed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftTypePatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub hours: Option<f32>,
}

impl ShiftTypePatch {
    pub fn apply(&self, shift: &mut ShiftType) {
        if let Some(code) = &self.code {
            shift.code = code.clone();
        }
        if let Some(name) = &self.name {
            shift.name = name.clone();
        }
        if let Some(hours) = self.hours {
            shift.hours = hours.max(0.0);
        }
    }
}

/// The standard Off/Day/Evening/Night catalog.
pub fn default_shift_types() -> Vec<ShiftType> {
    vec![
        ShiftType::new(OFF, "O", "Off", 0.0),
        ShiftType::new(DAY, "D", "Day", 8.0),
        ShiftType::new(EVENING, "E", "Evening", 8.0),
        ShiftType::new(NIGHT, "N", "Night", 8.0),
    ]
}

fn default_team() -> String {
    "A".to_string()
}

fn default_level() -> u8 {
    3
}

fn default_min_off() -> u32 {
    8
}

/// A staff member on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: String,
    pub name: String,
    #[serde(default = "default_team")]
    pub team: String,
    /// Skill level, 1 (newest) to 6 (head).
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub target_night: u32,
    #[serde(default)]
    pub target_evening: u32,
    #[serde(default = "default_min_off")]
    pub min_off: u32,
    #[serde(default)]
    pub is_preceptor: bool,
    /// Id of the preceptor this staff member is training under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_training: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_shift: Option<ShiftCode>,
    #[serde(default)]
    pub forbidden_shifts: BTreeSet<ShiftCode>,
    /// Not counted toward per-shift headcount.
    #[serde(default)]
    pub exclude_from_count: bool,
    #[serde(default)]
    pub is_weekday_day_only: bool,
    /// Last shift of the previous horizon.
    #[serde(default)]
    pub prev_shift: ShiftCode,
    /// Requested shift by day index.
    #[serde(default)]
    pub requests: BTreeMap<usize, ShiftCode>,
}

impl Staff {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            team: default_team(),
            level: default_level(),
            target_night: 0,
            target_evening: 0,
            min_off: default_min_off(),
            is_preceptor: false,
            on_training: None,
            fixed_shift: None,
            forbidden_shifts: BTreeSet::new(),
            exclude_from_count: false,
            is_weekday_day_only: false,
            prev_shift: OFF,
            requests: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = team.into();
        self
    }

    pub fn with_targets(mut self, night: u32, evening: u32) -> Self {
        self.target_night = night;
        self.target_evening = evening;
        self
    }

    pub fn with_min_off(mut self, min_off: u32) -> Self {
        self.min_off = min_off;
        self
    }

    pub fn preceptor(mut self) -> Self {
        self.is_preceptor = true;
        self
    }

    pub fn trainee_of(mut self, preceptor_id: impl Into<String>) -> Self {
        self.on_training = Some(preceptor_id.into());
        self
    }

    pub fn with_fixed_shift(mut self, code: ShiftCode) -> Self {
        self.fixed_shift = Some(code);
        self
    }

    pub fn with_forbidden(mut self, codes: impl IntoIterator<Item = ShiftCode>) -> Self {
        self.forbidden_shifts.extend(codes);
        self
    }

    pub fn with_request(mut self, day: usize, code: ShiftCode) -> Self {
        self.requests.insert(day, code);
        self
    }

    pub fn with_prev_shift(mut self, code: ShiftCode) -> Self {
        self.prev_shift = code;
        self
    }

    pub fn excluded_from_count(mut self) -> Self {
        self.exclude_from_count = true;
        self
    }

    pub fn weekday_day_only(mut self) -> Self {
        self.is_weekday_day_only = true;
        self
    }

    /// Returns whether this staff member may ever be assigned `code`.
    ///
    /// Off is always allowed. Fixed pins restrict work to the pinned shift.
    pub fn is_allowed(&self, code: ShiftCode) -> bool {
        if code == OFF {
            return true;
        }
        if self.forbidden_shifts.contains(&code) {
            return false;
        }
        if self.is_weekday_day_only && code != DAY {
            return false;
        }
        match self.fixed_shift {
            Some(fixed) => code == fixed,
            None => true,
        }
    }

    /// Codes the search may place in this staff member's row.
    pub fn allowed_shifts(&self) -> Vec<ShiftCode> {
        ALL_SHIFTS.iter().copied().filter(|&c| self.is_allowed(c)).collect()
    }

    /// Target count for a shift, if the shift has one.
    pub fn target_for(&self, code: ShiftCode) -> Option<u32> {
        match code {
            NIGHT => Some(self.target_night),
            EVENING => Some(self.target_evening),
            _ => None,
        }
    }
}

/// Checks the roster invariants: unique ids, level range, trainee links.
pub fn validate_roster(staff: &[Staff]) -> Result<()> {
    let mut seen = HashSet::new();
    for s in staff {
        if s.id.trim().is_empty() {
            return Err(EngineError::InvalidRoster(format!("staff '{}' has an empty id", s.name)));
        }
        if !seen.insert(s.id.as_str()) {
            return Err(EngineError::InvalidRoster(format!("duplicate staff id '{}'", s.id)));
        }
        if !(1..=6).contains(&s.level) {
            return Err(EngineError::InvalidRoster(format!(
                "staff '{}' has level {} outside 1..=6",
                s.id, s.level
            )));
        }
        let codes = s
            .fixed_shift
            .iter()
            .chain(s.forbidden_shifts.iter())
            .chain(s.requests.values())
            .chain(std::iter::once(&s.prev_shift));
        if let Some(code) = codes.copied().find(|&c| c > NIGHT) {
            return Err(EngineError::InvalidRoster(format!(
                "staff '{}' uses unknown shift code {}",
                s.id, code
            )));
        }
    }

    let by_id: HashMap<&str, &Staff> = staff.iter().map(|s| (s.id.as_str(), s)).collect();
    for s in staff {
        let Some(preceptor_id) = s.on_training.as_deref() else {
            continue;
        };
        if preceptor_id == s.id {
            return Err(EngineError::InvalidRoster(format!("staff '{}' trains under itself", s.id)));
        }
        let Some(preceptor) = by_id.get(preceptor_id) else {
            return Err(EngineError::InvalidRoster(format!(
                "staff '{}' trains under unknown id '{}'",
                s.id, preceptor_id
            )));
        };
        if !preceptor.is_preceptor {
            return Err(EngineError::InvalidRoster(format!(
                "staff '{}' trains under '{}' who is not a preceptor",
                s.id, preceptor_id
            )));
        }

        let mut current = *preceptor;
        let mut steps = 0;
        while let Some(next) = current.on_training.as_deref() {
            steps += 1;
            if next == s.id || steps > staff.len() {
                return Err(EngineError::InvalidRoster(format!(
                    "cyclic trainee chain through '{}'",
                    s.id
                )));
            }
            match by_id.get(next) {
                Some(&n) => current = n,
                None => break,
            }
        }
    }
    Ok(())
}

/// Resolves the row a trainee mirrors: the end of its preceptor chain.
///
/// Returns `None` for staff who are not trainees or whose chain is broken.
pub fn preceptor_row(staff: &[Staff], index: usize) -> Option<usize> {
    let position: HashMap<&str, usize> =
        staff.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();
    resolve_preceptor(staff, &position, index)
}

pub(crate) fn resolve_preceptor(
    staff: &[Staff],
    position: &HashMap<&str, usize>,
    index: usize,
) -> Option<usize> {
    let mut current = *position.get(staff.get(index)?.on_training.as_deref()?)?;
    for _ in 0..staff.len() {
        match staff[current].on_training.as_deref().and_then(|id| position.get(id)) {
            Some(&next) if next != index => current = next,
            Some(_) => return None,
            None => return Some(current),
        }
    }
    None
}

/// Calendar class of a horizon day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DayClass {
    Weekday,
    Weekend,
}

/// Minimum headcount for each working shift on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyRequirement {
    #[serde(rename = "D")]
    pub day: u32,
    #[serde(rename = "E")]
    pub evening: u32,
    #[serde(rename = "N")]
    pub night: u32,
}

impl DailyRequirement {
    pub fn new(day: u32, evening: u32, night: u32) -> Self {
        Self { day, evening, night }
    }

    pub fn for_shift(&self, code: ShiftCode) -> u32 {
        match code {
            DAY => self.day,
            EVENING => self.evening,
            NIGHT => self.night,
            _ => 0,
        }
    }

    pub fn set(&mut self, code: ShiftCode, value: u32) {
        match code {
            DAY => self.day = value,
            EVENING => self.evening = value,
            NIGHT => self.night = value,
            _ => {}
        }
    }
}

/// Weekday and weekend/holiday headcount requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub weekday: DailyRequirement,
    pub weekend: DailyRequirement,
    /// Dates treated as weekend regardless of weekday.
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for Requirement {
    fn default() -> Self {
        Self {
            weekday: DailyRequirement::new(3, 2, 2),
            weekend: DailyRequirement::new(2, 2, 2),
            holidays: BTreeSet::new(),
        }
    }
}

impl Requirement {
    pub fn new(weekday: DailyRequirement, weekend: DailyRequirement) -> Self {
        Self {
            weekday,
            weekend,
            holidays: BTreeSet::new(),
        }
    }

    pub fn class_of(&self, date: NaiveDate) -> DayClass {
        if self.holidays.contains(&date) || matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            DayClass::Weekend
        } else {
            DayClass::Weekday
        }
    }

    pub fn for_class(&self, class: DayClass) -> &DailyRequirement {
        match class {
            DayClass::Weekday => &self.weekday,
            DayClass::Weekend => &self.weekend,
        }
    }

    pub fn for_class_mut(&mut self, class: DayClass) -> &mut DailyRequirement {
        match class {
            DayClass::Weekday => &mut self.weekday,
            DayClass::Weekend => &mut self.weekend,
        }
    }

    /// Calendar class of each day in the horizon.
    pub fn day_classes(&self, start_date: NaiveDate, days: usize) -> Vec<DayClass> {
        (0..days)
            .map(|d| self.class_of(start_date + Duration::days(d as i64)))
            .collect()
    }
}

/// A row-major staff × day grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    try_from = "RawGrid<T>",
    bound(deserialize = "T: Deserialize<'de>")
)]
pub struct Grid<T> {
    staff_count: usize,
    days: usize,
    cells: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrid<T> {
    staff_count: usize,
    days: usize,
    cells: Vec<T>,
}

impl<T> TryFrom<RawGrid<T>> for Grid<T> {
    type Error = EngineError;

    fn try_from(raw: RawGrid<T>) -> Result<Self> {
        if raw.days > MAX_DAYS {
            return Err(EngineError::Configuration(format!(
                "horizon of {} days exceeds {}",
                raw.days, MAX_DAYS
            )));
        }
        let expected = raw.staff_count.checked_mul(raw.days).ok_or_else(|| {
            EngineError::Configuration(format!("{} × {} grid is too large", raw.staff_count, raw.days))
        })?;
        if raw.cells.len() != expected {
            return Err(EngineError::shape(expected, raw.cells.len()));
        }
        Ok(Self {
            staff_count: raw.staff_count,
            days: raw.days,
            cells: raw.cells,
        })
    }
}

/// Shift codes per (staff, day).
pub type ScheduleMatrix = Grid<ShiftCode>;

/// Accumulated penalty per (staff, day).
pub type BlameMatrix = Grid<f32>;

impl<T: Copy + Default> Grid<T> {
    /// Creates a grid filled with `T::default()`.
    pub fn new(staff_count: usize, days: usize) -> Self {
        Self {
            staff_count,
            days,
            cells: vec![T::default(); staff_count * days],
        }
    }

    /// Wraps an existing buffer, rejecting a length that disagrees with the shape.
    pub fn from_cells(staff_count: usize, days: usize, cells: Vec<T>) -> Result<Self> {
        RawGrid {
            staff_count,
            days,
            cells,
        }
        .try_into()
    }

    pub fn staff_count(&self) -> usize {
        self.staff_count
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    pub fn into_cells(self) -> Vec<T> {
        self.cells
    }

    #[inline]
    pub fn index(&self, staff: usize, day: usize) -> usize {
        staff * self.days + day
    }

    #[inline]
    pub fn get(&self, staff: usize, day: usize) -> T {
        self.cells[staff * self.days + day]
    }

    #[inline]
    pub fn set(&mut self, staff: usize, day: usize, value: T) {
        let idx = staff * self.days + day;
        self.cells[idx] = value;
    }

    pub fn row(&self, staff: usize) -> &[T] {
        &self.cells[staff * self.days..(staff + 1) * self.days]
    }

    pub fn row_mut(&mut self, staff: usize) -> &mut [T] {
        let days = self.days;
        &mut self.cells[staff * days..(staff + 1) * days]
    }

    pub fn has_shape(&self, staff_count: usize, days: usize) -> bool {
        self.staff_count == staff_count
            && self.days == days
            && staff_count.checked_mul(days) == Some(self.cells.len())
    }

    /// Fails with `ShapeMismatch` unless the grid is `staff_count × days`.
    pub fn ensure_shape(&self, staff_count: usize, days: usize) -> Result<()> {
        if self.has_shape(staff_count, days) {
            Ok(())
        } else {
            Err(EngineError::shape(staff_count.saturating_mul(days), self.cells.len()))
        }
    }

    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }

    /// Copies row `from` over row `to`.
    pub fn copy_row(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let days = self.days;
        self.cells.copy_within(from * days..(from + 1) * days, to * days);
    }

    /// Reallocates to a new horizon, keeping day `d` at index `d` in every row.
    ///
    /// ```
    /// use roster_engine::domain::ScheduleMatrix;
    ///
    /// let grid = ScheduleMatrix::from_cells(2, 3, vec![1, 2, 3, 3, 2, 1]).unwrap();
    /// let grown = grid.resized_days(5);
    /// assert_eq!(grown.cells(), &[1, 2, 3, 0, 0, 3, 2, 1, 0, 0]);
    /// assert_eq!(grown.resized_days(3), grid);
    /// ```
    pub fn resized_days(&self, days: usize) -> Self {
        let mut out = Self::new(self.staff_count, days);
        let keep = self.days.min(days);
        for r in 0..self.staff_count {
            out.row_mut(r)[..keep].copy_from_slice(&self.row(r)[..keep]);
        }
        out
    }

    /// Reallocates to a new staff list, matching rows by staff id.
    ///
    /// Rows for new ids start at `T::default()`; rows for removed ids are dropped.
    pub fn remapped_rows(&self, old_staff: &[Staff], new_staff: &[Staff]) -> Self {
        let old_rows: HashMap<&str, usize> = old_staff
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < self.staff_count)
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        let mut out = Self::new(new_staff.len(), self.days);
        for (r, s) in new_staff.iter().enumerate() {
            if let Some(&old) = old_rows.get(s.id.as_str()) {
                out.row_mut(r).copy_from_slice(self.row(old));
            }
        }
        out
    }
}

/// Deep copy of the undoable roster state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub schedule: ScheduleMatrix,
    pub staff: Vec<Staff>,
    pub days: usize,
    pub start_date: NaiveDate,
}
