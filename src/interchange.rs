//! Tabular interchange: spreadsheet-shaped import and export.
//!
//! A [`Workbook`] is a list of named sheets whose rows map column headers to
//! cell values. Two layouts are read:
//!
//! - **Full state**: a "Staff Config" sheet with one column per staff field,
//!   an optional "Metadata" key/value sheet (start date, day count) and an
//!   optional "Schedule Raw" sheet of numeric codes keyed by staff id.
//! - **Legacy**: the first sheet holds a free-form staff list with Korean or
//!   English headers; an optional "Requests" sheet holds requested shifts.
//!
//! Parsing never touches live state; the caller applies the
//! [`ImportedRoster`] as a whole.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    parse_shift, shift_letter, ScheduleMatrix, ShiftCode, Staff, MAX_DAYS, NIGHT, OFF,
};
use crate::error::{EngineError, Result};

pub const STAFF_CONFIG_SHEET: &str = "Staff Config";
pub const METADATA_SHEET: &str = "Metadata";
pub const SCHEDULE_RAW_SHEET: &str = "Schedule Raw";
pub const MONTHLY_SHEET: &str = "Monthly Schedule";
pub const EXPORT_VERSION: &str = "3.1";

const REQUEST_SHEETS: [&str; 4] = ["Requests", "신청근무", "Shift Requests", "Wishes"];
const NAME_KEYS: [&str; 3] = ["성명", "이름", "Name"];
const ROLE_KEYS: [&str; 3] = ["직급", "Role", "Level"];
const TEAM_KEYS: [&str; 2] = ["팀", "Team"];
const PREV_KEYS: [&str; 5] = ["지난달", "전월", "LastShift", "Prev", "PrevShift"];
const TARGET_NIGHT_KEYS: [&str; 2] = ["TargetNight", "나이트수"];
const TARGET_EVENING_KEYS: [&str; 2] = ["TargetEvening", "이브닝수"];
const MIN_OFF_KEYS: [&str; 2] = ["MinOff", "최소오프"];

/// Days since 1899-12-30 for 1970-01-01 in spreadsheet serial dates.
const SERIAL_UNIX_EPOCH: f64 = 25569.0;

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text form; whole numbers print without a fraction.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            CellValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        self.as_f64().filter(|n| *n >= 0.0).map(|n| n as u32)
    }

    /// `Yes`/`true`/`Y`/`1` style flags.
    fn as_flag(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0,
            CellValue::Text(s) => matches!(s.trim().to_lowercase().as_str(), "yes" | "y" | "true" | "1"),
            CellValue::Empty => false,
        }
    }

    fn as_shift(&self) -> Option<ShiftCode> {
        match self {
            CellValue::Number(n) if (0.0..=f64::from(NIGHT)).contains(n) && n.fract() == 0.0 => {
                Some(*n as ShiftCode)
            }
            other => other.as_text().as_deref().and_then(parse_shift),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<u32> for CellValue {
    fn from(n: u32) -> Self {
        CellValue::Number(f64::from(n))
    }
}

/// Column header → value.
pub type Row = BTreeMap<String, CellValue>;

/// A named sheet. `columns` records header order for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row from `(column, value)` pairs.
    pub fn push_row<K: Into<String>>(&mut self, cells: impl IntoIterator<Item = (K, CellValue)>) {
        self.rows.push(cells.into_iter().map(|(k, v)| (k.into(), v)).collect());
    }

    fn has_any_column(&self, keys: &[&str]) -> bool {
        self.rows
            .iter()
            .any(|row| keys.iter().any(|k| row.get(*k).is_some_and(|v| !v.is_blank())))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Result of parsing a workbook, applied to the store in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRoster {
    pub staff: Vec<Staff>,
    pub schedule: Option<ScheduleMatrix>,
    pub start_date: Option<NaiveDate>,
    pub days: Option<usize>,
}

/// First non-blank value among `keys`.
fn pick<'r>(row: &'r Row, keys: &[&str]) -> Option<&'r CellValue> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_blank())
}

/// Maps role text to a level, 1 (lowest) to 6 (head).
///
/// ```
/// use roster_engine::interchange::parse_level;
///
/// assert_eq!(parse_level("수간호사"), 6);
/// assert_eq!(parse_level("Charge Nurse"), 5);
/// assert_eq!(parse_level("신규"), 2);
/// assert_eq!(parse_level("4"), 4);
/// assert_eq!(parse_level("Student"), 1);
/// ```
pub fn parse_level(raw: &str) -> u8 {
    let s = raw.trim();
    if let Ok(n) = s.parse::<u8>() {
        return n.clamp(1, 6);
    }
    if s.contains('수') || s.contains("Head") {
        6
    } else if s.contains("책임") || s.contains("Charge") {
        5
    } else if s.contains("주임") || s.contains("Senior") {
        4
    } else if s.contains("일반") || s.contains("Junior") {
        3
    } else if s.contains("신규") || s.contains("Newbie") {
        2
    } else {
        1
    }
}

/// Converts a spreadsheet serial day number to a date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let days = (serial - SERIAL_UNIX_EPOCH).floor();
    epoch.checked_add_signed(Duration::days(days as i64))
}

fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Number(n) => serial_to_date(*n),
        other => other
            .as_text()
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s.as_str()), "%Y-%m-%d").ok()),
    }
}

fn fresh_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Parses a workbook in either supported layout.
pub fn import_workbook(workbook: &Workbook) -> Result<ImportedRoster> {
    if let Some(config) = workbook.sheet(STAFF_CONFIG_SHEET) {
        return import_full_state(workbook, config);
    }
    import_legacy(workbook)
}

fn import_full_state(workbook: &Workbook, config: &Sheet) -> Result<ImportedRoster> {
    if !config.has_any_column(&["Name"]) {
        return Err(EngineError::ImportFormat(format!(
            "sheet '{}' has no Name column",
            STAFF_CONFIG_SHEET
        )));
    }

    let mut staff = Vec::with_capacity(config.rows.len());
    for row in &config.rows {
        let Some(name) = row.get("Name").and_then(CellValue::as_text) else {
            debug!("Skipping staff row without a name");
            continue;
        };
        let id = row
            .get("ID")
            .and_then(CellValue::as_text)
            .unwrap_or_else(|| fresh_id("restored"));
        let mut member = Staff::new(id, name);
        member.team = row.get("Team").and_then(CellValue::as_text).unwrap_or_else(|| "A".into());
        member.level = row
            .get("Level")
            .and_then(CellValue::as_u32)
            .map_or(1, |l| l.clamp(1, 6) as u8);
        member.target_night = row.get("TargetNight").and_then(CellValue::as_u32).unwrap_or(0);
        member.target_evening = row.get("TargetEvening").and_then(CellValue::as_u32).unwrap_or(0);
        member.min_off = row.get("MinOff").and_then(CellValue::as_u32).unwrap_or(8);
        member.is_preceptor = row.get("IsPreceptor").is_some_and(CellValue::as_flag);
        member.exclude_from_count = row.get("ExcludeFromCount").is_some_and(CellValue::as_flag);
        member.is_weekday_day_only = row.get("IsWeekdayDayOnly").is_some_and(CellValue::as_flag);
        member.on_training = row.get("OnTraining").and_then(CellValue::as_text);
        member.fixed_shift = row
            .get("FixedShift")
            .and_then(CellValue::as_shift)
            .filter(|&c| c != OFF);
        member.forbidden_shifts = row
            .get("ForbiddenShifts")
            .and_then(CellValue::as_text)
            .map(|text| text.split(',').filter_map(parse_shift).filter(|&c| c != OFF).collect())
            .unwrap_or_default();
        member.prev_shift = row.get("PrevShift").and_then(CellValue::as_shift).unwrap_or(OFF);
        member.requests = row
            .get("Requests")
            .and_then(CellValue::as_text)
            .map(|json| parse_requests_json(&json, &member.id))
            .unwrap_or_default();
        staff.push(member);
    }

    let (start_date, days) = workbook
        .sheet(METADATA_SHEET)
        .map(read_metadata)
        .transpose()?
        .unwrap_or((None, None));

    let schedule = match (workbook.sheet(SCHEDULE_RAW_SHEET), days) {
        (Some(sheet), Some(days)) => Some(read_raw_schedule(sheet, &staff, days)),
        _ => None,
    };

    Ok(ImportedRoster {
        staff,
        schedule,
        start_date,
        days,
    })
}

fn parse_requests_json(json: &str, staff_id: &str) -> BTreeMap<usize, ShiftCode> {
    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(staff_id, error = %err, "Ignoring unreadable requests");
            return BTreeMap::new();
        }
    };
    raw.into_iter()
        .filter_map(|(day, value)| {
            let day = day.trim().parse::<usize>().ok()?;
            let code = match value {
                serde_json::Value::Number(n) => n.as_u64().filter(|&c| c <= u64::from(NIGHT))? as ShiftCode,
                serde_json::Value::String(s) => parse_shift(&s)?,
                _ => return None,
            };
            Some((day, code))
        })
        .collect()
}

fn read_metadata(sheet: &Sheet) -> Result<(Option<NaiveDate>, Option<usize>)> {
    let mut start = None;
    let mut days = None;
    for row in &sheet.rows {
        let (Some(key), Some(value)) = (row.get("Key").and_then(CellValue::as_text), row.get("Value")) else {
            continue;
        };
        match key.as_str() {
            "StartDate" => start = parse_date(value),
            "Days" => match value.as_u32().map(|d| d as usize) {
                Some(d) if (1..=MAX_DAYS).contains(&d) => days = Some(d),
                Some(d) => {
                    return Err(EngineError::ImportFormat(format!(
                        "metadata horizon of {} days is outside 1..={}",
                        d, MAX_DAYS
                    )))
                }
                None => days = None,
            },
            _ => {}
        }
    }
    Ok((start, days))
}

fn read_raw_schedule(sheet: &Sheet, staff: &[Staff], days: usize) -> ScheduleMatrix {
    let rows: HashMap<&str, usize> = staff.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();
    let mut schedule = ScheduleMatrix::new(staff.len(), days);
    for row in &sheet.rows {
        let Some(&index) = row
            .get("ID")
            .and_then(CellValue::as_text)
            .and_then(|id| rows.get(id.as_str()))
        else {
            continue;
        };
        for day in 0..days {
            if let Some(code) = row.get(&format!("D{}", day + 1)).and_then(CellValue::as_shift) {
                schedule.set(index, day, code);
            }
        }
    }
    schedule
}

fn import_legacy(workbook: &Workbook) -> Result<ImportedRoster> {
    let Some(sheet) = workbook.sheets.first() else {
        return Err(EngineError::ImportFormat("workbook has no sheets".into()));
    };
    if !sheet.has_any_column(&NAME_KEYS) {
        return Err(EngineError::ImportFormat(format!(
            "sheet '{}' has neither a '{}' sheet nor a name column",
            sheet.name, STAFF_CONFIG_SHEET
        )));
    }

    let listed: HashSet<String> = sheet
        .rows
        .iter()
        .filter_map(|row| pick(row, &NAME_KEYS).and_then(CellValue::as_text))
        .collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut staff = Vec::with_capacity(sheet.rows.len());
    for (idx, row) in sheet.rows.iter().enumerate() {
        let Some(base) = pick(row, &NAME_KEYS).and_then(CellValue::as_text) else {
            debug!(row = idx, "Skipping staff row without a name");
            continue;
        };
        let name = unique_name(base, &listed, &taken);
        taken.insert(name.clone());

        let level = pick(row, &ROLE_KEYS)
            .and_then(CellValue::as_text)
            .map_or(3, |role| parse_level(&role));
        let default_target = if level == 6 { 0 } else { 5 };
        let team = pick(row, &TEAM_KEYS)
            .and_then(CellValue::as_text)
            .unwrap_or_else(|| (if idx % 2 == 0 { "A" } else { "B" }).to_string())
            .to_uppercase();

        let mut member = Staff::new(fresh_id("imported"), name).with_level(level).with_team(team);
        member.target_night = pick(row, &TARGET_NIGHT_KEYS)
            .and_then(CellValue::as_u32)
            .unwrap_or(default_target);
        member.target_evening = pick(row, &TARGET_EVENING_KEYS)
            .and_then(CellValue::as_u32)
            .unwrap_or(default_target);
        member.min_off = pick(row, &MIN_OFF_KEYS).and_then(CellValue::as_u32).unwrap_or(8);
        member.is_preceptor = level >= 5;
        member.prev_shift = pick(row, &PREV_KEYS).and_then(CellValue::as_shift).unwrap_or(OFF);
        staff.push(member);
    }

    if let Some(requests) = workbook
        .sheets
        .iter()
        .skip(1)
        .find(|s| REQUEST_SHEETS.contains(&s.name.as_str()))
    {
        apply_request_sheet(requests, &mut staff);
    }

    Ok(ImportedRoster {
        staff,
        schedule: None,
        start_date: None,
        days: None,
    })
}

/// First of `base`, `base(2)`, `base(3)`, ... not yet taken.
///
/// Suffixed candidates also skip names listed verbatim elsewhere in the sheet.
fn unique_name(base: String, listed: &HashSet<String>, taken: &HashSet<String>) -> String {
    if !taken.contains(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{}({})", base, n);
        if !taken.contains(&candidate) && !listed.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Strips a trailing `(n)` disambiguation suffix.
fn base_name(name: &str) -> &str {
    match name.rfind('(') {
        Some(open)
            if name.ends_with(')')
                && name[open + 1..name.len() - 1].chars().all(|c| c.is_ascii_digit())
                && open + 1 < name.len() - 1 =>
        {
            &name[..open]
        }
        _ => name,
    }
}

fn apply_request_sheet(sheet: &Sheet, staff: &mut [Staff]) {
    for row in &sheet.rows {
        let Some(name) = pick(row, &NAME_KEYS).and_then(CellValue::as_text) else {
            continue;
        };
        let Some(member) = staff
            .iter_mut()
            .find(|s| s.name == name || base_name(&s.name) == name)
        else {
            debug!(name = %name, "Request row matches no staff");
            continue;
        };
        for day in 1..=31usize {
            let value = row
                .get(&day.to_string())
                .or_else(|| row.get(&format!("{}일", day)));
            if let Some(code) = value.and_then(CellValue::as_shift) {
                member.requests.insert(day - 1, code);
            }
        }
    }
}

/// Builds the full-state workbook plus a letter-coded overview sheet.
pub fn export_workbook(staff: &[Staff], schedule: &ScheduleMatrix, start_date: NaiveDate) -> Result<Workbook> {
    let days = schedule.days();
    schedule.ensure_shape(staff.len(), days)?;
    let day_columns: Vec<String> = (1..=days).map(|d| d.to_string()).collect();

    let mut monthly = Sheet::new(
        MONTHLY_SHEET,
        ["ID", "Name"].iter().map(|s| s.to_string()).chain(day_columns.iter().cloned()).collect(),
    );
    for (i, member) in staff.iter().enumerate() {
        let mut row: Row = Row::new();
        row.insert("ID".into(), member.id.as_str().into());
        row.insert("Name".into(), member.name.as_str().into());
        for (d, column) in day_columns.iter().enumerate() {
            row.insert(column.clone(), shift_letter(schedule.get(i, d)).to_string().into());
        }
        monthly.rows.push(row);
    }

    let config_columns = [
        "ID", "Name", "Team", "Level", "TargetNight", "TargetEvening", "MinOff", "IsPreceptor",
        "ExcludeFromCount", "OnTraining", "FixedShift", "ForbiddenShifts", "IsWeekdayDayOnly",
        "PrevShift", "Requests",
    ];
    let yes_no = |b: bool| CellValue::from(if b { "Yes" } else { "No" });
    let mut config = Sheet::new(STAFF_CONFIG_SHEET, config_columns.iter().map(|s| s.to_string()).collect());
    for member in staff {
        let requests = serde_json::to_string(&member.requests)
            .map_err(|e| EngineError::ImportFormat(e.to_string()))?;
        let forbidden: Vec<String> =
            member.forbidden_shifts.iter().map(|&c| shift_letter(c).to_string()).collect();
        config.push_row([
            ("ID", member.id.as_str().into()),
            ("Name", member.name.as_str().into()),
            ("Team", member.team.as_str().into()),
            ("Level", u32::from(member.level).into()),
            ("TargetNight", member.target_night.into()),
            ("TargetEvening", member.target_evening.into()),
            ("MinOff", member.min_off.into()),
            ("IsPreceptor", yes_no(member.is_preceptor)),
            ("ExcludeFromCount", yes_no(member.exclude_from_count)),
            ("OnTraining", member.on_training.clone().unwrap_or_default().into()),
            (
                "FixedShift",
                member.fixed_shift.map(|c| shift_letter(c).to_string()).unwrap_or_default().into(),
            ),
            ("ForbiddenShifts", forbidden.join(",").into()),
            ("IsWeekdayDayOnly", yes_no(member.is_weekday_day_only)),
            ("PrevShift", u32::from(member.prev_shift).into()),
            ("Requests", requests.into()),
        ]);
    }

    let mut metadata = Sheet::new(METADATA_SHEET, vec!["Key".into(), "Value".into()]);
    metadata.push_row([
        ("Key", CellValue::from("StartDate")),
        ("Value", CellValue::from(start_date.format("%Y-%m-%d").to_string())),
    ]);
    metadata.push_row([("Key", CellValue::from("Days")), ("Value", CellValue::Number(days as f64))]);
    metadata.push_row([("Key", CellValue::from("ExportVersion")), ("Value", CellValue::from(EXPORT_VERSION))]);

    let raw_columns: Vec<String> =
        std::iter::once("ID".to_string()).chain((1..=days).map(|d| format!("D{}", d))).collect();
    let mut raw = Sheet::new(SCHEDULE_RAW_SHEET, raw_columns);
    for (i, member) in staff.iter().enumerate() {
        let mut row = Row::new();
        row.insert("ID".into(), member.id.as_str().into());
        for d in 0..days {
            row.insert(format!("D{}", d + 1), CellValue::Number(f64::from(schedule.get(i, d))));
        }
        raw.rows.push(row);
    }

    Ok(Workbook {
        sheets: vec![monthly, config, metadata, raw],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DAY, EVENING};

    fn legacy_sheet(rows: Vec<Vec<(&str, CellValue)>>) -> Sheet {
        let mut sheet = Sheet::new("Staff List", Vec::new());
        for row in rows {
            sheet.push_row(row);
        }
        sheet
    }

    #[test]
    fn test_legacy_duplicate_names_are_disambiguated() {
        let sheet = legacy_sheet(vec![
            vec![("Name", "Kim".into()), ("Role", "Senior".into())],
            vec![("Name", "Kim".into()), ("Role", "Newbie".into())],
        ]);
        let imported = import_workbook(&Workbook { sheets: vec![sheet] }).unwrap();

        assert_eq!(imported.staff.len(), 2);
        assert_eq!(imported.staff[0].name, "Kim");
        assert_eq!(imported.staff[1].name, "Kim(2)");
        assert_ne!(imported.staff[0].id, imported.staff[1].id);
        assert_eq!(imported.staff[0].level, 4);
        assert_eq!(imported.staff[1].level, 2);
        assert!(imported.schedule.is_none());
    }

    #[test]
    fn test_legacy_dedup_avoids_listed_suffixes() {
        let sheet = legacy_sheet(vec![
            vec![("Name", "Kim".into())],
            vec![("Name", "Kim".into())],
            vec![("Name", "Kim(2)".into())],
            vec![("Name", "Kim(2)".into())],
        ]);
        let imported = import_workbook(&Workbook { sheets: vec![sheet] }).unwrap();
        let names: Vec<&str> = imported.staff.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Kim", "Kim(3)", "Kim(2)", "Kim(2)(2)"]);
    }

    #[test]
    fn test_metadata_days_out_of_range() {
        let mut config = Sheet::new(STAFF_CONFIG_SHEET, Vec::new());
        config.push_row([("ID", CellValue::from("a")), ("Name", CellValue::from("Ahn"))]);
        let mut raw = Sheet::new(SCHEDULE_RAW_SHEET, Vec::new());
        raw.push_row([("ID", CellValue::from("a")), ("D1", CellValue::from(1u32))]);

        for days in [2_000_000.0, 367.0, 0.0] {
            let mut meta = Sheet::new(METADATA_SHEET, Vec::new());
            meta.push_row([("Key", CellValue::from("Days")), ("Value", CellValue::Number(days))]);
            let workbook = Workbook {
                sheets: vec![config.clone(), meta, raw.clone()],
            };
            assert!(
                matches!(import_workbook(&workbook), Err(EngineError::ImportFormat(_))),
                "{} days",
                days
            );
        }

        let mut meta = Sheet::new(METADATA_SHEET, Vec::new());
        meta.push_row([("Key", CellValue::from("Days")), ("Value", CellValue::Number(366.0))]);
        let imported = import_workbook(&Workbook {
            sheets: vec![config, meta, raw],
        })
        .unwrap();
        assert_eq!(imported.days, Some(366));
        assert_eq!(imported.schedule.map(|s| s.get(0, 0)), Some(DAY));
    }

    #[test]
    fn test_legacy_korean_headers_and_defaults() {
        let sheet = legacy_sheet(vec![
            vec![("성명", "박지우".into()), ("직급", "수간호사".into()), ("지난달", "N".into())],
            vec![("성명", "".into())],
            vec![("이름", "이서준".into()), ("팀", "b".into()), ("나이트수", CellValue::Number(7.0))],
        ]);
        let imported = import_workbook(&Workbook { sheets: vec![sheet] }).unwrap();

        assert_eq!(imported.staff.len(), 2, "nameless rows are skipped");
        let head = &imported.staff[0];
        assert_eq!(head.level, 6);
        assert!(head.is_preceptor);
        assert_eq!(head.target_night, 0);
        assert_eq!(head.prev_shift, NIGHT);
        assert_eq!(head.team, "A");
        assert_eq!(head.min_off, 8);

        let other = &imported.staff[1];
        assert_eq!(other.level, 3);
        assert_eq!(other.team, "B");
        assert_eq!(other.target_night, 7);
        assert_eq!(other.target_evening, 5);
    }

    #[test]
    fn test_legacy_request_sheet() {
        let staff = legacy_sheet(vec![
            vec![("Name", "Kim".into())],
            vec![("Name", "Kim".into())],
            vec![("Name", "Lee".into())],
        ]);
        let mut requests = Sheet::new("Requests", Vec::new());
        requests.push_row([("Name", CellValue::from("Lee")), ("1", "OFF".into()), ("3일", "E".into())]);
        requests.push_row([("Name", CellValue::from("Kim")), ("2", "D".into())]);
        requests.push_row([("Name", CellValue::from("Nobody")), ("2", "D".into())]);

        let imported = import_workbook(&Workbook { sheets: vec![staff, requests] }).unwrap();
        assert_eq!(imported.staff[2].requests.get(&0), Some(&OFF));
        assert_eq!(imported.staff[2].requests.get(&2), Some(&EVENING));
        assert_eq!(imported.staff[0].requests.get(&1), Some(&DAY));
        assert!(imported.staff[1].requests.is_empty());
    }

    #[test]
    fn test_missing_columns_is_format_error() {
        let sheet = legacy_sheet(vec![vec![("Foo", "bar".into())]]);
        let err = import_workbook(&Workbook { sheets: vec![sheet] }).unwrap_err();
        assert!(matches!(err, EngineError::ImportFormat(_)));
        assert!(matches!(import_workbook(&Workbook::default()), Err(EngineError::ImportFormat(_))));

        let mut config = Sheet::new(STAFF_CONFIG_SHEET, Vec::new());
        config.push_row([("ID", CellValue::from("a"))]);
        let err = import_workbook(&Workbook { sheets: vec![config] }).unwrap_err();
        assert!(matches!(err, EngineError::ImportFormat(_)));
    }

    #[test]
    fn test_full_state_export_then_import() {
        let staff = vec![
            Staff::new("p", "Park")
                .with_level(5)
                .preceptor()
                .with_targets(6, 4)
                .with_request(2, NIGHT)
                .with_prev_shift(EVENING),
            Staff::new("t", "Tae")
                .with_level(1)
                .trainee_of("p")
                .with_forbidden([NIGHT, EVENING])
                .excluded_from_count(),
            Staff::new("h", "Han").with_level(6).with_fixed_shift(DAY).weekday_day_only(),
        ];
        let schedule = ScheduleMatrix::from_cells(3, 4, vec![3, 3, 0, 1, 1, 0, 0, 1, 1, 1, 1, 0]).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();

        let workbook = export_workbook(&staff, &schedule, start).unwrap();
        assert_eq!(workbook.sheets[0].name, MONTHLY_SHEET);
        assert_eq!(workbook.sheets[0].rows[0].get("1"), Some(&CellValue::from("N")));

        let json = serde_json::to_string(&workbook).unwrap();
        let parsed: Workbook = serde_json::from_str(&json).unwrap();
        let imported = import_workbook(&parsed).unwrap();

        assert_eq!(imported.staff, staff);
        assert_eq!(imported.schedule, Some(schedule));
        assert_eq!(imported.start_date, Some(start));
        assert_eq!(imported.days, Some(4));
    }

    #[test]
    fn test_full_state_lenient_fields() {
        let mut config = Sheet::new(STAFF_CONFIG_SHEET, Vec::new());
        config.push_row([
            ("Name", CellValue::from("Min")),
            ("Requests", CellValue::from(r#"{"0":"O","4":"N","x":"D"}"#)),
            ("IsPreceptor", CellValue::Bool(true)),
        ]);
        config.push_row([("Name", CellValue::Empty)]);
        let mut meta = Sheet::new(METADATA_SHEET, Vec::new());
        meta.push_row([("Key", CellValue::from("StartDate")), ("Value", CellValue::Number(45292.0))]);

        let imported = import_workbook(&Workbook { sheets: vec![config, meta] }).unwrap();
        assert_eq!(imported.staff.len(), 1);
        let min = &imported.staff[0];
        assert!(min.id.starts_with("restored_"));
        assert_eq!(min.level, 1);
        assert!(min.is_preceptor);
        assert_eq!(min.requests.len(), 2);
        assert_eq!(imported.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(imported.days, None);
        assert!(imported.schedule.is_none());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("Kim(2)"), "Kim");
        assert_eq!(base_name("Kim(x)"), "Kim(x)");
        assert_eq!(base_name("Kim()"), "Kim()");
        assert_eq!(base_name("Kim"), "Kim");
    }
}
