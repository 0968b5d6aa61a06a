//! Constraint engine: scores a schedule and attributes blame per cell.
//!
//! Every enabled rule reports violations at (staff, day) loci. Each
//! violation of magnitude `m` subtracts `m × weight` from the score and adds
//! the same amount to that cell of the blame matrix. A compliant schedule
//! scores 0; higher is better.
//!
//! Rules are evaluated in slice order and staff/days in index order, so the
//! result is bit-identical across calls.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    is_work, shift_letter, BlameMatrix, DayClass, Requirement, ScheduleMatrix, ShiftCode, Staff,
    DAY, OFF, WORK_SHIFTS,
};
use crate::error::{EngineError, Result};
use crate::rules::{ConstraintRule, RuleKind};

/// Borrowed roster data a schedule is scored against.
pub struct EvalContext<'a> {
    pub staff: &'a [Staff],
    pub days: usize,
    pub start_date: NaiveDate,
    pub requirement: &'a Requirement,
    classes: Vec<DayClass>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        staff: &'a [Staff],
        days: usize,
        start_date: NaiveDate,
        requirement: &'a Requirement,
    ) -> Self {
        Self {
            staff,
            days,
            start_date,
            requirement,
            classes: requirement.day_classes(start_date, days),
        }
    }

    #[inline]
    pub fn class(&self, day: usize) -> DayClass {
        self.classes[day]
    }

    fn required(&self, day: usize, shift: ShiftCode) -> u32 {
        self.requirement.for_class(self.classes[day]).for_shift(shift)
    }
}

/// Receives violations as rules find them.
trait ViolationSink {
    fn record(
        &mut self,
        rule: &ConstraintRule,
        staff: usize,
        day: usize,
        magnitude: f64,
        describe: &dyn Fn() -> String,
    );

    /// A violation with no cell to carry the blame (e.g. an empty roster).
    fn record_unattributed(&mut self, rule: &ConstraintRule, magnitude: f64);
}

/// Accumulates the penalty total and, optionally, the blame matrix.
struct ScoreSink<'b> {
    penalty: f64,
    days: usize,
    blame: Option<&'b mut BlameMatrix>,
}

impl<'b> ScoreSink<'b> {
    fn new(days: usize, mut blame: Option<&'b mut BlameMatrix>) -> Self {
        if let Some(b) = blame.as_deref_mut() {
            b.fill(0.0);
        }
        Self {
            penalty: 0.0,
            days,
            blame,
        }
    }

    fn score(&self) -> f64 {
        0.0 - self.penalty
    }
}

impl ViolationSink for ScoreSink<'_> {
    fn record(
        &mut self,
        rule: &ConstraintRule,
        staff: usize,
        day: usize,
        magnitude: f64,
        _describe: &dyn Fn() -> String,
    ) {
        let penalty = magnitude * rule.weight;
        self.penalty += penalty;
        if let Some(blame) = self.blame.as_deref_mut() {
            blame.cells_mut()[staff * self.days + day] += penalty as f32;
        }
    }

    fn record_unattributed(&mut self, rule: &ConstraintRule, magnitude: f64) {
        self.penalty += magnitude * rule.weight;
    }
}

/// Collects messages for violations landing on one cell.
struct CellProbe {
    staff: usize,
    day: usize,
    messages: Vec<String>,
}

impl ViolationSink for CellProbe {
    fn record(
        &mut self,
        rule: &ConstraintRule,
        staff: usize,
        day: usize,
        _magnitude: f64,
        describe: &dyn Fn() -> String,
    ) {
        if staff != self.staff || day != self.day {
            return;
        }
        let message = format!("{}: {}", rule.name, describe());
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
    }

    fn record_unattributed(&mut self, _rule: &ConstraintRule, _magnitude: f64) {}
}

/// Scores `schedule` against the enabled `rules`.
///
/// When `blame` is given it is reset to zero and filled with per-cell
/// penalties. Both buffers must match `staff × days`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use roster_engine::constraints::{evaluate, EvalContext};
/// use roster_engine::domain::{BlameMatrix, Requirement, ScheduleMatrix, Staff};
/// use roster_engine::rules::{ConstraintRule, RuleKind};
///
/// let staff = vec![Staff::new("s1", "Kim")];
/// let requirement = Requirement::default();
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let ctx = EvalContext::new(&staff, 3, start, &requirement);
/// let rules = vec![ConstraintRule::new("c1", "Max Work", RuleKind::MaxConsecutiveWork { max_days: 2 }, 10.0)];
///
/// let schedule = ScheduleMatrix::from_cells(1, 3, vec![1, 1, 1]).unwrap();
/// let mut blame = BlameMatrix::new(1, 3);
/// let score = evaluate(&schedule, &ctx, &rules, Some(&mut blame)).unwrap();
/// assert_eq!(score, -10.0);
/// assert_eq!(blame.cells(), &[0.0, 0.0, 10.0]);
/// ```
pub fn evaluate(
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    rules: &[ConstraintRule],
    blame: Option<&mut BlameMatrix>,
) -> Result<f64> {
    schedule.ensure_shape(ctx.staff.len(), ctx.days)?;
    if let Some(b) = blame.as_deref() {
        b.ensure_shape(ctx.staff.len(), ctx.days)?;
    }

    let mut sink = ScoreSink::new(ctx.days, blame);
    for rule in rules.iter().filter(|r| r.enabled) {
        evaluate_rule(rule, schedule, ctx, &mut sink);
    }
    Ok(sink.score())
}

/// Scores a schedule and returns a freshly allocated blame matrix.
pub fn evaluate_with_blame(
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    rules: &[ConstraintRule],
) -> Result<(f64, BlameMatrix)> {
    let mut blame = BlameMatrix::new(ctx.staff.len(), ctx.days);
    let score = evaluate(schedule, ctx, rules, Some(&mut blame))?;
    Ok((score, blame))
}

/// Explains which rules blame one cell, as `"<rule name>: <detail>"` lines.
pub fn analyze_cell(
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    rules: &[ConstraintRule],
    staff_index: usize,
    day: usize,
) -> Result<Vec<String>> {
    schedule.ensure_shape(ctx.staff.len(), ctx.days)?;
    if staff_index >= ctx.staff.len() || day >= ctx.days {
        return Err(EngineError::Configuration(format!(
            "cell ({}, {}) is outside the {}×{} roster",
            staff_index,
            day,
            ctx.staff.len(),
            ctx.days
        )));
    }

    let mut probe = CellProbe {
        staff: staff_index,
        day,
        messages: Vec::new(),
    };
    for rule in rules.iter().filter(|r| r.enabled) {
        evaluate_rule(rule, schedule, ctx, &mut probe);
    }
    Ok(probe.messages)
}

/// Penalty contributed by one rule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleScore {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub penalty: f64,
}

/// Per-rule penalty breakdown for the enabled rules.
pub fn rule_breakdown(
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    rules: &[ConstraintRule],
) -> Result<Vec<RuleScore>> {
    schedule.ensure_shape(ctx.staff.len(), ctx.days)?;
    Ok(rules
        .iter()
        .filter(|r| r.enabled)
        .map(|rule| {
            let mut sink = ScoreSink::new(ctx.days, None);
            evaluate_rule(rule, schedule, ctx, &mut sink);
            RuleScore {
                id: rule.id.clone(),
                name: rule.name.clone(),
                weight: rule.weight,
                penalty: sink.penalty,
            }
        })
        .collect())
}

fn evaluate_rule<S: ViolationSink>(
    rule: &ConstraintRule,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    match &rule.kind {
        RuleKind::MaxConsecutiveWork { max_days } => {
            max_consecutive_work(rule, *max_days, schedule, ctx, sink)
        }
        RuleKind::MinRestAfterStretch { stretch, min_off } => {
            min_rest_after_stretch(rule, *stretch, *min_off, schedule, ctx, sink)
        }
        RuleKind::ForbiddenSequence { pattern } => {
            forbidden_sequence(rule, pattern, schedule, ctx, sink)
        }
        RuleKind::ShiftTarget { shift } => shift_target(rule, *shift, schedule, ctx, sink),
        RuleKind::MaxShiftCount { shift, max } => {
            max_shift_count(rule, *shift, *max, schedule, ctx, sink)
        }
        RuleKind::MinOffDays => min_off_days(rule, schedule, ctx, sink),
        RuleKind::WeeklyRest { min_off } => weekly_rest(rule, *min_off, schedule, ctx, sink),
        RuleKind::MaxWeekendWork { max } => max_weekend_work(rule, *max, schedule, ctx, sink),
        RuleKind::Coverage { surplus_ratio } => {
            coverage(rule, *surplus_ratio, schedule, ctx, sink)
        }
        RuleKind::SkillMix {
            min_level,
            min_count,
        } => skill_mix(rule, *min_level, *min_count, schedule, ctx, sink),
        RuleKind::TeamBalance { max_gap } => team_balance(rule, *max_gap, schedule, ctx, sink),
        RuleKind::ForbiddenShifts => forbidden_shifts(rule, schedule, ctx, sink),
        RuleKind::FixedShift => fixed_shift(rule, schedule, ctx, sink),
        RuleKind::HonorRequests => honor_requests(rule, schedule, ctx, sink),
        RuleKind::WeekdayDayOnly => weekday_day_only(rule, schedule, ctx, sink),
    }
}

// ============================================================================
// Pattern rules
// ============================================================================

fn max_consecutive_work<S: ViolationSink>(
    rule: &ConstraintRule,
    max_days: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for (s, staff) in ctx.staff.iter().enumerate() {
        let mut run: u32 = u32::from(is_work(staff.prev_shift));
        for (d, &code) in schedule.row(s).iter().enumerate() {
            if !is_work(code) {
                run = 0;
                continue;
            }
            run += 1;
            if run > max_days {
                let len = run;
                sink.record(rule, s, d, 1.0, &|| {
                    format!("{} consecutive work days (max {})", len, max_days)
                });
            }
        }
    }
}

fn min_rest_after_stretch<S: ViolationSink>(
    rule: &ConstraintRule,
    stretch: u32,
    min_off: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    if min_off == 0 {
        return;
    }
    for (s, staff) in ctx.staff.iter().enumerate() {
        let mut work: u32 = u32::from(is_work(staff.prev_shift));
        let mut off_run: u32 = 0;
        let mut owed = false;
        for (d, &code) in schedule.row(s).iter().enumerate() {
            if is_work(code) {
                if owed {
                    let rested = off_run;
                    sink.record(rule, s, d, f64::from(min_off - rested), &|| {
                        format!(
                            "only {} day(s) off after a {}+ day work stretch (min {})",
                            rested, stretch, min_off
                        )
                    });
                    owed = false;
                }
                work += 1;
                off_run = 0;
            } else {
                if work >= stretch.max(1) {
                    owed = true;
                }
                work = 0;
                off_run += 1;
                if owed && off_run >= min_off {
                    owed = false;
                }
            }
        }
    }
}

fn forbidden_sequence<S: ViolationSink>(
    rule: &ConstraintRule,
    pattern: &[ShiftCode],
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    let k = pattern.len() as isize;
    if k == 0 {
        return;
    }
    let label = pattern
        .iter()
        .map(|&c| shift_letter(c).to_string())
        .collect::<Vec<_>>()
        .join("-");

    for (s, staff) in ctx.staff.iter().enumerate() {
        let row = schedule.row(s);
        // Index -1 is the last shift of the previous horizon.
        let code_at = |i: isize| -> ShiftCode {
            if i < 0 {
                staff.prev_shift
            } else {
                row[i as usize]
            }
        };
        for d in 0..ctx.days {
            let start = d as isize - (k - 1);
            if start < -1 {
                continue;
            }
            let matched = pattern
                .iter()
                .enumerate()
                .all(|(j, &p)| code_at(start + j as isize) == p);
            if matched {
                sink.record(rule, s, d, 1.0, &|| format!("{} sequence ending here", label));
            }
        }
    }
}

fn weekly_rest<S: ViolationSink>(
    rule: &ConstraintRule,
    min_off: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for s in 0..ctx.staff.len() {
        let row = schedule.row(s);
        for start in (0..ctx.days).step_by(7) {
            let end = (start + 7).min(ctx.days);
            let need = min_off.min((end - start) as u32);
            let offs = row[start..end].iter().filter(|&&c| !is_work(c)).count() as u32;
            if offs < need {
                let week = start / 7 + 1;
                sink.record(rule, s, end - 1, f64::from(need - offs), &|| {
                    format!("{} off day(s) in week {} (min {})", offs, week, need)
                });
            }
        }
    }
}

// ============================================================================
// Per-staff resource rules
// ============================================================================

/// Records one unit at every occurrence of `shift` past the first `max`.
fn record_excess<S: ViolationSink>(
    rule: &ConstraintRule,
    s: usize,
    row: &[ShiftCode],
    shift: ShiftCode,
    max: u32,
    sink: &mut S,
) {
    let total = row.iter().filter(|&&c| c == shift).count();
    let mut seen: u32 = 0;
    for (d, &code) in row.iter().enumerate() {
        if code != shift {
            continue;
        }
        seen += 1;
        if seen > max {
            sink.record(rule, s, d, 1.0, &|| {
                format!("{} {} shifts (max {})", total, shift_letter(shift), max)
            });
        }
    }
}

fn shift_target<S: ViolationSink>(
    rule: &ConstraintRule,
    shift: ShiftCode,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    if ctx.days == 0 {
        return;
    }
    for (s, staff) in ctx.staff.iter().enumerate() {
        let Some(target) = staff.target_for(shift) else {
            continue;
        };
        let row = schedule.row(s);
        let count = row.iter().filter(|&&c| c == shift).count() as u32;
        if count > target {
            record_excess(rule, s, row, shift, target, sink);
        } else if count < target {
            sink.record(rule, s, ctx.days - 1, f64::from(target - count), &|| {
                format!("{} {} shifts (target {})", count, shift_letter(shift), target)
            });
        }
    }
}

fn max_shift_count<S: ViolationSink>(
    rule: &ConstraintRule,
    shift: ShiftCode,
    max: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for s in 0..ctx.staff.len() {
        record_excess(rule, s, schedule.row(s), shift, max, sink);
    }
}

fn min_off_days<S: ViolationSink>(
    rule: &ConstraintRule,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    if ctx.days == 0 {
        return;
    }
    for (s, staff) in ctx.staff.iter().enumerate() {
        let need = staff.min_off.min(ctx.days as u32);
        let offs = schedule.row(s).iter().filter(|&&c| !is_work(c)).count() as u32;
        if offs < need {
            sink.record(rule, s, ctx.days - 1, f64::from(need - offs), &|| {
                format!("{} off days (min {})", offs, need)
            });
        }
    }
}

fn max_weekend_work<S: ViolationSink>(
    rule: &ConstraintRule,
    max: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for s in 0..ctx.staff.len() {
        let row = schedule.row(s);
        let worked: Vec<usize> = (0..ctx.days)
            .filter(|&d| ctx.class(d) == DayClass::Weekend && is_work(row[d]))
            .collect();
        let total = worked.len();
        for &d in worked.iter().skip(max as usize) {
            sink.record(rule, s, d, 1.0, &|| {
                format!("{} weekend days worked (max {})", total, max)
            });
        }
    }
}

fn forbidden_shifts<S: ViolationSink>(
    rule: &ConstraintRule,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for (s, staff) in ctx.staff.iter().enumerate() {
        if staff.forbidden_shifts.is_empty() {
            continue;
        }
        for (d, &code) in schedule.row(s).iter().enumerate() {
            if is_work(code) && staff.forbidden_shifts.contains(&code) {
                sink.record(rule, s, d, 1.0, &|| {
                    format!("{} is forbidden for {}", shift_letter(code), staff.name)
                });
            }
        }
    }
}

fn fixed_shift<S: ViolationSink>(
    rule: &ConstraintRule,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for (s, staff) in ctx.staff.iter().enumerate() {
        let Some(fixed) = staff.fixed_shift else {
            continue;
        };
        for (d, &code) in schedule.row(s).iter().enumerate() {
            if is_work(code) && code != fixed {
                sink.record(rule, s, d, 1.0, &|| {
                    format!(
                        "pinned to {} but assigned {}",
                        shift_letter(fixed),
                        shift_letter(code)
                    )
                });
            }
        }
    }
}

fn honor_requests<S: ViolationSink>(
    rule: &ConstraintRule,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for (s, staff) in ctx.staff.iter().enumerate() {
        for (&d, &wanted) in staff.requests.range(..ctx.days) {
            let assigned = schedule.get(s, d);
            if assigned != wanted {
                sink.record(rule, s, d, 1.0, &|| {
                    format!(
                        "requested {} but assigned {}",
                        shift_letter(wanted),
                        shift_letter(assigned)
                    )
                });
            }
        }
    }
}

fn weekday_day_only<S: ViolationSink>(
    rule: &ConstraintRule,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    for (s, staff) in ctx.staff.iter().enumerate() {
        if !staff.is_weekday_day_only {
            continue;
        }
        for (d, &code) in schedule.row(s).iter().enumerate() {
            if !is_work(code) {
                continue;
            }
            let weekend = ctx.class(d) == DayClass::Weekend;
            if weekend || code != DAY {
                sink.record(rule, s, d, 1.0, &|| {
                    if weekend {
                        "weekday-day staff working a weekend".to_string()
                    } else {
                        format!("weekday-day staff assigned {}", shift_letter(code))
                    }
                });
            }
        }
    }
}

// ============================================================================
// Global and team rules
// ============================================================================

/// Splits `magnitude` evenly over `candidates`, or records it unattributed.
fn spread<S: ViolationSink>(
    rule: &ConstraintRule,
    candidates: &[usize],
    day: usize,
    magnitude: f64,
    describe: &dyn Fn() -> String,
    sink: &mut S,
) {
    if candidates.is_empty() {
        sink.record_unattributed(rule, magnitude);
        return;
    }
    let share = magnitude / candidates.len() as f64;
    for &s in candidates {
        sink.record(rule, s, day, share, describe);
    }
}

fn coverage<S: ViolationSink>(
    rule: &ConstraintRule,
    surplus_ratio: f64,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    let counted: Vec<usize> = (0..ctx.staff.len())
        .filter(|&s| !ctx.staff[s].exclude_from_count)
        .collect();

    for d in 0..ctx.days {
        for shift in WORK_SHIFTS {
            let required = ctx.required(d, shift);
            let assigned: Vec<usize> = counted
                .iter()
                .copied()
                .filter(|&s| schedule.get(s, d) == shift)
                .collect();
            let count = assigned.len() as u32;
            let describe = || {
                format!(
                    "day {} {} staffed {} of {} required",
                    d + 1,
                    shift_letter(shift),
                    count,
                    required
                )
            };

            if count < required {
                let mut candidates: Vec<usize> = counted
                    .iter()
                    .copied()
                    .filter(|&s| schedule.get(s, d) == OFF)
                    .collect();
                if candidates.is_empty() {
                    candidates = counted.clone();
                }
                spread(rule, &candidates, d, f64::from(required - count), &describe, sink);
            } else if count > required && surplus_ratio > 0.0 {
                let surplus = f64::from(count - required) * surplus_ratio;
                spread(rule, &assigned, d, surplus, &describe, sink);
            }
        }
    }
}

fn skill_mix<S: ViolationSink>(
    rule: &ConstraintRule,
    min_level: u8,
    min_count: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    if min_count == 0 {
        return;
    }
    for d in 0..ctx.days {
        for shift in WORK_SHIFTS {
            if ctx.required(d, shift) == 0 {
                continue;
            }
            let on_shift: Vec<usize> = (0..ctx.staff.len())
                .filter(|&s| schedule.get(s, d) == shift)
                .collect();
            let skilled = on_shift
                .iter()
                .filter(|&&s| ctx.staff[s].level >= min_level)
                .count() as u32;
            if skilled >= min_count {
                continue;
            }
            let candidates: Vec<usize> = if on_shift.is_empty() {
                (0..ctx.staff.len())
                    .filter(|&s| ctx.staff[s].level >= min_level && schedule.get(s, d) == OFF)
                    .collect()
            } else {
                on_shift
            };
            let describe = || {
                format!(
                    "day {} {} has {} staff at level {}+ (min {})",
                    d + 1,
                    shift_letter(shift),
                    skilled,
                    min_level,
                    min_count
                )
            };
            spread(rule, &candidates, d, f64::from(min_count - skilled), &describe, sink);
        }
    }
}

fn team_balance<S: ViolationSink>(
    rule: &ConstraintRule,
    max_gap: u32,
    schedule: &ScheduleMatrix,
    ctx: &EvalContext<'_>,
    sink: &mut S,
) {
    let teams: BTreeSet<&str> = ctx
        .staff
        .iter()
        .filter(|s| !s.exclude_from_count)
        .map(|s| s.team.as_str())
        .collect();
    if teams.len() < 2 {
        return;
    }

    for d in 0..ctx.days {
        for shift in WORK_SHIFTS {
            let mut members: BTreeMap<&str, Vec<usize>> =
                teams.iter().map(|&t| (t, Vec::new())).collect();
            for (s, staff) in ctx.staff.iter().enumerate() {
                if !staff.exclude_from_count && schedule.get(s, d) == shift {
                    if let Some(list) = members.get_mut(staff.team.as_str()) {
                        list.push(s);
                    }
                }
            }
            let max = members.values().map(Vec::len).max().unwrap_or(0) as u32;
            let min = members.values().map(Vec::len).min().unwrap_or(0) as u32;
            let gap = max - min;
            if gap <= max_gap {
                continue;
            }
            let Some((team, heaviest)) = members.iter().find(|(_, v)| v.len() as u32 == max) else {
                continue;
            };
            let describe = || {
                format!(
                    "day {} {}: team {} leads by {} (max gap {})",
                    d + 1,
                    shift_letter(shift),
                    team,
                    gap,
                    max_gap
                )
            };
            spread(rule, heaviest, d, f64::from(gap - max_gap), &describe, sink);
        }
    }
}
