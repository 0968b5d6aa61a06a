//! Demo rosters for the roster engine.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::domain::{ScheduleMatrix, Staff, DAY};
use crate::solver::mirror_trainees;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Small,
    Large,
}

impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SMALL" => Ok(DemoData::Small),
            "LARGE" => Ok(DemoData::Large),
            _ => Err(()),
        }
    }
}

impl DemoData {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
        }
    }

    fn parameters(&self) -> DemoDataParameters {
        match self {
            DemoData::Small => DemoDataParameters {
                staff_count: 12,
                days: 28,
                seed: 12,
                trainee_share: 0.15,
            },
            DemoData::Large => DemoDataParameters {
                staff_count: 30,
                days: 31,
                seed: 30,
                trainee_share: 0.1,
            },
        }
    }
}

struct DemoDataParameters {
    staff_count: usize,
    days: usize,
    seed: u64,
    trainee_share: f64,
}

/// A generated roster with a starting schedule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoRoster {
    pub staff: Vec<Staff>,
    pub start_date: NaiveDate,
    pub days: usize,
    pub schedule: ScheduleMatrix,
}

/// List of available demo data sets.
pub fn list_demo_data() -> Vec<&'static str> {
    vec!["SMALL", "LARGE"]
}

/// Generates a demo roster for the given size.
///
/// Levels are random except the first two rows, which are always a head
/// (level 6, pinned to day shifts) and a charge-level preceptor, so every
/// demo roster can satisfy the skill-mix rule.
///
/// ```
/// use roster_engine::demo_data::{generate, DemoData};
/// use roster_engine::domain::validate_roster;
///
/// let demo = generate(DemoData::Small);
/// assert_eq!(demo.staff.len(), 12);
/// assert!(validate_roster(&demo.staff).is_ok());
/// assert!(demo.schedule.has_shape(12, demo.days));
/// ```
pub fn generate(demo: DemoData) -> DemoRoster {
    let params = demo.parameters();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let start_date = find_next_monday(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default());

    let mut staff: Vec<Staff> = (0..params.staff_count)
        .map(|i| {
            let level = match i {
                0 => 6,
                1 => 5,
                _ => rng.gen_range(1..=6),
            };
            demo_staff(i, level)
        })
        .collect();

    // Trainees mirror a preceptor who works rotating shifts.
    let preceptors: Vec<String> = staff
        .iter()
        .filter(|s| s.is_preceptor && s.fixed_shift.is_none())
        .map(|s| s.id.clone())
        .collect();
    if !preceptors.is_empty() {
        let mut next = 0;
        for member in staff.iter_mut().filter(|s| s.level <= 2 && !s.is_preceptor) {
            if rng.gen_bool(params.trainee_share) {
                member.on_training = Some(preceptors[next % preceptors.len()].clone());
                next += 1;
            }
        }
    }

    let mut schedule = ScheduleMatrix::new(staff.len(), params.days);
    for (row, member) in staff.iter().enumerate() {
        let allowed = member.allowed_shifts();
        for day in 0..params.days {
            if let Some(&code) = allowed.choose(&mut rng) {
                schedule.set(row, day, code);
            }
        }
    }
    mirror_trainees(&mut schedule, &staff);

    DemoRoster {
        staff,
        start_date,
        days: params.days,
        schedule,
    }
}

fn demo_staff(index: usize, level: u8) -> Staff {
    let target = if level == 6 { 0 } else { 6 };
    let mut member = Staff::new(format!("RES-{}", index + 1), generate_name(index))
        .with_level(level)
        .with_team(if index % 2 == 0 { "A" } else { "B" })
        .with_targets(target, target)
        .with_min_off(8);
    member.is_preceptor = level >= 5;
    member.exclude_from_count = level <= 1;
    if level == 6 {
        member.fixed_shift = Some(DAY);
    }
    member
}

fn find_next_monday(date: NaiveDate) -> NaiveDate {
    let days_until_monday = match date.weekday() {
        Weekday::Mon => 0,
        Weekday::Tue => 6,
        Weekday::Wed => 5,
        Weekday::Thu => 4,
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        Weekday::Sun => 1,
    };
    date + Duration::days(days_until_monday)
}

const FAMILY_NAMES: &[&str] = &["김", "이", "박", "최", "정", "강", "조", "윤", "장", "임"];
const GIVEN_NAMES: &[&str] = &["지우", "서준", "서연", "민준", "하은", "도윤", "지아", "예준", "수아", "시우"];

/// Family name + given name, numbered once the lists wrap.
fn generate_name(index: usize) -> String {
    let base = format!(
        "{}{}",
        FAMILY_NAMES[index % FAMILY_NAMES.len()],
        GIVEN_NAMES[index % GIVEN_NAMES.len()]
    );
    if index >= GIVEN_NAMES.len() {
        format!("{}{}", base, index)
    } else {
        base
    }
}
