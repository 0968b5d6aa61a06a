//! Constraint rule definitions.
//!
//! Each rule kind carries its own typed parameters. The engine in
//! [`crate::constraints`] dispatches on [`RuleKind`].

use serde::{Deserialize, Serialize};

use crate::domain::{ShiftCode, DAY, EVENING, NIGHT, OFF};

/// Informational priority tier shown next to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// Broad grouping of rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleCategory {
    Pattern,
    Resource,
    TeamBalance,
    Global,
}

/// What a rule checks, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuleKind {
    /// Working more than `max_days` in a row.
    MaxConsecutiveWork { max_days: u32 },
    /// After `stretch` consecutive work days, at least `min_off` days off.
    MinRestAfterStretch { stretch: u32, min_off: u32 },
    /// A consecutive shift sequence such as Evening→Day.
    ForbiddenSequence { pattern: Vec<ShiftCode> },
    /// Absolute deviation from the staff's night or evening target.
    ShiftTarget { shift: ShiftCode },
    /// More than `max` assignments of one shift over the horizon.
    MaxShiftCount { shift: ShiftCode, max: u32 },
    /// Fewer off days than the staff's `min_off`.
    MinOffDays,
    /// Fewer than `min_off` off days in each 7-day window from day 0.
    WeeklyRest { min_off: u32 },
    /// More than `max` worked weekend/holiday days.
    MaxWeekendWork { max: u32 },
    /// Headcount deficit (weight 1) and surplus (weight `surplus_ratio`) per shift per day.
    Coverage { surplus_ratio: f64 },
    /// Fewer than `min_count` staff at `min_level` or above on a staffed shift.
    SkillMix { min_level: u8, min_count: u32 },
    /// Team headcounts on a shift differing by more than `max_gap`.
    TeamBalance { max_gap: u32 },
    ForbiddenShifts,
    FixedShift,
    HonorRequests,
    WeekdayDayOnly,
}

impl RuleKind {
    pub fn category(&self) -> RuleCategory {
        match self {
            RuleKind::MaxConsecutiveWork { .. }
            | RuleKind::MinRestAfterStretch { .. }
            | RuleKind::ForbiddenSequence { .. }
            | RuleKind::WeeklyRest { .. } => RuleCategory::Pattern,
            RuleKind::ShiftTarget { .. }
            | RuleKind::MaxShiftCount { .. }
            | RuleKind::MinOffDays
            | RuleKind::MaxWeekendWork { .. }
            | RuleKind::ForbiddenShifts
            | RuleKind::FixedShift
            | RuleKind::HonorRequests
            | RuleKind::WeekdayDayOnly => RuleCategory::Resource,
            RuleKind::TeamBalance { .. } => RuleCategory::TeamBalance,
            RuleKind::Coverage { .. } | RuleKind::SkillMix { .. } => RuleCategory::Global,
        }
    }
}

/// A weighted, toggleable rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub priority: Priority,
    /// Penalty per unit of violation. Never negative.
    pub weight: f64,
    pub kind: RuleKind,
}

impl ConstraintRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: RuleKind, weight: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority: Priority::Medium,
            weight: weight.max(0.0),
            kind,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn category(&self) -> RuleCategory {
        self.kind.category()
    }
}

/// Partial update applied by the store's rule editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePatch {
    pub enabled: Option<bool>,
    pub weight: Option<f64>,
    pub priority: Option<Priority>,
    pub kind: Option<RuleKind>,
}

impl RulePatch {
    pub fn apply(&self, rule: &mut ConstraintRule) {
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(weight) = self.weight {
            rule.weight = weight.max(0.0);
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(kind) = &self.kind {
            rule.kind = kind.clone();
        }
    }
}

/// The standard ward rule set.
pub fn default_rules() -> Vec<ConstraintRule> {
    vec![
        ConstraintRule::new("c1", "Max Consecutive Work", RuleKind::MaxConsecutiveWork { max_days: 5 }, 100.0)
            .with_priority(Priority::High)
            .with_description("Limit maximum consecutive working days"),
        ConstraintRule::new(
            "c2",
            "Min Off Days",
            RuleKind::MinRestAfterStretch { stretch: 3, min_off: 2 },
            100.0,
        )
        .with_priority(Priority::High)
        .with_description("Minimum days off after consecutive work sequence"),
        ConstraintRule::new(
            "c3",
            "No NOD Pattern",
            RuleKind::ForbiddenSequence { pattern: vec![NIGHT, OFF, DAY] },
            500.0,
        )
        .with_priority(Priority::Critical)
        .with_description("Prevent Night-Off-Day pattern"),
        ConstraintRule::new("c4", "Max Night Shifts", RuleKind::MaxShiftCount { shift: NIGHT, max: 7 }, 50.0)
            .with_description("Limit maximum night shifts per staff member"),
        ConstraintRule::new(
            "c5",
            "E-D Gap",
            RuleKind::ForbiddenSequence { pattern: vec![EVENING, DAY] },
            500.0,
        )
        .with_priority(Priority::Critical)
        .with_description("Prevent Day shift immediately after Evening"),
        ConstraintRule::new("c6", "Skill Mix", RuleKind::SkillMix { min_level: 5, min_count: 1 }, 1000.0)
            .with_priority(Priority::Critical)
            .with_description("Ensure at least one skilled staff member (Lv 5+) per shift"),
        ConstraintRule::new("c7", "Max Weekend Work", RuleKind::MaxWeekendWork { max: 4 }, 100.0)
            .with_priority(Priority::High)
            .with_description("Limit excessive weekend shifts for fairness"),
        ConstraintRule::new(
            "c8",
            "N-D Gap",
            RuleKind::ForbiddenSequence { pattern: vec![NIGHT, DAY] },
            500.0,
        )
        .with_priority(Priority::Critical)
        .with_description("Prevent Day shift immediately after Night"),
        ConstraintRule::new("c9", "Coverage", RuleKind::Coverage { surplus_ratio: 0.25 }, 200.0)
            .with_priority(Priority::Critical)
            .with_description("Meet daily headcount per shift"),
        ConstraintRule::new("c10", "Night Target", RuleKind::ShiftTarget { shift: NIGHT }, 20.0)
            .with_description("Stay close to each staff member's night target"),
        ConstraintRule::new("c11", "Evening Target", RuleKind::ShiftTarget { shift: EVENING }, 10.0)
            .with_priority(Priority::Low)
            .with_description("Stay close to each staff member's evening target"),
        ConstraintRule::new("c12", "Min Monthly Off", RuleKind::MinOffDays, 50.0)
            .with_description("Grant each staff member their minimum off days"),
        ConstraintRule::new("c13", "Forbidden Shifts", RuleKind::ForbiddenShifts, 1000.0)
            .with_priority(Priority::Critical)
            .with_description("Never assign a shift the staff member cannot work"),
        ConstraintRule::new("c14", "Fixed Shift", RuleKind::FixedShift, 1000.0)
            .with_priority(Priority::Critical)
            .with_description("Pinned staff work only their pinned shift"),
        ConstraintRule::new("c15", "Requests", RuleKind::HonorRequests, 80.0)
            .with_priority(Priority::High)
            .with_description("Honor requested shifts and days off"),
        ConstraintRule::new("c16", "Weekday Day Only", RuleKind::WeekdayDayOnly, 1000.0)
            .with_priority(Priority::Critical)
            .with_description("Weekday-day staff work weekday day shifts only"),
        ConstraintRule::new("c17", "Team Balance", RuleKind::TeamBalance { max_gap: 1 }, 10.0)
            .with_priority(Priority::Low)
            .with_description("Spread each shift evenly across teams")
            .disabled(),
        ConstraintRule::new("c18", "Weekly Rest", RuleKind::WeeklyRest { min_off: 1 }, 100.0)
            .with_priority(Priority::High)
            .with_description("At least one off day in every week")
            .disabled(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_ids_unique() {
        let rules = default_rules();
        let mut ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn test_rule_kind_serde_is_tagged() {
        let kind = RuleKind::MaxConsecutiveWork { max_days: 5 };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"type":"maxConsecutiveWork","maxDays":5}"#);

        let parsed: RuleKind = serde_json::from_str(r#"{"type":"weeklyRest","minOff":1}"#).unwrap();
        assert_eq!(parsed, RuleKind::WeeklyRest { min_off: 1 });
    }

    #[test]
    fn test_patch_clamps_weight() {
        let mut rule = ConstraintRule::new("x", "X", RuleKind::MinOffDays, 10.0);
        RulePatch {
            weight: Some(-5.0),
            enabled: Some(false),
            ..Default::default()
        }
        .apply(&mut rule);
        assert_eq!(rule.weight, 0.0);
        assert!(!rule.enabled);
    }

    #[test]
    fn test_categories() {
        assert_eq!(RuleKind::Coverage { surplus_ratio: 0.0 }.category(), RuleCategory::Global);
        assert_eq!(RuleKind::TeamBalance { max_gap: 1 }.category(), RuleCategory::TeamBalance);
        assert_eq!(RuleKind::HonorRequests.category(), RuleCategory::Resource);
    }
}
