//! Genetic search over schedule matrices.
//!
//! One call to [`GeneticSolver::evolve`] produces the next generation:
//! elites are copied unchanged, the rest are bred by tournament selection,
//! row or day-range crossover, and mutation restricted to each staff
//! member's allowed shifts. Fitness is the constraint score, computed in
//! parallel with rayon.

use chrono::NaiveDate;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::constraints::{evaluate, EvalContext};
use crate::domain::{
    resolve_preceptor, Requirement, ScheduleMatrix, ShiftCode, Staff, DAY, EVENING, NIGHT, OFF,
};
use crate::error::{EngineError, Result};
use crate::rules::ConstraintRule;

/// Baseline seeding odds per shift when a staff member has no target.
fn base_weight(code: ShiftCode) -> f64 {
    match code {
        NIGHT => 0.23,
        EVENING => 0.27,
        DAY => 0.30,
        _ => 0.20,
    }
}

/// Population-based optimizer for one roster configuration.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use roster_engine::config::EngineConfig;
/// use roster_engine::domain::{Requirement, Staff};
/// use roster_engine::rules::default_rules;
/// use roster_engine::solver::GeneticSolver;
///
/// let staff = vec![Staff::new("a", "Kim"), Staff::new("b", "Lee")];
/// let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let config = EngineConfig::default().with_random_seed(1);
/// let mut solver = GeneticSolver::new(staff, 7, start, Requirement::default(), default_rules(), config).unwrap();
///
/// let population = solver.seed_population(10, None).unwrap();
/// let next = solver.evolve(population).unwrap();
/// assert_eq!(next.len(), 10);
/// ```
pub struct GeneticSolver {
    staff: Vec<Staff>,
    days: usize,
    start_date: NaiveDate,
    requirement: Requirement,
    rules: Vec<ConstraintRule>,
    config: EngineConfig,
    allowed: Vec<Vec<ShiftCode>>,
    seeders: Vec<WeightedIndex<f64>>,
    rng: StdRng,
}

impl GeneticSolver {
    pub fn new(
        staff: Vec<Staff>,
        days: usize,
        start_date: NaiveDate,
        requirement: Requirement,
        rules: Vec<ConstraintRule>,
        config: EngineConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let allowed: Vec<Vec<ShiftCode>> = staff.iter().map(Staff::allowed_shifts).collect();
        let seeders = staff
            .iter()
            .zip(&allowed)
            .map(|(s, codes)| seed_distribution(s, codes, days))
            .collect::<Result<Vec<_>>>()?;
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            staff,
            days,
            start_date,
            requirement,
            rules,
            config,
            allowed,
            seeders,
            rng,
        })
    }

    pub fn staff(&self) -> &[Staff] {
        &self.staff
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.staff, self.days, self.start_date, &self.requirement)
    }

    /// Builds `size` random individuals.
    ///
    /// A warm start, if given, becomes the first individual after any
    /// disallowed cells are cleared to off.
    pub fn seed_population(
        &mut self,
        size: usize,
        warm_start: Option<&ScheduleMatrix>,
    ) -> Result<Vec<ScheduleMatrix>> {
        let mut population = Vec::with_capacity(size);
        if let Some(warm) = warm_start {
            warm.ensure_shape(self.staff.len(), self.days)?;
            if size > 0 {
                let mut first = warm.clone();
                self.sanitize(&mut first);
                population.push(first);
            }
        }
        while population.len() < size {
            let individual = self.random_individual();
            population.push(individual);
        }
        Ok(population)
    }

    fn random_individual(&mut self) -> ScheduleMatrix {
        let mut schedule = ScheduleMatrix::new(self.staff.len(), self.days);
        for (s, staff) in self.staff.iter().enumerate() {
            let codes = &self.allowed[s];
            let row = schedule.row_mut(s);
            for cell in row.iter_mut() {
                *cell = codes[self.seeders[s].sample(&mut self.rng)];
            }
            for (&day, &code) in staff.requests.range(..self.days) {
                if staff.is_allowed(code) {
                    row[day] = code;
                }
            }
        }
        schedule
    }

    fn sanitize(&self, schedule: &mut ScheduleMatrix) {
        for (s, staff) in self.staff.iter().enumerate() {
            for cell in schedule.row_mut(s) {
                if !staff.is_allowed(*cell) {
                    *cell = OFF;
                }
            }
        }
    }

    /// Scores every individual in parallel.
    pub fn score_population(&self, population: &[ScheduleMatrix]) -> Result<Vec<f64>> {
        let ctx = self.context();
        population
            .par_iter()
            .map(|individual| evaluate(individual, &ctx, &self.rules, None))
            .collect()
    }

    /// Index and score of the fittest individual; ties go to the lowest index.
    pub fn best(&self, population: &[ScheduleMatrix]) -> Result<(usize, f64)> {
        let scores = self.score_population(population)?;
        best_of(&scores).ok_or_else(|| EngineError::Configuration("population is empty".into()))
    }

    /// Produces the next generation.
    ///
    /// The best individual never gets worse: elites survive unchanged, and a
    /// single-member population keeps the better of parent and mutant.
    pub fn evolve(&mut self, population: Vec<ScheduleMatrix>) -> Result<Vec<ScheduleMatrix>> {
        if population.is_empty() {
            return Ok(population);
        }
        for individual in &population {
            individual.ensure_shape(self.staff.len(), self.days)?;
        }
        let scores = self.score_population(&population)?;

        if population.len() == 1 {
            return self.hill_climb(population, scores[0]);
        }

        let mut order: Vec<usize> = (0..population.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let elites = self.config.elite_count.clamp(1, population.len());
        let mut next: Vec<ScheduleMatrix> =
            order[..elites].iter().map(|&i| population[i].clone()).collect();

        while next.len() < population.len() {
            let a = self.tournament(&scores);
            let b = self.tournament(&scores);
            let mut child = if self.rng.gen_bool(self.config.crossover_rate) {
                self.crossover(&population[a], &population[b])
            } else {
                population[a].clone()
            };
            self.mutate(&mut child);
            next.push(child);
        }
        Ok(next)
    }

    fn hill_climb(&mut self, mut population: Vec<ScheduleMatrix>, parent_score: f64) -> Result<Vec<ScheduleMatrix>> {
        let mut child = population[0].clone();
        self.mutate(&mut child);
        self.flip_one(&mut child);
        let child_score = evaluate(&child, &self.context(), &self.rules, None)?;
        if child_score >= parent_score {
            population[0] = child;
        }
        Ok(population)
    }

    fn tournament(&mut self, scores: &[f64]) -> usize {
        let mut winner = self.rng.gen_range(0..scores.len());
        for _ in 1..self.config.tournament_size {
            let challenger = self.rng.gen_range(0..scores.len());
            if scores[challenger] > scores[winner] {
                winner = challenger;
            }
        }
        winner
    }

    fn crossover(&mut self, a: &ScheduleMatrix, b: &ScheduleMatrix) -> ScheduleMatrix {
        let mut child = a.clone();
        if self.days == 0 || self.staff.is_empty() {
            return child;
        }
        if self.rng.gen_bool(0.5) {
            for s in 0..self.staff.len() {
                if self.rng.gen_bool(0.5) {
                    child.row_mut(s).copy_from_slice(b.row(s));
                }
            }
        } else {
            let lo = self.rng.gen_range(0..self.days);
            let hi = self.rng.gen_range(lo..self.days) + 1;
            for s in 0..self.staff.len() {
                child.row_mut(s)[lo..hi].copy_from_slice(&b.row(s)[lo..hi]);
            }
        }
        child
    }

    fn mutate(&mut self, schedule: &mut ScheduleMatrix) {
        let rate = self.config.mutation_rate;
        if rate <= 0.0 {
            return;
        }
        for s in 0..self.staff.len() {
            let codes = &self.allowed[s];
            for cell in schedule.row_mut(s) {
                if self.rng.gen_bool(rate) {
                    *cell = codes[self.rng.gen_range(0..codes.len())];
                }
            }
        }
    }

    fn flip_one(&mut self, schedule: &mut ScheduleMatrix) {
        if self.staff.is_empty() || self.days == 0 {
            return;
        }
        let s = self.rng.gen_range(0..self.staff.len());
        let d = self.rng.gen_range(0..self.days);
        let codes = &self.allowed[s];
        schedule.set(s, d, codes[self.rng.gen_range(0..codes.len())]);
    }
}

fn seed_distribution(staff: &Staff, codes: &[ShiftCode], days: usize) -> Result<WeightedIndex<f64>> {
    let horizon = days.max(1) as f64;
    let weights = codes.iter().map(|&code| {
        let target = match code {
            OFF => staff.min_off,
            other => staff.target_for(other).unwrap_or(0),
        };
        if target > 0 {
            (f64::from(target) / horizon).min(1.0)
        } else {
            base_weight(code)
        }
    });
    WeightedIndex::new(weights).map_err(|e| {
        EngineError::Configuration(format!("cannot seed shifts for '{}': {}", staff.id, e))
    })
}

fn best_of(scores: &[f64]) -> Option<(usize, f64)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, score)| match best {
            Some((_, b)) if b >= score => best,
            _ => Some((i, score)),
        })
}

/// Copies each trainee's row from the root of its preceptor chain.
///
/// Returns true if any cell changed. Applying it twice changes nothing the
/// second time.
pub fn mirror_trainees(schedule: &mut ScheduleMatrix, staff: &[Staff]) -> bool {
    let position: HashMap<&str, usize> =
        staff.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();
    let mut changed = false;
    for i in 0..staff.len().min(schedule.staff_count()) {
        let Some(root) = resolve_preceptor(staff, &position, i) else {
            continue;
        };
        if root < schedule.staff_count() && schedule.row(root) != schedule.row(i) {
            schedule.copy_row(root, i);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn ward() -> Vec<Staff> {
        vec![
            Staff::new("h", "Head").with_level(6).with_fixed_shift(DAY),
            Staff::new("c", "Charge").with_level(5).preceptor().with_targets(3, 3),
            Staff::new("n", "Newbie").with_level(2).trainee_of("c"),
            Staff::new("j", "Junior").with_forbidden([NIGHT]).with_request(2, OFF),
            Staff::new("w", "Weekday").weekday_day_only(),
            Staff::new("s", "Senior").with_level(4).with_targets(4, 2),
        ]
    }

    fn solver(rules: Vec<ConstraintRule>) -> GeneticSolver {
        let config = EngineConfig::default().with_random_seed(42);
        GeneticSolver::new(ward(), 14, start(), Requirement::default(), rules, config).unwrap()
    }

    #[test]
    fn test_best_score_never_decreases() {
        let mut solver = solver(default_rules());
        let mut population = solver.seed_population(30, None).unwrap();
        let (_, mut best) = solver.best(&population).unwrap();
        for _ in 0..20 {
            population = solver.evolve(population).unwrap();
            let (_, next_best) = solver.best(&population).unwrap();
            assert!(next_best >= best, "{} < {}", next_best, best);
            best = next_best;
        }
        assert_eq!(population.len(), 30);
    }

    #[test]
    fn test_search_only_places_allowed_shifts() {
        let mut solver = solver(default_rules());
        let mut population = solver.seed_population(20, None).unwrap();
        for _ in 0..10 {
            population = solver.evolve(population).unwrap();
        }
        let staff = ward();
        for individual in &population {
            for (s, member) in staff.iter().enumerate() {
                assert!(individual.row(s).iter().all(|&c| member.is_allowed(c)), "{}", member.id);
            }
        }
    }

    #[test]
    fn test_seed_applies_requests_and_warm_start() {
        let mut solver = solver(default_rules());
        let population = solver.seed_population(5, None).unwrap();
        assert!(population.iter().all(|p| p.get(3, 2) == OFF));

        let mut warm = ScheduleMatrix::new(6, 14);
        warm.fill(NIGHT);
        let population = solver.seed_population(3, Some(&warm)).unwrap();
        assert_eq!(population.len(), 3);
        // Head is pinned to days and Weekday works days only.
        assert!(population[0].row(0).iter().all(|&c| c == OFF));
        assert!(population[0].row(1).iter().all(|&c| c == NIGHT));
        assert!(population[0].row(4).iter().all(|&c| c == OFF));

        let wrong = ScheduleMatrix::new(6, 13);
        assert!(solver.seed_population(3, Some(&wrong)).is_err());
    }

    #[test]
    fn test_evolve_rejects_bad_shape_and_passes_empty() {
        let mut solver = solver(default_rules());
        assert!(solver.evolve(Vec::new()).unwrap().is_empty());
        let err = solver.evolve(vec![ScheduleMatrix::new(6, 10)]).unwrap_err();
        assert_eq!(err, EngineError::ShapeMismatch { expected: 84, actual: 60 });
    }

    #[test]
    fn test_single_individual_never_worse() {
        let mut solver = solver(default_rules());
        let mut population = solver.seed_population(1, None).unwrap();
        let (_, mut best) = solver.best(&population).unwrap();
        for _ in 0..30 {
            population = solver.evolve(population).unwrap();
            assert_eq!(population.len(), 1);
            let (_, score) = solver.best(&population).unwrap();
            assert!(score >= best);
            best = score;
        }
    }

    #[test]
    fn test_no_rules_scores_zero() {
        let mut solver = solver(Vec::new());
        let population = solver.seed_population(8, None).unwrap();
        assert!(solver.score_population(&population).unwrap().iter().all(|&s| s == 0.0));
        let next = solver.evolve(population).unwrap();
        assert_eq!(next.len(), 8);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut a = solver(default_rules());
        let mut b = solver(default_rules());
        let pa = a.seed_population(10, None).unwrap();
        let pb = b.seed_population(10, None).unwrap();
        assert_eq!(pa, pb);
        assert_eq!(a.evolve(pa).unwrap(), b.evolve(pb).unwrap());
    }

    #[test]
    fn test_mirror_trainees_idempotent() {
        let staff = vec![
            Staff::new("root", "Root").preceptor(),
            Staff::new("mid", "Mid").preceptor().trainee_of("root"),
            Staff::new("leaf", "Leaf").trainee_of("mid"),
            Staff::new("solo", "Solo"),
        ];
        let mut schedule =
            ScheduleMatrix::from_cells(4, 3, vec![1, 2, 3, 0, 0, 0, 2, 2, 2, 3, 3, 3]).unwrap();

        assert!(mirror_trainees(&mut schedule, &staff));
        assert_eq!(schedule.row(1), &[1, 2, 3]);
        assert_eq!(schedule.row(2), &[1, 2, 3]);
        assert_eq!(schedule.row(3), &[3, 3, 3]);

        let once = schedule.clone();
        assert!(!mirror_trainees(&mut schedule, &staff));
        assert_eq!(schedule, once);
    }

    #[test]
    fn test_best_of_prefers_first_tie() {
        assert_eq!(best_of(&[-3.0, -1.0, -1.0]), Some((1, -1.0)));
        assert_eq!(best_of(&[]), None);
    }

    #[test]
    fn test_invalid_config_is_configuration_error() {
        let mut config = EngineConfig::default();
        config.crossover_rate = 2.0;
        let err = GeneticSolver::new(ward(), 7, start(), Requirement::default(), default_rules(), config)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
