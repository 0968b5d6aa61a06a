//! Benchmark for full-schedule scoring and batch throughput.
//!
//! Run with: cargo run --release --bin bench

use roster_engine::config::EngineConfig;
use roster_engine::constraints::{evaluate, evaluate_with_blame, EvalContext};
use roster_engine::demo_data::{self, DemoData};
use roster_engine::domain::Requirement;
use roster_engine::error::Result;
use roster_engine::rules::default_rules;
use roster_engine::session::{InitPayload, OptimizationEngine};
use std::time::Instant;

const EVALUATIONS: u64 = 2_000;
const BATCHES: u64 = 5;

fn main() -> Result<()> {
    let demo = demo_data::generate(DemoData::Large);
    let requirement = Requirement::default();
    let rules = default_rules();

    println!("Benchmark: Full Evaluation");
    println!("  Staff: {}", demo.staff.len());
    println!("  Days: {}", demo.days);
    println!("  Enabled rules: {}", rules.iter().filter(|r| r.enabled).count());
    println!();

    let ctx = EvalContext::new(&demo.staff, demo.days, demo.start_date, &requirement);
    let init_start = Instant::now();
    let (initial_score, _) = evaluate_with_blame(&demo.schedule, &ctx, &rules)?;
    println!("Initial score: {:.0} ({:?})", initial_score, init_start.elapsed());

    let bench_start = Instant::now();
    let mut last = initial_score;
    for _ in 0..EVALUATIONS {
        last = evaluate(&demo.schedule, &ctx, &rules, None)?;
    }
    let elapsed = bench_start.elapsed();
    println!("  Evaluations: {}", EVALUATIONS);
    println!("  Time: {:.2?}", elapsed);
    println!("  Evaluations/sec: {:.0}", EVALUATIONS as f64 / elapsed.as_secs_f64());
    if last != initial_score {
        println!("  Score drifted: {} vs {}", last, initial_score);
    }
    println!();

    let config = EngineConfig::default().with_random_seed(0);
    let batch_size = config.batch_size as u64;
    let mut engine = OptimizationEngine::new(config);
    engine.initialize(InitPayload {
        staff: demo.staff.clone(),
        days: demo.days,
        start_date: demo.start_date,
        rules,
        requirement,
        warm_start: Some(demo.schedule.clone()),
    })?;

    println!("Benchmark: Genetic Batches ({} generations each)", batch_size);
    let run_start = Instant::now();
    let mut generation = 0;
    for _ in 0..BATCHES {
        let result = engine.run_batch(generation)?;
        generation = result.generation;
        println!("  Gen {:>5}: {:.0} ({:.2?})", generation, result.best_score, run_start.elapsed());
    }
    let elapsed = run_start.elapsed();
    println!("  Generations/sec: {:.1}", generation as f64 / elapsed.as_secs_f64());
    Ok(())
}
