//! Colorful console output for optimizer progress.
//!
//! Output is suppressed when the crate is built without the `console`
//! feature.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

#[inline]
fn enabled() -> bool {
    cfg!(feature = "console")
}

/// ASCII art banner for server startup.
pub fn print_banner() {
    if !enabled() {
        return;
    }
    let banner = r#"
  ____            _              _____             _
 |  _ \ ___  ___| |_ ___ _ __  | ____|_ __   __ _(_)_ __   ___
 | |_) / _ \/ __| __/ _ \ '__| |  _| | '_ \ / _` | | '_ \ / _ \
 |  _ < (_) \__ \ ||  __/ |    | |___| | | | (_| | | | | |  __/
 |_| \_\___/|___/\__\___|_|    |_____|_| |_|\__, |_|_| |_|\___|
                                            |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Roster Engine".bright_cyan()
    );
}

/// Prints the problem size when a generation run starts.
pub fn print_generation_started(epoch: u64, staff: usize, days: usize, enabled_rules: usize, score: f64) {
    if !enabled() {
        return;
    }
    println!(
        "{} {} {} epoch ({}), initial score ({}), random ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Optimizer]".bright_cyan(),
        epoch.to_string().yellow(),
        format_score(score),
        "StdRng".white()
    );
    println!(
        "{} {} {} staff ({}), days ({}), cells ({}), active rules ({}), problem scale ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Optimizer]".bright_cyan(),
        staff.to_formatted_string(&Locale::en).bright_yellow(),
        days.to_formatted_string(&Locale::en).bright_yellow(),
        (staff * days).to_formatted_string(&Locale::en).bright_yellow(),
        enabled_rules.to_string().bright_yellow(),
        calculate_problem_scale(staff * days, 4).bright_magenta()
    );
}

/// Prints one batch with generations per second.
pub fn print_batch_progress(generation: u64, elapsed: Duration, generations_run: u64, score: f64) {
    if !enabled() {
        return;
    }
    let per_sec = rate(generations_run, elapsed);
    println!(
        "    {} Gen {:>7} │ {} │ {}/sec │ {}",
        "→".bright_blue(),
        generation.to_formatted_string(&Locale::en).white(),
        format!("{:>6}", format_duration(elapsed)).bright_black(),
        format!("{:>6}", per_sec.to_formatted_string(&Locale::en)).bright_magenta().bold(),
        format_score(score)
    );
}

/// Prints the end-of-run summary box.
pub fn print_generation_ended(total: Duration, batches: u64, generations_run: u64, final_score: f64) {
    if !enabled() {
        return;
    }
    let per_sec = rate(generations_run, total);
    println!(
        "{} {} {} Generation ended: time spent ({}), best score ({}), speed ({}/sec), batch total ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Optimizer]".bright_cyan(),
        format_duration(total).yellow(),
        format_score(final_score),
        per_sec.to_formatted_string(&Locale::en).bright_magenta().bold(),
        batches.to_string().white()
    );

    // 60 chars wide, 56 char content area
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let clean = final_score >= 0.0;
    let status_text = if clean {
        "✓ NO RULE VIOLATIONS"
    } else {
        "✗ PENALTIES REMAIN"
    };
    let status_colored = if clean {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_yellow().bold().to_string()
    };
    let status_padding = 56 - status_text.chars().count();
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());
    for (label, value) in [
        ("Final Score:", format!("{:.0}", final_score)),
        ("Run Time:", format!("{:.2}s", total.as_secs_f64())),
        ("Generations:", generations_run.to_formatted_string(&Locale::en)),
        ("Speed:", format!("{}/sec", per_sec.to_formatted_string(&Locale::en))),
    ] {
        println!("{}  {:<18}{:>36}  {}", "║".bright_cyan(), label, value, "║".bright_cyan());
    }
    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

fn rate(count: u64, elapsed: Duration) -> u64 {
    if elapsed.as_secs_f64() > 0.0 {
        (count as f64 / elapsed.as_secs_f64()) as u64
    } else {
        0
    }
}

fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

fn format_score(score: f64) -> String {
    let text = format!("{:.0}", score);
    if score < 0.0 {
        text.bright_red().to_string()
    } else {
        text.bright_green().to_string()
    }
}

fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0.000".to_string())
}

/// `values ^ cells` in scientific notation.
fn calculate_problem_scale(cells: usize, values: usize) -> String {
    if cells == 0 || values == 0 {
        return "0".to_string();
    }
    let log_scale = (cells as f64) * (values as f64).log10();
    let exponent = log_scale.floor() as i32;
    let mantissa = 10f64.powf(log_scale - exponent as f64);
    format!("{:.3} × 10^{}", mantissa, exponent)
}

/// Tracks one generation run for progress lines and the summary.
#[derive(Debug)]
pub struct GenerationTimer {
    start: Instant,
    start_generation: u64,
    last_generation: u64,
    batches: u64,
    best_score: f64,
}

impl GenerationTimer {
    pub fn start(epoch: u64, staff: usize, days: usize, enabled_rules: usize, start_generation: u64, score: f64) -> Self {
        print_generation_started(epoch, staff, days, enabled_rules, score);
        Self {
            start: Instant::now(),
            start_generation,
            last_generation: start_generation,
            batches: 0,
            best_score: score,
        }
    }

    pub fn record_batch(&mut self, generation: u64, score: f64) {
        self.batches += 1;
        self.last_generation = generation;
        self.best_score = score;
        print_batch_progress(generation, self.start.elapsed(), self.generations_run(), score);
    }

    pub fn generations_run(&self) -> u64 {
        self.last_generation.saturating_sub(self.start_generation)
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn finish(self) {
        print_generation_ended(self.start.elapsed(), self.batches, self.generations_run(), self.best_score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_problem_scale() {
        assert_eq!(calculate_problem_scale(0, 4), "0");
        assert_eq!(calculate_problem_scale(3, 10), "1.000 × 10^3");
    }

    #[test]
    fn test_timer_counts_generations() {
        let mut timer = GenerationTimer::start(1, 2, 7, 5, 100, -50.0);
        timer.record_batch(150, -20.0);
        timer.record_batch(200, -10.0);
        assert_eq!(timer.batches(), 2);
        assert_eq!(timer.generations_run(), 100);
        timer.finish();
    }
}
