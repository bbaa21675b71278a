//! ReelForge Spin Simulator
//!
//! Plays recorded spin outcomes through the presentation pipeline on the
//! virtual clock and prints the settled board of each spin.
//!
//! Usage:
//!   rf-spin-sim --outcome spins.json
//!   rf-spin-sim --outcome spins.json --config game.yaml --profile turbo
//!   rf-spin-sim --outcome spins.json --slam-at-ms 250 --trace
//!
//! The outcome file holds one spin outcome object or an array of them.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rf_pipeline::{
    CreditLedger, PipelineConfig, Services, SpinDriver, SpinOutcome, SpinReport, TimingProfile,
};

#[derive(Parser)]
#[command(name = "rf-spin-sim", about = "Play spin outcomes through the presentation pipeline")]
struct Cli {
    /// Spin outcome file (JSON object or array of objects)
    #[arg(short, long)]
    outcome: PathBuf,

    /// Pipeline config (.json, .yaml, .yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timing profile override (normal, turbo, instant)
    #[arg(short, long, value_parser = parse_profile)]
    profile: Option<TimingProfile>,

    /// Wager announced before the first spin
    #[arg(short, long)]
    wager: Option<f64>,

    /// Slam-stop each spin this many ms after it starts
    #[arg(long)]
    slam_at_ms: Option<u64>,

    /// Print the phase trace of each spin as JSON
    #[arg(long)]
    trace: bool,
}

fn parse_profile(raw: &str) -> Result<TimingProfile, String> {
    TimingProfile::from_type_name(raw)
        .ok_or_else(|| format!("unknown profile '{raw}' (normal, turbo, instant)"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(profile) = cli.profile {
        config.timing = profile;
    }

    let outcomes = load_outcomes(&cli.outcome)?;
    if outcomes.is_empty() {
        bail!("{} holds no spin outcomes", cli.outcome.display());
    }

    let ledger = Rc::new(CreditLedger::new());
    let services = Services::default().with_credits(ledger.clone());
    let mut driver = SpinDriver::with_builtins(config, services)?;
    log::info!(
        "Playing {} spin(s) with {} module(s)",
        outcomes.len(),
        driver.dispatcher().registry().len()
    );

    driver.start_game()?;
    if let Some(wager) = cli.wager {
        driver.change_wager(wager)?;
    }

    for outcome in &outcomes {
        if let Some(offset) = cli.slam_at_ms {
            driver.schedule_slam_stop(driver.now_ms() + offset);
        }
        let report = driver.play_spin(outcome)?;
        print_report(&driver, &report);
        if cli.trace {
            println!("{}", serde_json::to_string_pretty(&report.phases)?);
        }
    }

    println!(
        "Credits: {:.2} over {} award(s)",
        ledger.total(),
        ledger.entries().len()
    );
    driver.shutdown();
    Ok(())
}

fn load_outcomes(path: &Path) -> Result<Vec<SpinOutcome>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading outcome file {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let outcomes = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<SpinOutcome>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(outcomes)
}

fn print_report(driver: &SpinDriver, report: &SpinReport) {
    println!(
        "Spin {} ({}ms{})",
        report.spin_index,
        report.elapsed_ms(),
        if report.slam_stopped { ", slam-stopped" } else { "" }
    );

    let rows = driver.spin().with_grid(rf_board::Grid::visual_rows);
    for row in rows {
        let cells: Vec<String> = row.iter().map(|name| format!("{name:>4}")).collect();
        println!("  {}", cells.join(""));
    }
    if !report.grid.locked_reels.is_empty() {
        println!("  locked reels: {:?}", report.grid.locked_reels);
    }

    for diagnostic in &report.diagnostics {
        println!(
            "  ! {} @{}ms: {}",
            diagnostic.kind.display_name(),
            diagnostic.at_ms,
            diagnostic.message
        );
    }
}
