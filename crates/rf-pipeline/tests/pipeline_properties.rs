//! Pipeline-wide properties and feature flows
//!
//! Phase completeness, once-per-spin application, order independence of
//! concurrent dispatch, plus the reevaluation, meter and free-spin flows.

use std::io::Write;
use std::rc::Rc;

use rf_board::mutation::{self, apply_batch};
use rf_board::{BatchOrigin, BoardError, Grid, MutateOptions, MutationManager, MutationId};
use rf_phase::{Phase, PhaseExecution};
use rf_pipeline::modules::FreeSpinTally;
use rf_pipeline::{
    CreditLedger, DiagnosticKind, ModuleConfig, OutcomeFlags, PipelineConfig, ReevaluationOutcome, Services,
    SpinDriver, SpinOutcome, TimedEffectPlayer, TimingProfile,
};
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn instant() -> PipelineConfig {
    PipelineConfig::default().with_timing(TimingProfile::Instant)
}

fn builtin_driver(config: PipelineConfig) -> SpinDriver {
    SpinDriver::with_builtins(config, Services::default()).unwrap()
}

fn stops(symbol: &str) -> Vec<Vec<String>> {
    vec![vec![symbol.to_string(); 3]; 5]
}

fn busy_outcome() -> SpinOutcome {
    SpinOutcome::with_mutations(json!([
        {"type": "cell_replace", "reel": 0, "position": 0, "symbol": "WD"},
        {"type": "multi_cell_replace", "reel": 1, "positions": [2, 0], "symbol": "SC"},
        {"type": "trigger_reveal", "trigger": {"reel": 3, "position": 1},
         "affected": [{"reel": 2, "position": 1}, {"reel": 4, "position": 1}], "symbol": "BN"},
        {"type": "reel_lock", "reel": 3},
    ]))
    .with_stops(stops("K"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_blocking_phases_end_with_every_task_terminal() {
    let mut driver = builtin_driver(PipelineConfig::default());
    let outcome = busy_outcome()
        .with_reevaluation(ReevaluationOutcome {
            stops: Some(stops("Q")),
            mutations: json!([{"type": "cell_replace", "reel": 0, "position": 2, "symbol": "WD"}]),
        })
        .with_flags(OutcomeFlags {
            bonus_game_ended: true,
            ..Default::default()
        });
    let report = driver.play_spin(&outcome).unwrap();

    let blocking: Vec<_> = report
        .phases
        .iter()
        .filter(|record| record.execution.is_blocking())
        .collect();
    assert!(!blocking.is_empty());
    for record in blocking {
        for module in &record.modules {
            assert!(
                module.state.is_terminal(),
                "{} still {:?} after {}",
                module.module,
                module.state,
                record.phase
            );
        }
    }
    assert_eq!(driver.dispatcher().outstanding_count(), 0);
    assert!(report.diagnostics.is_empty());
}

#[test]
fn test_mutation_applies_once_per_spin() {
    let mut manager = MutationManager::new();
    let mut grid = Grid::filled(5, 3, "A").unwrap();
    manager
        .ingest(
            BatchOrigin::Spin,
            &json!([{"type": "cell_replace", "reel": 1, "position": 1, "symbol": "WD"}]),
        )
        .unwrap();
    let id = MutationId {
        origin: BatchOrigin::Spin,
        index: 0,
    };

    manager.apply(&mut grid, id, MutateOptions::animated()).unwrap();
    let second = manager.apply(&mut grid, id, MutateOptions::animated());
    assert_eq!(second, Err(BoardError::AlreadyApplied(id)));
    assert_eq!(grid.changes().len(), 1);

    // A fresh copy of the board takes the same batch to the same result
    let batch = manager.spin_batch().unwrap().clone();
    let mut first = Grid::filled(5, 3, "A").unwrap();
    let mut again = Grid::filled(5, 3, "A").unwrap();
    apply_batch(&mut first, &batch, MutateOptions::silent());
    apply_batch(&mut again, &batch, MutateOptions::silent());
    assert_eq!(first.snapshot(), again.snapshot());
    assert_eq!(first.snapshot(), grid.snapshot());

    let pure = mutation::applied(&Grid::filled(5, 3, "A").unwrap(), &batch.entries()[0].mutation, MutateOptions::silent())
        .unwrap();
    assert_eq!(pure.snapshot(), grid.snapshot());
}

#[test]
fn test_concurrent_settle_matches_sequential() {
    let mut sequential = builtin_driver(PipelineConfig::default());
    let mut concurrent = builtin_driver(
        PipelineConfig::default()
            .with_phase_execution(Phase::ReelsStoppedCallback, PhaseExecution::Concurrent),
    );

    let a = sequential.play_spin(&busy_outcome()).unwrap();
    let b = concurrent.play_spin(&busy_outcome()).unwrap();

    assert_eq!(a.grid, b.grid);
    assert_eq!(a.grid.locked_reels, vec![3]);
    assert!(b.elapsed_ms() <= a.elapsed_ms());
}

#[test]
fn test_two_modules_never_present_the_same_mutation() {
    // Replace on reel stop and again on settle: only the first dispatch writes
    let config = instant().with_module(
        "symbol_replace",
        ModuleConfig::new().with_param("on_reel_stop", true),
    );
    let mut driver = builtin_driver(config);

    let outcome = SpinOutcome::with_mutations(json!([
        {"type": "cell_replace", "reel": 2, "position": 0, "symbol": "WD"},
    ]));
    let report = driver.play_spin(&outcome).unwrap();

    let writes = driver.spin().with_grid(|grid| grid.changes().len());
    assert_eq!(writes, 1);
    let settle = report
        .phases
        .iter()
        .find(|r| r.phase == Phase::ReelsStoppedCallback)
        .unwrap();
    assert!(settle.modules.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPIN FLOW
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_phase_sequence_of_a_full_spin() {
    let config = instant().with_grid(rf_board::GridSpec::new(2, 3));
    let mut driver = builtin_driver(config);

    let outcome = SpinOutcome::default()
        .with_reevaluation(ReevaluationOutcome::default())
        .with_flags(OutcomeFlags {
            freespin_game_ended: true,
            ..Default::default()
        });
    let report = driver.play_spin(&outcome).unwrap();

    use Phase::*;
    assert_eq!(
        report.phase_sequence(),
        vec![
            PreSpin,
            PreReelsStopSpinning,
            SpecificReelStopping,
            SpecificReelStop,
            ReelEndRollback,
            SpecificReelStopping,
            SpecificReelStop,
            ReelEndRollback,
            ReelsStoppedCallback,
            ReevaluationSpinStart,
            ReevaluationPreReelsStopSpinning,
            ReevaluationSpecificReelStop,
            ReevaluationSpecificReelStop,
            ReevaluationReelsStoppedCallback,
            FreespinGameEnd,
        ]
    );
    assert_eq!(report.spin_index, 1);
}

#[test]
fn test_reel_lock_holds_through_reevaluation() {
    let mut driver = builtin_driver(instant());

    let outcome = SpinOutcome::with_mutations(json!([
        {"type": "reel_lock", "reel": 2, "symbol": "WD"},
    ]))
    .with_stops(stops("K"))
    .with_reevaluation(ReevaluationOutcome {
        stops: Some(stops("Q")),
        mutations: json!([]),
    });
    let report = driver.play_spin(&outcome).unwrap();

    let rows = driver.spin().with_grid(|grid| grid.visual_rows());
    for row in rows {
        assert_eq!(row, vec!["Q", "Q", "WD", "Q", "Q"]);
    }
    assert_eq!(report.grid.locked_reels, vec![2]);

    // Locks last one spin
    let next = driver.play_spin(&SpinOutcome::default().with_stops(stops("J"))).unwrap();
    assert!(next.grid.locked_reels.is_empty());
    assert_eq!(driver.spin().with_grid(|g| g.name_at(2, 0).map(str::to_string)), Some("J".into()));
}

#[test]
fn test_reevaluation_mutations_read_their_own_batch() {
    let mut driver = builtin_driver(instant());

    let outcome = SpinOutcome::with_mutations(json!([
        {"type": "cell_replace", "reel": 0, "position": 0, "symbol": "WD"},
    ]))
    .with_reevaluation(ReevaluationOutcome {
        stops: None,
        mutations: json!([{"type": "cell_replace", "reel": 4, "position": 2, "symbol": "SC"}]),
    });
    let report = driver.play_spin(&outcome).unwrap();

    assert_eq!(report.grid.name_at(rf_board::CellPos::new(0, 0)), Some("WD"));
    assert_eq!(report.grid.name_at(rf_board::CellPos::new(4, 2)), Some("SC"));

    let reevaluation = report
        .phases
        .iter()
        .find(|r| r.phase == Phase::ReevaluationReelsStoppedCallback)
        .unwrap();
    assert_eq!(reevaluation.args.reevaluation, Some(0));
    assert!(reevaluation.modules.iter().any(|m| m.module.as_str() == "symbol_replace"));
}

#[test]
fn test_meter_win_credits_before_celebration() {
    let ledger = Rc::new(CreditLedger::new());
    let effects = Rc::new(TimedEffectPlayer::new());
    let config = PipelineConfig::default().with_module(
        "meters",
        ModuleConfig::new().with_param("seed", json!({"grand": 1000.0})),
    );
    let services = Services::default()
        .with_credits(ledger.clone())
        .with_effects(effects.clone());
    let mut driver = SpinDriver::with_builtins(config, services).unwrap();

    driver.start_game().unwrap();
    assert_eq!(driver.spin().meters().value("grand"), 1000.0);

    let outcome = SpinOutcome::with_mutations(json!([
        {"type": "meter_event", "key": "grand", "kind": "increase", "amount": 50.0},
        {"type": "meter_event", "key": "grand", "kind": "win", "amount": 1050.0},
    ]));
    driver.schedule_slam_stop(100);
    let report = driver.play_spin(&outcome).unwrap();

    assert!(report.slam_stopped);
    assert_eq!(ledger.total(), 1050.0);
    assert_eq!(ledger.entries()[0].reason, "grand win");
    assert_eq!(driver.spin().meters().value("grand"), 0.0);
    assert!(effects.played().iter().any(|cue| cue.name == "jackpot_win"));
}

#[test]
fn test_meter_win_without_amount_credits_nothing() {
    let ledger = Rc::new(CreditLedger::new());
    let effects = Rc::new(TimedEffectPlayer::new());
    let services = Services::default()
        .with_credits(ledger.clone())
        .with_effects(effects.clone());
    let mut driver = SpinDriver::with_builtins(instant(), services).unwrap();

    let outcome = SpinOutcome::with_mutations(json!([
        {"type": "meter_event", "key": "grand", "kind": "win"},
    ]));
    let report = driver.play_spin(&outcome).unwrap();

    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::MalformedMutation && d.message.contains("amount")));
    assert!(ledger.entries().is_empty());
    assert!(!effects.played().iter().any(|cue| cue.name == "jackpot_win"));
}

#[test]
fn test_free_spin_tally_across_spins() {
    let mut driver = builtin_driver(instant());
    let in_free_spins = OutcomeFlags {
        in_free_spins: true,
        ..Default::default()
    };

    driver
        .play_spin(&SpinOutcome::with_mutations(json!([{"type": "free_spin_award", "count": 3}])))
        .unwrap();
    let tally = driver.spin().slot_value::<FreeSpinTally>().unwrap();
    assert_eq!((tally.awarded, tally.remaining, tally.played), (3, 3, 0));

    driver
        .play_spin(&SpinOutcome::default().with_flags(in_free_spins.clone()))
        .unwrap();
    let tally = driver.spin().slot_value::<FreeSpinTally>().unwrap();
    assert_eq!((tally.remaining, tally.played), (2, 1));

    let last = OutcomeFlags {
        freespin_game_ended: true,
        ..in_free_spins
    };
    let report = driver.play_spin(&SpinOutcome::default().with_flags(last)).unwrap();
    assert!(driver.spin().slot_value::<FreeSpinTally>().is_none());

    let end = report
        .phases
        .iter()
        .find(|r| r.phase == Phase::FreespinGameEnd)
        .unwrap();
    assert!(end.modules.iter().any(|m| m.module.as_str() == "free_spins"));
}

#[test]
fn test_wager_change_is_recorded() {
    let mut driver = builtin_driver(instant());
    let outcome = driver.change_wager(2.5).unwrap();
    assert_eq!(outcome.phase, Phase::WagerChange);
    assert_eq!(driver.spin().wager(), 2.5);
}

#[test]
fn test_whole_batch_not_a_list_is_a_diagnostic() {
    let mut driver = builtin_driver(instant());
    let report = driver
        .play_spin(&SpinOutcome::with_mutations(json!("cell_replace")))
        .unwrap();

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(
        driver.spin().with_mutations(|m| m.spin_batch().map(|b| b.len())),
        Some(0)
    );
}

#[test]
fn test_wrong_stops_shape_is_fatal() {
    let mut driver = builtin_driver(instant());
    let outcome = SpinOutcome::default().with_stops(vec![vec!["K".to_string(); 3]; 4]);
    assert!(driver.play_spin(&outcome).is_err());
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_driver_from_yaml_file() {
    let yaml = r#"
timing: turbo
grid:
  reels: 3
  rows: 4
  fill_symbol: "L1"
reel_stop_order: [2, 1, 0]
modules:
  trigger_reveal:
    enabled: false
  symbol_replace:
    order: 5
    params:
      play_effect: true
"#;
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = PipelineConfig::load(file.path()).unwrap();
    assert_eq!(config.timing, TimingProfile::Turbo);
    assert_eq!(config.reel_order(), vec![2, 1, 0]);

    let mut driver = builtin_driver(config);
    assert!(!driver.dispatcher().registry().has(&"trigger_reveal".into()));

    let report = driver
        .play_spin(&SpinOutcome::with_mutations(json!([
            {"type": "cell_replace", "reel": 2, "position": 3, "symbol": "WD"},
        ])))
        .unwrap();
    let reels: Vec<usize> = report
        .phases
        .iter()
        .filter(|r| r.phase == Phase::SpecificReelStop)
        .filter_map(|r| r.args.reel)
        .collect();
    assert_eq!(reels, vec![2, 1, 0]);

    let change = driver.spin().with_grid(|grid| grid.changes()[0].clone());
    assert_eq!(change.from, "L1");
    assert!(change.play_effect);
}

#[test]
fn test_invalid_module_params_reject_the_driver() {
    let config = instant().with_module(
        "meters",
        ModuleConfig::new().with_param("seed", json!({"grand": -5.0})),
    );
    assert!(SpinDriver::with_builtins(config, Services::default()).is_err());
}
