//! Wire parsing for mutation batches
//!
//! Accepted shapes: a JSON array of mutation objects, or an object with a
//! `mutations` array. Each object needs a `type` discriminator:
//!
//! | `type` | Required fields (aliases) |
//! |--------|---------------------------|
//! | `cell_replace` | `reel` (`reel_index`), `position` (`pos`), `symbol` (`replace_symbol`, `new_symbol`) |
//! | `multi_cell_replace` | `reel`, `positions` (`pos`, `position`), `symbol` |
//! | `trigger_reveal` | `trigger` (`trigger_pos`), `affected` (`affected_cells`) |
//! | `reel_lock` | `reel` |
//! | `meter_event` | `key`, `kind` (`increase`/`reset`/`win`), `amount` (`credits`) unless `reset` |
//! | `free_spin_award` (`free_spins`) | `count` (`free_spins`, `spins`) |
//!
//! A bad element becomes a `MalformedMutation` and is skipped; the rest of
//! the batch is kept. A cell listed twice in one mutation is malformed. Unknown extra fields are ignored.

use serde_json::Value;

use crate::batch::{BatchOrigin, MutationBatch};
use crate::error::{BoardError, BoardResult};
use crate::mutation::Mutation;

/// Result of parsing one raw batch
#[derive(Debug, Clone)]
pub struct ParseReport {
    /// The valid mutations, wire indices preserved in their ids
    pub batch: MutationBatch,
    /// One `MalformedMutation` per skipped element
    pub errors: Vec<BoardError>,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a raw batch
///
/// Fails only when the container itself is unusable; element errors are
/// collected in the report.
pub fn parse(raw: &Value, origin: BatchOrigin) -> BoardResult<ParseReport> {
    let elements = match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("mutations") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => &[],
            Some(other) => {
                return Err(BoardError::MalformedBatch(format!(
                    "'mutations' must be an array, got {}",
                    json_kind(other)
                )));
            }
        },
        Value::Null => &[],
        other => {
            return Err(BoardError::MalformedBatch(format!(
                "expected array or object, got {}",
                json_kind(other)
            )));
        }
    };

    let mut batch = MutationBatch::new(origin);
    let mut errors = Vec::new();

    for (index, element) in elements.iter().enumerate() {
        match parse_one(index, element) {
            Ok(mutation) => batch.push_at(index, mutation),
            Err(err) => {
                log::warn!("Skipping mutation in {} batch: {}", origin, err);
                errors.push(err);
            }
        }
    }

    log::debug!(
        "Parsed {} batch: {} mutation(s), {} skipped",
        origin,
        batch.len(),
        errors.len()
    );
    Ok(ParseReport { batch, errors })
}

/// Parse a raw batch from JSON text
pub fn parse_str(raw: &str, origin: BatchOrigin) -> BoardResult<ParseReport> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| BoardError::MalformedBatch(format!("invalid JSON: {e}")))?;
    parse(&value, origin)
}

/// Parse a single wire object
pub fn parse_one(index: usize, raw: &Value) -> BoardResult<Mutation> {
    let type_name = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string();
    let malformed = |reason: String| BoardError::MalformedMutation {
        index,
        type_name: type_name.clone(),
        reason,
    };

    if !raw.is_object() {
        return Err(malformed(format!("expected object, got {}", json_kind(raw))));
    }

    let mutation: Mutation =
        serde_json::from_value(raw.clone()).map_err(|e| malformed(e.to_string()))?;
    mutation.validate().map_err(malformed)?;
    Ok(mutation)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellPos;
    use crate::mutation::{MeterKind, MutationKind};
    use serde_json::json;

    #[test]
    fn test_parse_all_kinds() {
        let raw = json!([
            {"type": "cell_replace", "reel": 0, "pos": 1, "replace_symbol": "WD"},
            {"type": "multi_cell_replace", "reel_index": 2, "positions": [0, 2], "symbol": "WD"},
            {"type": "trigger_reveal", "trigger": {"reel": 1, "pos": 1},
             "affected_cells": [{"reel": 3, "position": 0}], "symbol": "MYS"},
            {"type": "reel_lock", "reel": 4},
            {"type": "meter_event", "key": "mini", "kind": "win", "credits": 25.0},
            {"type": "free_spins", "free_spins": 8}
        ]);

        let report = parse(&raw, BatchOrigin::Spin).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.batch.len(), 6);

        let first = &report.batch.entries()[0].mutation;
        assert_eq!(
            *first,
            Mutation::CellReplace {
                reel: 0,
                position: 1,
                layer: 0,
                symbol: "WD".into()
            }
        );

        let reveal = report.batch.query(MutationKind::TriggerReveal);
        assert_eq!(reveal.len(), 1);
        if let Mutation::TriggerReveal { trigger, affected, .. } = &reveal[0].mutation {
            assert_eq!(*trigger, CellPos::new(1, 1));
            assert_eq!(affected, &vec![CellPos::new(3, 0)]);
        }

        let meter = report.batch.query(MutationKind::MeterEvent);
        assert!(matches!(
            meter[0].mutation,
            Mutation::MeterEvent { kind: MeterKind::Win, amount: Some(amount), .. } if amount == 25.0
        ));
        assert_eq!(report.batch.query(MutationKind::FreeSpinAward).len(), 1);
    }

    #[test]
    fn test_missing_reel_is_malformed() {
        let raw = json!([
            {"type": "cell_replace", "pos": 0, "symbol": "WD"},
            {"type": "cell_replace", "reel": 2, "pos": 1, "symbol": "WD"}
        ]);

        let report = parse(&raw, BatchOrigin::Spin).unwrap();
        assert_eq!(report.batch.len(), 1);
        assert_eq!(report.errors.len(), 1);
        match &report.errors[0] {
            BoardError::MalformedMutation {
                index,
                type_name,
                reason,
            } => {
                assert_eq!(*index, 0);
                assert_eq!(type_name, "cell_replace");
                assert!(reason.contains("reel"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Wire index survives in the id
        assert_eq!(report.batch.entries()[0].id.index, 1);
    }

    #[test]
    fn test_unknown_type_and_bad_values() {
        let raw = json!({"mutations": [
            {"type": "banner_expand", "reel": 0},
            {"reel": 0, "pos": 0, "symbol": "WD"},
            {"type": "cell_replace", "reel": -1, "pos": 0, "symbol": "WD"},
            {"type": "cell_replace", "reel": 0, "pos": 0, "symbol": null},
            {"type": "multi_cell_replace", "reel": 0, "positions": [], "symbol": "WD"},
            "cell_replace"
        ]});

        let report = parse(&raw, BatchOrigin::Reevaluation(0)).unwrap();
        assert!(report.batch.is_empty());
        assert_eq!(report.errors.len(), 6);
        assert!(report.errors.iter().all(BoardError::is_recoverable));
    }

    #[test]
    fn test_meter_win_without_amount_is_malformed() {
        let raw = json!([
            {"type": "meter_event", "key": "grand", "kind": "win"},
            {"type": "meter_event", "key": "mini", "kind": "increase"},
            {"type": "meter_event", "key": "major", "kind": "reset"}
        ]);

        let report = parse(&raw, BatchOrigin::Spin).unwrap();
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(
            &report.errors[0],
            BoardError::MalformedMutation { index: 0, reason, .. } if reason.contains("amount")
        ));
        assert_eq!(report.batch.len(), 1);
        assert_eq!(report.batch.entries()[0].id.index, 2);
    }

    #[test]
    fn test_repeated_cell_is_malformed() {
        let raw = json!([
            {"type": "multi_cell_replace", "reel": 1, "positions": [1, 1], "symbol": "WD"},
            {"type": "trigger_reveal", "trigger_pos": {"reel": 0, "pos": 0},
             "affected_cells": [{"reel": 2, "pos": 1}, {"reel": 2, "pos": 1}], "symbol": "WD"},
            {"type": "multi_cell_replace", "reel": 1, "positions": [0, 2], "symbol": "WD"}
        ]);

        let report = parse(&raw, BatchOrigin::Spin).unwrap();
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|err| matches!(
            err,
            BoardError::MalformedMutation { reason, .. } if reason.contains("duplicate")
        )));
        assert_eq!(report.batch.len(), 1);
    }

    #[test]
    fn test_container_errors() {
        assert!(parse(&json!("nope"), BatchOrigin::Spin).is_err());
        assert!(parse(&json!({"mutations": 3}), BatchOrigin::Spin).is_err());
        assert!(parse(&json!({}), BatchOrigin::Spin).unwrap().batch.is_empty());
        assert!(parse_str("[", BatchOrigin::Spin).is_err());
    }
}
