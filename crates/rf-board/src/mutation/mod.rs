//! Mutation: server-declared board changes
//!
//! A mutation is immutable once parsed for the spin. The `type` field is the
//! wire discriminator; see [`parse`] for the accepted field aliases.

mod apply;
mod parse;

pub use apply::*;
pub use parse::*;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::grid::CellPos;

/// How a meter event changes its meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterKind {
    Increase,
    Reset,
    /// Meter pays out; the amount goes to the credit sink
    Win,
}

impl MeterKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Reset => "reset",
            Self::Win => "win",
        }
    }
}

/// A board change declared by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Replace one cell
    CellReplace {
        #[serde(alias = "reel_index")]
        reel: usize,
        #[serde(alias = "pos")]
        position: usize,
        #[serde(default)]
        layer: usize,
        #[serde(alias = "replace_symbol", alias = "new_symbol")]
        symbol: String,
    },

    /// Replace several cells on one reel with the same symbol
    MultiCellReplace {
        #[serde(alias = "reel_index")]
        reel: usize,
        #[serde(alias = "pos", alias = "position")]
        positions: Vec<usize>,
        #[serde(default)]
        layer: usize,
        #[serde(alias = "replace_symbol", alias = "new_symbol")]
        symbol: String,
    },

    /// A trigger cell reveals, then the affected cells transform
    TriggerReveal {
        #[serde(alias = "trigger_pos")]
        trigger: CellPos,
        #[serde(alias = "affected_cells")]
        affected: Vec<CellPos>,
        /// Symbol the affected cells become; `None` for a reveal without a swap
        #[serde(default, alias = "replace_symbol")]
        symbol: Option<String>,
    },

    /// Hold a reel through reevaluations, optionally swapping its symbols
    ReelLock {
        #[serde(alias = "reel_index")]
        reel: usize,
        #[serde(default, alias = "replace_symbol")]
        symbol: Option<String>,
    },

    /// Jackpot/progressive meter change
    ///
    /// `amount` is required for `Increase` and `Win`; a `Reset` may omit it.
    MeterEvent {
        key: String,
        kind: MeterKind,
        #[serde(default, alias = "credits", skip_serializing_if = "Option::is_none")]
        amount: Option<f64>,
    },

    /// Free spins granted by this outcome
    #[serde(alias = "free_spins")]
    FreeSpinAward {
        #[serde(alias = "free_spins", alias = "spins")]
        count: u32,
    },
}

/// Discriminant of [`Mutation`], for typed queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    CellReplace,
    MultiCellReplace,
    TriggerReveal,
    ReelLock,
    MeterEvent,
    FreeSpinAward,
}

impl MutationKind {
    pub const ALL: [MutationKind; 6] = [
        Self::CellReplace,
        Self::MultiCellReplace,
        Self::TriggerReveal,
        Self::ReelLock,
        Self::MeterEvent,
        Self::FreeSpinAward,
    ];

    /// Wire discriminator
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CellReplace => "cell_replace",
            Self::MultiCellReplace => "multi_cell_replace",
            Self::TriggerReveal => "trigger_reveal",
            Self::ReelLock => "reel_lock",
            Self::MeterEvent => "meter_event",
            Self::FreeSpinAward => "free_spin_award",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "cell_replace" => Some(Self::CellReplace),
            "multi_cell_replace" => Some(Self::MultiCellReplace),
            "trigger_reveal" => Some(Self::TriggerReveal),
            "reel_lock" => Some(Self::ReelLock),
            "meter_event" => Some(Self::MeterEvent),
            "free_spin_award" | "free_spins" => Some(Self::FreeSpinAward),
            _ => None,
        }
    }

    /// Does this kind change symbols or locks on the grid?
    pub fn touches_grid(&self) -> bool {
        !matches!(self, Self::MeterEvent | Self::FreeSpinAward)
    }
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::CellReplace { .. } => MutationKind::CellReplace,
            Self::MultiCellReplace { .. } => MutationKind::MultiCellReplace,
            Self::TriggerReveal { .. } => MutationKind::TriggerReveal,
            Self::ReelLock { .. } => MutationKind::ReelLock,
            Self::MeterEvent { .. } => MutationKind::MeterEvent,
            Self::FreeSpinAward { .. } => MutationKind::FreeSpinAward,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    /// Reel used for left-to-right ordering, if the mutation has one
    pub fn primary_reel(&self) -> Option<usize> {
        match self {
            Self::CellReplace { reel, .. }
            | Self::MultiCellReplace { reel, .. }
            | Self::ReelLock { reel, .. } => Some(*reel),
            Self::TriggerReveal { trigger, .. } => Some(trigger.reel),
            Self::MeterEvent { .. } | Self::FreeSpinAward { .. } => None,
        }
    }

    /// Cells whose symbol this mutation replaces, in declaration order
    ///
    /// `ReelLock` with a symbol covers its whole reel, so it needs the row
    /// count.
    pub fn target_cells(&self, rows: usize) -> Vec<CellPos> {
        match self {
            Self::CellReplace {
                reel,
                position,
                layer,
                ..
            } => vec![CellPos::new(*reel, *position).on_layer(*layer)],
            Self::MultiCellReplace {
                reel,
                positions,
                layer,
                ..
            } => positions
                .iter()
                .map(|position| CellPos::new(*reel, *position).on_layer(*layer))
                .collect(),
            Self::TriggerReveal {
                affected,
                symbol: Some(_),
                ..
            } => affected.clone(),
            Self::ReelLock {
                reel,
                symbol: Some(_),
            } => (0..rows).map(|position| CellPos::new(*reel, position)).collect(),
            _ => Vec::new(),
        }
    }

    /// Symbol written to `target_cells`, if any
    pub fn replacement(&self) -> Option<&str> {
        match self {
            Self::CellReplace { symbol, .. } | Self::MultiCellReplace { symbol, .. } => {
                Some(symbol.as_str())
            }
            Self::TriggerReveal { symbol, .. } | Self::ReelLock { symbol, .. } => symbol.as_deref(),
            Self::MeterEvent { .. } | Self::FreeSpinAward { .. } => None,
        }
    }

    /// Semantic checks serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if let Some(symbol) = self.replacement() {
            if symbol.trim().is_empty() {
                return Err("empty symbol name".into());
            }
        }
        match self {
            Self::MultiCellReplace { positions, .. } if positions.is_empty() => {
                Err("no positions".into())
            }
            Self::TriggerReveal { affected, .. } if affected.is_empty() => {
                Err("no affected cells".into())
            }
            Self::MeterEvent { key, .. } if key.trim().is_empty() => Err("empty meter key".into()),
            Self::MeterEvent {
                kind: kind @ (MeterKind::Increase | MeterKind::Win),
                amount: None,
                ..
            } => Err(format!("missing field `amount` for {}", kind.type_name())),
            Self::MeterEvent {
                amount: Some(amount),
                ..
            } if !amount.is_finite() || *amount < 0.0 => Err(format!("invalid amount {amount}")),
            Self::FreeSpinAward { count: 0 } => Err("zero free spins".into()),
            _ => self.check_distinct_cells(),
        }
    }

    /// One logical mutation writes each cell once
    fn check_distinct_cells(&self) -> Result<(), String> {
        let cells = match self {
            Self::MultiCellReplace { reel, positions, layer, .. } => positions
                .iter()
                .map(|position| CellPos::new(*reel, *position).on_layer(*layer))
                .collect(),
            Self::TriggerReveal { affected, .. } => affected.clone(),
            _ => return Ok(()),
        };
        let mut seen = HashSet::new();
        for cell in cells {
            if !seen.insert(cell) {
                return Err(format!(
                    "duplicate cell (reel {}, position {})",
                    cell.reel, cell.position
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_type_names() {
        for kind in MutationKind::ALL {
            assert_eq!(MutationKind::from_type_name(kind.type_name()), Some(kind));
        }
        assert_eq!(
            MutationKind::from_type_name("free_spins"),
            Some(MutationKind::FreeSpinAward)
        );
        assert_eq!(MutationKind::from_type_name("banner"), None);
    }

    #[test]
    fn test_target_cells() {
        let lock = Mutation::ReelLock {
            reel: 3,
            symbol: Some("WD".into()),
        };
        assert_eq!(lock.target_cells(3).len(), 3);
        assert_eq!(lock.primary_reel(), Some(3));

        let bare = Mutation::ReelLock {
            reel: 3,
            symbol: None,
        };
        assert!(bare.target_cells(3).is_empty());

        let multi = Mutation::MultiCellReplace {
            reel: 1,
            positions: vec![2, 0],
            layer: 0,
            symbol: "WD".into(),
        };
        assert_eq!(
            multi.target_cells(3),
            vec![CellPos::new(1, 2), CellPos::new(1, 0)]
        );
    }

    #[test]
    fn test_validate() {
        let empty = Mutation::MultiCellReplace {
            reel: 0,
            positions: vec![],
            layer: 0,
            symbol: "WD".into(),
        };
        assert!(empty.validate().is_err());

        let meter = Mutation::MeterEvent {
            key: "grand".into(),
            kind: MeterKind::Win,
            amount: Some(-1.0),
        };
        assert!(meter.validate().is_err());
        assert!(!meter.kind().touches_grid());
    }

    #[test]
    fn test_validate_meter_amount_by_kind() {
        let meter = |kind, amount| Mutation::MeterEvent {
            key: "grand".into(),
            kind,
            amount,
        };
        assert!(meter(MeterKind::Win, None).validate().is_err());
        assert!(meter(MeterKind::Increase, None).validate().is_err());
        assert!(meter(MeterKind::Reset, None).validate().is_ok());
        assert!(meter(MeterKind::Win, Some(0.0)).validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_cells() {
        let multi = Mutation::MultiCellReplace {
            reel: 1,
            positions: vec![1, 1],
            layer: 0,
            symbol: "WD".into(),
        };
        let err = multi.validate().unwrap_err();
        assert!(err.contains("duplicate"));

        let reveal = Mutation::TriggerReveal {
            trigger: CellPos::new(0, 0),
            affected: vec![CellPos::new(2, 1), CellPos::new(3, 0), CellPos::new(2, 1)],
            symbol: Some("WD".into()),
        };
        assert!(reveal.validate().is_err());

        let layered = Mutation::TriggerReveal {
            trigger: CellPos::new(0, 0),
            affected: vec![CellPos::new(2, 1), CellPos::new(2, 1).on_layer(1)],
            symbol: Some("WD".into()),
        };
        assert!(layered.validate().is_ok());
    }
}
