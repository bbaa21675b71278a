//! PhaseArgs: Per-dispatch data that accompanies a phase

use serde::{Deserialize, Serialize};

/// Arguments passed with a phase dispatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseArgs {
    /// Reel index for per-reel phases (0-indexed, left to right)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reel: Option<usize>,

    /// Reevaluation index for the reevaluation family (0-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reevaluation: Option<u32>,

    /// New wager for `WagerChange`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wager: Option<f64>,
}

impl PhaseArgs {
    /// No arguments
    pub fn none() -> Self {
        Self::default()
    }

    /// Arguments for a per-reel phase
    pub fn reel(reel: usize) -> Self {
        Self {
            reel: Some(reel),
            ..Default::default()
        }
    }

    /// Arguments for a reevaluation phase
    pub fn reevaluation(index: u32) -> Self {
        Self {
            reevaluation: Some(index),
            ..Default::default()
        }
    }

    /// Arguments for a wager change
    pub fn wager(wager: f64) -> Self {
        Self {
            wager: Some(wager),
            ..Default::default()
        }
    }

    /// Builder: mark as belonging to a reevaluation
    pub fn in_reevaluation(mut self, index: u32) -> Self {
        self.reevaluation = Some(index);
        self
    }

    /// Does this dispatch target the given reel?
    pub fn targets_reel(&self, reel: usize) -> bool {
        self.reel == Some(reel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let args = PhaseArgs::reel(3).in_reevaluation(1);
        assert_eq!(args.reel, Some(3));
        assert_eq!(args.reevaluation, Some(1));
        assert!(args.targets_reel(3));
        assert!(!args.targets_reel(2));
        assert_eq!(PhaseArgs::wager(2.5).wager, Some(2.5));
    }

    #[test]
    fn test_empty_fields_skipped() {
        let json = serde_json::to_string(&PhaseArgs::reel(1)).unwrap();
        assert_eq!(json, r#"{"reel":1}"#);
    }
}
