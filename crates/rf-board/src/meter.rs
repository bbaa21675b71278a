//! MeterBank: jackpot and progressive meters keyed by name

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mutation::MeterKind;

/// Result of one meter event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterUpdate {
    pub key: String,
    pub kind: MeterKind,
    pub before: f64,
    pub after: f64,
    /// Amount to pass to the credit sink (non-zero only for `Win`)
    pub credited: f64,
}

/// Named meters; values persist across spins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterBank {
    meters: BTreeMap<String, f64>,
}

impl MeterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed a meter
    pub fn with_meter(mut self, key: impl Into<String>, value: f64) -> Self {
        self.meters.insert(key.into(), value);
        self
    }

    /// Overwrite a meter (session seeding)
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.meters.insert(key.into(), value);
    }

    pub fn value(&self, key: &str) -> f64 {
        self.meters.get(key).copied().unwrap_or(0.0)
    }

    /// Apply a server meter event
    ///
    /// `Increase` adds, `Reset` zeroes, `Win` credits the server-declared
    /// amount and zeroes the meter. No payout is computed here.
    pub fn apply(&mut self, key: &str, kind: MeterKind, amount: f64) -> MeterUpdate {
        let meter = self.meters.entry(key.to_string()).or_insert(0.0);
        let before = *meter;
        let credited = match kind {
            MeterKind::Increase => {
                *meter += amount;
                0.0
            }
            MeterKind::Reset => {
                *meter = 0.0;
                0.0
            }
            MeterKind::Win => {
                *meter = 0.0;
                amount
            }
        };
        log::debug!("Meter '{}' {}: {} -> {}", key, kind.type_name(), before, *meter);
        MeterUpdate {
            key: key.to_string(),
            kind,
            before,
            after: *meter,
            credited,
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.meters.clone()
    }
}
