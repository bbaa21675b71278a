//! Diagnostics: the observability sink for recovered errors

use std::cell::RefCell;
use std::rc::Rc;

use rf_phase::Phase;
use serde::{Deserialize, Serialize};

use crate::module::ModuleId;

/// What was recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A wire mutation was skipped at parse time
    MalformedMutation,
    /// A mutation named a cell with no matching symbol
    MissingAnimationTarget,
    /// A module's `run` faulted or panicked
    ModuleFault,
    /// A module's `wants` panicked; the module was skipped for the phase
    PredicateFault,
}

impl DiagnosticKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MalformedMutation => "Malformed mutation",
            Self::MissingAnimationTarget => "Missing animation target",
            Self::ModuleFault => "Module fault",
            Self::PredicateFault => "Predicate fault",
        }
    }
}

/// One recovered error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleId>,
    pub message: String,
    /// Virtual time (ms)
    pub at_ms: u64,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, at_ms: u64) -> Self {
        Self {
            kind,
            phase: None,
            module: None,
            message: message.into(),
            at_ms,
        }
    }

    /// Builder: attach the phase
    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Builder: attach the module
    pub fn from_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }
}

/// Shared, append-only diagnostics sink
///
/// Every push is also logged at `warn` level.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    records: Rc<RefCell<Vec<Diagnostic>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        log::warn!(
            "{} [phase: {}, module: {}]: {}",
            diagnostic.kind.display_name(),
            diagnostic.phase.map_or("-", |p| p.type_name()),
            diagnostic.module.as_ref().map_or("-", ModuleId::as_str),
            diagnostic.message
        );
        self.records.borrow_mut().push(diagnostic);
    }

    pub fn all(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<Diagnostic> {
        self.records
            .borrow()
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Remove and return every record
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_filter() {
        let diagnostics = Diagnostics::new();
        let shared = diagnostics.clone();

        shared.push(
            Diagnostic::new(DiagnosticKind::ModuleFault, "boom", 40)
                .in_phase(Phase::ReelsStoppedCallback)
                .from_module(ModuleId::new("banner")),
        );
        diagnostics.push(Diagnostic::new(DiagnosticKind::MalformedMutation, "no reel", 0));

        assert_eq!(diagnostics.len(), 2);
        let faults = diagnostics.of_kind(DiagnosticKind::ModuleFault);
        assert_eq!(faults[0].module, Some(ModuleId::new("banner")));

        assert_eq!(diagnostics.drain().len(), 2);
        assert!(shared.is_empty());
    }
}
