//! Phase trace: what ran in each phase, for logs and tests

use chrono::{DateTime, Utc};
use rf_phase::{Phase, PhaseArgs, PhaseExecution};
use rf_task::{Task, TaskState};
use serde::{Deserialize, Serialize};

use crate::module::ModuleId;

/// One module's part in a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRunRecord {
    pub module: ModuleId,
    /// Task state when the record was last refreshed
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_ms: Option<u64>,
}

impl ModuleRunRecord {
    pub(crate) fn from_task(module: ModuleId, task: &Task) -> Self {
        Self {
            module,
            state: task.state(),
            fault: task.fault(),
            started_ms: task.started_ms(),
            finished_ms: task.finished_ms(),
        }
    }
}

/// One phase dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub args: PhaseArgs,
    pub execution: PhaseExecution,
    /// Virtual time the dispatch started
    pub started_ms: u64,
    /// Virtual time the driver moved on (advisory: immediately)
    pub finished_ms: u64,
    pub modules: Vec<ModuleRunRecord>,
    /// Listeners whose `wants` declined or panicked
    pub skipped: Vec<ModuleId>,
    /// Wall-clock time of the dispatch
    pub recorded_at: DateTime<Utc>,
}

impl PhaseRecord {
    pub fn module_state(&self, module: &str) -> Option<TaskState> {
        self.modules
            .iter()
            .find(|record| record.module.as_str() == module)
            .map(|record| record.state)
    }
}

/// Ordered record of every phase dispatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTrace {
    pub records: Vec<PhaseRecord>,
}

impl PhaseTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PhaseRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Refresh a module record after its task moved on
    pub(crate) fn update(&mut self, index: usize, module: &ModuleId, task: &Task) {
        let Some(record) = self.records.get_mut(index) else {
            return;
        };
        if let Some(entry) = record.modules.iter_mut().find(|m| &m.module == module) {
            *entry = ModuleRunRecord::from_task(module.clone(), task);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Phases in dispatch order
    pub fn phases(&self) -> Vec<Phase> {
        self.records.iter().map(|record| record.phase).collect()
    }

    pub fn of_phase(&self, phase: Phase) -> Vec<&PhaseRecord> {
        self.records.iter().filter(|r| r.phase == phase).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_task::Scheduler;

    #[test]
    fn test_update_refreshes_state() {
        let scheduler = Scheduler::new();
        let task = scheduler.spawn("banner", |cx| async move {
            cx.delay(100).await?;
            Ok(())
        });
        let module = ModuleId::new("banner");

        let mut trace = PhaseTrace::new();
        let index = trace.push(PhaseRecord {
            phase: Phase::WagerChange,
            args: PhaseArgs::wager(2.0),
            execution: PhaseExecution::Advisory,
            started_ms: 0,
            finished_ms: 0,
            modules: vec![ModuleRunRecord::from_task(module.clone(), &task)],
            skipped: Vec::new(),
            recorded_at: Utc::now(),
        });
        assert_eq!(trace.records[0].module_state("banner"), Some(TaskState::Pending));

        scheduler.run_to_quiescence().unwrap();
        trace.update(index, &module, &task);

        let record = &trace.records[0];
        assert_eq!(record.module_state("banner"), Some(TaskState::Completed));
        assert_eq!(record.modules[0].finished_ms, Some(100));
        assert_eq!(trace.phases(), vec![Phase::WagerChange]);
        assert!(trace.to_json().unwrap().contains("wager_change"));
    }
}
