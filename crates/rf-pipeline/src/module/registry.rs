//! Module Registry: ordered storage for presentation modules

use std::collections::HashMap;

use rf_phase::Phase;

use super::{BoxedModule, ModuleCategory, ModuleId, ModuleInfo, PresentationModule};
use crate::config::{ConfigError, PipelineConfig};

struct Registered {
    module: BoxedModule,
    order: i32,
    seq: u64,
}

/// Every module the dispatcher may call, in dispatch order
///
/// Modules are ordered by their configured `order`, ties broken by
/// registration order, so dispatch is deterministic.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Registered>,
    by_category: HashMap<ModuleCategory, Vec<ModuleId>>,
    next_seq: u64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module with dispatch order 0
    pub fn register(&mut self, module: BoxedModule) -> Result<(), RegistryError> {
        self.register_ordered(module, 0)
    }

    /// Register a module at an explicit dispatch order
    pub fn register_ordered(&mut self, module: BoxedModule, order: i32) -> Result<(), RegistryError> {
        let id = module.id();
        if self.has(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        self.by_category
            .entry(module.category())
            .or_default()
            .push(id.clone());

        let seq = self.next_seq;
        self.next_seq += 1;
        self.modules.push(Registered { module, order, seq });
        self.modules.sort_by_key(|r| (r.order, r.seq));

        log::debug!("Registered module '{}' (order {})", id, order);
        Ok(())
    }

    /// Configure a module from the pipeline config and register it
    ///
    /// Disabled modules are dropped without error; returns whether the
    /// module was registered.
    pub fn register_configured(
        &mut self,
        mut module: BoxedModule,
        config: &PipelineConfig,
    ) -> Result<bool, RegistryError> {
        let id = module.id();
        if !config.is_enabled(id.as_str()) {
            log::info!("Module '{}' disabled by config", id);
            return Ok(false);
        }
        let module_config = config.module(id.as_str());
        module.configure(&module_config)?;
        self.register_ordered(module, module_config.order)?;
        Ok(true)
    }

    pub fn unregister(&mut self, id: &ModuleId) -> Option<BoxedModule> {
        let index = self.modules.iter().position(|r| &r.module.id() == id)?;
        let removed = self.modules.remove(index);
        if let Some(ids) = self.by_category.get_mut(&removed.module.category()) {
            ids.retain(|i| i != id);
        }
        Some(removed.module)
    }

    pub fn get(&self, id: &ModuleId) -> Option<&dyn PresentationModule> {
        self.modules
            .iter()
            .find(|r| &r.module.id() == id)
            .map(|r| r.module.as_ref())
    }

    pub fn has(&self, id: &ModuleId) -> bool {
        self.modules.iter().any(|r| &r.module.id() == id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module ids in dispatch order
    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|r| r.module.id()).collect()
    }

    pub fn list_all(&self) -> Vec<ModuleInfo> {
        self.modules.iter().map(|r| r.module.info()).collect()
    }

    pub fn list_by_category(&self, category: ModuleCategory) -> Vec<&ModuleId> {
        self.by_category
            .get(&category)
            .map(|ids| ids.iter().collect())
            .unwrap_or_default()
    }

    /// Indices (dispatch order) of modules listening to `phase`
    pub(crate) fn listeners(&self, phase: Phase) -> Vec<usize> {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.module.phases().contains(&phase))
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn module_at(&self, index: usize) -> &dyn PresentationModule {
        self.modules[index].module.as_ref()
    }

    pub(crate) fn module_at_mut(&mut self, index: usize) -> &mut BoxedModule {
        &mut self.modules[index].module
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Module not found: {0}")]
    NotFound(ModuleId),

    #[error("Module already registered: {0}")]
    AlreadyRegistered(ModuleId),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}
