//! The stable interfaces plugins implement, and the per-module context they
//! receive.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sim_ecs::{ComponentDef, SimError};

use crate::bench::ModuleBenchmarks;
use crate::scoped::ScopedStore;

/// A command payload: named JSON values keyed by parameter name.
pub type CommandPayload = serde_json::Map<String, serde_json::Value>;

/// Read a required integer parameter from a payload.
pub fn payload_i64(payload: &CommandPayload, key: &str) -> Result<i64, SimError> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| SimError::InvalidRequest(format!("missing integer parameter '{key}'")))
}

/// Read a required float parameter from a payload.
pub fn payload_f32(payload: &CommandPayload, key: &str) -> Result<f32, SimError> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_f64)
        .map(|v| v as f32)
        .ok_or_else(|| SimError::InvalidRequest(format!("missing float parameter '{key}'")))
}

/// Declared type of one command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Integer,
    Float,
    Text,
    Boolean,
}

/// Optional human-facing documentation for one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDoc {
    pub name: String,
    pub description: String,
}

/// A command a module contributes: naming metadata plus the two-field
/// schema/executor record the pipeline executes.
#[derive(Clone)]
pub struct CommandSpec {
    /// Command name, globally unique within a container.
    pub name: String,
    /// The contributing module.
    pub module_name: String,
    /// Parameter name → declared type.
    pub schema: BTreeMap<String, ParamType>,
    /// Documented parameter metadata, when the module provides any.
    pub parameters: Vec<ParamDoc>,
    /// The executor invoked by the command pipeline.
    pub executor: Arc<dyn Fn(&CommandPayload) -> Result<(), SimError> + Send + Sync>,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("module_name", &self.module_name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CommandSpec {
    /// Execute the command against a payload.
    pub fn execute(&self, payload: &CommandPayload) -> Result<(), SimError> {
        (self.executor)(payload)
    }
}

/// A per-tick behaviour contributed by a module.
///
/// Systems run in module-declaration order on the tick worker; an `Err`
/// return is logged and does not abort the tick.
pub trait EngineSystem: Send {
    /// Name of the system, for logs and metrics.
    fn name(&self) -> &str;

    /// Run one tick of this system.
    fn update(&mut self) -> Result<(), SimError>;
}

/// A loadable unit contributing components, systems, commands, and exports.
pub trait EngineModule: Send + Sync {
    /// Human-readable module name, unique within a container.
    fn name(&self) -> &str;

    /// Module version string.
    fn version(&self) -> &str;

    /// The module's flag component, used to mark entities as belonging to it.
    fn flag_component(&self) -> Option<ComponentDef> {
        None
    }

    /// The components this module declares (flavour and permission level).
    fn components(&self) -> Vec<ComponentDef> {
        Vec::new()
    }

    /// Create this module's systems. Called once at registration.
    fn systems(&self) -> Vec<Box<dyn EngineSystem>> {
        Vec::new()
    }

    /// Create this module's command descriptors. Called once at registration.
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Values this module publishes for sibling modules.
    fn exports(&self) -> ModuleExports {
        ModuleExports::default()
    }
}

/// Instantiates a module inside a container. The entrypoint of an archive.
pub trait ModuleFactory: Send + Sync {
    /// Build the module against its scoped context.
    fn create(&self, ctx: Arc<ModuleContext>) -> Box<dyn EngineModule>;
}

/// Typed values a module publishes for sibling modules to consume.
#[derive(Clone, Default)]
pub struct ModuleExports {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ModuleExports {
    /// Publish a value under a name.
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.values.insert(name.into(), value);
    }

    /// Look up a published value, downcast to its concrete type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values.get(name).cloned().and_then(|v| v.downcast().ok())
    }

    /// Number of published values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleExports")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Container-wide directory of every module's exports.
#[derive(Clone, Default)]
pub struct ExportRegistry {
    modules: Arc<DashMap<String, ModuleExports>>,
}

impl ExportRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a module's exports.
    pub fn register(&self, module_name: &str, exports: ModuleExports) {
        self.modules.insert(module_name.to_string(), exports);
    }

    /// Drop a module's exports.
    pub fn unregister(&self, module_name: &str) {
        self.modules.remove(module_name);
    }

    /// Look up one exported value from a sibling module.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, module_name: &str, name: &str) -> Option<Arc<T>> {
        self.modules.get(module_name).and_then(|e| e.get(name))
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.modules.clear();
    }
}

impl std::fmt::Debug for ExportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRegistry")
            .field("module_count", &self.modules.len())
            .finish()
    }
}

/// The scoped context handed to a module factory.
///
/// Built as an empty placeholder before `factory.create` runs; the registry
/// installs the final [`ScopedStore`] once the module's token is issued, and
/// re-installs it whenever the token is refreshed.
pub struct ModuleContext {
    store: RwLock<Option<ScopedStore>>,
    exports: ExportRegistry,
    benchmarks: Arc<ModuleBenchmarks>,
}

impl ModuleContext {
    /// Create a placeholder context with no store wired yet.
    #[must_use]
    pub fn placeholder(exports: ExportRegistry) -> Arc<Self> {
        Arc::new(Self {
            store: RwLock::new(None),
            exports,
            benchmarks: Arc::new(ModuleBenchmarks::default()),
        })
    }

    /// The module's capability-scoped view of the ECS.
    ///
    /// # Errors
    ///
    /// `InvalidState` before the registry has wired the store — i.e. when
    /// called from inside `ModuleFactory::create` itself.
    pub fn store(&self) -> Result<ScopedStore, SimError> {
        self.store
            .read()
            .clone()
            .ok_or_else(|| SimError::InvalidState("module store not wired yet".to_string()))
    }

    /// Install or replace the scoped store. Registry-internal.
    pub(crate) fn install_store(&self, store: ScopedStore) {
        *self.store.write() = Some(store);
    }

    /// The container-wide export directory.
    #[must_use]
    pub fn exports(&self) -> &ExportRegistry {
        &self.exports
    }

    /// This module's benchmark scope sink.
    #[must_use]
    pub fn benchmarks(&self) -> &Arc<ModuleBenchmarks> {
        &self.benchmarks
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("store_wired", &self.store.read().is_some())
            .finish_non_exhaustive()
    }
}
