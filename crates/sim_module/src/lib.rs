//! Module (plugin) layer: the ABI plugins implement, the registry that loads
//! them, and the capability-scoped view each module gets of the shared ECS.
//!
//! A module archive is a cdylib exporting a [`sim_module_factories`] symbol
//! (use [`declare_module!`]). The registry scans a directory for archives,
//! instantiates every factory through a [`ModuleContext`], issues a
//! capability token for the module's declared components, and wires a
//! [`ScopedStore`] into the context. Modules only ever touch the ECS through
//! that scoped view.

mod abi;
mod bench;
mod builtin;
mod loader;
mod permission;
mod registry;
mod scoped;

pub use abi::{
    payload_f32, payload_i64, CommandPayload, CommandSpec, EngineModule, EngineSystem,
    ExportRegistry, ModuleContext, ModuleExports, ModuleFactory, ParamDoc, ParamType,
};
pub use bench::{BenchmarkSample, ModuleBenchmarks, ScopeTimer};
pub use builtin::{EntityManagerFactory, ENTITY_MANAGER_MODULE};
pub use loader::{ArchiveLoader, FactoryListFn, FACTORY_ENTRYPOINT};
pub use permission::PermissionRegistry;
pub use registry::{LoadedModule, ModuleRegistry};
pub use scoped::ScopedStore;
