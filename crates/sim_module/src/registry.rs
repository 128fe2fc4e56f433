//! The module registry.
//!
//! Owns the set of loaded modules for one container. Registration of a
//! single factory proceeds in a fixed order:
//!
//! 1. Build a placeholder [`ModuleContext`] and call `factory.create`.
//! 2. Collect the module's declared components (flag + list).
//! 3. Register permissioned components with the permission registry.
//! 4. Compute permission claims over every loaded module's declarations.
//! 5. Issue the capability token (superuser only for the built-in
//!    entity-management module).
//! 6. Install the final [`ScopedStore`] into the context.
//! 7. Publish the module's exports for sibling discovery.
//!
//! After each registration every *other* module's token is refreshed so
//! existing modules gain access to the newcomer's READ/WRITE components.
//! Downstream caches (system list, command resolver, snapshot plan) key off
//! [`generation`](ModuleRegistry::generation) and rebuild when it moves.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use sim_ecs::{ComponentDef, ComponentId, ComponentKind, PermissionLevel, SharedStore, SimError};
use sim_token::{ComponentGrant, TokenService};

use crate::abi::{CommandSpec, EngineSystem, ExportRegistry, ModuleContext, ModuleFactory};
use crate::builtin::ENTITY_MANAGER_MODULE;
use crate::loader::ArchiveLoader;
use crate::permission::PermissionRegistry;
use crate::scoped::ScopedStore;

/// A registered module and everything extracted from it.
pub struct LoadedModule {
    /// Module name, unique within the container.
    pub name: String,
    /// Module version string.
    pub version: String,
    /// The module's flag component, if it declares one.
    pub flag: Option<ComponentDef>,
    /// Declared components.
    pub components: Vec<ComponentDef>,
    /// The module's systems, in declaration order.
    pub systems: Vec<Arc<Mutex<Box<dyn EngineSystem>>>>,
    /// The module's command descriptors.
    pub commands: Vec<Arc<CommandSpec>>,
    /// The module's scoped context (token holder).
    pub context: Arc<ModuleContext>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("systems", &self.systems.len())
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

struct RegistryInner {
    permissions: PermissionRegistry,
    builtins: Vec<Arc<dyn ModuleFactory>>,
    // Modules before the loader: loaded modules reference code inside the
    // loader's libraries and must drop first.
    modules: Vec<Arc<LoadedModule>>,
    index: HashMap<String, usize>,
    commands: HashMap<String, Arc<CommandSpec>>,
    loader: ArchiveLoader,
}

/// Registry of the modules loaded into one container.
pub struct ModuleRegistry {
    store: SharedStore,
    tokens: Arc<TokenService>,
    exports: ExportRegistry,
    scan_dir: PathBuf,
    inner: RwLock<RegistryInner>,
    generation: AtomicU64,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("scan_dir", &self.scan_dir)
            .field("module_count", &self.module_count())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl ModuleRegistry {
    /// Create a registry pointed at a scan directory.
    #[must_use]
    pub fn new(
        store: SharedStore,
        tokens: Arc<TokenService>,
        exports: ExportRegistry,
        scan_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            tokens,
            exports,
            scan_dir: scan_dir.into(),
            inner: RwLock::new(RegistryInner {
                permissions: PermissionRegistry::new(),
                builtins: Vec::new(),
                modules: Vec::new(),
                index: HashMap::new(),
                commands: HashMap::new(),
                loader: ArchiveLoader::new(),
            }),
            generation: AtomicU64::new(1),
        }
    }

    /// The configured scan directory.
    #[must_use]
    pub fn scan_dir(&self) -> &Path {
        &self.scan_dir
    }

    /// Monotonic counter bumped on every registry mutation. Downstream
    /// caches compare against it instead of subscribing to events.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of loaded modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.inner.read().modules.len()
    }

    /// Register a factory that does not come from an archive (built-ins,
    /// tests). The factory is retained and re-instantiated on every rescan.
    pub fn register_builtin(&self, factory: Arc<dyn ModuleFactory>) -> Result<String, SimError> {
        let mut inner = self.inner.write();
        inner.builtins.push(factory.clone());
        self.install_factory(&mut inner, factory.as_ref())
    }

    /// Scan the configured directory and register every factory found.
    /// Returns the number of modules registered.
    pub fn scan(&self) -> Result<usize, SimError> {
        let mut inner = self.inner.write();
        let factories = inner.loader.scan_directory(&self.scan_dir)?;
        let mut registered = 0;
        for factory in &factories {
            match self.install_factory(&mut inner, factory.as_ref()) {
                Ok(name) => {
                    info!(module = name, "module loaded from archive");
                    registered += 1;
                }
                Err(e) => warn!(error = %e, "module factory failed to register"),
            }
        }
        Ok(registered)
    }

    /// Copy an archive into the scan directory without (re)loading anything.
    /// Used at container start before the initial scan.
    pub fn stage_archive(&self, path: &Path) -> Result<PathBuf, SimError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| SimError::InvalidRequest(format!("bad archive path {}", path.display())))?;
        std::fs::create_dir_all(&self.scan_dir).map_err(|e| {
            SimError::InvalidRequest(format!("cannot create {}: {e}", self.scan_dir.display()))
        })?;
        let dest = self.scan_dir.join(file_name);
        std::fs::copy(path, &dest).map_err(|e| {
            SimError::InvalidRequest(format!("cannot copy {}: {e}", path.display()))
        })?;
        Ok(dest)
    }

    /// Install an archive at runtime: copy it into the scan directory, drop
    /// every cache, and rescan.
    pub fn install_archive(&self, path: &Path) -> Result<(), SimError> {
        self.stage_archive(path)?;
        self.reset()?;
        self.scan()?;
        Ok(())
    }

    /// Remove a module from the registry.
    ///
    /// In-memory only: the archive file stays on disk, so the module
    /// reappears on the next full rescan unless the file is removed
    /// out-of-band.
    pub fn uninstall(&self, name: &str) -> Result<(), SimError> {
        let mut inner = self.inner.write();
        let pos = inner
            .index
            .remove(name)
            .ok_or_else(|| SimError::NotFound(format!("module '{name}'")))?;
        inner.modules.remove(pos);
        // Reindex everything after the removed slot.
        let reindexed: HashMap<String, usize> = inner
            .modules
            .iter()
            .enumerate()
            .map(|(i, module)| (module.name.clone(), i))
            .collect();
        inner.index = reindexed;
        inner.commands.retain(|_, cmd| cmd.module_name != name);
        self.exports.unregister(name);
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(module = name, "module uninstalled (archive left on disk)");
        Ok(())
    }

    /// Drop every loaded module and cache, then re-register the built-in
    /// factories. The scan directory is untouched.
    pub fn reset(&self) -> Result<(), SimError> {
        let mut inner = self.inner.write();
        inner.modules.clear();
        inner.index.clear();
        inner.commands.clear();
        inner.permissions.clear();
        inner.loader.unload_all();
        self.exports.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);

        let builtins: Vec<_> = inner.builtins.clone();
        for factory in builtins {
            self.install_factory(&mut inner, factory.as_ref())?;
        }
        Ok(())
    }

    /// The loaded module set, in declaration order.
    #[must_use]
    pub fn resolve_all(&self) -> Vec<Arc<LoadedModule>> {
        self.inner.read().modules.clone()
    }

    /// Look up one module by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Arc<LoadedModule>> {
        let inner = self.inner.read();
        inner.index.get(name).map(|&i| inner.modules[i].clone())
    }

    /// Look up a command by its globally unique name.
    #[must_use]
    pub fn command(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.inner.read().commands.get(name).cloned()
    }

    /// Grants over every declared component of every loaded module.
    ///
    /// Permissioned components carry the level and owner recorded in the
    /// permission registry; flag and value components are open (`WRITE`);
    /// core components are ungated and never appear in claims.
    fn all_claims(inner: &RegistryInner) -> BTreeMap<ComponentId, ComponentGrant> {
        let mut claims = BTreeMap::new();
        for module in &inner.modules {
            for def in module.flag.iter().chain(module.components.iter()) {
                let grant = match def.kind {
                    ComponentKind::Permissioned(declared) => ComponentGrant {
                        level: inner.permissions.level_of(def.id).unwrap_or(declared),
                        owner_module: inner
                            .permissions
                            .owner_of(def.id)
                            .unwrap_or(&module.name)
                            .to_string(),
                    },
                    ComponentKind::Flag | ComponentKind::Value => ComponentGrant {
                        level: PermissionLevel::Write,
                        owner_module: module.name.clone(),
                    },
                    ComponentKind::Core => continue,
                };
                claims.insert(def.id, grant);
            }
        }
        claims
    }

    /// Run the full registration sequence for one factory.
    fn install_factory(
        &self,
        inner: &mut RegistryInner,
        factory: &dyn ModuleFactory,
    ) -> Result<String, SimError> {
        let ctx = ModuleContext::placeholder(self.exports.clone());
        let module = factory.create(ctx.clone());

        let name = module.name().to_string();
        let version = module.version().to_string();
        let flag = module.flag_component();
        let components = module.components();

        for def in flag.iter().chain(components.iter()) {
            if def.permission_level().is_some() {
                inner.permissions.register(&name, def);
            }
        }

        let systems: Vec<_> = module
            .systems()
            .into_iter()
            .map(|s| Arc::new(Mutex::new(s)))
            .collect();
        let commands: Vec<Arc<CommandSpec>> = module.commands().into_iter().map(Arc::new).collect();
        let exports = module.exports();

        let loaded = Arc::new(LoadedModule {
            name: name.clone(),
            version,
            flag,
            components,
            systems,
            commands: commands.clone(),
            context: ctx.clone(),
        });

        if let Some(&pos) = inner.index.get(&name) {
            warn!(module = name, "duplicate module name, replacing earlier registration");
            inner.modules[pos] = loaded;
        } else {
            inner.index.insert(name.clone(), inner.modules.len());
            inner.modules.push(loaded);
        }

        let claims = Self::all_claims(inner);
        let token = if name == ENTITY_MANAGER_MODULE {
            self.tokens.issue_superuser(&name, claims.clone())
        } else {
            self.tokens.issue(&name, claims.clone())
        };
        ctx.install_store(ScopedStore::new(
            self.store.clone(),
            Arc::new(token),
            self.tokens.clone(),
        ));

        self.exports.register(&name, exports);

        for cmd in commands {
            if inner.commands.contains_key(&cmd.name) {
                warn!(
                    command = cmd.name,
                    module = name,
                    "duplicate command name, overwriting earlier registration"
                );
            }
            inner.commands.insert(cmd.name.clone(), cmd);
        }

        // Re-authorise every other module so it sees the newcomer's
        // READ/WRITE components. Superuser status survives the refresh.
        for other in &inner.modules {
            if other.name == name {
                continue;
            }
            let Ok(store) = other.context.store() else {
                continue;
            };
            match self.tokens.refresh(store.token(), claims.clone()) {
                Ok(refreshed) => other.context.install_store(ScopedStore::new(
                    self.store.clone(),
                    Arc::new(refreshed),
                    self.tokens.clone(),
                )),
                Err(e) => warn!(module = other.name, error = %e, "token refresh failed"),
            }
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(module = name, "module registered");
        Ok(name)
    }
}
