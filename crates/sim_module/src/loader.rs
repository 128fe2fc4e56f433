//! Dynamic module archive loading.
//!
//! A module archive is a cdylib exporting [`FACTORY_ENTRYPOINT`], a function
//! returning the archive's [`ModuleFactory`] set. Each container owns its own
//! loader instance, so two containers never share library handles or module
//! types.
//!
//! The loader keeps every [`libloading::Library`] it opens alive; factories
//! and the modules built from them reference code inside those libraries and
//! must be dropped first.

use std::path::Path;

use tracing::{info, warn};

use sim_ecs::SimError;

use crate::abi::ModuleFactory;

/// Symbol every module archive must export.
pub const FACTORY_ENTRYPOINT: &[u8] = b"sim_module_factories\0";

/// Signature of the entrypoint symbol.
pub type FactoryListFn = unsafe extern "Rust" fn() -> Vec<Box<dyn ModuleFactory>>;

/// Declare a module archive's factories.
///
/// Expands to the exported entrypoint the loader resolves:
///
/// ```ignore
/// declare_module!(MyModuleFactory::default());
/// ```
#[macro_export]
macro_rules! declare_module {
    ($($factory:expr),+ $(,)?) => {
        #[no_mangle]
        pub extern "Rust" fn sim_module_factories() -> Vec<Box<dyn $crate::ModuleFactory>> {
            vec![$(Box::new($factory)),+]
        }
    };
}

/// Loads module archives for one container.
#[derive(Debug, Default)]
pub struct ArchiveLoader {
    libraries: Vec<libloading::Library>,
}

impl ArchiveLoader {
    /// Create a loader with no open archives.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for paths with this platform's dynamic-library extension.
    #[must_use]
    pub fn is_archive(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("so" | "dylib" | "dll")
        )
    }

    /// Load one archive and return its factories.
    pub fn load_archive(&mut self, path: &Path) -> Result<Vec<Box<dyn ModuleFactory>>, SimError> {
        info!(path = %path.display(), "loading module archive");
        // SAFETY: loading a library runs its initialisers; we only load
        // archives from the container's configured scan directory.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            SimError::InvalidRequest(format!("cannot load archive {}: {e}", path.display()))
        })?;
        let factories = {
            // SAFETY: the entrypoint is declared through `declare_module!`,
            // which fixes the symbol's signature to `FactoryListFn`.
            let entrypoint = unsafe { library.get::<FactoryListFn>(FACTORY_ENTRYPOINT) }.map_err(
                |e| {
                    SimError::InvalidRequest(format!(
                        "archive {} has no module entrypoint: {e}",
                        path.display()
                    ))
                },
            )?;
            unsafe { entrypoint() }
        };
        self.libraries.push(library);
        Ok(factories)
    }

    /// Scan a directory and load every archive in it, in filename order.
    ///
    /// A missing directory yields zero factories; an unloadable archive is
    /// logged and skipped.
    pub fn scan_directory(&mut self, dir: &Path) -> Result<Vec<Box<dyn ModuleFactory>>, SimError> {
        let mut factories = Vec::new();
        if !dir.is_dir() {
            return Ok(factories);
        }
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| SimError::InvalidRequest(format!("cannot scan {}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| Self::is_archive(p))
            .collect();
        paths.sort();
        for path in paths {
            match self.load_archive(&path) {
                Ok(loaded) => factories.extend(loaded),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping archive"),
            }
        }
        Ok(factories)
    }

    /// Number of open archives.
    #[must_use]
    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// Close every archive. Callers must have dropped all factories, modules,
    /// and systems that came out of them first.
    pub fn unload_all(&mut self) {
        self.libraries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_extension_filter() {
        assert!(ArchiveLoader::is_archive(Path::new("mods/combat.so")));
        assert!(ArchiveLoader::is_archive(Path::new("mods/combat.dylib")));
        assert!(ArchiveLoader::is_archive(Path::new("mods/combat.dll")));
        assert!(!ArchiveLoader::is_archive(Path::new("mods/combat.jar")));
        assert!(!ArchiveLoader::is_archive(Path::new("mods/readme.md")));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let mut loader = ArchiveLoader::new();
        let factories = loader
            .scan_directory(Path::new("/nonexistent/modules"))
            .unwrap();
        assert!(factories.is_empty());
        assert_eq!(loader.library_count(), 0);
    }

    #[test]
    fn test_non_archive_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let mut loader = ArchiveLoader::new();
        let factories = loader.scan_directory(dir.path()).unwrap();
        assert!(factories.is_empty());
    }

    #[test]
    fn test_bogus_archive_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.so"), b"not a library").unwrap();
        let mut loader = ArchiveLoader::new();
        // scan_directory logs and skips; it must not error out.
        let factories = loader.scan_directory(dir.path()).unwrap();
        assert!(factories.is_empty());
    }
}
