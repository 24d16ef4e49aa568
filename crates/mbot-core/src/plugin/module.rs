//! Module handles and module sources.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use linkme::distributed_slice;
use tracing::debug;

use super::entry::EntryPoint;
use crate::error::{LoadError, LoadResult};

/// A loaded module.
///
/// Handles are never unloaded; the loader keeps them for the whole process.
pub trait Module: Send + Sync {
    /// Module name.
    fn name(&self) -> &str;

    /// Resolves an exported entry point by name.
    fn lookup(&self, symbol: &str) -> Option<EntryPoint>;

    /// Names of all exports, for diagnostics. Modules decide what to
    /// report; the loader never inspects them any other way.
    fn symbols(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared handle to a loaded module.
pub type ModuleHandle = Arc<dyn Module>;

/// Resolves module references to handles.
pub trait ModuleSource: Send + Sync {
    /// Opens the module at `path` (`<plugins_directory>/<reference>`).
    fn open(&self, path: &Path) -> LoadResult<ModuleHandle>;
}

// ─── StaticModule ─────────────────────────────────────────────────────────────

/// A module assembled in Rust from a table of exports.
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: String,
    exports: HashMap<String, EntryPoint>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: HashMap::new(),
        }
    }

    /// Exports `entry` under `symbol`, replacing any previous export.
    pub fn export(mut self, symbol: impl Into<String>, entry: EntryPoint) -> Self {
        self.exports.insert(symbol.into(), entry);
        self
    }
}

impl Module for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<EntryPoint> {
        self.exports.get(symbol).cloned()
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.exports.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

// ─── Link-time registry ───────────────────────────────────────────────────────

/// Static description of a module linked into the binary.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    /// Name the module is referenced by.
    pub name: &'static str,
    /// Builds a fresh module instance.
    pub create: fn() -> StaticModule,
}

/// Every module registered with [`register_module!`](crate::register_module).
#[distributed_slice]
pub static MODULES: [ModuleDescriptor];

// ─── ModuleCatalog ────────────────────────────────────────────────────────────

/// [`ModuleSource`] resolving references by name.
///
/// The file stem of the reference is the module name, so `plugins/weather.so`
/// and `plugins/weather` both resolve module `weather`. The directory only
/// has to exist in the reference, not on disk.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    factories: HashMap<String, Arc<dyn Fn() -> ModuleHandle + Send + Sync>>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog of every module linked into the binary.
    pub fn linked() -> Self {
        MODULES.iter().fold(Self::new(), |catalog, desc| {
            let create = desc.create;
            catalog.with_factory(desc.name, move || Arc::new(create()) as ModuleHandle)
        })
    }

    /// Adds a module under `name`; every open returns the same instance.
    pub fn with_module(self, name: impl Into<String>, module: impl Module + 'static) -> Self {
        let handle: ModuleHandle = Arc::new(module);
        self.with_factory(name, move || Arc::clone(&handle))
    }

    /// Adds a module built on each open.
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ModuleHandle + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Names of all known modules, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModuleSource for ModuleCatalog {
    fn open(&self, path: &Path) -> LoadResult<ModuleHandle> {
        let open_error = |reason: String| LoadError::Open {
            module: path.display().to_string(),
            reason,
        };

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| open_error("reference has no module name".to_string()))?;

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| open_error(format!("no module named '{name}' is available")))?;

        debug!(module = %name, path = %path.display(), "Module opened");
        Ok(factory())
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::EntryShape;

    fn sample() -> StaticModule {
        StaticModule::new("sample")
            .export("SetChannels", EntryPoint::set_channels(|_, _, _| {}))
            .export("Help", EntryPoint::help(|_, _, _| async { Ok(()) }))
    }

    #[test]
    fn test_static_module_lookup() {
        let module = sample();
        assert_eq!(
            module.lookup("Help").map(|e| e.shape()),
            Some(EntryShape::Help)
        );
        assert!(module.lookup("Missing").is_none());
        assert_eq!(module.symbols(), vec!["Help", "SetChannels"]);
    }

    #[test]
    fn test_catalog_resolves_file_stem() {
        let catalog = ModuleCatalog::new().with_module("sample", sample());
        for reference in ["plugins/sample.so", "plugins/sample", "sample"] {
            let handle = catalog.open(Path::new(reference)).unwrap();
            assert_eq!(handle.name(), "sample");
        }
    }

    #[test]
    fn test_catalog_unknown_module() {
        let catalog = ModuleCatalog::new().with_module("sample", sample());
        let err = catalog
            .open(Path::new("plugins/broken.so"))
            .err()
            .expect("unknown module must fail");
        assert!(matches!(err, LoadError::Open { .. }));
        assert!(err.to_string().contains("broken"));
    }
}
