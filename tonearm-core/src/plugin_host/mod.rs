//! Plugin host
//!
//! Discovers module files on disk, loads them, checks their declared
//! minimum host version and identity, and drives initialize/shutdown across
//! every loaded module. Capabilities the modules expose are published in the
//! shared [`CapabilityRegistry`].
//!
//! All methods run on the control thread; nothing here is touched by the
//! real-time delivery path.

pub mod loader;
pub mod module;

pub use loader::{is_module_file, ModuleHandle, ModuleLoader, NativeLoader};
pub use module::{PluginModule, PluginState};

use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tonearm_common::{
    CapabilityRegistry, Error, Plugin, PluginInfo, Result, ServiceDescriptor, ServiceId, Version,
    HOST_API_VERSION,
};
use tracing::{debug, error, info, warn};

/// Outcome of a directory scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Identities loaded, in load order
    pub loaded: Vec<String>,
    /// Files that failed to load, with the reason
    pub failed: Vec<(PathBuf, Error)>,
}

/// Loads and owns plugin modules
pub struct PluginHost {
    registry: Arc<CapabilityRegistry>,
    loader: Box<dyn ModuleLoader>,
    host_version: Version,
    /// Load order
    modules: Vec<PluginModule>,
    /// identity -> position in `modules`
    index: HashMap<String, usize>,
}

impl PluginHost {
    /// Host loading native dynamic libraries
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self::with_loader(registry, Box::new(NativeLoader))
    }

    pub fn with_loader(registry: Arc<CapabilityRegistry>, loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            registry,
            loader,
            host_version: HOST_API_VERSION,
            modules: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Override the API version modules are checked against
    pub fn with_host_version(mut self, version: Version) -> Self {
        self.host_version = version;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn host_version(&self) -> Version {
        self.host_version
    }

    /// Load every module file in `dir`.
    ///
    /// Files are tried in name order. A file that fails to load is logged
    /// and recorded in the report; it does not stop the scan.
    pub fn scan_directory(&mut self, dir: &Path) -> Result<ScanReport> {
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::FileNotFound(format!("{}: {}", dir.display(), e)))?;

        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| is_module_file(path))
            .collect();
        candidates.sort();

        debug!("Found {} module candidates in {}", candidates.len(), dir.display());

        let mut report = ScanReport::default();
        for path in candidates {
            match self.load_plugin(&path) {
                Ok(identity) => report.loaded.push(identity),
                Err(e) => {
                    warn!("Skipping plugin {}: {}", path.display(), e);
                    report.failed.push((path, e));
                }
            }
        }

        info!(
            "Scanned {}: {} loaded, {} failed",
            dir.display(),
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Load one module. Returns its identity.
    ///
    /// Rejected modules (incompatible version, duplicate identity) are
    /// destroyed and released before this returns.
    pub fn load_plugin(&mut self, path: &Path) -> Result<String> {
        let handle = self.loader.open(path)?;

        let plugin = match handle.create_instance() {
            Ok(plugin) => plugin,
            Err(e) => {
                release_handle(handle);
                return Err(e);
            }
        };

        let info = plugin.info().clone();

        if !info.min_host_version.is_satisfied_by(self.host_version) {
            warn!(
                "Plugin {} requires host {} but this host provides {}",
                path.display(),
                info.min_host_version,
                self.host_version
            );
            discard(handle, plugin);
            return Err(Error::NotSupported(format!(
                "{} requires host API {}, host provides {}",
                info.identity, info.min_host_version, self.host_version
            )));
        }

        if self.index.contains_key(&info.identity) {
            warn!("Plugin with duplicate identity: {}", info.identity);
            discard(handle, plugin);
            return Err(Error::AlreadyInitialized(format!(
                "plugin identity {} already loaded",
                info.identity
            )));
        }

        let capabilities = self.publish_capabilities(&*plugin, &info.identity);

        let position = self.modules.len();
        self.modules.push(PluginModule::new(handle, plugin, capabilities));
        self.index.insert(info.identity.clone(), position);

        info!(
            "Loaded plugin: {} v{} ({})",
            info.name, info.version, info.identity
        );
        Ok(info.identity)
    }

    /// Register the capabilities a freshly loaded module exposes.
    /// Conflicting ids are logged and skipped.
    fn publish_capabilities(&self, plugin: &dyn Plugin, identity: &str) -> Vec<ServiceId> {
        let mut published = Vec::new();
        for exposed in plugin.capabilities() {
            let id = exposed.id;
            let descriptor = ServiceDescriptor::new(id, exposed.name, exposed.capability)
                .owned_by(identity);
            match self.registry.register(descriptor) {
                Ok(()) => published.push(id),
                Err(e) => warn!("Plugin {} capability {} not registered: {}", identity, id, e),
            }
        }
        published
    }

    /// Shut down and unload one module.
    ///
    /// The module's code is unmapped on return, so every decoder stream the
    /// engine opened through it must be closed first. Capabilities still
    /// referenced outside the registry are logged.
    pub fn unload_plugin(&mut self, identity: &str) -> Result<()> {
        let position = *self
            .index
            .get(identity)
            .ok_or_else(|| Error::InvalidParameter(format!("no plugin with identity {}", identity)))?;

        let mut module = self.modules.remove(position);
        if let Err(e) = module.shutdown() {
            warn!("Plugin {} shutdown failed: {}", identity, e);
        }
        let removed = self.retire_services(identity);
        if let Err(e) = module.release() {
            warn!("Plugin {} release failed: {}", identity, e);
        }

        self.rebuild_index();
        info!("Unloaded plugin {} ({} services removed)", identity, removed);
        Ok(())
    }

    /// Initialize modules in load order, stopping at the first failure.
    ///
    /// Modules that are already initialized are skipped, so calling this
    /// again after a failure resumes with the module that failed.
    pub fn initialize_plugins(&mut self) -> Result<()> {
        for module in &mut self.modules {
            if module.state() == PluginState::Initialized {
                continue;
            }
            if let Err(e) = module.initialize(&self.registry) {
                error!("Failed to initialize plugin {}: {}", module.info().name, e);
                return Err(e);
            }
            info!("Initialized plugin: {}", module.info().name);
        }
        Ok(())
    }

    /// Shut down and unload every module in reverse load order.
    ///
    /// Errors and panics from individual modules are logged and ignored;
    /// afterwards no module is loaded.
    pub fn shutdown_plugins(&mut self) {
        if self.modules.is_empty() {
            return;
        }
        info!("Shutting down {} plugins", self.modules.len());

        while let Some(mut module) = self.modules.pop() {
            let identity = module.identity().to_string();

            match panic::catch_unwind(AssertUnwindSafe(|| module.shutdown())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Plugin {} shutdown failed: {}", identity, e),
                Err(_) => error!("Plugin {} panicked during shutdown", identity),
            }

            self.retire_services(&identity);

            match panic::catch_unwind(AssertUnwindSafe(|| module.release())) {
                Ok(Ok(())) => debug!("Released plugin {}", identity),
                Ok(Err(e)) => warn!("Plugin {} release failed: {}", identity, e),
                Err(_) => error!("Plugin {} panicked during release", identity),
            }
        }

        self.modules.clear();
        self.index.clear();
    }

    /// Drop the registry entries owned by `identity`, warning about any
    /// capability that is still held elsewhere
    fn retire_services(&self, identity: &str) -> usize {
        let retired = self.registry.take_owned_by(identity);
        for descriptor in &retired {
            let outside = descriptor.capability.holders().saturating_sub(1);
            if outside > 0 {
                warn!(
                    "Plugin {} service '{}' ({}) still has {} outside references at unload",
                    identity, descriptor.name, descriptor.id, outside
                );
            }
        }
        retired.len()
    }

    /// Scan `dir`, then initialize everything loaded
    pub fn load_plugins(&mut self, dir: &Path) -> Result<ScanReport> {
        info!("Loading plugins from: {}", dir.display());
        let report = self.scan_directory(dir)?;
        self.initialize_plugins()?;
        Ok(report)
    }

    /// The exposed instance of module `identity`
    pub fn get_plugin(&self, identity: &str) -> Option<&dyn Plugin> {
        self.module(identity).and_then(|m| m.plugin())
    }

    pub fn module(&self, identity: &str) -> Option<&PluginModule> {
        self.index.get(identity).map(|&i| &self.modules[i])
    }

    pub fn plugin_info(&self, identity: &str) -> Option<&PluginInfo> {
        self.module(identity).map(|m| m.info())
    }

    pub fn plugin_state(&self, identity: &str) -> Option<PluginState> {
        self.module(identity).map(|m| m.state())
    }

    /// Loaded modules in load order
    pub fn modules(&self) -> &[PluginModule] {
        &self.modules
    }

    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.modules.iter().map(|m| m.info().clone()).collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.modules.len()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.identity().to_string(), i))
            .collect();
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.shutdown_plugins();
    }
}

fn release_handle(handle: Box<dyn ModuleHandle>) {
    let path = handle.path().to_path_buf();
    if let Err(e) = handle.release() {
        warn!("Failed to release module {}: {}", path.display(), e);
    }
}

/// Destroy a rejected instance and release its module
fn discard(handle: Box<dyn ModuleHandle>, plugin: Box<dyn Plugin>) {
    handle.destroy_instance(plugin);
    release_handle(handle);
}
