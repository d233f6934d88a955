//! A loaded plugin module and its lifecycle

use super::loader::ModuleHandle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tonearm_common::{CapabilityRegistry, Error, Plugin, PluginInfo, Result, ServiceId};
use tracing::warn;

/// Lifecycle state of a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Loaded and validated, not yet initialized
    Loaded,
    Initialized,
    /// Initialization returned an error
    Failed,
    ShutDown,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Loaded => write!(f, "loaded"),
            PluginState::Initialized => write!(f, "initialized"),
            PluginState::Failed => write!(f, "failed"),
            PluginState::ShutDown => write!(f, "shut down"),
        }
    }
}

/// A module that passed version and identity checks.
///
/// Owns both the plugin instance and the module handle. The instance is
/// destroyed before the handle is released, and each happens at most once;
/// dropping a module that was never released releases it.
pub struct PluginModule {
    path: PathBuf,
    info: PluginInfo,
    capabilities: Vec<ServiceId>,
    state: PluginState,
    loaded_at: DateTime<Utc>,
    plugin: Option<Box<dyn Plugin>>,
    handle: Option<Box<dyn ModuleHandle>>,
}

impl PluginModule {
    pub(super) fn new(
        handle: Box<dyn ModuleHandle>,
        plugin: Box<dyn Plugin>,
        capabilities: Vec<ServiceId>,
    ) -> Self {
        Self {
            path: handle.path().to_path_buf(),
            info: plugin.info().clone(),
            capabilities,
            state: PluginState::Loaded,
            loaded_at: Utc::now(),
            plugin: Some(plugin),
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn identity(&self) -> &str {
        &self.info.identity
    }

    /// Capabilities registered on load
    pub fn capabilities(&self) -> &[ServiceId] {
        &self.capabilities
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// The module's exposed instance (None once released)
    pub fn plugin(&self) -> Option<&dyn Plugin> {
        self.plugin.as_deref()
    }

    pub(super) fn initialize(&mut self, registry: &CapabilityRegistry) -> Result<()> {
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| Error::InvalidState(format!("{} already released", self.info.identity)))?;

        let scoped = registry.scoped(&self.info.identity);
        match plugin.initialize(&scoped) {
            Ok(()) => {
                self.state = PluginState::Initialized;
                Ok(())
            }
            Err(e) => {
                self.state = PluginState::Failed;
                Err(e)
            }
        }
    }

    pub(super) fn shutdown(&mut self) -> Result<()> {
        let plugin = match self.plugin.as_mut() {
            Some(plugin) => plugin,
            None => return Ok(()),
        };
        let result = plugin.shutdown();
        self.state = PluginState::ShutDown;
        result
    }

    /// Destroy the instance, then release the module handle
    pub(super) fn release(&mut self) -> Result<()> {
        if let (Some(plugin), Some(handle)) = (self.plugin.take(), self.handle.as_ref()) {
            handle.destroy_instance(plugin);
        }
        match self.handle.take() {
            Some(handle) => handle.release(),
            None => Ok(()),
        }
    }
}

impl Drop for PluginModule {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.release() {
                warn!("Releasing plugin {} on drop failed: {}", self.info.identity, e);
            }
        }
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("path", &self.path)
            .field("identity", &self.info.identity)
            .field("version", &self.info.version)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
