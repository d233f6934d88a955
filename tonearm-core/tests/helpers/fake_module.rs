//! In-process plugin modules
//!
//! `FakeLoader` maps paths to `ModuleRecipe`s and hands out handles that
//! build plugins from them. Shared `ModuleCounters` record how many handles
//! are still loaded and how many instances were created and destroyed.

use super::fake_decoder::FakeDecoder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tonearm_common::{
    Capability, Error, ExposedCapability, Plugin, PluginInfo, Result, ScopedRegistry, ServiceId,
    Version, HOST_API_VERSION,
};
use tonearm_core::plugin_host::{ModuleHandle, ModuleLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownBehavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Default)]
pub struct ModuleCounters {
    pub live_handles: AtomicUsize,
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub init_order: Mutex<Vec<String>>,
    pub shutdown_order: Mutex<Vec<String>>,
}

impl ModuleCounters {
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn init_order(&self) -> Vec<String> {
        self.init_order.lock().unwrap().clone()
    }

    pub fn shutdown_order(&self) -> Vec<String> {
        self.shutdown_order.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct ModuleRecipe {
    pub identity: String,
    pub version: Version,
    pub min_host_version: Version,
    /// Decoder capabilities exposed on load
    pub decoder_ids: Vec<ServiceId>,
    /// Service registered through the scoped registry during initialize
    pub registers_on_init: Option<ServiceId>,
    pub fail_create: bool,
    pub fail_initialize: bool,
    pub shutdown: ShutdownBehavior,
}

impl ModuleRecipe {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            version: Version::new(1, 0, 0),
            min_host_version: HOST_API_VERSION,
            decoder_ids: Vec::new(),
            registers_on_init: None,
            fail_create: false,
            fail_initialize: false,
            shutdown: ShutdownBehavior::Succeed,
        }
    }

    pub fn requiring(mut self, min_host_version: Version) -> Self {
        self.min_host_version = min_host_version;
        self
    }

    pub fn exposing(mut self, id: ServiceId) -> Self {
        self.decoder_ids.push(id);
        self
    }

    pub fn registering_on_init(mut self, id: ServiceId) -> Self {
        self.registers_on_init = Some(id);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn on_shutdown(mut self, behavior: ShutdownBehavior) -> Self {
        self.shutdown = behavior;
        self
    }
}

#[derive(Default)]
pub struct FakeLoader {
    recipes: HashMap<PathBuf, ModuleRecipe>,
    counters: Arc<ModuleCounters>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, recipe: ModuleRecipe) -> Self {
        self.recipes.insert(path.into(), recipe);
        self
    }

    pub fn counters(&self) -> Arc<ModuleCounters> {
        Arc::clone(&self.counters)
    }
}

impl ModuleLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleHandle>> {
        let recipe = self
            .recipes
            .get(path)
            .cloned()
            .ok_or_else(|| Error::FileNotFound(path.display().to_string()))?;
        self.counters.live_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            path: path.to_path_buf(),
            recipe,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeHandle {
    path: PathBuf,
    recipe: ModuleRecipe,
    counters: Arc<ModuleCounters>,
}

impl ModuleHandle for FakeHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_instance(&self) -> Result<Box<dyn Plugin>> {
        if self.recipe.fail_create {
            return Err(Error::Internal("create_plugin returned null".to_string()));
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePlugin::new(self.recipe.clone(), Arc::clone(&self.counters))))
    }

    fn destroy_instance(&self, plugin: Box<dyn Plugin>) -> bool {
        drop(plugin);
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(self: Box<Self>) -> Result<()> {
        self.counters.live_handles.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePlugin {
    info: PluginInfo,
    recipe: ModuleRecipe,
    counters: Arc<ModuleCounters>,
}

impl FakePlugin {
    fn new(recipe: ModuleRecipe, counters: Arc<ModuleCounters>) -> Self {
        Self {
            info: PluginInfo {
                name: format!("{} plugin", recipe.identity),
                author: "tests".to_string(),
                description: "in-process test module".to_string(),
                version: recipe.version,
                min_host_version: recipe.min_host_version,
                identity: recipe.identity.clone(),
            },
            recipe,
            counters,
        }
    }
}

impl Plugin for FakePlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn capabilities(&self) -> Vec<ExposedCapability> {
        self.recipe
            .decoder_ids
            .iter()
            .map(|&id| {
                let decoder = FakeDecoder::new(1.0, 44100, 2, 44100).shared();
                ExposedCapability::new(id, format!("{} decoder", self.recipe.identity), Capability::Decoder(decoder))
            })
            .collect()
    }

    fn initialize(&mut self, registry: &ScopedRegistry<'_>) -> Result<()> {
        if self.recipe.fail_initialize {
            return Err(Error::Internal(format!("{} refused to initialize", self.recipe.identity)));
        }
        if let Some(id) = self.recipe.registers_on_init {
            registry.register(id, "late service", Capability::Service(Arc::new(42u32)))?;
        }
        self.counters.init_order.lock().unwrap().push(self.recipe.identity.clone());
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.counters
            .shutdown_order
            .lock()
            .unwrap()
            .push(self.recipe.identity.clone());
        match self.recipe.shutdown {
            ShutdownBehavior::Succeed => Ok(()),
            ShutdownBehavior::Fail => Err(Error::Internal("shutdown failed".to_string())),
            ShutdownBehavior::Panic => panic!("{} panicked in shutdown", self.recipe.identity),
        }
    }
}
