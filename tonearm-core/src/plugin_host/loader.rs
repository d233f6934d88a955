//! Module loading
//!
//! [`ModuleLoader`] opens a module file and returns a [`ModuleHandle`], the
//! explicit ownership token for the loaded library. The host never touches
//! the library except through the handle, and releases it exactly once.
//!
//! [`NativeLoader`] is the real implementation on top of `libloading`.

use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use tonearm_common::plugin::{
    CreatePluginFn, DestroyPluginFn, PluginObject, CREATE_PLUGIN_SYMBOL, DESTROY_PLUGIN_SYMBOL,
};
use tonearm_common::{Error, Plugin, Result};
use tracing::debug;

/// A loaded module
pub trait ModuleHandle: Send {
    fn path(&self) -> &Path;

    /// Resolve the creation entry point and instantiate the module
    fn create_instance(&self) -> Result<Box<dyn Plugin>>;

    /// Pass the instance to the destruction entry point.
    ///
    /// Returns false when the module exports none; the instance is then
    /// dropped by the host while the library is still loaded.
    fn destroy_instance(&self, plugin: Box<dyn Plugin>) -> bool;

    /// Unload the module. Consumes the handle so it cannot be released twice.
    fn release(self: Box<Self>) -> Result<()>;
}

/// Opens module files
pub trait ModuleLoader: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleHandle>>;
}

/// Whether `path` has the platform's dynamic library extension
pub fn is_module_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(std::env::consts::DLL_EXTENSION))
        .unwrap_or(false)
}

/// Loads modules as native dynamic libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleHandle>> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }

        // SAFETY: loading a module runs its initializers; modules are trusted
        // by the ABI contract documented in tonearm_common::plugin.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            Error::Internal(format!("failed to load module {}: {}", path.display(), e))
        })?;

        debug!("Opened module library {}", path.display());
        Ok(Box::new(NativeModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

struct NativeModule {
    path: PathBuf,
    library: Library,
}

impl ModuleHandle for NativeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_instance(&self) -> Result<Box<dyn Plugin>> {
        // SAFETY: symbol type matches the module ABI.
        let create: Symbol<CreatePluginFn> = unsafe { self.library.get(CREATE_PLUGIN_SYMBOL) }
            .map_err(|e| {
                Error::Internal(format!(
                    "module {} has no create_plugin entry point: {}",
                    self.path.display(),
                    e
                ))
            })?;

        // SAFETY: entry point is trusted by ABI contract; null checked below.
        let raw = unsafe { create() };
        if raw.is_null() {
            return Err(Error::Internal(format!(
                "module {} returned no plugin instance",
                self.path.display()
            )));
        }

        // SAFETY: non-null pointer produced by create_plugin, ownership moves to us.
        let object = unsafe { Box::from_raw(raw) };
        Ok(object.into_plugin())
    }

    fn destroy_instance(&self, plugin: Box<dyn Plugin>) -> bool {
        // SAFETY: symbol type matches the module ABI.
        let destroy: Symbol<DestroyPluginFn> =
            match unsafe { self.library.get(DESTROY_PLUGIN_SYMBOL) } {
                Ok(symbol) => symbol,
                Err(_) => {
                    drop(plugin);
                    return false;
                }
            };

        let raw = Box::into_raw(Box::new(PluginObject::new(plugin)));
        // SAFETY: raw is a live PluginObject that is not used after this call.
        unsafe { destroy(raw) };
        true
    }

    fn release(self: Box<Self>) -> Result<()> {
        let NativeModule { path, library } = *self;
        library.close().map_err(|e| {
            Error::Internal(format!("failed to unload module {}: {}", path.display(), e))
        })?;
        debug!("Released module library {}", path.display());
        Ok(())
    }
}
