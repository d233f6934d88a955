//! Plugin module interface and export ABI
//!
//! A module is a `cdylib` linked against this crate. It exports a creation
//! entry point and, optionally, a destruction entry point:
//!
//! ```text
//! extern "C" fn create_plugin() -> *mut PluginObject
//! extern "C" fn destroy_plugin(*mut PluginObject)
//! ```
//!
//! [`declare_plugin!`](crate::declare_plugin) generates both. The objects
//! behind the pointer are Rust trait objects, so host and module must be
//! built with the same toolchain and the same `tonearm-common` version, and
//! share the global allocator.

use crate::error::Result;
use crate::registry::{Capability, ScopedRegistry, ServiceId};
use crate::version::Version;
use serde::{Deserialize, Serialize};

/// Symbol name of the creation entry point
pub const CREATE_PLUGIN_SYMBOL: &[u8] = b"create_plugin";

/// Symbol name of the (optional) destruction entry point
pub const DESTROY_PLUGIN_SYMBOL: &[u8] = b"destroy_plugin";

pub type CreatePluginFn = unsafe extern "C" fn() -> *mut PluginObject;
pub type DestroyPluginFn = unsafe extern "C" fn(*mut PluginObject);

/// Descriptor every module reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: Version,
    /// Oldest host API this module runs against
    pub min_host_version: Version,
    /// Unique identity, e.g. reverse-domain or a UUID string
    pub identity: String,
}

/// Capability a module exposes as soon as it is loaded
pub struct ExposedCapability {
    pub id: ServiceId,
    pub name: String,
    pub capability: Capability,
}

impl ExposedCapability {
    pub fn new(id: ServiceId, name: impl Into<String>, capability: Capability) -> Self {
        Self {
            id,
            name: name.into(),
            capability,
        }
    }
}

/// A loaded module instance
pub trait Plugin: Send {
    fn info(&self) -> &PluginInfo;

    /// Capabilities registered by the host right after a successful load
    fn capabilities(&self) -> Vec<ExposedCapability> {
        Vec::new()
    }

    /// Called once, in load order, after every module has been loaded.
    ///
    /// Anything registered through `registry` is removed when the module is
    /// unloaded.
    fn initialize(&mut self, registry: &ScopedRegistry<'_>) -> Result<()>;

    fn shutdown(&mut self) -> Result<()>;
}

/// Thin-pointer wrapper passed across the entry points
pub struct PluginObject {
    plugin: Box<dyn Plugin>,
}

impl PluginObject {
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        Self { plugin }
    }

    pub fn into_plugin(self) -> Box<dyn Plugin> {
        self.plugin
    }
}

/// Export the module entry points for a plugin constructor expression.
///
/// ```ignore
/// tonearm_common::declare_plugin!(MyDecoderPlugin::new());
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($constructor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn create_plugin() -> *mut $crate::plugin::PluginObject {
            let plugin: ::std::boxed::Box<dyn $crate::plugin::Plugin> =
                ::std::boxed::Box::new($constructor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(
                $crate::plugin::PluginObject::new(plugin),
            ))
        }

        /// # Safety
        /// `object` must come from `create_plugin` in this module and not be used afterwards.
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn destroy_plugin(object: *mut $crate::plugin::PluginObject) {
            if !object.is_null() {
                drop(::std::boxed::Box::from_raw(object));
            }
        }
    };
}
