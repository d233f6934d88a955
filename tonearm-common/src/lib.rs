//! # tonearm common library
//!
//! Types shared by the playback host and the plugin modules it loads:
//! - Boundary error codes and the `Error` type
//! - Semantic versions and the host API version
//! - Plugin descriptor, trait and export macro
//! - Decoder and audio-output capability interfaces
//! - The capability registry

pub mod decoder;
pub mod error;
pub mod output;
pub mod plugin;
pub mod registry;
pub mod version;

pub use decoder::{Decoder, StreamHandle, StreamInfo};
pub use error::{Error, ErrorCode, Result};
pub use output::{AudioOutput, OutputConfig, RenderCallback, SampleFormat};
pub use plugin::{ExposedCapability, Plugin, PluginInfo, PluginObject};
pub use registry::{Capability, CapabilityRegistry, ScopedRegistry, ServiceDescriptor, ServiceId};
pub use version::{Version, HOST_API_VERSION};
