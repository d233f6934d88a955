//! # tonearm playback core
//!
//! Gapless playback engine and plugin host for the tonearm audio player.
//!
//! **Purpose:** Load decoder modules at runtime, expose them through a
//! capability registry, and play tracks back to back through a pair of
//! decoder slots spliced inside the audio callback.
//!
//! **Architecture:** [`PluginHost`] owns the loaded modules and publishes
//! their capabilities in a shared [`CapabilityRegistry`]; the
//! [`PlaybackEngine`] pulls decoders out of the registry (see
//! [`resolve_decoder`]) and renders through any [`AudioOutput`].

pub mod audio;
pub mod config;
pub mod logging;
pub mod playback;
pub mod plugin_host;

pub use audio::NullOutput;
pub use config::{LoggingConfig, PlaybackConfig, TomlConfig};
pub use logging::init_logging;
pub use playback::{resolve_decoder, PlaybackEngine, PlaybackState, TrackDescriptor};
pub use plugin_host::{PluginHost, PluginModule, PluginState, ScanReport};

pub use tonearm_common::{AudioOutput, CapabilityRegistry, Error, ErrorCode, Result};
