//! Test helper modules for tonearm-core integration tests
//!
//! - fake_decoder: in-memory decoder producing a constant per track
//! - fake_module: in-process plugin modules and the loader that "opens" them
//!
//! Playback tests use `tonearm_core::NullOutput` as the device.

#![allow(dead_code)]

pub mod fake_decoder;
pub mod fake_module;

pub use fake_decoder::{DecoderCounters, FakeDecoder};
pub use fake_module::{FakeLoader, ModuleCounters, ModuleRecipe, ShutdownBehavior};
