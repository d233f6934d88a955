//! Audio output capability interface
//!
//! Backends are callback-driven: once started they invoke the
//! [`RenderCallback`] from their own real-time thread, once per hardware
//! buffer period, and play whatever it writes.

use crate::error::Result;
use std::sync::Arc;

/// Sample format requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    I16,
    I32,
    #[default]
    F32,
}

/// Pull-based sample source invoked by the audio backend.
///
/// `output` holds at least `frame_count * channels` interleaved samples.
/// Implementations must return within one buffer period and never block.
pub trait RenderCallback: Send + Sync {
    fn render(&self, output: &mut [f32], frame_count: usize);
}

/// Device configuration passed to [`AudioOutput::open`]
#[derive(Clone)]
pub struct OutputConfig {
    /// Device name (None = default device)
    pub device_id: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    /// Frames per callback
    pub buffer_frames: u32,
    pub callback: Arc<dyn RenderCallback>,
}

impl std::fmt::Debug for OutputConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputConfig")
            .field("device_id", &self.device_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("sample_format", &self.sample_format)
            .field("buffer_frames", &self.buffer_frames)
            .finish_non_exhaustive()
    }
}

/// Audio output capability
pub trait AudioOutput: Send {
    fn open(&mut self, config: OutputConfig) -> Result<()>;

    /// Begin invoking the render callback
    fn start(&mut self) -> Result<()>;

    /// Stop invoking the render callback; the device stays open.
    ///
    /// When this returns no callback may still be running.
    fn stop(&mut self) -> Result<()>;

    /// Release the device and drop the render callback
    fn close(&mut self);

    /// Master volume in [0.0, 1.0]
    fn set_volume(&mut self, level: f32);
}
