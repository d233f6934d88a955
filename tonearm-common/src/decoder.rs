//! Decoder capability interface
//!
//! A decoder turns a media file into interleaved f32 frames. Decoders are
//! shared (`Arc<dyn Decoder>`) between the registry and any number of open
//! streams; per-stream state lives in the [`StreamHandle`] the decoder hands
//! out, and is given back through [`Decoder::close_stream`].

use crate::error::Result;
use std::any::Any;
use std::path::Path;

/// Format of an open stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamInfo {
    /// Sample rate in Hz (0 = unknown)
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Total frames in the stream (0 = unknown)
    pub total_samples: u64,
    pub duration_ms: u64,
}

impl StreamInfo {
    /// Convert a frame count to milliseconds, 0 when the rate is unknown
    pub fn frames_to_ms(&self, frames: u64) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        scale(frames, 1000, self.sample_rate as u64)
    }

    /// Convert milliseconds to a frame count, 0 when the rate is unknown
    pub fn ms_to_frames(&self, ms: u64) -> u64 {
        scale(ms, self.sample_rate as u64, 1000)
    }
}

/// `value * num / den` without intermediate overflow, saturating at `u64::MAX`
fn scale(value: u64, num: u64, den: u64) -> u64 {
    let scaled = value as u128 * num as u128 / den as u128;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Ownership token for one open stream.
///
/// Only the decoder that created the handle knows what is inside it.
/// Dropping a handle without passing it to `close_stream` leaks whatever
/// the decoder keeps outside the handle, so owners close explicitly.
pub struct StreamHandle {
    inner: Box<dyn Any + Send>,
}

impl StreamHandle {
    pub fn new<T: Any + Send>(state: T) -> Self {
        Self {
            inner: Box::new(state),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut::<T>()
    }

    /// Recover the decoder's state, consuming the token
    pub fn into_inner<T: Any>(self) -> std::result::Result<Box<T>, Self> {
        self.inner.downcast::<T>().map_err(|inner| Self { inner })
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Decoder capability
pub trait Decoder: Send + Sync {
    /// Human-readable decoder name, used in logs
    fn name(&self) -> &str;

    fn open_stream(&self, path: &Path) -> Result<StreamHandle>;

    fn get_stream_info(&self, handle: &StreamHandle) -> Result<StreamInfo>;

    /// Decode up to `buffer.len() / channels` frames of interleaved f32.
    ///
    /// Returns the number of frames written; 0 means end of stream.
    /// Called from the real-time delivery thread: implementations must not
    /// block on locks held by control operations.
    fn decode_block(&self, handle: &mut StreamHandle, buffer: &mut [f32]) -> Result<usize>;

    /// Seek to `position_ms`; returns the position actually reached, in ms
    fn seek(&self, handle: &mut StreamHandle, position_ms: u64) -> Result<u64>;

    fn close_stream(&self, handle: StreamHandle);
}
