//! Constant-value decoder
//!
//! Every frame of every channel carries the decoder's `value`, so the track
//! a sample came from is visible in the rendered output.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tonearm_common::{Decoder, Error, Result, StreamHandle, StreamInfo};

#[derive(Debug, Default)]
pub struct DecoderCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub seeks: AtomicUsize,
}

impl DecoderCounters {
    pub fn open_streams(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeDecoder {
    pub value: f32,
    pub sample_rate: u32,
    pub channels: u16,
    pub total_samples: u64,
    pub fail_open: bool,
    pub fail_info: bool,
    /// Decode errors once the cursor reaches this frame
    pub fail_decode_at: Option<u64>,
    pub counters: Arc<DecoderCounters>,
}

struct FakeStream {
    cursor: u64,
}

impl FakeDecoder {
    pub fn new(value: f32, sample_rate: u32, channels: u16, total_samples: u64) -> Self {
        Self {
            value,
            sample_rate,
            channels,
            total_samples,
            fail_open: false,
            fail_info: false,
            fail_decode_at: None,
            counters: Arc::new(DecoderCounters::default()),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new(0.0, 44100, 2, 0)
        }
    }

    pub fn failing_info() -> Self {
        Self {
            fail_info: true,
            ..Self::new(0.0, 44100, 2, 0)
        }
    }

    pub fn failing_decode_at(mut self, frame: u64) -> Self {
        self.fail_decode_at = Some(frame);
        self
    }

    pub fn shared(self) -> Arc<dyn Decoder> {
        Arc::new(self)
    }
}

impl Decoder for FakeDecoder {
    fn name(&self) -> &str {
        "fake"
    }

    fn open_stream(&self, path: &Path) -> Result<StreamHandle> {
        if self.fail_open {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(StreamHandle::new(FakeStream { cursor: 0 }))
    }

    fn get_stream_info(&self, _handle: &StreamHandle) -> Result<StreamInfo> {
        if self.fail_info {
            return Err(Error::Internal("corrupt header".to_string()));
        }
        Ok(StreamInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            total_samples: self.total_samples,
            duration_ms: if self.sample_rate == 0 {
                0
            } else {
                self.total_samples * 1000 / self.sample_rate as u64
            },
        })
    }

    fn decode_block(&self, handle: &mut StreamHandle, buffer: &mut [f32]) -> Result<usize> {
        let stream = handle
            .downcast_mut::<FakeStream>()
            .ok_or_else(|| Error::InvalidParameter("foreign handle".to_string()))?;
        if let Some(at) = self.fail_decode_at {
            if stream.cursor >= at {
                return Err(Error::Internal("decode failure".to_string()));
            }
        }

        let channels = self.channels.max(1) as usize;
        let left = self.total_samples.saturating_sub(stream.cursor) as usize;
        let frames = (buffer.len() / channels).min(left);
        buffer[..frames * channels].fill(self.value);
        stream.cursor += frames as u64;
        Ok(frames)
    }

    fn seek(&self, handle: &mut StreamHandle, position_ms: u64) -> Result<u64> {
        let stream = handle
            .downcast_mut::<FakeStream>()
            .ok_or_else(|| Error::InvalidParameter("foreign handle".to_string()))?;
        self.counters.seeks.fetch_add(1, Ordering::SeqCst);
        let frame = (position_ms * self.sample_rate as u64 / 1000).min(self.total_samples);
        stream.cursor = frame;
        Ok(position_ms)
    }

    fn close_stream(&self, handle: StreamHandle) {
        if handle.into_inner::<FakeStream>().is_ok() {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
