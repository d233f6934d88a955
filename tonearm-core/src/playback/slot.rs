//! Decoder slots
//!
//! A slot holds one open decoder stream plus its playback cursor. The engine
//! owns exactly two of them and alternates between them for gapless
//! handoffs. Slots own the stream handle only; the decoder itself is shared.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tonearm_common::{Decoder, Error, Result, StreamHandle, StreamInfo};
use tracing::{debug, warn};

/// Frames decoded per step while discarding encoder delay
const SKIP_CHUNK_FRAMES: usize = 1024;

/// What to play, plus its gapless trim information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub path: PathBuf,
    /// Filled in from the stream info when the track is opened
    pub total_samples: u64,
    /// Frames to skip at the head
    pub encoder_delay: u64,
    /// Frames to skip at the tail
    pub encoder_padding: u64,
}

impl TrackDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_encoder_trim(mut self, delay: u64, padding: u64) -> Self {
        self.encoder_delay = delay;
        self.encoder_padding = padding;
        self
    }
}

/// One decoder stream and its cursor.
///
/// `handle` is `Some` exactly while a stream is open.
#[derive(Default)]
pub(crate) struct DecoderSlot {
    decoder: Option<Arc<dyn Decoder>>,
    handle: Option<StreamHandle>,
    info: StreamInfo,
    track: TrackDescriptor,
    position: u64,
    active: bool,
    eos: bool,
}

impl DecoderSlot {
    /// Close whatever is open, then open `track` with `decoder`.
    ///
    /// Decoder errors are returned unchanged; the slot is left closed.
    pub(crate) fn open(&mut self, mut track: TrackDescriptor, decoder: Arc<dyn Decoder>) -> Result<()> {
        self.close();

        let mut handle = decoder.open_stream(&track.path)?;
        let info = match decoder.get_stream_info(&handle) {
            Ok(info) => info,
            Err(e) => {
                decoder.close_stream(handle);
                return Err(e);
            }
        };

        track.total_samples = info.total_samples;
        if track.encoder_delay > 0 {
            skip_frames(decoder.as_ref(), &mut handle, &info, track.encoder_delay, &mut self.position);
        }

        debug!(
            "Opened {} with {}: {} Hz, {} ch, {} frames",
            track.path.display(),
            decoder.name(),
            info.sample_rate,
            info.channels,
            info.total_samples
        );

        self.decoder = Some(decoder);
        self.handle = Some(handle);
        self.info = info;
        self.track = track;
        self.active = false;
        self.eos = false;
        Ok(())
    }

    /// Close the stream (if any) and reset the slot
    pub(crate) fn close(&mut self) {
        if let (Some(decoder), Some(handle)) = (self.decoder.as_ref(), self.handle.take()) {
            decoder.close_stream(handle);
        }
        *self = DecoderSlot::default();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn is_eos(&self) -> bool {
        self.eos
    }

    pub(crate) fn info(&self) -> StreamInfo {
        self.info
    }

    pub(crate) fn track(&self) -> &TrackDescriptor {
        &self.track
    }

    pub(crate) fn path(&self) -> &Path {
        &self.track.path
    }

    pub(crate) fn channels(&self) -> usize {
        self.info.channels.max(1) as usize
    }

    pub(crate) fn position_ms(&self) -> u64 {
        self.info.frames_to_ms(self.position)
    }

    pub(crate) fn duration_ms(&self) -> u64 {
        self.info.frames_to_ms(self.track.total_samples)
    }

    /// Last playable frame boundary; None when the length is unknown
    fn effective_end(&self) -> Option<u64> {
        if self.track.total_samples == 0 {
            return None;
        }
        Some(self.track.total_samples.saturating_sub(self.track.encoder_padding))
    }

    /// Playback time left, None when rate or length is unknown
    pub(crate) fn remaining_ms(&self) -> Option<u64> {
        if self.info.sample_rate == 0 || self.track.total_samples == 0 {
            return None;
        }
        let remaining = self.track.total_samples.saturating_sub(self.position);
        Some(self.info.frames_to_ms(remaining))
    }

    /// Decode up to `frames` frames into `buffer`. Real-time path.
    ///
    /// Short decoder blocks are retried until the request is met, so a
    /// short return means the slot has ended. Never fails: a decoder error
    /// or an empty read marks the slot as ended. Reads are capped at the
    /// effective end so tail padding is never emitted.
    pub(crate) fn decode(&mut self, buffer: &mut [f32], frames: usize) -> usize {
        if !self.active || self.eos {
            return 0;
        }
        let channels = self.channels();
        let effective_end = self.effective_end();
        let (decoder, handle) = match (self.decoder.as_ref(), self.handle.as_mut()) {
            (Some(decoder), Some(handle)) => (decoder, handle),
            _ => return 0,
        };

        let mut frames = frames.min(buffer.len() / channels);
        if let Some(end) = effective_end {
            let remaining = end.saturating_sub(self.position);
            if remaining == 0 {
                self.eos = true;
                return 0;
            }
            frames = frames.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }
        if frames == 0 {
            return 0;
        }

        let mut decoded = 0;
        while decoded < frames {
            match decoder.decode_block(handle, &mut buffer[decoded * channels..frames * channels]) {
                Ok(0) | Err(_) => {
                    self.eos = true;
                    break;
                }
                Ok(n) => decoded += n.min(frames - decoded),
            }
        }

        self.position += decoded as u64;
        if effective_end.map_or(false, |end| self.position >= end) {
            self.eos = true;
        }
        decoded
    }

    /// Seek the stream; the cursor follows the position the decoder reports
    pub(crate) fn seek(&mut self, position_ms: u64) -> Result<()> {
        let (decoder, handle) = match (self.decoder.as_ref(), self.handle.as_mut()) {
            (Some(decoder), Some(handle)) => (decoder, handle),
            _ => return Err(Error::InvalidState("no stream open".to_string())),
        };
        let actual_ms = decoder.seek(handle, position_ms)?;
        self.position = self.info.ms_to_frames(actual_ms);
        self.eos = false;
        Ok(())
    }

    /// Deactivate and move the cursor back to the start
    pub(crate) fn rewind(&mut self) {
        self.active = false;
        self.position = 0;
        self.eos = false;
        if let (Some(decoder), Some(handle)) = (self.decoder.as_ref(), self.handle.as_mut()) {
            if let Err(e) = decoder.seek(handle, 0) {
                warn!("Rewind of {} failed: {}", self.track.path.display(), e);
            }
        }
    }
}

/// Decode and discard `frames` frames (encoder delay). Control thread only.
fn skip_frames(
    decoder: &dyn Decoder,
    handle: &mut StreamHandle,
    info: &StreamInfo,
    frames: u64,
    position: &mut u64,
) {
    let channels = info.channels.max(1) as usize;
    let mut scratch = vec![0.0f32; SKIP_CHUNK_FRAMES * channels];
    let mut left = frames;
    while left > 0 {
        let chunk = left.min(SKIP_CHUNK_FRAMES as u64) as usize;
        match decoder.decode_block(handle, &mut scratch[..chunk * channels]) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let n = n.min(chunk);
                *position += n as u64;
                left -= n as u64;
            }
        }
    }
}
