//! Gapless playback engine
//!
//! Two decoder slots, A and B. While the current slot plays, the next track
//! is opened into the other one; when the current stream runs dry inside a
//! device callback, the shortfall is filled from the next slot and the slots
//! switch roles within the same buffer.
//!
//! # Locking
//!
//! Control operations serialize on the control lock and then lock slots.
//! The render callback never blocks: it reads state and slot indices from
//! atomics, takes slots with `try_lock` (a busy slot yields silence for that
//! period), and only takes the control lock with `try_lock` to commit a slot
//! switch. A switch that cannot be committed is retried on the next period.
//! Index and state atomics are only written while the control lock is held.

use super::slot::{DecoderSlot, TrackDescriptor};
use super::state::PlaybackState;
use crate::config::PlaybackConfig;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tonearm_common::{
    AudioOutput, Decoder, Error, OutputConfig, RenderCallback, Result, SampleFormat, StreamInfo,
};
use tracing::{debug, error, info, warn};

/// Marker for "no next slot"
const NO_SLOT: usize = usize::MAX;

/// Slot index other than `index`
fn other(index: usize) -> usize {
    1 - index
}

/// State guarded by the control lock
struct ControlState {
    output: Box<dyn AudioOutput>,
    device_open: bool,
    volume: f32,
}

struct EngineShared {
    control: Mutex<ControlState>,
    slots: [Mutex<DecoderSlot>; 2],
    current: AtomicUsize,
    next: AtomicUsize,
    state: AtomicU8,
    gapless: AtomicBool,
    /// Channel count of the current slot
    channels: AtomicUsize,
    prebuffer_threshold_ms: u64,
    slot_switches: AtomicU64,
}

/// Dual-slot playback engine
pub struct PlaybackEngine {
    shared: Arc<EngineShared>,
    config: PlaybackConfig,
}

/// Render callback handed to the output device
struct EngineRenderer {
    shared: Weak<EngineShared>,
}

impl RenderCallback for EngineRenderer {
    fn render(&self, output: &mut [f32], frame_count: usize) {
        match self.shared.upgrade() {
            Some(shared) => shared.fill_buffer(output, frame_count),
            None => output.fill(0.0),
        }
    }
}

impl PlaybackEngine {
    pub fn new(output: Box<dyn AudioOutput>, config: PlaybackConfig) -> Self {
        let volume = config.initial_volume.clamp(0.0, 1.0);
        let shared = EngineShared {
            control: Mutex::new(ControlState {
                output,
                device_open: false,
                volume,
            }),
            slots: [Mutex::new(DecoderSlot::default()), Mutex::new(DecoderSlot::default())],
            current: AtomicUsize::new(0),
            next: AtomicUsize::new(NO_SLOT),
            state: AtomicU8::new(PlaybackState::Stopped.as_u8()),
            gapless: AtomicBool::new(config.gapless),
            channels: AtomicUsize::new(2),
            prebuffer_threshold_ms: config.prebuffer_threshold_ms,
            slot_switches: AtomicU64::new(0),
        };

        debug!(
            "Playback engine created (gapless: {}, prebuffer: {}ms, buffer: {} frames)",
            config.gapless, config.prebuffer_threshold_ms, config.buffer_frames
        );

        Self {
            shared: Arc::new(shared),
            config,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Open `path` with `decoder` into the current slot
    pub fn load_track(&self, path: &Path, decoder: Arc<dyn Decoder>) -> Result<()> {
        self.load_track_with(TrackDescriptor::new(path), decoder)
    }

    /// Open a track into the current slot, replacing whatever it held.
    ///
    /// The encoder delay is decoded and discarded here; encoder padding is
    /// trimmed during playback.
    pub fn load_track_with(&self, track: TrackDescriptor, decoder: Arc<dyn Decoder>) -> Result<()> {
        let _control = self.shared.lock_control();
        let current = self.shared.current();
        let mut slot = self.shared.lock_slot(current);

        if let Err(e) = slot.open(track, decoder) {
            warn!("Failed to load track into slot {}: {}", current, e);
            return Err(e);
        }
        self.shared.channels.store(slot.channels(), Ordering::Release);
        info!("Loaded {} into slot {}", slot.path().display(), current);
        Ok(())
    }

    /// Open `path` with `decoder` into the slot after the current one
    pub fn prepare_next_track(&self, path: &Path, decoder: Arc<dyn Decoder>) -> Result<()> {
        self.prepare_next_track_with(TrackDescriptor::new(path), decoder)
    }

    /// Open a track into the other slot and mark it as next.
    ///
    /// On failure no next track is set.
    pub fn prepare_next_track_with(&self, track: TrackDescriptor, decoder: Arc<dyn Decoder>) -> Result<()> {
        let _control = self.shared.lock_control();
        let target = other(self.shared.current());

        self.shared.next.store(NO_SLOT, Ordering::Release);
        let mut slot = self.shared.lock_slot(target);
        if let Err(e) = slot.open(track, decoder) {
            warn!("Failed to prepare next track in slot {}: {}", target, e);
            return Err(e);
        }
        self.shared.next.store(target, Ordering::Release);
        info!("Prepared {} in slot {}", slot.path().display(), target);
        Ok(())
    }

    pub fn play(&self) -> Result<()> {
        let mut control = self.shared.lock_control();
        let state = self.shared.state();
        if state == PlaybackState::Playing {
            return Ok(());
        }

        let current = self.shared.current();
        let info = {
            let slot = self.shared.lock_slot(current);
            if !slot.is_open() {
                return Err(Error::InvalidState("no track loaded".to_string()));
            }
            slot.info()
        };

        if !control.device_open {
            let output_config = self.output_config(&info);
            if let Err(e) = control.output.open(output_config) {
                error!("Failed to open audio output: {}", e);
                return Err(e);
            }
            let volume = control.volume;
            control.output.set_volume(volume);
            control.device_open = true;
            debug!(
                "Audio output opened: {} Hz, {} ch, {} frames",
                info.sample_rate, info.channels, self.config.buffer_frames
            );
        }

        self.shared.lock_slot(current).set_active(true);
        self.shared.set_state(PlaybackState::Playing);

        if let Err(e) = control.output.start() {
            error!("Failed to start audio output: {}", e);
            self.shared.set_state(PlaybackState::Stopped);
            self.shared.lock_slot(current).set_active(false);
            control.output.close();
            control.device_open = false;
            return Err(e);
        }

        info!("Playback {} -> playing", state);
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let mut control = self.shared.lock_control();
        if self.shared.state() != PlaybackState::Playing {
            return Ok(());
        }

        self.shared.set_state(PlaybackState::Paused);
        if let Err(e) = control.output.stop() {
            warn!("Failed to stop audio output on pause: {}", e);
        }
        info!("Playback paused");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut control = self.shared.lock_control();
        if self.shared.state() == PlaybackState::Stopped {
            return Ok(());
        }

        self.shared.set_state(PlaybackState::Stopped);
        if control.device_open {
            if let Err(e) = control.output.stop() {
                warn!("Failed to stop audio output: {}", e);
            }
            control.output.close();
            control.device_open = false;
        }

        self.shared.lock_slot(self.shared.current()).rewind();
        info!("Playback stopped");
        Ok(())
    }

    /// Seek the current track
    pub fn seek(&self, position_ms: u64) -> Result<()> {
        let _control = self.shared.lock_control();
        let mut slot = self.shared.lock_slot(self.shared.current());
        slot.seek(position_ms)?;
        debug!("Seeked to {}ms (requested {}ms)", slot.position_ms(), position_ms);
        Ok(())
    }

    /// Position of the current track in ms (0 when nothing is loaded)
    pub fn get_position(&self) -> u64 {
        self.shared.lock_slot(self.shared.current()).position_ms()
    }

    /// Duration of the current track in ms (0 when unknown)
    pub fn get_duration(&self) -> u64 {
        self.shared.lock_slot(self.shared.current()).duration_ms()
    }

    /// Promote the prepared next track to current
    pub fn transition_to_next(&self) -> Result<()> {
        let _control = self.shared.lock_control();
        let next = self.shared.next.load(Ordering::Acquire);
        if next == NO_SLOT {
            return Err(Error::InvalidState("no next track prepared".to_string()));
        }

        let current = self.shared.current();
        self.shared.lock_slot(current).close();

        let mut slot = self.shared.lock_slot(next);
        slot.set_active(true);
        self.shared.channels.store(slot.channels(), Ordering::Release);
        self.shared.current.store(next, Ordering::Release);
        self.shared.next.store(NO_SLOT, Ordering::Release);

        info!("Transitioned to {} in slot {}", slot.path().display(), next);
        Ok(())
    }

    /// Set master volume; clamped to 0.0-1.0
    pub fn set_volume(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        let mut control = self.shared.lock_control();
        control.volume = level;
        control.output.set_volume(level);
        debug!("Volume set to {:.2}", level);
    }

    pub fn volume(&self) -> f32 {
        self.shared.lock_control().volume
    }

    pub fn set_gapless(&self, enabled: bool) {
        let _control = self.shared.lock_control();
        self.shared.gapless.store(enabled, Ordering::Release);
        debug!("Gapless playback {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_gapless(&self) -> bool {
        self.shared.gapless.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Index of the current slot (0 or 1)
    pub fn current_index(&self) -> usize {
        self.shared.current()
    }

    /// Index of the prepared next slot, if any
    pub fn next_index(&self) -> Option<usize> {
        match self.shared.next.load(Ordering::Acquire) {
            NO_SLOT => None,
            index => Some(index),
        }
    }

    /// Number of slot switches made inside the render callback
    pub fn slot_switches(&self) -> u64 {
        self.shared.slot_switches.load(Ordering::Relaxed)
    }

    /// Format of the current track
    pub fn stream_info(&self) -> StreamInfo {
        self.shared.lock_slot(self.shared.current()).info()
    }

    /// Track in the current slot, if one is open
    pub fn current_track(&self) -> Option<TrackDescriptor> {
        let slot = self.shared.lock_slot(self.shared.current());
        slot.is_open().then(|| slot.track().clone())
    }

    /// Fill `output` with the next `frame_count` frames.
    ///
    /// This is the body of the render callback, exposed for hosts that pull
    /// samples themselves. Never blocks and never fails.
    pub fn fill_buffer(&self, output: &mut [f32], frame_count: usize) {
        self.shared.fill_buffer(output, frame_count);
    }

    /// Stop playback and close both slots
    pub fn shutdown(&self) {
        if let Err(e) = self.stop() {
            warn!("Stop during shutdown failed: {}", e);
        }

        let _control = self.shared.lock_control();
        self.shared.next.store(NO_SLOT, Ordering::Release);
        for index in 0..2 {
            self.shared.lock_slot(index).close();
        }
        self.shared.current.store(0, Ordering::Release);
        debug!("Playback engine shut down");
    }

    fn output_config(&self, info: &StreamInfo) -> OutputConfig {
        OutputConfig {
            device_id: self.config.device_id.clone(),
            sample_rate: info.sample_rate,
            channels: info.channels,
            sample_format: SampleFormat::F32,
            buffer_frames: self.config.buffer_frames,
            callback: Arc::new(EngineRenderer {
                shared: Arc::downgrade(&self.shared),
            }),
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EngineShared {
    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_slot(&self, index: usize) -> MutexGuard<'_, DecoderSlot> {
        self.slots[index].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn fill_buffer(&self, output: &mut [f32], frame_count: usize) {
        let current = self.current();
        let channels = self.channels.load(Ordering::Acquire).max(1);
        let wanted = (frame_count * channels).min(output.len());

        if self.state() != PlaybackState::Playing {
            output[..wanted].fill(0.0);
            return;
        }

        let gapless = self.gapless.load(Ordering::Acquire);
        let next = self.next.load(Ordering::Acquire);
        let has_next = gapless && next != NO_SLOT;

        if has_next && self.approaching_end(current, frame_count) {
            if let Ok(mut slot) = self.slots[next].try_lock() {
                if slot.is_open() {
                    slot.set_active(true);
                }
            }
        }

        let mut frames_written = 0;
        let mut samples_written = 0;
        let mut exhausted = false;
        if let Ok(mut slot) = self.slots[current].try_lock() {
            frames_written = slot.decode(&mut output[..wanted], frame_count);
            samples_written = frames_written * slot.channels();
            exhausted = slot.is_eos();
        }

        if frames_written < frame_count && exhausted && has_next {
            if let Ok(mut slot) = self.slots[next].try_lock() {
                if slot.is_active() {
                    let offset = samples_written.min(wanted);
                    let produced = slot.decode(&mut output[offset..wanted], frame_count - frames_written);
                    let next_channels = slot.channels();
                    drop(slot);

                    if produced > 0 {
                        self.switch_slots(current, next, next_channels);
                        samples_written = offset + produced * next_channels;
                    }
                }
            }
        }

        if samples_written < wanted {
            output[samples_written..wanted].fill(0.0);
        }
    }

    /// Whether the slot could run dry within the prebuffer threshold or
    /// within this period, whichever is longer
    fn approaching_end(&self, index: usize, frame_count: usize) -> bool {
        let Ok(slot) = self.slots[index].try_lock() else {
            return false;
        };
        let Some(remaining) = slot.remaining_ms() else {
            return false;
        };
        let period_ms = slot.info().frames_to_ms(frame_count as u64).saturating_add(1);
        remaining < self.prebuffer_threshold_ms.max(period_ms)
    }

    /// Commit a splice from `old` to `new`. Deferred when the control lock
    /// or the old slot is busy.
    ///
    /// Until a deferred switch commits, `get_position` and `current_track`
    /// still describe the finished track while the next one is audible.
    fn switch_slots(&self, old: usize, new: usize, channels: usize) {
        let Ok(_control) = self.control.try_lock() else {
            return;
        };
        if self.current.load(Ordering::Acquire) != old || self.next.load(Ordering::Acquire) != new {
            return;
        }
        match self.slots[old].try_lock() {
            Ok(mut slot) => slot.close(),
            Err(_) => return,
        }

        self.channels.store(channels, Ordering::Release);
        self.current.store(new, Ordering::Release);
        self.next.store(NO_SLOT, Ordering::Release);
        self.slot_switches.fetch_add(1, Ordering::Relaxed);
    }
}
