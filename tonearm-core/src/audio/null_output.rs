//! Backend-free audio output
//!
//! Accepts any configuration and never touches hardware. The render
//! callback runs only when [`NullOutput::pump`] is called, which lets
//! headless hosts and tests drive playback one period at a time.
//!
//! Clones share state, so a caller can keep a handle to an output it gave
//! away and inspect it later.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tonearm_common::{AudioOutput, Error, OutputConfig, Result};
use tracing::debug;

/// Lifecycle calls observed by a [`NullOutput`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputStats {
    pub opens: usize,
    pub starts: usize,
    pub stops: usize,
    pub closes: usize,
    pub volume_changes: usize,
}

struct NullOutputState {
    config: Option<OutputConfig>,
    running: bool,
    volume: f32,
    stats: OutputStats,
    fail_open: bool,
    fail_start: bool,
}

impl Default for NullOutputState {
    fn default() -> Self {
        Self {
            config: None,
            running: false,
            volume: 1.0,
            stats: OutputStats::default(),
            fail_open: false,
            fail_start: false,
        }
    }
}

/// Audio output that renders into memory on demand
#[derive(Clone, Default)]
pub struct NullOutput {
    state: Arc<Mutex<NullOutputState>>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NullOutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `open` fail
    pub fn fail_next_open(&self) {
        self.lock().fail_open = true;
    }

    /// Make the next `start` fail
    pub fn fail_next_start(&self) {
        self.lock().fail_start = true;
    }

    pub fn stats(&self) -> OutputStats {
        self.lock().stats
    }

    pub fn is_open(&self) -> bool {
        self.lock().config.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    /// (sample rate, channels, buffer frames) of the open device
    pub fn format(&self) -> Option<(u32, u16, u32)> {
        self.lock()
            .config
            .as_ref()
            .map(|c| (c.sample_rate, c.channels, c.buffer_frames))
    }

    /// Run one period of `frames` frames through the render callback.
    ///
    /// Returns the volume-scaled samples, or None when the output is not
    /// running.
    pub fn pump(&self, frames: usize) -> Option<Vec<f32>> {
        let (callback, channels, volume) = {
            let state = self.lock();
            if !state.running {
                return None;
            }
            let config = state.config.as_ref()?;
            (config.callback.clone(), config.channels.max(1) as usize, state.volume)
        };

        let mut buffer = vec![0.0f32; frames * channels];
        callback.render(&mut buffer, frames);
        for sample in &mut buffer {
            *sample *= volume;
        }
        Some(buffer)
    }
}

impl AudioOutput for NullOutput {
    fn open(&mut self, config: OutputConfig) -> Result<()> {
        let mut state = self.lock();
        state.stats.opens += 1;
        if std::mem::take(&mut state.fail_open) {
            return Err(Error::Internal("null output: open failed".to_string()));
        }
        debug!(
            "Null output opened: {} Hz, {} ch, {} frames",
            config.sample_rate, config.channels, config.buffer_frames
        );
        state.config = Some(config);
        state.running = false;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.stats.starts += 1;
        if std::mem::take(&mut state.fail_start) {
            return Err(Error::Internal("null output: start failed".to_string()));
        }
        if state.config.is_none() {
            return Err(Error::InvalidState("null output is not open".to_string()));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.stats.stops += 1;
        state.running = false;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.stats.closes += 1;
        state.running = false;
        state.config = None;
    }

    fn set_volume(&mut self, level: f32) {
        let mut state = self.lock();
        state.stats.volume_changes += 1;
        state.volume = level.clamp(0.0, 1.0);
    }
}
