//! Gapless playback: decoder slots, the engine, and decoder resolution

pub mod engine;
pub mod resolve;
pub mod slot;
pub mod state;

pub use engine::PlaybackEngine;
pub use resolve::resolve_decoder;
pub use slot::TrackDescriptor;
pub use state::PlaybackState;
