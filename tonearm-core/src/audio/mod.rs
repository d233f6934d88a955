//! Audio output backends shipped with the core

pub mod null_output;

pub use null_output::NullOutput;
