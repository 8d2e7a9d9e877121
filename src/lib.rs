//! Audio feature extraction and animation state for music visualizers.
//!
//! Per frame, a host hands in one frequency frame (FFT magnitudes as bytes),
//! one waveform frame (time-domain bytes centred on 128) and the elapsed
//! time. [`Visualizer::update`] turns them into smoothed band levels,
//! bass/mid/high/energy signals and a set of procedural animation values
//! that any renderer can read straight back out of the returned
//! [`FrameSnapshot`].

pub mod audio;
pub mod effects;
pub mod visualizer;

pub use audio::{AudioField, AudioState, BandMap, SpectrumAnalyser, TestSignal};
pub use effects::{QualityPreset, VariantManager, VisualizerConfig};
pub use visualizer::{FrameSnapshot, FrameUniforms, Visualizer};
