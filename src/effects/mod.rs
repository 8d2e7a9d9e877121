pub mod engine;
pub mod laws;
pub mod noise;
pub mod preset;
pub mod pulse;

pub use engine::{AnimationEngine, AnimationFrame, ParticleState, RayState, RibbonState};
pub use laws::{modulate, Phase, PhaseDriver};
pub use noise::{noise3d, CameraDrift, DriftConfig, NoiseField};
pub use preset::{
    AnimationConfig, Modulation, Populations, QualityPreset, VariantManager, VisualizerConfig,
    VisualizerVariant,
};
pub use pulse::{BandPeaks, BeatEnvelope, EnvelopeConfig, PeakPulse, PulseConfig};
