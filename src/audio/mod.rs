pub mod analyser;
pub mod band_map;
pub mod feature_extractor;
pub mod signal;

pub use analyser::SpectrumAnalyser;
pub use band_map::{build_band_map, BandMap, BandRange};
pub use feature_extractor::{
    extract_features, ExtractorConfig, FeatureExtractor, SmoothingConfig, SmoothingMode,
};
pub use signal::TestSignal;

use serde::{Deserialize, Serialize};

/// Byte value of a silent time-domain sample.
pub const SILENCE_BYTE: u8 = 128;

/// Default analysis window; yields 1024 frequency bins.
pub const DEFAULT_FFT_SIZE: usize = 2048;

pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// Smoothed audio control signals, one record per visualizer instance.
///
/// Every field stays in 0.0-1.0 and is only ever moved toward a freshly
/// computed target by the extractor's one-pole filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioState {
    pub energy: f32,
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
}

impl AudioState {
    pub fn get(&self, field: AudioField) -> f32 {
        match field {
            AudioField::Energy => self.energy,
            AudioField::Bass => self.bass,
            AudioField::Mids => self.mids,
            AudioField::Highs => self.highs,
        }
    }

    /// Copy with every field forced into 0.0-1.0 (NaN becomes 0.0).
    pub fn clamped(&self) -> Self {
        Self {
            energy: unit(self.energy),
            bass: unit(self.bass),
            mids: unit(self.mids),
            highs: unit(self.highs),
        }
    }
}

/// Selects which `AudioState` signal drives a procedural variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioField {
    Energy,
    Bass,
    Mids,
    Highs,
}

/// Clamp to 0.0-1.0, mapping non-finite input to 0.0.
pub(crate) fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
