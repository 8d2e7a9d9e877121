use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use super::laws::{modulate, PhaseDriver};
use super::noise::DriftConfig;
use super::pulse::{EnvelopeConfig, PulseConfig};
use crate::audio::{AudioField, AudioState, ExtractorConfig, SmoothingMode};

/// Population sizes for one quality level. Update laws never change with
/// quality, only how many elements run them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Populations {
    pub band_count: usize,
    pub particle_count: usize,
    pub ray_count: usize,
    pub ribbon_count: usize,
    pub ribbon_segments: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [QualityPreset::Low, QualityPreset::Medium, QualityPreset::High];

    pub fn populations(&self) -> Populations {
        match self {
            QualityPreset::Low => Populations {
                band_count: 24,
                particle_count: 120,
                ray_count: 24,
                ribbon_count: 3,
                ribbon_segments: 48,
            },
            QualityPreset::Medium => Populations {
                band_count: 48,
                particle_count: 300,
                ray_count: 48,
                ribbon_count: 5,
                ribbon_segments: 96,
            },
            QualityPreset::High => Populations {
                band_count: 96,
                particle_count: 800,
                ray_count: 96,
                ribbon_count: 8,
                ribbon_segments: 192,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QualityPreset::Low => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "high",
        }
    }
}

impl FromStr for QualityPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityPreset::Low),
            "medium" | "med" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            other => bail!("unknown quality preset '{}' (expected low, medium or high)", other),
        }
    }
}

/// Stateless scaling law `base * (1 + gain * audio[field])`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modulation {
    pub base: f32,
    pub gain: f32,
    pub field: AudioField,
}

impl Modulation {
    pub fn apply(&self, audio: &AudioState) -> f32 {
        modulate(self.base, self.gain, audio.get(self.field))
    }

    pub fn apply_level(&self, level: f32) -> f32 {
        modulate(self.base, self.gain, level)
    }
}

/// Tunables of the animation state engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    // Accumulating phases
    pub hue: PhaseDriver,
    pub rotation: PhaseDriver,
    pub particle_orbit: PhaseDriver,
    /// Relative per-particle speed spread, 0.0 = lockstep.
    pub particle_speed_jitter: f32,
    pub ribbon_flow: PhaseDriver,

    // Peak and decay
    pub beat: PulseConfig,
    pub ray_pulse: PulseConfig,
    pub glow_envelope: EnvelopeConfig,
    pub peak_fall_rate: f32,

    // Multiplicative modulation
    pub bar_height: Modulation,
    pub particle_size: Modulation,
    pub glow_radius: Modulation,
    pub ribbon_radius: Modulation,
    pub ray_length: Modulation,

    pub drift: DriftConfig,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            hue: PhaseDriver {
                base_speed: 0.02,
                audio_gain: 0.15,
                field: AudioField::Energy,
            },
            rotation: PhaseDriver {
                base_speed: 0.05,
                audio_gain: 0.4,
                field: AudioField::Bass,
            },
            particle_orbit: PhaseDriver {
                base_speed: 0.08,
                audio_gain: 0.6,
                field: AudioField::Mids,
            },
            particle_speed_jitter: 0.35,
            ribbon_flow: PhaseDriver {
                base_speed: 0.12,
                audio_gain: 0.5,
                field: AudioField::Energy,
            },

            beat: PulseConfig::default(),
            ray_pulse: PulseConfig {
                field: AudioField::Highs,
                trigger_delta: 0.06,
                trigger_floor: 0.3,
                decay_rate: 3.5,
            },
            glow_envelope: EnvelopeConfig::default(),
            peak_fall_rate: 0.6,

            bar_height: Modulation {
                base: 1.0,
                gain: 1.4,
                field: AudioField::Energy,
            },
            particle_size: Modulation {
                base: 1.0,
                gain: 0.8,
                field: AudioField::Highs,
            },
            glow_radius: Modulation {
                base: 1.0,
                gain: 1.2,
                field: AudioField::Bass,
            },
            ribbon_radius: Modulation {
                base: 0.15,
                gain: 0.9,
                field: AudioField::Bass,
            },
            ray_length: Modulation {
                base: 0.3,
                gain: 1.5,
                field: AudioField::Highs,
            },

            drift: DriftConfig::default(),
        }
    }
}

/// Complete parameterisation of one visualizer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerConfig {
    pub extractor: ExtractorConfig,
    pub animation: AnimationConfig,
    /// Seed for noise drift and per-element reseeding.
    pub seed: u64,
    pub min_dt: f32,
    pub max_dt: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            animation: AnimationConfig::default(),
            seed: 0x5eed,
            min_dt: 1e-4,
            max_dt: 0.12,
        }
    }
}

impl VisualizerConfig {
    /// Clamp a frame delta into `[min_dt, max_dt]`; non-finite becomes `min_dt`.
    pub fn sanitize_dt(&self, dt: f32) -> f32 {
        if dt.is_finite() {
            dt.clamp(self.min_dt, self.max_dt)
        } else {
            self.min_dt
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.extractor.smoothing;
        for (name, alpha) in [
            ("energy", s.energy),
            ("bass", s.bass),
            ("mids", s.mids),
            ("highs", s.highs),
            ("bands", s.bands),
        ] {
            ensure!(
                alpha > 0.0 && alpha <= 1.0,
                "smoothing.{} must be in (0, 1], got {}",
                name,
                alpha
            );
        }
        if let SmoothingMode::TimeConstant { reference_fps } = s.mode {
            ensure!(
                reference_fps.is_finite() && reference_fps > 0.0,
                "smoothing.mode.reference_fps must be positive, got {}",
                reference_fps
            );
        }

        let e = &self.extractor;
        ensure!(
            e.bass_max_hz > 0.0 && e.bass_max_hz < e.mid_max_hz && e.mid_max_hz < e.high_max_hz,
            "range edges must increase: bass {} < mid {} < high {}",
            e.bass_max_hz,
            e.mid_max_hz,
            e.high_max_hz
        );
        ensure!(e.band_gamma > 0.0, "band_gamma must be positive, got {}", e.band_gamma);
        ensure!(e.energy_gain >= 0.0, "energy_gain must not be negative");

        ensure!(
            self.min_dt > 0.0 && self.min_dt <= self.max_dt,
            "need 0 < min_dt <= max_dt, got {} and {}",
            self.min_dt,
            self.max_dt
        );

        let a = &self.animation;
        ensure!(a.beat.decay_rate > 0.0, "beat.decay_rate must be positive");
        ensure!(a.ray_pulse.decay_rate > 0.0, "ray_pulse.decay_rate must be positive");
        ensure!(
            (0.0..1.0).contains(&a.glow_envelope.decay),
            "glow_envelope.decay must be in [0, 1)"
        );
        ensure!(a.peak_fall_rate >= 0.0, "peak_fall_rate must not be negative");
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}

/// A named look: one configuration of the shared core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerVariant {
    pub name: String,
    pub description: String,
    pub config: VisualizerConfig,
}

/// The built-in variants, which differ only in constants.
pub struct VariantManager {
    variants: Vec<VisualizerVariant>,
    current_variant: usize,
}

impl VariantManager {
    pub fn new() -> Self {
        let base = VisualizerConfig::default();

        let spectrum_bars = {
            let mut config = base.clone();
            config.extractor.band_gamma = 0.85;
            config.extractor.smoothing.bands = 0.25;
            config.animation.peak_fall_rate = 0.8;
            config
        };

        let radial_bloom = {
            let mut config = base.clone();
            config.extractor.energy_gain = 1.2;
            config.extractor.smoothing.energy = 0.18;
            config.animation.beat.trigger_delta = 0.04;
            config.animation.beat.decay_rate = 2.0;
            config.animation.glow_radius.gain = 1.6;
            config
        };

        let ribbon_field = {
            let mut config = base.clone();
            config.extractor.band_gamma = 0.9;
            config.extractor.smoothing.energy = 0.12;
            config.extractor.smoothing.bass = 0.14;
            config.extractor.smoothing.bands = 0.18;
            config.animation.ribbon_radius.gain = 1.2;
            config.animation.ribbon_flow.audio_gain = 0.8;
            config
        };

        let particle_orbit = {
            let mut config = base.clone();
            config.extractor.smoothing.highs = 0.22;
            config.animation.particle_orbit.audio_gain = 0.9;
            config.animation.particle_size.gain = 1.1;
            config.animation.beat.trigger_floor = 0.3;
            config
        };

        let variants = vec![
            VisualizerVariant {
                name: "Spectrum Bars".to_string(),
                description: "Flat log-spaced bars with falling peak caps".to_string(),
                config: spectrum_bars,
            },
            VisualizerVariant {
                name: "Radial Bloom".to_string(),
                description: "Circular spectrum with beat glow and rays".to_string(),
                config: radial_bloom,
            },
            VisualizerVariant {
                name: "Ribbon Field".to_string(),
                description: "Slow ribbons whose thickness follows the bass".to_string(),
                config: ribbon_field,
            },
            VisualizerVariant {
                name: "Particle Orbit".to_string(),
                description: "Orbiting particles driven by mids and highs".to_string(),
                config: particle_orbit,
            },
        ];

        Self {
            variants,
            current_variant: 0,
        }
    }

    pub fn get_current_variant(&self) -> &VisualizerVariant {
        &self.variants[self.current_variant]
    }

    pub fn set_current_variant(&mut self, index: usize) {
        if index < self.variants.len() {
            self.current_variant = index;
        }
    }

    /// Case-insensitive lookup by name; spaces, dashes and underscores are
    /// interchangeable.
    pub fn find(&self, name: &str) -> Option<usize> {
        let key = normalize_name(name);
        self.variants
            .iter()
            .position(|variant| normalize_name(&variant.name) == key)
    }

    pub fn get_variants(&self) -> &[VisualizerVariant] {
        &self.variants
    }

    pub fn current_variant_index(&self) -> usize {
        self.current_variant
    }
}

impl Default for VariantManager {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_scales_populations() {
        let low = QualityPreset::Low.populations();
        let medium = QualityPreset::Medium.populations();
        let high = QualityPreset::High.populations();

        assert!(low.band_count < medium.band_count && medium.band_count < high.band_count);
        assert!(low.particle_count < medium.particle_count);
        assert!(medium.particle_count < high.particle_count);
        assert!(low.ray_count < high.ray_count);
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!("HIGH".parse::<QualityPreset>().ok(), Some(QualityPreset::High));
        assert_eq!("med".parse::<QualityPreset>().ok(), Some(QualityPreset::Medium));
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(VisualizerConfig::default().validate().is_ok());
        for variant in VariantManager::new().get_variants() {
            assert!(variant.config.validate().is_ok(), "{} is invalid", variant.name);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = VisualizerConfig::default();
        config.extractor.smoothing.bass = 0.0;
        assert!(config.validate().is_err());

        let mut config = VisualizerConfig::default();
        config.extractor.mid_max_hz = 100.0;
        assert!(config.validate().is_err());

        let mut config = VisualizerConfig::default();
        config.min_dt = 0.0;
        assert!(config.validate().is_err());

        for reference_fps in [0.0, -60.0, f32::NAN, f32::INFINITY] {
            let mut config = VisualizerConfig::default();
            config.extractor.smoothing.mode = SmoothingMode::TimeConstant { reference_fps };
            assert!(config.validate().is_err(), "reference_fps {} accepted", reference_fps);
        }

        let mut config = VisualizerConfig::default();
        config.extractor.smoothing.mode = SmoothingMode::TimeConstant { reference_fps: 60.0 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_json_rejects_zero_reference_fps() -> Result<()> {
        let path = std::env::temp_dir().join(format!("wavescope-fps-{}.json", std::process::id()));
        let mut config = VisualizerConfig::default();
        config.extractor.smoothing.mode = SmoothingMode::TimeConstant { reference_fps: 0.0 };
        config.save_json(&path)?;

        let loaded = VisualizerConfig::load_json(&path);
        std::fs::remove_file(&path)?;
        assert!(loaded.is_err());
        Ok(())
    }

    #[test]
    fn test_sanitize_dt() {
        let config = VisualizerConfig::default();
        assert_eq!(config.sanitize_dt(0.0), config.min_dt);
        assert_eq!(config.sanitize_dt(-1.0), config.min_dt);
        assert_eq!(config.sanitize_dt(f32::NAN), config.min_dt);
        assert_eq!(config.sanitize_dt(5.0), config.max_dt);
        assert_eq!(config.sanitize_dt(0.016), 0.016);
    }

    #[test]
    fn test_json_round_trip_through_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("wavescope-config-{}.json", std::process::id()));
        let mut config = VisualizerConfig::default();
        config.extractor.energy_gain = 1.2;
        config.seed = 99;

        config.save_json(&path)?;
        let loaded = VisualizerConfig::load_json(&path)?;
        std::fs::remove_file(&path)?;

        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_variant_lookup() {
        let mut manager = VariantManager::new();
        let index = manager.find("radial-bloom");
        assert_eq!(index, Some(1));

        manager.set_current_variant(1);
        assert_eq!(manager.get_current_variant().name, "Radial Bloom");
        assert_eq!(manager.get_current_variant().config.extractor.energy_gain, 1.2);

        manager.set_current_variant(42);
        assert_eq!(manager.current_variant_index(), 1);
        assert!(manager.find("nope").is_none());
    }
}
