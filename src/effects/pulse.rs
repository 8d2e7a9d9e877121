use log::debug;
use serde::{Deserialize, Serialize};

use crate::audio::{unit, AudioField, AudioState};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    pub field: AudioField,
    /// Minimum frame-to-frame rise that counts as an onset.
    pub trigger_delta: f32,
    /// Level the signal must also exceed, so noise near silence never fires.
    pub trigger_floor: f32,
    /// Pulse units lost per second.
    pub decay_rate: f32,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            field: AudioField::Bass,
            trigger_delta: 0.035,
            trigger_floor: 0.25,
            decay_rate: 2.5,
        }
    }
}

/// Beat-flash envelope: jumps to 1.0 on a sharp rise of the watched signal
/// and decays linearly to zero otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakPulse {
    config: PulseConfig,
    last_value: f32,
    pulse: f32,
    triggers: u64,
}

impl PeakPulse {
    pub fn new(config: PulseConfig) -> Self {
        Self {
            config,
            last_value: 0.0,
            pulse: 0.0,
            triggers: 0,
        }
    }

    /// Feed the watched field of `audio`.
    pub fn observe(&mut self, audio: &AudioState, dt: f32) -> bool {
        self.update(audio.get(self.config.field), dt)
    }

    /// Decay, then test `current` against the trigger rule. Returns true on
    /// the frame the pulse fires.
    pub fn update(&mut self, current: f32, dt: f32) -> bool {
        self.decay(dt);

        let fired = current > self.last_value + self.config.trigger_delta
            && current > self.config.trigger_floor;
        if fired {
            self.pulse = 1.0;
            self.triggers += 1;
        }

        self.last_value = current;
        fired
    }

    pub fn decay(&mut self, dt: f32) {
        self.pulse = (self.pulse - dt * self.config.decay_rate).max(0.0);
    }

    pub fn value(&self) -> f32 {
        self.pulse
    }

    pub fn triggers(&self) -> u64 {
        self.triggers
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub threshold: f32,
    pub rise: f32,
    /// Per-frame retention factor.
    pub decay: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            rise: 2.5,
            decay: 0.9,
        }
    }
}

/// Continuous peak follower: `env * decay + excess * rise`, clamped to 0.0-1.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatEnvelope {
    config: EnvelopeConfig,
    value: f32,
}

impl BeatEnvelope {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self { config, value: 0.0 }
    }

    pub fn update(&mut self, level: f32) -> f32 {
        let excess = (level - self.config.threshold).max(0.0);
        self.value = unit(self.value * self.config.decay + excess * self.config.rise);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// Falling peak caps, one per band.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandPeaks {
    peaks: Vec<f32>,
    fall_rate: f32,
}

impl BandPeaks {
    pub fn new(band_count: usize, fall_rate: f32) -> Self {
        Self {
            peaks: vec![0.0; band_count],
            fall_rate,
        }
    }

    pub fn update(&mut self, levels: &[f32], dt: f32) {
        if levels.len() != self.peaks.len() {
            debug!("Peak caps reallocated: {} -> {}", self.peaks.len(), levels.len());
            self.peaks = vec![0.0; levels.len()];
        }

        for (peak, &level) in self.peaks.iter_mut().zip(levels) {
            *peak = unit(level.max(*peak - dt * self.fall_rate));
        }
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_pulse_fires_on_sharp_rise() {
        let mut pulse = PeakPulse::new(PulseConfig::default());
        assert!(!pulse.update(0.2, DT));
        assert!(pulse.update(0.5, DT));
        assert_eq!(pulse.value(), 1.0);

        // Holding the level is not a new onset.
        assert!(!pulse.update(0.5, DT));
        assert!(pulse.value() < 1.0);
        assert_eq!(pulse.triggers(), 1);
    }

    #[test]
    fn test_pulse_respects_floor() {
        let mut pulse = PeakPulse::new(PulseConfig::default());
        assert!(!pulse.update(0.0, DT));
        // Large jump, but below the floor.
        assert!(!pulse.update(0.2, DT));
        assert_eq!(pulse.value(), 0.0);
    }

    #[test]
    fn test_pulse_decays_within_one_over_rate() {
        let config = PulseConfig::default();
        let mut pulse = PeakPulse::new(config);
        pulse.update(1.0, DT);
        assert_eq!(pulse.value(), 1.0);

        let mut elapsed = 0.0;
        let mut previous = pulse.value();
        while elapsed < 1.0 / config.decay_rate + 1e-3 {
            pulse.update(1.0, DT);
            elapsed += DT;
            assert!(pulse.value() <= previous);
            previous = pulse.value();
        }
        assert_eq!(pulse.value(), 0.0);
    }

    #[test]
    fn test_pulse_watches_configured_field() {
        let mut pulse = PeakPulse::new(PulseConfig {
            field: AudioField::Highs,
            ..PulseConfig::default()
        });
        let bass_hit = AudioState {
            bass: 0.9,
            ..AudioState::default()
        };
        assert!(!pulse.observe(&bass_hit, DT));

        let hat_hit = AudioState {
            highs: 0.9,
            ..AudioState::default()
        };
        assert!(pulse.observe(&hat_hit, DT));
    }

    #[test]
    fn test_envelope_rises_fast_and_falls_slow() {
        let mut env = BeatEnvelope::new(EnvelopeConfig::default());
        let attack = env.update(0.75);
        assert!(attack > 0.9);

        let mut frames = 0;
        while env.update(0.0) > 0.1 {
            frames += 1;
        }
        assert!(frames > 10);
        assert!(env.update(0.0) >= 0.0);
    }

    #[test]
    fn test_band_peaks_hold_and_fall() {
        let mut peaks = BandPeaks::new(3, 0.5);
        peaks.update(&[0.8, 0.2, 0.0], DT);
        assert_eq!(peaks.peaks(), &[0.8, 0.2, 0.0]);

        peaks.update(&[0.0, 0.4, 0.0], 0.1);
        assert!((peaks.peaks()[0] - 0.75).abs() < 1e-6);
        assert_eq!(peaks.peaks()[1], 0.4);
        assert_eq!(peaks.peaks()[2], 0.0);

        peaks.update(&[0.1; 5], DT);
        assert_eq!(peaks.peaks().len(), 5);
    }
}
