use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::{unit, AudioState, BandMap, BandRange, DEFAULT_SAMPLE_RATE, SILENCE_BYTE};

/// How a per-field smoothing factor is applied over time.
///
/// `PerFrame` applies alpha once per call, so responsiveness follows the
/// display refresh rate. `TimeConstant` rescales alpha by the frame duration
/// so that it matches `PerFrame` exactly at `reference_fps` and stays
/// equivalent in seconds at any other rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmoothingMode {
    PerFrame,
    TimeConstant { reference_fps: f32 },
}

impl Default for SmoothingMode {
    fn default() -> Self {
        SmoothingMode::PerFrame
    }
}

impl SmoothingMode {
    /// Effective alpha for one step of `dt` seconds.
    pub fn alpha(&self, alpha: f32, dt: f32) -> f32 {
        let alpha = alpha.clamp(0.0, 1.0);
        match *self {
            SmoothingMode::PerFrame => alpha,
            SmoothingMode::TimeConstant { reference_fps } => {
                let frames = (dt * reference_fps).max(0.0);
                (1.0 - (1.0 - alpha).powf(frames)).clamp(0.0, 1.0)
            }
        }
    }
}

/// Per-field one-pole smoothing factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    pub energy: f32,
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
    /// Applied to every per-band level.
    pub bands: f32,
    #[serde(default)]
    pub mode: SmoothingMode,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            energy: 0.15,
            bass: 0.2,
            mids: 0.18,
            highs: 0.22,
            bands: 0.22,
            mode: SmoothingMode::PerFrame,
        }
    }
}

/// Tunables for turning one frame of analysis bytes into control signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    // Range edges (inclusive upper bounds, Hz)
    pub bass_max_hz: f32,
    pub mid_max_hz: f32,
    pub high_max_hz: f32,

    /// Multiplier on waveform RMS before the 1.0 clamp.
    pub energy_gain: f32,
    /// Perceptual curve applied to each band average; < 1.0 lifts quiet bands.
    pub band_gamma: f32,

    pub smoothing: SmoothingConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            bass_max_hz: 200.0,
            mid_max_hz: 2000.0,
            high_max_hz: 16_000.0,
            energy_gain: 1.0,
            band_gamma: 0.88,
            smoothing: SmoothingConfig::default(),
        }
    }
}

/// Instantaneous bass/mid/high targets for a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeTargets {
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
}

/// One-pole low-pass step.
#[inline]
pub fn smooth(value: f32, target: f32, alpha: f32) -> f32 {
    value + (target - value) * alpha
}

/// Classify bins by their centre frequency and average each range.
///
/// Bins above `high_max_hz` belong to no range. A range with no bins
/// (coarse FFTs) yields 0.0.
pub fn range_targets(freq: &[u8], sample_rate: f32, config: &ExtractorConfig) -> RangeTargets {
    if freq.is_empty() {
        return RangeTargets::default();
    }

    let bin_hz = (sample_rate / 2.0) / freq.len() as f32;
    let mut sums = [0.0f32; 3];
    let mut counts = [0usize; 3];

    for (i, &magnitude) in freq.iter().enumerate() {
        let hz = i as f32 * bin_hz;
        let slot = if hz <= config.bass_max_hz {
            0
        } else if hz <= config.mid_max_hz {
            1
        } else if hz <= config.high_max_hz {
            2
        } else {
            continue;
        };
        sums[slot] += magnitude as f32 / 255.0;
        counts[slot] += 1;
    }

    let mean = |slot: usize| sums[slot] / counts[slot].max(1) as f32;
    RangeTargets {
        bass: mean(0),
        mids: mean(1),
        highs: mean(2),
    }
}

/// RMS of the byte waveform around the 128 midpoint, scaled by `gain` and
/// capped at 1.0.
pub fn rms_energy(wave: &[u8], gain: f32) -> f32 {
    if wave.is_empty() {
        return 0.0;
    }

    let centre = SILENCE_BYTE as f32;
    let mean_square = wave
        .iter()
        .map(|&sample| {
            let x = (sample as f32 - centre) / centre;
            x * x
        })
        .sum::<f32>()
        / wave.len() as f32;

    unit(mean_square.sqrt() * gain)
}

/// Advance `prev` by one frame toward the targets computed from this frame.
///
/// Each output field depends only on its previous value and its own fresh
/// target.
pub fn extract_features(
    freq: &[u8],
    wave: &[u8],
    sample_rate: f32,
    config: &ExtractorConfig,
    prev: &AudioState,
    dt: f32,
) -> AudioState {
    let targets = range_targets(freq, sample_rate, config);
    let energy = rms_energy(wave, config.energy_gain);

    let s = &config.smoothing;
    let alpha = |a: f32| s.mode.alpha(a, dt);

    AudioState {
        energy: unit(smooth(prev.energy, energy, alpha(s.energy))),
        bass: unit(smooth(prev.bass, targets.bass, alpha(s.bass))),
        mids: unit(smooth(prev.mids, targets.mids, alpha(s.mids))),
        highs: unit(smooth(prev.highs, targets.highs, alpha(s.highs))),
    }
}

/// Mean of a band's bins in 0.0-1.0, shaped by `gamma`.
pub fn band_target(freq: &[u8], band: &BandRange, gamma: f32) -> f32 {
    let end = band.end.min(freq.len());
    let start = band.start.min(end);
    let bins = &freq[start..end];

    let sum: f32 = bins.iter().map(|&m| m as f32 / 255.0).sum();
    let avg = sum / bins.len().max(1) as f32;
    if avg <= 0.0 {
        0.0
    } else {
        unit(avg.powf(gamma))
    }
}

/// Smooth `levels` in place toward this frame's band targets. Levels beyond
/// the map's band count decay toward zero.
pub fn update_band_levels(
    freq: &[u8],
    map: &BandMap,
    config: &ExtractorConfig,
    dt: f32,
    levels: &mut [f32],
) {
    let alpha = config.smoothing.mode.alpha(config.smoothing.bands, dt);
    for (i, level) in levels.iter_mut().enumerate() {
        let target = map
            .bands()
            .get(i)
            .map_or(0.0, |band| band_target(freq, band, config.band_gamma));
        *level = unit(smooth(*level, target, alpha));
    }
}

/// Stateful front end of the pipeline: owns the cached band map, the
/// smoothed `AudioState` and the per-band levels.
pub struct FeatureExtractor {
    config: ExtractorConfig,
    sample_rate: f32,
    band_count: usize,
    band_map: Option<BandMap>,
    band_levels: Vec<f32>,
    state: AudioState,
    frames: u64,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig, sample_rate: f32, band_count: usize) -> Self {
        Self {
            config,
            sample_rate: sanitize_sample_rate(sample_rate),
            band_count,
            band_map: None,
            band_levels: vec![0.0; band_count],
            state: AudioState::default(),
            frames: 0,
        }
    }

    /// Process one frame and return the updated state.
    pub fn process(&mut self, freq: &[u8], wave: &[u8], dt: f32) -> AudioState {
        self.ensure_band_map(freq.len());

        self.state = extract_features(freq, wave, self.sample_rate, &self.config, &self.state, dt);
        match &self.band_map {
            Some(map) => update_band_levels(freq, map, &self.config, dt, &mut self.band_levels),
            None => {
                let alpha = self.config.smoothing.mode.alpha(self.config.smoothing.bands, dt);
                for level in self.band_levels.iter_mut() {
                    *level = unit(smooth(*level, 0.0, alpha));
                }
            }
        }

        self.frames += 1;
        if self.frames % 120 == 0 {
            trace!(
                "features: energy={:.3} bass={:.3} mids={:.3} highs={:.3}",
                self.state.energy,
                self.state.bass,
                self.state.mids,
                self.state.highs
            );
        }

        self.state
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        let sample_rate = sanitize_sample_rate(sample_rate);
        if sample_rate != self.sample_rate {
            debug!("Sample rate {} -> {} Hz, band map invalidated", self.sample_rate, sample_rate);
            self.sample_rate = sample_rate;
            self.band_map = None;
        }
    }

    /// Reallocate band levels when the count changes; otherwise a no-op.
    pub fn set_band_count(&mut self, band_count: usize) {
        if band_count != self.band_count {
            debug!("Band count {} -> {}, levels reallocated", self.band_count, band_count);
            self.band_count = band_count;
            self.band_levels = vec![0.0; band_count];
            self.band_map = None;
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn state(&self) -> &AudioState {
        &self.state
    }

    pub fn band_levels(&self) -> &[f32] {
        &self.band_levels
    }

    pub fn band_map(&self) -> Option<&BandMap> {
        self.band_map.as_ref()
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// An empty frame says nothing about the source, so the cached map is kept.
    fn ensure_band_map(&mut self, bin_count: usize) {
        if bin_count == 0 {
            return;
        }
        let rebuild = match &self.band_map {
            Some(map) => {
                !map.matches(bin_count, self.band_count, self.sample_rate)
                    || map.is_stale_for(bin_count)
            }
            None => true,
        };

        if rebuild {
            debug!(
                "Building band map: {} bins -> {} bands @ {} Hz",
                bin_count, self.band_count, self.sample_rate
            );
            self.band_map = Some(BandMap::build(bin_count, self.band_count, self.sample_rate));
        }
    }
}

fn sanitize_sample_rate(sample_rate: f32) -> f32 {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        sample_rate
    } else {
        DEFAULT_SAMPLE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn loud_frames() -> (Vec<u8>, Vec<u8>) {
        let freq = vec![200u8; 1024];
        let wave = (0..2048).map(|i| if i % 2 == 0 { 255 } else { 0 }).collect();
        (freq, wave)
    }

    #[test]
    fn test_smoothing_converges_without_overshoot() {
        // PerFrame mode: one alpha step per call regardless of dt.
        let config = ExtractorConfig::default();
        let freq = vec![180u8; 1024];
        let wave = vec![SILENCE_BYTE; 2048];
        let target = range_targets(&freq, 44100.0, &config).bass;

        let mut state = AudioState::default();
        let mut last_gap = (state.bass - target).abs();
        for _ in 0..200 {
            state = extract_features(&freq, &wave, 44100.0, &config, &state, DT);
            let gap = (state.bass - target).abs();
            assert!(state.bass <= target + f32::EPSILON);
            assert!(gap < last_gap || gap < 1e-6);
            last_gap = gap;
        }
        assert!(last_gap < 1e-4);
    }

    #[test]
    fn test_silence_decays_to_zero() {
        let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), 44100.0, 48);
        let (freq, wave) = loud_frames();
        for _ in 0..50 {
            extractor.process(&freq, &wave, DT);
        }
        assert!(extractor.state().energy > 0.5);

        let silent_freq = vec![0u8; 1024];
        let silent_wave = vec![SILENCE_BYTE; 2048];
        for _ in 0..100 {
            let state = extractor.process(&silent_freq, &silent_wave, DT);
            for value in [state.energy, state.bass, state.mids, state.highs] {
                assert!(value.is_finite() && value >= 0.0);
            }
        }

        let state = extractor.state();
        assert!(state.energy < 1e-4);
        assert!(state.bass < 1e-4);
        assert!(state.mids < 1e-4);
        assert!(state.highs < 1e-4);
        assert!(extractor.band_levels().iter().all(|&l| l < 1e-4));
    }

    #[test]
    fn test_rms_energy_bounds() {
        assert_eq!(rms_energy(&[SILENCE_BYTE; 64], 1.0), 0.0);
        assert_eq!(rms_energy(&[], 1.0), 0.0);

        let full_scale = [0u8; 64];
        assert!((rms_energy(&full_scale, 1.0) - 1.0).abs() < 1e-6);

        // Gain never pushes the target past 1.0.
        let (_, wave) = loud_frames();
        assert!(rms_energy(&wave, 1.2) <= 1.0);
    }

    #[test]
    fn test_ranges_follow_frequency_not_index() {
        let config = ExtractorConfig::default();
        // 1024 bins at 44.1 kHz: ~21.5 Hz per bin, bins 0..=9 are bass.
        let mut freq = vec![0u8; 1024];
        freq[4] = 255;

        let targets = range_targets(&freq, 44100.0, &config);
        assert!((targets.bass - 0.1).abs() < 1e-6);
        assert_eq!(targets.mids, 0.0);
        assert_eq!(targets.highs, 0.0);

        // Same index, different sample rate: now a mid bin.
        let targets = range_targets(&freq, 441_000.0, &config);
        assert_eq!(targets.bass, 0.0);
        assert!(targets.mids > 0.0);
    }

    #[test]
    fn test_bins_above_high_edge_are_ignored() {
        let config = ExtractorConfig::default();
        let mut freq = vec![0u8; 1024];
        for bin in freq.iter_mut().skip(800) {
            *bin = 255;
        }

        // Bin 800 sits at ~17.2 kHz.
        let targets = range_targets(&freq, 44100.0, &config);
        assert_eq!(targets.highs, 0.0);
    }

    #[test]
    fn test_coarse_fft_empty_ranges() {
        let config = ExtractorConfig::default();
        // Four bins of 5.5 kHz: no bin can land in the mid range.
        let freq = [255u8; 4];
        let targets = range_targets(&freq, 44100.0, &config);
        assert_eq!(targets.mids, 0.0);
        assert!(targets.bass > 0.0);
        assert!(!targets.highs.is_nan());
    }

    #[test]
    fn test_empty_frames() {
        let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), 44100.0, 24);
        let state = extractor.process(&[], &[], DT);
        assert_eq!(state, AudioState::default());
        assert_eq!(extractor.band_levels().len(), 24);
        assert!(extractor.band_map().is_none());
    }

    #[test]
    fn test_empty_frame_keeps_band_map() {
        let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), 44100.0, 24);
        let wave = vec![SILENCE_BYTE; 2048];
        extractor.process(&vec![200u8; 1024], &wave, DT);
        let before = extractor.band_map().cloned();
        let level = extractor.band_levels()[0];
        assert!(level > 0.0);

        extractor.process(&[], &wave, DT);
        assert_eq!(extractor.band_map().cloned(), before);
        assert_eq!(extractor.band_map().map(|m| m.bin_count()), Some(1024));
        assert!(extractor.band_levels()[0] < level);
    }

    #[test]
    fn test_time_constant_matches_per_frame_at_reference_rate() {
        let mode = SmoothingMode::TimeConstant { reference_fps: 60.0 };
        assert!((mode.alpha(0.2, 1.0 / 60.0) - 0.2).abs() < 1e-5);

        // Two half-length frames equal one full frame.
        let half = mode.alpha(0.2, 1.0 / 120.0);
        let combined = 1.0 - (1.0 - half) * (1.0 - half);
        assert!((combined - 0.2).abs() < 1e-5);

        // PerFrame ignores dt entirely.
        assert_eq!(SmoothingMode::PerFrame.alpha(0.2, 0.5), 0.2);
    }

    #[test]
    fn test_band_map_follows_frame_shape() {
        let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), 44100.0, 32);
        let wave = vec![SILENCE_BYTE; 2048];

        extractor.process(&vec![0u8; 1024], &wave, DT);
        assert_eq!(extractor.band_map().map(|m| m.bin_count()), Some(1024));

        extractor.process(&vec![0u8; 512], &wave, DT);
        assert_eq!(extractor.band_map().map(|m| m.bin_count()), Some(512));

        extractor.set_sample_rate(48000.0);
        assert!(extractor.band_map().is_none());
        extractor.process(&vec![0u8; 512], &wave, DT);
        assert_eq!(extractor.band_map().map(|m| m.sample_rate()), Some(48000.0));
    }

    #[test]
    fn test_band_count_change_reallocates() {
        let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), 44100.0, 48);
        let (freq, wave) = loud_frames();
        extractor.process(&freq, &wave, DT);
        assert!(extractor.band_levels().iter().all(|&l| l > 0.0));

        extractor.set_band_count(48);
        assert!(extractor.band_levels().iter().all(|&l| l > 0.0));

        extractor.set_band_count(24);
        assert_eq!(extractor.band_levels().len(), 24);
        assert!(extractor.band_levels().iter().all(|&l| l == 0.0));
    }

    #[test]
    fn test_band_gamma_lifts_quiet_bands() {
        let band = BandRange { start: 0, end: 4 };
        let freq = [64u8; 4];
        let linear = band_target(&freq, &band, 1.0);
        let curved = band_target(&freq, &band, 0.85);
        assert!(curved > linear);
        assert_eq!(band_target(&[0u8; 4], &band, 0.85), 0.0);
    }
}
