use log::{debug, info, trace, warn};

use crate::audio::{AudioState, FeatureExtractor};
use crate::effects::{
    AnimationEngine, AnimationFrame, ParticleState, QualityPreset, RayState, RibbonState,
    VisualizerConfig,
};

/// Scalar part of a snapshot laid out for a GPU uniform buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub time: f32,
    pub energy: f32,
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
    pub hue: f32,
    pub rotation: f32,
    pub beat_pulse: f32,
    pub glow: f32,
    pub camera_offset: [f32; 3],
}

/// Everything a render adapter reads after one `update`, borrowed from the
/// visualizer for the rest of the frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameSnapshot<'a> {
    pub audio: AudioState,
    pub bands: &'a [f32],
    pub band_peaks: &'a [f32],
    pub animation: AnimationFrame,
    pub particles: &'a [ParticleState],
    pub rays: &'a [RayState],
    pub ribbons: &'a [RibbonState],
    pub quality: QualityPreset,
}

impl FrameSnapshot<'_> {
    pub fn uniforms(&self) -> FrameUniforms {
        FrameUniforms {
            time: self.animation.elapsed,
            energy: self.audio.energy,
            bass: self.audio.bass,
            mids: self.audio.mids,
            highs: self.audio.highs,
            hue: self.animation.hue,
            rotation: self.animation.rotation,
            beat_pulse: self.animation.beat_pulse,
            glow: self.animation.glow,
            camera_offset: self.animation.camera_offset.to_array(),
        }
    }
}

struct Core {
    extractor: FeatureExtractor,
    engine: AnimationEngine,
}

/// One visualizer instance: feature extraction plus animation state, driven
/// once per display refresh.
///
/// ```rust,no_run
/// use wavescope::{QualityPreset, Visualizer, VisualizerConfig};
///
/// let mut viz = Visualizer::init(VisualizerConfig::default(), QualityPreset::Medium, 44100.0);
/// let freq = vec![0u8; 1024];
/// let wave = vec![128u8; 2048];
/// if let Some(snapshot) = viz.update(&freq, &wave, 1.0 / 60.0) {
///     println!("bass {:.2}, hue {:.2}", snapshot.audio.bass, snapshot.animation.hue);
/// }
/// viz.dispose();
/// ```
pub struct Visualizer {
    config: VisualizerConfig,
    quality: QualityPreset,
    core: Option<Core>,
    frames: u64,
    warned_disposed: bool,
}

impl Visualizer {
    pub fn init(config: VisualizerConfig, quality: QualityPreset, sample_rate: f32) -> Self {
        let populations = quality.populations();
        info!(
            "Visualizer init: quality={} bands={} particles={} sample_rate={}",
            quality.name(),
            populations.band_count,
            populations.particle_count,
            sample_rate
        );

        let extractor =
            FeatureExtractor::new(config.extractor.clone(), sample_rate, populations.band_count);
        let engine = AnimationEngine::new(config.animation.clone(), quality, config.seed);

        Self {
            config,
            quality,
            core: Some(Core { extractor, engine }),
            frames: 0,
            warned_disposed: false,
        }
    }

    /// Resize population-dependent state. The band map is only rebuilt when
    /// the band count actually changes.
    pub fn set_quality(&mut self, quality: QualityPreset) {
        let Some(core) = self.core.as_mut() else {
            debug!("set_quality after dispose ignored");
            return;
        };

        core.extractor.set_band_count(quality.populations().band_count);
        core.engine.set_quality(quality);
        self.quality = quality;
    }

    /// Point the extractor at a source with a different sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if let Some(core) = self.core.as_mut() {
            core.extractor.set_sample_rate(sample_rate);
        }
    }

    /// Process one frame. Returns `None` once the instance is disposed.
    pub fn update(&mut self, freq: &[u8], wave: &[u8], dt: f32) -> Option<FrameSnapshot<'_>> {
        if self.core.is_none() {
            if !self.warned_disposed {
                warn!("update called on a disposed visualizer; ignoring");
                self.warned_disposed = true;
            }
            return None;
        }

        if !dt.is_finite() {
            warn!("non-finite frame delta {}, using {}", dt, self.config.min_dt);
        }
        let dt = self.config.sanitize_dt(dt);

        if let Some(core) = self.core.as_mut() {
            let audio = core.extractor.process(freq, wave, dt);
            core.engine.advance(&audio, core.extractor.band_levels(), dt);
        }

        self.frames += 1;
        if self.frames % 120 == 0 {
            trace!("frame {} processed", self.frames);
        }

        self.snapshot()
    }

    /// The state produced by the most recent `update`.
    pub fn snapshot(&self) -> Option<FrameSnapshot<'_>> {
        let core = self.core.as_ref()?;
        Some(FrameSnapshot {
            audio: core.extractor.state().clamped(),
            bands: core.extractor.band_levels(),
            band_peaks: core.engine.band_peaks(),
            animation: *core.engine.frame(),
            particles: core.engine.particles(),
            rays: core.engine.rays(),
            ribbons: core.engine.ribbons(),
            quality: self.quality,
        })
    }

    /// Drop every owned buffer. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.core.take().is_some() {
            info!("Visualizer disposed after {} frames", self.frames);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_none()
    }

    pub fn quality(&self) -> QualityPreset {
        self.quality
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn beat_triggers(&self) -> u64 {
        self.core
            .as_ref()
            .map_or(0, |core| core.engine.beat_triggers())
    }

    pub fn band_map_bins(&self) -> Option<usize> {
        self.core
            .as_ref()
            .and_then(|core| core.extractor.band_map())
            .map(|map| map.bin_count())
    }
}
