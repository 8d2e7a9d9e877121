use glam::Vec3;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::laws::Phase;
use super::noise::CameraDrift;
use super::preset::{AnimationConfig, Populations, QualityPreset};
use super::pulse::{BandPeaks, BeatEnvelope, PeakPulse};
use crate::audio::AudioState;

/// Smallest step used when the caller hands in a degenerate `dt`.
const MIN_STEP: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    /// Stable per-particle random in [0, 1), fixed until the next reseed.
    pub seed: f32,
    pub orbit: Phase,
    pub speed_scale: f32,
    pub radius: f32,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RayState {
    /// Fixed slot angle in radians.
    pub base_angle: f32,
    /// `base_angle` plus the global rotation, in radians.
    pub angle: f32,
    pub band: usize,
    pub pulse: PeakPulse,
    pub length: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RibbonState {
    pub flow: Phase,
    pub offset: f32,
    pub minor_radius: f32,
    pub segments: usize,
}

/// Global per-frame values for the render adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationFrame {
    pub hue: f32,
    pub rotation: f32,
    pub beat_pulse: f32,
    pub glow: f32,
    pub glow_radius: f32,
    pub bar_scale: f32,
    pub camera_offset: Vec3,
    pub elapsed: f32,
}

/// Advances every procedural variable by one step per frame.
///
/// Global accumulators (hue, rotation, beat pulse, drift) live for the whole
/// instance. Per-element arrays are sized by the quality preset and are
/// replaced wholesale, and reseeded, whenever the preset changes.
pub struct AnimationEngine {
    config: AnimationConfig,
    quality: QualityPreset,
    seed: u64,
    generation: u32,

    hue: Phase,
    rotation: Phase,
    beat: PeakPulse,
    glow: BeatEnvelope,
    peaks: BandPeaks,
    drift: CameraDrift,

    particles: Vec<ParticleState>,
    rays: Vec<RayState>,
    ribbons: Vec<RibbonState>,

    frame: AnimationFrame,
    elapsed: f64,
}

impl AnimationEngine {
    pub fn new(config: AnimationConfig, quality: QualityPreset, seed: u64) -> Self {
        let populations = quality.populations();
        let mut engine = Self {
            beat: PeakPulse::new(config.beat),
            glow: BeatEnvelope::new(config.glow_envelope),
            peaks: BandPeaks::new(populations.band_count, config.peak_fall_rate),
            drift: CameraDrift::new(seed as u32, config.drift),
            config,
            quality,
            seed,
            generation: 0,
            hue: Phase::default(),
            rotation: Phase::default(),
            particles: Vec::new(),
            rays: Vec::new(),
            ribbons: Vec::new(),
            frame: AnimationFrame::default(),
            elapsed: 0.0,
        };
        engine.reseed();
        engine
    }

    /// Switch population sizes. Per-element state is rebuilt and reseeded;
    /// global accumulators carry over.
    pub fn set_quality(&mut self, quality: QualityPreset) {
        if quality == self.quality {
            return;
        }
        info!("Animation quality {} -> {}", self.quality.name(), quality.name());
        self.quality = quality;
        self.generation += 1;
        self.reseed();
    }

    fn reseed(&mut self) {
        let Populations {
            band_count,
            particle_count,
            ray_count,
            ribbon_count,
            ribbon_segments,
        } = self.quality.populations();

        let mut rng = StdRng::seed_from_u64(
            self.seed ^ (self.generation as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        let jitter = self.config.particle_speed_jitter;

        let particles = (0..particle_count)
            .map(|_| ParticleState {
                seed: rng.random::<f32>(),
                orbit: Phase::new(rng.random::<f32>()),
                speed_scale: 1.0 + jitter * rng.random_range(-1.0f32..1.0),
                radius: 0.3 + 0.7 * rng.random::<f32>(),
                size: 0.0,
            })
            .collect();

        let rays = (0..ray_count)
            .map(|i| RayState {
                base_angle: i as f32 / ray_count as f32 * std::f32::consts::TAU,
                angle: i as f32 / ray_count as f32 * std::f32::consts::TAU + self.rotation.radians(),
                band: i * band_count / ray_count,
                pulse: PeakPulse::new(self.config.ray_pulse),
                length: 0.0,
            })
            .collect();

        let ribbons = (0..ribbon_count)
            .map(|i| RibbonState {
                flow: Phase::new(i as f32 / ribbon_count as f32 + 0.1 * rng.random::<f32>()),
                offset: rng.random::<f32>(),
                minor_radius: 0.0,
                segments: ribbon_segments,
            })
            .collect();

        // Swap in complete arrays so no frame ever sees a partial resize.
        self.particles = particles;
        self.rays = rays;
        self.ribbons = ribbons;
        self.peaks = BandPeaks::new(band_count, self.config.peak_fall_rate);

        debug!(
            "Reseeded generation {}: {} particles, {} rays, {} ribbons",
            self.generation, particle_count, ray_count, ribbon_count
        );
    }

    pub fn advance(&mut self, audio: &AudioState, bands: &[f32], dt: f32) -> &AnimationFrame {
        let dt = if dt.is_finite() { dt.max(MIN_STEP) } else { MIN_STEP };
        let config = &self.config;
        self.elapsed += dt as f64;

        let hue = config.hue.drive(&mut self.hue, audio, dt);
        let rotation = config.rotation.drive(&mut self.rotation, audio, dt);
        self.beat.observe(audio, dt);
        let glow = self.glow.update(audio.bass);
        self.peaks.update(bands, dt);

        let orbit_speed = config.particle_orbit.speed(audio);
        let particle_size = config.particle_size.apply(audio);
        for particle in self.particles.iter_mut() {
            particle.orbit.advance(dt, orbit_speed * particle.speed_scale);
            particle.size = particle_size * (0.6 + 0.4 * particle.seed);
        }

        let spin = self.rotation.radians();
        for ray in self.rays.iter_mut() {
            let level = bands.get(ray.band).copied().unwrap_or(0.0);
            ray.angle = ray.base_angle + spin;
            ray.pulse.update(level, dt);
            ray.length = config.ray_length.apply_level(level);
        }

        let flow_speed = config.ribbon_flow.speed(audio);
        let ribbon_radius = config.ribbon_radius.apply(audio);
        for ribbon in self.ribbons.iter_mut() {
            ribbon.flow.advance(dt, flow_speed);
            ribbon.minor_radius = ribbon_radius;
        }

        let camera_offset = self.drift.advance(dt, audio.energy);

        self.frame = AnimationFrame {
            hue,
            rotation,
            beat_pulse: self.beat.value(),
            glow,
            glow_radius: config.glow_radius.apply(audio) * (1.0 + glow),
            bar_scale: config.bar_height.apply(audio),
            camera_offset,
            elapsed: self.elapsed as f32,
        };
        &self.frame
    }

    pub fn frame(&self) -> &AnimationFrame {
        &self.frame
    }

    pub fn particles(&self) -> &[ParticleState] {
        &self.particles
    }

    pub fn rays(&self) -> &[RayState] {
        &self.rays
    }

    pub fn ribbons(&self) -> &[RibbonState] {
        &self.ribbons
    }

    pub fn band_peaks(&self) -> &[f32] {
        self.peaks.peaks()
    }

    pub fn beat_triggers(&self) -> u64 {
        self.beat.triggers()
    }

    pub fn quality(&self) -> QualityPreset {
        self.quality
    }

    pub fn populations(&self) -> Populations {
        self.quality.populations()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }
}
