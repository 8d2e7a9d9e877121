use serde::{Deserialize, Serialize};

use crate::audio::{AudioField, AudioState};

/// Wrapping accumulator in [0, 1). Used for hue, orbit position and
/// rotation; wrapping keeps precision stable over long sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Phase(f32);

impl Phase {
    pub fn new(value: f32) -> Self {
        Self(wrap_unit(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// Angle in radians, [0, 2π).
    pub fn radians(&self) -> f32 {
        self.0 * std::f32::consts::TAU
    }

    pub fn advance(&mut self, dt: f32, speed: f32) -> f32 {
        self.0 = wrap_unit(self.0 + dt * speed);
        self.0
    }
}

/// Audio-coupled speed for a [`Phase`]: `base + gain * state[field]`, in
/// cycles per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseDriver {
    pub base_speed: f32,
    pub audio_gain: f32,
    pub field: AudioField,
}

impl PhaseDriver {
    pub fn speed(&self, audio: &AudioState) -> f32 {
        self.base_speed + self.audio_gain * audio.get(self.field)
    }

    pub fn drive(&self, phase: &mut Phase, audio: &AudioState, dt: f32) -> f32 {
        phase.advance(dt, self.speed(audio))
    }
}

/// Stateless audio scaling of a visual parameter: `base * (1 + gain * level)`.
#[inline]
pub fn modulate(base: f32, gain: f32, level: f32) -> f32 {
    base * (1.0 + gain * level)
}

fn wrap_unit(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let wrapped = value.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}
