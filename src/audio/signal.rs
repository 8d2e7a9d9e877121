use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::TAU;

const PAD_VOICES: [f32; 2] = [220.0, 330.0];
const DEFAULT_BPM: f32 = 120.0;

/// Deterministic music-like mono source: a sustained pad, a kick on every
/// beat and noise hi-hats on the off-beats.
pub struct TestSignal {
    sample_rate: f32,
    bpm: f32,
    position: u64,
    pad_phase: [f32; 2],
    rng: StdRng,
    silent: bool,
}

impl TestSignal {
    pub fn new(sample_rate: f32, bpm: f32, seed: u64) -> Self {
        Self {
            sample_rate: sample_rate.max(1.0),
            bpm: if bpm.is_finite() {
                bpm.clamp(30.0, 300.0)
            } else {
                DEFAULT_BPM
            },
            position: 0,
            pad_phase: [0.0; 2],
            rng: StdRng::seed_from_u64(seed),
            silent: false,
        }
    }

    pub fn silence(sample_rate: f32) -> Self {
        Self {
            silent: true,
            ..Self::new(sample_rate, DEFAULT_BPM, 0)
        }
    }

    pub fn fill(&mut self, out: &mut [f32]) {
        if self.silent {
            out.fill(0.0);
            self.position += out.len() as u64;
            return;
        }

        let beat_len = 60.0 / self.bpm;
        for sample in out.iter_mut() {
            let t = (self.position as f64 / self.sample_rate as f64) as f32;
            let since_beat = t % beat_len;

            let kick = (TAU * 55.0 * since_beat).sin() * (-since_beat * 10.0).exp();

            let since_offbeat = since_beat - beat_len / 2.0;
            let hat = if (0.0..0.05).contains(&since_offbeat) {
                self.rng.random_range(-1.0f32..1.0) * (-since_offbeat * 60.0).exp() * 0.25
            } else {
                0.0
            };

            let mut pad = 0.0;
            for (phase, freq) in self.pad_phase.iter_mut().zip(PAD_VOICES) {
                pad += (TAU * *phase).sin();
                *phase = (*phase + freq / self.sample_rate).fract();
            }
            pad *= 0.075;

            *sample = ((kick + hat + pad) * 0.8).clamp(-1.0, 1.0);
            self.position += 1;
        }
    }

    /// Seconds of signal emitted so far.
    pub fn elapsed(&self) -> f32 {
        self.position as f32 / self.sample_rate
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
