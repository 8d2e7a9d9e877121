use anyhow::{ensure, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::SILENCE_BYTE;

/// Native stand-in for the host's real-time analysis node.
///
/// Keeps the most recent `fft_size` mono samples and renders them as the two
/// byte frames the core consumes: smoothed dB magnitudes (`fft_size / 2`
/// bins) and a time-domain window centred on 128.
pub struct SpectrumAnalyser {
    sample_rate: f32,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,

    smoothing_time_constant: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize, sample_rate: f32) -> Result<Self> {
        ensure!(
            fft_size.is_power_of_two() && (32..=32768).contains(&fft_size),
            "FFT size must be a power of two in 32..=32768, got {}",
            fft_size
        );
        ensure!(
            sample_rate.is_finite() && sample_rate > 0.0,
            "sample rate must be positive, got {}",
            sample_rate
        );

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            sample_rate,
            fft_size,
            fft,
            window: Self::blackman_window(fft_size),
            history: vec![0.0; fft_size],
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        })
    }

    pub fn with_smoothing(mut self, time_constant: f32) -> Self {
        self.smoothing_time_constant = time_constant.clamp(0.0, 1.0);
        self
    }

    /// Set the dB range mapped onto 0..=255. Ignored unless `min < max`.
    pub fn with_decibel_range(mut self, min_decibels: f32, max_decibels: f32) -> Self {
        if min_decibels < max_decibels {
            self.min_decibels = min_decibels;
            self.max_decibels = max_decibels;
        }
        self
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let (a0, a1, a2) = (0.42, 0.5, 0.08);
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
            })
            .collect()
    }

    /// Append mono samples; only the newest `fft_size` are retained.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.len() >= self.fft_size {
            self.history
                .copy_from_slice(&samples[samples.len() - self.fft_size..]);
        } else {
            self.history.drain(..samples.len());
            self.history.extend_from_slice(samples);
        }
    }

    /// Run the FFT over the current window, fold it into the smoothed
    /// spectrum and write it as bytes. Slots past `bin_count` read as 0.
    pub fn frequency_bytes(&mut self, out: &mut [u8]) {
        self.compute_spectrum();

        let range = self.max_decibels - self.min_decibels;
        let bins = out.len().min(self.smoothed.len());
        let (head, tail) = out.split_at_mut(bins);
        for (byte, &magnitude) in head.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * magnitude.log10();
            let scaled = (db - self.min_decibels) / range * 255.0;
            *byte = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        tail.fill(0);
    }

    pub fn frequency_frame(&mut self) -> Vec<u8> {
        let mut out = vec![0u8; self.bin_count()];
        self.frequency_bytes(&mut out);
        out
    }

    /// Write the most recent `out.len()` samples as bytes, oldest first.
    /// Slots older than the retained window read as silence.
    pub fn waveform_bytes(&self, out: &mut [u8]) {
        let centre = SILENCE_BYTE as f32;
        let pad = out.len().saturating_sub(self.fft_size);
        let skip = self.fft_size.saturating_sub(out.len());
        let (silence, recent) = out.split_at_mut(pad);
        silence.fill(SILENCE_BYTE);
        for (byte, &sample) in recent.iter_mut().zip(self.history.iter().skip(skip)) {
            let value = centre * (1.0 + sample);
            *byte = if value.is_finite() {
                value.clamp(0.0, 255.0) as u8
            } else {
                SILENCE_BYTE
            };
        }
    }

    pub fn waveform_frame(&self) -> Vec<u8> {
        let mut out = vec![SILENCE_BYTE; self.fft_size];
        self.waveform_bytes(&mut out);
        out
    }

    fn compute_spectrum(&mut self) {
        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(self.history.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft.process(&mut self.buffer);

        let tau = self.smoothing_time_constant;
        let scale = 1.0 / self.fft_size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.buffer.iter()) {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}
