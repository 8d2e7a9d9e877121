use std::ops::Range;

use super::DEFAULT_SAMPLE_RATE;

/// Lower edge of the lowest perceptual band.
pub const MIN_BAND_HZ: f32 = 32.0;
/// Upper edge of the highest band, further limited by Nyquist.
pub const MAX_BAND_HZ: f32 = 16_000.0;

/// Half-open span of FFT bins `[start, end)` belonging to one band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRange {
    pub start: usize,
    pub end: usize,
}

impl BandRange {
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn bins(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Static mapping from linear FFT bins to logarithmically spaced bands.
///
/// A map is a pure function of `(bin_count, band_count, sample_rate)`. The
/// extractor keeps one cached and rebuilds it when any of the three inputs
/// changes or when [`BandMap::is_stale_for`] reports a shape mismatch.
///
/// Low bands are narrow (often a single bin) and high bands wide, so the
/// visual weight of each band tracks pitch rather than raw bin index.
#[derive(Debug, Clone, PartialEq)]
pub struct BandMap {
    bin_count: usize,
    band_count: usize,
    sample_rate: f32,
    bands: Vec<BandRange>,
}

impl BandMap {
    pub fn build(bin_count: usize, band_count: usize, sample_rate: f32) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };

        if bin_count == 0 || band_count == 0 {
            return Self {
                bin_count,
                band_count,
                sample_rate,
                bands: Vec::new(),
            };
        }

        let nyquist = sample_rate / 2.0;
        let f_max = MAX_BAND_HZ.min(nyquist);
        let ratio = f_max / MIN_BAND_HZ;
        let last_bin = bin_count - 1;
        let to_bin = |hz: f32| hz / nyquist * bin_count as f32;

        let bands = (0..band_count)
            .map(|i| {
                let t0 = i as f32 / band_count as f32;
                let t1 = (i + 1) as f32 / band_count as f32;
                let f0 = MIN_BAND_HZ * ratio.powf(t0);
                let f1 = MIN_BAND_HZ * ratio.powf(t1);

                // The first band also owns DC and everything below MIN_BAND_HZ.
                let start = if i == 0 {
                    0
                } else {
                    (to_bin(f0).floor() as usize).min(last_bin)
                };
                let end = (to_bin(f1).ceil() as usize).min(last_bin).max(start + 1);

                BandRange { start, end }
            })
            .collect();

        Self {
            bin_count,
            band_count,
            sample_rate,
            bands,
        }
    }

    /// True when this map was built from exactly these dimensions.
    pub fn matches(&self, bin_count: usize, band_count: usize, sample_rate: f32) -> bool {
        self.bin_count == bin_count
            && self.band_count == band_count
            && self.sample_rate == sample_rate
    }

    /// Cheap per-frame shape check against the incoming frame length.
    pub fn is_stale_for(&self, bin_count: usize) -> bool {
        self.bin_count != bin_count
            || self.bands.last().map_or(false, |band| band.end > bin_count)
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn bands(&self) -> &[BandRange] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BandRange> {
        self.bands.iter()
    }
}

pub fn build_band_map(bin_count: usize, band_count: usize, sample_rate: f32) -> BandMap {
    BandMap::build(bin_count, band_count, sample_rate)
}
