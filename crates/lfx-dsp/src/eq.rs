//! N-band parametric equalizer
//!
//! One biquad per band per channel (independent L/R stacks), with a
//! constant pre-amp applied ahead of the bands. Coefficients are only
//! recomputed when a band's gain or the sample rate actually changed;
//! shape, frequency and Q are structural and fixed while running.

use std::sync::atomic::Ordering;

use lfx_core::{db_to_linear, BandKind, BandParam, Sample};

use crate::biquad::{Biquad, FilterType};

pub struct Equalizer {
    filters_l: Vec<Biquad>,
    filters_r: Vec<Biquad>,
    last_gain_db: Vec<f32>,
    last_sample_rate: f32,
    preamp_linear: f32,
    initialized: bool,
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Equalizer {
    pub fn new() -> Self {
        Self {
            filters_l: Vec::new(),
            filters_r: Vec::new(),
            last_gain_db: Vec::new(),
            last_sample_rate: 0.0,
            preamp_linear: 1.0,
            initialized: false,
        }
    }

    fn map_filter_type(kind: BandKind) -> FilterType {
        match kind {
            BandKind::HighShelf => FilterType::HighShelf,
            BandKind::LowShelf => FilterType::LowShelf,
            BandKind::Peaking => FilterType::Peaking,
            BandKind::Bandpass => FilterType::Bandpass,
            BandKind::Highpass => FilterType::Highpass,
            BandKind::Lowpass => FilterType::Lowpass,
        }
    }

    /// Refresh filter coefficients from the published band parameters
    pub fn update_params(&mut self, bands: &[BandParam], preamp_db: f32, sample_rate: f32) {
        let num_bands = bands.len();
        let rate_changed = sample_rate != self.last_sample_rate;

        if num_bands != self.filters_l.len() {
            self.filters_l.resize_with(num_bands, Biquad::new);
            self.filters_r.resize_with(num_bands, Biquad::new);
            self.last_gain_db.resize(num_bands, -999.0);
            self.initialized = false;
        }

        self.preamp_linear = db_to_linear(preamp_db);

        for (band, bp) in bands.iter().enumerate() {
            let gain_db = bp.gain_db.load(Ordering::Relaxed);

            if !self.initialized || rate_changed || gain_db != self.last_gain_db[band] {
                let filter_type = Self::map_filter_type(bp.kind);
                self.filters_l[band].set_params(filter_type, bp.freq, gain_db, bp.q, sample_rate);
                self.filters_r[band].set_params(filter_type, bp.freq, gain_db, bp.q, sample_rate);
                self.last_gain_db[band] = gain_db;
            }
        }

        self.last_sample_rate = sample_rate;
        self.initialized = true;
    }

    /// Process an interleaved buffer in place. Channels beyond the first two
    /// pass through untouched.
    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        let channels = num_channels.min(2);

        for frame in 0..num_frames {
            for ch in 0..channels {
                let idx = frame * num_channels + ch;
                let mut sample = buffer[idx] * self.preamp_linear;

                let filters = if ch == 0 {
                    &mut self.filters_l
                } else {
                    &mut self.filters_r
                };
                for filter in filters.iter_mut() {
                    sample = filter.process(sample);
                }

                buffer[idx] = sample;
            }
        }
    }

    pub fn reset(&mut self) {
        for f in &mut self.filters_l {
            f.reset();
        }
        for f in &mut self.filters_r {
            f.reset();
        }
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    #[test]
    fn test_preamp_only() {
        let mut eq = Equalizer::new();
        eq.update_params(&[], 6.0, FS);

        let mut buffer = vec![0.1_f32; 256 * 2];
        eq.process(&mut buffer, 256, 2);

        let expected = 0.1 * db_to_linear(6.0);
        for &s in &buffer {
            assert!((s - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_peaking_band_boosts_center_frequency() {
        let bands = vec![BandParam::new(BandKind::Peaking, 1000.0, 1.0, 12.0)];
        let mut eq = Equalizer::new();
        eq.update_params(&bands, 0.0, FS);

        // 1 kHz sine at amplitude 0.05, measure steady-state peak
        let frames = 9600;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.05 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        eq.process(&mut buffer, frames, 2);

        let peak = buffer[frames..]
            .iter()
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        let expected = 0.05 * db_to_linear(12.0);
        assert!(
            (peak - expected).abs() / expected < 0.02,
            "peak {peak} vs expected {expected}"
        );
    }

    #[test]
    fn test_extra_channels_untouched() {
        let bands = vec![BandParam::new(BandKind::Peaking, 1000.0, 1.0, 12.0)];
        let mut eq = Equalizer::new();
        eq.update_params(&bands, 6.0, FS);

        let frames = 64;
        let mut buffer = vec![0.25_f32; frames * 4];
        eq.process(&mut buffer, frames, 4);

        for frame in 0..frames {
            assert_eq!(buffer[frame * 4 + 2], 0.25);
            assert_eq!(buffer[frame * 4 + 3], 0.25);
        }
    }

    #[test]
    fn test_band_count_change_reallocates() {
        let mut eq = Equalizer::new();
        eq.update_params(&[], 0.0, FS);
        assert_eq!(eq.filters_l.len(), 0);

        let bands = vec![
            BandParam::new(BandKind::LowShelf, 100.0, 0.7, 3.0),
            BandParam::new(BandKind::HighShelf, 8000.0, 0.7, -3.0),
        ];
        eq.update_params(&bands, 0.0, FS);
        assert_eq!(eq.filters_l.len(), 2);
        assert_eq!(eq.filters_r.len(), 2);
    }
}
