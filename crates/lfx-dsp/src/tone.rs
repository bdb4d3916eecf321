//! Bass / treble tone shelves
//!
//! A low shelf and a high shelf per channel with independent enables. A
//! disabled shelf is bypassed rather than recomputed to unity, keeping its
//! delay registers warm so re-enabling does not click.

use std::sync::atomic::Ordering;

use lfx_core::{Sample, ToneParams};

use crate::biquad::{Biquad, FilterType};

pub struct ToneStage {
    bass: [Biquad; 2],
    treble: [Biquad; 2],
    bass_enabled: bool,
    treble_enabled: bool,

    // Last-seen parameter cache to avoid recomputing coefficients per block
    last_bass: (f32, f32, f32),
    last_treble: (f32, f32, f32),
    last_sample_rate: f32,
}

impl Default for ToneStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneStage {
    pub fn new() -> Self {
        Self {
            bass: [Biquad::new(), Biquad::new()],
            treble: [Biquad::new(), Biquad::new()],
            bass_enabled: false,
            treble_enabled: false,
            last_bass: (0.0, 0.0, -999.0),
            last_treble: (0.0, 0.0, -999.0),
            last_sample_rate: 0.0,
        }
    }

    pub fn update_params(&mut self, params: &ToneParams, sample_rate: f32) {
        let rate_changed = sample_rate != self.last_sample_rate;

        self.bass_enabled = params.bass_enabled.load(Ordering::Relaxed);
        self.treble_enabled = params.treble_enabled.load(Ordering::Relaxed);

        let bass = (
            params.bass_freq.load(Ordering::Relaxed),
            params.bass_q.load(Ordering::Relaxed),
            params.bass_gain_db.load(Ordering::Relaxed),
        );
        if rate_changed || bass != self.last_bass {
            for filter in &mut self.bass {
                filter.set_params(FilterType::LowShelf, bass.0, bass.2, bass.1, sample_rate);
            }
            self.last_bass = bass;
        }

        let treble = (
            params.treble_freq.load(Ordering::Relaxed),
            params.treble_q.load(Ordering::Relaxed),
            params.treble_gain_db.load(Ordering::Relaxed),
        );
        if rate_changed || treble != self.last_treble {
            for filter in &mut self.treble {
                filter.set_params(
                    FilterType::HighShelf,
                    treble.0,
                    treble.2,
                    treble.1,
                    sample_rate,
                );
            }
            self.last_treble = treble;
        }

        self.last_sample_rate = sample_rate;
    }

    /// Either shelf active?
    pub fn is_active(&self) -> bool {
        self.bass_enabled || self.treble_enabled
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        if !self.is_active() {
            return;
        }

        let channels = num_channels.min(2);

        for frame in 0..num_frames {
            for ch in 0..channels {
                let idx = frame * num_channels + ch;
                let mut sample = buffer[idx];
                if self.bass_enabled {
                    sample = self.bass[ch].process(sample);
                }
                if self.treble_enabled {
                    sample = self.treble[ch].process(sample);
                }
                buffer[idx] = sample;
            }
        }
    }

    pub fn reset(&mut self) {
        for filter in self.bass.iter_mut().chain(self.treble.iter_mut()) {
            filter.reset();
        }
        self.last_bass = (0.0, 0.0, -999.0);
        self.last_treble = (0.0, 0.0, -999.0);
        self.last_sample_rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    fn disabled_params() -> ToneParams {
        let params = ToneParams::default();
        params.bass_enabled.store(false, Ordering::Relaxed);
        params.treble_enabled.store(false, Ordering::Relaxed);
        params
    }

    #[test]
    fn test_disabled_is_passthrough() {
        let params = disabled_params();
        let mut tone = ToneStage::new();
        tone.update_params(&params, FS);

        let original = vec![0.3_f32; 128 * 2];
        let mut buffer = original.clone();
        tone.process(&mut buffer, 128, 2);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_bass_shelf_boosts_low_frequency() {
        let params = disabled_params();
        params.bass_enabled.store(true, Ordering::Relaxed);
        params.bass_freq.store(200.0, Ordering::Relaxed);
        params.bass_q.store(0.707, Ordering::Relaxed);
        params.bass_gain_db.store(12.0, Ordering::Relaxed);

        let mut tone = ToneStage::new();
        tone.update_params(&params, FS);

        // 30 Hz sine, well below the shelf corner: expect close to +12 dB
        let frames = 48000;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.05 * (2.0 * std::f32::consts::PI * 30.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        tone.process(&mut buffer, frames, 2);

        let peak = buffer[frames..]
            .iter()
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        let expected = 0.05 * lfx_core::db_to_linear(12.0);
        assert!(
            (peak - expected).abs() / expected < 0.05,
            "peak {peak} vs expected {expected}"
        );
    }

    #[test]
    fn test_state_survives_disable() {
        let params = disabled_params();
        params.bass_enabled.store(true, Ordering::Relaxed);

        let mut tone = ToneStage::new();
        tone.update_params(&params, FS);

        let mut buffer = vec![0.5_f32; 64 * 2];
        tone.process(&mut buffer, 64, 2);
        let state_before = tone.bass[0].clone();

        // Disabling and re-enabling must not disturb the filter registers
        params.bass_enabled.store(false, Ordering::Relaxed);
        tone.update_params(&params, FS);
        let mut buffer2 = vec![0.5_f32; 64 * 2];
        tone.process(&mut buffer2, 64, 2);

        params.bass_enabled.store(true, Ordering::Relaxed);
        tone.update_params(&params, FS);
        let state_after = tone.bass[0].clone();
        assert_eq!(format!("{state_before:?}"), format!("{state_after:?}"));
    }
}
