//! High-frequency harmonic exciter
//!
//! High-passes the input, generates harmonic content from the high band
//! (tanh saturation for 2nd order, a cubic term for 3rd), and blends it
//! back on top of the dry signal.

use lfx_core::Sample;

use crate::biquad::{Biquad, FilterType};

const MIN_FREQ: f32 = 1000.0;
const MAX_FREQ: f32 = 16000.0;

pub struct Exciter {
    hpf_l: Biquad,
    hpf_r: Biquad,
    amount: f32,
    frequency: f32,
    sample_rate: f32,
    harmonic_order: u32,
}

impl Exciter {
    pub fn new(sample_rate: f32) -> Self {
        let mut exciter = Self {
            hpf_l: Biquad::new(),
            hpf_r: Biquad::new(),
            amount: 0.3,
            frequency: 4000.0,
            sample_rate,
            harmonic_order: 2,
        };
        exciter.set_frequency(exciter.frequency);
        exciter
    }

    pub fn init(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.set_frequency(self.frequency);
        self.reset();
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount;
    }

    pub fn set_frequency(&mut self, freq: f32) {
        self.frequency = freq.clamp(MIN_FREQ, MAX_FREQ);
        self.hpf_l.set_params(
            FilterType::Highpass,
            self.frequency,
            0.0,
            0.707,
            self.sample_rate,
        );
        self.hpf_r.set_params(
            FilterType::Highpass,
            self.frequency,
            0.0,
            0.707,
            self.sample_rate,
        );
    }

    pub fn set_harmonics(&mut self, order: u32) {
        self.harmonic_order = order;
    }

    #[inline]
    fn excite(high: f32, order: u32) -> f32 {
        let mut excited = high;
        if order >= 2 {
            excited = (high * 2.0).tanh() * 0.5;
        }
        if order >= 3 {
            excited += high * high * high * 0.3;
        }
        excited
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        if self.amount < 0.001 {
            return;
        }

        for frame in 0..num_frames {
            let idx = frame * num_channels;

            let dry_l = buffer[idx];
            let high_l = self.hpf_l.process(dry_l);
            buffer[idx] = dry_l + Self::excite(high_l, self.harmonic_order) * self.amount;

            if num_channels > 1 {
                let dry_r = buffer[idx + 1];
                let high_r = self.hpf_r.process(dry_r);
                buffer[idx + 1] = dry_r + Self::excite(high_r, self.harmonic_order) * self.amount;
            }
        }
    }

    pub fn reset(&mut self) {
        self.hpf_l.reset();
        self.hpf_r.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    #[test]
    fn test_zero_amount_is_passthrough() {
        let mut exciter = Exciter::new(FS);
        exciter.set_amount(0.0);

        let original: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut buffer = original.clone();
        exciter.process(&mut buffer, 128, 2);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_frequency_clamped() {
        let mut exciter = Exciter::new(FS);
        exciter.set_frequency(100.0);
        assert_eq!(exciter.frequency, MIN_FREQ);
        exciter.set_frequency(20000.0);
        assert_eq!(exciter.frequency, MAX_FREQ);
    }

    #[test]
    fn test_low_frequency_input_nearly_untouched() {
        let mut exciter = Exciter::new(FS);
        exciter.set_amount(0.5);
        exciter.set_frequency(4000.0);

        // 100 Hz content sits far below the HPF corner
        let frames = 9600;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.3 * (2.0 * std::f32::consts::PI * 100.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        let original = buffer.clone();
        exciter.process(&mut buffer, frames, 2);

        let max_delta = buffer
            .iter()
            .zip(&original)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_delta < 0.01, "delta {max_delta}");
    }

    #[test]
    fn test_adds_harmonic_content_above_corner() {
        let mut exciter = Exciter::new(FS);
        exciter.set_amount(0.5);
        exciter.set_frequency(2000.0);

        let frames = 9600;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.3 * (2.0 * std::f32::consts::PI * 6000.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        let original = buffer.clone();
        exciter.process(&mut buffer, frames, 2);

        let max_delta = buffer
            .iter()
            .zip(&original)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_delta > 0.01, "exciter had no effect");
    }
}
