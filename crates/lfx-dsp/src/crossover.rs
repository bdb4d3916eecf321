//! Sub-band crossover
//!
//! Extracts the band below `low_freq` as `x - HPF(x)`, optionally limits it
//! upwards with an LPF at `high_freq`, and mixes it back scaled by
//! `10^(subGainDb/20) - 1`, so a sub gain of 0 dB is an exact no-op.
//! Slopes map to filter structure: 6 dB/oct uses a one-pole lowpass,
//! 12/24/48 dB/oct use 1/2/4 cascaded biquads at Q = 1/sqrt(2).

use std::sync::atomic::Ordering;

use lfx_core::{db_to_linear, CrossoverParams, Sample};

use crate::biquad::{Biquad, FilterType};

const MAX_STAGES: usize = 4;
const BUTTERWORTH_Q: f32 = 0.707;

fn slope_to_stages(slope: u32) -> usize {
    match slope {
        6 => 0,
        12 => 1,
        24 => 2,
        48 => 4,
        _ => 2,
    }
}

pub struct Crossover {
    hpf: [[Biquad; MAX_STAGES]; 2],
    lpf: [[Biquad; MAX_STAGES]; 2],

    hpf_one_pole_state: [f32; 2],
    lpf_one_pole_state: [f32; 2],
    hpf_one_pole_coeff: f32,
    lpf_one_pole_coeff: f32,

    lpf_enabled: bool,
    hpf_slope: u32,
    lpf_slope: u32,
    hpf_stages: usize,
    lpf_stages: usize,
    sub_gain_linear: f32,

    last_low_freq: f32,
    last_high_freq: f32,
    last_hpf_slope: u32,
    last_lpf_slope: u32,
    last_sample_rate: f32,
}

impl Default for Crossover {
    fn default() -> Self {
        Self::new()
    }
}

impl Crossover {
    pub fn new() -> Self {
        Self {
            hpf: Default::default(),
            lpf: Default::default(),
            hpf_one_pole_state: [0.0; 2],
            lpf_one_pole_state: [0.0; 2],
            hpf_one_pole_coeff: 0.0,
            lpf_one_pole_coeff: 0.0,
            lpf_enabled: false,
            hpf_slope: 24,
            lpf_slope: 24,
            hpf_stages: 2,
            lpf_stages: 2,
            sub_gain_linear: 1.0,
            last_low_freq: 0.0,
            last_high_freq: 0.0,
            last_hpf_slope: 0,
            last_lpf_slope: 0,
            last_sample_rate: 0.0,
        }
    }

    pub fn update_params(&mut self, params: &CrossoverParams, sample_rate: f32) {
        let low_freq = params.low_freq.load(Ordering::Relaxed);
        let high_freq = params.high_freq.load(Ordering::Relaxed);
        let hpf_slope = params.hpf_slope.load(Ordering::Relaxed);
        let lpf_slope = params.lpf_slope.load(Ordering::Relaxed);

        self.sub_gain_linear = db_to_linear(params.sub_gain_db.load(Ordering::Relaxed));
        self.lpf_enabled = params.lpf_enabled.load(Ordering::Relaxed);
        self.hpf_slope = hpf_slope;
        self.lpf_slope = lpf_slope;

        let needs_update = low_freq != self.last_low_freq
            || high_freq != self.last_high_freq
            || hpf_slope != self.last_hpf_slope
            || lpf_slope != self.last_lpf_slope
            || sample_rate != self.last_sample_rate;

        if !needs_update {
            return;
        }

        self.last_low_freq = low_freq;
        self.last_high_freq = high_freq;
        self.last_hpf_slope = hpf_slope;
        self.last_lpf_slope = lpf_slope;
        self.last_sample_rate = sample_rate;

        self.hpf_stages = slope_to_stages(hpf_slope);
        if hpf_slope == 6 {
            self.hpf_one_pole_coeff =
                1.0 - (-2.0 * std::f32::consts::PI * low_freq / sample_rate).exp();
        } else {
            for ch in 0..2 {
                for s in 0..self.hpf_stages {
                    self.hpf[ch][s].set_params(
                        FilterType::Highpass,
                        low_freq,
                        0.0,
                        BUTTERWORTH_Q,
                        sample_rate,
                    );
                }
            }
        }

        self.lpf_stages = slope_to_stages(lpf_slope);
        if lpf_slope == 6 {
            self.lpf_one_pole_coeff =
                1.0 - (-2.0 * std::f32::consts::PI * high_freq / sample_rate).exp();
        } else {
            for ch in 0..2 {
                for s in 0..self.lpf_stages {
                    self.lpf[ch][s].set_params(
                        FilterType::Lowpass,
                        high_freq,
                        0.0,
                        BUTTERWORTH_Q,
                        sample_rate,
                    );
                }
            }
        }
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        let channels = num_channels.min(2);

        let extra_gain = self.sub_gain_linear - 1.0;
        if extra_gain.abs() < 0.001 {
            return;
        }

        for frame in 0..num_frames {
            for ch in 0..channels {
                let idx = frame * num_channels + ch;
                let original = buffer[idx];

                let hpf_out = if self.hpf_slope == 6 {
                    self.hpf_one_pole_state[ch] +=
                        self.hpf_one_pole_coeff * (original - self.hpf_one_pole_state[ch]);
                    original - self.hpf_one_pole_state[ch]
                } else {
                    let mut out = original;
                    for s in 0..self.hpf_stages {
                        out = self.hpf[ch][s].process(out);
                    }
                    out
                };

                let mut sub = original - hpf_out;

                if self.lpf_enabled {
                    if self.lpf_slope == 6 {
                        self.lpf_one_pole_state[ch] +=
                            self.lpf_one_pole_coeff * (sub - self.lpf_one_pole_state[ch]);
                        sub = self.lpf_one_pole_state[ch];
                    } else {
                        for s in 0..self.lpf_stages {
                            sub = self.lpf[ch][s].process(sub);
                        }
                    }
                }

                buffer[idx] = original + sub * extra_gain;
            }
        }
    }

    pub fn reset(&mut self) {
        for ch in 0..2 {
            for s in 0..MAX_STAGES {
                self.hpf[ch][s].reset();
                self.lpf[ch][s].reset();
            }
            self.hpf_one_pole_state[ch] = 0.0;
            self.lpf_one_pole_state[ch] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    fn make_params(low_freq: f32, sub_gain_db: f32) -> CrossoverParams {
        let params = CrossoverParams::default();
        params.low_freq.store(low_freq, Ordering::Relaxed);
        params.sub_gain_db.store(sub_gain_db, Ordering::Relaxed);
        params
    }

    #[test]
    fn test_zero_sub_gain_is_bit_identical() {
        let params = make_params(80.0, 0.0);
        let mut xover = Crossover::new();
        xover.update_params(&params, FS);

        let mut buffer: Vec<f32> = (0..512)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();
        let original = buffer.clone();
        xover.process(&mut buffer, 256, 2);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_sub_band_gain_below_corner() {
        let params = make_params(80.0, 6.0);
        let mut xover = Crossover::new();
        xover.update_params(&params, FS);

        // 50 Hz sine amp 0.1, entirely inside the sub band: output settles
        // near 0.1 * 10^(6/20)
        let frames = 48000;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.1 * (2.0 * std::f32::consts::PI * 50.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        xover.process(&mut buffer, frames, 2);

        let peak = buffer[frames..]
            .iter()
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        let expected = 0.1 * db_to_linear(6.0);
        assert!(
            (peak - expected).abs() / expected < 0.05,
            "peak {peak} vs expected {expected}"
        );
    }

    #[test]
    fn test_high_frequency_passes_unchanged() {
        let params = make_params(80.0, 12.0);
        let mut xover = Crossover::new();
        xover.update_params(&params, FS);

        // 5 kHz sine, far above the sub band: gain should be ~unity
        let frames = 24000;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.1 * (2.0 * std::f32::consts::PI * 5000.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        xover.process(&mut buffer, frames, 2);

        let peak = buffer[frames..]
            .iter()
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        assert!((peak - 0.1).abs() < 0.01, "peak {peak}");
    }

    #[test]
    fn test_slope_mapping() {
        assert_eq!(slope_to_stages(6), 0);
        assert_eq!(slope_to_stages(12), 1);
        assert_eq!(slope_to_stages(24), 2);
        assert_eq!(slope_to_stages(48), 4);
        // Unknown slopes fall back to 24 dB/oct
        assert_eq!(slope_to_stages(18), 2);
    }
}
