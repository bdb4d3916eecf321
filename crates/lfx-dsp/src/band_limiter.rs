//! Band-specific peak limiters
//!
//! Up to four parallel entries, each watching one frequency window
//! (cascaded HPF + LPF, two stages each, ~24 dB/oct) with an
//! instant-attack / 50 ms-release peak follower. Only the band content is
//! attenuated: `out = x + band * (gain - 1)`, so entries compose additively
//! and may overlap.

use std::sync::atomic::Ordering;

use lfx_core::{db_to_linear, BandLimiterParams, Sample, MAX_LIMITER_ENTRIES};

use crate::biquad::{Biquad, FilterType};

const STAGES: usize = 2;
const RELEASE_SECONDS: f32 = 0.05;

#[derive(Default)]
struct Entry {
    active: bool,
    limit_linear: f32,

    hpf: [[Biquad; STAGES]; 2],
    lpf: [[Biquad; STAGES]; 2],

    env_state: [f32; 2],
    release_coeff: f32,

    last_low_freq: f32,
    last_high_freq: f32,
}

#[derive(Default)]
pub struct BandLimiter {
    entries: [Entry; MAX_LIMITER_ENTRIES],
}

impl BandLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_params(&mut self, params: &BandLimiterParams, sample_rate: f32) {
        for (entry, ep) in self.entries.iter_mut().zip(&params.entries) {
            entry.active = ep.active.load(Ordering::Relaxed);
            if !entry.active {
                continue;
            }

            let low_freq = ep.low_freq.load(Ordering::Relaxed);
            let high_freq = ep.high_freq.load(Ordering::Relaxed);
            let limit_db = ep.limit_db.load(Ordering::Relaxed);

            entry.limit_linear = db_to_linear(limit_db);
            entry.release_coeff = (-1.0 / (RELEASE_SECONDS * sample_rate)).exp();

            if low_freq == entry.last_low_freq && high_freq == entry.last_high_freq {
                continue;
            }

            entry.last_low_freq = low_freq;
            entry.last_high_freq = high_freq;

            for ch in 0..2 {
                for s in 0..STAGES {
                    entry.hpf[ch][s].set_params(
                        FilterType::Highpass,
                        low_freq,
                        0.0,
                        0.707,
                        sample_rate,
                    );
                    entry.lpf[ch][s].set_params(
                        FilterType::Lowpass,
                        high_freq,
                        0.0,
                        0.707,
                        sample_rate,
                    );
                }
            }
        }
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        let channels = num_channels.min(2);

        for entry in self.entries.iter_mut().filter(|e| e.active) {
            for frame in 0..num_frames {
                for ch in 0..channels {
                    let idx = frame * num_channels + ch;
                    let input = buffer[idx];

                    let mut band = input;
                    for s in 0..STAGES {
                        band = entry.hpf[ch][s].process(band);
                    }
                    for s in 0..STAGES {
                        band = entry.lpf[ch][s].process(band);
                    }

                    let abs_val = band.abs();
                    if abs_val > entry.env_state[ch] {
                        entry.env_state[ch] = abs_val;
                    } else {
                        entry.env_state[ch] *= entry.release_coeff;
                    }

                    let mut gain = 1.0;
                    if entry.env_state[ch] > entry.limit_linear && entry.env_state[ch] > 1e-10 {
                        gain = entry.limit_linear / entry.env_state[ch];
                    }

                    buffer[idx] = input + band * (gain - 1.0);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            for ch in 0..2 {
                for s in 0..STAGES {
                    entry.hpf[ch][s].reset();
                    entry.lpf[ch][s].reset();
                }
                entry.env_state[ch] = 0.0;
            }
            entry.last_low_freq = 0.0;
            entry.last_high_freq = 0.0;
        }
    }
}
