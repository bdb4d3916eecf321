//! Feed-forward dynamics compressor
//!
//! Peak detection on the stereo maximum (optionally through a sidechain
//! high-pass), envelope smoothing in the dB domain, soft-knee gain
//! computation with a downward gate and an upward expander below the knee.
//! Total reduction is capped at 96 dB.

use lfx_core::{db_to_linear, linear_to_db, CompressorSettings, Sample};

use crate::biquad::{Biquad, FilterType};

const MAX_REDUCTION_DB: f32 = 96.0;

pub struct Compressor {
    env_db: f32,

    attack_coeff: f32,
    release_coeff: f32,

    threshold_db: f32,
    ratio: f32,
    makeup_gain_linear: f32,
    volume_linear: f32,
    pre_gain_linear: f32,
    knee_db: f32,
    expansion_ratio: f32,
    gate_threshold_db: f32,

    sidechain_filter: [Biquad; 2],
    sidechain_freq: f32,
    sidechain_enabled: bool,

    gain_reduction_db: f32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    pub fn new() -> Self {
        Self {
            env_db: -96.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            threshold_db: -20.0,
            ratio: 4.0,
            makeup_gain_linear: 1.0,
            volume_linear: 1.0,
            pre_gain_linear: 1.0,
            knee_db: 0.0,
            expansion_ratio: 1.0,
            gate_threshold_db: -90.0,
            sidechain_filter: [Biquad::new(), Biquad::new()],
            sidechain_freq: 0.0,
            sidechain_enabled: false,
            gain_reduction_db: 0.0,
        }
    }

    pub fn update_params(&mut self, settings: &CompressorSettings, sample_rate: f32) {
        self.threshold_db = settings.threshold_db;
        self.ratio = settings.ratio.max(1.0);
        self.volume_linear = settings.volume;
        self.makeup_gain_linear = db_to_linear(settings.makeup_gain_db);
        self.pre_gain_linear = db_to_linear(settings.pre_gain_db);
        self.knee_db = settings.knee_db.max(0.0);
        self.expansion_ratio = settings.expansion_ratio.max(1.0);
        self.gate_threshold_db = settings.gate_threshold_db;

        let attack_ms = settings.attack_ms.max(0.01);
        let release_ms = settings.release_ms.max(0.01);
        self.attack_coeff = (-1.0 / (attack_ms * 0.001 * sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_ms * 0.001 * sample_rate)).exp();

        // Sidechain HPF engages above 20 Hz; recompute only on change
        if settings.sidechain_freq_hz != self.sidechain_freq {
            self.sidechain_freq = settings.sidechain_freq_hz;
            if self.sidechain_freq > 20.0 {
                self.sidechain_enabled = true;
                for filter in &mut self.sidechain_filter {
                    filter.set_params(
                        FilterType::Highpass,
                        self.sidechain_freq,
                        0.0,
                        0.707,
                        sample_rate,
                    );
                }
            } else {
                self.sidechain_enabled = false;
                for filter in &mut self.sidechain_filter {
                    filter.reset();
                }
            }
        }
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        let channels = num_channels.min(2);
        let mut max_compression = 0.0_f32;
        let knee_half = self.knee_db * 0.5;

        for frame in 0..num_frames {
            for ch in 0..num_channels {
                buffer[frame * num_channels + ch] *= self.pre_gain_linear;
            }

            let mut peak_level = 0.0_f32;
            for ch in 0..channels {
                let idx = frame * num_channels + ch;
                let mut sample = buffer[idx];
                if self.sidechain_enabled {
                    sample = self.sidechain_filter[ch].process(sample);
                }
                peak_level = peak_level.max(sample.abs());
            }

            let input_db = linear_to_db(peak_level);
            let coeff = if input_db > self.env_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.env_db = coeff * self.env_db + (1.0 - coeff) * input_db;

            let mut compression_db = 0.0;
            let mut total_reduction_db;

            if self.env_db <= self.gate_threshold_db {
                total_reduction_db = MAX_REDUCTION_DB;
            } else {
                let knee_bottom = self.threshold_db - knee_half;
                let knee_top = self.threshold_db + knee_half;

                if self.env_db >= knee_top {
                    let over_db = self.env_db - self.threshold_db;
                    compression_db = over_db * (1.0 - 1.0 / self.ratio);
                } else if self.knee_db > 0.0 && self.env_db > knee_bottom {
                    let x = self.env_db - knee_bottom;
                    compression_db = (1.0 - 1.0 / self.ratio) * (x * x) / (2.0 * self.knee_db);
                }

                total_reduction_db = compression_db;

                if compression_db <= 0.0
                    && self.expansion_ratio > 1.0
                    && self.env_db < knee_bottom
                {
                    let under_db = knee_bottom - self.env_db;
                    total_reduction_db = under_db * (1.0 - 1.0 / self.expansion_ratio);
                }
            }

            total_reduction_db = total_reduction_db.min(MAX_REDUCTION_DB);
            max_compression = max_compression.max(compression_db);

            let total_gain =
                db_to_linear(-total_reduction_db) * self.makeup_gain_linear * self.volume_linear;
            for ch in 0..num_channels {
                buffer[frame * num_channels + ch] *= total_gain;
            }
        }

        self.gain_reduction_db = max_compression;
    }

    /// Maximum compression observed during the last block, for the UI meter
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    pub fn reset(&mut self) {
        self.env_db = -96.0;
        for filter in &mut self.sidechain_filter {
            filter.reset();
        }
        self.gain_reduction_db = 0.0;
    }
}
