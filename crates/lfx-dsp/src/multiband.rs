//! Nine-band spectral processor with auto-balance
//!
//! Splits the signal into nine fixed bands (the sub-bass band has a
//! user-movable range), compresses each band, applies a smoothed per-band
//! gain driven either by the spectral auto-balance or by the manual band
//! gain, sums the bands back together, then runs the exciter and the output
//! gain. Bands are processed sequentially into pre-allocated scratch
//! buffers; the audio callback never allocates here.

use std::sync::atomic::Ordering;

use lfx_core::{
    db_to_linear, CompressorSettings, MultibandParams, Sample, MAX_BLOCK_SIZE,
};

use crate::biquad::{Biquad, FilterType};
use crate::compressor::Compressor;
use crate::exciter::Exciter;
use crate::spectral::SpectralAnalyzer;

pub const NUM_BANDS: usize = 9;

const BAND_Q: f32 = 0.707;

/// Default band edges in Hz; band 0 is the movable sub-bass band
const DEFAULT_BANDS: [(f32, f32); NUM_BANDS] = [
    (30.0, 250.0),
    (250.0, 500.0),
    (500.0, 1000.0),
    (1000.0, 2000.0),
    (2000.0, 4000.0),
    (4000.0, 8000.0),
    (8000.0, 12000.0),
    (12000.0, 16000.0),
    (16000.0, 20000.0),
];

/// One frequency band's public state
#[derive(Debug, Clone)]
pub struct MultibandBand {
    pub low_freq: f32,
    pub high_freq: f32,
    pub enabled: bool,
    pub manual_gain_db: f32,
    pub energy: f32,
}

struct BandProcessor {
    hpf_l: Biquad,
    hpf_r: Biquad,
    lpf_l: Biquad,
    lpf_r: Biquad,
    compressor: Compressor,
    current_gain: f32,
    target_gain: f32,
}

impl BandProcessor {
    fn new() -> Self {
        Self {
            hpf_l: Biquad::new(),
            hpf_r: Biquad::new(),
            lpf_l: Biquad::new(),
            lpf_r: Biquad::new(),
            compressor: Compressor::new(),
            current_gain: 1.0,
            target_gain: 1.0,
        }
    }
}

pub struct MultibandProcessor {
    bands: Vec<MultibandBand>,
    processors: Vec<BandProcessor>,
    analyzer: SpectralAnalyzer,
    exciter: Exciter,
    band_scratch: Vec<Vec<f32>>,

    sample_rate: f32,
    auto_balance: bool,
    auto_balance_speed: f32,
    global_compression: f32,
    output_gain_db: f32,
    sub_bass_boost_db: f32,
    sub_bass_low_freq: f32,
    sub_bass_high_freq: f32,
    sub_bass_range_changed: bool,
}

impl MultibandProcessor {
    pub fn new(sample_rate: f32) -> Self {
        let bands = DEFAULT_BANDS
            .iter()
            .map(|&(low_freq, high_freq)| MultibandBand {
                low_freq,
                high_freq,
                enabled: true,
                manual_gain_db: 0.0,
                energy: 0.0,
            })
            .collect();

        let scratch_len = MAX_BLOCK_SIZE as usize * 2;
        let mut processor = Self {
            bands,
            processors: (0..NUM_BANDS).map(|_| BandProcessor::new()).collect(),
            analyzer: SpectralAnalyzer::new(sample_rate),
            exciter: Exciter::new(sample_rate),
            band_scratch: (0..NUM_BANDS).map(|_| vec![0.0; scratch_len]).collect(),
            sample_rate,
            auto_balance: true,
            auto_balance_speed: 0.1,
            global_compression: 0.5,
            output_gain_db: 0.0,
            sub_bass_boost_db: 10.0,
            sub_bass_low_freq: 30.0,
            sub_bass_high_freq: 250.0,
            sub_bass_range_changed: false,
        };
        processor.init(sample_rate);
        processor
    }

    fn init(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.analyzer.set_sample_rate(sample_rate);
        self.exciter.init(sample_rate);

        for proc in &mut self.processors {
            proc.current_gain = 1.0;
            proc.target_gain = 1.0;
        }

        self.update_filters();
    }

    /// Pull the published parameters; structural only for the sub-bass range
    pub fn update_params(&mut self, params: &MultibandParams) {
        self.auto_balance = params.auto_balance.load(Ordering::Relaxed);
        self.auto_balance_speed = params.auto_balance_speed.load(Ordering::Relaxed);
        self.global_compression = params.compression.load(Ordering::Relaxed);
        self.output_gain_db = params.output_gain_db.load(Ordering::Relaxed);
        self.sub_bass_boost_db = params.sub_bass_boost_db.load(Ordering::Relaxed);
        self.exciter
            .set_amount(params.exciter_amount.load(Ordering::Relaxed));
        self.set_sub_bass_range(
            params.sub_bass_low_freq.load(Ordering::Relaxed),
            params.sub_bass_high_freq.load(Ordering::Relaxed),
        );
    }

    pub fn set_sub_bass_range(&mut self, low_freq: f32, high_freq: f32) {
        let mut low_freq = low_freq.clamp(20.0, 100.0);
        let high_freq = high_freq.clamp(100.0, 500.0);

        if low_freq >= high_freq {
            low_freq = high_freq - 10.0;
        }

        if self.sub_bass_low_freq != low_freq || self.sub_bass_high_freq != high_freq {
            self.sub_bass_low_freq = low_freq;
            self.sub_bass_high_freq = high_freq;
            self.sub_bass_range_changed = true;

            self.bands[0].low_freq = low_freq;
            self.bands[0].high_freq = high_freq;
        }
    }

    pub fn set_band_manual_gain(&mut self, band: usize, gain_db: f32) {
        if let Some(b) = self.bands.get_mut(band) {
            b.manual_gain_db = gain_db;
        }
    }

    pub fn set_band_enabled(&mut self, band: usize, enabled: bool) {
        if let Some(b) = self.bands.get_mut(band) {
            b.enabled = enabled;
        }
    }

    pub fn band(&self, idx: usize) -> &MultibandBand {
        &self.bands[idx]
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    fn update_filters(&mut self) {
        for (band, proc) in self.bands.iter().zip(&mut self.processors) {
            proc.hpf_l
                .set_params(FilterType::Highpass, band.low_freq, 0.0, BAND_Q, self.sample_rate);
            proc.hpf_r
                .set_params(FilterType::Highpass, band.low_freq, 0.0, BAND_Q, self.sample_rate);
            proc.lpf_l
                .set_params(FilterType::Lowpass, band.high_freq, 0.0, BAND_Q, self.sample_rate);
            proc.lpf_r
                .set_params(FilterType::Lowpass, band.high_freq, 0.0, BAND_Q, self.sample_rate);
        }

        self.sub_bass_range_changed = false;
    }

    fn update_band_gains(&mut self) {
        let avg_energy = self.analyzer.average_energy();
        let alpha = self.auto_balance_speed * 0.01;

        for (band, proc) in self.bands.iter_mut().zip(&mut self.processors) {
            let manual_gain = db_to_linear(band.manual_gain_db);

            if self.auto_balance {
                if avg_energy < 0.0001 {
                    continue;
                }
                let energy = self.analyzer.band_energy(band.low_freq, band.high_freq);
                band.energy = energy;

                let energy_ratio = energy / (avg_energy + 0.0001);
                let balance_gain = (1.0 / (energy_ratio + 0.5).sqrt()).clamp(0.5, 2.0);
                proc.target_gain = balance_gain * manual_gain;
            } else {
                proc.target_gain = manual_gain;
            }

            proc.current_gain = proc.current_gain * (1.0 - alpha) + proc.target_gain * alpha;
        }
    }

    pub fn process(
        &mut self,
        buffer: &mut [Sample],
        num_frames: usize,
        num_channels: usize,
        sample_rate: f32,
    ) {
        if sample_rate != self.sample_rate {
            log::debug!("multiband: reinitializing for {sample_rate} Hz");
            self.init(sample_rate);
        }

        if self.sub_bass_range_changed {
            self.update_filters();
        }

        self.analyzer.process(buffer, num_frames, num_channels);
        self.update_band_gains();

        let total_samples = num_frames * num_channels;
        let comp_settings = CompressorSettings {
            ratio: 1.0 + self.global_compression * 3.0,
            threshold_db: -12.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            knee_db: 3.0,
            ..CompressorSettings::default()
        };
        let compress = self.global_compression > 0.01;

        for (b, (band, proc)) in self.bands.iter().zip(&mut self.processors).enumerate() {
            if !band.enabled {
                continue;
            }

            let scratch = &mut self.band_scratch[b];
            if scratch.len() < total_samples {
                scratch.resize(total_samples, 0.0);
            }
            scratch[..total_samples].copy_from_slice(&buffer[..total_samples]);

            for frame in 0..num_frames {
                let idx = frame * num_channels;
                let mut l = scratch[idx];
                l = proc.hpf_l.process(l);
                l = proc.lpf_l.process(l);
                scratch[idx] = l;

                if num_channels > 1 {
                    let mut r = scratch[idx + 1];
                    r = proc.hpf_r.process(r);
                    r = proc.lpf_r.process(r);
                    scratch[idx + 1] = r;
                }
            }

            if compress {
                proc.compressor.update_params(&comp_settings, sample_rate);
                proc.compressor
                    .process(&mut scratch[..total_samples], num_frames, num_channels);
            }

            let mut gain = proc.current_gain;
            if b == 0 {
                gain *= db_to_linear(self.sub_bass_boost_db);
            }

            for sample in &mut scratch[..total_samples] {
                *sample *= gain;
            }
        }

        buffer[..total_samples].fill(0.0);
        for (b, band) in self.bands.iter().enumerate() {
            if !band.enabled {
                continue;
            }
            for (out, &s) in buffer[..total_samples]
                .iter_mut()
                .zip(&self.band_scratch[b][..total_samples])
            {
                *out += s;
            }
        }

        self.exciter.process(buffer, num_frames, num_channels);

        let output_gain = db_to_linear(self.output_gain_db);
        for sample in &mut buffer[..total_samples] {
            *sample *= output_gain;
        }
    }

    pub fn reset(&mut self) {
        for proc in &mut self.processors {
            proc.hpf_l.reset();
            proc.hpf_r.reset();
            proc.lpf_l.reset();
            proc.lpf_r.reset();
            proc.compressor.reset();
            proc.current_gain = 1.0;
            proc.target_gain = 1.0;
        }
        self.analyzer.reset();
        self.exciter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    fn neutral_params() -> MultibandParams {
        let params = MultibandParams::default();
        params.auto_balance.store(false, Ordering::Relaxed);
        params.compression.store(0.0, Ordering::Relaxed);
        params.exciter_amount.store(0.0, Ordering::Relaxed);
        params.sub_bass_boost_db.store(0.0, Ordering::Relaxed);
        params
    }

    fn run_sine(mb: &mut MultibandProcessor, freq: f32, amp: f32, frames: usize) -> Vec<f32> {
        let block = 1024;
        let mut buffer = vec![0.0_f32; block * 2];
        let mut out = Vec::with_capacity(frames * 2);
        let mut n = 0usize;
        while n < frames {
            for i in 0..block {
                let x = amp * (2.0 * std::f32::consts::PI * freq * (n + i) as f32 / FS).sin();
                buffer[i * 2] = x;
                buffer[i * 2 + 1] = x;
            }
            mb.process(&mut buffer, block, 2, FS);
            out.extend_from_slice(&buffer);
            n += block;
        }
        out
    }

    #[test]
    fn test_band_split_reconstructs_tone_near_unity() {
        let params = neutral_params();
        let mut mb = MultibandProcessor::new(FS);
        mb.update_params(&params);

        // 60 Hz lives cleanly inside the sub-bass band (the neighbours
        // start at 250 Hz), so the sum should track the input level
        let out = run_sine(&mut mb, 60.0, 0.1, 48000);
        let peak = out[48000..].iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        assert!(
            peak > 0.05 && peak < 0.2,
            "peak {peak} far from input level"
        );
    }

    #[test]
    fn test_sub_bass_range_clamped() {
        let mut mb = MultibandProcessor::new(FS);
        mb.set_sub_bass_range(5.0, 1000.0);
        assert_eq!(mb.band(0).low_freq, 20.0);
        assert_eq!(mb.band(0).high_freq, 500.0);

        mb.set_sub_bass_range(100.0, 100.0);
        assert_eq!(mb.band(0).low_freq, 90.0);
        assert_eq!(mb.band(0).high_freq, 100.0);
    }

    #[test]
    fn test_sub_bass_boost_applies_to_first_band() {
        let params = neutral_params();
        params.sub_bass_boost_db.store(12.0, Ordering::Relaxed);

        let mut mb = MultibandProcessor::new(FS);
        mb.update_params(&params);

        let boosted = run_sine(&mut mb, 60.0, 0.05, 48000);
        let peak = boosted[48000..]
            .iter()
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        // 60 Hz sits in the sub-bass band: expect clearly more than unity
        assert!(peak > 0.05 * 2.0, "peak {peak} not boosted");
    }

    #[test]
    fn test_disabled_band_removed_from_sum() {
        let params = neutral_params();
        let mut mb = MultibandProcessor::new(FS);
        mb.update_params(&params);

        // Disable the sub-bass band; 60 Hz should mostly vanish, leaving
        // only edge leakage from the 250 Hz neighbour
        mb.set_band_enabled(0, false);
        let out = run_sine(&mut mb, 60.0, 0.1, 48000);
        let peak = out[48000..].iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        assert!(peak < 0.02, "peak {peak} should be mostly removed");
    }

    #[test]
    fn test_manual_gain_without_auto_balance() {
        let params = neutral_params();
        params.auto_balance_speed.store(100.0, Ordering::Relaxed);

        let mut mb = MultibandProcessor::new(FS);
        mb.update_params(&params);
        mb.set_band_manual_gain(0, -96.0);

        let out = run_sine(&mut mb, 60.0, 0.1, 96000);
        let peak = out[96000..].iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        assert!(peak < 0.02, "peak {peak} not attenuated by manual gain");
    }
}
