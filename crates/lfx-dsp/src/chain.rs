//! DSP chain orchestration
//!
//! Fixed stage order per block:
//! EQ -> Tone -> Crossover -> BandLimiter -> Multiband -> Compressor ->
//! Reverb -> soft clip. Each stage is gated by its enabled flag and pulls a
//! fresh parameter snapshot immediately before processing, so the audio
//! thread sees coherent values at stage boundaries. The final soft clipper
//! is unconditional and bounds the output below 1.0.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use lfx_core::{BandParam, CompressorSettings, Sample, SharedParams};

use crate::band_limiter::BandLimiter;
use crate::compressor::Compressor;
use crate::crossover::Crossover;
use crate::eq::Equalizer;
use crate::multiband::MultibandProcessor;
use crate::reverb::Reverb;
use crate::tone::ToneStage;

const CLIP_THRESHOLD: f32 = 0.9;
const CLIP_HEADROOM: f32 = 1.0 - CLIP_THRESHOLD;

pub struct DspChain {
    params: Arc<SharedParams>,
    bands: Arc<Vec<BandParam>>,

    equalizer: Equalizer,
    tone: ToneStage,
    crossover: Crossover,
    band_limiter: BandLimiter,
    multiband: MultibandProcessor,
    compressor: Compressor,
    reverb: Reverb,
    reverb_sample_rate: f32,
}

impl DspChain {
    /// Build the chain for the given sample rate. The EQ band layout is
    /// captured here; structural band changes require rebuilding the chain
    /// (which the engine does on every start).
    pub fn new(params: Arc<SharedParams>, sample_rate: f32) -> Self {
        let bands = params.eq.bands();
        Self {
            params,
            bands,
            equalizer: Equalizer::new(),
            tone: ToneStage::new(),
            crossover: Crossover::new(),
            band_limiter: BandLimiter::new(),
            multiband: MultibandProcessor::new(sample_rate),
            compressor: Compressor::new(),
            reverb: Reverb::new(sample_rate),
            reverb_sample_rate: sample_rate,
        }
    }

    pub fn process(
        &mut self,
        buffer: &mut [Sample],
        num_frames: usize,
        num_channels: usize,
        sample_rate: f32,
    ) {
        if self.params.bypass_all.load(Ordering::Relaxed) {
            return;
        }

        if self.params.eq.enabled.load(Ordering::Relaxed) {
            let preamp_db = self.params.eq.preamp_db.load(Ordering::Relaxed);
            self.equalizer
                .update_params(&self.bands, preamp_db, sample_rate);
            self.equalizer.process(buffer, num_frames, num_channels);
        }

        self.tone.update_params(&self.params.tone, sample_rate);
        self.tone.process(buffer, num_frames, num_channels);

        if self.params.crossover.enabled.load(Ordering::Relaxed) {
            self.crossover
                .update_params(&self.params.crossover, sample_rate);
            self.crossover.process(buffer, num_frames, num_channels);
        }

        if self.params.band_limiter.enabled.load(Ordering::Relaxed) {
            self.band_limiter
                .update_params(&self.params.band_limiter, sample_rate);
            self.band_limiter.process(buffer, num_frames, num_channels);
        }

        if self.params.multiband.enabled.load(Ordering::Relaxed) {
            self.multiband.update_params(&self.params.multiband);
            self.multiband
                .process(buffer, num_frames, num_channels, sample_rate);
        }

        if self.params.compressor.enabled.load(Ordering::Relaxed) {
            let settings = CompressorSettings::snapshot(&self.params.compressor);
            self.compressor.update_params(&settings, sample_rate);
            self.compressor.process(buffer, num_frames, num_channels);
        }

        if self.params.reverb.enabled.load(Ordering::Relaxed) {
            if sample_rate != self.reverb_sample_rate {
                log::debug!("reverb: reinitializing for {sample_rate} Hz");
                self.reverb.init(sample_rate);
                self.reverb_sample_rate = sample_rate;
            }
            self.reverb.update_params(&self.params.reverb);
            self.reverb.process(buffer, num_frames, num_channels);
        }

        soft_clip(&mut buffer[..num_frames * num_channels]);
    }

    /// Gain reduction of the main compressor during the last block
    pub fn gain_reduction_db(&self) -> f32 {
        self.compressor.gain_reduction_db()
    }

    pub fn multiband_mut(&mut self) -> &mut MultibandProcessor {
        &mut self.multiband
    }

    pub fn reset(&mut self) {
        self.equalizer.reset();
        self.tone.reset();
        self.crossover.reset();
        self.band_limiter.reset();
        self.multiband.reset();
        self.compressor.reset();
        self.reverb.reset();
    }
}

/// Limiter of last resort: folds everything above 0.9 through tanh so the
/// output magnitude stays strictly below 1.0 for any input.
#[inline]
fn soft_clip(buffer: &mut [Sample]) {
    for sample in buffer {
        let x = *sample;
        let ax = x.abs();
        if ax > CLIP_THRESHOLD {
            let over = (ax - CLIP_THRESHOLD) / CLIP_HEADROOM;
            *sample = x.signum() * (CLIP_THRESHOLD + CLIP_HEADROOM * over.tanh());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    fn disabled_params() -> Arc<SharedParams> {
        let params = SharedParams::new();
        params.eq.enabled.store(false, Ordering::Relaxed);
        params.tone.bass_enabled.store(false, Ordering::Relaxed);
        params.tone.treble_enabled.store(false, Ordering::Relaxed);
        params.crossover.enabled.store(false, Ordering::Relaxed);
        params.band_limiter.enabled.store(false, Ordering::Relaxed);
        params.multiband.enabled.store(false, Ordering::Relaxed);
        params.compressor.enabled.store(false, Ordering::Relaxed);
        params.reverb.enabled.store(false, Ordering::Relaxed);
        Arc::new(params)
    }

    #[test]
    fn test_all_disabled_is_passthrough() {
        let params = disabled_params();
        let mut chain = DspChain::new(params, FS);

        let frames = 2048;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.1 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        let original = buffer.clone();
        chain.process(&mut buffer, frames, 2, FS);

        for (a, b) in buffer.iter().zip(&original) {
            assert!((a - b).abs() < 1e-7);
        }
    }

    #[test]
    fn test_bypass_all_short_circuits() {
        let params = disabled_params();
        params.compressor.enabled.store(true, Ordering::Relaxed);
        params.bypass_all.store(true, Ordering::Relaxed);

        let mut chain = DspChain::new(params, FS);
        let mut buffer = vec![0.5_f32; 256 * 2];
        let original = buffer.clone();
        chain.process(&mut buffer, 256, 2, FS);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_soft_clip_bounds_output() {
        let params = disabled_params();
        let mut chain = DspChain::new(params, FS);

        let frames = 1024;
        let mut buffer = vec![0.0_f32; frames * 2];
        for (i, sample) in buffer.iter_mut().enumerate() {
            // Sweep up to +/-10.0
            *sample = ((i as f32 / 100.0).sin()) * 10.0;
        }
        chain.process(&mut buffer, frames, 2, FS);

        // tanh saturates to 1.0 in f32 for extreme overdrive, so the bound
        // is <= at the representation level
        for &s in &buffer {
            assert!(s.abs() <= 1.0, "sample {s} escaped the clipper");
        }
    }

    #[test]
    fn test_soft_clip_identity_below_threshold() {
        let mut buffer = vec![0.0_f32, 0.5, -0.89, 0.9, -0.3];
        let original = buffer.clone();
        soft_clip(&mut buffer);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_soft_clip_is_monotone_above_threshold() {
        let mut previous = 0.0;
        for i in 0..1000 {
            let mut buffer = [0.9 + i as f32 * 0.01];
            soft_clip(&mut buffer);
            assert!(buffer[0] >= previous);
            assert!(buffer[0] <= 1.0);
            previous = buffer[0];
        }
    }

    #[test]
    fn test_preamp_through_chain() {
        let params = disabled_params();
        params.eq.enabled.store(true, Ordering::Relaxed);
        params.eq.preamp_db.store(6.0, Ordering::Relaxed);

        let mut chain = DspChain::new(params, FS);
        let frames = 512;
        let mut buffer = vec![0.1_f32; frames * 2];
        chain.process(&mut buffer, frames, 2, FS);

        let expected = 0.1 * lfx_core::db_to_linear(6.0);
        for &s in &buffer {
            assert!((s - expected).abs() < 1e-4, "sample {s} vs {expected}");
        }
    }

    #[test]
    fn test_gain_reduction_exposed() {
        let params = disabled_params();
        params.compressor.enabled.store(true, Ordering::Relaxed);
        params.compressor.pre_gain_db.store(0.0, Ordering::Relaxed);
        params.compressor.attack_ms.store(0.01, Ordering::Relaxed);
        params.compressor.release_ms.store(0.01, Ordering::Relaxed);
        params.compressor.ratio.store(2.0, Ordering::Relaxed);

        let mut chain = DspChain::new(params, FS);
        let frames = 4800;
        let mut buffer = vec![lfx_core::db_to_linear(-10.0); frames * 2];
        chain.process(&mut buffer, frames, 2, FS);

        assert!((chain.gain_reduction_db() - 5.0).abs() < 0.5);
    }
}
