//! Windowed spectral analysis for the multiband auto-balance
//!
//! Keeps a rolling mono-mixed window, runs a real FFT (fixed-size plan,
//! zero allocation after construction) every quarter window, and tracks an
//! exponentially smoothed energy estimate per frequency band. Downstream
//! auto-balance only consumes energy *ratios*, so the FFT normalization
//! choice drops out.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use lfx_core::Sample;

/// Analysis window length in samples
pub const FFT_SIZE: usize = 4096;

/// Energy smoothing: energy <- OLD * energy + NEW * estimate
const ENERGY_OLD: f32 = 0.8;
const ENERGY_NEW: f32 = 0.2;

/// The nine fixed analysis bands in Hz
const BAND_EDGES: [(f32, f32); 9] = [
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

struct FrequencyBand {
    low_freq: f32,
    high_freq: f32,
    energy: f32,
}

pub struct SpectralAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    input_ring: Vec<f32>,
    window: Vec<f32>,
    scratch_windowed: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    bands: Vec<FrequencyBand>,

    sample_rate: f32,
    write_pos: usize,
    avg_energy: f32,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: f32) -> Self {
        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let spectrum_len = FFT_SIZE / 2 + 1;
        let fft_scratch = fft.make_scratch_vec();

        // Hann window
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos())
            })
            .collect();

        let bands = BAND_EDGES
            .iter()
            .map(|&(low_freq, high_freq)| FrequencyBand {
                low_freq,
                high_freq,
                energy: 0.0,
            })
            .collect();

        Self {
            fft,
            input_ring: vec![0.0; FFT_SIZE],
            window,
            scratch_windowed: vec![0.0; FFT_SIZE],
            spectrum: vec![Complex::new(0.0, 0.0); spectrum_len],
            fft_scratch,
            magnitudes: vec![0.0; FFT_SIZE / 2],
            bands,
            sample_rate,
            write_pos: 0,
            avg_energy: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Feed an interleaved buffer; re-analyzes every FFT_SIZE/4 samples
    pub fn process(&mut self, buffer: &[Sample], num_frames: usize, num_channels: usize) {
        for frame in 0..num_frames {
            let mut sample = 0.0;
            for ch in 0..num_channels {
                sample += buffer[frame * num_channels + ch];
            }
            sample /= num_channels as f32;

            self.input_ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;

            if self.write_pos % (FFT_SIZE / 4) == 0 {
                self.analyze();
                self.update_band_energies();
            }
        }
    }

    fn analyze(&mut self) {
        // Window in time order, starting at the oldest sample in the ring
        for i in 0..FFT_SIZE {
            let ring_idx = (self.write_pos + i) % FFT_SIZE;
            self.scratch_windowed[i] = self.input_ring[ring_idx] * self.window[i];
        }

        if self
            .fft
            .process_with_scratch(
                &mut self.scratch_windowed,
                &mut self.spectrum,
                &mut self.fft_scratch,
            )
            .is_err()
        {
            return;
        }

        let scale = 2.0 / FFT_SIZE as f32;
        for (magnitude, c) in self.magnitudes.iter_mut().zip(&self.spectrum) {
            *magnitude = (c.re * c.re + c.im * c.im).sqrt() * scale;
        }
    }

    fn update_band_energies(&mut self) {
        let bin_width = self.sample_rate / FFT_SIZE as f32;
        let max_bin = self.magnitudes.len() - 1;

        for band in &mut self.bands {
            let start_bin = ((band.low_freq / bin_width) as usize).min(max_bin);
            let end_bin = ((band.high_freq / bin_width) as usize).min(max_bin);

            let count = end_bin - start_bin + 1;
            let sum: f32 = self.magnitudes[start_bin..=end_bin].iter().sum();
            let estimate = sum / count as f32;
            band.energy = band.energy * ENERGY_OLD + estimate * ENERGY_NEW;
        }

        let total: f32 = self.bands.iter().map(|b| b.energy).sum();
        self.avg_energy = total / self.bands.len() as f32;
    }

    /// Smoothed energy of the band enclosing the given frequency range
    pub fn band_energy(&self, low_freq: f32, high_freq: f32) -> f32 {
        for band in &self.bands {
            if band.low_freq <= low_freq && band.high_freq >= high_freq {
                return band.energy;
            }
        }
        0.0
    }

    pub fn average_energy(&self) -> f32 {
        self.avg_energy
    }

    pub fn reset(&mut self) {
        self.input_ring.fill(0.0);
        self.magnitudes.fill(0.0);
        for band in &mut self.bands {
            band.energy = 0.0;
        }
        self.avg_energy = 0.0;
        self.write_pos = 0;
    }
}
