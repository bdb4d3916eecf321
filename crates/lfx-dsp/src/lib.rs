//! lfx-dsp: DSP stages for the LoopFX signal path
//!
//! Every stage processes interleaved f32 buffers in place and pulls its
//! parameters from the shared atomic bag immediately before processing.
//! Nothing here allocates or blocks inside `process` once constructed.
//!
//! ## Modules
//! - `biquad` - TDF-II biquad sections (lowpass, highpass, bandpass, peaking, shelving)
//! - `eq` - N-band parametric EQ with pre-amp
//! - `tone` - bass/treble shelf pair
//! - `crossover` - sub-band extraction and re-mix with selectable slope
//! - `band_limiter` - up to four band-specific peak limiters
//! - `spectral` - windowed FFT band-energy tracking
//! - `exciter` - high-frequency harmonic enhancement
//! - `multiband` - 9-band split with per-band compression and auto-balance
//! - `compressor` - feed-forward dynamics with knee, expander and gate
//! - `reverb` - parallel-comb / series-allpass reverberator
//! - `chain` - stage ordering and the final soft clipper

pub mod band_limiter;
pub mod biquad;
pub mod chain;
pub mod compressor;
pub mod crossover;
pub mod eq;
pub mod exciter;
pub mod multiband;
pub mod reverb;
pub mod spectral;
pub mod tone;

pub use band_limiter::BandLimiter;
pub use biquad::{Biquad, BiquadCoeffs, FilterType};
pub use chain::DspChain;
pub use compressor::Compressor;
pub use crossover::Crossover;
pub use eq::Equalizer;
pub use exciter::Exciter;
pub use multiband::{MultibandBand, MultibandProcessor, NUM_BANDS};
pub use reverb::Reverb;
pub use spectral::{SpectralAnalyzer, FFT_SIZE};
pub use tone::ToneStage;
