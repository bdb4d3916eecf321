//! Shared parameter exchange between the controller thread and the audio thread
//!
//! Every runtime-mutable scalar is an individual atomic read with relaxed
//! ordering; readers may observe any recently published value but never a
//! torn one. Composite data (the EQ band layout) is structural and may only
//! be swapped while the engine is stopped; the audio side clones the layout
//! `Arc` when the chain is built and afterwards touches only the per-band
//! gain atomics inside it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use portable_atomic::AtomicF32;

use crate::DEFAULT_BLOCK_SIZE;

/// Maximum number of band limiter entries
pub const MAX_LIMITER_ENTRIES: usize = 4;

/// EQ band filter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandKind {
    HighShelf,
    LowShelf,
    Peaking,
    Bandpass,
    Highpass,
    Lowpass,
}

impl BandKind {
    /// Map the integer code used in the configuration document
    pub fn from_config(value: i32) -> Self {
        match value {
            1 => Self::HighShelf,
            2 => Self::LowShelf,
            3 => Self::Peaking,
            4 => Self::Bandpass,
            5 => Self::Highpass,
            6 => Self::Lowpass,
            _ => Self::Peaking,
        }
    }

    pub fn to_config(self) -> i32 {
        match self {
            Self::HighShelf => 1,
            Self::LowShelf => 2,
            Self::Peaking => 3,
            Self::Bandpass => 4,
            Self::Highpass => 5,
            Self::Lowpass => 6,
        }
    }
}

/// One parametric EQ band. Shape, frequency and Q are structural; only the
/// gain changes while audio is running.
#[derive(Debug)]
pub struct BandParam {
    pub kind: BandKind,
    pub freq: f32,
    pub q: f32,
    pub gain_db: AtomicF32,
}

impl BandParam {
    pub fn new(kind: BandKind, freq: f32, q: f32, gain_db: f32) -> Self {
        Self {
            kind,
            freq,
            q,
            gain_db: AtomicF32::new(gain_db),
        }
    }
}

impl Clone for BandParam {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            freq: self.freq,
            q: self.q,
            gain_db: AtomicF32::new(self.gain_db.load(Ordering::Relaxed)),
        }
    }
}

/// Parametric equalizer parameters
#[derive(Debug)]
pub struct EqParams {
    pub enabled: AtomicBool,
    pub preamp_db: AtomicF32,
    name: RwLock<String>,
    bands: RwLock<Arc<Vec<BandParam>>>,
}

impl Default for EqParams {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            preamp_db: AtomicF32::new(0.0),
            name: RwLock::new(String::new()),
            bands: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl EqParams {
    /// Current band layout. The returned `Arc` stays valid across structural
    /// swaps; per-band gains inside it remain live.
    pub fn bands(&self) -> Arc<Vec<BandParam>> {
        Arc::clone(&self.bands.read())
    }

    /// Replace the band layout. Structural: callers must only do this while
    /// the engine is stopped.
    pub fn set_bands(&self, bands: Vec<BandParam>) {
        *self.bands.write() = Arc::new(bands);
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.write() = name;
    }
}

/// Dynamics compressor parameters. `volume` is a linear gain factor; the
/// configuration document stores it in dB.
#[derive(Debug)]
pub struct CompressorParams {
    pub enabled: AtomicBool,
    pub volume: AtomicF32,
    pub attack_ms: AtomicF32,
    pub release_ms: AtomicF32,
    pub ratio: AtomicF32,
    pub threshold_db: AtomicF32,
    pub makeup_gain_db: AtomicF32,
    pub sidechain_freq_hz: AtomicF32,
    pub pre_gain_db: AtomicF32,
    pub knee_db: AtomicF32,
    pub expansion_ratio: AtomicF32,
    pub gate_threshold_db: AtomicF32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            volume: AtomicF32::new(1.0),
            attack_ms: AtomicF32::new(10.0),
            release_ms: AtomicF32::new(100.0),
            ratio: AtomicF32::new(4.0),
            threshold_db: AtomicF32::new(-20.0),
            makeup_gain_db: AtomicF32::new(0.0),
            sidechain_freq_hz: AtomicF32::new(0.0),
            pre_gain_db: AtomicF32::new(12.2),
            knee_db: AtomicF32::new(0.0),
            expansion_ratio: AtomicF32::new(1.0),
            gate_threshold_db: AtomicF32::new(-90.0),
        }
    }
}

/// Plain snapshot of the compressor scalars, taken once per block at the
/// stage boundary. Also built directly by the multiband stage for its
/// internal per-band compressors.
#[derive(Debug, Clone, Copy)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub knee_db: f32,
    pub makeup_gain_db: f32,
    pub pre_gain_db: f32,
    pub volume: f32,
    pub sidechain_freq_hz: f32,
    pub expansion_ratio: f32,
    pub gate_threshold_db: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            knee_db: 0.0,
            makeup_gain_db: 0.0,
            pre_gain_db: 0.0,
            volume: 1.0,
            sidechain_freq_hz: 0.0,
            expansion_ratio: 1.0,
            gate_threshold_db: -90.0,
        }
    }
}

impl CompressorSettings {
    pub fn snapshot(params: &CompressorParams) -> Self {
        Self {
            threshold_db: params.threshold_db.load(Ordering::Relaxed),
            ratio: params.ratio.load(Ordering::Relaxed),
            attack_ms: params.attack_ms.load(Ordering::Relaxed),
            release_ms: params.release_ms.load(Ordering::Relaxed),
            knee_db: params.knee_db.load(Ordering::Relaxed),
            makeup_gain_db: params.makeup_gain_db.load(Ordering::Relaxed),
            pre_gain_db: params.pre_gain_db.load(Ordering::Relaxed),
            volume: params.volume.load(Ordering::Relaxed),
            sidechain_freq_hz: params.sidechain_freq_hz.load(Ordering::Relaxed),
            expansion_ratio: params.expansion_ratio.load(Ordering::Relaxed),
            gate_threshold_db: params.gate_threshold_db.load(Ordering::Relaxed),
        }
    }
}

/// Bass/treble shelf parameters
#[derive(Debug)]
pub struct ToneParams {
    pub bass_freq: AtomicF32,
    pub bass_q: AtomicF32,
    pub bass_gain_db: AtomicF32,
    pub bass_enabled: AtomicBool,
    pub treble_freq: AtomicF32,
    pub treble_q: AtomicF32,
    pub treble_gain_db: AtomicF32,
    pub treble_enabled: AtomicBool,
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            bass_freq: AtomicF32::new(70.0),
            bass_q: AtomicF32::new(0.10),
            bass_gain_db: AtomicF32::new(20.0),
            bass_enabled: AtomicBool::new(true),
            treble_freq: AtomicF32::new(10000.0),
            treble_q: AtomicF32::new(0.60),
            treble_gain_db: AtomicF32::new(20.0),
            treble_enabled: AtomicBool::new(true),
        }
    }
}

/// Algorithmic reverb parameters
#[derive(Debug)]
pub struct ReverbParams {
    pub enabled: AtomicBool,
    pub decay_time: AtomicF32,
    pub hi_ratio: AtomicF32,
    pub diffusion: AtomicF32,
    pub initial_delay_ms: AtomicF32,
    pub density: AtomicF32,
    pub lpf_freq: AtomicF32,
    pub hpf_freq: AtomicF32,
    pub reverb_delay_ms: AtomicF32,
    pub balance: AtomicF32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            decay_time: AtomicF32::new(0.9),
            hi_ratio: AtomicF32::new(0.7),
            diffusion: AtomicF32::new(0.9),
            initial_delay_ms: AtomicF32::new(26.0),
            density: AtomicF32::new(3.0),
            lpf_freq: AtomicF32::new(11000.0),
            hpf_freq: AtomicF32::new(90.0),
            reverb_delay_ms: AtomicF32::new(17.0),
            balance: AtomicF32::new(20.0),
        }
    }
}

/// Sub-band crossover parameters
#[derive(Debug)]
pub struct CrossoverParams {
    pub enabled: AtomicBool,
    pub lpf_enabled: AtomicBool,
    pub low_freq: AtomicF32,
    pub high_freq: AtomicF32,
    pub hpf_slope: AtomicU32,
    pub lpf_slope: AtomicU32,
    pub sub_gain_db: AtomicF32,
}

impl Default for CrossoverParams {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            lpf_enabled: AtomicBool::new(false),
            low_freq: AtomicF32::new(30.0),
            high_freq: AtomicF32::new(70.0),
            hpf_slope: AtomicU32::new(24),
            lpf_slope: AtomicU32::new(24),
            sub_gain_db: AtomicF32::new(6.0),
        }
    }
}

/// One band limiter entry
#[derive(Debug)]
pub struct BandLimiterEntryParams {
    pub active: AtomicBool,
    pub low_freq: AtomicF32,
    pub high_freq: AtomicF32,
    pub limit_db: AtomicF32,
}

impl Default for BandLimiterEntryParams {
    fn default() -> Self {
        Self {
            active: AtomicBool::new(false),
            low_freq: AtomicF32::new(20.0),
            high_freq: AtomicF32::new(70.0),
            limit_db: AtomicF32::new(0.0),
        }
    }
}

/// Band limiter parameters
#[derive(Debug, Default)]
pub struct BandLimiterParams {
    pub enabled: AtomicBool,
    pub entries: [BandLimiterEntryParams; MAX_LIMITER_ENTRIES],
}

/// Multiband spectral processor parameters
#[derive(Debug)]
pub struct MultibandParams {
    pub enabled: AtomicBool,
    pub auto_balance: AtomicBool,
    pub auto_balance_speed: AtomicF32,
    pub compression: AtomicF32,
    pub output_gain_db: AtomicF32,
    pub exciter_amount: AtomicF32,
    pub sub_bass_boost_db: AtomicF32,
    pub sub_bass_low_freq: AtomicF32,
    pub sub_bass_high_freq: AtomicF32,
}

impl Default for MultibandParams {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            auto_balance: AtomicBool::new(true),
            auto_balance_speed: AtomicF32::new(0.1),
            compression: AtomicF32::new(0.5),
            output_gain_db: AtomicF32::new(0.0),
            exciter_amount: AtomicF32::new(0.3),
            sub_bass_boost_db: AtomicF32::new(10.0),
            sub_bass_low_freq: AtomicF32::new(30.0),
            sub_bass_high_freq: AtomicF32::new(250.0),
        }
    }
}

/// The process-wide parameter bag. Constructed before the engine starts and
/// alive for the process lifetime.
#[derive(Debug, Default)]
pub struct SharedParams {
    pub eq: EqParams,
    pub tone: ToneParams,
    pub crossover: CrossoverParams,
    pub band_limiter: BandLimiterParams,
    pub multiband: MultibandParams,
    pub compressor: CompressorParams,
    pub reverb: ReverbParams,
    pub bypass_all: AtomicBool,
    pub block_size: AtomicU32,
}

impl SharedParams {
    pub fn new() -> Self {
        Self {
            block_size: AtomicU32::new(DEFAULT_BLOCK_SIZE),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_kind_config_mapping() {
        for code in 1..=6 {
            assert_eq!(BandKind::from_config(code).to_config(), code);
        }
        // Unknown codes fall back to peaking
        assert_eq!(BandKind::from_config(0), BandKind::Peaking);
        assert_eq!(BandKind::from_config(42), BandKind::Peaking);
    }

    #[test]
    fn test_band_layout_swap_keeps_old_arc_alive() {
        let eq = EqParams::default();
        eq.set_bands(vec![BandParam::new(BandKind::Peaking, 1000.0, 1.0, 3.0)]);

        let audio_side = eq.bands();
        eq.set_bands(Vec::new());

        assert_eq!(audio_side.len(), 1);
        assert_eq!(audio_side[0].gain_db.load(Ordering::Relaxed), 3.0);
        assert!(eq.bands().is_empty());
    }

    #[test]
    fn test_compressor_snapshot() {
        let params = CompressorParams::default();
        params.threshold_db.store(-30.0, Ordering::Relaxed);
        params.ratio.store(8.0, Ordering::Relaxed);

        let snap = CompressorSettings::snapshot(&params);
        assert_eq!(snap.threshold_db, -30.0);
        assert_eq!(snap.ratio, 8.0);
        assert_eq!(snap.pre_gain_db, 12.2);
    }
}
