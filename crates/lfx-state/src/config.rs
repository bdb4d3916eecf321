//! Configuration document
//!
//! A single JSON file describing the whole processing setup. Every object
//! and every scalar field carries a default, so a missing file, a missing
//! object or a missing field silently falls back instead of erroring.
//! Values are sanitized on load: the block size is clamped, ratios are
//! floored at 1 and the time constants at 0.01 ms.
//!
//! The compressor's output volume is stored in dB here while the runtime
//! parameter is linear; load converts dB to linear and save converts back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};

use lfx_core::{
    db_to_linear, linear_to_db, BandKind, BandParam, SharedParams, DEFAULT_BLOCK_SIZE,
    MAX_BLOCK_SIZE, MAX_LIMITER_ENTRIES, MIN_BLOCK_SIZE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BandConfig {
    #[serde(rename = "type")]
    pub kind: i32,
    pub channels: i32,
    pub frequency: f32,
    pub q: f32,
    pub gain: f32,
    pub color: i32,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            kind: 3,
            channels: 0,
            frequency: 1000.0,
            q: 1.0,
            gain: 0.0,
            color: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorConfig {
    pub enabled: bool,
    #[serde(rename = "threshold")]
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub sidechain_freq_hz: f32,
    pub makeup_gain_db: f32,
    pub volume_db: f32,
    pub pre_gain_db: f32,
    pub knee_db: f32,
    pub expansion_ratio: f32,
    pub gate_threshold_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            sidechain_freq_hz: 0.0,
            makeup_gain_db: 0.0,
            volume_db: 0.0,
            pre_gain_db: 12.2,
            knee_db: 0.0,
            expansion_ratio: 1.0,
            gate_threshold_db: -90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToneConfig {
    pub bass_freq: f32,
    pub bass_q: f32,
    pub bass_gain_db: f32,
    pub bass_enabled: bool,
    pub treble_freq: f32,
    pub treble_q: f32,
    pub treble_gain_db: f32,
    pub treble_enabled: bool,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            bass_freq: 70.0,
            bass_q: 0.10,
            bass_gain_db: 20.0,
            bass_enabled: true,
            treble_freq: 10000.0,
            treble_q: 0.60,
            treble_gain_db: 20.0,
            treble_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbConfig {
    pub enabled: bool,
    pub decay_time: f32,
    pub hi_ratio: f32,
    pub diffusion: f32,
    pub initial_delay: f32,
    pub density: f32,
    pub lpf_freq: f32,
    pub hpf_freq: f32,
    pub reverb_delay: f32,
    pub balance: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_time: 0.9,
            hi_ratio: 0.7,
            diffusion: 0.9,
            initial_delay: 26.0,
            density: 3.0,
            lpf_freq: 11000.0,
            hpf_freq: 90.0,
            reverb_delay: 17.0,
            balance: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrossoverConfig {
    pub enabled: bool,
    pub lpf_enabled: bool,
    pub low_freq: f32,
    pub high_freq: f32,
    pub hpf_slope: Option<u32>,
    pub lpf_slope: Option<u32>,
    /// Legacy single slope; applies to both directions when the
    /// per-direction keys are absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<u32>,
    pub sub_gain_db: f32,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lpf_enabled: false,
            low_freq: 30.0,
            high_freq: 70.0,
            hpf_slope: None,
            lpf_slope: None,
            slope: None,
            sub_gain_db: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BandLimiterEntryConfig {
    pub active: bool,
    pub low_freq: f32,
    pub high_freq: f32,
    pub limit_db: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BandLimiterConfig {
    pub enabled: bool,
    pub entries: Vec<BandLimiterEntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MultibandConfig {
    pub enabled: bool,
    pub auto_balance: bool,
    pub auto_balance_speed: f32,
    pub compression: f32,
    pub output_gain: f32,
    pub exciter_amount: f32,
    pub sub_bass_boost: f32,
    pub sub_bass_low_freq: f32,
    pub sub_bass_high_freq: f32,
}

impl Default for MultibandConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_balance: true,
            auto_balance_speed: 0.1,
            compression: 0.5,
            output_gain: 0.0,
            exciter_amount: 0.3,
            sub_bass_boost: 10.0,
            sub_bass_low_freq: 30.0,
            sub_bass_high_freq: 250.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    pub capture_from: String,
    pub play_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioSettings {
    pub block_size: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub name: String,
    pub preamp: f32,
    pub parametric: bool,
    pub bands: Vec<BandConfig>,
    pub compressor: CompressorConfig,
    pub reverb: ReverbConfig,
    pub crossover: CrossoverConfig,
    pub band_limiter: BandLimiterConfig,
    pub tone: ToneConfig,
    pub multiband: MultibandConfig,
    pub devices: DeviceConfig,
    pub audio: AudioSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            preamp: 0.0,
            parametric: true,
            bands: Vec::new(),
            compressor: CompressorConfig::default(),
            reverb: ReverbConfig::default(),
            crossover: CrossoverConfig::default(),
            band_limiter: BandLimiterConfig::default(),
            tone: ToneConfig::default(),
            multiband: MultibandConfig::default(),
            devices: DeviceConfig::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from the standard location
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load from a specific path. A missing file is not an error and a
    /// malformed file falls back to defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let mut config = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "config parse failed ({}), using defaults: {e}",
                        path.as_ref().display()
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        config.sanitize();
        config
    }

    /// Save as pretty-printed JSON
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, json)
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("loopfx"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.json")
    }

    /// Enforce value ranges and resolve the legacy crossover `slope` key
    pub fn sanitize(&mut self) {
        self.audio.block_size = self.audio.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);

        self.compressor.ratio = self.compressor.ratio.max(1.0);
        self.compressor.expansion_ratio = self.compressor.expansion_ratio.max(1.0);
        self.compressor.attack_ms = self.compressor.attack_ms.max(0.01);
        self.compressor.release_ms = self.compressor.release_ms.max(0.01);

        let legacy = self.crossover.slope;
        if self.crossover.hpf_slope.is_none() {
            self.crossover.hpf_slope = Some(legacy.unwrap_or(24));
        }
        if self.crossover.lpf_slope.is_none() {
            self.crossover.lpf_slope = Some(legacy.unwrap_or(24));
        }
        self.crossover.slope = None;

        self.band_limiter.entries.truncate(MAX_LIMITER_ENTRIES);
    }

    /// Publish this document into the shared parameter bag. Structural data
    /// (the EQ band layout) is swapped here, so call only while stopped.
    pub fn apply_to_params(&self, params: &SharedParams) {
        params.eq.set_name(self.name.clone());
        params.eq.preamp_db.store(self.preamp, Ordering::Relaxed);
        params.eq.set_bands(
            self.bands
                .iter()
                .map(|b| BandParam::new(BandKind::from_config(b.kind), b.frequency, b.q, b.gain))
                .collect(),
        );

        let c = &self.compressor;
        params.compressor.enabled.store(c.enabled, Ordering::Relaxed);
        params
            .compressor
            .threshold_db
            .store(c.threshold_db, Ordering::Relaxed);
        params.compressor.ratio.store(c.ratio, Ordering::Relaxed);
        params
            .compressor
            .attack_ms
            .store(c.attack_ms, Ordering::Relaxed);
        params
            .compressor
            .release_ms
            .store(c.release_ms, Ordering::Relaxed);
        params
            .compressor
            .sidechain_freq_hz
            .store(c.sidechain_freq_hz, Ordering::Relaxed);
        params
            .compressor
            .makeup_gain_db
            .store(c.makeup_gain_db, Ordering::Relaxed);
        params
            .compressor
            .volume
            .store(db_to_linear(c.volume_db), Ordering::Relaxed);
        params
            .compressor
            .pre_gain_db
            .store(c.pre_gain_db, Ordering::Relaxed);
        params.compressor.knee_db.store(c.knee_db, Ordering::Relaxed);
        params
            .compressor
            .expansion_ratio
            .store(c.expansion_ratio, Ordering::Relaxed);
        params
            .compressor
            .gate_threshold_db
            .store(c.gate_threshold_db, Ordering::Relaxed);

        let t = &self.tone;
        params.tone.bass_freq.store(t.bass_freq, Ordering::Relaxed);
        params.tone.bass_q.store(t.bass_q, Ordering::Relaxed);
        params
            .tone
            .bass_gain_db
            .store(t.bass_gain_db, Ordering::Relaxed);
        params
            .tone
            .bass_enabled
            .store(t.bass_enabled, Ordering::Relaxed);
        params
            .tone
            .treble_freq
            .store(t.treble_freq, Ordering::Relaxed);
        params.tone.treble_q.store(t.treble_q, Ordering::Relaxed);
        params
            .tone
            .treble_gain_db
            .store(t.treble_gain_db, Ordering::Relaxed);
        params
            .tone
            .treble_enabled
            .store(t.treble_enabled, Ordering::Relaxed);

        let r = &self.reverb;
        params.reverb.enabled.store(r.enabled, Ordering::Relaxed);
        params
            .reverb
            .decay_time
            .store(r.decay_time, Ordering::Relaxed);
        params.reverb.hi_ratio.store(r.hi_ratio, Ordering::Relaxed);
        params
            .reverb
            .diffusion
            .store(r.diffusion, Ordering::Relaxed);
        params
            .reverb
            .initial_delay_ms
            .store(r.initial_delay, Ordering::Relaxed);
        params.reverb.density.store(r.density, Ordering::Relaxed);
        params.reverb.lpf_freq.store(r.lpf_freq, Ordering::Relaxed);
        params.reverb.hpf_freq.store(r.hpf_freq, Ordering::Relaxed);
        params
            .reverb
            .reverb_delay_ms
            .store(r.reverb_delay, Ordering::Relaxed);
        params.reverb.balance.store(r.balance, Ordering::Relaxed);

        let x = &self.crossover;
        params.crossover.enabled.store(x.enabled, Ordering::Relaxed);
        params
            .crossover
            .lpf_enabled
            .store(x.lpf_enabled, Ordering::Relaxed);
        params.crossover.low_freq.store(x.low_freq, Ordering::Relaxed);
        params
            .crossover
            .high_freq
            .store(x.high_freq, Ordering::Relaxed);
        params
            .crossover
            .hpf_slope
            .store(x.hpf_slope.unwrap_or(24), Ordering::Relaxed);
        params
            .crossover
            .lpf_slope
            .store(x.lpf_slope.unwrap_or(24), Ordering::Relaxed);
        params
            .crossover
            .sub_gain_db
            .store(x.sub_gain_db, Ordering::Relaxed);

        params
            .band_limiter
            .enabled
            .store(self.band_limiter.enabled, Ordering::Relaxed);
        for (i, entry) in params.band_limiter.entries.iter().enumerate() {
            match self.band_limiter.entries.get(i) {
                Some(e) => {
                    entry.active.store(e.active, Ordering::Relaxed);
                    entry.low_freq.store(e.low_freq, Ordering::Relaxed);
                    entry.high_freq.store(e.high_freq, Ordering::Relaxed);
                    entry.limit_db.store(e.limit_db, Ordering::Relaxed);
                }
                None => entry.active.store(false, Ordering::Relaxed),
            }
        }

        let m = &self.multiband;
        params.multiband.enabled.store(m.enabled, Ordering::Relaxed);
        params
            .multiband
            .auto_balance
            .store(m.auto_balance, Ordering::Relaxed);
        params
            .multiband
            .auto_balance_speed
            .store(m.auto_balance_speed, Ordering::Relaxed);
        params
            .multiband
            .compression
            .store(m.compression, Ordering::Relaxed);
        params
            .multiband
            .output_gain_db
            .store(m.output_gain, Ordering::Relaxed);
        params
            .multiband
            .exciter_amount
            .store(m.exciter_amount, Ordering::Relaxed);
        params
            .multiband
            .sub_bass_boost_db
            .store(m.sub_bass_boost, Ordering::Relaxed);
        params
            .multiband
            .sub_bass_low_freq
            .store(m.sub_bass_low_freq, Ordering::Relaxed);
        params
            .multiband
            .sub_bass_high_freq
            .store(m.sub_bass_high_freq, Ordering::Relaxed);

        params
            .block_size
            .store(self.audio.block_size, Ordering::Relaxed);
    }

    /// Pull the current runtime parameters back into this document (device
    /// names and the preset name are owned by the document and kept as-is)
    pub fn update_from_params(&mut self, params: &SharedParams) {
        self.name = params.eq.name();
        self.preamp = params.eq.preamp_db.load(Ordering::Relaxed);
        self.parametric = true;
        self.bands = params
            .eq
            .bands()
            .iter()
            .map(|b| BandConfig {
                kind: b.kind.to_config(),
                channels: 0,
                frequency: b.freq,
                q: b.q,
                gain: b.gain_db.load(Ordering::Relaxed),
                color: 0,
            })
            .collect();

        let c = &params.compressor;
        self.compressor = CompressorConfig {
            enabled: c.enabled.load(Ordering::Relaxed),
            threshold_db: c.threshold_db.load(Ordering::Relaxed),
            ratio: c.ratio.load(Ordering::Relaxed),
            attack_ms: c.attack_ms.load(Ordering::Relaxed),
            release_ms: c.release_ms.load(Ordering::Relaxed),
            sidechain_freq_hz: c.sidechain_freq_hz.load(Ordering::Relaxed),
            makeup_gain_db: c.makeup_gain_db.load(Ordering::Relaxed),
            volume_db: linear_to_db(c.volume.load(Ordering::Relaxed)),
            pre_gain_db: c.pre_gain_db.load(Ordering::Relaxed),
            knee_db: c.knee_db.load(Ordering::Relaxed),
            expansion_ratio: c.expansion_ratio.load(Ordering::Relaxed),
            gate_threshold_db: c.gate_threshold_db.load(Ordering::Relaxed),
        };

        let t = &params.tone;
        self.tone = ToneConfig {
            bass_freq: t.bass_freq.load(Ordering::Relaxed),
            bass_q: t.bass_q.load(Ordering::Relaxed),
            bass_gain_db: t.bass_gain_db.load(Ordering::Relaxed),
            bass_enabled: t.bass_enabled.load(Ordering::Relaxed),
            treble_freq: t.treble_freq.load(Ordering::Relaxed),
            treble_q: t.treble_q.load(Ordering::Relaxed),
            treble_gain_db: t.treble_gain_db.load(Ordering::Relaxed),
            treble_enabled: t.treble_enabled.load(Ordering::Relaxed),
        };

        let r = &params.reverb;
        self.reverb = ReverbConfig {
            enabled: r.enabled.load(Ordering::Relaxed),
            decay_time: r.decay_time.load(Ordering::Relaxed),
            hi_ratio: r.hi_ratio.load(Ordering::Relaxed),
            diffusion: r.diffusion.load(Ordering::Relaxed),
            initial_delay: r.initial_delay_ms.load(Ordering::Relaxed),
            density: r.density.load(Ordering::Relaxed),
            lpf_freq: r.lpf_freq.load(Ordering::Relaxed),
            hpf_freq: r.hpf_freq.load(Ordering::Relaxed),
            reverb_delay: r.reverb_delay_ms.load(Ordering::Relaxed),
            balance: r.balance.load(Ordering::Relaxed),
        };

        let x = &params.crossover;
        self.crossover = CrossoverConfig {
            enabled: x.enabled.load(Ordering::Relaxed),
            lpf_enabled: x.lpf_enabled.load(Ordering::Relaxed),
            low_freq: x.low_freq.load(Ordering::Relaxed),
            high_freq: x.high_freq.load(Ordering::Relaxed),
            hpf_slope: Some(x.hpf_slope.load(Ordering::Relaxed)),
            lpf_slope: Some(x.lpf_slope.load(Ordering::Relaxed)),
            slope: None,
            sub_gain_db: x.sub_gain_db.load(Ordering::Relaxed),
        };

        self.band_limiter = BandLimiterConfig {
            enabled: params.band_limiter.enabled.load(Ordering::Relaxed),
            entries: params
                .band_limiter
                .entries
                .iter()
                .map(|e| BandLimiterEntryConfig {
                    active: e.active.load(Ordering::Relaxed),
                    low_freq: e.low_freq.load(Ordering::Relaxed),
                    high_freq: e.high_freq.load(Ordering::Relaxed),
                    limit_db: e.limit_db.load(Ordering::Relaxed),
                })
                .collect(),
        };

        let m = &params.multiband;
        self.multiband = MultibandConfig {
            enabled: m.enabled.load(Ordering::Relaxed),
            auto_balance: m.auto_balance.load(Ordering::Relaxed),
            auto_balance_speed: m.auto_balance_speed.load(Ordering::Relaxed),
            compression: m.compression.load(Ordering::Relaxed),
            output_gain: m.output_gain_db.load(Ordering::Relaxed),
            exciter_amount: m.exciter_amount.load(Ordering::Relaxed),
            sub_bass_boost: m.sub_bass_boost_db.load(Ordering::Relaxed),
            sub_bass_low_freq: m.sub_bass_low_freq.load(Ordering::Relaxed),
            sub_bass_high_freq: m.sub_bass_high_freq.load(Ordering::Relaxed),
        };

        self.audio.block_size = params.block_size.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.compressor.ratio, 4.0);
        assert_eq!(config.reverb.decay_time, 0.9);
        assert_eq!(config.audio.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.bands.is_empty());
    }

    #[test]
    fn test_missing_fields_within_object_keep_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"compressor": {"ratio": 8.0}}"#).unwrap();
        assert_eq!(config.compressor.ratio, 8.0);
        // Untouched siblings keep defaults
        assert_eq!(config.compressor.threshold_db, -20.0);
        assert_eq!(config.compressor.pre_gain_db, 12.2);
    }

    #[test]
    fn test_block_size_clamped() {
        let mut config: AppConfig =
            serde_json::from_str(r#"{"audio": {"blockSize": 7}}"#).unwrap();
        config.sanitize();
        assert_eq!(config.audio.block_size, MIN_BLOCK_SIZE);

        let mut config: AppConfig =
            serde_json::from_str(r#"{"audio": {"blockSize": 99999}}"#).unwrap();
        config.sanitize();
        assert_eq!(config.audio.block_size, MAX_BLOCK_SIZE);
    }

    #[test]
    fn test_ratio_and_times_floored() {
        let mut config: AppConfig = serde_json::from_str(
            r#"{"compressor": {"ratio": 0.5, "expansionRatio": 0.0, "attackMs": 0.0, "releaseMs": -5.0}}"#,
        )
        .unwrap();
        config.sanitize();
        assert_eq!(config.compressor.ratio, 1.0);
        assert_eq!(config.compressor.expansion_ratio, 1.0);
        assert_eq!(config.compressor.attack_ms, 0.01);
        assert_eq!(config.compressor.release_ms, 0.01);
    }

    #[test]
    fn test_legacy_slope_sets_both_directions() {
        let mut config: AppConfig =
            serde_json::from_str(r#"{"crossover": {"slope": 48}}"#).unwrap();
        config.sanitize();
        assert_eq!(config.crossover.hpf_slope, Some(48));
        assert_eq!(config.crossover.lpf_slope, Some(48));
        assert_eq!(config.crossover.slope, None);
    }

    #[test]
    fn test_explicit_slopes_win_over_legacy() {
        let mut config: AppConfig = serde_json::from_str(
            r#"{"crossover": {"slope": 48, "hpfSlope": 12, "lpfSlope": 6}}"#,
        )
        .unwrap();
        config.sanitize();
        assert_eq!(config.crossover.hpf_slope, Some(12));
        assert_eq!(config.crossover.lpf_slope, Some(6));
    }

    #[test]
    fn test_volume_db_converts_to_linear_and_back() {
        let config: AppConfig =
            serde_json::from_str(r#"{"compressor": {"volumeDb": -6.0}}"#).unwrap();
        let params = SharedParams::new();
        config.apply_to_params(&params);

        let linear = params.compressor.volume.load(Ordering::Relaxed);
        assert!((linear - db_to_linear(-6.0)).abs() < 1e-5);

        let mut saved = config.clone();
        saved.update_from_params(&params);
        assert!((saved.compressor.volume_db - (-6.0)).abs() < 1e-3);
    }

    #[test]
    fn test_roundtrip_through_params_is_semantically_lossless() {
        let json = r#"{
            "name": "night mode",
            "preamp": 3.5,
            "bands": [
                { "type": 2, "frequency": 80.0, "q": 0.7, "gain": 4.0 },
                { "type": 3, "frequency": 2500.0, "q": 1.4, "gain": -2.0 }
            ],
            "compressor": { "threshold": -24.0, "ratio": 3.0 },
            "crossover": { "slope": 12, "subGainDb": 4.0 },
            "bandLimiter": { "enabled": true, "entries": [
                { "active": true, "lowFreq": 25.0, "highFreq": 90.0, "limitDb": -8.0 }
            ] },
            "multiband": { "enabled": true, "compression": 0.7 },
            "audio": { "blockSize": 512 }
        }"#;

        let mut loaded: AppConfig = serde_json::from_str(json).unwrap();
        loaded.sanitize();

        let params = SharedParams::new();
        loaded.apply_to_params(&params);

        let mut roundtripped = loaded.clone();
        roundtripped.update_from_params(&params);

        assert_eq!(loaded, roundtripped);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = AppConfig::load_from("/nonexistent/path/config.json");
        assert_eq!(config, {
            let mut c = AppConfig::default();
            c.sanitize();
            c
        });
    }

    #[test]
    fn test_save_load_roundtrip_on_disk() {
        let dir = std::env::temp_dir().join("lfx-config-test");
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.sanitize();
        config.name = "saved".to_string();
        config.preamp = -2.5;
        config.bands.push(BandConfig {
            kind: 3,
            frequency: 440.0,
            q: 2.0,
            gain: 1.5,
            ..Default::default()
        });
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(config, loaded);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_extra_limiter_entries_truncated() {
        let mut config = AppConfig::default();
        config.band_limiter.entries = (0..6).map(|_| BandLimiterEntryConfig::default()).collect();
        config.sanitize();
        assert_eq!(config.band_limiter.entries.len(), MAX_LIMITER_ENTRIES);
    }
}
