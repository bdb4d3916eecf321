//! Algorithmic reverberator
//!
//! Classic parallel-comb / series-allpass topology: a mono-summed, band
//! limited input feeds a pre-delay, four diffusion allpasses and twelve
//! parallel damped comb filters per channel, decorrelated left/right by
//! fixed sample offsets. Comb feedback follows the RT60 relation
//! `10^(-3 * delay / decayTime)`; density weights the comb bank with an
//! RMS-normalized gain ramp.

use std::sync::atomic::Ordering;

use lfx_core::{ReverbParams, Sample};

use crate::biquad::{Biquad, FilterType};

const NUM_COMBS: usize = 12;
const NUM_INPUT_AP: usize = 4;
const NUM_OUTPUT_AP: usize = 2;
const STEREO_SPREAD: usize = 37;
const INPUT_GAIN: f32 = 0.012;

/// Prime comb delays tuned for 48 kHz, spread across 23-47 ms
const COMB_TUNING_48K: [usize; NUM_COMBS] = [
    1117, 1201, 1301, 1399, 1499, 1601, 1709, 1811, 1907, 2011, 2113, 2239,
];

/// Input diffusion allpass lengths (3.4-10.5 ms at 48 kHz)
const INPUT_AP_TUNING_48K: [usize; NUM_INPUT_AP] = [163, 271, 383, 503];

/// Output decorrelation allpass lengths
const OUTPUT_AP_TUNING_48K: [usize; NUM_OUTPUT_AP] = [131, 197];

#[derive(Default)]
struct CombFilter {
    buffer: Vec<f32>,
    idx: usize,
    filter_state: f32,
}

impl CombFilter {
    fn init(&mut self, size: usize) {
        self.buffer = vec![0.0; size];
        self.idx = 0;
        self.filter_state = 0.0;
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let output = self.buffer[self.idx];
        self.filter_state = output + damping * (self.filter_state - output);
        self.buffer[self.idx] = input + self.filter_state * feedback;
        self.idx += 1;
        if self.idx >= self.buffer.len() {
            self.idx = 0;
        }
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.idx = 0;
    }
}

#[derive(Default)]
struct AllpassFilter {
    buffer: Vec<f32>,
    idx: usize,
}

impl AllpassFilter {
    fn init(&mut self, size: usize) {
        self.buffer = vec![0.0; size];
        self.idx = 0;
    }

    #[inline(always)]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let buf_out = self.buffer[self.idx];
        self.buffer[self.idx] = input + buf_out * feedback;
        self.idx += 1;
        if self.idx >= self.buffer.len() {
            self.idx = 0;
        }
        buf_out - input * feedback
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.idx = 0;
    }
}

#[derive(Default)]
struct DelayLine {
    buffer: Vec<f32>,
    write_idx: usize,
    read_idx: usize,
}

impl DelayLine {
    fn init(&mut self, max_samples: usize) {
        self.buffer = vec![0.0; max_samples];
        self.write_idx = 0;
        self.read_idx = 0;
    }

    fn set_delay(&mut self, samples: usize) {
        let samples = samples.min(self.buffer.len() - 1);
        self.read_idx = (self.write_idx + self.buffer.len() - samples) % self.buffer.len();
    }

    #[inline(always)]
    fn process(&mut self, input: f32) -> f32 {
        self.buffer[self.write_idx] = input;
        let output = self.buffer[self.read_idx];
        self.write_idx += 1;
        if self.write_idx >= self.buffer.len() {
            self.write_idx = 0;
        }
        self.read_idx += 1;
        if self.read_idx >= self.buffer.len() {
            self.read_idx = 0;
        }
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

pub struct Reverb {
    comb_l: [CombFilter; NUM_COMBS],
    comb_r: [CombFilter; NUM_COMBS],

    input_ap_l: [AllpassFilter; NUM_INPUT_AP],
    input_ap_r: [AllpassFilter; NUM_INPUT_AP],
    output_ap_l: [AllpassFilter; NUM_OUTPUT_AP],
    output_ap_r: [AllpassFilter; NUM_OUTPUT_AP],

    pre_delay: DelayLine,
    late_delay_l: DelayLine,
    late_delay_r: DelayLine,

    input_hpf: Biquad,
    input_lpf: Biquad,

    comb_feedback: [f32; NUM_COMBS],
    comb_gain: [f32; NUM_COMBS],
    comb_norm: f32,
    damping: f32,
    diffusion_fb: f32,
    wet: f32,
    dry: f32,

    sample_rate: f32,

    last_decay_time: f32,
    last_hi_ratio: f32,
    last_diffusion: f32,
    last_density: f32,
    last_lpf_freq: f32,
    last_hpf_freq: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let mut reverb = Self {
            comb_l: Default::default(),
            comb_r: Default::default(),
            input_ap_l: Default::default(),
            input_ap_r: Default::default(),
            output_ap_l: Default::default(),
            output_ap_r: Default::default(),
            pre_delay: Default::default(),
            late_delay_l: Default::default(),
            late_delay_r: Default::default(),
            input_hpf: Biquad::new(),
            input_lpf: Biquad::new(),
            comb_feedback: [0.0; NUM_COMBS],
            comb_gain: [1.0; NUM_COMBS],
            comb_norm: 1.0,
            damping: 0.3,
            diffusion_fb: 0.5,
            wet: 0.2,
            dry: 0.8,
            sample_rate,
            last_decay_time: -1.0,
            last_hi_ratio: -1.0,
            last_diffusion: -1.0,
            last_density: -1.0,
            last_lpf_freq: -1.0,
            last_hpf_freq: -1.0,
        };
        reverb.init(sample_rate);
        reverb
    }

    /// Size all delay buffers for the given sample rate
    pub fn init(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        let scale = sample_rate / 48000.0;

        for i in 0..NUM_COMBS {
            let size = ((COMB_TUNING_48K[i] as f32 * scale) as usize).max(1);
            self.comb_l[i].init(size);
            self.comb_r[i].init(size + STEREO_SPREAD);
        }

        for i in 0..NUM_INPUT_AP {
            let size = ((INPUT_AP_TUNING_48K[i] as f32 * scale) as usize).max(1);
            self.input_ap_l[i].init(size);
            self.input_ap_r[i].init(size + 13);
        }

        for i in 0..NUM_OUTPUT_AP {
            let size = ((OUTPUT_AP_TUNING_48K[i] as f32 * scale) as usize).max(1);
            self.output_ap_l[i].init(size);
            self.output_ap_r[i].init(size + 11);
        }

        let max_delay = ((sample_rate * 0.15) as usize).max(1);
        self.pre_delay.init(max_delay);
        self.late_delay_l.init(max_delay);
        self.late_delay_r.init(max_delay);

        self.input_hpf
            .set_params(FilterType::Highpass, 90.0, 0.0, 0.707, sample_rate);
        self.input_lpf
            .set_params(FilterType::Lowpass, 11000.0, 0.0, 0.707, sample_rate);

        self.comb_feedback = [0.0; NUM_COMBS];
        self.comb_gain = [1.0; NUM_COMBS];
        self.comb_norm = 1.0 / (NUM_COMBS as f32).sqrt();

        self.last_decay_time = -1.0;
        self.last_hi_ratio = -1.0;
        self.last_diffusion = -1.0;
        self.last_density = -1.0;
        self.last_lpf_freq = -1.0;
        self.last_hpf_freq = -1.0;
    }

    pub fn update_params(&mut self, params: &ReverbParams) {
        let decay_time = params.decay_time.load(Ordering::Relaxed);
        let hi_ratio = params.hi_ratio.load(Ordering::Relaxed);
        let diffusion = params.diffusion.load(Ordering::Relaxed);
        let init_delay = params.initial_delay_ms.load(Ordering::Relaxed);
        let density = params.density.load(Ordering::Relaxed);
        let lpf_freq = params.lpf_freq.load(Ordering::Relaxed);
        let hpf_freq = params.hpf_freq.load(Ordering::Relaxed);
        let rev_delay = params.reverb_delay_ms.load(Ordering::Relaxed);
        let balance = params.balance.load(Ordering::Relaxed);

        if decay_time != self.last_decay_time {
            let rt60 = decay_time.max(0.1);
            for i in 0..NUM_COMBS {
                let delay_sec = self.comb_l[i].len() as f32 / self.sample_rate;
                self.comb_feedback[i] = 10.0_f32.powf(-3.0 * delay_sec / rt60);
            }
            self.last_decay_time = decay_time;
        }

        if hi_ratio != self.last_hi_ratio {
            self.damping = 1.0 - hi_ratio.clamp(0.0, 1.0);
            self.last_hi_ratio = hi_ratio;
        }

        if diffusion != self.last_diffusion {
            self.diffusion_fb = diffusion.clamp(0.0, 1.0) * 0.75;
            self.last_diffusion = diffusion;
        }

        if density != self.last_density {
            // Density ramps in the upper comb bank; gains are RMS normalized
            let d = density.clamp(0.0, 12.0) / 12.0;
            let mut sum_sq = 0.0;
            for i in 0..NUM_COMBS {
                self.comb_gain[i] = if i < 4 {
                    1.0
                } else if i < 8 {
                    0.3 + 0.7 * d
                } else {
                    0.1 + 0.9 * d * d
                };
                sum_sq += self.comb_gain[i] * self.comb_gain[i];
            }
            self.comb_norm = 1.0 / sum_sq.sqrt();
            self.last_density = density;
        }

        if lpf_freq != self.last_lpf_freq {
            let freq = lpf_freq.clamp(1000.0, 20000.0);
            self.input_lpf
                .set_params(FilterType::Lowpass, freq, 0.0, 0.707, self.sample_rate);
            self.last_lpf_freq = lpf_freq;
        }

        if hpf_freq != self.last_hpf_freq {
            let freq = hpf_freq.clamp(20.0, 500.0);
            self.input_hpf
                .set_params(FilterType::Highpass, freq, 0.0, 0.707, self.sample_rate);
            self.last_hpf_freq = hpf_freq;
        }

        let pre_delay_samples = (init_delay * 0.001 * self.sample_rate) as usize;
        self.pre_delay.set_delay(pre_delay_samples);

        let late_delay_samples = (rev_delay * 0.001 * self.sample_rate) as usize;
        self.late_delay_l.set_delay(late_delay_samples);
        self.late_delay_r.set_delay(late_delay_samples);

        let bal = balance.clamp(0.0, 100.0) / 100.0;
        self.wet = bal;
        self.dry = 1.0 - bal * 0.5;
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_frames: usize, num_channels: usize) {
        let channels = num_channels.min(2);

        for frame in 0..num_frames {
            let idx_l = frame * num_channels;
            let idx_r = if channels > 1 { idx_l + 1 } else { idx_l };

            let input_l = buffer[idx_l];
            let input_r = buffer[idx_r];

            let mono = (input_l + input_r) * 0.5;

            let mut filtered = self.input_hpf.process(mono);
            filtered = self.input_lpf.process(filtered);

            let pd = self.pre_delay.process(filtered) * INPUT_GAIN;

            let mut diff_l = pd;
            let mut diff_r = pd;
            for i in 0..NUM_INPUT_AP {
                diff_l = self.input_ap_l[i].process(diff_l, self.diffusion_fb);
                diff_r = self.input_ap_r[i].process(diff_r, self.diffusion_fb);
            }

            let del_l = self.late_delay_l.process(diff_l);
            let del_r = self.late_delay_r.process(diff_r);

            let mut out_l = 0.0;
            let mut out_r = 0.0;
            for i in 0..NUM_COMBS {
                let g = self.comb_gain[i];
                out_l += self.comb_l[i].process(del_l, self.comb_feedback[i], self.damping) * g;
                out_r += self.comb_r[i].process(del_r, self.comb_feedback[i], self.damping) * g;
            }

            out_l *= self.comb_norm;
            out_r *= self.comb_norm;

            for i in 0..NUM_OUTPUT_AP {
                out_l = self.output_ap_l[i].process(out_l, self.diffusion_fb * 0.8);
                out_r = self.output_ap_r[i].process(out_r, self.diffusion_fb * 0.8);
            }

            buffer[idx_l] = input_l * self.dry + out_l * self.wet;
            if channels > 1 {
                buffer[idx_r] = input_r * self.dry + out_r * self.wet;
            }
        }
    }

    pub fn reset(&mut self) {
        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.reset();
        }
        for ap in self
            .input_ap_l
            .iter_mut()
            .chain(self.input_ap_r.iter_mut())
            .chain(self.output_ap_l.iter_mut())
            .chain(self.output_ap_r.iter_mut())
        {
            ap.reset();
        }
        self.pre_delay.reset();
        self.late_delay_l.reset();
        self.late_delay_r.reset();
        self.input_hpf.reset();
        self.input_lpf.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;

    fn impulse_response(reverb: &mut Reverb, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0_f32; frames * 2];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        reverb.process(&mut buffer, frames, 2);
        buffer
    }

    #[test]
    fn test_produces_tail() {
        let mut reverb = Reverb::new(FS);
        let params = ReverbParams::default();
        params.balance.store(50.0, Ordering::Relaxed);
        reverb.update_params(&params);

        let response = impulse_response(&mut reverb, 48000);

        // Energy must appear well after the direct sound
        let late: f32 = response[24000..].iter().map(|s| s.abs()).sum();
        assert!(late > 0.0, "no reverb tail");
    }

    #[test]
    fn test_tail_decays() {
        let mut reverb = Reverb::new(FS);
        let params = ReverbParams::default();
        params.decay_time.store(0.3, Ordering::Relaxed);
        params.balance.store(100.0, Ordering::Relaxed);
        reverb.update_params(&params);

        // One second impulse response: the last quarter must carry far less
        // energy than the first quarter after onset
        let response = impulse_response(&mut reverb, 48000);
        let early: f32 = response[4800..16800].iter().map(|s| s * s).sum();
        let late: f32 = response[72000..].iter().map(|s| s * s).sum();
        assert!(early > 0.0);
        assert!(late < early * 0.1, "early {early} late {late}");
    }

    #[test]
    fn test_zero_balance_is_dry() {
        let mut reverb = Reverb::new(FS);
        let params = ReverbParams::default();
        params.balance.store(0.0, Ordering::Relaxed);
        reverb.update_params(&params);

        let frames = 4800;
        let mut buffer = vec![0.0_f32; frames * 2];
        for i in 0..frames {
            let x = 0.2 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / FS).sin();
            buffer[i * 2] = x;
            buffer[i * 2 + 1] = x;
        }
        let original = buffer.clone();
        reverb.process(&mut buffer, frames, 2);

        // wet = 0, dry = 1: passthrough
        for (a, b) in buffer.iter().zip(&original) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_param_cache_only_recomputes_on_change() {
        let mut reverb = Reverb::new(FS);
        let params = ReverbParams::default();
        reverb.update_params(&params);
        let feedback_before = reverb.comb_feedback;

        reverb.update_params(&params);
        assert_eq!(feedback_before, reverb.comb_feedback);

        params.decay_time.store(2.0, Ordering::Relaxed);
        reverb.update_params(&params);
        assert_ne!(feedback_before, reverb.comb_feedback);
    }
}
