//! Capture/playback engine
//!
//! Owns the loopback capture stream, the playback stream and the ring
//! buffer between them. The capture callback copies each block into a
//! pre-allocated scratch buffer, runs the DSP chain in place, updates the
//! level meters and pushes the processed samples into the ring; the
//! playback callback drains the ring or zero-fills on underrun. Neither
//! callback allocates, blocks or takes a lock.
//!
//! Devices and streams are resource-bearing values: when any step of
//! `start` fails, everything opened so far is released by dropping in
//! reverse construction order.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use portable_atomic::AtomicF32;

use lfx_core::{Sample, SharedParams, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, SAMPLE_RATE};
use lfx_dsp::DspChain;

use crate::ringbuf::CircularBuffer;
use crate::{AudioError, AudioResult};

/// Ring capacity: two seconds of interleaved stereo at 48 kHz
const RING_CAPACITY: usize = SAMPLE_RATE as usize * 2 * 2;

/// Peak meter decay per capture block
const METER_DECAY: f32 = 0.98;

/// Frame stride for the peak scan (a subsampled scan is plenty for UI)
const METER_STRIDE: usize = 32;

/// Engine status machine. Error states are terminal until the next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    ErrorInit = 3,
    ErrorDevice = 4,
    ErrorFormat = 5,
}

impl Status {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::ErrorInit,
            4 => Self::ErrorDevice,
            5 => Self::ErrorFormat,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting...",
            Self::Running => "Running",
            Self::ErrorInit => "Error: Init failed",
            Self::ErrorDevice => "Error: Device failed",
            Self::ErrorFormat => "Error: Format failed",
        }
    }
}

/// Level and gain-reduction meters. Written by the audio thread with
/// relaxed ordering; UI readers tolerate slightly stale values.
#[derive(Debug, Default)]
pub struct Meters {
    pub input_l: AtomicF32,
    pub input_r: AtomicF32,
    pub output_l: AtomicF32,
    pub output_r: AtomicF32,
    pub gain_reduction_db: AtomicF32,
}

impl Meters {
    fn clear(&self) {
        self.input_l.store(0.0, Ordering::Relaxed);
        self.input_r.store(0.0, Ordering::Relaxed);
        self.output_l.store(0.0, Ordering::Relaxed);
        self.output_r.store(0.0, Ordering::Relaxed);
        self.gain_reduction_db.store(0.0, Ordering::Relaxed);
    }
}

/// Debug counters (write-audio / read-controller, relaxed)
#[derive(Debug, Default)]
pub struct DebugCounters {
    pub frames_processed: AtomicU64,
    pub overflows: AtomicU64,
    pub sample_rate: AtomicU32,
    pub channels: AtomicU32,
}

/// Streams held while running. Field order gives the teardown order:
/// capture stops first, then playback, then the ring is released.
struct EngineStreams {
    _capture: Stream,
    _playback: Stream,
    _ring: Arc<CircularBuffer>,
}

pub struct AudioEngine {
    params: Arc<SharedParams>,
    meters: Arc<Meters>,
    debug: Arc<DebugCounters>,
    status: AtomicU8,
    running: AtomicBool,
    error_detail: Mutex<String>,
    streams: Option<EngineStreams>,
}

impl AudioEngine {
    pub fn new(params: Arc<SharedParams>) -> Self {
        Self {
            params,
            meters: Arc::new(Meters::default()),
            debug: Arc::new(DebugCounters::default()),
            status: AtomicU8::new(Status::Stopped as u8),
            running: AtomicBool::new(false),
            error_detail: Mutex::new(String::new()),
            streams: None,
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn error_detail(&self) -> String {
        self.error_detail.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn meters(&self) -> Arc<Meters> {
        Arc::clone(&self.meters)
    }

    pub fn debug_counters(&self) -> Arc<DebugCounters> {
        Arc::clone(&self.debug)
    }

    /// Start processing. `capture_idx` selects the playback endpoint whose
    /// monitor mix is captured; `playback_idx` selects the output endpoint.
    /// `None` picks the default endpoint. Returns false on failure with the
    /// diagnostic available through `error_detail`.
    pub fn start(&mut self, capture_idx: Option<usize>, playback_idx: Option<usize>) -> bool {
        if self.running.load(Ordering::Relaxed) {
            return false;
        }

        self.status.store(Status::Starting as u8, Ordering::Relaxed);
        self.error_detail.lock().clear();
        self.debug.frames_processed.store(0, Ordering::Relaxed);
        self.debug.overflows.store(0, Ordering::Relaxed);

        match self.try_start(capture_idx, playback_idx) {
            Ok(streams) => {
                self.streams = Some(streams);
                self.running.store(true, Ordering::Relaxed);
                self.status.store(Status::Running as u8, Ordering::Relaxed);
                log::info!("engine running");
                true
            }
            Err(e) => {
                // Everything opened before the failure has already been
                // dropped in reverse order by unwinding try_start
                let status = match e {
                    AudioError::ConfigError(_) | AudioError::UnsupportedSampleRate(_) => {
                        Status::ErrorFormat
                    }
                    AudioError::BackendError(_) => Status::ErrorInit,
                    _ => Status::ErrorDevice,
                };
                log::error!("engine start failed: {e}");
                *self.error_detail.lock() = e.to_string();
                self.status.store(status as u8, Ordering::Relaxed);
                false
            }
        }
    }

    fn try_start(
        &mut self,
        capture_idx: Option<usize>,
        playback_idx: Option<usize>,
    ) -> AudioResult<EngineStreams> {
        let block_size = self
            .params
            .block_size
            .load(Ordering::Relaxed)
            .clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);

        let ring = Arc::new(CircularBuffer::new(RING_CAPACITY));

        let capture_device = open_loopback_device(capture_idx)?;
        let capture_config = negotiate_config(&capture_device, block_size, true)?;

        self.debug
            .sample_rate
            .store(capture_config.sample_rate, Ordering::Relaxed);
        self.debug
            .channels
            .store(capture_config.channels as u32, Ordering::Relaxed);

        let capture = build_capture_stream(
            &capture_device,
            &capture_config,
            Arc::clone(&self.params),
            Arc::clone(&ring),
            Arc::clone(&self.meters),
            Arc::clone(&self.debug),
        )?;

        let playback_device = match playback_idx {
            Some(idx) => crate::get_output_device_by_index(idx)?,
            None => crate::get_default_output_device()?,
        };
        let playback_config = negotiate_config(&playback_device, block_size, false)?;
        let playback = build_playback_stream(&playback_device, &playback_config, Arc::clone(&ring))?;

        // Playback first so the ring drains from the moment capture starts
        playback
            .play()
            .map_err(|e| AudioError::StreamError(format!("playback start: {e}")))?;
        capture
            .play()
            .map_err(|e| AudioError::StreamError(format!("capture start: {e}")))?;

        Ok(EngineStreams {
            _capture: capture,
            _playback: playback,
            _ring: ring,
        })
    }

    pub fn stop(&mut self) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }

        // Dropping EngineStreams stops capture first, then playback, then
        // releases the ring buffer
        self.streams = None;

        self.meters.clear();
        self.running.store(false, Ordering::Relaxed);
        self.status.store(Status::Stopped as u8, Ordering::Relaxed);
        log::info!("engine stopped");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the device whose rendered output we capture. On Windows a playback
/// endpoint is opened directly as a WASAPI loopback input; elsewhere the
/// endpoint's monitor source is used.
fn open_loopback_device(capture_idx: Option<usize>) -> AudioResult<Device> {
    #[cfg(target_os = "windows")]
    {
        match capture_idx {
            Some(idx) => crate::get_output_device_by_index(idx),
            None => crate::get_default_output_device(),
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        let endpoint_name = match capture_idx {
            Some(idx) => crate::list_output_devices()?
                .get(idx)
                .map(|d| d.name.clone()),
            None => None,
        };
        crate::get_monitor_input_device(endpoint_name.as_deref())
    }
}

/// Negotiate f32 stereo at the fixed 48 kHz processing rate
fn negotiate_config(device: &Device, block_size: u32, is_input: bool) -> AudioResult<StreamConfig> {
    let target_rate: cpal::SampleRate = SAMPLE_RATE;

    let supported: Vec<_> = if is_input {
        device
            .supported_input_configs()
            .map_err(|e| AudioError::BackendError(e.to_string()))?
            .collect()
    } else {
        device
            .supported_output_configs()
            .map_err(|e| AudioError::BackendError(e.to_string()))?
            .collect()
    };

    // Prefer an exactly-stereo range so capture and playback agree on the
    // interleaving; otherwise take the narrowest range with at least two
    let candidate = supported
        .iter()
        .filter(|c| {
            c.channels() >= 2
                && c.min_sample_rate() <= target_rate
                && c.max_sample_rate() >= target_rate
                && c.sample_format() == SampleFormat::F32
        })
        .min_by_key(|c| c.channels());

    if let Some(config) = candidate {
        return Ok(StreamConfig {
            channels: config.channels(),
            sample_rate: target_rate,
            buffer_size: BufferSize::Fixed(block_size),
        });
    }

    Err(AudioError::ConfigError(format!(
        "no f32 stereo config at {} Hz",
        SAMPLE_RATE
    )))
}

/// Subsampled peak scan folded into the decaying level atomics
fn update_peak_meters(
    buffer: &[Sample],
    num_frames: usize,
    num_channels: usize,
    level_l: &AtomicF32,
    level_r: &AtomicF32,
) {
    let mut peak_l = 0.0_f32;
    let mut peak_r = 0.0_f32;
    let mut frame = 0;
    while frame < num_frames {
        let idx = frame * num_channels;
        peak_l = peak_l.max(buffer[idx].abs());
        if num_channels > 1 {
            peak_r = peak_r.max(buffer[idx + 1].abs());
        }
        frame += METER_STRIDE;
    }

    let decayed_l = level_l.load(Ordering::Relaxed) * METER_DECAY;
    let decayed_r = level_r.load(Ordering::Relaxed) * METER_DECAY;
    level_l.store(peak_l.max(decayed_l), Ordering::Relaxed);
    level_r.store(peak_r.max(decayed_r), Ordering::Relaxed);
}

fn build_capture_stream(
    device: &Device,
    config: &StreamConfig,
    params: Arc<SharedParams>,
    ring: Arc<CircularBuffer>,
    meters: Arc<Meters>,
    debug: Arc<DebugCounters>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate as f32;

    let mut chain = DspChain::new(params, sample_rate);
    let mut scratch = vec![0.0_f32; MAX_BLOCK_SIZE as usize * channels.max(2)];

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let frames = data.len() / channels;
                if frames == 0 {
                    return;
                }

                update_peak_meters(data, frames, channels, &meters.input_l, &meters.input_r);

                let total = frames * channels;
                if scratch.len() < total {
                    // Only reachable if the host delivers blocks beyond the
                    // configured maximum
                    scratch.resize(total, 0.0);
                }
                let buf = &mut scratch[..total];
                buf.copy_from_slice(&data[..total]);

                chain.process(buf, frames, channels, sample_rate);

                update_peak_meters(buf, frames, channels, &meters.output_l, &meters.output_r);
                meters
                    .gain_reduction_db
                    .store(chain.gain_reduction_db(), Ordering::Relaxed);

                // Overflow policy: drop the block, playback keeps draining
                if !ring.write(buf) {
                    debug.overflows.fetch_add(1, Ordering::Relaxed);
                }
                debug
                    .frames_processed
                    .fetch_add(frames as u64, Ordering::Relaxed);
            },
            move |err| {
                log::error!("capture stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("loopback: {e}")))?;

    Ok(stream)
}

fn build_playback_stream(
    device: &Device,
    config: &StreamConfig,
    ring: Arc<CircularBuffer>,
) -> AudioResult<Stream> {
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Exactly one block or silence
                if !ring.read(data) {
                    data.fill(0.0);
                }
            },
            move |err| {
                log::error!("playback stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("playback: {e}")))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            Status::Stopped,
            Status::Starting,
            Status::Running,
            Status::ErrorInit,
            Status::ErrorDevice,
            Status::ErrorFormat,
        ] {
            assert_eq!(Status::from_u8(status as u8), status);
        }
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(Status::Stopped.as_str(), "Stopped");
        assert_eq!(Status::Running.as_str(), "Running");
        assert!(Status::ErrorDevice.as_str().starts_with("Error"));
    }

    #[test]
    fn test_engine_initial_state() {
        let engine = AudioEngine::new(Arc::new(SharedParams::new()));
        assert_eq!(engine.status(), Status::Stopped);
        assert!(!engine.is_running());
        assert!(engine.error_detail().is_empty());
    }

    #[test]
    fn test_meter_update_decays() {
        let meters = Meters::default();
        let loud = vec![0.8_f32; 64 * 2];

        update_peak_meters(&loud, 64, 2, &meters.input_l, &meters.input_r);
        assert!((meters.input_l.load(Ordering::Relaxed) - 0.8).abs() < 1e-6);

        // Silence decays the level instead of zeroing it
        let quiet = vec![0.0_f32; 64 * 2];
        update_peak_meters(&quiet, 64, 2, &meters.input_l, &meters.input_r);
        let level = meters.input_l.load(Ordering::Relaxed);
        assert!((level - 0.8 * METER_DECAY).abs() < 1e-6);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut engine = AudioEngine::new(Arc::new(SharedParams::new()));
        engine.stop();
        assert_eq!(engine.status(), Status::Stopped);
    }
}
