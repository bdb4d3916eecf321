//! Audio endpoint enumeration and selection
//!
//! The capture side of the pipeline is a loopback monitor of a playback
//! endpoint, so the endpoint list used for capture selection is the same
//! output-device list used for playback selection.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedStreamConfigRange};
use parking_lot::RwLock;

use crate::{AudioError, AudioResult};

/// Audio endpoint information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
    pub sample_rates: Vec<u32>,
}

/// Get the audio host (platform-specific backend)
pub fn get_host() -> Host {
    // The default host is the one that provides loopback/monitor capture:
    // WASAPI on Windows, PulseAudio/PipeWire monitors through ALSA on
    // Linux, CoreAudio on macOS.
    cpal::default_host()
}

fn extract_device_info(configs: &[SupportedStreamConfigRange]) -> (u16, Vec<u32>) {
    let max_channels = configs.iter().map(|c| c.channels()).max().unwrap_or(0);

    let mut sample_rates: Vec<u32> = configs
        .iter()
        .flat_map(|c| {
            let min = c.min_sample_rate();
            let max = c.max_sample_rate();

            [44100, 48000, 88200, 96000, 176400, 192000]
                .into_iter()
                .filter(move |&rate| rate >= min && rate <= max)
        })
        .collect();

    sample_rates.sort_unstable();
    sample_rates.dedup();

    (max_channels, sample_rates)
}

/// List available output endpoints
pub fn list_output_devices() -> AudioResult<Vec<DeviceInfo>> {
    let host = get_host();
    let default_device = host.default_output_device();
    let default_name = default_device.as_ref().and_then(|d| d.name().ok());

    let mut devices = Vec::new();

    for device in host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
    {
        if let Ok(name) = device.name() {
            let is_default = default_name.as_ref().map(|d| d == &name).unwrap_or(false);

            let configs: Vec<SupportedStreamConfigRange> = device
                .supported_output_configs()
                .map(|c| c.collect())
                .unwrap_or_default();
            let (channels, sample_rates) = extract_device_info(&configs);

            devices.push(DeviceInfo {
                name,
                is_default,
                channels,
                sample_rates,
            });
        }
    }

    Ok(devices)
}

/// Get the output endpoint at the given enumeration index
pub fn get_output_device_by_index(index: usize) -> AudioResult<Device> {
    let host = get_host();
    host.output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
        .nth(index)
        .ok_or(AudioError::DeviceIndexOutOfRange(index))
}

/// Get the default output endpoint
pub fn get_default_output_device() -> AudioResult<Device> {
    let host = get_host();
    host.default_output_device().ok_or(AudioError::NoDevice)
}

/// Find the enumeration index of an output endpoint by display name
pub fn find_output_device_index(name: &str) -> Option<usize> {
    let devices = list_output_devices().ok()?;
    devices.iter().position(|d| d.name == name)
}

/// Get a fallback input device for platforms without output loopback
/// (PulseAudio/PipeWire expose endpoint monitors as input sources)
pub fn get_monitor_input_device(output_name: Option<&str>) -> AudioResult<Device> {
    let host = get_host();

    if let Some(output_name) = output_name {
        let inputs = host
            .input_devices()
            .map_err(|e| AudioError::BackendError(e.to_string()))?;
        for device in inputs {
            if let Ok(name) = device.name() {
                if name.contains("monitor") && name.contains(output_name) {
                    return Ok(device);
                }
            }
        }
    }

    // Any monitor source, then the default input
    let inputs = host
        .input_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?;
    for device in inputs {
        if let Ok(name) = device.name() {
            if name.contains("monitor") {
                return Ok(device);
            }
        }
    }

    host.default_input_device().ok_or(AudioError::NoDevice)
}

/// Cached endpoint list with the current selection, for the control surface
pub struct DeviceManager {
    devices: RwLock<Vec<DeviceInfo>>,
    selection: RwLock<Selection>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub capture_from: Option<String>,
    pub play_to: Option<String>,
}

impl DeviceManager {
    pub fn new() -> Self {
        let manager = Self {
            devices: RwLock::new(Vec::new()),
            selection: RwLock::new(Selection::default()),
        };
        manager.refresh();
        manager
    }

    /// Re-enumerate endpoints
    pub fn refresh(&self) {
        match list_output_devices() {
            Ok(devices) => *self.devices.write() = devices,
            Err(e) => log::warn!("device enumeration failed: {e}"),
        }
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.read().clone()
    }

    pub fn selection(&self) -> Selection {
        self.selection.read().clone()
    }

    pub fn set_capture_from(&self, name: Option<String>) {
        self.selection.write().capture_from = name;
    }

    pub fn set_play_to(&self, name: Option<String>) {
        self.selection.write().play_to = name;
    }

    pub fn default_device_name(&self) -> Option<String> {
        self.devices
            .read()
            .iter()
            .find(|d| d.is_default)
            .map(|d| d.name.clone())
    }

    /// Resolve a display name to an enumeration index; `None` maps to the
    /// default endpoint's index when one exists
    pub fn resolve_index(&self, name: Option<&str>) -> Option<usize> {
        let devices = self.devices.read();
        match name {
            Some(name) => devices.iter().position(|d| d.name == name),
            None => devices.iter().position(|d| d.is_default),
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
