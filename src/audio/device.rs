use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SampleFormat};
use log::warn;

use crate::error::AudioError;

/// Summary of an output device for listing
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub name: String,
    pub is_default: bool,
    pub max_channels: u16,
    pub sample_rates: Vec<u32>,
    pub sample_format: Option<SampleFormat>,
}

/// Enumerates output devices and resolves the configured one
pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>, AudioError> {
        let default_name = self.host.default_output_device().and_then(|d| d.name().ok());
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        let mut summaries = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            summaries.push(Self::summarize(&device, name.clone(), default_name.as_deref() == Some(name.as_str())));
        }
        Ok(summaries)
    }

    fn summarize(device: &Device, name: String, is_default: bool) -> DeviceSummary {
        let mut max_channels = 0;
        let mut sample_rates = Vec::new();
        if let Ok(configs) = device.supported_output_configs() {
            for config in configs {
                max_channels = max_channels.max(config.channels());
                for rate in [44100, 48000, 88200, 96000, 176400, 192000] {
                    if rate >= config.min_sample_rate().0 && rate <= config.max_sample_rate().0 && !sample_rates.contains(&rate) {
                        sample_rates.push(rate);
                    }
                }
            }
        }
        sample_rates.sort_unstable();
        let sample_format = device.default_output_config().ok().map(|c| c.sample_format());

        DeviceSummary {
            name,
            is_default,
            max_channels,
            sample_rates,
            sample_format,
        }
    }

    /// Resolve a device by name, falling back to the default device
    pub fn select_device_with_fallback(&self, device_name: Option<&str>) -> Result<Device, AudioError> {
        if let Some(name) = device_name {
            let found = self
                .host
                .output_devices()
                .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?
                .find(|device| device.name().map(|n| n == name).unwrap_or(false));
            match found {
                Some(device) => return Ok(device),
                None => warn!("Audio device '{}' not found, using default output", name),
            }
        }

        self.host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound {
                device: device_name.unwrap_or("default").to_string(),
            })
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
