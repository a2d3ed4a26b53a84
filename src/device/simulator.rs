//! Host-side device stand-ins.
//!
//! These let the collector loop run on a workstation against a real table
//! store. Readings are deterministic so runs are reproducible.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use super::{AccessPoint, DeviceError, Microphone, Radio, RadioStatus, StatusLed, TemperatureSensor};

/// Radio that fails a scripted number of connection attempts, then joins.
pub struct SimRadio {
    status: RadioStatus,
    failures_left: usize,
    visible: Vec<AccessPoint>,
    attempts: usize,
}

impl SimRadio {
    /// A radio that connects on the first attempt.
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// A radio whose first `failures` connection attempts fail.
    pub fn failing(failures: usize) -> Self {
        Self {
            status: RadioStatus::Idle,
            failures_left: failures,
            visible: Vec::new(),
            attempts: 0,
        }
    }

    /// Sets the access points reported by scans.
    pub fn with_visible(mut self, visible: Vec<AccessPoint>) -> Self {
        self.visible = visible;
        self
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for SimRadio {
    fn status(&self) -> RadioStatus {
        self.status
    }

    fn scan_networks(&mut self) -> Result<Vec<AccessPoint>, DeviceError> {
        Ok(self.visible.clone())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), DeviceError> {
        self.attempts += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            self.status = RadioStatus::Disconnected;
            return Err(DeviceError::Connect {
                ssid: ssid.to_string(),
                reason: "no response from access point".to_string(),
            });
        }
        self.status = RadioStatus::Connected;
        Ok(())
    }
}

/// Microphone producing a sine tone around the mid-scale bias.
pub struct SimMicrophone {
    amplitude: f64,
    frequency_hz: f64,
    sample_rate_hz: f64,
    phase: f64,
}

impl SimMicrophone {
    /// Mid-scale bias of an unsigned 16-bit PDM stream.
    const BIAS: f64 = 32_768.0;

    pub fn new(amplitude: f64, frequency_hz: f64, sample_rate_hz: u32) -> Self {
        Self {
            amplitude: amplitude.clamp(0.0, Self::BIAS - 1.0),
            frequency_hz,
            sample_rate_hz: f64::from(sample_rate_hz.max(1)),
            phase: 0.0,
        }
    }
}

impl Microphone for SimMicrophone {
    fn record(&mut self, buf: &mut [u16]) -> Result<(), DeviceError> {
        let step = TAU * self.frequency_hz / self.sample_rate_hz;
        for sample in buf.iter_mut() {
            let value = Self::BIAS + self.amplitude * self.phase.sin();
            *sample = value.round().clamp(0.0, f64::from(u16::MAX)) as u16;
            self.phase = (self.phase + step) % TAU;
        }
        Ok(())
    }
}

/// Thermometer replaying a fixed sequence of Celsius readings, cycling.
pub struct SimThermometer {
    readings: VecDeque<f64>,
}

impl SimThermometer {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
        }
    }
}

impl TemperatureSensor for SimThermometer {
    fn temperature_celsius(&mut self) -> Result<f64, DeviceError> {
        let value = self
            .readings
            .pop_front()
            .ok_or_else(|| DeviceError::Sensor("no readings configured".to_string()))?;
        self.readings.push_back(value);
        Ok(value)
    }
}

/// LED that remembers its last state.
#[derive(Debug, Default)]
pub struct SimLed {
    pub on: bool,
    pub toggles: usize,
}

impl StatusLed for SimLed {
    fn set(&mut self, on: bool) {
        if self.on != on {
            self.toggles += 1;
        }
        self.on = on;
    }
}
