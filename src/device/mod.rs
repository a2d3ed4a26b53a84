//! Hardware seams for the collector.
//!
//! Board drivers implement these traits; [`simulator`] provides host-side
//! stand-ins so the collector loop runs off-device.

pub mod simulator;

use thiserror::Error;

/// Errors raised by device drivers.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("could not connect to access point {ssid:?}: {reason}")]
    Connect { ssid: String, reason: String },

    #[error("temperature sensor read failed: {0}")]
    Sensor(String),

    #[error("microphone capture failed: {0}")]
    Microphone(String),
}

/// Radio state as reported by the WiFi coprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    Idle,
    Connected,
    Disconnected,
}

impl RadioStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// One visible access point from a network scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub rssi: i32,
}

/// WiFi radio.
pub trait Radio: Send {
    fn status(&self) -> RadioStatus;

    fn is_connected(&self) -> bool {
        self.status() == RadioStatus::Connected
    }

    /// Lists visible access points.
    fn scan_networks(&mut self) -> Result<Vec<AccessPoint>, DeviceError>;

    /// Joins the given access point.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DeviceError>;
}

/// PDM microphone.
pub trait Microphone: Send {
    /// Fills `buf` with raw 16-bit samples.
    fn record(&mut self, buf: &mut [u16]) -> Result<(), DeviceError>;
}

/// Temperature channel of the IMU.
pub trait TemperatureSensor: Send {
    fn temperature_celsius(&mut self) -> Result<f64, DeviceError>;
}

/// On-board status LED.
pub trait StatusLed: Send {
    fn set(&mut self, on: bool);
}
