pub mod signal;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CollectorConfig, WifiConfig};
use crate::device::{Microphone, Radio, StatusLed, TemperatureSensor};
use crate::export::health::HealthMetrics;
use crate::record::EnvironmentalReading;
use crate::store::{InsertError, TableStore};

use self::signal::{c_to_f, normalized_rms_as_dbs};

/// The hardware the collector drives.
pub struct Devices {
    pub radio: Box<dyn Radio>,
    pub microphone: Box<dyn Microphone>,
    pub thermometer: Box<dyn TemperatureSensor>,
    pub led: Box<dyn StatusLed>,
}

/// What one collector iteration did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The reading was inserted.
    Posted(EnvironmentalReading),
    /// The store refused the reading or the request failed; it is dropped.
    Rejected(EnvironmentalReading),
    /// No reading could be taken this iteration.
    Skipped,
    /// Cancelled mid-iteration.
    Cancelled,
}

/// Samples noise and temperature on a fixed period and inserts one reading
/// per iteration into the environmental table.
pub struct Collector<S> {
    cfg: CollectorConfig,
    wifi: WifiConfig,
    store: Arc<S>,
    devices: Devices,
    health: Arc<HealthMetrics>,
    samples: Vec<u16>,
    cancel: CancellationToken,
}

impl<S: TableStore> Collector<S> {
    pub fn new(
        cfg: CollectorConfig,
        wifi: WifiConfig,
        store: Arc<S>,
        devices: Devices,
        health: Arc<HealthMetrics>,
    ) -> Self {
        let samples = vec![0u16; cfg.sample_count];
        Self {
            cfg,
            wifi,
            store,
            devices,
            health,
            samples,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops [`Collector::run`] when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Connects, then runs iterations until cancelled.
    pub async fn run(mut self) {
        self.log_radio_diagnostics();

        if !self.connect().await {
            info!("collector cancelled before connecting");
            return;
        }

        loop {
            if self.run_once().await == Outcome::Cancelled {
                break;
            }
            if !pause(&self.cancel, self.cfg.interval).await {
                break;
            }
        }

        self.devices.led.set(false);
        info!("collector stopped");
    }

    /// Logs radio status and visible access points.
    pub fn log_radio_diagnostics(&mut self) {
        info!(status = self.devices.radio.status().as_str(), "radio status");

        match self.devices.radio.scan_networks() {
            Ok(aps) => {
                for ap in aps {
                    info!(ssid = %ap.ssid, rssi = ap.rssi, "visible access point");
                }
            }
            Err(e) => warn!(error = %e, "access point scan failed"),
        }
    }

    /// Joins the configured access point, retrying without limit.
    ///
    /// Returns false only if cancelled first.
    pub async fn connect(&mut self) -> bool {
        while !self.devices.radio.is_connected() {
            if self.cancel.is_cancelled() {
                return false;
            }

            self.health.connect_attempts.inc();
            match self
                .devices
                .radio
                .connect(&self.wifi.ssid, &self.wifi.password)
            {
                Ok(()) => info!(ssid = %self.wifi.ssid, "connected to access point"),
                Err(e) => {
                    warn!(error = %e, "could not connect to access point, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }
        true
    }

    /// One iteration: sample, post, report.
    pub async fn run_once(&mut self) -> Outcome {
        self.devices.led.set(true);

        let outcome = match self.sample().await {
            Sample::Reading(reading) => self.post(reading).await,
            Sample::Unusable => {
                self.health.readings_skipped.inc();
                Outcome::Skipped
            }
            Sample::Cancelled => Outcome::Cancelled,
        };

        self.devices.led.set(false);
        outcome
    }

    async fn sample(&mut self) -> Sample {
        let noise_level = match self.devices.microphone.record(&mut self.samples) {
            Ok(()) => match normalized_rms_as_dbs(&self.samples) {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!(
                        error = %e,
                        samples = self.samples.len(),
                        "no sound level this iteration",
                    );
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "microphone read failed");
                None
            }
        };

        if !pause(&self.cancel, self.cfg.sound_settle).await {
            return Sample::Cancelled;
        }

        let temperature = match self.devices.thermometer.temperature_celsius() {
            Ok(celsius) => Some(c_to_f(celsius)),
            Err(e) => {
                warn!(error = %e, "temperature read failed");
                None
            }
        };

        if !pause(&self.cancel, self.cfg.temperature_settle).await {
            return Sample::Cancelled;
        }

        match (noise_level, temperature) {
            (Some(noise_level), Some(temperature)) => Sample::Reading(EnvironmentalReading {
                noise_level,
                temperature,
            }),
            _ => Sample::Unusable,
        }
    }

    async fn post(&mut self, reading: EnvironmentalReading) -> Outcome {
        self.health.last_noise_level_db.set(reading.noise_level);
        self.health.last_temperature_f.set(f64::from(reading.temperature));

        let start = Instant::now();
        let result = self.store.insert_reading(reading).await;
        self.health
            .post_duration
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.health.readings_posted.inc();
                debug!(
                    noise_level = reading.noise_level,
                    temperature = reading.temperature,
                    "reading inserted",
                );
                Outcome::Posted(reading)
            }
            Err(InsertError::Rejected { status, body }) => {
                self.health.readings_rejected.inc();
                error!(status, body = %body, "insert rejected, reading dropped");
                Outcome::Rejected(reading)
            }
            Err(e) => {
                self.health.readings_rejected.inc();
                error!(error = %e, "insert failed, reading dropped");
                Outcome::Rejected(reading)
            }
        }
    }
}

enum Sample {
    Reading(EnvironmentalReading),
    /// A sensor or the signal produced nothing usable.
    Unusable,
    Cancelled,
}

/// Sleeps for `duration`. Returns false if cancelled first.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
