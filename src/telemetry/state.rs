use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{epoch_millis, from_epoch_millis, is_stale_at, truncate_to_millis, DEFAULT_MAX_AGE};
use crate::error::ValidationError;

/// Battery level at or below which an asset is unhealthy.
pub const HEALTHY_BATTERY_THRESHOLD: f64 = 20.0;
/// Temperature at or above which an asset is unhealthy.
pub const MAX_HEALTHY_TEMPERATURE: f64 = 80.0;
/// Battery level strictly below which an asset needs charging.
pub const CHARGING_THRESHOLD: f64 = 20.0;

/// Latest operational state of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StatePayload", try_from = "StatePayload")]
pub struct StateRecord {
    current_speed: f64,
    battery_level: f64,
    current_load: Option<f64>,
    temperature: Option<f64>,
    error_codes: Option<Vec<String>>,
    timestamp: DateTime<Utc>,
}

/// Wire form of a state as stored under `asset:<id>:state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub current_speed: f64,
    pub battery_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_codes: Option<Vec<String>>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl StateRecord {
    /// The timestamp is truncated to milliseconds like the stored form.
    pub fn new(
        current_speed: f64,
        battery_level: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if !current_speed.is_finite() {
            return Err(ValidationError::NotFinite { field: "currentSpeed" });
        }
        if current_speed < 0.0 {
            return Err(ValidationError::NegativeSpeed(current_speed));
        }
        if !(0.0..=100.0).contains(&battery_level) {
            return Err(ValidationError::BatteryOutOfRange(battery_level));
        }
        Ok(Self {
            current_speed,
            battery_level,
            current_load: None,
            temperature: None,
            error_codes: None,
            timestamp: truncate_to_millis(timestamp),
        })
    }

    pub fn with_load(
        mut self,
        load: f64,
    ) -> Result<Self, ValidationError> {
        if !load.is_finite() {
            return Err(ValidationError::NotFinite { field: "currentLoad" });
        }
        if load < 0.0 {
            return Err(ValidationError::NegativeLoad(load));
        }
        self.current_load = Some(load);
        Ok(self)
    }

    pub fn with_temperature(
        mut self,
        temperature: f64,
    ) -> Result<Self, ValidationError> {
        if !temperature.is_finite() {
            return Err(ValidationError::NotFinite { field: "temperature" });
        }
        self.temperature = Some(temperature);
        Ok(self)
    }

    pub fn with_error_codes<I, S>(
        mut self,
        codes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn battery_level(&self) -> f64 {
        self.battery_level
    }

    pub fn current_load(&self) -> Option<f64> {
        self.current_load
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Error codes in reported order; empty when none were reported.
    pub fn error_codes(&self) -> &[String] {
        self.error_codes.as_deref().unwrap_or(&[])
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn has_errors(&self) -> bool {
        !self.error_codes().is_empty()
    }

    /// Battery above 20, no error codes, and temperature absent or below 80.
    pub fn is_healthy(&self) -> bool {
        self.battery_level > HEALTHY_BATTERY_THRESHOLD
            && !self.has_errors()
            && self
                .temperature
                .map_or(true, |t| t < MAX_HEALTHY_TEMPERATURE)
    }

    pub fn needs_charging(&self) -> bool {
        self.battery_level < CHARGING_THRESHOLD
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_after(DEFAULT_MAX_AGE)
    }

    pub fn is_stale_after(
        &self,
        max_age: Duration,
    ) -> bool {
        is_stale_at(self.timestamp, max_age, Utc::now())
    }
}

impl From<StateRecord> for StatePayload {
    fn from(s: StateRecord) -> Self {
        Self {
            current_speed: s.current_speed,
            battery_level: s.battery_level,
            current_load: s.current_load,
            temperature: s.temperature,
            error_codes: s.error_codes,
            timestamp: epoch_millis(s.timestamp),
        }
    }
}

impl TryFrom<StatePayload> for StateRecord {
    type Error = ValidationError;

    fn try_from(p: StatePayload) -> Result<Self, Self::Error> {
        let timestamp = from_epoch_millis(p.timestamp)?;
        let mut record = StateRecord::new(p.current_speed, p.battery_level, timestamp)?;
        if let Some(load) = p.current_load {
            record = record.with_load(load)?;
        }
        if let Some(temperature) = p.temperature {
            record = record.with_temperature(temperature)?;
        }
        record.error_codes = p.error_codes;
        Ok(record)
    }
}
