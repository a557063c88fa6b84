//! Location request options.
//!
//! [`RequestOptions`] is an immutable value describing how location should be
//! acquired: desired accuracy class, minimum update interval, minimum
//! displacement between updates, and a power priority tier. Options are built
//! once per request and never mutated; equality is value-based.
//!
//! Options cross the process boundary inside `REQUEST_SINGLE_LOCATION`
//! messages as a flat key/value payload. The serde representation keeps that
//! payload forward-compatible: unknown keys are ignored on decode and missing
//! keys fall back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default minimum interval between continuous updates (5 minutes).
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(300);

/// Default minimum displacement between continuous updates, in meters.
pub const DEFAULT_MIN_DISPLACEMENT_M: f32 = 800.0;

/// Errors for structurally invalid request options.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptionsError {
    /// The minimum displacement is negative, NaN or infinite.
    #[error("minimum displacement must be a finite, non-negative number of meters (got {0})")]
    InvalidDisplacement(f32),
}

/// Desired accuracy class for a location request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyClass {
    /// Coarse, cell/network level accuracy.
    Coarse,

    /// Balanced accuracy, typically block level.
    Balanced,

    /// Best available accuracy, typically GPS.
    Precise,
}

/// Power priority tier for a location request.
///
/// Higher tiers allow the service to spend more power acquiring the fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPriority {
    /// Most accurate fixes regardless of power cost.
    HighAccuracy,

    /// Trade accuracy against power use.
    BalancedPowerAccuracy,

    /// Low power sources only.
    LowPower,

    /// Piggyback on fixes requested by other consumers, no extra power.
    NoPower,
}

/// Options for a location request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Desired accuracy class.
    pub accuracy: AccuracyClass,

    /// Minimum interval between updates.
    #[serde(rename = "min_interval_ms", with = "duration_ms")]
    pub min_interval: Duration,

    /// Minimum displacement between updates, in meters.
    pub min_displacement_m: f32,

    /// Power priority tier.
    pub priority: PowerPriority,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            accuracy: AccuracyClass::Balanced,
            min_interval: DEFAULT_MIN_INTERVAL,
            min_displacement_m: DEFAULT_MIN_DISPLACEMENT_M,
            priority: PowerPriority::BalancedPowerAccuracy,
        }
    }
}

impl RequestOptions {
    /// Validates the options.
    ///
    /// The interval cannot be negative by construction (`Duration` is
    /// unsigned), so only the displacement is checked.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !self.min_displacement_m.is_finite() || self.min_displacement_m < 0.0 {
            return Err(OptionsError::InvalidDisplacement(self.min_displacement_m));
        }
        Ok(())
    }
}

/// Serializes a `Duration` as whole milliseconds for the wire payload.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
