//! Location fix value type.
//!
//! A [`Fix`] is a single location measurement produced by the background
//! location service. The coordinator treats it as opaque payload: it is
//! delivered to listeners and result handles but never interpreted.

use serde::{Deserialize, Serialize};

/// A single location measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Latitude in decimal degrees.
    pub latitude: f64,

    /// Longitude in decimal degrees.
    pub longitude: f64,

    /// Estimated horizontal accuracy in meters.
    pub accuracy_m: f32,

    /// Measurement time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl Fix {
    /// Creates a new fix.
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f32, timestamp_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            timestamp_ms,
        }
    }

    /// Returns the position as a (latitude, longitude) pair.
    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_pair() {
        let fix = Fix::new(53.5, 10.0, 12.0, 1_700_000_000_000);
        assert_eq!(fix.position(), (53.5, 10.0));
    }

    #[test]
    fn test_fix_json_round_trip() {
        let fix = Fix::new(43.6, 1.4, 25.0, 1_700_000_000_000);
        let json = serde_json::to_string(&fix).unwrap();
        let decoded: Fix = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, fix);
    }
}
