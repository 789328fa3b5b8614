use crate::error::{RentalError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The span a vehicle is rented for.
///
/// Older records named these fields `start_time` and `expected_end_time`; the
/// aliases accept them on read, everything written uses the canonical names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalWindow {
    #[serde(alias = "start_time", alias = "startTime")]
    pub pickup: DateTime<Utc>,
    #[serde(rename = "return", alias = "expected_end_time", alias = "expectedEndTime")]
    pub return_at: DateTime<Utc>,
}

impl RentalWindow {
    pub fn new(pickup: DateTime<Utc>, return_at: DateTime<Utc>) -> Result<Self> {
        let window = Self { pickup, return_at };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.return_at > self.pickup {
            Ok(())
        } else {
            Err(RentalError::InvalidWindow)
        }
    }

    pub fn duration(&self) -> Duration {
        self.return_at - self.pickup
    }

    /// Whole hours in the window, truncated.
    pub fn elapsed_hours(&self) -> i64 {
        self.duration().num_hours()
    }

    /// Half-open overlap: a rental returning at 10:00 does not collide with
    /// one picked up at 10:00.
    pub fn overlaps(&self, other: &RentalWindow) -> bool {
        self.pickup < other.return_at && other.pickup < self.return_at
    }
}
