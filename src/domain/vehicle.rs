use super::money::Money;
use crate::error::{RentalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub String);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The prices a vehicle is rented at. Read-only to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSchedule {
    pub daily_rate: Money,
    pub hourly_rate: Money,
    /// `None` when the vehicle record carries no deposit; pricing falls back
    /// to the configured default deposit.
    pub deposit_amount: Option<Money>,
}

impl RateSchedule {
    pub fn new(daily_rate: Money, hourly_rate: Money, deposit_amount: Option<Money>) -> Result<Self> {
        let deposit = deposit_amount.unwrap_or(Money::ZERO);
        for (name, value) in [
            ("daily rate", daily_rate),
            ("hourly rate", hourly_rate),
            ("deposit", deposit),
        ] {
            if value < Money::ZERO {
                return Err(RentalError::Validation(format!(
                    "{name} must not be negative"
                )));
            }
        }
        Ok(Self {
            daily_rate,
            hourly_rate,
            deposit_amount,
        })
    }
}

/// An inventory entry. `capacity` is how many units of this vehicle can be
/// out on rental at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub station_id: StationId,
    pub rates: RateSchedule,
    pub capacity: u32,
}
