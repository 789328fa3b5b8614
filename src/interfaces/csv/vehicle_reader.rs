use crate::domain::money::Money;
use crate::domain::vehicle::{RateSchedule, StationId, Vehicle, VehicleId};
use crate::error::{RentalError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct VehicleRecord {
    vehicle: VehicleId,
    station: StationId,
    daily_rate: Decimal,
    hourly_rate: Decimal,
    deposit: Option<Decimal>,
    #[serde(default = "default_capacity")]
    capacity: u32,
}

fn default_capacity() -> u32 {
    1
}

impl TryFrom<VehicleRecord> for Vehicle {
    type Error = RentalError;

    fn try_from(record: VehicleRecord) -> Result<Self> {
        Ok(Vehicle {
            id: record.vehicle,
            station_id: record.station,
            rates: RateSchedule::new(
                Money::new(record.daily_rate),
                Money::new(record.hourly_rate),
                record.deposit.map(Money::new),
            )?,
            capacity: record.capacity,
        })
    }
}

/// Reads the fleet from a CSV source. An empty `deposit` column means the
/// vehicle has no deposit of its own.
pub struct VehicleReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> VehicleReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn vehicles(self) -> impl Iterator<Item = Result<Vehicle>> {
        self.reader
            .into_deserialize::<VehicleRecord>()
            .map(|row| Vehicle::try_from(row?))
    }
}
