#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rentcore::application::settlement::SettlementCoordinator;
use rentcore::domain::booking::BookingRequest;
use rentcore::domain::identity::{Actor, RequestContext};
use rentcore::domain::money::Money;
use rentcore::domain::pricing::RentalOptions;
use rentcore::domain::vehicle::{RateSchedule, StationId, Vehicle, VehicleId};
use rentcore::domain::window::RentalWindow;
use rentcore::infrastructure::gateway::SandboxGateway;
use rentcore::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryInventory, InMemoryPaymentStore,
};
use rust_decimal_macros::dec;
use std::io::Error;
use std::path::Path;

pub struct Fixture {
    pub engine: SettlementCoordinator,
    pub inventory: InMemoryInventory,
    pub gateway: SandboxGateway,
}

/// A fleet of one vehicle `v1` at station `s1` renting at 500,000/day and
/// 50,000/hour.
pub async fn fixture(capacity: u32, deposit: Option<Money>) -> Fixture {
    let inventory = InMemoryInventory::new();
    inventory
        .add_vehicle(Vehicle {
            id: VehicleId("v1".into()),
            station_id: StationId("s1".into()),
            rates: standard_rates(deposit),
            capacity,
        })
        .await;
    let gateway = SandboxGateway::default();
    let engine = SettlementCoordinator::new(
        Box::new(InMemoryBookingStore::new()),
        Box::new(InMemoryPaymentStore::new()),
        Box::new(inventory.clone()),
        Box::new(gateway.clone()),
    );
    Fixture {
        engine,
        inventory,
        gateway,
    }
}

pub fn standard_rates(deposit: Option<Money>) -> RateSchedule {
    RateSchedule::new(Money::new(dec!(500000)), Money::new(dec!(50000)), deposit).unwrap()
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
}

pub fn renter(id: &str, at: DateTime<Utc>) -> RequestContext {
    RequestContext::new(Actor::renter(id), at)
}

pub fn staff(at: DateTime<Utc>) -> RequestContext {
    RequestContext::new(Actor::staff("ops"), at)
}

pub fn request(pickup: DateTime<Utc>, duration: Duration) -> BookingRequest {
    BookingRequest {
        vehicle_id: VehicleId("v1".into()),
        station_id: StationId("s1".into()),
        window: RentalWindow::new(pickup, pickup + duration).unwrap(),
        options: RentalOptions::default(),
        pickup_note: None,
    }
}

/// A random window starting somewhere in 2025 and lasting between one hour
/// and thirty days, with minute granularity.
pub fn random_window(rng: &mut impl Rng) -> RentalWindow {
    let pickup = epoch() + Duration::minutes(rng.gen_range(0..525_600));
    let minutes = rng.gen_range(60..=30 * 24 * 60);
    RentalWindow::new(pickup, pickup + Duration::minutes(minutes)).unwrap()
}

/// Writes a fleet file with one high-capacity vehicle `v1` at `s1`.
pub fn generate_fleet(path: &Path, capacity: u32) -> Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    wtr.write_record(["vehicle", "station", "daily_rate", "hourly_rate", "deposit", "capacity"])?;
    let capacity = capacity.to_string();
    wtr.write_record(["v1", "s1", "500000", "50000", "1000000", capacity.as_str()])?;
    wtr.flush()?;
    Ok(())
}

/// Writes a command script booking `bookings` random windows on `v1`, each
/// paid in cash and marked received by staff.
pub fn generate_commands(path: &Path, bookings: usize, seed: u64) -> Result<(), Error> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    wtr.write_record([
        "type", "booking", "actor", "at", "vehicle", "station", "pickup", "return", "method",
        "insurance", "result", "reference",
    ])?;

    let at = epoch().to_rfc3339();
    let at = at.as_str();
    for i in 1..=bookings {
        let label = format!("b{i}");
        let renter = format!("renter:r{}", rng.gen_range(1..=50));
        let window = random_window(&mut rng);
        let pickup = window.pickup.to_rfc3339();
        let return_at = window.return_at.to_rfc3339();
        let insurance = rng.gen_bool(0.3).to_string();
        let reference = format!("CASH-{i}");
        let (label, renter) = (label.as_str(), renter.as_str());

        wtr.write_record([
            "book",
            label,
            renter,
            at,
            "v1",
            "s1",
            pickup.as_str(),
            return_at.as_str(),
            "",
            insurance.as_str(),
            "",
            "",
        ])?;
        wtr.write_record(["pay", label, renter, at, "", "", "", "", "cash", "", "", ""])?;
        wtr.write_record([
            "mark_paid",
            label,
            "staff:ops",
            at,
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            reference.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
