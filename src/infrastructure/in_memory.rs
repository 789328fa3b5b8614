use crate::domain::booking::{Booking, BookingId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{BookingStore, PaymentStore, VehicleInventory};
use crate::domain::vehicle::{RateSchedule, Vehicle, VehicleId};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory booking store.
///
/// Version checks and writes happen under one write lock, so two writers
/// holding the same version cannot both succeed.
#[derive(Default, Clone)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: Booking) -> Result<Booking> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) || bookings.values().any(|b| b.code == booking.code)
        {
            return Err(RentalError::Conflict(format!(
                "booking {} already exists",
                booking.code
            )));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.values().find(|b| b.code == code).cloned())
    }

    async fn update(&self, mut booking: Booking) -> Result<Booking> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get(&booking.id)
            .ok_or_else(|| RentalError::not_found("booking", booking.id))?;
        if stored.version != booking.version {
            return Err(RentalError::Conflict(format!(
                "booking {} was modified concurrently (expected version {}, found {})",
                booking.code, booking.version, stored.version
            )));
        }
        booking.version += 1;
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn list(&self) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut all: Vec<Booking> = bookings.values().cloned().collect();
        all.sort_by_key(|b| (b.created_at, b.id));
        Ok(all)
    }

    async fn list_by_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| &b.vehicle_id == vehicle_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if !payments.contains_key(&payment.id) {
            return Err(RentalError::not_found("payment", payment.id));
        }
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&id).cloned())
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .filter(|p| p.order_ref == order_ref)
            .max_by_key(|p| (!p.status.is_dead(), p.created_at))
            .cloned())
    }

    async fn list_by_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }
}

struct FleetEntry {
    vehicle: Vehicle,
    available: u32,
}

/// In-memory vehicle inventory with an available-units counter per vehicle.
#[derive(Default, Clone)]
pub struct InMemoryInventory {
    fleet: Arc<RwLock<HashMap<VehicleId, FleetEntry>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a vehicle with all of its units available.
    pub async fn add_vehicle(&self, vehicle: Vehicle) {
        let mut fleet = self.fleet.write().await;
        let available = vehicle.capacity;
        fleet.insert(vehicle.id.clone(), FleetEntry { vehicle, available });
    }

    pub async fn available(&self, id: &VehicleId) -> Option<u32> {
        let fleet = self.fleet.read().await;
        fleet.get(id).map(|e| e.available)
    }
}

#[async_trait]
impl VehicleInventory for InMemoryInventory {
    async fn vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>> {
        let fleet = self.fleet.read().await;
        Ok(fleet.get(id).map(|e| e.vehicle.clone()))
    }

    async fn rate_schedule(&self, id: &VehicleId) -> Result<RateSchedule> {
        let fleet = self.fleet.read().await;
        fleet
            .get(id)
            .map(|e| e.vehicle.rates)
            .ok_or_else(|| RentalError::not_found("vehicle", id))
    }

    async fn adjust_availability(&self, id: &VehicleId, delta: i32) -> Result<u32> {
        let mut fleet = self.fleet.write().await;
        let entry = fleet
            .get_mut(id)
            .ok_or_else(|| RentalError::not_found("vehicle", id))?;
        let next = i64::from(entry.available) + i64::from(delta);
        if next < 0 || next > i64::from(entry.vehicle.capacity) {
            return Err(RentalError::Conflict(format!(
                "vehicle {id} availability would become {next} (capacity {})",
                entry.vehicle.capacity
            )));
        }
        entry.available = next as u32;
        Ok(entry.available)
    }
}
