use crate::domain::booking::{Booking, BookingId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{BookingStore, PaymentStore};
use crate::domain::vehicle::VehicleId;
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for booking records, keyed by booking id.
pub const CF_BOOKINGS: &str = "bookings";
/// Column Family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent store implementation using RocksDB.
///
/// Bookings and payments live in separate Column Families as JSON values.
/// Version-checked booking updates are serialized through a write lock so the
/// read-compare-write is atomic with respect to other writers in this process.
///
/// `Clone` shares the underlying `Arc<DB>` and lock.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// "bookings" and "payments" column families if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_bookings = ColumnFamilyDescriptor::new(CF_BOOKINGS, Options::default());
        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_bookings, cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            RentalError::Internal(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn insert(&self, booking: Booking) -> Result<Booking> {
        let _guard = self.write_lock.lock().await;
        let key = booking.id.0.as_bytes().to_vec();
        if self.read::<Booking>(CF_BOOKINGS, &key)?.is_some() {
            return Err(RentalError::Conflict(format!("booking {} already exists", booking.id)));
        }
        if self.get_by_code(&booking.code).await?.is_some() {
            return Err(RentalError::Conflict(format!(
                "booking code {} already exists",
                booking.code
            )));
        }
        self.put(CF_BOOKINGS, &key, &booking)?;
        Ok(booking)
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        self.read(CF_BOOKINGS, id.0.as_bytes())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>> {
        Ok(self
            .scan::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .find(|b| b.code == code))
    }

    async fn update(&self, mut booking: Booking) -> Result<Booking> {
        let _guard = self.write_lock.lock().await;
        let key = booking.id.0.as_bytes().to_vec();
        let stored: Booking = self
            .read(CF_BOOKINGS, &key)?
            .ok_or_else(|| RentalError::not_found("booking", booking.id))?;
        if stored.version != booking.version {
            return Err(RentalError::Conflict(format!(
                "booking {} was modified concurrently (expected version {}, found {})",
                booking.code, booking.version, stored.version
            )));
        }
        booking.version += 1;
        self.put(CF_BOOKINGS, &key, &booking)?;
        Ok(booking)
    }

    async fn list(&self) -> Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self.scan(CF_BOOKINGS)?;
        bookings.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(bookings)
    }

    async fn list_by_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Booking>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|b| b.vehicle_id == *vehicle_id)
            .collect())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = payment.id.0.as_bytes();
        if self.read::<Payment>(CF_PAYMENTS, key)?.is_none() {
            return Err(RentalError::not_found("payment", payment.id));
        }
        self.put(CF_PAYMENTS, key, &payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, id.0.as_bytes())
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Payment>> {
        Ok(self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.order_ref == order_ref)
            .max_by_key(|p| (!p.status.is_dead(), p.created_at)))
    }

    async fn list_by_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.booking_id == booking_id)
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}
