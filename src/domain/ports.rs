use super::booking::{Booking, BookingId};
use super::money::Money;
use super::payment::{Checkout, Payment, PaymentId, PaymentPurpose, PaymentStatus};
use super::vehicle::{RateSchedule, Vehicle, VehicleId};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts a new booking. Fails with `Conflict` if the id or code is taken.
    async fn insert(&self, booking: Booking) -> Result<Booking>;
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>>;
    /// Writes `booking` if the stored version still equals `booking.version`,
    /// returning the stored copy with the bumped version. A stale version
    /// fails with `Conflict`.
    async fn update(&self, booking: Booking) -> Result<Booking>;
    async fn list(&self) -> Result<Vec<Booking>>;
    async fn list_by_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vec<Booking>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<()>;
    async fn update(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    /// Retried attempts share an order reference. The live row wins over
    /// failed or cancelled ones, then the newest.
    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Payment>>;
    async fn list_by_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait VehicleInventory: Send + Sync {
    async fn vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>>;
    /// Fails with `NotFound` for an unknown vehicle.
    async fn rate_schedule(&self, id: &VehicleId) -> Result<RateSchedule>;
    /// Atomically moves the available count by `delta`, returning the new
    /// count. Fails with `Conflict` if the count would leave `0..=capacity`.
    async fn adjust_availability(&self, id: &VehicleId, delta: i32) -> Result<u32>;
}

/// What the coordinator asks the wallet provider to collect.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub order_ref: String,
    pub amount: Money,
    pub purpose: PaymentPurpose,
    pub description: String,
}

/// Asynchronous result notification from the wallet provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCallback {
    pub order_ref: String,
    pub transaction_id: String,
    pub result_code: i32,
    pub message: Option<String>,
    /// Hex HMAC-SHA256 of [`GatewayCallback::signing_payload`] under the
    /// shared callback secret.
    pub signature: String,
}

impl GatewayCallback {
    /// The fields the provider signs, in the order it signs them.
    pub fn signing_payload(&self) -> String {
        format!(
            "message={}&orderRef={}&resultCode={}&transactionId={}",
            self.message.as_deref().unwrap_or(""),
            self.order_ref,
            self.result_code,
            self.transaction_id
        )
    }

    /// Provider result codes: 0 is success; 9000 (authorised) and 7000
    /// (processing) are still in flight; everything else is a failure.
    pub fn payment_status(&self) -> PaymentStatus {
        match self.result_code {
            0 => PaymentStatus::Completed,
            7000 | 9000 => PaymentStatus::Processing,
            _ => PaymentStatus::Failed,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fails with `Gateway` on provider or transport errors.
    async fn initiate(&self, request: GatewayRequest) -> Result<Checkout>;
    /// Authenticates a callback. Fails with `Gateway` when the signature does
    /// not match.
    fn verify(&self, callback: &GatewayCallback) -> Result<()>;
}

pub type BookingStoreBox = Box<dyn BookingStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type VehicleInventoryBox = Box<dyn VehicleInventory>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
