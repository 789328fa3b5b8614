use super::cancellation::CancellationSettlement;
use super::identity::{Actor, RequestContext, UserId};
use super::money::Money;
use super::pricing::{RentalOptions, RentalQuote};
use super::vehicle::{RateSchedule, StationId, VehicleId};
use super::window::RentalWindow;
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Ongoing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The transition table. Anything not listed is illegal.
    pub fn next(self, event: BookingEvent) -> Result<BookingStatus> {
        use BookingEvent::*;
        use BookingStatus::*;

        match (self, event) {
            (Pending, Confirm) => Ok(Confirmed),
            (Pending, Cancel) | (Confirmed, Cancel) => Ok(Cancelled),
            (Confirmed, StartCheckout) => Ok(Ongoing),
            (Ongoing, Complete) => Ok(Completed),
            (from, event) => Err(RentalError::IllegalTransition { from, event }),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Ongoing => "ONGOING",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEvent {
    Confirm,
    StartCheckout,
    Complete,
    Cancel,
}

impl BookingEvent {
    pub const ALL: [BookingEvent; 4] = [
        BookingEvent::Confirm,
        BookingEvent::StartCheckout,
        BookingEvent::Complete,
        BookingEvent::Cancel,
    ];
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingEvent::Confirm => "confirm",
            BookingEvent::StartCheckout => "start checkout of",
            BookingEvent::Complete => "complete",
            BookingEvent::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Work a transition asks the coordinator to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Compute the cancellation fee and release the escrow minus the fee.
    SettleCancellation,
    /// Change the vehicle's available count by this delta.
    AdjustAvailability(i32),
    /// Assess late return and the balance left to pay.
    SettleReturn,
}

/// The balance computed when a rental is handed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSettlement {
    pub returned_at: DateTime<Utc>,
    pub late_hours: i64,
    pub late_fee: Money,
    pub rental_charge: Money,
    pub deposit_held: Money,
    pub balance_due: Money,
    pub refund_due: Money,
    #[serde(default)]
    pub balance_paid: bool,
}

impl ReturnSettlement {
    pub fn new(
        returned_at: DateTime<Utc>,
        late_hours: i64,
        late_fee: Money,
        rental_charge: Money,
        deposit_held: Money,
    ) -> Self {
        let owed = rental_charge + late_fee;
        let balance_due = owed.saturating_sub(deposit_held);
        Self {
            returned_at,
            late_hours,
            late_fee,
            rental_charge,
            deposit_held,
            balance_due,
            refund_due: deposit_held.saturating_sub(owed),
            balance_paid: !balance_due.is_positive(),
        }
    }

    /// Nets a deposit that cleared after the return against the settlement.
    /// Once the balance has been collected the whole deposit is refundable.
    pub fn absorb_deposit(&mut self, deposit: Money) {
        if self.balance_paid {
            self.deposit_held += deposit;
            self.refund_due += deposit;
            return;
        }
        *self = Self::new(
            self.returned_at,
            self.late_hours,
            self.late_fee,
            self.rental_charge,
            self.deposit_held + deposit,
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub code: String,
    pub renter_id: UserId,
    pub vehicle_id: VehicleId,
    pub station_id: StationId,
    pub window: RentalWindow,
    /// Rates and options the quote was computed from, kept so the quote can be
    /// re-derived and late fees use the prices the renter agreed to.
    pub rates: RateSchedule,
    pub options: RentalOptions,
    pub quote: RentalQuote,
    pub status: BookingStatus,
    pub pickup_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub checked_out_by: Option<UserId>,
    pub checked_in_by: Option<UserId>,
    pub deposit_paid: Money,
    pub cancellation: Option<CancellationSettlement>,
    pub return_settlement: Option<ReturnSettlement>,
    /// Bumped by the store on every successful write.
    pub version: u64,
}

/// Everything a renter supplies to place a booking.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub vehicle_id: VehicleId,
    pub station_id: StationId,
    pub window: RentalWindow,
    pub options: RentalOptions,
    pub pickup_note: Option<String>,
}

impl Booking {
    pub fn new(
        renter_id: UserId,
        request: &BookingRequest,
        rates: RateSchedule,
        quote: RentalQuote,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            code: generate_code(created_at),
            renter_id,
            vehicle_id: request.vehicle_id.clone(),
            station_id: request.station_id.clone(),
            window: request.window,
            rates,
            options: request.options,
            quote,
            status: BookingStatus::Pending,
            pickup_note: request.pickup_note.clone(),
            created_at,
            updated_at: created_at,
            checked_out_by: None,
            checked_in_by: None,
            deposit_paid: Money::ZERO,
            cancellation: None,
            return_settlement: None,
            version: 0,
        }
    }

    /// Runs one state-machine step.
    ///
    /// On success the status and staff stamps are updated and the side effects
    /// the caller must execute are returned. On failure the booking is left
    /// exactly as it was.
    pub fn apply(&mut self, event: BookingEvent, ctx: &RequestContext) -> Result<Vec<SideEffect>> {
        let next = self.status.next(event)?;
        self.authorize(event, &ctx.actor)?;

        let effects = match event {
            BookingEvent::Confirm => vec![],
            BookingEvent::Cancel => vec![SideEffect::SettleCancellation],
            BookingEvent::StartCheckout => {
                self.checked_out_by = ctx.actor.staff_id().cloned();
                vec![SideEffect::AdjustAvailability(-1)]
            }
            BookingEvent::Complete => {
                self.checked_in_by = ctx.actor.staff_id().cloned();
                vec![SideEffect::AdjustAvailability(1), SideEffect::SettleReturn]
            }
        };

        self.status = next;
        self.updated_at = ctx.at;
        Ok(effects)
    }

    fn authorize(&self, event: BookingEvent, actor: &Actor) -> Result<()> {
        let allowed = match (event, actor) {
            (_, Actor::Staff(_)) => true,
            (BookingEvent::Confirm, Actor::System) => true,
            (BookingEvent::Cancel, Actor::System) => true,
            (BookingEvent::Cancel, Actor::Renter(id)) => *id == self.renter_id,
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(RentalError::Forbidden(format!(
                "{actor} may not {event} booking {}",
                self.code
            )))
        }
    }
}

/// `BK` + creation epoch millis + 6 random uppercase hex characters.
fn generate_code(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("BK{}{}", at.timestamp_millis(), suffix)
}
