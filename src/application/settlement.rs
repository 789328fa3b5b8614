use crate::domain::booking::{
    Booking, BookingEvent, BookingId, BookingRequest, BookingStatus, ReturnSettlement, SideEffect,
};
use crate::domain::cancellation::CancellationPolicy;
use crate::domain::identity::{Actor, RequestContext};
use crate::domain::money::Money;
use crate::domain::payment::{
    Payment, PaymentMethod, PaymentPurpose, PaymentStatus, active_payment,
};
use crate::domain::ports::{
    BookingStoreBox, GatewayCallback, GatewayRequest, PaymentGatewayBox, PaymentStoreBox,
    VehicleInventoryBox,
};
use crate::domain::pricing::{PricingCalculator, PricingPolicy, RentalOptions, RentalQuote};
use crate::domain::vehicle::VehicleId;
use crate::domain::window::RentalWindow;
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

type LockMap<K> = Arc<std::sync::Mutex<HashMap<K, Arc<Mutex<()>>>>>;

/// Hands out one async mutex per key so work on the same booking, or on the
/// same vehicle's calendar, runs one at a time. Stores still enforce
/// versions underneath. An entry lives only while someone holds or waits on
/// it.
struct KeyedLocks<K> {
    locks: LockMap<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    async fn acquire(&self, key: K) -> KeyedGuard<K> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        KeyedGuard {
            guard: Some(lock.lock_owned().await),
            key,
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct KeyedGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    locks: LockMap<K>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the Arc under the map lock, so a count of one means
        // nobody else can reach this entry.
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Orchestrates quoting, booking, payment and reconciliation.
///
/// Owns the ports to the outside world. Each operation loads the booking it
/// works on, runs the state machine, executes the requested side effects and
/// writes the result back with a version check.
pub struct SettlementCoordinator {
    bookings: BookingStoreBox,
    payments: PaymentStoreBox,
    inventory: VehicleInventoryBox,
    gateway: PaymentGatewayBox,
    pricing: PricingCalculator,
    cancellation: CancellationPolicy,
    locks: KeyedLocks<BookingId>,
    vehicle_locks: KeyedLocks<VehicleId>,
}

impl SettlementCoordinator {
    /// Creates a coordinator with the default pricing and cancellation
    /// policies.
    ///
    /// # Arguments
    ///
    /// * `bookings` - Booking persistence.
    /// * `payments` - Payment persistence.
    /// * `inventory` - Vehicle rates and availability counters.
    /// * `gateway` - The wallet provider.
    pub fn new(
        bookings: BookingStoreBox,
        payments: PaymentStoreBox,
        inventory: VehicleInventoryBox,
        gateway: PaymentGatewayBox,
    ) -> Self {
        Self {
            bookings,
            payments,
            inventory,
            gateway,
            pricing: PricingCalculator::default(),
            cancellation: CancellationPolicy::default(),
            locks: KeyedLocks::default(),
            vehicle_locks: KeyedLocks::default(),
        }
    }

    pub fn with_pricing(mut self, policy: PricingPolicy) -> Self {
        self.pricing = PricingCalculator::new(policy);
        self
    }

    pub fn with_cancellation(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation = policy;
        self
    }

    pub fn pricing(&self) -> &PricingCalculator {
        &self.pricing
    }

    pub async fn quote(
        &self,
        vehicle_id: &VehicleId,
        window: &RentalWindow,
        options: &RentalOptions,
    ) -> Result<RentalQuote> {
        let rates = self.inventory.rate_schedule(vehicle_id).await?;
        self.pricing.quote(&rates, window, options)
    }

    /// A vehicle is dispatchable for a window while fewer than `capacity` live
    /// bookings of it overlap that window.
    pub async fn check_dispatchable(
        &self,
        vehicle_id: &VehicleId,
        window: &RentalWindow,
    ) -> Result<bool> {
        let vehicle = self
            .inventory
            .vehicle(vehicle_id)
            .await?
            .ok_or_else(|| RentalError::not_found("vehicle", vehicle_id))?;
        let overlapping = self
            .bookings
            .list_by_vehicle(vehicle_id)
            .await?
            .iter()
            .filter(|b| !b.status.is_terminal() && b.window.overlaps(window))
            .count();
        Ok(overlapping < vehicle.capacity as usize)
    }

    pub async fn create_booking(&self, ctx: &RequestContext, request: BookingRequest) -> Result<Booking> {
        let Actor::Renter(renter_id) = &ctx.actor else {
            return Err(RentalError::Forbidden(format!(
                "{} may not place bookings",
                ctx.actor
            )));
        };
        request.window.validate()?;

        let vehicle = self
            .inventory
            .vehicle(&request.vehicle_id)
            .await?
            .ok_or_else(|| RentalError::not_found("vehicle", &request.vehicle_id))?;
        if vehicle.station_id != request.station_id {
            return Err(RentalError::Validation(format!(
                "vehicle {} does not belong to station {}",
                vehicle.id, request.station_id
            )));
        }
        // Held until the insert so two renters cannot both take the last unit
        let _calendar = self.vehicle_locks.acquire(vehicle.id.clone()).await;
        if !self.check_dispatchable(&vehicle.id, &request.window).await? {
            return Err(RentalError::Conflict(format!(
                "vehicle {} is fully booked for the requested window",
                vehicle.id
            )));
        }

        let quote = self
            .pricing
            .quote(&vehicle.rates, &request.window, &request.options)?;
        let booking = Booking::new(renter_id.clone(), &request, vehicle.rates, quote, ctx.at);
        let booking = self.bookings.insert(booking).await?;

        info!(
            booking_code = %booking.code,
            vehicle = %booking.vehicle_id,
            total_due = %booking.quote.total_due,
            deposit_due = %booking.quote.deposit_due,
            "booking created"
        );
        Ok(booking)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| RentalError::not_found("booking", id))
    }

    pub async fn booking_by_code(&self, code: &str) -> Result<Booking> {
        self.bookings
            .get_by_code(code)
            .await?
            .ok_or_else(|| RentalError::not_found("booking", code))
    }

    pub async fn list_bookings(&self) -> Result<Vec<Booking>> {
        self.bookings.list().await
    }

    pub async fn payments_for(&self, id: BookingId) -> Result<Vec<Payment>> {
        self.payments.list_by_booking(id).await
    }

    /// The live payment for a purpose, if any.
    pub async fn active_payment(&self, id: BookingId, purpose: PaymentPurpose) -> Result<Option<Payment>> {
        let payments = self.payments.list_by_booking(id).await?;
        Ok(active_payment(&payments, purpose).cloned())
    }

    /// Re-prices a booking from its stored rates and checks the result matches
    /// the frozen quote.
    pub fn verify_quote(&self, booking: &Booking) -> Result<bool> {
        let fresh = self
            .pricing
            .quote(&booking.rates, &booking.window, &booking.options)?;
        Ok(fresh == booking.quote)
    }

    /// Opens a payment for the deposit or the post-return balance.
    ///
    /// Idempotent per booking and purpose: while an open payment exists it is
    /// reused, so a caller retrying after a gateway error never creates a
    /// second row. Wallet payments get a checkout from the gateway; bank
    /// transfer and cash payments wait for staff to mark them paid against the
    /// booking code.
    pub async fn initiate_payment(
        &self,
        ctx: &RequestContext,
        booking_id: BookingId,
        method: PaymentMethod,
        purpose: PaymentPurpose,
    ) -> Result<Payment> {
        let _guard = self.locks.acquire(booking_id).await;
        let booking = self.get_booking(booking_id).await?;
        if let Actor::Renter(id) = &ctx.actor
            && *id != booking.renter_id
        {
            return Err(RentalError::Forbidden(format!(
                "{} may not pay for booking {}",
                ctx.actor, booking.code
            )));
        }

        let amount = amount_due(&booking, purpose)?;
        let history = self.payments.list_by_booking(booking_id).await?;

        let mut payment = match active_payment(&history, purpose) {
            Some(p) if !p.status.is_open() => {
                return Err(RentalError::Conflict(format!(
                    "{:?} payment for booking {} is already {:?}",
                    purpose, booking.code, p.status
                )));
            }
            Some(p) if p.method == method => p.clone(),
            Some(p) => {
                // Renter switched method: retire the old order, open a new one
                let mut retired = p.clone();
                retired.status = PaymentStatus::Cancelled;
                self.payments.update(retired).await?;
                self.open_payment(&booking, purpose, amount, method, ctx.at).await?
            }
            None => self.open_payment(&booking, purpose, amount, method, ctx.at).await?,
        };

        if method == PaymentMethod::Wallet && payment.checkout.is_none() {
            let request = GatewayRequest {
                order_ref: payment.order_ref.clone(),
                amount: payment.amount,
                purpose,
                description: match purpose {
                    PaymentPurpose::Deposit => format!("Deposit for booking {}", booking.code),
                    PaymentPurpose::Remainder => {
                        format!("Remaining balance for booking {}", booking.code)
                    }
                },
            };
            match self.gateway.initiate(request).await {
                Ok(checkout) => {
                    payment.checkout = Some(checkout);
                    self.payments.update(payment.clone()).await?;
                    info!(order_ref = %payment.order_ref, amount = %payment.amount, "wallet checkout opened");
                }
                Err(e) => {
                    warn!(order_ref = %payment.order_ref, error = %e, "wallet checkout failed");
                    return Err(e);
                }
            }
        }

        Ok(payment)
    }

    async fn open_payment(
        &self,
        booking: &Booking,
        purpose: PaymentPurpose,
        amount: Money,
        method: PaymentMethod,
        at: DateTime<Utc>,
    ) -> Result<Payment> {
        let payment = Payment::new(booking.id, &booking.code, purpose, amount, method, at);
        self.payments.insert(payment.clone()).await?;
        info!(
            booking_code = %booking.code,
            order_ref = %payment.order_ref,
            method = ?method,
            amount = %amount,
            "payment opened"
        );
        Ok(payment)
    }

    /// Applies a wallet provider notification.
    ///
    /// The signature is checked before anything is looked up. Redelivered
    /// callbacks for an already completed or failed payment are acknowledged
    /// without changing anything.
    pub async fn handle_gateway_callback(
        &self,
        callback: GatewayCallback,
        at: DateTime<Utc>,
    ) -> Result<Payment> {
        if let Err(e) = self.gateway.verify(&callback) {
            warn!(order_ref = %callback.order_ref, error = %e, "rejected unauthenticated callback");
            return Err(e);
        }

        let booking_id = self
            .payments
            .find_by_order_ref(&callback.order_ref)
            .await?
            .ok_or_else(|| RentalError::not_found("payment", &callback.order_ref))?
            .booking_id;

        let _guard = self.locks.acquire(booking_id).await;
        let mut payment = self
            .payments
            .find_by_order_ref(&callback.order_ref)
            .await?
            .ok_or_else(|| RentalError::not_found("payment", &callback.order_ref))?;

        let outcome = callback.payment_status();
        let redelivered = !payment.status.is_open()
            && (payment.status == outcome
                || payment.transaction_id.as_deref() == Some(callback.transaction_id.as_str()));
        if redelivered {
            return Ok(payment);
        }

        match outcome {
            PaymentStatus::Completed => {
                payment.complete(callback.transaction_id, at)?;
                self.payments.update(payment.clone()).await?;
                info!(order_ref = %payment.order_ref, amount = %payment.amount, "wallet payment completed");
                self.reconcile(&payment, at).await?;
            }
            PaymentStatus::Processing if payment.status.is_open() => {
                payment.status = PaymentStatus::Processing;
                self.payments.update(payment.clone()).await?;
            }
            _ if payment.status.is_open() => {
                payment.status = PaymentStatus::Failed;
                payment.transaction_id = Some(callback.transaction_id);
                self.payments.update(payment.clone()).await?;
                warn!(
                    order_ref = %payment.order_ref,
                    result_code = callback.result_code,
                    message = callback.message.as_deref().unwrap_or(""),
                    "wallet payment failed"
                );
            }
            _ => {
                return Err(RentalError::Conflict(format!(
                    "payment {} is {:?}, cannot apply result code {}",
                    payment.order_ref, payment.status, callback.result_code
                )));
            }
        }
        Ok(payment)
    }

    /// Staff confirmation that a bank transfer or cash payment arrived.
    ///
    /// There is no automatic verification for these methods; the engine
    /// trusts the staff member and records who did it.
    pub async fn mark_paid_manually(
        &self,
        ctx: &RequestContext,
        booking_id: BookingId,
        purpose: PaymentPurpose,
        reference: &str,
    ) -> Result<Payment> {
        let Some(staff) = ctx.actor.staff_id() else {
            return Err(RentalError::Forbidden(format!(
                "{} may not mark payments as received",
                ctx.actor
            )));
        };

        let _guard = self.locks.acquire(booking_id).await;
        let booking = self.get_booking(booking_id).await?;
        let history = self.payments.list_by_booking(booking_id).await?;
        let mut payment = active_payment(&history, purpose)
            .filter(|p| p.status.is_open())
            .cloned()
            .ok_or_else(|| {
                RentalError::not_found("open payment", purpose.order_ref(&booking.code))
            })?;
        if !payment.method.is_manual() {
            return Err(RentalError::Validation(format!(
                "payment {} is settled by the wallet provider, not by staff",
                payment.order_ref
            )));
        }

        payment.complete(reference.to_string(), ctx.at)?;
        payment.processed_by = Some(staff.clone());
        self.payments.update(payment.clone()).await?;
        info!(order_ref = %payment.order_ref, staff = %staff, reference, "payment marked as received");

        self.reconcile(&payment, ctx.at).await?;
        Ok(payment)
    }

    /// Folds a completed payment into its booking. A completed deposit is the
    /// only thing that confirms a pending booking without staff.
    async fn reconcile(&self, payment: &Payment, at: DateTime<Utc>) -> Result<()> {
        let mut booking = self.get_booking(payment.booking_id).await?;
        match payment.purpose {
            PaymentPurpose::Deposit => {
                booking.deposit_paid = payment.amount;
                if booking.status == BookingStatus::Pending {
                    booking.apply(BookingEvent::Confirm, &RequestContext::system(at))?;
                    info!(booking_code = %booking.code, "booking confirmed by deposit payment");
                }
                if let Some(settlement) = booking.return_settlement.as_mut() {
                    // Cleared after the return: the deposit counts against what is owed
                    settlement.absorb_deposit(payment.amount);
                    info!(
                        booking_code = %booking.code,
                        balance_due = %settlement.balance_due,
                        refund_due = %settlement.refund_due,
                        "late deposit netted into return settlement"
                    );
                    self.retire_open(&booking, PaymentPurpose::Remainder).await?;
                }
            }
            PaymentPurpose::Remainder => {
                if let Some(settlement) = booking.return_settlement.as_mut() {
                    settlement.balance_paid = true;
                }
            }
        }
        booking.updated_at = at;
        self.bookings.update(booking).await?;
        Ok(())
    }

    /// Cancels an open payment whose amount no longer matches the booking.
    async fn retire_open(&self, booking: &Booking, purpose: PaymentPurpose) -> Result<()> {
        let history = self.payments.list_by_booking(booking.id).await?;
        if let Some(open) = active_payment(&history, purpose).filter(|p| p.status.is_open()) {
            let mut retired = open.clone();
            retired.status = PaymentStatus::Cancelled;
            warn!(order_ref = %retired.order_ref, "open payment cancelled, amount is stale");
            self.payments.update(retired).await?;
        }
        Ok(())
    }

    /// Staff confirmation. Allowed even when no payment exists yet.
    pub async fn confirm(&self, ctx: &RequestContext, id: BookingId) -> Result<Booking> {
        self.transition(ctx, id, BookingEvent::Confirm).await
    }

    pub async fn start_rental(&self, ctx: &RequestContext, id: BookingId) -> Result<Booking> {
        self.transition(ctx, id, BookingEvent::StartCheckout).await
    }

    pub async fn complete_rental(&self, ctx: &RequestContext, id: BookingId) -> Result<Booking> {
        self.transition(ctx, id, BookingEvent::Complete).await
    }

    pub async fn cancel(&self, ctx: &RequestContext, id: BookingId) -> Result<Booking> {
        self.transition(ctx, id, BookingEvent::Cancel).await
    }

    async fn transition(
        &self,
        ctx: &RequestContext,
        id: BookingId,
        event: BookingEvent,
    ) -> Result<Booking> {
        let _guard = self.locks.acquire(id).await;
        let mut booking = self.get_booking(id).await?;
        let vehicle_id = booking.vehicle_id.clone();
        let effects = booking.apply(event, ctx)?;

        let mut availability_delta = 0;
        for effect in &effects {
            match *effect {
                SideEffect::AdjustAvailability(delta) => {
                    self.inventory.adjust_availability(&vehicle_id, delta).await?;
                    availability_delta += delta;
                }
                SideEffect::SettleCancellation => {
                    booking.cancellation = Some(self.cancellation.settle(
                        booking.quote.total_due,
                        booking.deposit_paid,
                        booking.created_at,
                        booking.window.pickup,
                        ctx.at,
                    ));
                }
                SideEffect::SettleReturn => {
                    let (late_hours, late_fee) =
                        self.pricing.late_fee(&booking.rates, &booking.window, ctx.at);
                    if late_hours > 0 {
                        warn!(booking_code = %booking.code, late_hours, late_fee = %late_fee, "late return");
                    }
                    booking.return_settlement = Some(ReturnSettlement::new(
                        ctx.at,
                        late_hours,
                        late_fee,
                        booking.quote.total_due,
                        booking.deposit_paid,
                    ));
                }
            }
        }

        let booking = match self.bookings.update(booking).await {
            Ok(b) => b,
            Err(e) => {
                if availability_delta != 0 {
                    // The booking write lost; put the vehicle count back
                    self.inventory
                        .adjust_availability(&vehicle_id, -availability_delta)
                        .await?;
                }
                return Err(e);
            }
        };

        if let Some(settlement) = &booking.cancellation
            && event == BookingEvent::Cancel
        {
            self.release_payments(&booking, settlement.refund).await?;
            info!(
                booking_code = %booking.code,
                tier = %settlement.tier,
                fee = %settlement.fee,
                refund = %settlement.refund,
                "booking cancelled"
            );
        } else {
            info!(booking_code = %booking.code, status = %booking.status, actor = %ctx.actor, "booking transitioned");
        }
        Ok(booking)
    }

    /// Closes open payments and refunds the released part of a paid deposit.
    async fn release_payments(&self, booking: &Booking, refund: Money) -> Result<()> {
        for mut payment in self.payments.list_by_booking(booking.id).await? {
            if payment.status.is_open() {
                payment.status = PaymentStatus::Cancelled;
                self.payments.update(payment).await?;
            } else if payment.status == PaymentStatus::Completed
                && payment.purpose == PaymentPurpose::Deposit
                && refund.is_positive()
            {
                payment.status = PaymentStatus::Refunded;
                payment.refunded_amount = refund;
                self.payments.update(payment).await?;
            }
        }
        Ok(())
    }
}

/// How much a payment of `purpose` must collect for `booking` right now.
fn amount_due(booking: &Booking, purpose: PaymentPurpose) -> Result<Money> {
    match purpose {
        PaymentPurpose::Deposit => {
            if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
                return Err(RentalError::Conflict(format!(
                    "deposit for booking {} cannot be paid while it is {}",
                    booking.code, booking.status
                )));
            }
            if booking.deposit_paid.is_positive() {
                return Err(RentalError::Conflict(format!(
                    "deposit for booking {} is already paid",
                    booking.code
                )));
            }
            Ok(booking.quote.deposit_due)
        }
        PaymentPurpose::Remainder => match &booking.return_settlement {
            Some(s) if booking.status == BookingStatus::Completed && !s.balance_paid => {
                Ok(s.balance_due)
            }
            Some(_) => Err(RentalError::Conflict(format!(
                "booking {} has no balance left to pay",
                booking.code
            ))),
            None => Err(RentalError::Conflict(format!(
                "remaining balance for booking {} is only payable once it is completed (it is {})",
                booking.code, booking.status
            ))),
        },
    }
}
