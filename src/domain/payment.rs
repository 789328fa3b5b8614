use super::booking::BookingId;
use super::identity::UserId;
use super::money::Money;
use crate::error::RentalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    /// Methods a human marks as paid; there is no provider callback for them.
    pub fn is_manual(&self) -> bool {
        matches!(self, PaymentMethod::BankTransfer | PaymentMethod::Cash)
    }
}

impl FromStr for PaymentMethod {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wallet" | "momo" => Ok(PaymentMethod::Wallet),
            "bank_transfer" | "bank" => Ok(PaymentMethod::BankTransfer),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(RentalError::Validation(format!(
                "unknown payment method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Failed and cancelled records are history; anything else is a live payment.
    pub fn is_dead(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Cancelled)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

/// What a payment settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentPurpose {
    /// Escrowed deposit taken when the booking is placed.
    Deposit,
    /// Balance left after the rental is handed back.
    Remainder,
}

impl PaymentPurpose {
    fn suffix(&self) -> &'static str {
        match self {
            PaymentPurpose::Deposit => "DEP",
            PaymentPurpose::Remainder => "REM",
        }
    }

    /// Idempotency key for the gateway, derived from the booking code so a
    /// retried initiation always names the same order.
    pub fn order_ref(&self, booking_code: &str) -> String {
        format!("{booking_code}-{}", self.suffix())
    }
}

/// What the wallet provider hands back when an order is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub provider_order_id: String,
    pub pay_url: String,
    pub qr_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub purpose: PaymentPurpose,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub order_ref: String,
    pub transaction_id: Option<String>,
    pub checkout: Option<Checkout>,
    pub refunded_amount: Money,
    pub processed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        booking_id: BookingId,
        booking_code: &str,
        purpose: PaymentPurpose,
        amount: Money,
        method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            booking_id,
            purpose,
            amount,
            method,
            status: PaymentStatus::Pending,
            order_ref: purpose.order_ref(booking_code),
            transaction_id: None,
            checkout: None,
            refunded_amount: Money::ZERO,
            processed_by: None,
            created_at,
            paid_at: None,
        }
    }

    /// Moves the payment to COMPLETED. Only open payments can complete.
    pub fn complete(&mut self, transaction_id: String, at: DateTime<Utc>) -> Result<(), RentalError> {
        if !self.status.is_open() {
            return Err(RentalError::Conflict(format!(
                "payment {} is already {:?}",
                self.order_ref, self.status
            )));
        }
        self.status = PaymentStatus::Completed;
        self.transaction_id = Some(transaction_id);
        self.paid_at = Some(at);
        Ok(())
    }
}

/// Picks the active payment for a purpose: the most recent record that has
/// not failed or been cancelled.
pub fn active_payment(payments: &[Payment], purpose: PaymentPurpose) -> Option<&Payment> {
    payments
        .iter()
        .filter(|p| p.purpose == purpose && !p.status.is_dead())
        .max_by_key(|p| p.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn payment(status: PaymentStatus, age_minutes: i64) -> Payment {
        let mut p = Payment::new(
            BookingId::new(),
            "BK1",
            PaymentPurpose::Deposit,
            Money::new(dec!(5000000)),
            PaymentMethod::Wallet,
            Utc::now() - Duration::minutes(age_minutes),
        );
        p.status = status;
        p
    }

    #[test]
    fn test_order_ref_is_stable_per_purpose() {
        assert_eq!(PaymentPurpose::Deposit.order_ref("BK123ABC"), "BK123ABC-DEP");
        assert_eq!(PaymentPurpose::Remainder.order_ref("BK123ABC"), "BK123ABC-REM");
    }

    #[test]
    fn test_active_payment_skips_failed_history() {
        let payments = vec![
            payment(PaymentStatus::Failed, 1),
            payment(PaymentStatus::Pending, 10),
            payment(PaymentStatus::Refunded, 30),
        ];
        let active = active_payment(&payments, PaymentPurpose::Deposit).unwrap();
        assert_eq!(active.status, PaymentStatus::Pending);
        assert!(active_payment(&payments, PaymentPurpose::Remainder).is_none());
    }

    #[test]
    fn test_complete_only_from_open_states() {
        let mut p = payment(PaymentStatus::Processing, 0);
        p.complete("TX1".into(), Utc::now()).unwrap();
        assert_eq!(p.status, PaymentStatus::Completed);
        assert_eq!(p.transaction_id.as_deref(), Some("TX1"));

        let mut failed = payment(PaymentStatus::Failed, 0);
        assert!(matches!(
            failed.complete("TX2".into(), Utc::now()),
            Err(RentalError::Conflict(_))
        ));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("wallet".parse::<PaymentMethod>().unwrap(), PaymentMethod::Wallet);
        assert_eq!(
            "BANK_TRANSFER".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankTransfer
        );
        assert!("crypto".parse::<PaymentMethod>().is_err());
        assert!(PaymentMethod::Cash.is_manual());
        assert!(!PaymentMethod::Wallet.is_manual());
    }
}
