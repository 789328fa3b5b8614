use super::money::Money;
use crate::error::{RentalError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationTier {
    /// Cancelled inside the grace window after booking.
    Grace,
    /// Cancelled more than the notice period before pickup.
    Early,
    /// Cancelled within the notice period before pickup, or after it.
    Late,
}

impl fmt::Display for CancellationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CancellationTier::Grace => "free cancellation within grace window",
            CancellationTier::Early => "cancelled before the notice period",
            CancellationTier::Late => "cancelled within the notice period",
        };
        f.write_str(label)
    }
}

/// Fee tiers for cancelling a booking, as a share of its total due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationPolicy {
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,
    #[serde(default = "default_notice_days")]
    pub notice_days: i64,
    #[serde(default = "default_early_rate")]
    pub early_rate: Decimal,
    #[serde(default = "default_late_rate")]
    pub late_rate: Decimal,
}

/// Upper bounds for configured windows: one year either way.
const MAX_GRACE_MINUTES: i64 = 366 * 24 * 60;
const MAX_NOTICE_DAYS: i64 = 366;

fn default_grace_minutes() -> i64 {
    60
}

fn default_notice_days() -> i64 {
    7
}

fn default_early_rate() -> Decimal {
    dec!(0.10)
}

fn default_late_rate() -> Decimal {
    dec!(0.40)
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            grace_minutes: default_grace_minutes(),
            notice_days: default_notice_days(),
            early_rate: default_early_rate(),
            late_rate: default_late_rate(),
        }
    }
}

/// What a cancellation costs and how the escrowed deposit is split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationSettlement {
    pub tier: CancellationTier,
    pub rate: Decimal,
    pub fee: Money,
    /// Part of the paid deposit returned to the renter.
    pub refund: Money,
    /// Part of the fee the deposit does not cover.
    pub outstanding: Money,
    pub cancelled_at: DateTime<Utc>,
}

impl CancellationPolicy {
    /// Rejects windows outside `0..=366 days` and rates outside `0..=1`.
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_GRACE_MINUTES).contains(&self.grace_minutes) {
            return Err(RentalError::Validation(format!(
                "cancellation.grace_minutes must be between 0 and {MAX_GRACE_MINUTES}, got {}",
                self.grace_minutes
            )));
        }
        if !(0..=MAX_NOTICE_DAYS).contains(&self.notice_days) {
            return Err(RentalError::Validation(format!(
                "cancellation.notice_days must be between 0 and {MAX_NOTICE_DAYS}, got {}",
                self.notice_days
            )));
        }
        for (name, rate) in [("early_rate", self.early_rate), ("late_rate", self.late_rate)] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(RentalError::Validation(format!(
                    "cancellation.{name} must be between 0 and 1, got {rate}"
                )));
            }
        }
        Ok(())
    }

    /// Picks exactly one tier.
    ///
    /// The grace window is inclusive (a cancellation exactly 60 minutes after
    /// booking is free). The early tier needs strictly more than the notice
    /// period left before pickup, so exactly 7 days out is already late.
    pub fn tier(
        &self,
        created_at: DateTime<Utc>,
        pickup: DateTime<Utc>,
        cancelled_at: DateTime<Utc>,
    ) -> CancellationTier {
        if cancelled_at - created_at <= Duration::minutes(self.grace_minutes) {
            CancellationTier::Grace
        } else if pickup - cancelled_at > Duration::days(self.notice_days) {
            CancellationTier::Early
        } else {
            CancellationTier::Late
        }
    }

    pub fn rate(&self, tier: CancellationTier) -> Decimal {
        match tier {
            CancellationTier::Grace => Decimal::ZERO,
            CancellationTier::Early => self.early_rate,
            CancellationTier::Late => self.late_rate,
        }
    }

    pub fn settle(
        &self,
        total_due: Money,
        deposit_paid: Money,
        created_at: DateTime<Utc>,
        pickup: DateTime<Utc>,
        cancelled_at: DateTime<Utc>,
    ) -> CancellationSettlement {
        let tier = self.tier(created_at, pickup, cancelled_at);
        let rate = self.rate(tier);
        let fee = total_due.percent_of(rate);
        CancellationSettlement {
            tier,
            rate,
            fee,
            refund: deposit_paid.saturating_sub(fee),
            outstanding: fee.saturating_sub(deposit_paid),
            cancelled_at,
        }
    }
}
