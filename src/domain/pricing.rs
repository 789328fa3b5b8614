use super::money::Money;
use super::vehicle::RateSchedule;
use super::window::RentalWindow;
use crate::error::{RentalError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Windows up to this many whole hours are charged as a single day.
const SINGLE_DAY_HOURS: i64 = 24;

/// Pricing constants. The defaults are the storefront's published rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    #[serde(default = "default_insurance_rate")]
    pub insurance_rate: Decimal,
    #[serde(default = "default_service_rate")]
    pub service_rate: Decimal,
    /// Flat per-day price of the optional extra insurance.
    #[serde(default = "default_add_on_daily_rate")]
    pub add_on_daily_rate: Money,
    /// Deposit charged when the vehicle record does not carry one.
    #[serde(default = "default_fallback_deposit")]
    pub fallback_deposit: Money,
    /// Multiplier applied to the hourly rate for each whole hour a rental is
    /// returned late.
    #[serde(default = "default_late_return_multiplier")]
    pub late_return_multiplier: Decimal,
}

fn default_insurance_rate() -> Decimal {
    dec!(0.10)
}

fn default_service_rate() -> Decimal {
    dec!(0.05)
}

fn default_add_on_daily_rate() -> Money {
    Money::new(dec!(40000))
}

fn default_fallback_deposit() -> Money {
    Money::new(dec!(5000000))
}

fn default_late_return_multiplier() -> Decimal {
    dec!(1.5)
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            insurance_rate: default_insurance_rate(),
            service_rate: default_service_rate(),
            add_on_daily_rate: default_add_on_daily_rate(),
            fallback_deposit: default_fallback_deposit(),
            late_return_multiplier: default_late_return_multiplier(),
        }
    }
}

/// Renter-selected extras for a quote.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RentalOptions {
    pub additional_insurance: bool,
    /// Supplied by a promotion engine; zero otherwise.
    #[serde(default)]
    pub discount: Money,
}

/// A frozen price computation for one rental window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalQuote {
    pub elapsed_hours: i64,
    pub duration_days: i64,
    pub remainder_hours: i64,
    pub base_price: Money,
    pub insurance_fee: Money,
    pub service_fee: Money,
    pub additional_insurance_fee: Money,
    pub discount: Money,
    pub total_due: Money,
    pub deposit_due: Money,
}

/// Turns a rate schedule and a window into a [`RentalQuote`].
///
/// Stateless apart from its policy, so one instance can be shared freely
/// across tasks.
#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    policy: PricingPolicy,
}

impl PricingCalculator {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    pub fn quote(
        &self,
        rate: &RateSchedule,
        window: &RentalWindow,
        options: &RentalOptions,
    ) -> Result<RentalQuote> {
        window.validate()?;
        if options.discount < Money::ZERO {
            return Err(RentalError::Validation(
                "discount must not be negative".to_string(),
            ));
        }

        let elapsed_hours = window.elapsed_hours();
        let (duration_days, remainder_hours, base_price) = if elapsed_hours <= SINGLE_DAY_HOURS {
            (1, 0, rate.daily_rate)
        } else {
            let days = elapsed_hours / SINGLE_DAY_HOURS;
            let hours = elapsed_hours % SINGLE_DAY_HOURS;
            (days, hours, rate.daily_rate * days + rate.hourly_rate * hours)
        };

        let insurance_fee = base_price.percent_of(self.policy.insurance_rate);
        let service_fee = base_price.percent_of(self.policy.service_rate);
        let additional_insurance_fee = if options.additional_insurance {
            self.policy.add_on_daily_rate * duration_days
        } else {
            Money::ZERO
        };
        let discount = options.discount;

        let subtotal = base_price + insurance_fee + service_fee + additional_insurance_fee;
        if discount > subtotal {
            return Err(RentalError::Validation(format!(
                "discount {discount} exceeds the rental subtotal {subtotal}"
            )));
        }
        let total_due = subtotal - discount;
        let deposit_due = rate
            .deposit_amount
            .unwrap_or(self.policy.fallback_deposit);

        Ok(RentalQuote {
            elapsed_hours,
            duration_days,
            remainder_hours,
            base_price,
            insurance_fee,
            service_fee,
            additional_insurance_fee,
            discount,
            total_due,
            deposit_due,
        })
    }

    /// Late-return charge for a rental handed back at `returned_at`.
    ///
    /// Only whole late hours count, so a return up to 59 minutes late is free.
    pub fn late_fee(
        &self,
        rate: &RateSchedule,
        window: &RentalWindow,
        returned_at: chrono::DateTime<chrono::Utc>,
    ) -> (i64, Money) {
        let late_hours = (returned_at - window.return_at).num_hours();
        if late_hours <= 0 {
            return (0, Money::ZERO);
        }
        let fee = (rate.hourly_rate * late_hours).percent_of(self.policy.late_return_multiplier);
        (late_hours, fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn rates() -> RateSchedule {
        RateSchedule::new(
            Money::new(dec!(500000)),
            Money::new(dec!(50000)),
            Some(Money::new(dec!(3000000))),
        )
        .unwrap()
    }

    fn window_of(duration: Duration) -> RentalWindow {
        let pickup = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        RentalWindow::new(pickup, pickup + duration).unwrap()
    }

    #[test]
    fn test_exactly_one_day() {
        let calc = PricingCalculator::default();
        let quote = calc
            .quote(&rates(), &window_of(Duration::hours(24)), &RentalOptions::default())
            .unwrap();

        assert_eq!(quote.duration_days, 1);
        assert_eq!(quote.remainder_hours, 0);
        assert_eq!(quote.base_price, Money::new(dec!(500000)));
        assert_eq!(quote.insurance_fee, Money::new(dec!(50000)));
        assert_eq!(quote.service_fee, Money::new(dec!(25000)));
        assert_eq!(quote.total_due, Money::new(dec!(575000)));
        assert_eq!(quote.deposit_due, Money::new(dec!(3000000)));
    }

    #[test]
    fn test_multi_day_with_remainder() {
        let calc = PricingCalculator::default();
        let quote = calc
            .quote(&rates(), &window_of(Duration::hours(54)), &RentalOptions::default())
            .unwrap();

        assert_eq!(quote.elapsed_hours, 54);
        assert_eq!(quote.duration_days, 2);
        assert_eq!(quote.remainder_hours, 6);
        assert_eq!(quote.base_price, Money::new(dec!(1300000)));
        assert_eq!(quote.insurance_fee, Money::new(dec!(130000)));
        assert_eq!(quote.service_fee, Money::new(dec!(65000)));
        assert_eq!(quote.total_due, Money::new(dec!(1495000)));
    }

    #[test]
    fn test_single_day_boundary_truncates_minutes() {
        let calc = PricingCalculator::default();
        let opts = RentalOptions::default();

        // 24h01m truncates to 24 whole hours and stays in the single-day branch
        let q = calc
            .quote(&rates(), &window_of(Duration::minutes(24 * 60 + 1)), &opts)
            .unwrap();
        assert_eq!(q.duration_days, 1);
        assert_eq!(q.base_price, Money::new(dec!(500000)));

        let q = calc
            .quote(&rates(), &window_of(Duration::hours(25)), &opts)
            .unwrap();
        assert_eq!(q.duration_days, 1);
        assert_eq!(q.remainder_hours, 1);
        assert_eq!(q.base_price, Money::new(dec!(550000)));
    }

    #[test]
    fn test_short_window_is_charged_a_full_day() {
        let calc = PricingCalculator::default();
        let q = calc
            .quote(&rates(), &window_of(Duration::hours(3)), &RentalOptions::default())
            .unwrap();
        assert_eq!(q.duration_days, 1);
        assert_eq!(q.base_price, Money::new(dec!(500000)));
    }

    #[test]
    fn test_additional_insurance_per_day() {
        let calc = PricingCalculator::default();
        let opts = RentalOptions {
            additional_insurance: true,
            discount: Money::ZERO,
        };
        let q = calc
            .quote(&rates(), &window_of(Duration::hours(54)), &opts)
            .unwrap();
        assert_eq!(q.additional_insurance_fee, Money::new(dec!(80000)));
        // insurance and service fees ignore the add-on
        assert_eq!(q.insurance_fee, Money::new(dec!(130000)));
        assert_eq!(q.service_fee, Money::new(dec!(65000)));
        assert_eq!(q.total_due, Money::new(dec!(1575000)));
    }

    #[test]
    fn test_discount_reduces_total() {
        let calc = PricingCalculator::default();
        let opts = RentalOptions {
            additional_insurance: false,
            discount: Money::new(dec!(75000)),
        };
        let q = calc
            .quote(&rates(), &window_of(Duration::hours(24)), &opts)
            .unwrap();
        assert_eq!(q.total_due, Money::new(dec!(500000)));

        let negative = RentalOptions {
            additional_insurance: false,
            discount: Money::new(dec!(-1)),
        };
        assert!(matches!(
            calc.quote(&rates(), &window_of(Duration::hours(24)), &negative),
            Err(RentalError::Validation(_))
        ));
    }

    #[test]
    fn test_discount_bounded_by_subtotal() {
        let calc = PricingCalculator::default();
        let window = window_of(Duration::hours(24));

        // 500,000 + 50,000 + 25,000
        let full = RentalOptions {
            additional_insurance: false,
            discount: Money::new(dec!(575000)),
        };
        let q = calc.quote(&rates(), &window, &full).unwrap();
        assert_eq!(q.total_due, Money::ZERO);

        let over = RentalOptions {
            additional_insurance: false,
            discount: Money::new(dec!(575001)),
        };
        assert!(matches!(
            calc.quote(&rates(), &window, &over),
            Err(RentalError::Validation(_))
        ));
    }

    #[test]
    fn test_fallback_deposit() {
        let calc = PricingCalculator::default();
        let no_deposit =
            RateSchedule::new(Money::new(dec!(500000)), Money::new(dec!(50000)), None).unwrap();
        let q = calc
            .quote(&no_deposit, &window_of(Duration::hours(24)), &RentalOptions::default())
            .unwrap();
        assert_eq!(q.deposit_due, Money::new(dec!(5000000)));
    }

    #[test]
    fn test_fee_rounding_half_up() {
        let calc = PricingCalculator::default();
        let odd = RateSchedule::new(Money::new(dec!(333335)), Money::ZERO, None).unwrap();
        let q = calc
            .quote(&odd, &window_of(Duration::hours(10)), &RentalOptions::default())
            .unwrap();
        // 33,333.5 and 16,666.75
        assert_eq!(q.insurance_fee, Money::new(dec!(33334)));
        assert_eq!(q.service_fee, Money::new(dec!(16667)));
        assert_eq!(q.total_due, Money::new(dec!(383336)));
    }

    #[test]
    fn test_rejects_unvalidated_inverted_window() {
        let pickup = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        let window = RentalWindow {
            pickup,
            return_at: pickup - Duration::hours(1),
        };
        let result = PricingCalculator::default().quote(&rates(), &window, &RentalOptions::default());
        assert!(matches!(result, Err(RentalError::InvalidWindow)));
    }

    #[test]
    fn test_quote_is_byte_identical_across_calls() {
        let calc = PricingCalculator::default();
        let window = window_of(Duration::hours(77));
        let opts = RentalOptions {
            additional_insurance: true,
            discount: Money::ZERO,
        };
        let a = serde_json::to_vec(&calc.quote(&rates(), &window, &opts).unwrap()).unwrap();
        let b = serde_json::to_vec(&calc.quote(&rates(), &window, &opts).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_late_fee() {
        let calc = PricingCalculator::default();
        let window = window_of(Duration::hours(24));

        let (hours, fee) = calc.late_fee(&rates(), &window, window.return_at + Duration::minutes(59));
        assert_eq!((hours, fee), (0, Money::ZERO));

        let (hours, fee) = calc.late_fee(&rates(), &window, window.return_at + Duration::minutes(150));
        assert_eq!(hours, 2);
        assert_eq!(fee, Money::new(dec!(150000)));

        let (hours, _) = calc.late_fee(&rates(), &window, window.return_at - Duration::hours(3));
        assert_eq!(hours, 0);
    }
}
