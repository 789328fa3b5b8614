mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{random_window, standard_rates};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rentcore::domain::cancellation::{CancellationPolicy, CancellationTier};
use rentcore::domain::money::Money;
use rentcore::domain::pricing::{PricingCalculator, RentalOptions};
use rentcore::domain::window::RentalWindow;
use rust_decimal_macros::dec;

#[test]
fn test_random_windows_decompose_consistently() {
    let calc = PricingCalculator::default();
    let rates = standard_rates(None);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..2_000 {
        let window = random_window(&mut rng);
        let options = RentalOptions {
            additional_insurance: rng.gen_bool(0.5),
            ..Default::default()
        };
        let q = calc.quote(&rates, &window, &options).unwrap();

        assert!(q.duration_days >= 1);
        assert!((0..24).contains(&q.remainder_hours));
        if q.elapsed_hours <= 24 {
            assert_eq!((q.duration_days, q.remainder_hours), (1, 0));
            assert_eq!(q.base_price, rates.daily_rate);
        } else {
            assert_eq!(q.duration_days * 24 + q.remainder_hours, q.elapsed_hours);
            assert_eq!(
                q.base_price,
                rates.daily_rate * q.duration_days + rates.hourly_rate * q.remainder_hours
            );
        }

        // Percentage fees ignore the add-on flag
        assert_eq!(q.insurance_fee, q.base_price.percent_of(dec!(0.10)));
        assert_eq!(q.service_fee, q.base_price.percent_of(dec!(0.05)));
        assert_eq!(
            q.total_due,
            q.base_price + q.insurance_fee + q.service_fee + q.additional_insurance_fee
        );
    }
}

#[test]
fn test_quote_is_byte_identical_on_repeat() {
    let calc = PricingCalculator::default();
    let rates = standard_rates(Some(Money::new(dec!(3000000))));
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..200 {
        let window = random_window(&mut rng);
        let options = RentalOptions {
            additional_insurance: true,
            discount: Money::new(dec!(10000)),
        };
        let first = serde_json::to_string(&calc.quote(&rates, &window, &options).unwrap()).unwrap();
        let second = serde_json::to_string(&calc.quote(&rates, &window, &options).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_day_boundary_truncates_minutes() {
    let calc = PricingCalculator::default();
    let rates = standard_rates(None);
    let pickup = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();

    for (minutes, days, hours) in [(24 * 60, 1, 0), (24 * 60 + 1, 1, 0), (25 * 60, 1, 1), (48 * 60, 2, 0)] {
        let window = RentalWindow::new(pickup, pickup + Duration::minutes(minutes)).unwrap();
        let q = calc.quote(&rates, &window, &RentalOptions::default()).unwrap();
        assert_eq!((q.duration_days, q.remainder_hours), (days, hours), "{minutes} minutes");
    }
}

#[test]
fn test_cancellation_tiers_partition_time() {
    let policy = CancellationPolicy::default();
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..2_000 {
        let pickup = created + Duration::minutes(rng.gen_range(60..60 * 24 * 30));
        let cancelled = created + Duration::minutes(rng.gen_range(0..60 * 24 * 40));
        let tier = policy.tier(created, pickup, cancelled);

        let in_grace = cancelled - created <= Duration::minutes(60);
        let far_ahead = pickup - cancelled > Duration::days(7);
        let expected = if in_grace {
            CancellationTier::Grace
        } else if far_ahead {
            CancellationTier::Early
        } else {
            CancellationTier::Late
        };
        assert_eq!(tier, expected);
    }
}
