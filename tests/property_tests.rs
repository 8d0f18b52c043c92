//! Property-based tests for money and profile helpers.

use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::common::{is_plausible_email, to_minor_units};

fn email_strategy() -> impl Strategy<Value = String> {
    (
        "[a-z]{3,10}",
        "[a-z]{3,8}",
        prop_oneof!["com", "org", "net", "io"],
    )
        .prop_map(|(local, domain, tld)| format!("{}@{}.{}", local, domain, tld))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn two_decimal_prices_convert_exactly(dollars in 0i64..10_000_000, cents in 0i64..100) {
        let amount = Decimal::new(dollars * 100 + cents, 2);
        prop_assert_eq!(to_minor_units(amount).unwrap(), dollars * 100 + cents);
    }

    #[test]
    fn third_decimal_rounds_half_away_from_zero(cents in 0i64..1_000_000, mills in 0i64..10) {
        let amount = Decimal::new(cents * 10 + mills, 3);
        let expected = if mills >= 5 { cents + 1 } else { cents };
        prop_assert_eq!(to_minor_units(amount).unwrap(), expected);
    }

    #[test]
    fn conversion_is_monotonic(a in 0i64..100_000_000, b in 0i64..100_000_000) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low = to_minor_units(Decimal::new(low, 4)).unwrap();
        let high = to_minor_units(Decimal::new(high, 4)).unwrap();
        prop_assert!(low <= high);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn well_formed_emails_are_plausible(email in email_strategy()) {
        prop_assert!(is_plausible_email(&email), "rejected: {}", email);
    }

    #[test]
    fn strings_without_at_sign_are_not_plausible(s in "[a-z0-9.]{0,30}") {
        prop_assert!(!is_plausible_email(&s));
    }
}
