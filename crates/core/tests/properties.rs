// Property-based tests for tracking-number and money normalization.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use freightrecon_core::{format_cents, parse_amount, TrackingNumber};
use proptest::prelude::*;

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

/// `1234567` → `"12,345.67"`.
fn grouped(cents: i64) -> String {
    let plain = format_cents(cents.abs());
    let (int, frac) = plain.split_once('.').unwrap();
    let mut out = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{out}.{frac}")
}

// ---------------------------------------------------------------------------
// Tracking numbers
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn tracking_normalization_is_idempotent(raw in any::<String>()) {
        let once = TrackingNumber::new(&raw);
        let twice = TrackingNumber::new(once.as_str());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn tracking_ignores_padding_and_case(
        core in "[0-9A-Za-z]{1,30}",
        left in "[ \t]{0,4}",
        right in "[ \t\r\n]{0,4}",
    ) {
        let padded = TrackingNumber::new(&format!("{left}{}{right}", core.to_lowercase()));
        prop_assert_eq!(padded, TrackingNumber::new(&core));
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn formatted_cents_parse_back(cents in -1_000_000_000_000i64..1_000_000_000_000i64) {
        prop_assert_eq!(parse_amount(&format_cents(cents)), Some(cents));
    }

    #[test]
    fn symbols_and_grouping_parse_back(
        cents in 0i64..10_000_000_000i64,
        symbol in prop::sample::select(vec!["£", "$", "€", "GBP ", "USD ", ""]),
        parens in any::<bool>(),
    ) {
        let body = format!("{symbol}{}", grouped(cents));
        let text = if parens { format!("({body})") } else { body };
        let expected = if parens { -cents } else { cents };
        prop_assert_eq!(parse_amount(&text), Some(expected));
    }

    #[test]
    fn parse_amount_never_panics(raw in any::<String>()) {
        let _ = parse_amount(&raw);
    }
}
