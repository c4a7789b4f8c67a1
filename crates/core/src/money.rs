//! Money in minor currency units.
//!
//! Costs are carried as `i64` cents end to end. The 0.01 equality tolerance
//! used by reconciliation is exactly one minor unit.

/// Two costs closer than this are the same cost.
pub const EQUALITY_TOLERANCE_CENTS: i64 = 1;

/// Parse a human-entered amount into minor units.
///
/// Strips currency symbols and codes (`£`, `$`, `€`, `GBP`), thousands
/// separators and whitespace. Accepts a leading or trailing minus and
/// parenthesized negatives. When both `,` and `.` occur, the later one is the
/// decimal separator; a lone comma followed by one or two digits is a decimal
/// comma. More than two fraction digits round half-up.
///
/// Returns `None` when no digits are present.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let negative = s.starts_with('-')
        || s.ends_with('-')
        || (s.starts_with('(') && s.ends_with(')'))
        || s.contains("-£")
        || s.contains("-$")
        || s.contains("-€");

    let kept: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let decimal = decimal_separator(&kept);
    let (int_part, frac_part) = match decimal {
        Some(sep) => match kept.rfind(sep) {
            Some(pos) => (&kept[..pos], &kept[pos + 1..]),
            None => (kept.as_str(), ""),
        },
        None => (kept.as_str(), ""),
    };

    let mut units: i64 = 0;
    for c in int_part.chars().filter(|c| c.is_ascii_digit()) {
        units = units.checked_mul(10)?.checked_add(c.to_digit(10)? as i64)?;
    }

    let frac_digits: Vec<i64> = frac_part
        .chars()
        .filter(|c| c.is_ascii_digit())
        .filter_map(|c| c.to_digit(10).map(i64::from))
        .collect();
    let tenths = frac_digits.first().copied().unwrap_or(0);
    let hundredths = frac_digits.get(1).copied().unwrap_or(0);
    let round_up = frac_digits.get(2).copied().unwrap_or(0) >= 5;

    let mut cents = units.checked_mul(100)?.checked_add(tenths * 10 + hundredths)?;
    if round_up {
        cents = cents.checked_add(1)?;
    }

    Some(if negative { -cents } else { cents })
}

fn decimal_separator(s: &str) -> Option<char> {
    let dot = s.rfind('.');
    let comma = s.rfind(',');
    match (dot, comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => {
            // 1.234.567 is a thousands-grouped integer
            if s.matches('.').count() > 1 {
                None
            } else {
                Some('.')
            }
        }
        (None, Some(c)) => {
            let after = s.len() - c - 1;
            if s.matches(',').count() == 1 && (1..=2).contains(&after) {
                Some(',')
            } else {
                None
            }
        }
        (None, None) => None,
    }
}

/// Render minor units as a plain decimal string, e.g. `1234` → `"12.34"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_amounts() {
        assert_eq!(parse_amount("12.34"), Some(1234));
        assert_eq!(parse_amount("12"), Some(1200));
        assert_eq!(parse_amount("0.5"), Some(50));
        assert_eq!(parse_amount(".99"), Some(99));
    }

    #[test]
    fn symbols_codes_and_grouping() {
        assert_eq!(parse_amount("£1,234.56"), Some(123456));
        assert_eq!(parse_amount("GBP 7.20"), Some(720));
        assert_eq!(parse_amount("$ 1 000.00"), Some(100000));
        assert_eq!(parse_amount("1.234,56 €"), Some(123456));
        assert_eq!(parse_amount("1,234"), Some(123400));
        assert_eq!(parse_amount("12,5"), Some(1250));
    }

    #[test]
    fn negatives() {
        assert_eq!(parse_amount("-4.10"), Some(-410));
        assert_eq!(parse_amount("(4.10)"), Some(-410));
        assert_eq!(parse_amount("-£4.10"), Some(-410));
        assert_eq!(parse_amount("4.10-"), Some(-410));
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(parse_amount("1.005"), Some(101));
        assert_eq!(parse_amount("1.004"), Some(100));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("£"), None);
    }

    #[test]
    fn formats_cents() {
        assert_eq!(format_cents(650), "6.50");
        assert_eq!(format_cents(-5), "-0.05");
        assert_eq!(format_cents(0), "0.00");
    }
}
