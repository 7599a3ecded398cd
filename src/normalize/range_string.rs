//! Parses the remote service's human-readable range strings (`">1M"`,
//! `"$9K-$10K"`) into structured bounds.
//!
//! This is deliberately partial; see the Open Questions in SPEC_FULL.md.
//! Only the cases exercised by the test suite below are claimed to work;
//! anything else should be treated as unsupported rather than silently wrong.

use crate::models::NumericRange;

fn suffix_multiplier(c: char) -> Option<i64> {
    match c.to_ascii_uppercase() {
        'K' => Some(1_000),
        'M' => Some(1_000_000),
        'B' => Some(1_000_000_000),
        _ => None,
    }
}

/// Parse one bound like `"9K"`, `"1.5M"`, `"$10K"`, `"500"` into an integer,
/// returning the currency symbol encountered (if any) alongside it.
fn parse_bound(raw: &str) -> Option<(i64, Option<char>)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut chars = trimmed.chars().peekable();
    let currency = match chars.peek() {
        Some(c) if !c.is_ascii_digit() && *c != '.' => {
            let sym = *c;
            chars.next();
            Some(sym)
        }
        _ => None,
    };

    let rest: String = chars.collect();
    let (numeric_part, multiplier) = match rest.chars().last() {
        Some(c) if suffix_multiplier(c).is_some() => {
            (&rest[..rest.len() - c.len_utf8()], suffix_multiplier(c).unwrap())
        }
        _ => (rest.as_str(), 1),
    };

    let value: f64 = numeric_part.parse().ok()?;
    Some(((value * multiplier as f64).round() as i64, currency))
}

/// Parse a range-string into a [`NumericRange`]. Handles:
/// - `">X"` → lower = X, upper = None
/// - `"<X"` → lower = None, upper = X
/// - `"X-Y"` → lower = X, upper = Y
/// - a bare scalar `"X"` → lower = upper = X
pub fn parse_range_string(input: &str) -> Option<NumericRange> {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix('>') {
        let (value, currency) = parse_bound(rest)?;
        return Some(with_currency(NumericRange::new(Some(value), None), currency));
    }
    if let Some(rest) = trimmed.strip_prefix('<') {
        let (value, currency) = parse_bound(rest)?;
        return Some(with_currency(NumericRange::new(None, Some(value)), currency));
    }

    if let Some(dash_pos) = trimmed.find('-') {
        // Guard against a leading '-' being part of a negative number rather
        // than the range separator (not expected from this protocol, but
        // don't misparse if it ever shows up).
        if dash_pos > 0 {
            let (lower_raw, upper_raw) = trimmed.split_at(dash_pos);
            let upper_raw = &upper_raw[1..];
            let (lower, lower_currency) = parse_bound(lower_raw)?;
            let (upper, upper_currency) = parse_bound(upper_raw)?;
            let currency = lower_currency.or(upper_currency);
            return Some(with_currency(
                NumericRange::new(Some(lower), Some(upper)),
                currency,
            ));
        }
    }

    let (value, currency) = parse_bound(trimmed)?;
    Some(with_currency(NumericRange::new(Some(value), Some(value)), currency))
}

fn with_currency(range: NumericRange, currency: Option<char>) -> NumericRange {
    match currency {
        Some('$') => range.with_currency("USD"),
        Some(sym) => range.with_currency(sym.to_string()),
        None => range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_than_million() {
        let r = parse_range_string(">1M").unwrap();
        assert_eq!(r.lower, Some(1_000_000));
        assert_eq!(r.upper, None);
    }

    #[test]
    fn currency_range() {
        let r = parse_range_string("$9K-$10K").unwrap();
        assert_eq!(r.lower, Some(9_000));
        assert_eq!(r.upper, Some(10_000));
        assert_eq!(r.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn bare_scalar() {
        let r = parse_range_string("500").unwrap();
        assert_eq!(r.lower, Some(500));
        assert_eq!(r.upper, Some(500));
    }

    #[test]
    fn less_than_bound() {
        let r = parse_range_string("<5K").unwrap();
        assert_eq!(r.lower, None);
        assert_eq!(r.upper, Some(5_000));
    }
}
