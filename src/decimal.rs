//! Decimal text for quantities and coordinates.
//!
//! Amounts and bounds travel as canonical strings: explicit sign, fraction
//! digits exactly as written. Tolerance bounds (`10~0.5`) and range checks
//! parse them into [`BigDecimal`], which keeps the scale of its operands.

use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

/// No exponent, digits on both sides of the point.
static DECIMAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?$").unwrap());

pub fn parse(raw: &str) -> Option<BigDecimal> {
    if !DECIMAL_REGEX.is_match(raw) {
        return None;
    }
    BigDecimal::from_str(raw.strip_prefix('+').unwrap_or(raw)).ok()
}

/// Canonical text: `+` or `-`, no redundant leading zeros, scale kept.
pub fn format(value: &BigDecimal) -> String {
    let plain = value.to_plain_string();
    if plain.starts_with('-') {
        plain
    } else {
        format!("+{}", plain)
    }
}

pub fn normalize(raw: &str) -> Option<String> {
    parse(raw).map(|value| format(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(raw: &str) -> String {
        format(&parse(raw).unwrap())
    }

    #[test]
    fn normalize_adds_sign_and_strips_leading_zeros() {
        assert_eq!(normalize("10").as_deref(), Some("+10"));
        assert_eq!(normalize("007.50").as_deref(), Some("+7.50"));
        assert_eq!(normalize("-0.001").as_deref(), Some("-0.001"));
        assert_eq!(normalize("-0").as_deref(), Some("+0"));
        assert_eq!(normalize("+0.0").as_deref(), Some("+0.0"));
    }

    #[test]
    fn normalize_rejects_non_decimals() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("1e5"), None);
        assert_eq!(normalize(".5"), None);
        assert_eq!(normalize("1."), None);
        assert_eq!(normalize("ten"), None);
    }

    #[test]
    fn bounds_keep_the_widest_scale() {
        let amount = parse("10").unwrap();
        let tolerance = parse("0.5").unwrap();
        assert_eq!(format(&(&amount - &tolerance)), "+9.5");
        assert_eq!(format(&(&amount + &tolerance)), "+10.5");
        assert_eq!(format(&(parse("9.99").unwrap() + parse("0.01").unwrap())), "+10.00");
        assert_eq!(format(&(parse("0.2").unwrap() - parse("0.5").unwrap())), "-0.3");
    }

    #[test]
    fn huge_values_are_exact() {
        let a = parse("123456789012345678901234567890.000000000000000001").unwrap();
        assert_eq!(
            format(&(a + parse("1").unwrap())),
            "+123456789012345678901234567891.000000000000000001"
        );
        assert_eq!(canonical("-12345678901234567890.5"), "-12345678901234567890.5");
    }

    #[test]
    fn compares_numerically() {
        assert!(parse("9.5").unwrap() < parse("10").unwrap());
        assert_eq!(parse("10.0").unwrap(), parse("10").unwrap());
        assert!(parse("-1").unwrap() > parse("-2").unwrap());
    }
}
