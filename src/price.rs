//! Price text normalisation.
//!
//! Menu prices arrive as free-form text: currency symbols differ per site
//! and encoding, separators differ per locale, and decoration like "ab"
//! or "EUR" surrounds the number. Rather than demanding an exact format,
//! the parser hunts for the first decimal-looking token and discards
//! everything around it.

use std::sync::LazyLock;

use regex::Regex;

/// Digits, exactly one `.` or `,` separator, digits.
static DECIMAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)[.,](\d+)").expect("valid decimal pattern"));

/// Extract a monetary amount from raw price text.
///
/// Returns `None` when no `digits{.,}digits` token is present or the parsed
/// value is not a finite non-negative number; callers drop the affected item
/// rather than carrying a garbage price.
pub fn parse_price(raw: &str) -> Option<f64> {
    let captures = DECIMAL_PATTERN.captures(raw)?;
    let normalised = format!("{}.{}", &captures[1], &captures[2]);
    let value: f64 = normalised.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|v| (v - expected).abs() < 1e-9)
    }

    #[test]
    fn parses_comma_decimal_with_currency_symbol() {
        assert!(close(parse_price("€ 12,99"), 12.99));
        assert!(close(parse_price("12,50 €"), 12.50));
    }

    #[test]
    fn parses_dot_decimal_with_trailing_text() {
        assert!(close(parse_price("9.50 EUR"), 9.50));
        assert!(close(parse_price("  7.00"), 7.0));
    }

    #[test]
    fn parses_first_decimal_token_when_text_surrounds_it() {
        assert!(close(parse_price("ab 3,50 € (0,5l)"), 3.50));
        assert!(close(parse_price("now 4.20 was 5.90"), 4.20));
    }

    #[test]
    fn mojibake_currency_symbols_are_ignored() {
        // UTF-8 euro sign read as Latin-1, a classic mismatch.
        assert!(close(parse_price("â‚¬ 8,90"), 8.90));
    }

    #[test]
    fn rejects_text_without_a_decimal_pattern() {
        assert_eq!(parse_price("Price unavailable"), None);
        assert_eq!(parse_price("ask staff"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("   "), None);
    }

    #[test]
    fn rejects_bare_integers() {
        // No decimal separator, no match; the menu never prints whole-euro
        // prices without cents.
        assert_eq!(parse_price("12"), None);
        assert_eq!(parse_price("from 5"), None);
    }

    #[test]
    fn minus_signs_are_not_part_of_the_amount() {
        // The token scanner only sees digits, so a leading minus is
        // decoration and the amount stays non-negative.
        assert!(close(parse_price("-3,50"), 3.50));
    }
}
