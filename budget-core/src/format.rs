//! Display formatting for amounts.
//!
//! Presentation only: nothing here is ever written back to a node or entry.

use rust_decimal::{Decimal, RoundingStrategy};

const THOUSAND: i64 = 1_000;
const MILLION: i64 = 1_000_000;
const BILLION: i64 = 1_000_000_000;

/// Full amount with two decimal places, e.g. `$1234.50`.
pub fn format_amount(amount: Decimal, currency_symbol: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{}{:.2}", currency_symbol, rounded)
}

/// Abbreviated amount, e.g. `$12.5K`, `$3.2M`, `$1.05B`.
pub fn abbreviate_amount(amount: Decimal, currency_symbol: &str) -> String {
    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    let magnitude = amount.abs();

    let (scaled, suffix) = if magnitude >= Decimal::from(BILLION) {
        (magnitude / Decimal::from(BILLION), "B")
    } else if magnitude >= Decimal::from(MILLION) {
        (magnitude / Decimal::from(MILLION), "M")
    } else if magnitude >= Decimal::from(THOUSAND) {
        (magnitude / Decimal::from(THOUSAND), "K")
    } else {
        return format!("{}{}", sign, format_amount(magnitude, currency_symbol));
    };

    let shown = scaled
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    format!("{}{}{}{}", sign, currency_symbol, shown, suffix)
}

/// Percentage with up to two decimals, e.g. `37.5%`.
pub fn format_percentage(value: Decimal) -> String {
    let shown = value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    format!("{}%", shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_abbreviations() {
        assert_eq!(abbreviate_amount(dec("950"), "$"), "$950.00");
        assert_eq!(abbreviate_amount(dec("12500"), "$"), "$12.5K");
        assert_eq!(abbreviate_amount(dec("3200000"), "Rs "), "Rs 3.2M");
        assert_eq!(abbreviate_amount(dec("1050000000"), "$"), "$1.05B");
        assert_eq!(abbreviate_amount(dec("-2000"), "$"), "-$2K");
    }

    #[test]
    fn test_full_amount() {
        assert_eq!(format_amount(dec("1234.5"), "$"), "$1234.50");
        assert_eq!(format_amount(dec("0.005"), "$"), "$0.01");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(format_percentage(dec("37.500")), "37.5%");
        assert_eq!(format_percentage(dec("100")), "100%");
    }
}
