//! Display formatting in the dashboard's French locale

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// Grouping separator used by the French locale (narrow no-break space)
const GROUP_SEPARATOR: char = '\u{202f}';
/// Space between amount and currency symbol (no-break space)
const SYMBOL_SEPARATOR: char = '\u{a0}';

fn currency_symbol(code: &str) -> &str {
    match code {
        "EUR" => "€",
        "USD" => "$",
        "GBP" => "£",
        "JPY" => "¥",
        other => other,
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(c);
    }
    grouped
}

/// `1234.5, "EUR"` → `1 234,50 €`
pub fn format_currency(amount: Decimal, currency: &str) -> String {
    let rounded = amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .abs();
    let text = format!("{:.2}", rounded);
    let (units, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let sign = if amount.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    format!(
        "{}{},{}{}{}",
        sign,
        group_thousands(units),
        cents,
        SYMBOL_SEPARATOR,
        currency_symbol(currency)
    )
}

/// `2024-05-01` → `01/05/2024`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn full_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name.trim(), last_name.trim())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plain(s: String) -> String {
        s.replace([GROUP_SEPARATOR, SYMBOL_SEPARATOR], " ")
    }

    #[test]
    fn test_format_currency_french_grouping() {
        assert_eq!(plain(format_currency(dec!(1234.56), "EUR")), "1 234,56 €");
        assert_eq!(plain(format_currency(dec!(1234567.8), "EUR")), "1 234 567,80 €");
        assert_eq!(plain(format_currency(dec!(12), "USD")), "12,00 $");
        assert_eq!(plain(format_currency(dec!(999.999), "EUR")), "1 000,00 €");
    }

    #[test]
    fn test_format_currency_negative_and_unknown_code() {
        assert_eq!(plain(format_currency(dec!(-50.5), "EUR")), "-50,50 €");
        assert_eq!(plain(format_currency(dec!(-0.001), "EUR")), "0,00 €");
        assert_eq!(plain(format_currency(dec!(3), "XOF")), "3,00 XOF");
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(format_date(date), "01/05/2024");
    }

    #[test]
    fn test_full_name() {
        assert_eq!(full_name("Ali", "Ben"), "Ali Ben");
        assert_eq!(full_name(" Ali ", ""), "Ali");
    }
}
