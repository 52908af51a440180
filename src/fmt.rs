use serde::{Deserialize, Serialize};

use crate::models::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// 12,34,567.00
    #[default]
    Indian,
    /// 1,234,567.00
    International,
    /// 1.234.567,00
    European,
}

/// Format minor units with grouping separators: ₹12,34,567.89
pub fn money(cents: Cents, symbol: &str, format: NumberFormat) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let int_part = (abs / 100).to_string();
    let dec_part = abs % 100;

    let (group_sep, decimal_sep) = match format {
        NumberFormat::Indian | NumberFormat::International => (',', '.'),
        NumberFormat::European => ('.', ','),
    };

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        let boundary = match format {
            NumberFormat::Indian => i == 3 || (i > 3 && i % 2 == 1),
            NumberFormat::International | NumberFormat::European => i > 0 && i % 3 == 0,
        };
        if boundary {
            grouped.push(group_sep);
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if negative {
        format!("-{symbol}{grouped}{decimal_sep}{dec_part:02}")
    } else {
        format!("{symbol}{grouped}{decimal_sep}{dec_part:02}")
    }
}

/// Parses a user- or message-supplied amount into minor units. Accepts
/// grouping commas, a currency marker, a leading minus and accounting-style
/// parentheses. More than two decimal places is rejected.
pub fn parse_amount(raw: &str) -> Option<Cents> {
    let mut s = raw.trim().replace([',', '₹', '$'], "");
    let lower = s.to_ascii_lowercase();
    for prefix in ["rs.", "rs", "inr"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            s = s[s.len() - rest.len()..].to_string();
            break;
        }
    }
    let s = s.trim();

    let (negative, s) = if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        (true, inner.trim())
    } else if let Some(rest) = s.strip_prefix('-') {
        (true, rest.trim())
    } else {
        (false, s)
    };

    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if frac.len() > 2 {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_indian_grouping() {
        assert_eq!(money(123_456_789, "₹", NumberFormat::Indian), "₹12,34,567.89");
        assert_eq!(money(250_000, "₹", NumberFormat::Indian), "₹2,500.00");
        assert_eq!(money(99, "₹", NumberFormat::Indian), "₹0.99");
        assert_eq!(money(-50_000_000, "₹", NumberFormat::Indian), "-₹5,00,000.00");
    }

    #[test]
    fn test_money_international_and_european() {
        assert_eq!(money(100_000_099, "$", NumberFormat::International), "$1,000,000.99");
        assert_eq!(money(4_210, "$", NumberFormat::International), "$42.10");
        assert_eq!(money(123_456_700, "€", NumberFormat::European), "€1.234.567,00");
        assert_eq!(money(0, "€", NumberFormat::European), "€0,00");
    }

    #[test]
    fn test_parse_amount_forms() {
        assert_eq!(parse_amount("2500.00"), Some(250_000));
        assert_eq!(parse_amount("1,250.5"), Some(125_050));
        assert_eq!(parse_amount("Rs.350"), Some(35_000));
        assert_eq!(parse_amount("₹ 42"), Some(4_200));
        assert_eq!(parse_amount("(12.00)"), Some(-1_200));
        assert_eq!(parse_amount("-3.25"), Some(-325));
        assert_eq!(parse_amount(".75"), Some(75));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1.234"), None);
        assert_eq!(parse_amount("12.3.4"), None);
        assert_eq!(parse_amount("99999999999999999999"), None);
    }
}
