// src/domain/format.rs
// Display helpers shared by alert texts and quote replies

use rust_decimal::prelude::*;

/// Format an amount with two decimals and thousands separators ("62,000.00").
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    group_thousands(&format!("{:.2}", value))
}

pub fn format_decimal(value: Decimal) -> String {
    group_thousands(&format!("{:.2}", value.round_dp(2)))
}

/// Percentage change from `old` to `new`, rounded to two decimals.
/// A zero base yields 0.
pub fn percentage_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return 0.0;
    }
    (((new - old) / old) * 100.0 * 100.0).round() / 100.0
}

fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}
