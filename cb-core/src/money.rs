//! Money rounding helpers.
//!
//! Amounts are `f64` dollars. Every value shown to a customer or stored on an
//! invoice goes through [`round_currency`].

/// Round to cents, half away from zero.
pub fn round_currency(value: f64) -> f64 {
    round_to(value, 2)
}

/// Round to one decimal place, half away from zero.
pub fn round_to_tenth(value: f64) -> f64 {
    round_to(value, 1)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    // Nudge by a tiny epsilon so 2.675 lands on 2.68 despite binary representation.
    let scaled = value * factor;
    let nudged = scaled + scaled.signum() * 1e-9;
    nudged.round() / factor
}

/// Format an amount as `$1,234.50`.
pub fn format_usd(value: f64) -> String {
    let rounded = round_currency(value);
    let negative = rounded < 0.0;
    let cents = (rounded.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}${}.{:02}", if negative { "-" } else { "" }, grouped, cents % 100)
}

/// Whether two amounts are equal to the cent.
pub fn same_amount(a: f64, b: f64) -> bool {
    (round_currency(a) - round_currency(b)).abs() < 0.005
}
