//! Number formatting shared by the human-readable reports.

/// Group an integer's digits in thousands: `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a dollar amount with thousands separators and a fixed number of
/// decimals: `format_usd(1234.567, 2)` -> `"$1,234.57"`.
pub fn format_usd(value: f64, decimals: usize) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    let grouped = int_part
        .parse::<u64>()
        .map(group_thousands)
        .unwrap_or_else(|_| int_part.to_string());
    match frac_part {
        Some(frac) => format!("{sign}${grouped}.{frac}"),
        None => format!("{sign}${grouped}"),
    }
}
