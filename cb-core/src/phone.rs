//! Phone number normalization.

/// Normalize a North American phone number to E.164.
///
/// Ten digits get a `+1` prefix, eleven digits starting with `1` get a `+`.
/// Anything else is rejected.
pub fn format_phone_number(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        _ => None,
    }
}

/// Normalize when possible, otherwise keep the trimmed input.
pub fn normalize_or_keep(raw: &str) -> String {
    format_phone_number(raw).unwrap_or_else(|| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digits() {
        assert_eq!(format_phone_number("(555) 123-4567").as_deref(), Some("+15551234567"));
    }

    #[test]
    fn test_eleven_digits() {
        assert_eq!(format_phone_number("1-555-123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(format_phone_number("+1 555 123 4567").as_deref(), Some("+15551234567"));
        assert_eq!(format_phone_number("25551234567"), None);
    }

    #[test]
    fn test_rejects_other_lengths() {
        assert_eq!(format_phone_number("12345"), None);
        assert_eq!(format_phone_number(""), None);
    }

    #[test]
    fn test_normalize_or_keep() {
        assert_eq!(normalize_or_keep(" 555-0100 "), "555-0100");
        assert_eq!(normalize_or_keep("5551234567"), "+15551234567");
    }
}
