use serde::Serialize;
use std::fmt;

/// A Philippine mobile number in `+639XXXXXXXXX` form.
///
/// Only `normalize` and `CanonicalNumber::parse` construct one, so every
/// value passes `is_valid_canonical`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalNumber(String);

impl CanonicalNumber {
    /// Accept text that is already canonical, reject everything else.
    pub fn parse(number: &str) -> Option<Self> {
        if is_valid_canonical(number) {
            Some(Self(number.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize user-entered text into a canonical Philippine mobile number.
///
/// Non-digits are stripped first, then the first matching shape wins:
/// `09` + 9 digits, `9` + 9 digits, `63` + 10 digits. Anything else is
/// rejected outright.
pub fn normalize(input: &str) -> Option<CanonicalNumber> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    let candidate = if digits.starts_with("09") && digits.len() == 11 {
        format!("+63{}", &digits[1..])
    } else if digits.starts_with('9') && digits.len() == 10 {
        format!("+63{}", digits)
    } else if digits.starts_with("63") && digits.len() == 12 {
        // Also covers the `639` prefix.
        format!("+{}", digits)
    } else {
        return None;
    };

    // `63` + non-9 passes the prefix rules but is not a mobile number.
    CanonicalNumber::parse(&candidate)
}

/// True iff `number` is exactly `+639` followed by nine ASCII digits.
pub fn is_valid_canonical(number: &str) -> bool {
    let bytes = number.as_bytes();
    bytes.len() == 13
        && bytes.starts_with(b"+639")
        && bytes[4..].iter().all(u8::is_ascii_digit)
}

/// Rewrite a number into the local `09XXXXXXXXX` form the SMS webhook wants.
///
/// Unrecognised shapes are passed through untouched; the webhook decides.
pub fn to_local(number: &str) -> String {
    if let Some(rest) = number.strip_prefix("+63") {
        format!("0{}", rest)
    } else if number.starts_with("639") {
        format!("0{}", &number[2..])
    } else if number.starts_with("09") && number.len() == 11 {
        number.to_string()
    } else if number.starts_with('9') && number.len() == 10 {
        format!("0{}", number)
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(input: &str) -> Option<String> {
        normalize(input).map(|n| n.to_string())
    }

    #[test]
    fn test_local_format_drops_leading_zero() {
        assert_eq!(norm("09171234567").as_deref(), Some("+639171234567"));
        assert_eq!(norm("09998887777").as_deref(), Some("+639998887777"));
    }

    #[test]
    fn test_ten_digits_starting_with_nine() {
        assert_eq!(norm("9171234567").as_deref(), Some("+639171234567"));
    }

    #[test]
    fn test_country_code_without_plus() {
        assert_eq!(norm("639171234567").as_deref(), Some("+639171234567"));
    }

    #[test]
    fn test_formatting_characters_are_stripped() {
        assert_eq!(norm("0917 123 4567").as_deref(), Some("+639171234567"));
        assert_eq!(norm("0917-123-4567").as_deref(), Some("+639171234567"));
        assert_eq!(norm("+63 917 123 4567").as_deref(), Some("+639171234567"));
        assert_eq!(norm("(0976) 176-1036").as_deref(), Some("+639761761036"));
    }

    #[test]
    fn test_every_result_is_canonical() {
        for input in ["09171234567", "9171234567", "639171234567", "+63 917 123 4567"] {
            let n = normalize(input).unwrap();
            assert!(is_valid_canonical(n.as_str()), "{input} -> {n}");
        }
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert_eq!(norm(""), None);
        assert_eq!(norm("hello"), None);
        assert_eq!(norm("12345678"), None);
        assert_eq!(norm("08171234567"), None);
        assert_eq!(norm("091712345678"), None);
        assert_eq!(norm("917123456"), None);
        assert_eq!(norm("+14155551212"), None);
        assert_eq!(norm("0281234567"), None);
    }

    #[test]
    fn test_country_code_with_landline_prefix_is_invalid() {
        // Matches the `63` length rule but lacks the mobile `9`.
        assert_eq!(norm("632812345678"), None);
    }

    #[test]
    fn test_is_valid_canonical() {
        assert!(is_valid_canonical("+639171234567"));
        assert!(!is_valid_canonical("+63171234567"));
        assert!(!is_valid_canonical("639171234567"));
        assert!(!is_valid_canonical("+6391712345678"));
        assert!(!is_valid_canonical("+63917123456a"));
        assert!(!is_valid_canonical(""));
    }

    #[test]
    fn test_parse_only_accepts_canonical() {
        assert!(CanonicalNumber::parse("+639171234567").is_some());
        assert!(CanonicalNumber::parse("09171234567").is_none());
    }

    #[test]
    fn test_to_local() {
        assert_eq!(to_local("+639171234567"), "09171234567");
        assert_eq!(to_local("639171234567"), "09171234567");
        assert_eq!(to_local("09171234567"), "09171234567");
        assert_eq!(to_local("9171234567"), "09171234567");
        assert_eq!(to_local("12345"), "12345");
        assert_eq!(to_local(""), "");
    }
}
