use super::error::ApiError;

/// URL-safe positional base-64 alphabet. Digit value equals index.
const ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// Encodes a recipe id into a compact share token. Bijective over u64,
/// no secret involved.
pub fn encode(mut value: u64) -> String {
    if value == 0 {
        return String::from("0");
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 64) as usize]);
        value /= 64;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// Inverse of [`encode`]. Rejects tokens with characters outside the
/// alphabet and tokens that overflow u64.
pub fn decode(token: &str) -> Result<u64, ApiError> {
    if token.is_empty() {
        return Err(ApiError::validation("short-link token is empty"));
    }

    let mut value: u64 = 0;
    for byte in token.bytes() {
        let digit = ALPHABET
            .iter()
            .position(|c| *c == byte)
            .ok_or_else(|| ApiError::validation("invalid character in short-link token"))?;

        value = value
            .checked_mul(64)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| ApiError::validation("short-link token out of range"))?;
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_encodes_to_single_digit() {
        assert_eq!(encode(0), "0");
        assert_eq!(decode("0").unwrap(), 0);
    }

    #[test]
    fn round_trips() {
        for value in [0, 1, 63, 64, 65, 4095, 4096, 123_456_789, u64::MAX] {
            assert_eq!(decode(&encode(value)).unwrap(), value, "value {value}");
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(encode(63), "_");
        assert_eq!(encode(64), "10");
        assert_eq!(encode(65), "11");
    }

    #[test]
    fn alphabet_is_url_safe() {
        for byte in ALPHABET {
            let c = char::from(*byte);
            assert!(c.is_ascii_alphanumeric() || c == '-' || c == '_');
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("abc+def").is_err());
        assert!(decode("päivää").is_err());
        // 12 digits of the top value overflow u64
        assert!(decode("____________").is_err());
    }
}
