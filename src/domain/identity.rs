//! Brazilian CPF handling: normalization, check-digit validation and the
//! one-way hash used as a pseudonymous identity token.

use sha2::{Digest, Sha256};

pub const CPF_LENGTH: usize = 11;
pub const DISPLAY_HASH_LENGTH: usize = 8;
pub const ANONYMOUS_DISPLAY: &str = "[Anônimo]";

pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Never panics; any malformed input is simply invalid.
pub fn is_valid(raw: &str) -> bool {
    let digits: Vec<u32> = normalize(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();
    if digits.len() != CPF_LENGTH {
        return false;
    }
    if digits.iter().all(|digit| *digit == digits[0]) {
        return false;
    }

    digits[9] == check_digit(&digits[..9]) && digits[10] == check_digit(&digits[..10])
}

/// Weighted sum mod 11, weights descending to 2 from `len + 1`.
fn check_digit(digits: &[u32]) -> u32 {
    let top = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(index, digit)| digit * (top - index as u32))
        .sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

pub fn hash(raw: &str) -> String {
    let digest = Sha256::digest(normalize(raw).as_bytes());
    hex::encode(digest)
}

/// `###.###.###-##`; inputs that do not normalize to 11 digits come back normalized.
pub fn format(raw: &str) -> String {
    let digits = normalize(raw);
    if digits.len() != CPF_LENGTH {
        return digits;
    }
    format!(
        "{}.{}.{}-{}",
        &digits[..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..]
    )
}

pub fn display_hash(hashed: &str) -> String {
    if hashed.is_empty() {
        return ANONYMOUS_DISPLAY.to_string();
    }
    hashed.chars().take(DISPLAY_HASH_LENGTH).collect()
}
