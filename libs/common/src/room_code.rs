//! Human-shareable room codes.
//!
//! Rooms are addressed by a short code that people read aloud or paste into
//! chat. The normal form is four uppercase letters; [`fallback_code`] produces
//! a longer, time-derived code for when the short space keeps colliding.

use chrono::Utc;
use rand::Rng;

/// Alphabet sampled for regular room codes.
pub const CODE_ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of a regular room code.
pub const CODE_LENGTH: usize = 4;

const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of random base-36 characters appended to a fallback code.
const FALLBACK_SUFFIX_LENGTH: usize = 4;

/// Sample a regular four-letter room code.
pub fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Build a wide code from the current time (base 36, milliseconds) plus a
/// random base-36 suffix.
pub fn fallback_code() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..FALLBACK_SUFFIX_LENGTH)
        .map(|_| BASE36_DIGITS[rng.gen_range(0..BASE36_DIGITS.len())] as char)
        .collect();
    format!("{}{}", to_base36(millis), suffix)
}

/// Whether `code` has the shape of a regular room code.
pub fn is_regular_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_uppercase())
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
