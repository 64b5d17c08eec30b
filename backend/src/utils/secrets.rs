//! Generation and hashing of opaque credential material.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Prefix that marks a bearer credential as an API key.
pub const API_KEY_PREFIX: &str = "mrk_";
/// Number of leading characters of an API key kept for display.
pub const API_KEY_DISPLAY_LEN: usize = 12;

/// Unambiguous alphabet for human-typed codes (no 0/O, 1/I).
pub const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const DEVICE_CODE_LEN: usize = 64;

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// 256-bit session identifier, base64url without padding. Never carries the
/// API key prefix, so bearer discrimination stays unambiguous.
pub fn generate_session_id() -> String {
    loop {
        let id = URL_SAFE_NO_PAD.encode(random_bytes::<32>());
        if !is_api_key(&id) {
            return id;
        }
    }
}

/// Random value for OIDC `state` and `nonce` parameters.
pub fn generate_state_token() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<24>())
}

/// Returns `(raw_key, display_prefix)`.
pub fn generate_api_key() -> (String, String) {
    let raw = format!("{}{}", API_KEY_PREFIX, URL_SAFE_NO_PAD.encode(random_bytes::<32>()));
    let prefix = raw.chars().take(API_KEY_DISPLAY_LEN).collect();
    (raw, prefix)
}

pub fn is_api_key(credential: &str) -> bool {
    credential.starts_with(API_KEY_PREFIX)
}

/// Hex SHA-256; API keys carry enough entropy that a fast hash suffices and
/// keeps lookup-by-hash deterministic.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// 64 lowercase hex characters.
pub fn generate_device_code() -> String {
    hex::encode(random_bytes::<32>())
}

/// `XXXX-XXXX` drawn from [`USER_CODE_ALPHABET`].
pub fn generate_user_code() -> String {
    let mut rng = OsRng;
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.gen_range(0..USER_CODE_ALPHABET.len());
        code.push(USER_CODE_ALPHABET[idx] as char);
    }
    code
}

pub fn is_valid_device_code(code: &str) -> bool {
    code.len() == DEVICE_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Accepts `XXXX-XXXX` over `[A-Z0-9]`.
pub fn is_valid_user_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 9
        && bytes.iter().enumerate().all(|(i, b)| {
            if i == 4 {
                *b == b'-'
            } else {
                b.is_ascii_uppercase() || b.is_ascii_digit()
            }
        })
}

/// Uppercases, trims and re-inserts the dash for codes typed as `XXXXXXXX`.
pub fn normalize_user_code(input: &str) -> String {
    let upper = input.trim().to_ascii_uppercase();
    if upper.len() == 8 && upper.is_ascii() && !upper.contains('-') {
        format!("{}-{}", &upper[..4], &upper[4..])
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_codes_match_pattern_and_alphabet() {
        for _ in 0..200 {
            let code = generate_user_code();
            assert!(is_valid_user_code(&code), "bad code {}", code);
            assert!(code
                .bytes()
                .filter(|b| *b != b'-')
                .all(|b| USER_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn device_codes_match_internal_pattern() {
        let code = generate_device_code();
        assert!(is_valid_device_code(&code));
        assert!(!is_valid_device_code(&code.to_ascii_uppercase()));
        assert!(!is_valid_device_code("abc"));
    }

    #[test]
    fn user_code_validation_rejects_malformed_input() {
        assert!(is_valid_user_code("ABCD-2345"));
        assert!(!is_valid_user_code("abcd-2345"));
        assert!(!is_valid_user_code("ABCD2345"));
        assert!(!is_valid_user_code("ABCD-23456"));
        assert!(!is_valid_user_code("AB!D-2345"));
    }

    #[test]
    fn normalize_user_code_accepts_lowercase_and_missing_dash() {
        assert_eq!(normalize_user_code(" abcd2345 "), "ABCD-2345");
        assert_eq!(normalize_user_code("abcd-2345"), "ABCD-2345");
    }

    #[test]
    fn api_keys_carry_prefix_and_hash_deterministically() {
        let (raw, prefix) = generate_api_key();
        assert!(is_api_key(&raw));
        assert!(raw.starts_with(&prefix));
        assert_eq!(prefix.len(), API_KEY_DISPLAY_LEN);
        assert_eq!(hash_secret(&raw), hash_secret(&raw));
        assert_ne!(hash_secret(&raw), hash_secret("other"));
    }

    #[test]
    fn session_ids_are_not_api_keys() {
        let id = generate_session_id();
        assert_eq!(id.len(), 43);
        assert!(!is_api_key(&id));
    }
}
