//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

const PREFIX: &str = "sha256=";

/// Returns `true` when `header` is `sha256=<hex>` and the hex is the
/// HMAC-SHA256 of `body` under `secret`.
///
/// The hex digits are compared case-insensitively and in constant time.
pub fn verify(body: &[u8], header: Option<&str>, secret: &str) -> bool {
    let Some(provided) = header.and_then(|h| h.trim().strip_prefix(PREFIX)) else {
        return false;
    };
    let expected = sign(body, secret);
    let provided = provided.to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`, without the prefix.
pub fn sign(body: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, so this never fails in practice.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test vector from GitHub's webhook validation documentation.
    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";
    const DIGEST: &str = "757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

    #[test]
    fn known_vector_matches() {
        assert_eq!(sign(BODY, SECRET), DIGEST);
        assert!(verify(BODY, Some(&format!("sha256={DIGEST}")), SECRET));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let header = format!("sha256={}", DIGEST.to_ascii_uppercase());
        assert!(verify(BODY, Some(&header), SECRET));
    }

    #[test]
    fn missing_header_fails() {
        assert!(!verify(BODY, None, SECRET));
    }

    #[test]
    fn wrong_prefix_fails() {
        assert!(!verify(BODY, Some(&format!("sha1={DIGEST}")), SECRET));
        assert!(!verify(BODY, Some(DIGEST), SECRET));
    }

    #[test]
    fn tampered_body_or_secret_fails() {
        let header = format!("sha256={DIGEST}");
        assert!(!verify(b"Hello, World?", Some(&header), SECRET));
        assert!(!verify(BODY, Some(&header), "another secret"));
    }

    #[test]
    fn truncated_digest_fails() {
        let header = format!("sha256={}", &DIGEST[..32]);
        assert!(!verify(BODY, Some(&header), SECRET));
    }
}
