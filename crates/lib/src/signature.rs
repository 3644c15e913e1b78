//! Webhook payload signing: HMAC over the raw request bytes.
//!
//! The platform sends an `X-Hub-Signature` header of the form `method=hexdigest`
//! computed over the exact raw body with the app secret. Verification must run
//! before the body is parsed.

use crate::error::BotError;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Compute the `sha1=<hex>` header value for a payload. Useful for hosts and tests
/// that simulate platform deliveries.
pub fn sign_sha1(app_secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha1::new_from_slice(app_secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Compute the `sha256=<hex>` header value for a payload.
pub fn sign_sha256(app_secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against the raw body. The header must be
/// `sha1=<hex>` or `sha256=<hex>`; digests are compared as case-sensitive hex
/// strings. A missing header is a verification failure, not a pass.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    app_secret: &str,
) -> Result<(), BotError> {
    let header = signature_header
        .ok_or_else(|| BotError::SignatureInvalid("signature header missing".to_string()))?;
    let (method, provided) = header
        .split_once('=')
        .ok_or_else(|| BotError::SignatureInvalid("malformed signature header".to_string()))?;
    let expected = match method {
        "sha1" => sign_sha1(app_secret, raw_body),
        "sha256" => sign_sha256(app_secret, raw_body),
        other => {
            return Err(BotError::SignatureInvalid(format!(
                "unsupported signature method: {}",
                other
            )))
        }
    };
    // expected carries the `method=` prefix; compare digests only.
    let expected_digest = &expected[method.len() + 1..];
    if expected_digest == provided {
        Ok(())
    } else {
        Err(BotError::SignatureInvalid("digest mismatch".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "app_secret_1234";

    #[test]
    fn sign_and_verify_sha1() {
        let body = br#"{"object":"page","entry":[]}"#;
        let header = sign_sha1(SECRET, body);
        assert!(header.starts_with("sha1="));
        assert!(verify(body, Some(&header), SECRET).is_ok());
    }

    #[test]
    fn sign_and_verify_sha256() {
        let body = b"payload bytes";
        let header = sign_sha256(SECRET, body);
        assert!(verify(body, Some(&header), SECRET).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let body = br#"{"object":"page","entry":[{"id":"1"}]}"#.to_vec();
        let header = sign_sha1(SECRET, &body);
        let mut tampered = body.clone();
        tampered[10] ^= 0x01;
        assert!(verify(&tampered, Some(&header), SECRET).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"hello";
        let header = sign_sha1(SECRET, body);
        assert!(verify(body, Some(&header), "other_secret").is_err());
    }

    #[test]
    fn missing_header_fails() {
        assert!(verify(b"hello", None, SECRET).is_err());
    }

    #[test]
    fn unknown_method_fails() {
        assert!(verify(b"hello", Some("md5=abcdef"), SECRET).is_err());
    }

    #[test]
    fn malformed_header_fails() {
        assert!(verify(b"hello", Some("no-equals-sign"), SECRET).is_err());
    }
}
