//! `X-Hub-Signature-256` signing and verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

fn mac(secret: &str) -> Result<HmacSha256, WebhookError> {
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::InvalidSecret(e.to_string()))
}

/// Compute the header value for `body`: `sha256=<hex digest>`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = mac(secret)?;
    mac.update(body);
    Ok(format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a signature header against `body` in constant time.
pub fn verify(secret: &str, header: Option<&str>, body: &[u8]) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let digest = header
        .strip_prefix(PREFIX)
        .and_then(|h| hex::decode(h).ok())
        .ok_or(WebhookError::InvalidSignature)?;

    let mut mac = mac(secret)?;
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| WebhookError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // Example from the provider's webhook documentation.
        let signature = sign("It's a Secret to Everybody", b"Hello, World!").unwrap();
        assert_eq!(
            signature,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let body = br#"{"action":"opened"}"#;
        let signature = sign("s3cret", body).unwrap();
        assert!(verify("s3cret", Some(&signature), body).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signature = sign("s3cret", b"original").unwrap();
        assert!(matches!(
            verify("s3cret", Some(&signature), b"tampered"),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify("other", Some(&signature), b"original"),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_header() {
        assert!(matches!(
            verify("s3cret", None, b"body"),
            Err(WebhookError::MissingSignature)
        ));
        assert!(matches!(
            verify("s3cret", Some("sha1=abcd"), b"body"),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify("s3cret", Some("sha256=not-hex"), b"body"),
            Err(WebhookError::InvalidSignature)
        ));
    }
}
