//! Shared webhook signature primitives.
//!
//! Providers sign the exact request bytes with a shared secret; every check
//! here recomputes the MAC and compares in constant time.

use {
    hmac::{Hmac, Mac},
    http::HeaderMap,
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

/// `X-Hub-Signature-256: sha256=<hex>`, used by GitHub and the WhatsApp Cloud API.
pub const HUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Why a signature was refused. `code()` is the stable reason code reported
/// to callers and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureFailure {
    #[error("no signing secret configured")]
    MissingSecret,
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("request url required to verify this signature")]
    MissingUrl,
    #[error("signature header is malformed")]
    MalformedSignature,
    #[error("request timestamp is not a number")]
    InvalidTimestamp,
    #[error("request timestamp outside tolerance window")]
    StaleTimestamp,
    #[error("signature length mismatch")]
    LengthMismatch,
    #[error("signature mismatch")]
    Mismatch,
}

impl SignatureFailure {
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingSecret => "missing_secret",
            Self::MissingHeader(_) => "missing_header",
            Self::MissingUrl => "missing_url",
            Self::MalformedSignature => "malformed_signature",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::StaleTimestamp => "stale_timestamp",
            Self::LengthMismatch => "length_mismatch",
            Self::Mismatch => "signature_mismatch",
        }
    }
}

/// Outcome of verifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid(SignatureFailure),
}

impl SignatureCheck {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn failure(self) -> Option<SignatureFailure> {
        match self {
            Self::Valid => None,
            Self::Invalid(reason) => Some(reason),
        }
    }
}

impl From<SignatureFailure> for SignatureCheck {
    fn from(reason: SignatureFailure) -> Self {
        Self::Invalid(reason)
    }
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Compare a computed digest with the supplied one, distinguishing a length
/// mismatch from a content mismatch.
pub fn compare_digest(computed: &str, supplied: &str) -> SignatureCheck {
    if computed.len() != supplied.len() {
        return SignatureFailure::LengthMismatch.into();
    }
    if constant_time_eq(computed, supplied) {
        SignatureCheck::Valid
    } else {
        SignatureFailure::Mismatch.into()
    }
}

/// Lowercase hex HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256_hex(secret: &[u8], parts: &[&[u8]]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    for part in parts {
        mac.update(part);
    }
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Header value as UTF-8, `None` when absent or not valid text.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verify a `sha256=<hex>` signature over the raw body.
pub fn verify_hub_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> SignatureCheck {
    if secret.is_empty() {
        return SignatureFailure::MissingSecret.into();
    }
    let Some(header) = header_str(headers, HUB_SIGNATURE_HEADER) else {
        return SignatureFailure::MissingHeader(HUB_SIGNATURE_HEADER).into();
    };
    let Some(supplied) = header.trim().strip_prefix("sha256=") else {
        return SignatureFailure::MalformedSignature.into();
    };
    let Some(computed) = hmac_sha256_hex(secret.as_bytes(), &[body]) else {
        return SignatureFailure::Mismatch.into();
    };
    compare_digest(&computed, &supplied.to_ascii_lowercase())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, http::HeaderValue};

    fn signed(body: &[u8], secret: &str) -> HeaderMap {
        let sig = hmac_sha256_hex(secret.as_bytes(), &[body]).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            HUB_SIGNATURE_HEADER,
            HeaderValue::from_str(&format!("sha256={sig}")).unwrap(),
        );
        headers
    }

    #[test]
    fn hub_signature_round_trip() {
        let body = br#"{"action":"created"}"#;
        let headers = signed(body, "s3cret");
        assert_eq!(verify_hub_signature(&headers, body, "s3cret"), SignatureCheck::Valid);
    }

    #[test]
    fn single_byte_change_invalidates() {
        let body = br#"{"action":"created"}"#.to_vec();
        let headers = signed(&body, "s3cret");
        let mut tampered = body.clone();
        tampered[2] ^= 0x01;
        assert_eq!(
            verify_hub_signature(&headers, &tampered, "s3cret").failure(),
            Some(SignatureFailure::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_invalidates() {
        let headers = signed(b"body", "a");
        assert!(!verify_hub_signature(&headers, b"body", "b").is_valid());
    }

    #[test]
    fn missing_and_malformed_headers() {
        let check = verify_hub_signature(&HeaderMap::new(), b"x", "s");
        assert_eq!(check.failure().map(SignatureFailure::code), Some("missing_header"));

        let mut headers = HeaderMap::new();
        headers.insert(HUB_SIGNATURE_HEADER, HeaderValue::from_static("md5=abc"));
        assert_eq!(
            verify_hub_signature(&headers, b"x", "s").failure(),
            Some(SignatureFailure::MalformedSignature)
        );

        headers.insert(HUB_SIGNATURE_HEADER, HeaderValue::from_static("sha256=abc"));
        assert_eq!(
            verify_hub_signature(&headers, b"x", "s").failure(),
            Some(SignatureFailure::LengthMismatch)
        );
    }

    #[test]
    fn empty_secret_rejects() {
        let headers = signed(b"x", "");
        assert_eq!(
            verify_hub_signature(&headers, b"x", "").failure(),
            Some(SignatureFailure::MissingSecret)
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = signed(b"x", "k");
        assert!(header_str(&headers, "X-Hub-Signature-256").is_some());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
    }
}
