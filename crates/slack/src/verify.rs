//! Slack request signing.
//!
//! `X-Slack-Signature: v0=<hex>` where the MAC is HMAC-SHA256 over
//! `v0:{X-Slack-Request-Timestamp}:{raw body}`.

use {
    courier_channels::{
        SignatureCheck, SignatureFailure,
        signature::{compare_digest, header_str, hmac_sha256_hex},
    },
    http::HeaderMap,
};

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_VERSION: &str = "v0";

/// Compute the `v0=<hex>` signature for a request.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let base = format!("{SIGNATURE_VERSION}:{timestamp}:");
    hmac_sha256_hex(secret.as_bytes(), &[base.as_bytes(), body])
        .map(|hex| format!("{SIGNATURE_VERSION}={hex}"))
}

/// Verify a signed request, rejecting timestamps more than `tolerance_secs`
/// away from `now_secs`.
pub fn verify_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now_secs: i64,
) -> SignatureCheck {
    if secret.is_empty() {
        return SignatureFailure::MissingSecret.into();
    }
    let Some(timestamp) = header_str(headers, TIMESTAMP_HEADER) else {
        return SignatureFailure::MissingHeader(TIMESTAMP_HEADER).into();
    };
    let Ok(ts) = timestamp.trim().parse::<i64>() else {
        return SignatureFailure::InvalidTimestamp.into();
    };
    if now_secs.abs_diff(ts) > tolerance_secs.unsigned_abs() {
        return SignatureFailure::StaleTimestamp.into();
    }
    let Some(supplied) = header_str(headers, SIGNATURE_HEADER) else {
        return SignatureFailure::MissingHeader(SIGNATURE_HEADER).into();
    };
    if !supplied.starts_with("v0=") {
        return SignatureFailure::MalformedSignature.into();
    }
    let Some(computed) = sign(secret, timestamp.trim(), body) else {
        return SignatureFailure::Mismatch.into();
    };
    compare_digest(&computed, supplied.trim())
}
