//! `X-Twilio-Signature` validation.
//!
//! The signature is base64(HMAC-SHA1(auth_token, url + k1 + v1 + k2 + v2 ...))
//! with the POST parameters sorted by name.

use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    courier_channels::{
        SignatureCheck, SignatureFailure,
        signature::{compare_digest, header_str},
    },
    hmac::{Hmac, Mac},
    http::HeaderMap,
    sha1::Sha1,
};

use crate::form::parse_pairs;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Compute the expected signature for a request.
pub fn sign(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<String> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a form-encoded webhook against the URL Twilio posted to.
pub fn verify_signature(
    headers: &HeaderMap,
    url: Option<&str>,
    body: &[u8],
    auth_token: &str,
) -> SignatureCheck {
    if auth_token.is_empty() {
        return SignatureFailure::MissingSecret.into();
    }
    let Some(supplied) = header_str(headers, SIGNATURE_HEADER) else {
        return SignatureFailure::MissingHeader(SIGNATURE_HEADER).into();
    };
    let Some(url) = url.filter(|u| !u.is_empty()) else {
        return SignatureFailure::MissingUrl.into();
    };
    let Some(computed) = sign(auth_token, url, &parse_pairs(body)) else {
        return SignatureFailure::Mismatch.into();
    };
    compare_digest(&computed, supplied.trim())
}
