//! Verification of the `X-Hub-Signature-256` header sent with webhooks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("no webhook secret configured")]
    NoSecret,
    #[error("missing signature header")]
    Missing,
    #[error("signature is not of the form sha256=<hex>")]
    Malformed,
    #[error("invalid key")]
    InvalidKey,
    #[error("signature mismatch")]
    Mismatch,
}

/// Checks `header` against the HMAC-SHA256 of `body`. The comparison runs in
/// constant time.
pub fn verify(
    secret: Option<&str>,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    let secret = secret.ok_or(SignatureError::NoSecret)?;
    let header = header.ok_or(SignatureError::Missing)?;

    let expected = header
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or(SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produces the header value a sender with `secret` would attach to `body`.
#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}
