//! Webhook signature scheme: `t=<unix seconds>,v1=<hex hmac>[,v1=...]`, where
//! the HMAC-SHA256 is computed over `"{t}.{raw body}"` with the endpoint's
//! shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

struct ParsedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<ParsedHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(SignatureError::Malformed)?;
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?);
            }
            // Undecodable entries are skipped; another v1 may still match.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac takes keys of any size"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Verify `header` against `payload`. `now` is the current unix time in seconds.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;

    // `t` is unauthenticated at this point and may sit anywhere in i64.
    if now.abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let matched = parsed.signatures.iter().any(|candidate| {
        mac_for(payload, secret, parsed.timestamp)
            .verify_slice(candidate)
            .is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce a header value for `payload`, in the same format the gateway sends.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = mac_for(payload, secret, timestamp).finalize().into_bytes();
    format!("t={timestamp},v1={}", hex::encode(digest))
}
