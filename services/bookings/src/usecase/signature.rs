//! Payment-provider notification signatures.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`, where each
//! `v1` is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the shared secret.
//! Several `v1` values appear while the provider rotates secrets.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::BookingsServiceError;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Authenticate `body` against `header`. Any failure is `InvalidSignature`.
    pub fn verify(
        &self,
        body: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        let header = header.ok_or(BookingsServiceError::InvalidSignature)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(BookingsServiceError::InvalidSignature)?;
        if now.timestamp().abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(BookingsServiceError::InvalidSignature);
        }

        let matched = signatures.iter().any(|signature| {
            // `new_from_slice` accepts keys of any length for HMAC.
            let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
                return false;
            };
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(body);
            mac.verify_slice(signature).is_ok()
        });

        if matched {
            Ok(())
        } else {
            Err(BookingsServiceError::InvalidSignature)
        }
    }
}
