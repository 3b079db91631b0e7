//! Idempotency scopes and record states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace for idempotency keys, one per critical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyScope {
    BookingCreate,
    BookingCancel,
    PaymentIntentCreate,
    RefundRequest,
    ProviderWebhook,
}

impl IdempotencyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BookingCreate => "booking_create",
            Self::BookingCancel => "booking_cancel",
            Self::PaymentIntentCreate => "payment_intent_create",
            Self::RefundRequest => "refund_request",
            Self::ProviderWebhook => "provider_webhook",
        }
    }
}

impl fmt::Display for IdempotencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown idempotency scope: {0:?}")]
pub struct UnknownIdempotencyScope(pub String);

impl FromStr for IdempotencyScope {
    type Err = UnknownIdempotencyScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking_create" => Ok(Self::BookingCreate),
            "booking_cancel" => Ok(Self::BookingCancel),
            "payment_intent_create" => Ok(Self::PaymentIntentCreate),
            "refund_request" => Ok(Self::RefundRequest),
            "provider_webhook" => Ok(Self::ProviderWebhook),
            other => Err(UnknownIdempotencyScope(other.to_owned())),
        }
    }
}

/// Lifecycle of one idempotent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    Started,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown idempotency status: {0:?}")]
pub struct UnknownIdempotencyStatus(pub String);

impl FromStr for IdempotencyStatus {
    type Err = UnknownIdempotencyStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(Self::Started),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownIdempotencyStatus(other.to_owned())),
        }
    }
}
