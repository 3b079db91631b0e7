use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skyfare_domain::actor::Actor;
use skyfare_domain::booking::BookingStatus;
use skyfare_domain::idempotency::{IdempotencyScope, IdempotencyStatus};
use skyfare_domain::ledger::LedgerEntryType;
use skyfare_domain::user::UserRole;

/// A reservation owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub status: BookingStatus,
    pub user_id: Uuid,
    /// Minor currency units.
    pub total_amount: i64,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a booking's status history. `previous_status` is `None` only for creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub previous_status: Option<BookingStatus>,
    pub new_status: BookingStatus,
    pub is_valid_transition: bool,
    pub reason: Option<String>,
    pub actor: Actor,
    pub payment_intent_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Compare-and-set of a booking's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub booking_id: Uuid,
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub at: DateTime<Utc>,
}

/// Immutable monetary fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    pub currency: String,
    /// Unique per monetary fact; a second append with the same key is a no-op.
    pub entry_key: String,
    pub provider_event_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub refund_id: Option<String>,
    pub description: Option<String>,
    pub transaction_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// A payment intent is captured at most once.
    pub fn charge_key(payment_intent_id: &str) -> String {
        format!("charge:{payment_intent_id}")
    }

    pub fn refund_key(refund_id: &str) -> String {
        format!("refund:{refund_id}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub scope: IdempotencyScope,
    pub key: String,
    pub user_id: Option<Uuid>,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn record_key(&self) -> String {
        record_key(self.scope, self.user_id, &self.key)
    }
}

/// Storage key for the `(scope, user_id, key)` tuple; a missing user id still collides.
pub fn record_key(scope: IdempotencyScope, user_id: Option<Uuid>, key: &str) -> String {
    match user_id {
        Some(user_id) => format!("{scope}:{user_id}:{key}"),
        None => format!("{scope}:-:{key}"),
    }
}

/// Recorded payment-provider notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Authenticated caller, as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Caller {
    /// Owners and staff may act on a booking.
    pub fn can_access(&self, booking: &Booking) -> bool {
        booking.user_id == self.user_id || self.role.is_staff()
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: Some(self.user_id.to_string()),
            kind: self.role.actor_type(),
        }
    }
}

// ── Payment provider ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentRequest {
    pub booking_id: Uuid,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    /// Forwarded as the provider's `Idempotency-Key` header.
    #[serde(skip)]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub payment_intent_id: String,
    pub amount: i64,
    pub reason: Option<String>,
    #[serde(skip)]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRefund {
    pub id: String,
    pub amount: i64,
    pub status: String,
}
