#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::types::{
    Booking, IdempotencyRecord, LedgerEntry, PaymentIntent, PaymentIntentRequest, ProviderEvent,
    ProviderRefund, RefundRequest, StatusChange, TransitionRecord,
};
use crate::error::BookingsServiceError;

/// Repository for booking rows.
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingsServiceError>;

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, BookingsServiceError>;

    async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, BookingsServiceError>;

    /// Insert a new booking. Returns `false` if its reference is already taken.
    async fn create(&self, booking: &Booking) -> Result<bool, BookingsServiceError>;

    /// Store provider references without touching the status.
    async fn attach_payment(
        &self,
        id: Uuid,
        payment_intent_id: &str,
        checkout_session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError>;

    /// Move the booking from `change.from` to `change.to` and append `entries` in
    /// one database transaction.
    ///
    /// Returns `false`, writing nothing, when the stored status is no longer
    /// `change.from`. A ledger entry whose key is already recorded is skipped
    /// without failing the status change.
    async fn update_status(
        &self,
        change: &StatusChange,
        entries: &[LedgerEntry],
    ) -> Result<bool, BookingsServiceError>;
}

/// Append-only booking status history.
pub trait TransitionLog: Send + Sync {
    async fn append(&self, record: &TransitionRecord) -> Result<(), BookingsServiceError>;

    /// Oldest first.
    async fn list(&self, booking_id: Uuid) -> Result<Vec<TransitionRecord>, BookingsServiceError>;
}

/// Append-only monetary ledger.
pub trait LedgerRepository: Send + Sync {
    /// Returns `false` when an entry with the same key already exists.
    async fn append(&self, entry: &LedgerEntry) -> Result<bool, BookingsServiceError>;

    /// Oldest first, by transaction time.
    async fn list_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, BookingsServiceError>;
}

/// Storage for idempotency records, keyed by [`IdempotencyRecord::record_key`].
pub trait IdempotencyRepository: Send + Sync {
    async fn find(&self, record_key: &str)
    -> Result<Option<IdempotencyRecord>, BookingsServiceError>;

    /// Insert a `STARTED` record. Returns `false` if the key already exists.
    async fn insert(&self, record: &IdempotencyRecord) -> Result<bool, BookingsServiceError>;

    /// Flip a `FAILED` record back to `STARTED`. Returns `false` if another worker
    /// got there first.
    async fn reclaim(
        &self,
        record_key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, BookingsServiceError>;

    async fn complete(
        &self,
        record_key: &str,
        response: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError>;

    async fn fail(
        &self,
        record_key: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError>;

    /// Delete one record if it has expired. Returns `true` if a row was deleted.
    async fn delete_if_expired(
        &self,
        record_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BookingsServiceError>;

    /// Delete every expired record. Returns the number of rows deleted.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, BookingsServiceError>;
}

/// Storage for provider notifications, keyed by the provider's event id.
pub trait ProviderEventRepository: Send + Sync {
    /// Returns `false` if an event with the same id is already recorded.
    async fn insert_if_absent(&self, event: &ProviderEvent)
    -> Result<bool, BookingsServiceError>;

    async fn find(&self, id: &str) -> Result<Option<ProviderEvent>, BookingsServiceError>;

    async fn mark_processed(&self, id: &str, at: DateTime<Utc>)
    -> Result<(), BookingsServiceError>;

    /// Store the error and bump the retry count; `processed` stays `false`.
    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), BookingsServiceError>;

    /// Unprocessed events below the retry cap, oldest first.
    async fn list_unprocessed(
        &self,
        limit: u64,
        max_retries: i32,
    ) -> Result<Vec<ProviderEvent>, BookingsServiceError>;

    /// Unprocessed events that reached the retry cap.
    async fn count_exhausted(&self, max_retries: i32) -> Result<u64, BookingsServiceError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Outbound calls to the payment provider.
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, BookingsServiceError>;

    async fn create_refund(
        &self,
        request: &RefundRequest,
    ) -> Result<ProviderRefund, BookingsServiceError>;
}
