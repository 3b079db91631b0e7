use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use skyfare_bookings::domain::repository::{
    BookingRepository, Clock, IdempotencyRepository, LedgerRepository, PaymentGateway,
    ProviderEventRepository, TransitionLog,
};
use skyfare_bookings::domain::types::{
    Booking, IdempotencyRecord, LedgerEntry, PaymentIntent, PaymentIntentRequest, ProviderEvent,
    ProviderRefund, RefundRequest, StatusChange, TransitionRecord,
};
use skyfare_bookings::error::BookingsServiceError;
use skyfare_bookings::usecase::idempotency::IdempotencyGuard;
use skyfare_bookings::usecase::reconciliation::{ReconciliationProcessor, WebhookReceipt};
use skyfare_bookings::usecase::signature::SignatureVerifier;
use skyfare_bookings::usecase::state_machine::BookingStateMachine;
use skyfare_domain::booking::BookingStatus;
use skyfare_domain::idempotency::IdempotencyStatus;
use skyfare_testing::webhook::{TEST_WEBHOOK_SECRET, sign_payload};

pub const MAX_RETRIES: i32 = 3;

// ── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StoreInner {
    pub bookings: HashMap<Uuid, Booking>,
    pub history: Vec<TransitionRecord>,
    pub ledger: Vec<LedgerEntry>,
    pub idempotency: HashMap<String, IdempotencyRecord>,
    pub events: HashMap<String, ProviderEvent>,
    pub fail_history_writes: bool,
    pub interleave: bool,
}

/// In-memory stand-in for every repository, enforcing the same unique keys as
/// the database schema. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_booking(booking: Booking) -> Self {
        let store = Self::new();
        store.put_booking(booking);
        store
    }

    pub fn put_booking(&self, booking: Booking) {
        self.inner
            .lock()
            .unwrap()
            .bookings
            .insert(booking.id, booking);
    }

    pub fn booking(&self, id: Uuid) -> Booking {
        self.inner.lock().unwrap().bookings[&id].clone()
    }

    pub fn history_of(&self, booking_id: Uuid) -> Vec<TransitionRecord> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub fn ledger_of(&self, booking_id: Uuid) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub fn event(&self, id: &str) -> Option<ProviderEvent> {
        self.inner.lock().unwrap().events.get(id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn idempotency_record(&self, record_key: &str) -> Option<IdempotencyRecord> {
        self.inner
            .lock()
            .unwrap()
            .idempotency
            .get(record_key)
            .cloned()
    }

    pub fn put_idempotency_record(&self, record: IdempotencyRecord) {
        self.inner
            .lock()
            .unwrap()
            .idempotency
            .insert(record.record_key(), record);
    }

    pub fn fail_history_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_history_writes = fail;
    }

    /// Yield to the scheduler before ledger and status writes so joined futures
    /// interleave the way concurrent requests do.
    pub fn interleave_writes(&self, interleave: bool) {
        self.inner.lock().unwrap().interleave = interleave;
    }

    async fn interleave(&self) {
        let interleave = self.inner.lock().unwrap().interleave;
        if interleave {
            tokio::task::yield_now().await;
        }
    }
}

fn append_ledger(inner: &mut StoreInner, entry: &LedgerEntry) -> bool {
    if inner.ledger.iter().any(|e| e.entry_key == entry.entry_key) {
        return false;
    }
    inner.ledger.push(entry.clone());
    true
}

impl BookingRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingsServiceError> {
        Ok(self.inner.lock().unwrap().bookings.get(&id).cloned())
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, BookingsServiceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .bookings
            .values()
            .find(|b| b.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, BookingsServiceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .bookings
            .values()
            .find(|b| b.checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn create(&self, booking: &Booking) -> Result<bool, BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .bookings
            .values()
            .any(|b| b.reference == booking.reference)
        {
            return Ok(false);
        }
        inner.bookings.insert(booking.id, booking.clone());
        Ok(true)
    }

    async fn attach_payment(
        &self,
        id: Uuid,
        payment_intent_id: &str,
        checkout_session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(booking) = inner.bookings.get_mut(&id) {
            booking.payment_intent_id = Some(payment_intent_id.to_owned());
            if let Some(session_id) = checkout_session_id {
                booking.checkout_session_id = Some(session_id.to_owned());
            }
            booking.updated_at = at;
        }
        Ok(())
    }

    async fn update_status(
        &self,
        change: &StatusChange,
        entries: &[LedgerEntry],
    ) -> Result<bool, BookingsServiceError> {
        self.interleave().await;
        let mut inner = self.inner.lock().unwrap();
        match inner.bookings.get_mut(&change.booking_id) {
            Some(booking) if booking.status == change.from => {
                booking.status = change.to;
                booking.updated_at = change.at;
            }
            _ => return Ok(false),
        }
        for entry in entries {
            append_ledger(&mut inner, entry);
        }
        Ok(true)
    }
}

impl TransitionLog for MemoryStore {
    async fn append(&self, record: &TransitionRecord) -> Result<(), BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_history_writes {
            return Err(anyhow::anyhow!("history table unavailable").into());
        }
        inner.history.push(record.clone());
        Ok(())
    }

    async fn list(&self, booking_id: Uuid) -> Result<Vec<TransitionRecord>, BookingsServiceError> {
        Ok(self.history_of(booking_id))
    }
}

impl LedgerRepository for MemoryStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<bool, BookingsServiceError> {
        self.interleave().await;
        Ok(append_ledger(&mut self.inner.lock().unwrap(), entry))
    }

    async fn list_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, BookingsServiceError> {
        self.interleave().await;
        let mut entries = self.ledger_of(booking_id);
        entries.sort_by_key(|e| e.transaction_at);
        Ok(entries)
    }
}

impl IdempotencyRepository for MemoryStore {
    async fn find(
        &self,
        record_key: &str,
    ) -> Result<Option<IdempotencyRecord>, BookingsServiceError> {
        Ok(self.idempotency_record(record_key))
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<bool, BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        let key = record.record_key();
        if inner.idempotency.contains_key(&key) {
            return Ok(false);
        }
        inner.idempotency.insert(key, record.clone());
        Ok(true)
    }

    async fn reclaim(
        &self,
        record_key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.idempotency.get_mut(record_key) {
            Some(record) if record.status == IdempotencyStatus::Failed => {
                record.status = IdempotencyStatus::Started;
                record.error = None;
                record.updated_at = now;
                record.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        record_key: &str,
        response: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.idempotency.get_mut(record_key) {
            record.status = IdempotencyStatus::Completed;
            record.response = Some(response.clone());
            record.updated_at = now;
        }
        Ok(())
    }

    async fn fail(
        &self,
        record_key: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.idempotency.get_mut(record_key) {
            record.status = IdempotencyStatus::Failed;
            record.error = Some(error.to_owned());
            record.updated_at = now;
        }
        Ok(())
    }

    async fn delete_if_expired(
        &self,
        record_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        let expired = inner
            .idempotency
            .get(record_key)
            .is_some_and(|r| r.expires_at <= now);
        if expired {
            inner.idempotency.remove(record_key);
        }
        Ok(expired)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.idempotency.len();
        inner.idempotency.retain(|_, r| r.expires_at > now);
        Ok((before - inner.idempotency.len()) as u64)
    }
}

impl ProviderEventRepository for MemoryStore {
    async fn insert_if_absent(
        &self,
        event: &ProviderEvent,
    ) -> Result<bool, BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.events.contains_key(&event.id) {
            return Ok(false);
        }
        inner.events.insert(event.id.clone(), event.clone());
        Ok(true)
    }

    async fn find(&self, id: &str) -> Result<Option<ProviderEvent>, BookingsServiceError> {
        Ok(self.event(id))
    }

    async fn mark_processed(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(event) = inner.events.get_mut(id) {
            event.processed = true;
            event.processing_error = None;
            event.processed_at = Some(at);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), BookingsServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(event) = inner.events.get_mut(id) {
            event.processed = false;
            event.processing_error = Some(error.to_owned());
            event.retry_count += 1;
        }
        Ok(())
    }

    async fn list_unprocessed(
        &self,
        limit: u64,
        max_retries: i32,
    ) -> Result<Vec<ProviderEvent>, BookingsServiceError> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<_> = inner
            .events
            .values()
            .filter(|e| !e.processed && e.retry_count < max_retries)
            .cloned()
            .collect();
        events.sort_by(|a, b| (a.received_at, &a.id).cmp(&(b.received_at, &b.id)));
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn count_exhausted(&self, max_retries: i32) -> Result<u64, BookingsServiceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .values()
            .filter(|e| !e.processed && e.retry_count >= max_retries)
            .count() as u64)
    }
}

// ── FixedClock ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FixedClock {
    pub now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ── FakeGateway ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeGateway {
    pub intent_calls: Arc<AtomicUsize>,
    pub refund_calls: Arc<AtomicUsize>,
    pub intent_requests: Arc<Mutex<Vec<PaymentIntentRequest>>>,
    pub refund_requests: Arc<Mutex<Vec<RefundRequest>>>,
    /// Simulated provider latency.
    pub delay: StdDuration,
    pub unavailable: bool,
    /// Answer like a provider that refuses the request outright.
    pub rejecting: bool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: StdDuration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            rejecting: true,
            ..Self::default()
        }
    }

    fn failure(&self) -> Option<BookingsServiceError> {
        if self.unavailable {
            Some(BookingsServiceError::ProviderUnavailable(
                "connection timed out".to_owned(),
            ))
        } else if self.rejecting {
            Some(BookingsServiceError::ProviderRejected(
                "charge has already been refunded".to_owned(),
            ))
        } else {
            None
        }
    }

    pub fn intent_calls(&self) -> usize {
        self.intent_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }
}

/// Intent id the fake provider assigns to a booking.
pub fn intent_id_for(booking_id: Uuid) -> String {
    format!("pi_{}", booking_id.simple())
}

impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, BookingsServiceError> {
        self.intent_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(e) = self.failure() {
            return Err(e);
        }
        self.intent_requests.lock().unwrap().push(request.clone());
        let id = intent_id_for(request.booking_id);
        Ok(PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            status: "requires_payment_method".to_owned(),
        })
    }

    async fn create_refund(
        &self,
        request: &RefundRequest,
    ) -> Result<ProviderRefund, BookingsServiceError> {
        let n = self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failure() {
            return Err(e);
        }
        self.refund_requests.lock().unwrap().push(request.clone());
        Ok(ProviderRefund {
            id: format!("re_{n}"),
            amount: request.amount,
            status: "pending".to_owned(),
        })
    }
}

// ── Builders ─────────────────────────────────────────────────────────────────

pub fn test_booking(user_id: Uuid, status: BookingStatus) -> Booking {
    let now = FixedClock::new().now();
    let id = Uuid::new_v4();
    Booking {
        id,
        reference: format!("SKY-{}", &id.simple().to_string()[..8].to_ascii_uppercase()),
        status,
        user_id,
        total_amount: 12_000,
        currency: "USD".to_owned(),
        payment_intent_id: None,
        checkout_session_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// A booking already attached to its provider payment intent.
pub fn paid_for_booking(user_id: Uuid, status: BookingStatus) -> Booking {
    let mut booking = test_booking(user_id, status);
    booking.payment_intent_id = Some(intent_id_for(booking.id));
    booking
}

pub fn state_machine(
    store: &MemoryStore,
    clock: &FixedClock,
) -> BookingStateMachine<MemoryStore, MemoryStore, FixedClock> {
    BookingStateMachine {
        bookings: store.clone(),
        history: store.clone(),
        clock: clock.clone(),
    }
}

pub fn guard(store: &MemoryStore, clock: &FixedClock) -> IdempotencyGuard<MemoryStore, FixedClock> {
    IdempotencyGuard {
        repo: store.clone(),
        clock: clock.clone(),
        default_ttl: Duration::hours(24),
    }
}

pub type TestProcessor = ReconciliationProcessor<
    MemoryStore,
    MemoryStore,
    MemoryStore,
    MemoryStore,
    MemoryStore,
    FixedClock,
>;

pub fn processor(store: &MemoryStore, clock: &FixedClock) -> TestProcessor {
    ReconciliationProcessor {
        machine: state_machine(store, clock),
        ledger: store.clone(),
        events: store.clone(),
        guard: guard(store, clock),
        verifier: SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300),
        retry_batch_size: 10,
        max_retries: MAX_RETRIES,
    }
}

/// Sign `payload` at the clock's current time and hand it to the processor.
pub async fn deliver(
    processor: &TestProcessor,
    clock: &FixedClock,
    payload: &serde_json::Value,
) -> Result<WebhookReceipt, BookingsServiceError> {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(&body, TEST_WEBHOOK_SECRET, clock.now().timestamp());
    processor.handle_webhook(&body, Some(&signature)).await
}
