use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use skyfare_domain::actor::Actor;
use skyfare_domain::booking::{BookingStatus, is_valid_transition};

use crate::domain::repository::{BookingRepository, Clock, TransitionLog};
use crate::domain::types::{Booking, LedgerEntry, StatusChange, TransitionRecord};
use crate::error::BookingsServiceError;

/// Who asked for a transition, why, and what travels with it.
#[derive(Debug, Clone)]
pub struct TransitionOptions {
    pub actor: Actor,
    pub reason: Option<String>,
    pub payment_intent_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// Committed in the same database transaction as the status change.
    pub ledger_entries: Vec<LedgerEntry>,
}

impl TransitionOptions {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            reason: None,
            payment_intent_id: None,
            metadata: None,
            ledger_entries: Vec::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn payment_intent(mut self, payment_intent_id: Option<String>) -> Self {
        self.payment_intent_id = payment_intent_id;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn ledger_entry(mut self, entry: LedgerEntry) -> Self {
        self.ledger_entries.push(entry);
        self
    }

    pub fn ledger_entries(mut self, entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        self.ledger_entries.extend(entries);
        self
    }
}

/// Result of a transition attempt. Expected business outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Not in the transition table; recorded as an invalid attempt.
    Rejected {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// The stored status was no longer `expected`.
    Conflict { expected: BookingStatus },
}

impl TransitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Surface a failed outcome as the matching service error.
    pub fn into_result(self) -> Result<(), BookingsServiceError> {
        match self {
            Self::Applied => Ok(()),
            Self::Rejected { from, to } => Err(BookingsServiceError::InvalidTransition { from, to }),
            Self::Conflict { .. } => Err(BookingsServiceError::BookingConflict),
        }
    }
}

/// Validates and applies booking status changes, recording every attempt.
pub struct BookingStateMachine<B: BookingRepository, H: TransitionLog, C: Clock> {
    pub bookings: B,
    pub history: H,
    pub clock: C,
}

impl<B: BookingRepository, H: TransitionLog, C: Clock> BookingStateMachine<B, H, C> {
    pub async fn transition(
        &self,
        booking_id: Uuid,
        reference: &str,
        from: BookingStatus,
        to: BookingStatus,
        options: TransitionOptions,
    ) -> Result<TransitionOutcome, BookingsServiceError> {
        let now = self.clock.now();
        let TransitionOptions {
            actor,
            reason,
            payment_intent_id,
            metadata,
            ledger_entries,
        } = options;

        let mut record = TransitionRecord {
            id: Uuid::now_v7(),
            booking_id,
            previous_status: Some(from),
            new_status: to,
            is_valid_transition: true,
            reason,
            actor,
            payment_intent_id,
            metadata,
            created_at: now,
        };

        if !is_valid_transition(from, to) {
            warn!(
                %booking_id,
                reference,
                %from,
                %to,
                actor_type = %record.actor.kind,
                "rejected booking status transition"
            );
            record.is_valid_transition = false;
            self.record(&record).await;
            return Ok(TransitionOutcome::Rejected { from, to });
        }

        let change = StatusChange {
            booking_id,
            from,
            to,
            at: now,
        };
        let applied = self
            .bookings
            .update_status(&change, &ledger_entries)
            .await?;
        if !applied {
            warn!(%booking_id, reference, expected = %from, %to, "booking status changed concurrently");
            mark_conflict(&mut record);
            self.record(&record).await;
            return Ok(TransitionOutcome::Conflict { expected: from });
        }

        info!(%booking_id, reference, %from, %to, actor_type = %record.actor.kind, "booking status changed");
        self.record(&record).await;
        Ok(TransitionOutcome::Applied)
    }

    /// First history row of a freshly created booking.
    pub async fn record_creation(&self, booking: &Booking, actor: Actor) {
        let record = TransitionRecord {
            id: Uuid::now_v7(),
            booking_id: booking.id,
            previous_status: None,
            new_status: booking.status,
            is_valid_transition: true,
            reason: Some("booking created".to_owned()),
            actor,
            payment_intent_id: None,
            metadata: None,
            created_at: booking.created_at,
        };
        self.record(&record).await;
    }

    pub async fn history(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TransitionRecord>, BookingsServiceError> {
        self.history.list(booking_id).await
    }

    // Audit writes never fail the caller.
    async fn record(&self, record: &TransitionRecord) {
        if let Err(e) = self.history.append(record).await {
            error!(
                booking_id = %record.booking_id,
                new_status = %record.new_status,
                error = ?e,
                "failed to write booking status history"
            );
        }
    }
}

/// A lost compare-and-set stays in the history as an attempt that did not apply.
fn mark_conflict(record: &mut TransitionRecord) {
    let expected = record.previous_status.map(BookingStatus::as_str);
    record.is_valid_transition = false;
    record.reason = Some(match record.reason.take() {
        Some(reason) => format!("conflict: {reason}"),
        None => "conflict".to_owned(),
    });
    let mut metadata = record.metadata.take().unwrap_or_else(|| json!({}));
    if let Some(map) = metadata.as_object_mut() {
        map.insert("conflict".to_owned(), json!({ "expected_status": expected }));
    }
    record.metadata = Some(metadata);
}
