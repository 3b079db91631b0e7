use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use skyfare_bookings_schema::{
    booking_status_history, bookings, idempotency_records, ledger_entries, provider_events,
};
use skyfare_core::sea_ext::is_unique_violation;
use skyfare_domain::actor::Actor;
use skyfare_domain::idempotency::IdempotencyStatus;

use crate::domain::repository::{
    BookingRepository, IdempotencyRepository, LedgerRepository, ProviderEventRepository,
    TransitionLog,
};
use crate::domain::types::{
    Booking, IdempotencyRecord, LedgerEntry, ProviderEvent, StatusChange, TransitionRecord,
};
use crate::error::BookingsServiceError;

// ── Booking repository ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbBookingRepository {
    pub db: DatabaseConnection,
}

impl BookingRepository for DbBookingRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingsServiceError> {
        let model = bookings::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find booking by id")?;
        model.map(booking_from_model).transpose()
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, BookingsServiceError> {
        let model = bookings::Entity::find()
            .filter(bookings::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&self.db)
            .await
            .context("find booking by payment intent")?;
        model.map(booking_from_model).transpose()
    }

    async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, BookingsServiceError> {
        let model = bookings::Entity::find()
            .filter(bookings::Column::CheckoutSessionId.eq(session_id))
            .one(&self.db)
            .await
            .context("find booking by checkout session")?;
        model.map(booking_from_model).transpose()
    }

    async fn create(&self, booking: &Booking) -> Result<bool, BookingsServiceError> {
        let result = bookings::ActiveModel {
            id: Set(booking.id),
            reference: Set(booking.reference.clone()),
            status: Set(booking.status.as_str().to_owned()),
            user_id: Set(booking.user_id),
            total_amount: Set(booking.total_amount),
            currency: Set(booking.currency.clone()),
            payment_intent_id: Set(booking.payment_intent_id.clone()),
            checkout_session_id: Set(booking.checkout_session_id.clone()),
            created_at: Set(booking.created_at),
            updated_at: Set(booking.updated_at),
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context("create booking").into()),
        }
    }

    async fn attach_payment(
        &self,
        id: Uuid,
        payment_intent_id: &str,
        checkout_session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        let mut update = bookings::Entity::update_many()
            .col_expr(
                bookings::Column::PaymentIntentId,
                Expr::value(payment_intent_id.to_owned()),
            )
            .col_expr(bookings::Column::UpdatedAt, Expr::value(at));
        if let Some(session_id) = checkout_session_id {
            update = update.col_expr(
                bookings::Column::CheckoutSessionId,
                Expr::value(session_id.to_owned()),
            );
        }
        update
            .filter(bookings::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("attach payment to booking")?;
        Ok(())
    }

    async fn update_status(
        &self,
        change: &StatusChange,
        entries: &[LedgerEntry],
    ) -> Result<bool, BookingsServiceError> {
        let change = *change;
        let entries: Vec<_> = entries.iter().map(ledger_active_model).collect();
        let applied = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(|txn| {
                Box::pin(async move {
                    let result = bookings::Entity::update_many()
                        .col_expr(bookings::Column::Status, Expr::value(change.to.as_str()))
                        .col_expr(bookings::Column::UpdatedAt, Expr::value(change.at))
                        .filter(bookings::Column::Id.eq(change.booking_id))
                        .filter(bookings::Column::Status.eq(change.from.as_str()))
                        .exec(txn)
                        .await?;
                    if result.rows_affected == 0 {
                        return Ok(false);
                    }

                    for entry in entries {
                        ledger_entries::Entity::insert(entry)
                            .on_conflict(
                                OnConflict::column(ledger_entries::Column::EntryKey)
                                    .do_nothing()
                                    .to_owned(),
                            )
                            .exec_without_returning(txn)
                            .await?;
                    }
                    Ok(true)
                })
            })
            .await
            .context("update booking status")?;
        Ok(applied)
    }
}

fn booking_from_model(model: bookings::Model) -> Result<Booking, BookingsServiceError> {
    Ok(Booking {
        id: model.id,
        reference: model.reference,
        status: model.status.parse().context("stored booking status")?,
        user_id: model.user_id,
        total_amount: model.total_amount,
        currency: model.currency,
        payment_intent_id: model.payment_intent_id,
        checkout_session_id: model.checkout_session_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Transition log ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbTransitionLog {
    pub db: DatabaseConnection,
}

impl TransitionLog for DbTransitionLog {
    async fn append(&self, record: &TransitionRecord) -> Result<(), BookingsServiceError> {
        booking_status_history::ActiveModel {
            id: Set(record.id),
            booking_id: Set(record.booking_id),
            previous_status: Set(record.previous_status.map(|s| s.as_str().to_owned())),
            new_status: Set(record.new_status.as_str().to_owned()),
            is_valid_transition: Set(record.is_valid_transition),
            reason: Set(record.reason.clone()),
            actor_id: Set(record.actor.id.clone()),
            actor_type: Set(record.actor.kind.as_str().to_owned()),
            payment_intent_id: Set(record.payment_intent_id.clone()),
            metadata: Set(record.metadata.clone()),
            created_at: Set(record.created_at),
        }
        .insert(&self.db)
        .await
        .context("append booking status history")?;
        Ok(())
    }

    async fn list(&self, booking_id: Uuid) -> Result<Vec<TransitionRecord>, BookingsServiceError> {
        let models = booking_status_history::Entity::find()
            .filter(booking_status_history::Column::BookingId.eq(booking_id))
            .order_by_asc(booking_status_history::Column::CreatedAt)
            .order_by_asc(booking_status_history::Column::Id)
            .all(&self.db)
            .await
            .context("list booking status history")?;
        models.into_iter().map(transition_from_model).collect()
    }
}

fn transition_from_model(
    model: booking_status_history::Model,
) -> Result<TransitionRecord, BookingsServiceError> {
    let previous_status = model
        .previous_status
        .map(|s| s.parse())
        .transpose()
        .context("stored previous status")?;
    Ok(TransitionRecord {
        id: model.id,
        booking_id: model.booking_id,
        previous_status,
        new_status: model.new_status.parse().context("stored new status")?,
        is_valid_transition: model.is_valid_transition,
        reason: model.reason,
        actor: Actor {
            id: model.actor_id,
            kind: model.actor_type.parse().context("stored actor type")?,
        },
        payment_intent_id: model.payment_intent_id,
        metadata: model.metadata,
        created_at: model.created_at,
    })
}

// ── Ledger repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbLedgerRepository {
    pub db: DatabaseConnection,
}

impl LedgerRepository for DbLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> Result<bool, BookingsServiceError> {
        let inserted = ledger_entries::Entity::insert(ledger_active_model(entry))
            .on_conflict(
                OnConflict::column(ledger_entries::Column::EntryKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("append ledger entry")?;
        Ok(inserted > 0)
    }

    async fn list_by_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, BookingsServiceError> {
        let models = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::BookingId.eq(booking_id))
            .order_by_asc(ledger_entries::Column::TransactionAt)
            .order_by_asc(ledger_entries::Column::Id)
            .all(&self.db)
            .await
            .context("list ledger entries")?;
        models.into_iter().map(ledger_from_model).collect()
    }
}

fn ledger_active_model(entry: &LedgerEntry) -> ledger_entries::ActiveModel {
    ledger_entries::ActiveModel {
        id: Set(entry.id),
        booking_id: Set(entry.booking_id),
        user_id: Set(entry.user_id),
        entry_type: Set(entry.entry_type.as_str().to_owned()),
        amount: Set(entry.amount),
        currency: Set(entry.currency.clone()),
        entry_key: Set(entry.entry_key.clone()),
        provider_event_id: Set(entry.provider_event_id.clone()),
        payment_intent_id: Set(entry.payment_intent_id.clone()),
        charge_id: Set(entry.charge_id.clone()),
        refund_id: Set(entry.refund_id.clone()),
        description: Set(entry.description.clone()),
        transaction_at: Set(entry.transaction_at),
        created_at: Set(entry.created_at),
    }
}

fn ledger_from_model(model: ledger_entries::Model) -> Result<LedgerEntry, BookingsServiceError> {
    Ok(LedgerEntry {
        id: model.id,
        booking_id: model.booking_id,
        user_id: model.user_id,
        entry_type: model.entry_type.parse().context("stored ledger entry type")?,
        amount: model.amount,
        currency: model.currency,
        entry_key: model.entry_key,
        provider_event_id: model.provider_event_id,
        payment_intent_id: model.payment_intent_id,
        charge_id: model.charge_id,
        refund_id: model.refund_id,
        description: model.description,
        transaction_at: model.transaction_at,
        created_at: model.created_at,
    })
}

// ── Idempotency repository ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbIdempotencyRepository {
    pub db: DatabaseConnection,
}

impl IdempotencyRepository for DbIdempotencyRepository {
    async fn find(
        &self,
        record_key: &str,
    ) -> Result<Option<IdempotencyRecord>, BookingsServiceError> {
        let model = idempotency_records::Entity::find_by_id(record_key.to_owned())
            .one(&self.db)
            .await
            .context("find idempotency record")?;
        model.map(idempotency_from_model).transpose()
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<bool, BookingsServiceError> {
        let model = idempotency_records::ActiveModel {
            record_key: Set(record.record_key()),
            scope: Set(record.scope.as_str().to_owned()),
            idempotency_key: Set(record.key.clone()),
            user_id: Set(record.user_id),
            request_hash: Set(record.request_hash.clone()),
            status: Set(record.status.as_str().to_owned()),
            response: Set(record.response.clone()),
            error: Set(record.error.clone()),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
            expires_at: Set(record.expires_at),
        };
        let inserted = idempotency_records::Entity::insert(model)
            .on_conflict(
                OnConflict::column(idempotency_records::Column::RecordKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("insert idempotency record")?;
        Ok(inserted > 0)
    }

    async fn reclaim(
        &self,
        record_key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, BookingsServiceError> {
        let result = idempotency_records::Entity::update_many()
            .col_expr(
                idempotency_records::Column::Status,
                Expr::value(IdempotencyStatus::Started.as_str()),
            )
            .col_expr(idempotency_records::Column::Error, Expr::value(None::<String>))
            .col_expr(idempotency_records::Column::UpdatedAt, Expr::value(now))
            .col_expr(idempotency_records::Column::ExpiresAt, Expr::value(expires_at))
            .filter(idempotency_records::Column::RecordKey.eq(record_key))
            .filter(idempotency_records::Column::Status.eq(IdempotencyStatus::Failed.as_str()))
            .exec(&self.db)
            .await
            .context("reclaim failed idempotency record")?;
        Ok(result.rows_affected > 0)
    }

    async fn complete(
        &self,
        record_key: &str,
        response: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        idempotency_records::Entity::update_many()
            .col_expr(
                idempotency_records::Column::Status,
                Expr::value(IdempotencyStatus::Completed.as_str()),
            )
            .col_expr(
                idempotency_records::Column::Response,
                Expr::value(response.clone()),
            )
            .col_expr(idempotency_records::Column::UpdatedAt, Expr::value(now))
            .filter(idempotency_records::Column::RecordKey.eq(record_key))
            .exec(&self.db)
            .await
            .context("complete idempotency record")?;
        Ok(())
    }

    async fn fail(
        &self,
        record_key: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        idempotency_records::Entity::update_many()
            .col_expr(
                idempotency_records::Column::Status,
                Expr::value(IdempotencyStatus::Failed.as_str()),
            )
            .col_expr(idempotency_records::Column::Error, Expr::value(error.to_owned()))
            .col_expr(idempotency_records::Column::UpdatedAt, Expr::value(now))
            .filter(idempotency_records::Column::RecordKey.eq(record_key))
            .exec(&self.db)
            .await
            .context("fail idempotency record")?;
        Ok(())
    }

    async fn delete_if_expired(
        &self,
        record_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BookingsServiceError> {
        let result = idempotency_records::Entity::delete_many()
            .filter(idempotency_records::Column::RecordKey.eq(record_key))
            .filter(idempotency_records::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("delete expired idempotency record")?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, BookingsServiceError> {
        let result = idempotency_records::Entity::delete_many()
            .filter(idempotency_records::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("delete expired idempotency records")?;
        Ok(result.rows_affected)
    }
}

fn idempotency_from_model(
    model: idempotency_records::Model,
) -> Result<IdempotencyRecord, BookingsServiceError> {
    Ok(IdempotencyRecord {
        scope: model.scope.parse().context("stored idempotency scope")?,
        key: model.idempotency_key,
        user_id: model.user_id,
        request_hash: model.request_hash,
        status: model.status.parse().context("stored idempotency status")?,
        response: model.response,
        error: model.error,
        created_at: model.created_at,
        updated_at: model.updated_at,
        expires_at: model.expires_at,
    })
}

// ── Provider event repository ────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbProviderEventRepository {
    pub db: DatabaseConnection,
}

impl ProviderEventRepository for DbProviderEventRepository {
    async fn insert_if_absent(
        &self,
        event: &ProviderEvent,
    ) -> Result<bool, BookingsServiceError> {
        let model = provider_events::ActiveModel {
            id: Set(event.id.clone()),
            event_type: Set(event.event_type.clone()),
            payload: Set(event.payload.clone()),
            processed: Set(event.processed),
            processing_error: Set(event.processing_error.clone()),
            retry_count: Set(event.retry_count),
            received_at: Set(event.received_at),
            processed_at: Set(event.processed_at),
        };
        let inserted = provider_events::Entity::insert(model)
            .on_conflict(
                OnConflict::column(provider_events::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("record provider event")?;
        Ok(inserted > 0)
    }

    async fn find(&self, id: &str) -> Result<Option<ProviderEvent>, BookingsServiceError> {
        let model = provider_events::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await
            .context("find provider event")?;
        Ok(model.map(event_from_model))
    }

    async fn mark_processed(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), BookingsServiceError> {
        provider_events::Entity::update_many()
            .col_expr(provider_events::Column::Processed, Expr::value(true))
            .col_expr(
                provider_events::Column::ProcessingError,
                Expr::value(None::<String>),
            )
            .col_expr(provider_events::Column::ProcessedAt, Expr::value(at))
            .filter(provider_events::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("mark provider event processed")?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), BookingsServiceError> {
        provider_events::Entity::update_many()
            .col_expr(provider_events::Column::Processed, Expr::value(false))
            .col_expr(
                provider_events::Column::ProcessingError,
                Expr::value(error.to_owned()),
            )
            .col_expr(
                provider_events::Column::RetryCount,
                Expr::col(provider_events::Column::RetryCount).add(1),
            )
            .filter(provider_events::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("mark provider event failed")?;
        Ok(())
    }

    async fn list_unprocessed(
        &self,
        limit: u64,
        max_retries: i32,
    ) -> Result<Vec<ProviderEvent>, BookingsServiceError> {
        let models = provider_events::Entity::find()
            .filter(provider_events::Column::Processed.eq(false))
            .filter(provider_events::Column::RetryCount.lt(max_retries))
            .order_by_asc(provider_events::Column::ReceivedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list unprocessed provider events")?;
        Ok(models.into_iter().map(event_from_model).collect())
    }

    async fn count_exhausted(&self, max_retries: i32) -> Result<u64, BookingsServiceError> {
        let count = provider_events::Entity::find()
            .filter(provider_events::Column::Processed.eq(false))
            .filter(provider_events::Column::RetryCount.gte(max_retries))
            .count(&self.db)
            .await
            .context("count exhausted provider events")?;
        Ok(count)
    }
}

fn event_from_model(model: provider_events::Model) -> ProviderEvent {
    ProviderEvent {
        id: model.id,
        event_type: model.event_type,
        payload: model.payload,
        processed: model.processed,
        processing_error: model.processing_error,
        retry_count: model.retry_count,
        received_at: model.received_at,
        processed_at: model.processed_at,
    }
}
