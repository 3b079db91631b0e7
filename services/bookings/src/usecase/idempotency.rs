use std::collections::BTreeMap;
use std::future::Future;

use anyhow::Context as _;
use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use uuid::Uuid;

use skyfare_domain::idempotency::{IdempotencyScope, IdempotencyStatus};

use crate::domain::repository::{Clock, IdempotencyRepository};
use crate::domain::types::{IdempotencyRecord, record_key};
use crate::error::BookingsServiceError;

/// Insert/re-read rounds before giving up on a key that keeps changing under us.
const CLAIM_ATTEMPTS: usize = 3;

/// sha256 of the payload's canonical JSON form (object keys sorted).
pub fn hash_payload<P: Serialize + ?Sized>(payload: &P) -> Result<String, BookingsServiceError> {
    let value = serde_json::to_value(payload).context("serialize idempotency payload")?;
    let bytes = serde_json::to_vec(&canonicalize(value)).context("encode idempotency payload")?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Identifies one guarded invocation.
#[derive(Debug, Clone, Copy)]
pub struct GuardKey<'a> {
    pub scope: IdempotencyScope,
    pub key: &'a str,
    pub user_id: Option<Uuid>,
    /// Falls back to the guard's default TTL.
    pub ttl: Option<Duration>,
}

impl<'a> GuardKey<'a> {
    pub fn new(scope: IdempotencyScope, key: &'a str, user_id: Option<Uuid>) -> Self {
        Self {
            scope,
            key,
            user_id,
            ttl: None,
        }
    }
}

enum Claim {
    Acquired,
    Replay(serde_json::Value),
}

/// Runs an operation at most once per `(scope, key, user)` and payload.
pub struct IdempotencyGuard<I: IdempotencyRepository, C: Clock> {
    pub repo: I,
    pub clock: C,
    pub default_ttl: Duration,
}

impl<I: IdempotencyRepository, C: Clock> IdempotencyGuard<I, C> {
    pub async fn with_idempotency<P, T, F, Fut>(
        &self,
        guard: GuardKey<'_>,
        payload: &P,
        f: F,
    ) -> Result<T, BookingsServiceError>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BookingsServiceError>>,
    {
        let request_hash = hash_payload(payload)?;
        let record_key = record_key(guard.scope, guard.user_id, guard.key);

        if let Claim::Replay(response) = self.claim(&guard, &record_key, &request_hash).await? {
            debug!(%record_key, "replaying stored idempotent response");
            let value = serde_json::from_value(response).context("decode stored response")?;
            return Ok(value);
        }

        match f().await {
            Ok(value) => {
                let response = serde_json::to_value(&value).context("encode response")?;
                // The side effect already happened; a lost COMPLETED write only
                // means later retries see STARTED until the record expires.
                if let Err(e) = self
                    .repo
                    .complete(&record_key, &response, self.clock.now())
                    .await
                {
                    error!(%record_key, error = ?e, "failed to complete idempotency record");
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self
                    .repo
                    .fail(&record_key, &err.to_string(), self.clock.now())
                    .await
                {
                    error!(%record_key, error = ?e, "failed to mark idempotency record failed");
                }
                Err(err)
            }
        }
    }

    /// Purge expired records. Returns the number deleted.
    pub async fn cleanup_expired(&self) -> Result<u64, BookingsServiceError> {
        self.repo.delete_expired(self.clock.now()).await
    }

    async fn claim(
        &self,
        guard: &GuardKey<'_>,
        record_key: &str,
        request_hash: &str,
    ) -> Result<Claim, BookingsServiceError> {
        let ttl = guard.ttl.unwrap_or(self.default_ttl);

        for _ in 0..CLAIM_ATTEMPTS {
            let now = self.clock.now();
            let existing = self.repo.find(record_key).await?;

            let Some(record) = existing else {
                let record = IdempotencyRecord {
                    scope: guard.scope,
                    key: guard.key.to_owned(),
                    user_id: guard.user_id,
                    request_hash: request_hash.to_owned(),
                    status: IdempotencyStatus::Started,
                    response: None,
                    error: None,
                    created_at: now,
                    updated_at: now,
                    expires_at: now + ttl,
                };
                if self.repo.insert(&record).await? {
                    return Ok(Claim::Acquired);
                }
                // Lost the insert race: read the winner's record.
                continue;
            };

            if record.expires_at <= now {
                self.repo.delete_if_expired(record_key, now).await?;
                continue;
            }
            if record.request_hash != request_hash {
                return Err(BookingsServiceError::IdempotencyConflict);
            }
            return match record.status {
                IdempotencyStatus::Completed => {
                    Ok(Claim::Replay(record.response.unwrap_or_default()))
                }
                IdempotencyStatus::Started => Err(BookingsServiceError::IdempotencyInProgress),
                IdempotencyStatus::Failed => {
                    if self.repo.reclaim(record_key, now, now + ttl).await? {
                        Ok(Claim::Acquired)
                    } else {
                        Err(BookingsServiceError::IdempotencyInProgress)
                    }
                }
            };
        }

        Err(BookingsServiceError::IdempotencyInProgress)
    }
}
