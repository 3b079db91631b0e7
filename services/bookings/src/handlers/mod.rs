pub mod bookings;
pub mod health;
pub mod maintenance;
pub mod payments;
pub mod webhooks;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use skyfare_auth_types::identity::IdentityHeaders;

use crate::domain::types::Caller;
use crate::error::BookingsServiceError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

/// Client-supplied `Idempotency-Key` header. Required on every mutating
/// booking and payment route.
#[derive(Debug, Clone)]
pub struct IdempotencyKey(pub String);

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = BookingsServiceError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let key = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        async move {
            let key = key.ok_or(BookingsServiceError::MissingIdempotencyKey)?;
            if key.len() > IDEMPOTENCY_KEY_MAX_LEN {
                return Err(BookingsServiceError::Validation(format!(
                    "idempotency key longer than {IDEMPOTENCY_KEY_MAX_LEN} characters"
                )));
            }
            Ok(Self(key))
        }
    }
}

fn caller(identity: &IdentityHeaders) -> Caller {
    Caller {
        user_id: identity.user_id,
        role: identity.user_role,
    }
}
