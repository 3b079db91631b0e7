//! HTTP client for the payment provider's REST API.

use std::time::Duration;

use anyhow::Context as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::domain::repository::PaymentGateway;
use crate::domain::types::{
    PaymentIntent, PaymentIntentRequest, ProviderRefund, RefundRequest,
};
use crate::error::BookingsServiceError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// `PaymentGateway` backed by the provider's REST API.
///
/// Every request carries the caller's idempotency key so that a retried call
/// never creates a second intent or refund on the provider side.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BookingsServiceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build payment provider client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    async fn post<B, T>(
        &self,
        path: &str,
        idempotency_key: &str,
        body: &B,
    ) -> Result<T, BookingsServiceError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(path, error = %e, "payment provider request failed");
                BookingsServiceError::ProviderUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(path, status = status.as_u16(), body, "payment provider request unsuccessful");
            return Err(failure_from_response(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BookingsServiceError::ProviderUnavailable(e.to_string()))
    }
}

/// Client errors are final, except the ones the provider asks to retry.
fn failure_from_response(status: StatusCode, body: &str) -> BookingsServiceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("provider returned HTTP {}", status.as_u16()));

    let transient = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !transient {
        BookingsServiceError::ProviderRejected(message)
    } else {
        BookingsServiceError::ProviderUnavailable(message)
    }
}

impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, BookingsServiceError> {
        self.post("/payment_intents", &request.idempotency_key, request)
            .await
    }

    async fn create_refund(
        &self,
        request: &RefundRequest,
    ) -> Result<ProviderRefund, BookingsServiceError> {
        self.post("/refunds", &request.idempotency_key, request).await
    }
}
