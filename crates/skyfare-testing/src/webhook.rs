//! Payment-provider notification builders.
//!
//! Produces signed `x-payment-signature` headers and JSON envelopes shaped like
//! the provider's event objects: `{ id, type, created, data: { object } }`.

use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Signature header value for `body` signed at unix time `timestamp`.
pub fn sign_payload(body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

pub fn event(id: &str, event_type: &str, object: Value) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "created": 1_760_000_000,
        "data": { "object": object },
    })
}

pub fn payment_succeeded(event_id: &str, payment_intent_id: &str, amount: i64) -> Value {
    event(
        event_id,
        "payment_intent.succeeded",
        json!({
            "id": payment_intent_id,
            "amount": amount,
            "amount_received": amount,
            "currency": "usd",
            "latest_charge": format!("ch_{payment_intent_id}"),
        }),
    )
}

pub fn payment_failed(event_id: &str, payment_intent_id: &str, reason: &str) -> Value {
    event(
        event_id,
        "payment_intent.payment_failed",
        json!({
            "id": payment_intent_id,
            "currency": "usd",
            "last_payment_error": { "message": reason },
        }),
    )
}

/// `refunds` are `(refund id, amount)` pairs listed newest first, the way the
/// provider embeds them; `amount_refunded` is their sum.
pub fn charge_refunded(
    event_id: &str,
    payment_intent_id: &str,
    amount: i64,
    refunds: &[(&str, i64)],
) -> Value {
    let amount_refunded: i64 = refunds.iter().map(|(_, refund)| refund).sum();
    let data: Vec<Value> = refunds
        .iter()
        .map(|(id, refund)| {
            json!({
                "id": id,
                "amount": refund,
                "currency": "usd",
                "status": "succeeded",
            })
        })
        .collect();
    event(
        event_id,
        "charge.refunded",
        json!({
            "id": format!("ch_{payment_intent_id}"),
            "payment_intent": payment_intent_id,
            "amount": amount,
            "amount_refunded": amount_refunded,
            "currency": "usd",
            "refunded": amount_refunded >= amount,
            "refunds": { "data": data },
        }),
    )
}

/// `booking_id` travels as the session's `client_reference_id`.
pub fn checkout_completed(
    event_id: &str,
    session_id: &str,
    booking_id: &str,
    payment_intent_id: &str,
) -> Value {
    event(
        event_id,
        "checkout.session.completed",
        json!({
            "id": session_id,
            "client_reference_id": booking_id,
            "payment_intent": payment_intent_id,
        }),
    )
}

pub fn checkout_expired(event_id: &str, session_id: &str, booking_id: &str) -> Value {
    event(
        event_id,
        "checkout.session.expired",
        json!({ "id": session_id, "client_reference_id": booking_id }),
    )
}
