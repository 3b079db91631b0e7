//! Booking status and the legal transition table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Initiated,
    Pending,
    Reserved,
    Paid,
    Confirmed,
    CheckedIn,
    Boarded,
    Completed,
    Cancelled,
    Refunded,
    Expired,
    PaymentFailed,
    NoShow,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 13] = [
        Self::Initiated,
        Self::Pending,
        Self::Reserved,
        Self::Paid,
        Self::Confirmed,
        Self::CheckedIn,
        Self::Boarded,
        Self::Completed,
        Self::Cancelled,
        Self::Refunded,
        Self::Expired,
        Self::PaymentFailed,
        Self::NoShow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Pending => "pending",
            Self::Reserved => "reserved",
            Self::Paid => "paid",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::Boarded => "boarded",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Expired => "expired",
            Self::PaymentFailed => "payment_failed",
            Self::NoShow => "no_show",
        }
    }

    /// Statuses reachable from `self` in one step.
    pub fn allowed_targets(self) -> &'static HashSet<BookingStatus> {
        // Every status has an entry, terminal ones map to an empty set.
        &TRANSITIONS[&self]
    }

    /// A terminal status has no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string cannot be parsed as a [`BookingStatus`].
#[derive(Debug, Error)]
#[error("unknown booking status: {0:?}")]
pub struct UnknownBookingStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownBookingStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownBookingStatus(s.to_owned()))
    }
}

/// Legal transitions, built once and shared read-only by every worker.
static TRANSITIONS: LazyLock<HashMap<BookingStatus, HashSet<BookingStatus>>> =
    LazyLock::new(|| {
        use BookingStatus::*;

        let table: [(BookingStatus, &[BookingStatus]); 13] = [
            (Initiated, &[Pending, Reserved, Expired, Cancelled]),
            (Pending, &[Reserved, Paid, Expired, Cancelled, PaymentFailed]),
            (Reserved, &[Paid, Expired, Cancelled]),
            (Paid, &[Confirmed, Cancelled, Refunded]),
            (Confirmed, &[CheckedIn, Cancelled, Refunded, NoShow]),
            (CheckedIn, &[Boarded, Cancelled, NoShow]),
            (Boarded, &[Completed, Cancelled]),
            (Completed, &[Refunded]),
            (Cancelled, &[Refunded]),
            (PaymentFailed, &[Pending, Cancelled]),
            (NoShow, &[Refunded]),
            (Refunded, &[]),
            (Expired, &[]),
        ];

        table
            .into_iter()
            .map(|(from, targets)| (from, targets.iter().copied().collect()))
            .collect()
    });

/// Pure lookup in the transition table.
pub fn is_valid_transition(from: BookingStatus, to: BookingStatus) -> bool {
    from.allowed_targets().contains(&to)
}
