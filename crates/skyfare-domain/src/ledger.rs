//! Ledger entry kinds and per-booking totals.
//!
//! Amounts are integers in the currency's minor unit (cents for USD).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a monetary fact recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Charge,
    Refund,
    PartialRefund,
}

impl LedgerEntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Refund => "refund",
            Self::PartialRefund => "partial_refund",
        }
    }

    pub fn is_refund(self) -> bool {
        matches!(self, Self::Refund | Self::PartialRefund)
    }

    /// Amount with the sign it contributes to the booking's net.
    pub fn signed(self, amount: i64) -> i64 {
        if self.is_refund() { -amount } else { amount }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown ledger entry type: {0:?}")]
pub struct UnknownLedgerEntryType(pub String);

impl FromStr for LedgerEntryType {
    type Err = UnknownLedgerEntryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charge" => Ok(Self::Charge),
            "refund" => Ok(Self::Refund),
            "partial_refund" => Ok(Self::PartialRefund),
            other => Err(UnknownLedgerEntryType(other.to_owned())),
        }
    }
}

/// Sums reconstructed from a booking's ledger entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub charged: i64,
    pub refunded: i64,
    pub net: i64,
}

impl LedgerTotals {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (LedgerEntryType, i64)>,
    {
        entries
            .into_iter()
            .fold(Self::default(), |mut totals, (kind, amount)| {
                if kind.is_refund() {
                    totals.refunded += amount;
                } else {
                    totals.charged += amount;
                }
                totals.net += kind.signed(amount);
                totals
            })
    }
}
