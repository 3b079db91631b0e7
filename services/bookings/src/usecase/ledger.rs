use serde::Serialize;
use uuid::Uuid;

use skyfare_domain::ledger::LedgerTotals;

use crate::domain::repository::{BookingRepository, LedgerRepository};
use crate::domain::types::{Caller, LedgerEntry};
use crate::error::BookingsServiceError;
use crate::usecase::booking::find_accessible;

/// A booking's ledger with totals recomputed from the entries.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatement {
    pub entries: Vec<LedgerEntry>,
    pub totals: LedgerTotals,
}

pub struct GetLedgerUseCase<B: BookingRepository, L: LedgerRepository> {
    pub bookings: B,
    pub ledger: L,
}

impl<B: BookingRepository, L: LedgerRepository> GetLedgerUseCase<B, L> {
    pub async fn execute(
        &self,
        caller: &Caller,
        booking_id: Uuid,
    ) -> Result<LedgerStatement, BookingsServiceError> {
        find_accessible(&self.bookings, caller, booking_id).await?;
        let entries = self.ledger.list_by_booking(booking_id).await?;
        let totals = LedgerTotals::from_entries(entries.iter().map(|e| (e.entry_type, e.amount)));
        Ok(LedgerStatement { entries, totals })
    }
}
