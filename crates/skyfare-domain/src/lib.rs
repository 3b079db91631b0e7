//! Domain types shared across all Skyfare services.
//!
//! This crate contains only pure types with no framework dependencies.
//! The booking transition table lives here so every layer consults the same copy.

pub mod actor;
pub mod booking;
pub mod idempotency;
pub mod ledger;
pub mod user;
