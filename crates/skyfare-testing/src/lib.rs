//! Test utilities for Skyfare services.
//!
//! Provides `MockAuth` identity headers and payment-provider webhook builders.
//! Import in tests only, never in production code.

pub mod auth;
pub mod webhook;
