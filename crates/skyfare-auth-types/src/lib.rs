//! Auth types shared across Skyfare services.
//!
//! Session issuance lives in the gateway; services only read the identity it
//! injects, via the `IdentityHeaders` extractor.

pub mod identity;
