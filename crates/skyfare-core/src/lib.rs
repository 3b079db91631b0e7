//! Plumbing shared by Skyfare services: tracing, HTTP middleware, health
//! probes, serde helpers and sea-orm extensions.

pub mod health;
pub mod middleware;
pub mod sea_ext;
pub mod serde;
pub mod tracing;
