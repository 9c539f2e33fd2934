//! # gasoline-core
//!
//! Foundation types shared by every other `gasoline` crate: the clock,
//! branded IDs, the error taxonomy, and backoff math.
//!
//! - **Clock**: [`clock::Clock`] trait plus [`clock::Timestamp`], a UTC
//!   instant that parses and re-emits RFC3339/RFC3339Nano at the precision
//!   the source actually carried.
//! - **Branded IDs**: [`ids::SessionId`], [`ids::CommandId`],
//!   [`ids::CorrelationId`] — newtypes so a session id can never be passed
//!   where a command id is expected.
//! - **Errors**: [`errors::GasolineError`], the read-path error hierarchy
//!   with stable machine-readable codes and HTTP status mapping.
//! - **Backoff**: [`backoff::calculate_backoff_delay`] for the `SyncClient`
//!   reconnect loop.

#![deny(unsafe_code)]

pub mod backoff;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod ids;
