//! # gasoline-sync
//!
//! The extension side of the `/sync` protocol, modeled in Rust for
//! testability: [`client::SyncClient`] is the poll loop that POSTs
//! telemetry and command results and claims new commands; the command
//! handler it dispatches into lives in [`pending_query`]. [`wire`] holds
//! the request/response envelope shared with the daemon's HTTP handler.

#![deny(unsafe_code)]

pub mod client;
pub mod pending_query;
pub mod wire;
