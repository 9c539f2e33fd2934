//! # gasoline-commands
//!
//! The command-correlation half of the capture + command-correlation
//! engine: [`queue::CommandQueue`] brokers `pending → in_flight →
//! complete|failed|expired` round trips between agent tool-callers and the
//! extension's sync loop, keyed by session with one lock per session.
//!
//! [`ticker::run_deadline_ticker`] is the background task that expires
//! commands whose deadline has passed without a terminal result.

#![deny(unsafe_code)]

pub mod queue;
pub mod ticker;
pub mod types;
