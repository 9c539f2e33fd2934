//! # gasoline-capture
//!
//! The telemetry side of the daemon: bounded ring buffers with
//! eviction-aware sequencing, the cursor codec, a generic pagination
//! engine, and the [`store::CaptureStore`] that ties them to the concrete
//! stream shapes the browser extension sends.
//!
//! - [`ring::RingBuffer`] — single-writer/multi-reader bounded FIFO.
//! - [`cursor::Cursor`] — the `"<ts>:<seq>"` wire format and its total order.
//! - [`pagination`] — `after`/`before`/`since` + `limit`, generic over
//!   anything with a cursor.
//! - [`streams`] — the concrete entry shapes (`logs`, `actions`, …).
//! - [`clusters`] — error-cluster derivation over the log ring.
//! - [`store::CaptureStore`] — owns every ring, exposes ingest + read.

#![deny(unsafe_code)]

pub mod clusters;
pub mod cursor;
pub mod pagination;
pub mod ring;
pub mod store;
pub mod streams;
