//! # gasoline-server
//!
//! Axum HTTP server exposing the daemon's extension-facing surface:
//!
//! - `POST /sync` — one poll tick: ingest telemetry, resolve command
//!   results, claim pending commands.
//! - `POST /clear` — clear one named buffer or `all`.
//! - `GET /health` — liveness and capture-availability snapshot.
//! - `GET /metrics` — Prometheus text exposition.
//!
//! `/sync` and `/clear` sit behind [`auth::extension_auth`], a shared-secret
//! header check; `/health` and `/metrics` do not, so orchestration tooling
//! can probe the daemon without the extension's token.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
