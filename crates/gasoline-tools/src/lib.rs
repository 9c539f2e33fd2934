//! # gasoline-tools
//!
//! The agent-facing tool surface: `observe`/`interact`/`configure`/
//! `generate`, dispatched over a shared [`gasoline_capture::store::CaptureStore`]
//! and [`gasoline_commands::queue::CommandQueue`]. The actual stdio/HTTP
//! JSON-RPC framing that would carry these calls from an agent process is
//! an external collaborator, out of scope here.

#![deny(unsafe_code)]

pub mod facade;

pub use facade::{ConfigureRequest, GasolineTools, InteractRequest, ObserveRequest, ObserveWhat};
