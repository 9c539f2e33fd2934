//! Command and result wire types.

use gasoline_core::clock::Timestamp;
use gasoline_core::ids::{CommandId, CorrelationId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default deadline for any command that doesn't override it.
pub const DEFAULT_DEADLINE_MS: u64 = 30_000;

/// Default `upload` command deadline in production. Tests typically override
/// this to a few tens of milliseconds to exercise the timeout path (S6).
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;

/// Where a command currently sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Enqueued, not yet claimed by a `/sync` call.
    Pending,
    /// Claimed by `/sync`; the extension is now responsible for it.
    InFlight,
    /// Terminal: the extension reported a successful result.
    Complete,
    /// Terminal: the extension reported an error, or the command was
    /// dropped for backlog overflow.
    Failed,
    /// Terminal: the deadline ticker expired the command before a result
    /// arrived.
    Expired,
}

impl CommandState {
    /// Whether this state is terminal (no further transitions are valid).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Expired)
    }
}

/// An agent-issued instruction awaiting extension dispatch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    /// Daemon-assigned id. Monotonic within a process; may repeat across
    /// restarts, so `(id, correlation_id)` is the effective dedup key.
    pub id: CommandId,
    /// Command discriminant (`execute`, `click`, `browser_action`, …).
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque, command-type-specific parameters.
    pub params: Value,
    /// Caller-chosen correlation id, stable across daemon restarts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// When the command was enqueued.
    pub created_at: Timestamp,
    /// When the command must have a terminal result by.
    pub deadline: Timestamp,
    /// Target tab, if the caller pinned one explicitly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    /// Owning session.
    #[serde(skip)]
    pub session_id: SessionId,
}

/// Terminal (or timeout) outcome reported for a command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command this result answers.
    pub id: CommandId,
    /// Echoed correlation id, if the command carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Outcome discriminant.
    pub status: ResultStatus,
    /// Success payload, opaque to the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message, for `error`/`timeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How long the command took from enqueue to terminal result.
    pub duration_ms: u64,
}

/// Command result outcome. `Timeout` is a semantic hint; consumers
/// treat it identically to `Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The handler ran to completion successfully.
    Complete,
    /// The handler threw, or the queue synthesized a failure (backlog
    /// overflow, deadline expiry).
    Error,
    /// The per-command-type timeout elapsed before the handler resolved.
    Timeout,
}

impl CommandResult {
    /// Synthesize the terminal result for an expired command.
    #[must_use]
    pub fn expired(id: CommandId, correlation_id: Option<CorrelationId>, duration_ms: u64) -> Self {
        Self {
            id,
            correlation_id,
            status: ResultStatus::Error,
            result: None,
            error: Some("command timed out".to_owned()),
            duration_ms,
        }
    }
}
