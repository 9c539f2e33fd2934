//! `CommandQueue`: the pending → in_flight → complete|failed|expired state
//! machine, keyed by session.
//!
//! Each session gets its own lock (`dashmap` shards plus a per-entry
//! `Mutex`), so the `/sync` path for one session never contends with
//! another's.

use crate::types::{Command, CommandResult, CommandState, ResultStatus};
use dashmap::DashMap;
use gasoline_core::clock::Clock;
use gasoline_core::ids::{CommandId, CorrelationId, SessionId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Bounded backlog: a session may have at most this many commands pending
/// claim at once.
pub const DEFAULT_BACKLOG_CAP: usize = 5;

/// How many claimed commands `/sync` may take in one call.
pub const DEFAULT_CLAIM_LIMIT: usize = 10;

/// Terminal results retained per session after their waiter may have moved
/// on, so `observe(command_result)` can still fetch them.
pub const TERMINAL_RESULT_LRU_CAP: usize = 100;

/// Outcome of looking a command up by id.
#[derive(Clone, Debug)]
pub enum CommandLookup {
    /// Still pending claim.
    Pending,
    /// Claimed, awaiting a result from the extension.
    InFlight,
    /// A terminal result is available.
    Terminal(CommandResult),
    /// No such command is known to this session (never enqueued, or its
    /// terminal result aged out of the LRU).
    Unknown,
}

struct SessionState {
    pending: VecDeque<Command>,
    in_flight: HashMap<CommandId, Command>,
    terminal: HashMap<CommandId, CommandResult>,
    terminal_order: VecDeque<CommandId>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            terminal: HashMap::new(),
            terminal_order: VecDeque::new(),
        }
    }

    fn record_terminal(&mut self, result: CommandResult) {
        let id = result.id.clone();
        if self.terminal.insert(id.clone(), result).is_none() {
            self.terminal_order.push_back(id);
            if self.terminal_order.len() > TERMINAL_RESULT_LRU_CAP {
                if let Some(evicted) = self.terminal_order.pop_front() {
                    self.terminal.remove(&evicted);
                }
            }
        }
    }
}

/// Tunable limits for a [`CommandQueue`], loaded the same way
/// [`gasoline_capture::store::Capacities`] is: a plain `serde`-`Deserialize`
/// struct with `Default`, merged over by the daemon's config loader.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct CommandQueueConfig {
    /// Bounded backlog: a session may have at most this many commands
    /// pending claim at once.
    pub backlog_cap: usize,
    /// How many claimed commands `/sync` may take in one call.
    pub claim_limit: usize,
    /// Default deadline, in milliseconds, for any command that doesn't
    /// override it.
    pub default_deadline_ms: u64,
    /// Default deadline, in milliseconds, for `upload` commands specifically.
    pub default_upload_timeout_ms: u64,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        Self {
            backlog_cap: DEFAULT_BACKLOG_CAP,
            claim_limit: DEFAULT_CLAIM_LIMIT,
            default_deadline_ms: crate::types::DEFAULT_DEADLINE_MS,
            default_upload_timeout_ms: crate::types::DEFAULT_UPLOAD_TIMEOUT_MS,
        }
    }
}

/// Broker between agent tool-callers and the extension sync loop.
pub struct CommandQueue {
    clock: Arc<dyn Clock>,
    sessions: DashMap<SessionId, Arc<Mutex<SessionState>>>,
    backlog_cap: usize,
    claim_limit: usize,
    default_deadline_ms: u64,
    default_upload_timeout_ms: u64,
}

impl CommandQueue {
    /// Create a queue with the default backlog cap and claim limit.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, CommandQueueConfig::default())
    }

    /// Create a queue with explicit limits, for tests that exercise
    /// overflow behavior without enqueueing hundreds of commands.
    #[must_use]
    pub fn with_limits(clock: Arc<dyn Clock>, backlog_cap: usize, claim_limit: usize) -> Self {
        Self::with_config(
            clock,
            CommandQueueConfig {
                backlog_cap,
                claim_limit,
                ..CommandQueueConfig::default()
            },
        )
    }

    /// Create a queue from a loaded [`CommandQueueConfig`] (the daemon's
    /// deep-merge-over-defaults config loader produces one of these).
    #[must_use]
    pub fn with_config(clock: Arc<dyn Clock>, config: CommandQueueConfig) -> Self {
        Self {
            clock,
            sessions: DashMap::new(),
            backlog_cap: config.backlog_cap,
            claim_limit: config.claim_limit,
            default_deadline_ms: config.default_deadline_ms,
            default_upload_timeout_ms: config.default_upload_timeout_ms,
        }
    }

    /// Default deadline, in milliseconds, for commands that don't specify
    /// their own — configurable per-daemon via [`CommandQueueConfig`].
    #[must_use]
    pub fn default_deadline_ms(&self) -> u64 {
        self.default_deadline_ms
    }

    /// Default deadline, in milliseconds, for `upload` commands specifically.
    #[must_use]
    pub fn default_upload_timeout_ms(&self) -> u64 {
        self.default_upload_timeout_ms
    }

    fn session(&self, session_id: &SessionId) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new())))
            .clone()
    }

    /// Enqueue a new command for `session_id`. Assigns `id` if the caller
    /// left it default, starts its deadline, and — on backlog overflow —
    /// drops the oldest pending command with a synthesized error result so
    /// its waiter unblocks.
    #[instrument(skip(self, command), fields(session_id = %command.session_id, command_id = %command.id, kind = %command.kind))]
    pub fn enqueue(&self, command: Command) -> CommandId {
        let id = command.id.clone();
        let session_id = command.session_id.clone();
        let state_handle = self.session(&session_id);
        let mut state = state_handle.lock();

        if state.pending.len() >= self.backlog_cap {
            if let Some(dropped) = state.pending.pop_front() {
                warn!(
                    session_id = %session_id,
                    command_id = %dropped.id,
                    "pending backlog overflow, dropping oldest command"
                );
                let duration_ms = self
                    .clock
                    .now()
                    .as_datetime()
                    .signed_duration_since(dropped.created_at.as_datetime())
                    .num_milliseconds()
                    .max(0) as u64;
                state.record_terminal(CommandResult {
                    id: dropped.id,
                    correlation_id: dropped.correlation_id,
                    status: ResultStatus::Error,
                    result: None,
                    error: Some("dropped: pending backlog overflow".to_owned()),
                    duration_ms,
                });
            }
        }

        state.pending.push_back(command);
        id
    }

    /// Claim up to `max` pending commands (or the queue's default claim
    /// limit, if `max` is `None`), moving them to `in_flight`.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn claim_pending(&self, session_id: &SessionId, max: Option<usize>) -> Vec<Command> {
        let limit = max.unwrap_or(self.claim_limit);
        let state_handle = self.session(session_id);
        let mut state = state_handle.lock();
        let mut claimed = Vec::with_capacity(limit.min(state.pending.len()));
        for _ in 0..limit {
            let Some(cmd) = state.pending.pop_front() else {
                break;
            };
            state.in_flight.insert(cmd.id.clone(), cmd.clone());
            claimed.push(cmd);
        }
        claimed
    }

    /// Record a terminal result reported by the extension. No-ops if the
    /// command is already terminal or unknown to this session — idempotent
    /// against `/sync` retries delivering the same result twice.
    #[instrument(skip(self, result), fields(session_id = %session_id, command_id = %result.id))]
    pub fn resolve(&self, session_id: &SessionId, result: CommandResult) {
        let state_handle = self.session(session_id);
        let mut state = state_handle.lock();
        if state.terminal.contains_key(&result.id) {
            return;
        }
        let _ = state.in_flight.remove(&result.id);
        state.record_terminal(result);
    }

    /// Look up a command's current state by id (used by
    /// `observe(command_result)`).
    #[must_use]
    #[instrument(skip(self), fields(session_id = %session_id, command_id = %id))]
    pub fn get(
        &self,
        session_id: &SessionId,
        id: &CommandId,
        correlation_id: Option<&CorrelationId>,
    ) -> CommandLookup {
        let state_handle = self.session(session_id);
        let state = state_handle.lock();
        if let Some(result) = state.terminal.get(id) {
            if let Some(expected) = correlation_id {
                if result.correlation_id.as_ref() != Some(expected) {
                    return CommandLookup::Unknown;
                }
            }
            return CommandLookup::Terminal(result.clone());
        }
        if state.in_flight.contains_key(id) {
            return CommandLookup::InFlight;
        }
        if state.pending.iter().any(|c| &c.id == id) {
            return CommandLookup::Pending;
        }
        CommandLookup::Unknown
    }

    /// Scan every session for pending/in-flight commands whose deadline has
    /// passed, flip them to `expired`, and synthesize their failure result.
    /// Called by the background deadline ticker every 250 ms.
    #[instrument(skip(self))]
    pub fn drain_expired(&self) -> Vec<(SessionId, CommandId)> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for entry in self.sessions.iter() {
            let session_id = entry.key().clone();
            let mut state = entry.value().lock();

            let mut still_pending = VecDeque::new();
            while let Some(cmd) = state.pending.pop_front() {
                if cmd.deadline <= now {
                    expired.push((session_id.clone(), cmd.id.clone()));
                    let duration_ms = now
                        .as_datetime()
                        .signed_duration_since(cmd.created_at.as_datetime())
                        .num_milliseconds()
                        .max(0) as u64;
                    state.record_terminal(CommandResult::expired(
                        cmd.id,
                        cmd.correlation_id,
                        duration_ms,
                    ));
                } else {
                    still_pending.push_back(cmd);
                }
            }
            state.pending = still_pending;

            let stale_in_flight: Vec<CommandId> = state
                .in_flight
                .values()
                .filter(|c| c.deadline <= now)
                .map(|c| c.id.clone())
                .collect();
            for id in stale_in_flight {
                if let Some(cmd) = state.in_flight.remove(&id) {
                    expired.push((session_id.clone(), cmd.id.clone()));
                    let duration_ms = now
                        .as_datetime()
                        .signed_duration_since(cmd.created_at.as_datetime())
                        .num_milliseconds()
                        .max(0) as u64;
                    state.record_terminal(CommandResult::expired(
                        cmd.id,
                        cmd.correlation_id,
                        duration_ms,
                    ));
                }
            }
        }
        expired
    }

    /// Number of commands currently pending claim for a session (test and
    /// `/health` introspection hook).
    #[must_use]
    pub fn pending_count(&self, session_id: &SessionId) -> usize {
        self.session(session_id).lock().pending.len()
    }

    /// Snapshot of commands still awaiting claim, for `observe(pending_commands)`.
    /// Unlike [`CommandQueue::claim_pending`], this does not move anything to
    /// `in_flight`.
    #[must_use]
    pub fn list_pending(&self, session_id: &SessionId) -> Vec<Command> {
        self.session(session_id)
            .lock()
            .pending
            .iter()
            .cloned()
            .collect()
    }

    /// Terminal results with a non-`complete` status still held in the
    /// session's LRU, for `observe(failed_commands)`.
    #[must_use]
    pub fn list_failed(&self, session_id: &SessionId) -> Vec<CommandResult> {
        self.session(session_id)
            .lock()
            .terminal
            .values()
            .filter(|r| r.status != ResultStatus::Complete)
            .cloned()
            .collect()
    }
}

impl CommandState {
    /// Classify a [`CommandLookup`] into its coarse-grained state, for
    /// callers that only care which bucket a command is in.
    #[must_use]
    pub fn from_lookup(lookup: &CommandLookup) -> Self {
        match lookup {
            CommandLookup::Pending => Self::Pending,
            CommandLookup::InFlight => Self::InFlight,
            CommandLookup::Terminal(r) => match r.status {
                ResultStatus::Complete => Self::Complete,
                ResultStatus::Error | ResultStatus::Timeout => Self::Failed,
            },
            CommandLookup::Unknown => Self::Expired,
        }
    }
}
