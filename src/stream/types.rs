// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream types -- M2.1
//
// Core types for SSE re-framing: complete lines, decoded payloads,
// orchestrator states and the outcome reported when a stream closes.

use std::fmt;
use std::time::Duration;

/// The SSE field marker every relayed line must start with.
pub const DATA_PREFIX: &str = "data: ";

/// Application-level end-of-stream sentinel carried in a data line.
pub const TERMINAL_SENTINEL: &str = "[DONE]";

/// The one terminal event written to the client per stream.
pub const TERMINAL_EVENT: &[u8] = b"data: [DONE]\n\n";

/// Default idle read timeout between upstream chunks.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the client-side event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default cap on a partial line buffered while waiting for its `\n`.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// SSE line
// ---------------------------------------------------------------------------

/// A complete `data: <payload>` line, without its line terminator.
///
/// Only the splitter constructs these, so the prefix is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseLine(String);

impl SseLine {
    pub(crate) fn new(line: String) -> Self {
        debug_assert!(line.starts_with(DATA_PREFIX));
        Self(line)
    }

    /// The full line, including the `data: ` marker.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything after the `data: ` marker.
    pub fn payload(&self) -> &str {
        &self.0[DATA_PREFIX.len()..]
    }
}

impl fmt::Display for SseLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The decoded content of one SSE line.
///
/// Parse failure is not an error: a payload that is not JSON is relayed
/// verbatim as `Raw`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Payload parsed as JSON.
    Structured(serde_json::Value),
    /// Payload that failed to parse, kept byte-for-byte.
    Raw(String),
    /// The `[DONE]` sentinel.
    Terminal,
}

impl Payload {
    /// True for a raw payload with no visible content (`data: ` or
    /// `data:    `). These are malformed lines and are never forwarded.
    pub fn is_blank(&self) -> bool {
        matches!(self, Payload::Raw(s) if s.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of a single relayed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Reading chunks from upstream.
    Streaming,
    /// Upstream signalled end of data; flushing the final partial line.
    Draining,
    /// Terminal. Nothing more is read or written.
    Closed,
}

/// Why a stream closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Upstream finished (or sent the sentinel) and the terminal event was written.
    Completed,
    /// Upstream transport failed mid-stream.
    UpstreamError(String),
    /// No upstream chunk arrived within the idle timeout.
    IdleTimeout,
    /// The client went away before the stream finished.
    ClientDisconnected,
}

impl StreamEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEnd::Completed => "completed",
            StreamEnd::UpstreamError(_) => "upstream_error",
            StreamEnd::IdleTimeout => "idle_timeout",
            StreamEnd::ClientDisconnected => "client_disconnected",
        }
    }
}

/// Summary of a relayed stream, returned when the orchestrator closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Content events written to the client (terminal event excluded).
    pub events_emitted: usize,
    /// Events dropped as trailing-overlap repeats.
    pub events_suppressed: usize,
    /// Whether the terminal event reached the client.
    pub terminal_sent: bool,
    pub end: StreamEnd,
}
