// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use crate::stream::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_LINE_BYTES};

/// Upstream used when the config does not name one.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level parsed and validated relay config.
#[derive(Debug, Default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub stream: StreamConfig,
    pub credentials: CredentialConfig,
    /// Environment label (e.g. "dev", "production"). Logging only.
    pub environment: String,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where requests are forwarded.
#[derive(Debug)]
pub struct UpstreamConfig {
    /// Scheme + host, no trailing slash.
    pub base_url: String,
    /// Whole-request timeout for non-streaming calls, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: None,
        }
    }
}

/// Streaming relay tuning.
#[derive(Debug)]
pub struct StreamConfig {
    /// Longest gap allowed between upstream chunks. `None` disables it.
    pub idle_timeout: Option<Duration>,
    /// Events buffered toward a slow client before upstream reads pause.
    pub channel_capacity: usize,
    /// Longest partial SSE line held back before the stream is abandoned.
    pub max_line_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Server-side credential pool, used when the caller supplies no keys.
#[derive(Default)]
pub struct CredentialConfig {
    pub selection: SelectionPolicy,
    pub keys: Vec<String>,
}

// Keys stay out of debug output.
impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("selection", &self.selection)
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .finish()
    }
}

/// How one credential is picked from a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    #[default]
    Random,
    RoundRobin,
}
