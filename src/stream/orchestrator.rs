// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream orchestrator -- M2.5
//
// Drives one upstream SSE response through splitter -> decoder ->
// suppressor -> emitter and owns the Streaming -> Draining -> Closed
// lifecycle. All carry-over state lives in a per-stream `Pipeline`, so
// concurrent streams share nothing.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::decoder::decode;
use super::emitter::emit;
use super::splitter::FrameSplitter;
use super::suppressor::DuplicateSuppressor;
use super::types::{
    Payload, SseLine, StreamEnd, StreamOutcome, StreamState, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MAX_LINE_BYTES, TERMINAL_EVENT,
};

/// Relays one upstream SSE response to one client.
#[derive(Debug, Clone)]
pub struct StreamOrchestrator {
    idle_timeout: Option<Duration>,
    max_line_bytes: usize,
}

impl Default for StreamOrchestrator {
    fn default() -> Self {
        Self::new(Some(DEFAULT_IDLE_TIMEOUT))
    }
}

impl StreamOrchestrator {
    /// `None` disables the idle read timeout.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            idle_timeout,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Cap the partial line held back between chunks. An upstream that
    /// exceeds it is treated as broken and the stream closes as an error.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Relay `upstream` into `sink` until the stream completes, fails, or the
    /// client goes away.
    ///
    /// Exactly one terminal event is written on completion, whether or not
    /// upstream sent one. Upstream errors and idle timeouts close the stream
    /// without a terminal event. Cancelling `disconnect` (or dropping the
    /// receiving half of `sink`) stops the upstream read at once; the upstream
    /// stream is dropped when this returns.
    pub async fn run<S, E>(
        &self,
        mut upstream: S,
        sink: mpsc::Sender<Bytes>,
        disconnect: CancellationToken,
    ) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: fmt::Display,
    {
        let mut pipeline = Pipeline::new();
        tracing::debug!(idle_timeout_ms = ?self.idle_timeout.map(|d| d.as_millis()), "stream opened");

        let end = 'read: loop {
            let read = tokio::select! {
                biased;
                _ = disconnect.cancelled() => break 'read StreamEnd::ClientDisconnected,
                _ = sink.closed() => break 'read StreamEnd::ClientDisconnected,
                read = next_chunk(&mut upstream, self.idle_timeout) => read,
            };

            match read {
                Read::Chunk(chunk) => {
                    for line in pipeline.splitter.feed(&chunk) {
                        if pipeline.relay(line, &sink, &disconnect).await.is_err() {
                            break 'read StreamEnd::ClientDisconnected;
                        }
                        if pipeline.terminal_sent {
                            // Anything after the sentinel is never forwarded.
                            break 'read StreamEnd::Completed;
                        }
                    }
                    let pending = pipeline.splitter.pending();
                    if pending > self.max_line_bytes {
                        break 'read StreamEnd::UpstreamError(format!(
                            "unterminated line of {pending} bytes exceeds {} byte limit",
                            self.max_line_bytes
                        ));
                    }
                }
                Read::End => {
                    pipeline.transition(StreamState::Draining);
                    if let Some(line) = pipeline.splitter.flush() {
                        if pipeline.relay(line, &sink, &disconnect).await.is_err() {
                            break 'read StreamEnd::ClientDisconnected;
                        }
                    }
                    break 'read StreamEnd::Completed;
                }
                Read::Failed(error) => break 'read StreamEnd::UpstreamError(error),
                Read::Idle => break 'read StreamEnd::IdleTimeout,
            }
        };

        let end = match end {
            StreamEnd::Completed if !pipeline.terminal_sent => {
                match send(&sink, &disconnect, Bytes::from_static(TERMINAL_EVENT)).await {
                    Ok(()) => {
                        pipeline.terminal_sent = true;
                        StreamEnd::Completed
                    }
                    Err(Disconnected) => StreamEnd::ClientDisconnected,
                }
            }
            other => other,
        };

        pipeline.transition(StreamState::Closed);
        // Release the upstream connection before reporting.
        drop(upstream);

        let outcome = StreamOutcome {
            events_emitted: pipeline.emitted,
            events_suppressed: pipeline.suppressed,
            terminal_sent: pipeline.terminal_sent,
            end,
        };
        log_outcome(&outcome, pipeline.splitter.pending());
        outcome
    }
}

/// Relay a streaming upstream response with default settings.
pub async fn proxy_stream<S, E>(
    upstream: S,
    sink: mpsc::Sender<Bytes>,
    disconnect: CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    StreamOrchestrator::default().run(upstream, sink, disconnect).await
}

// ---------------------------------------------------------------------------
// Per-stream state
// ---------------------------------------------------------------------------

struct Pipeline {
    state: StreamState,
    splitter: FrameSplitter,
    suppressor: DuplicateSuppressor,
    emitted: usize,
    suppressed: usize,
    terminal_sent: bool,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            state: StreamState::Streaming,
            splitter: FrameSplitter::new(),
            suppressor: DuplicateSuppressor::new(),
            emitted: 0,
            suppressed: 0,
            terminal_sent: false,
        }
    }

    fn transition(&mut self, next: StreamState) {
        tracing::trace!(from = ?self.state, to = ?next, "stream state");
        self.state = next;
    }

    /// Decode, filter and write one line.
    async fn relay(
        &mut self,
        line: SseLine,
        sink: &mpsc::Sender<Bytes>,
        disconnect: &CancellationToken,
    ) -> Result<(), Disconnected> {
        let payload = decode(&line);
        if payload.is_blank() {
            return Ok(());
        }

        let Some(payload) = self.suppressor.accept(payload) else {
            self.suppressed += 1;
            return Ok(());
        };

        send(sink, disconnect, emit(&payload)).await?;
        if payload == Payload::Terminal {
            self.terminal_sent = true;
        } else {
            self.emitted += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The client stopped listening.
struct Disconnected;

enum Read {
    Chunk(Bytes),
    End,
    Failed(String),
    Idle,
}

async fn next_chunk<S, E>(upstream: &mut S, idle_timeout: Option<Duration>) -> Read
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, upstream.next()).await {
            Ok(next) => next,
            Err(_) => return Read::Idle,
        },
        None => upstream.next().await,
    };

    match next {
        Some(Ok(chunk)) => Read::Chunk(chunk),
        Some(Err(e)) => Read::Failed(e.to_string()),
        None => Read::End,
    }
}

async fn send(
    sink: &mpsc::Sender<Bytes>,
    disconnect: &CancellationToken,
    event: Bytes,
) -> Result<(), Disconnected> {
    tokio::select! {
        biased;
        _ = disconnect.cancelled() => Err(Disconnected),
        sent = sink.send(event) => sent.map_err(|_| Disconnected),
    }
}

fn log_outcome(outcome: &StreamOutcome, pending_bytes: usize) {
    match &outcome.end {
        StreamEnd::Completed => tracing::info!(
            events_emitted = outcome.events_emitted,
            events_suppressed = outcome.events_suppressed,
            terminal_sent = outcome.terminal_sent,
            end = outcome.end.as_str(),
            "stream closed"
        ),
        StreamEnd::ClientDisconnected => tracing::debug!(
            events_emitted = outcome.events_emitted,
            events_suppressed = outcome.events_suppressed,
            end = outcome.end.as_str(),
            "client went away, upstream read cancelled"
        ),
        StreamEnd::UpstreamError(error) => tracing::warn!(
            events_emitted = outcome.events_emitted,
            events_suppressed = outcome.events_suppressed,
            pending_bytes,
            error = %error,
            end = outcome.end.as_str(),
            "upstream stream failed"
        ),
        StreamEnd::IdleTimeout => tracing::warn!(
            events_emitted = outcome.events_emitted,
            events_suppressed = outcome.events_suppressed,
            pending_bytes,
            end = outcome.end.as_str(),
            "upstream stream idle, closing"
        ),
    }
}
