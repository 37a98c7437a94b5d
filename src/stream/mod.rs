// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// SSE re-framing and duplicate suppression -- defined in M2
//
// Responsibilities:
// - Split upstream byte chunks into complete `data: ` lines, whatever the
//   transport chunk boundaries
// - Decode payloads as JSON, raw text, or the `[DONE]` sentinel
// - Drop events that resend a trailing overlap of already-streamed text
// - Re-serialize accepted payloads as canonical `data: ...\n\n` events
// - Write exactly one terminal event per completed stream
// - Stop reading upstream as soon as the client disconnects

mod decoder;
mod emitter;
mod orchestrator;
mod splitter;
mod suppressor;
mod types;

pub use decoder::decode;
pub use emitter::emit;
pub use orchestrator::{proxy_stream, StreamOrchestrator};
pub use splitter::FrameSplitter;
pub use suppressor::{text_fragment, DuplicateSuppressor};
pub use types::{
    Payload, SseLine, StreamEnd, StreamOutcome, StreamState, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_LINE_BYTES, TERMINAL_EVENT, TERMINAL_SENTINEL,
};

#[cfg(test)]
mod tests;
