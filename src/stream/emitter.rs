// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Event emitter -- M2.4

use bytes::Bytes;

use super::types::{Payload, DATA_PREFIX, TERMINAL_EVENT};

/// Serialize a forwarded payload into one complete SSE event.
///
/// JSON is re-serialized compactly, so whitespace and key order may differ
/// from the upstream bytes. Each call returns an independently flushable
/// event ending in exactly one blank line.
pub fn emit(payload: &Payload) -> Bytes {
    match payload {
        Payload::Terminal => Bytes::from_static(TERMINAL_EVENT),
        Payload::Structured(value) => frame(&value.to_string()),
        Payload::Raw(raw) => frame(raw),
    }
}

fn frame(body: &str) -> Bytes {
    let mut out = String::with_capacity(DATA_PREFIX.len() + body.len() + 2);
    out.push_str(DATA_PREFIX);
    out.push_str(body);
    out.push_str("\n\n");
    Bytes::from(out)
}
