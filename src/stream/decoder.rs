// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Payload decoder -- M2.2
//
// Strips the data marker and classifies the payload as JSON, raw text or
// the terminal sentinel. Never fails.

use super::types::{Payload, SseLine, TERMINAL_SENTINEL};

/// Decode one complete data line.
pub fn decode(line: &SseLine) -> Payload {
    let payload = line.payload();

    if payload.trim() == TERMINAL_SENTINEL {
        return Payload::Terminal;
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => Payload::Structured(value),
        Err(e) => {
            tracing::debug!(error = %e, len = payload.len(), "payload is not JSON, relaying raw");
            Payload::Raw(payload.to_string())
        }
    }
}
