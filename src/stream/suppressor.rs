// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Duplicate suppressor -- M2.3
//
// Some upstream responses periodically resend the trailing portion of text
// they already streamed as a fresh event. Relaying those verbatim duplicates
// visible output at the client, so an event whose text fragment is a suffix
// of the last emitted fragment is dropped.
//
// Policy: suffix-of-last-fragment => suppress. Exact-suffix resends only; a
// resent tail with any wording change passes through.

use super::types::Payload;

/// Tracks the last emitted text fragment and drops trailing-overlap repeats.
#[derive(Debug, Default)]
pub struct DuplicateSuppressor {
    last_fragment: Option<String>,
    terminated: bool,
}

impl DuplicateSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `payload` is forwarded.
    ///
    /// `Terminal` is always forwarded the first time. Once it has been
    /// forwarded every later payload is refused, so a repeated sentinel never
    /// produces a second terminal event.
    pub fn accept(&mut self, payload: Payload) -> Option<Payload> {
        if self.terminated {
            return None;
        }

        let fragment = match &payload {
            Payload::Terminal => {
                self.terminated = true;
                return Some(payload);
            }
            Payload::Structured(value) => text_fragment(value).map(str::to_owned),
            Payload::Raw(raw) => Some(raw.clone()),
        };

        let fragment = match fragment {
            Some(f) if !f.is_empty() => f,
            // No comparable text: metadata-only events always pass.
            _ => return Some(payload),
        };

        if let Some(last) = &self.last_fragment {
            if last.ends_with(fragment.as_str()) {
                tracing::debug!(
                    fragment_len = fragment.len(),
                    last_len = last.len(),
                    "suppressed trailing-overlap repeat"
                );
                return None;
            }
        }

        self.last_fragment = Some(fragment);
        Some(payload)
    }

    /// Whether the terminal payload has already been forwarded.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn last_fragment(&self) -> Option<&str> {
        self.last_fragment.as_deref()
    }
}

/// Text at `candidates[0].content.parts[0].text`.
///
/// Only the first candidate and first part are inspected; any other shape
/// yields `None`.
pub fn text_fragment(value: &serde_json::Value) -> Option<&str> {
    value
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
}
