// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Frame splitter -- M2.1
//
// Turns transport chunks into complete `data: ` lines. Bytes are buffered
// until a `\n` is seen, so a line is never handed on half-received and a
// multi-byte character split across two chunks is reassembled before it
// is decoded.

use bytes::{Buf, BytesMut};

use super::types::{SseLine, DATA_PREFIX};

/// Splits an SSE byte stream into complete data lines.
///
/// Holds back the trailing partial line between `feed` calls. Lines that do
/// not carry the `data: ` marker (blank separators, `event:`, comments) are
/// dropped here.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: BytesMut,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every data line it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        // Only the new bytes can contain a fresh terminator.
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(search_from + offset);
            self.buffer.advance(1);
            search_from = 0;

            if let Some(line) = to_data_line(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Salvage a final line that arrived without a trailing newline.
    ///
    /// Called once when upstream reports end of data. Leaves the splitter empty.
    pub fn flush(&mut self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        to_data_line(&rest)
    }

    /// Bytes currently held back as a partial line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn to_data_line(raw: &[u8]) -> Option<SseLine> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if !raw.starts_with(DATA_PREFIX.as_bytes()) {
        return None;
    }
    Some(SseLine::new(String::from_utf8_lossy(raw).into_owned()))
}
