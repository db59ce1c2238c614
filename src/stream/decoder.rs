// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reassembly of `text/event-stream` frames from arbitrary chunks.
//!
//! ```text
//! data: {"status":"IN_PROGRESS"}
//!
//! data: {"status":"SUCCESS"}
//!
//! ```
//!
//! Frames end at a blank line. Carriage returns are dropped so `\r\n`
//! delimited streams split the same way. Bytes are only decoded as UTF-8
//! once a frame is complete, so multi-byte characters may straddle chunks.

use crate::error::StreamError;

use super::log::EventPayload;

const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Largest incomplete frame kept in the buffer.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a delimiter.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the frames it completes, in order.
    ///
    /// Frames with no `data:` line are skipped. Decoding stops at the first
    /// bad frame: its error is the last item and the rest of the buffer is
    /// discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<EventPayload, StreamError>> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = self.next_delimiter() {
            let frame: Vec<u8> = self.buffer.drain(..pos + FRAME_DELIMITER.len()).collect();
            self.scanned = 0;
            match std::str::from_utf8(&frame[..pos]) {
                Ok(text) => frames.extend(parse_frame(text).map(Ok)),
                Err(e) => return self.fail(frames, e.to_string()),
            }
        }

        if self.buffer.len() > MAX_PENDING_BYTES {
            let message = format!("frame exceeds {MAX_PENDING_BYTES} bytes without a delimiter");
            return self.fail(frames, message);
        }
        frames
    }

    /// Bytes of an incomplete trailing frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn next_delimiter(&mut self) -> Option<usize> {
        let start = self.scanned.saturating_sub(FRAME_DELIMITER.len() - 1);
        match find(&self.buffer[start..], FRAME_DELIMITER) {
            Some(pos) => Some(start + pos),
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    fn fail(
        &mut self,
        mut frames: Vec<Result<EventPayload, StreamError>>,
        message: String,
    ) -> Vec<Result<EventPayload, StreamError>> {
        self.buffer.clear();
        self.scanned = 0;
        frames.push(Err(StreamError::Decode(message)));
        frames
    }
}

/// Extract the payload of one frame.
///
/// Multiple `data:` lines are joined with newlines. Comment lines (`:`) and
/// other fields are ignored.
pub fn parse_frame(frame: &str) -> Option<EventPayload> {
    let mut data: Option<String> = None;
    for line in frame.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }
    data.map(|d| EventPayload::parse(&d))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
