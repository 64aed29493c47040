// src/sse.rs
//! Incremental Server-Sent-Events framing for upstream completion streams.

use std::string::FromUtf8Error;

pub const DONE_SENTINEL: &str = "[DONE]";

/// Collects raw bytes and hands back complete `\n\n`-terminated event blocks.
/// Bytes are only decoded once a whole block is present, so a multibyte
/// character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// `\r` never occurs inside a UTF-8 multibyte sequence, so it can be dropped per byte.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
    }

    pub fn next_event_block(&mut self) -> Result<Option<String>, FromUtf8Error> {
        let Some(boundary) = self.buffer.windows(2).position(|w| w == b"\n\n") else {
            return Ok(None);
        };
        let block: Vec<u8> = self.buffer.drain(..boundary + 2).collect();
        String::from_utf8(block).map(Some)
    }

    /// Whatever is left once the upstream closed without a final blank line.
    pub fn take_remainder(&mut self) -> Result<Option<String>, FromUtf8Error> {
        let rest = String::from_utf8(std::mem::take(&mut self.buffer))?;
        if rest.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(rest))
        }
    }
}

pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .collect()
}
