//! Incremental decoding of the Server-Sent Events stream produced by a
//! streaming chat completion.
//!
//! Bytes arrive in arbitrary chunks. [`SseDecoder`] buffers them until a full
//! line is available, so a frame split across network packets (even in the
//! middle of a multi-byte character) decodes the same as one delivered whole.

use serde::Deserialize;
use tracing::{debug, warn};

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// One parsed `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// JSON payload, with the text delta it carried if that was non-empty.
    Data(Option<String>),
    /// `data: [DONE]`
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Parses one line of the stream.
///
/// Returns `Ok(None)` for lines that carry no frame: blanks, comments and
/// non-`data` fields.
pub fn parse_line(line: &str) -> Result<Option<Frame>, serde_json::Error> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.trim_start();
    if payload == DONE_SENTINEL {
        return Ok(Some(Frame::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(payload)?;
    let delta = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty());
    Ok(Some(Frame::Data(delta)))
}

/// Line reassembler for a byte stream of SSE frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the terminator frame has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds a chunk and returns the deltas of every line it completed, in
    /// order. The trailing partial line stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }

        self.buffer.extend_from_slice(chunk);
        let buffer = std::mem::take(&mut self.buffer);
        let mut consumed = 0;
        for (offset, _) in buffer.iter().enumerate().filter(|(_, b)| **b == b'\n') {
            self.handle_line(&buffer[consumed..offset], &mut deltas);
            consumed = offset + 1;
            if self.done {
                return deltas;
            }
        }

        self.buffer = buffer;
        self.buffer.drain(..consumed);
        deltas
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line, &mut deltas);
        }
        deltas
    }

    fn handle_line(&mut self, raw: &[u8], deltas: &mut Vec<String>) {
        let line = String::from_utf8_lossy(raw);
        match parse_line(&line) {
            Ok(Some(Frame::Data(Some(delta)))) => deltas.push(delta),
            Ok(Some(Frame::Done)) => {
                debug!("stream terminator received");
                self.done = true;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, line = %line.trim(), "skipping malformed stream frame"),
        }
    }
}
