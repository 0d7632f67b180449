//! Reply stream aggregation
//!
//! The backend answers with newline-delimited frames, each optionally prefixed
//! with `data:` and carrying a JSON `{"type": ..., "content": ...}` record.
//! Only `reply` frames contribute text; everything else is ignored, and frames
//! that fail to parse are logged and skipped.

use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Marker that may precede a frame's JSON payload
pub const DATA_PREFIX: &str = "data:";

/// Event type carrying reply text
pub const REPLY_EVENT: &str = "reply";

/// One decoded stream frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
}

impl StreamEvent {
    pub fn is_reply(&self) -> bool {
        self.kind == REPLY_EVENT
    }
}

/// Decode a single frame. Blank frames yield `Ok(None)`.
pub fn parse_frame(frame: &str) -> Result<Option<StreamEvent>> {
    let frame = frame.trim();
    let payload = frame.strip_prefix(DATA_PREFIX).unwrap_or(frame).trim();
    if payload.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(payload)?))
}

/// Per-stream frame counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStats {
    pub replies: usize,
    pub ignored: usize,
    pub malformed: usize,
}

/// Incremental reply collector
///
/// Bytes are buffered until a newline completes a frame, so frames split across
/// chunks (even inside a multi-byte character) decode correctly.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    buffer: Vec<u8>,
    reply: String,
    stats: AggregateStats,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the response body
    pub fn push(&mut self, chunk: &[u8]) {
        // The buffered tail never holds a newline, so only new bytes are scanned
        let Some(last) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.buffer.extend_from_slice(chunk);
            return;
        };

        let (complete, tail) = chunk.split_at(last + 1);
        let mut frames = std::mem::take(&mut self.buffer);
        frames.extend_from_slice(complete);
        for frame in frames.split_inclusive(|&b| b == b'\n') {
            self.consume(frame);
        }
        frames.clear();
        frames.extend_from_slice(tail);
        self.buffer = frames;
    }

    /// Treat any buffered bytes as a final, unterminated frame
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let frame = std::mem::take(&mut self.buffer);
            self.consume(&frame);
        }
    }

    /// Text accumulated so far
    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    /// Flush and return the complete reply
    pub fn finish(mut self) -> String {
        self.flush();
        debug!(
            "Stream finished: {} reply, {} ignored, {} malformed frame(s)",
            self.stats.replies, self.stats.ignored, self.stats.malformed
        );
        self.reply
    }

    fn consume(&mut self, frame: &[u8]) {
        let text = String::from_utf8_lossy(frame);
        match parse_frame(&text) {
            Ok(Some(event)) if event.is_reply() => {
                self.reply.push_str(&event.content);
                self.stats.replies += 1;
            }
            Ok(Some(event)) => {
                debug!("Ignoring stream event of type '{}'", event.kind);
                self.stats.ignored += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Error parsing stream frame: {} ({:?})", e, text.trim());
                self.stats.malformed += 1;
            }
        }
    }
}

/// Collect a whole reply stream into one string
///
/// A transport error aborts aggregation and is returned as is.
pub async fn aggregate<S, B>(stream: S) -> Result<String>
where
    S: Stream<Item = Result<B>>,
    B: AsRef<[u8]>,
{
    let mut stream = pin!(stream);
    let mut aggregator = StreamAggregator::new();

    while let Some(chunk) = stream.next().await {
        aggregator.push(chunk?.as_ref());
    }

    Ok(aggregator.finish())
}

/// Like [`aggregate`], failing with [`Error::StreamTimeout`] when no chunk
/// arrives within `idle`
pub async fn aggregate_with_idle_timeout<S, B>(stream: S, idle: Duration) -> Result<String>
where
    S: Stream<Item = Result<B>>,
    B: AsRef<[u8]>,
{
    let mut stream = pin!(stream);
    let mut aggregator = StreamAggregator::new();

    loop {
        let next = tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| Error::StreamTimeout(idle))?;
        match next {
            Some(chunk) => aggregator.push(chunk?.as_ref()),
            None => break,
        }
    }

    Ok(aggregator.finish())
}
