//! Reassembly of `data: <json>` event-stream frames into the full reply text.

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::llm::ProgressCallback;

const FRAME_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental assembler for chat-completion event streams.
///
/// Bytes are buffered until a full line is available, so frames (and UTF-8
/// sequences) may be split at any point between chunks. Lines that fail to
/// decode are skipped without aborting the stream.
pub struct FrameAssembler {
    pending: Vec<u8>,
    text: String,
    finished: bool,
    skipped_frames: usize,
    progress: Option<ProgressCallback>,
}

impl FrameAssembler {
    pub fn new(progress: Option<ProgressCallback>) -> Self {
        Self {
            pending: Vec::new(),
            text: String::new(),
            finished: false,
            skipped_frames: 0,
            progress,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.process_line(&line[..line.len() - 1]);
        }
    }

    /// Flushes a trailing line without a newline and returns the accumulated text.
    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.process_line(&line);
        }
        self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// True once the terminal sentinel frame has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    fn process_line(&mut self, raw: &[u8]) {
        if self.finished {
            return;
        }
        let Ok(line) = std::str::from_utf8(raw) else {
            self.skipped_frames += 1;
            return;
        };
        let line = line.trim_end_matches('\r');
        let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.finished = true;
            return;
        }

        let value = match serde_json::from_str::<Value>(payload) {
            Ok(value) => value,
            Err(error) => {
                self.skipped_frames += 1;
                debug!(
                    event_name = "agent.stream.frame_skipped",
                    error = %error,
                    "skipping undecodable stream frame"
                );
                return;
            }
        };

        if let Some(delta) = delta_content(&value) {
            if delta.is_empty() {
                return;
            }
            self.text.push_str(delta);
            if let Some(progress) = &self.progress {
                progress(delta, &self.text);
            }
        }
    }
}

fn delta_content(value: &Value) -> Option<&str> {
    value.get("choices")?.get(0)?.get("delta")?.get("content")?.as_str()
}

/// Drains a byte stream through a [`FrameAssembler`]. A transport error ends
/// the stream early; it is returned together with the text assembled so far.
pub async fn assemble<S, B, E>(
    stream: S,
    progress: Option<ProgressCallback>,
) -> Result<String, (E, String)>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut assembler = FrameAssembler::new(progress);
    futures::pin_mut!(stream);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => assembler.push(bytes.as_ref()),
            Err(error) => return Err((error, assembler.finish())),
        }
    }

    Ok(assembler.finish())
}
