//! SSE (Server-Sent Events) framing for NanoGPT streaming responses.
//!
//! The stream interleaves standard event blocks with vendor metadata blocks:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hello"}}]}
//!
//! <NanoGPT>{"cost":{"usd":0.0002}}</NanoGPT>
//!
//! data: [DONE]
//! ```
//!
//! [`FrameBuffer`] accumulates decoded text across network reads and yields
//! complete blank-line-delimited blocks; [`parse_frame`] classifies a block
//! as a [`Frame`]. A block is only yielded once its terminating blank line
//! has arrived; partial blocks stay buffered.

/// The sentinel payload that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Opening marker of a vendor metadata block.
pub const METADATA_OPEN: &str = "<NanoGPT>";

/// Closing marker of a vendor metadata block.
pub const METADATA_CLOSE: &str = "</NanoGPT>";

const BLOCK_DELIMITER: &str = "\n\n";

/// One lexical unit of the streaming wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A `<NanoGPT>...</NanoGPT>` block.
    Metadata {
        /// The trimmed block, markers included.
        raw: String,
        /// The text between the markers.
        inner: String,
    },

    /// The concatenated payload of a block's `data:` lines.
    Data(String),

    /// The `[DONE]` sentinel.
    Done,
}

/// Classify one blank-line-delimited block.
///
/// Returns `None` for blocks that carry no event: blank blocks and blocks
/// with no `data:` lines (comments, `event:`/`id:`/`retry:` fields).
pub fn parse_frame(block: &str) -> Option<Frame> {
    let trimmed = block.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(inner) = trimmed
        .strip_prefix(METADATA_OPEN)
        .and_then(|rest| rest.strip_suffix(METADATA_CLOSE))
    {
        return Some(Frame::Metadata {
            raw: trimmed.to_string(),
            inner: inner.to_string(),
        });
    }

    let data_lines: Vec<&str> = trimmed
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();

    if data_lines.is_empty() {
        return None;
    }

    let payload = data_lines.concat();
    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload))
    }
}

/// Accumulates streamed bytes and splits them into complete blocks.
///
/// Bytes are decoded as UTF-8 incrementally: a multi-byte character split
/// across two reads is held back until the rest arrives. Invalid sequences
/// become U+FFFD. CRLF line endings are normalized to LF.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    text: String,
    pending: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one network read.
    pub fn push(&mut self, bytes: &[u8]) {
        let input = if self.pending.is_empty() {
            bytes.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(bytes);
            joined
        };
        self.decode(&input);

        if self.text.contains('\r') {
            self.text = self.text.replace("\r\n", "\n");
        }
    }

    /// Remove and return the next complete block, without its delimiter.
    pub fn next_block(&mut self) -> Option<String> {
        let pos = self.text.find(BLOCK_DELIMITER)?;
        let block = self.text[..pos].to_string();
        self.text.drain(..pos + BLOCK_DELIMITER.len());
        Some(block)
    }

    /// Flush decoder state and return whatever non-blank text remains.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.text.push_str(&String::from_utf8_lossy(&pending));
        }
        let rest = std::mem::take(&mut self.text);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    fn decode(&mut self, mut rest: &[u8]) {
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending = rest[valid_up_to..].to_vec();
                            return;
                        }
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + len..];
                        }
                    }
                }
            }
        }
    }
}
