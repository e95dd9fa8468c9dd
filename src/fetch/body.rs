//! Bounded body accumulation
//!
//! Response bytes arrive in whatever pieces the transport hands over. They are
//! re-sliced into fixed-size chunks so the truncation point depends only on the
//! body, never on network framing.
//!
//! Each chunk is decoded as it is accepted, and the cap applies to the decoded
//! UTF-8 length. An invalid byte therefore counts as the three bytes of its
//! replacement character, and a sequence split across chunks is carried over
//! and decoded whole.

/// A fully consumed (possibly truncated) response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Decoded text, with the truncation marker appended when truncated
    pub content: String,
    /// UTF-8 length of `content`
    pub size_bytes: u64,
    pub truncated: bool,
}

/// Collects a streamed body up to a size cap
#[derive(Debug)]
pub struct BodyAccumulator {
    retained: String,
    pending: Vec<u8>,
    /// Incomplete UTF-8 sequence left at the end of the last chunk
    carry: Vec<u8>,
    limit: usize,
    chunk_size: usize,
    truncated: bool,
}

impl BodyAccumulator {
    /// Creates an accumulator retaining at most `limit` decoded bytes in `chunk_size` steps
    pub fn new(limit: usize, chunk_size: usize) -> Self {
        Self {
            retained: String::new(),
            pending: Vec::new(),
            carry: Vec::new(),
            limit,
            chunk_size: chunk_size.max(1),
            truncated: false,
        }
    }

    /// Feeds bytes from the transport
    ///
    /// Returns `false` once the cap has been crossed; the caller should stop
    /// reading the body at that point.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if self.truncated {
            return false;
        }

        self.pending.extend_from_slice(bytes);
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<u8> = self.pending.drain(..self.chunk_size).collect();
            if !self.accept(&chunk, false) {
                return false;
            }
        }
        true
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Flushes the final partial chunk and returns the retained text
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn finish(mut self) -> Body {
        if !self.truncated && !(self.pending.is_empty() && self.carry.is_empty()) {
            let rest = std::mem::take(&mut self.pending);
            self.accept(&rest, true);
        }

        let mut content = self.retained;
        if self.truncated {
            content.push_str(&truncation_marker(self.limit));
        }

        Body {
            size_bytes: content.len() as u64,
            truncated: self.truncated,
            content,
        }
    }

    fn accept(&mut self, chunk: &[u8], at_end: bool) -> bool {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);
        let (text, carry) = decode_lossy(&bytes, at_end);

        if self.retained.len() + text.len() > self.limit {
            self.truncated = true;
            self.pending.clear();
            return false;
        }
        self.retained.push_str(&text);
        self.carry = carry;
        true
    }
}

/// Decodes `bytes`, replacing each invalid sequence with U+FFFD
///
/// Unless `at_end`, an incomplete sequence at the very end is handed back
/// undecoded so the next chunk can complete it.
fn decode_lossy(bytes: &[u8], at_end: bool) -> (String, Vec<u8>) {
    let mut text = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                return (text, Vec::new());
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None if at_end => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        return (text, Vec::new());
                    }
                    None => return (text, after.to_vec()),
                }
            }
        }
    }
}

/// Marker appended to truncated content, e.g. `"\n\n[TRUNCATED at 5 MB]"`
pub fn truncation_marker(limit: usize) -> String {
    format!(
        "\n\n[TRUNCATED at {:.0} MB]",
        limit as f64 / (1024.0 * 1024.0)
    )
}
