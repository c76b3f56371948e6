//! Splits raw output chunks into complete lines.
//!
//! Reads from a pipe arrive in arbitrary chunks, so a line (or a multi-byte
//! UTF-8 character) may straddle two reads. The splitter holds the bytes
//! after the last newline and prefixes them to the next chunk.

/// Incremental byte-to-line decoder.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    ///
    /// Lines are decoded lossily and returned without `\n` or `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let Some(last_newline) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.pending.extend_from_slice(chunk);
            return Vec::new();
        };

        let mut complete = std::mem::take(&mut self.pending);
        complete.extend_from_slice(&chunk[..last_newline]);
        self.pending.extend_from_slice(&chunk[last_newline + 1..]);

        complete
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Bytes held since the last newline, if any.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume the splitter, returning the unterminated tail.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}
