//! Reassembly of process output chunks into lines.

/// Buffers raw output until a full line is available.
///
/// Tools flush at arbitrary points, so a chunk may end mid-line or even in
/// the middle of a multi-byte character. Bytes are held until a `\n` arrives
/// and only then decoded (lossily). A trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.pending.is_empty() {
                lines.push(decode(head));
            } else {
                self.pending.extend_from_slice(head);
                lines.push(decode(&self.pending));
                self.pending.clear();
            }
            rest = &tail[1..];
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// Flush the unterminated last line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
