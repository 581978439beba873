//! Newline framing for the chat byte stream.
//!
//! A [`LineFramer`] keeps the unterminated tail of everything fed to it and
//! hands back complete lines as soon as their `\n` arrives. It works on bytes
//! so a multi-byte character split across two reads is reassembled before it
//! is decoded.

const DELIMITER: u8 = b'\n';

#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    pending: Vec<u8>,
    // Prefix of `pending` already known to hold no delimiter.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns an iterator over the lines it completed.
    ///
    /// Lines come back without their trailing `\n`. Anything after the last
    /// delimiter stays buffered for the next call. Lines not pulled from the
    /// iterator remain buffered as well, so dropping it early loses nothing.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Lines<'_> {
        self.pending.extend_from_slice(chunk.as_ref());
        Lines { framer: self }
    }

    /// Bytes received since the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.scanned = 0;
    }

    fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|&byte| byte == DELIMITER)
        else {
            self.scanned = self.pending.len();
            return None;
        };
        let end = self.scanned + offset;
        self.scanned = 0;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(match String::from_utf8(line) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }
}

/// Lines completed by one [`LineFramer::feed`] call.
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

/// Encodes one message for the wire.
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(text.len() + 1);
    encoded.extend_from_slice(text.as_bytes());
    encoded.push(DELIMITER);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(lines: &[String], pending: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend(encode_line(line));
        }
        out.extend_from_slice(pending);
        out
    }

    #[test]
    fn splits_and_keeps_remainder() {
        let mut framer = LineFramer::new();

        let lines: Vec<String> = framer.feed("a\nb\nc").collect();
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(framer.pending(), b"c");

        let lines: Vec<String> = framer.feed("\n").collect();
        assert_eq!(lines, vec!["c"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn empty_chunk_changes_nothing() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed("partial").count(), 0);

        assert_eq!(framer.feed("").count(), 0);
        assert_eq!(framer.pending(), b"partial");
    }

    #[test]
    fn lone_newline_flushes_empty_line() {
        let mut framer = LineFramer::new();
        let lines: Vec<String> = framer.feed("\n").collect();
        assert_eq!(lines, vec![String::new()]);
    }

    #[test]
    fn line_spanning_many_chunks() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed("hel").count(), 0);
        assert_eq!(framer.feed("lo wo").count(), 0);
        let lines: Vec<String> = framer.feed("rld\nnext").collect();
        assert_eq!(lines, vec!["hello world"]);
        assert_eq!(framer.pending(), b"next");
    }

    #[test]
    fn reassembles_split_utf8() {
        let bytes = "héllo\n".as_bytes();
        let (head, tail) = bytes.split_at(2);
        let mut framer = LineFramer::new();

        assert_eq!(framer.feed(head).count(), 0);
        let lines: Vec<String> = framer.feed(tail).collect();
        assert_eq!(lines, vec!["héllo"]);
    }

    #[test]
    fn unread_lines_stay_buffered() {
        let mut framer = LineFramer::new();
        let first = framer.feed("one\ntwo\n").next();
        assert_eq!(first.as_deref(), Some("one"));

        let rest: Vec<String> = framer.feed("").collect();
        assert_eq!(rest, vec!["two"]);
    }

    #[test]
    fn unterminated_tail_is_scanned_once() {
        let mut framer = LineFramer::new();
        for _ in 0..1000 {
            assert_eq!(framer.feed("x").count(), 0);
            assert_eq!(framer.scanned, framer.pending().len());
        }

        let lines: Vec<String> = framer.feed("y\nz").collect();
        assert_eq!(lines, vec![format!("{}y", "x".repeat(1000))]);
        assert_eq!(framer.pending(), b"z");
        assert_eq!(framer.scanned, 1);

        framer.clear();
        assert_eq!(framer.scanned, 0);
        let lines: Vec<String> = framer.feed("fresh\n").collect();
        assert_eq!(lines, vec!["fresh"]);
    }

    #[test]
    fn framing_is_lossless_for_any_chunking() {
        let input = "first\n\nsecond line\nthird\nüñí\ncödé\ntrailing";
        let bytes = input.as_bytes();

        for chunk_size in 1..=bytes.len() {
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                lines.extend(framer.feed(chunk));
            }
            assert_eq!(
                reassemble(&lines, framer.pending()),
                bytes,
                "chunk size {chunk_size}"
            );
        }
    }
}
