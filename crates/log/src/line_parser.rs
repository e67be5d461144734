// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Splits a raw byte stream into lines without ever blocking on a
//! terminator that might not come.
//!
//! Child process output isn't guaranteed to arrive newline-terminated —
//! progress bars and prompts write bare `\r`, and a max line length has to
//! be enforced so a runaway process can't grow a buffer without bound.
//! [`LineParser`] is fed whatever bytes a non-blocking read produced and
//! hands back zero or more complete lines each time, carrying any partial
//! line across calls.

use raptor_core::LineClass;

/// Default max buffered line length before a line is force-cut with
/// [`LineClass::Continued`].
pub const DEFAULT_MAX_LINE_LEN: usize = 160;

/// Incremental line splitter. Not `Clone`: each stream owns one parser for
/// its lifetime.
pub struct LineParser {
    max_len: usize,
    buf: String,
    /// Set after a bare `\r` until the next character (possibly in a later
    /// `feed` call) settles whether it was a CRLF pair or a standalone `\r`.
    pending_cr: bool,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineParser {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            buf: String::new(),
            pending_cr: false,
        }
    }

    /// Feed newly read text, returning every line it completes.
    ///
    /// A line is completed by `\n` (an immediately preceding `\r` is
    /// absorbed into the same line, emitted as [`LineClass::Newline`]), by a
    /// bare `\r` not followed by `\n`, or by hitting `max_len`. Because a
    /// `\r` at the end of a chunk might turn out to be the first half of a
    /// CRLF pair split across two reads, its classification is deferred
    /// until the next character arrives (here or in a later `feed` call).
    pub fn feed(&mut self, chunk: &str) -> Vec<(LineClass, String)> {
        let mut out = Vec::new();
        for ch in chunk.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if ch == '\n' {
                    out.push((LineClass::Newline, std::mem::take(&mut self.buf)));
                    continue;
                }
                out.push((LineClass::CarriageReturn, std::mem::take(&mut self.buf)));
                // fall through: `ch` itself still needs processing below
            }
            match ch {
                '\n' => out.push((LineClass::Newline, std::mem::take(&mut self.buf))),
                '\r' => self.pending_cr = true,
                _ => {
                    self.buf.push(ch);
                    if self.buf.chars().count() >= self.max_len {
                        out.push((LineClass::Continued, std::mem::take(&mut self.buf)));
                    }
                }
            }
        }
        out
    }

    /// Flush whatever's left in the buffer (e.g. on stream close). A
    /// still-pending bare `\r` is resolved as [`LineClass::CarriageReturn`];
    /// anything else left over is tagged [`LineClass::Continued`] since it
    /// never saw a terminator. Returns `None` if there's nothing buffered.
    pub fn flush(&mut self) -> Option<(LineClass, String)> {
        if self.pending_cr {
            self.pending_cr = false;
            return Some((LineClass::CarriageReturn, std::mem::take(&mut self.buf)));
        }
        if self.buf.is_empty() {
            None
        } else {
            Some((LineClass::Continued, std::mem::take(&mut self.buf)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline() {
        let mut p = LineParser::default();
        let lines = p.feed("hello\nworld\n");
        assert_eq!(
            lines,
            vec![
                (LineClass::Newline, "hello".to_string()),
                (LineClass::Newline, "world".to_string()),
            ]
        );
    }

    #[test]
    fn partial_line_carries_across_feed_calls() {
        let mut p = LineParser::default();
        assert!(p.feed("hel").is_empty());
        let lines = p.feed("lo\n");
        assert_eq!(lines, vec![(LineClass::Newline, "hello".to_string())]);
    }

    #[test]
    fn bare_carriage_return_is_deferred_until_the_next_char() {
        let mut p = LineParser::default();
        // A trailing `\r` might still turn into CRLF on the next read, so
        // nothing is emitted until that's resolved.
        assert!(p.feed("progress 50%\r").is_empty());
        let lines = p.feed("x");
        assert_eq!(
            lines,
            vec![(LineClass::CarriageReturn, "progress 50%".to_string())]
        );
    }

    #[test]
    fn bare_carriage_return_resolved_by_flush() {
        let mut p = LineParser::default();
        assert!(p.feed("progress 50%\r").is_empty());
        assert_eq!(
            p.flush(),
            Some((LineClass::CarriageReturn, "progress 50%".to_string()))
        );
    }

    #[test]
    fn crlf_collapses_into_a_single_newline_line() {
        let mut p = LineParser::default();
        let lines = p.feed("ab\r\n");
        assert_eq!(lines, vec![(LineClass::Newline, "ab".to_string())]);
    }

    #[test]
    fn crlf_split_across_feed_calls_still_collapses() {
        let mut p = LineParser::default();
        assert!(p.feed("ab\r").is_empty());
        let lines = p.feed("\n");
        assert_eq!(lines, vec![(LineClass::Newline, "ab".to_string())]);
    }

    #[test]
    fn bare_cr_then_newline_emits_two_lines() {
        let mut p = LineParser::default();
        let lines = p.feed("ab\rcd\n");
        assert_eq!(
            lines,
            vec![
                (LineClass::CarriageReturn, "ab".to_string()),
                (LineClass::Newline, "cd".to_string()),
            ]
        );
    }

    #[test]
    fn max_len_3_force_cuts_abc_as_continued() {
        let mut p = LineParser::new(3);
        let lines = p.feed("abc");
        assert_eq!(lines, vec![(LineClass::Continued, "abc".to_string())]);
    }

    #[test]
    fn max_len_force_cuts_with_continued_class() {
        let mut p = LineParser::new(5);
        let lines = p.feed("abcdefgh");
        assert_eq!(lines, vec![(LineClass::Continued, "abcde".to_string())]);
        // remaining 3 chars ("fgh") still buffered, not yet emitted
        let flushed = p.flush();
        assert_eq!(flushed, Some((LineClass::Continued, "fgh".to_string())));
    }

    #[test]
    fn flush_on_empty_buffer_is_none() {
        let mut p = LineParser::default();
        p.feed("done\n");
        assert_eq!(p.flush(), None);
    }

    #[test]
    fn flush_returns_trailing_unterminated_text() {
        let mut p = LineParser::default();
        p.feed("trailing");
        assert_eq!(p.flush(), Some((LineClass::Continued, "trailing".to_string())));
    }
}
