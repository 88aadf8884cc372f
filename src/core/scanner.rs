//! SIMD-accelerated markup scanning using memchr
//!
//! The scanner is a cursor over a buffered window of the export. It never
//! owns data: the streaming reader hands it whatever bytes are currently
//! buffered and asks how far it can get.

use memchr::{memchr, memmem};

/// Cursor for XML delimiter detection
pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given input
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Get remaining bytes
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Get a slice from start to end positions
    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.input[start..end]
    }

    /// Peek at current byte without advancing
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peek at byte at offset from current position
    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Find next '<' (tag start) using SIMD
    #[inline]
    pub fn find_tag_start(&self) -> Option<usize> {
        memchr(b'<', &self.input[self.pos..]).map(|i| self.pos + i)
    }

    /// Find tag end while handling quotes properly
    /// Returns the position of '>' that is not inside quotes
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let mut in_single_quote = false;
        let mut in_double_quote = false;

        for (offset, &b) in self.input[self.pos..].iter().enumerate() {
            match b {
                b'"' if !in_single_quote => in_double_quote = !in_double_quote,
                b'\'' if !in_double_quote => in_single_quote = !in_single_quote,
                b'>' if !in_single_quote && !in_double_quote => return Some(self.pos + offset),
                _ => {}
            }
        }
        None
    }

    /// Find the next occurrence of a multi-byte terminator such as `-->`
    #[inline]
    pub fn find_sequence(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(&self.input[self.pos..], needle).map(|i| self.pos + i)
    }

    /// Find the '>' that closes a DOCTYPE, skipping its internal subset.
    ///
    /// Quoted literals and comments inside the subset may contain '>' and
    /// brackets, so both are stepped over.
    pub fn find_doctype_end(&self) -> Option<usize> {
        let input = self.input;
        let mut pos = self.pos;
        let mut depth = 0usize;

        while pos < input.len() {
            match input[pos] {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'"' | b'\'' => {
                    let quote = input[pos];
                    pos += 1 + memchr(quote, &input[pos + 1..])?;
                }
                b'<' if input[pos..].starts_with(b"<!--") => {
                    pos += 4 + memmem::find(&input[pos + 4..], b"-->")? + 2;
                }
                b'>' if depth == 0 => return Some(pos),
                _ => {}
            }
            pos += 1;
        }
        None
    }

    /// Check if input starts with a byte sequence at current position
    #[inline]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.input[self.pos..].starts_with(needle)
    }
}

/// Check if byte is valid XML name start character
/// Allows ASCII letters, underscore, colon, and non-ASCII (UTF-8 Unicode)
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

/// Check if byte is valid XML name character
#[inline]
pub fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}
