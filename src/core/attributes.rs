//! XML Attribute Parsing
//!
//! Parses attributes from the content of a start tag (everything between
//! the element name and `>` or `/>`). Parsing is lenient: stray characters
//! are skipped and unquoted values are accepted, matching what the export
//! tooling has been seen to produce.

use super::entities::decode_text;
use super::scanner::{is_name_char, is_name_start_char, is_whitespace};
use std::borrow::Cow;

/// A parsed XML attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute<'a> {
    /// Attribute name (may include namespace prefix)
    pub name: &'a str,
    /// Attribute value (entities decoded)
    pub value: Cow<'a, str>,
}

/// Parse attributes from raw tag content (after the element name)
pub fn parse_attributes(input: &str) -> Vec<Attribute<'_>> {
    let bytes = input.as_bytes();
    let mut attrs = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        while pos < bytes.len() && is_whitespace(bytes[pos]) {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] == b'/' || bytes[pos] == b'>' {
            break;
        }

        if !is_name_start_char(bytes[pos]) {
            pos += 1;
            continue;
        }

        let name_start = pos;
        while pos < bytes.len() && is_name_char(bytes[pos]) {
            pos += 1;
        }
        let name = &input[name_start..pos];

        while pos < bytes.len() && is_whitespace(bytes[pos]) {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] != b'=' {
            // Attribute without value, e.g. `<x checked>`
            continue;
        }
        pos += 1;
        while pos < bytes.len() && is_whitespace(bytes[pos]) {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let quote = bytes[pos];
        if quote != b'"' && quote != b'\'' {
            let value_start = pos;
            while pos < bytes.len()
                && !is_whitespace(bytes[pos])
                && bytes[pos] != b'/'
                && bytes[pos] != b'>'
            {
                pos += 1;
            }
            attrs.push(Attribute {
                name,
                value: decode_text(&input[value_start..pos]),
            });
            continue;
        }

        pos += 1;
        let value_start = pos;
        while pos < bytes.len() && bytes[pos] != quote {
            pos += 1;
        }
        attrs.push(Attribute {
            name,
            value: decode_text(&input[value_start..pos]),
        });
        if pos < bytes.len() {
            pos += 1;
        }
    }

    attrs
}
