//! XML Entity Decoding
//!
//! Handles decoding of XML entities:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - Numeric character references: &#123; &#x7B;
//!
//! Uses Cow for zero-copy when no entities are present, which is the
//! overwhelmingly common case for export attribute values.

use memchr::memchr;
use std::borrow::Cow;

/// Decode text content, handling entity references
///
/// Returns Borrowed if no entities present (zero-copy),
/// returns Owned if entities were decoded.
#[inline]
pub fn decode_text(input: &str) -> Cow<'_, str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(decode_entities(input))
}

/// Decode all entity references in the input.
/// Unknown or unterminated references are kept verbatim.
pub fn decode_entities(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        result.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                result.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                result.push('&');
                rest = &rest[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Decode a single entity (without & and ;)
fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        return decode_numeric_entity(numeric);
    }

    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// Decode a numeric character reference
fn decode_numeric_entity(entity: &str) -> Option<char> {
    let hex = entity.strip_prefix('x').or_else(|| entity.strip_prefix('X'));
    let codepoint = match hex {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => entity.parse::<u32>().ok()?,
    };

    if !is_valid_xml_char(codepoint) {
        return None;
    }
    char::from_u32(codepoint)
}

/// Check if a code point is a valid XML 1.0 Char
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint,
        0x9 | 0xA | 0xD |
        0x20..=0xD7FF |
        0xE000..=0xFFFD |
        0x10000..=0x10FFFF
    )
}
