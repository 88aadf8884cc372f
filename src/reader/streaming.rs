//! Streaming Tag Reader
//!
//! Stateful reader that processes an export in chunks with bounded memory.
//! Every construct that is complete in the buffer is dispatched to the
//! [`TagHandler`] immediately; a construct cut by a chunk boundary stays
//! buffered until the next `feed`.

use std::io::{ErrorKind, Read};

use tracing::debug;

use super::events::{Attributes, TagEvent, TagHandler};
use crate::core::attributes::parse_attributes;
use crate::core::entities::decode_text;
use crate::core::scanner::{is_name_start_char, is_whitespace, Scanner};
use crate::error::{ConvertError, Result};

/// Default read size for [`read_document`]
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of trying to dispatch one construct
enum Step {
    /// Construct dispatched, scanner advanced past it
    Done,
    /// Construct is not complete in the buffer yet
    Incomplete,
}

/// Stateful streaming tag reader
#[derive(Debug, Default)]
pub struct StreamingReader {
    /// Bytes received but not yet dispatched
    buffer: Vec<u8>,
    /// Document offset of `buffer[0]`
    consumed: u64,
    /// Current element depth
    depth: usize,
}

impl StreamingReader {
    pub fn new() -> Self {
        StreamingReader {
            buffer: Vec::with_capacity(DEFAULT_CHUNK_SIZE),
            consumed: 0,
            depth: 0,
        }
    }

    /// Feed a chunk of data, dispatching every complete construct
    pub fn feed<H: TagHandler>(&mut self, chunk: &[u8], handler: &mut H) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        self.process(handler, false)
    }

    /// Signal end of input. Fails if the document stopped mid-markup or
    /// with elements still open.
    pub fn finish<H: TagHandler>(&mut self, handler: &mut H) -> Result<()> {
        self.process(handler, true)?;
        if self.depth > 0 {
            return Err(ConvertError::Truncated {
                detail: format!("{} element(s) still open at end of input", self.depth),
            });
        }
        handler.end()
    }

    /// Get buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Current element depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn process<H: TagHandler>(&mut self, handler: &mut H, at_eof: bool) -> Result<()> {
        let mut cursor = Cursor {
            scanner: Scanner::new(&self.buffer),
            base: self.consumed,
            depth: &mut self.depth,
            at_eof,
        };
        let result = cursor.run(handler);
        let used = cursor.scanner.position();

        self.buffer.drain(..used);
        self.consumed += used as u64;
        result
    }
}

/// Dispatch pass over the currently buffered bytes
struct Cursor<'a, 'd> {
    scanner: Scanner<'a>,
    base: u64,
    depth: &'d mut usize,
    at_eof: bool,
}

impl<'a> Cursor<'a, '_> {
    fn run<H: TagHandler>(&mut self, handler: &mut H) -> Result<()> {
        while !self.scanner.is_eof() {
            let start = self.scanner.position();
            let step = match self.scanner.peek() {
                Some(b'<') => self.markup(handler)?,
                _ => self.text(handler)?,
            };

            if let Step::Incomplete = step {
                self.scanner.set_position(start);
                if self.at_eof {
                    let offset = self.offset(start);
                    return Err(ConvertError::Truncated {
                        detail: format!("unterminated markup at byte offset {offset}"),
                    });
                }
                break;
            }
        }
        Ok(())
    }

    fn offset(&self, pos: usize) -> u64 {
        self.base + pos as u64
    }

    fn utf8(&self, start: usize, end: usize) -> Result<&'a str> {
        let bytes = self.scanner.slice(start, end);
        std::str::from_utf8(bytes).map_err(|e| ConvertError::InvalidUtf8 {
            offset: self.offset(start + e.valid_up_to()),
        })
    }

    /// Whether the buffered remainder could still grow into `pattern`
    fn could_become(&self, pattern: &[u8]) -> bool {
        let rest = self.scanner.remaining();
        !self.at_eof && rest.len() < pattern.len() && pattern.starts_with(rest)
    }

    fn markup<H: TagHandler>(&mut self, handler: &mut H) -> Result<Step> {
        match self.scanner.peek_at(1) {
            None => Ok(Step::Incomplete),
            Some(b'/') => self.end_tag(handler),
            Some(b'?') => self.skip_until(b"?>"),
            Some(b'!') => {
                if self.scanner.starts_with(b"<!--") {
                    self.skip_until(b"-->")
                } else if self.scanner.starts_with(b"<![CDATA[") {
                    self.cdata(handler)
                } else if self.could_become(b"<!--") || self.could_become(b"<![CDATA[") {
                    Ok(Step::Incomplete)
                } else {
                    self.doctype()
                }
            }
            Some(c) if is_name_start_char(c) => self.start_tag(handler),
            Some(_) => {
                // Stray '<' is character data
                self.scanner.advance(1);
                handler.text("<")?;
                Ok(Step::Done)
            }
        }
    }

    fn start_tag<H: TagHandler>(&mut self, handler: &mut H) -> Result<Step> {
        let start = self.scanner.position();
        let Some(end) = self.scanner.find_tag_end_quoted() else {
            return Ok(Step::Incomplete);
        };

        let empty = end > start + 1 && self.scanner.slice(end - 1, end) == b"/";
        let content_end = if empty { end - 1 } else { end };
        let content = self.utf8(start + 1, content_end)?;

        let name_len = content
            .bytes()
            .position(|b| is_whitespace(b) || b == b'/')
            .unwrap_or(content.len());
        let (name, rest) = content.split_at(name_len);

        let attributes: Attributes = parse_attributes(rest)
            .into_iter()
            .map(|a| (a.name, a.value.into_owned()))
            .collect();
        let tag = TagEvent::new(name, attributes);

        self.scanner.set_position(end + 1);
        *self.depth += 1;
        handler.open_tag(&tag)?;
        if empty {
            *self.depth -= 1;
            handler.close_tag(name)?;
        }
        Ok(Step::Done)
    }

    fn end_tag<H: TagHandler>(&mut self, handler: &mut H) -> Result<Step> {
        let start = self.scanner.position();
        let Some(end) = self.scanner.find_tag_end_quoted() else {
            return Ok(Step::Incomplete);
        };
        let name = self.utf8(start + 2, end)?.trim();

        self.scanner.set_position(end + 1);
        if *self.depth == 0 {
            return Err(ConvertError::UnbalancedClose {
                name: name.to_string(),
            });
        }
        *self.depth -= 1;
        handler.close_tag(name)?;
        Ok(Step::Done)
    }

    fn cdata<H: TagHandler>(&mut self, handler: &mut H) -> Result<Step> {
        let start = self.scanner.position();
        self.scanner.advance(b"<![CDATA[".len());
        let Some(end) = self.scanner.find_sequence(b"]]>") else {
            return Ok(Step::Incomplete);
        };
        let content = self.utf8(start + b"<![CDATA[".len(), end)?;
        self.scanner.set_position(end + 3);
        if !content.bytes().all(is_whitespace) {
            handler.text(content)?;
        }
        Ok(Step::Done)
    }

    fn doctype(&mut self) -> Result<Step> {
        match self.scanner.find_doctype_end() {
            Some(end) => {
                self.scanner.set_position(end + 1);
                Ok(Step::Done)
            }
            None => Ok(Step::Incomplete),
        }
    }

    fn skip_until(&mut self, terminator: &[u8]) -> Result<Step> {
        let start = self.scanner.position();
        self.scanner.advance(2);
        match self.scanner.find_sequence(terminator) {
            Some(end) => {
                self.scanner.set_position(end + terminator.len());
                Ok(Step::Done)
            }
            None => {
                self.scanner.set_position(start);
                Ok(Step::Incomplete)
            }
        }
    }

    fn text<H: TagHandler>(&mut self, handler: &mut H) -> Result<Step> {
        let start = self.scanner.position();
        let end = match self.scanner.find_tag_start() {
            Some(end) => end,
            None if self.at_eof => start + self.scanner.remaining().len(),
            None => return Ok(Step::Incomplete),
        };

        let raw = self.scanner.slice(start, end);
        self.scanner.set_position(end);
        if !raw.iter().copied().all(is_whitespace) {
            let text = self.utf8(start, end)?;
            handler.text(&decode_text(text))?;
        }
        Ok(Step::Done)
    }
}

/// Drive a [`StreamingReader`] from any byte source.
///
/// `total_len`, when known, enables progress reporting at debug level.
/// Returns the number of bytes read.
pub fn read_document<R: Read, H: TagHandler>(
    mut source: R,
    handler: &mut H,
    chunk_size: usize,
    total_len: Option<u64>,
) -> Result<u64> {
    let mut reader = StreamingReader::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut read_total = 0u64;
    let mut last_percent = 0u64;

    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ConvertError::Read(e)),
        };
        read_total += n as u64;
        reader.feed(&chunk[..n], handler)?;

        if let Some(total) = total_len.filter(|t| *t > 0) {
            let percent = read_total.saturating_mul(100) / total;
            if percent > last_percent {
                last_percent = percent;
                debug!(percent, bytes = read_total, "reading export");
            }
        }
    }

    reader.finish(handler)?;
    Ok(read_total)
}

/// Dispatch an in-memory document
pub fn read_slice<H: TagHandler>(input: &[u8], handler: &mut H) -> Result<()> {
    let mut reader = StreamingReader::new();
    reader.feed(input, handler)?;
    reader.finish(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test handler that records events as strings
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        ended: bool,
    }

    impl TagHandler for Recorder {
        fn open_tag(&mut self, tag: &TagEvent) -> Result<()> {
            let attrs: Vec<String> = tag
                .attributes
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            self.events.push(format!("<{} {}>", tag.name, attrs.join(" ")));
            Ok(())
        }

        fn close_tag(&mut self, name: &str) -> Result<()> {
            self.events.push(format!("</{name}>"));
            Ok(())
        }

        fn text(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("text:{text}"));
            Ok(())
        }

        fn end(&mut self) -> Result<()> {
            self.ended = true;
            Ok(())
        }
    }

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE HealthData [
<!-- HealthKit Export Version: 11 -->
<!ELEMENT HealthData (ExportDate,Me,(Record|Correlation|Workout|ActivitySummary|ClinicalRecord)*)>
<!ATTLIST HealthData
  locale CDATA #REQUIRED
>
]>
<HealthData locale="en_US">
 <ExportDate value="2024-01-02 10:00:00 -0700"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Hauke&#8217;s Watch" value="72">
  <MetadataEntry key="HKMetadataKeyHeartRateMotionContext" value="1"/>
 </Record>
 <!-- trailing comment with <markup> -->
</HealthData>
"#;

    fn expected() -> Vec<String> {
        vec![
            "<HealthData locale=en_US>".to_string(),
            "<ExportDate value=2024-01-02 10:00:00 -0700>".to_string(),
            "</ExportDate>".to_string(),
            "<Record type=HKQuantityTypeIdentifierHeartRate sourceName=Hauke\u{2019}s Watch value=72>"
                .to_string(),
            "<MetadataEntry key=HKMetadataKeyHeartRateMotionContext value=1>".to_string(),
            "</MetadataEntry>".to_string(),
            "</Record>".to_string(),
            "</HealthData>".to_string(),
        ]
    }

    #[test]
    fn test_whole_document() {
        let mut recorder = Recorder::default();
        read_slice(DOC.as_bytes(), &mut recorder).unwrap();
        assert_eq!(recorder.events, expected());
        assert!(recorder.ended);
    }

    #[test]
    fn test_every_chunk_size_yields_same_events() {
        for size in [1, 2, 3, 7, 16, 64, 1024] {
            let mut recorder = Recorder::default();
            read_document(DOC.as_bytes(), &mut recorder, size, None).unwrap();
            assert_eq!(recorder.events, expected(), "chunk size {size}");
        }
    }

    #[test]
    fn test_partial_tag_stays_buffered() {
        let mut reader = StreamingReader::new();
        let mut recorder = Recorder::default();
        reader.feed(b"<root><Rec", &mut recorder).unwrap();
        assert_eq!(recorder.events.len(), 1);
        assert_eq!(reader.buffer_size(), 4);

        reader.feed(b"ord a=\"1\"/></root>", &mut recorder).unwrap();
        reader.finish(&mut recorder).unwrap();
        assert_eq!(recorder.events[1], "<Record a=1>");
        assert_eq!(recorder.events.len(), 4);
    }

    #[test]
    fn test_text_and_cdata() {
        let mut recorder = Recorder::default();
        read_slice(b"<a> hi &amp; bye <![CDATA[raw <x>]]></a>", &mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec!["<a >", "text: hi & bye ", "text:raw <x>", "</a>"]
        );
    }

    #[test]
    fn test_truncated_document() {
        let mut recorder = Recorder::default();
        let err = read_slice(b"<HealthData><Record type=\"x\"", &mut recorder).unwrap_err();
        assert!(matches!(err, ConvertError::Truncated { .. }));

        let mut recorder = Recorder::default();
        let err = read_slice(b"<HealthData><Record/>", &mut recorder).unwrap_err();
        assert!(matches!(err, ConvertError::Truncated { .. }));
        assert!(!recorder.ended);
    }

    #[test]
    fn test_unbalanced_close() {
        let mut recorder = Recorder::default();
        let err = read_slice(b"<a/></b>", &mut recorder).unwrap_err();
        assert!(matches!(err, ConvertError::UnbalancedClose { name } if name == "b"));
    }

    #[test]
    fn test_invalid_utf8_reports_offset() {
        let mut recorder = Recorder::default();
        let err = read_slice(b"<a x=\"\xff\"/>", &mut recorder).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidUtf8 { offset: 6 }));
    }

    #[test]
    fn test_handler_error_aborts() {
        struct Failing;
        impl TagHandler for Failing {
            fn open_tag(&mut self, tag: &TagEvent) -> Result<()> {
                Err(ConvertError::SchemaViolation {
                    element: tag.name.clone(),
                    position: "test",
                })
            }
            fn close_tag(&mut self, _name: &str) -> Result<()> {
                Ok(())
            }
        }
        let err = read_slice(b"<a/>", &mut Failing).unwrap_err();
        assert!(matches!(err, ConvertError::SchemaViolation { .. }));
    }
}
