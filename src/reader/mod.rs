//! Tag Event Source
//!
//! Turns the export's byte stream into open/close tag events, in document
//! order, without materializing the tree:
//!
//! ```text
//! Read ---> StreamingReader ---> TagHandler::{open_tag, close_tag, text}
//!               (chunks)             (push, one event at a time)
//! ```

pub mod events;
pub mod streaming;

pub use events::{Attributes, TagEvent, TagHandler};
pub use streaming::{read_document, read_slice, StreamingReader, DEFAULT_CHUNK_SIZE};
