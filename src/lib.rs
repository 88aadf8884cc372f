//! hktables - streaming conversion of health exports into tables
//!
//! Reads an `export.xml` health export strictly sequentially and produces
//! one columnar table per record and workout type, written as JSON and CSV.
//!
//! Layers:
//! - [`core`]: byte scanning, entity decoding, attribute parsing
//! - [`reader`]: chunk-fed tag event source driving a [`TagHandler`]
//! - [`convert`]: stack machine and node dispatch over the export schema
//! - [`table`]: columnar tables with per-table dedup dictionaries
//! - [`export`]: JSON and CSV artifacts
//!
//! ```no_run
//! use hktables::{convert_file, export, ConvertConfig};
//!
//! let config = ConvertConfig::default();
//! let conversion = convert_file("export.xml".as_ref(), config.chunk_size)?;
//! export::write_all(&conversion.health, &config)?;
//! # Ok::<(), hktables::ConvertError>(())
//! ```

pub mod config;
pub mod convert;
pub mod core;
pub mod error;
pub mod export;
pub mod memory;
pub mod reader;
pub mod table;

pub use config::ConvertConfig;
pub use convert::{
    convert_bytes, convert_file, convert_reader, Conversion, Converter, Diagnostic, Diagnostics,
    HealthData,
};
pub use error::{ConvertError, Result};
pub use reader::{TagEvent, TagHandler};
pub use table::{Cell, DedupDictionary, DedupId, Table};
