//! Export Conversion
//!
//! Turns the tag events of a health export into per-type [`Table`]s.
//!
//! ```text
//! TagHandler events --> Converter (stack machine)
//!                           |
//!                           v  handle_child / on_close
//!                         Node --> HealthData { records, workouts, ... }
//! ```

pub mod diagnostics;
pub mod fields;
pub mod machine;
pub mod node;
pub mod schema;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::info;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use machine::Converter;
pub use node::Node;

use crate::error::{ConvertError, Result};
use crate::reader::{read_document, read_slice, Attributes, TagEvent};
use crate::table::{Cell, Table};

/// `<Me>` characteristics, keyed by their short name
const PROFILE_PREFIX: &str = "HKCharacteristicTypeIdentifier";

/// Person profile from `<Me>`
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub date_of_birth: Option<String>,
    pub biological_sex: Option<String>,
    pub blood_type: Option<String>,
    pub fitzpatrick_skin_type: Option<String>,
}

impl Profile {
    pub(crate) fn from_tag(tag: &TagEvent, data: &mut HealthData) -> Self {
        let mut characteristic = |name: &str| {
            let attribute = format!("{PROFILE_PREFIX}{name}");
            let value = tag.attr(&attribute).map(str::to_string);
            if value.is_none() {
                data.diagnostics
                    .report(Diagnostic::missing_attribute(&tag.name, &attribute));
            }
            value
        };
        Profile {
            date_of_birth: characteristic("DateOfBirth"),
            biological_sex: characteristic("BiologicalSex"),
            blood_type: characteristic("BloodType"),
            fitzpatrick_skin_type: characteristic("FitzpatrickSkinType"),
        }
    }
}

/// A workout route: a flat object where the first write of a key wins
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Route(IndexMap<String, Cell>);

impl Route {
    pub fn insert_if_absent(&mut self, key: &str, value: Cell) {
        if !self.0.contains_key(key) {
            self.0.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.0.get(key)
    }
}

/// Rows of one workout type plus its ancillary lists
#[derive(Debug, Clone, Default)]
pub struct WorkoutTable {
    pub table: Table,
    /// `<WorkoutEvent>` attributes, verbatim
    pub events: Vec<Attributes>,
    pub routes: Vec<Route>,
}

impl Serialize for WorkoutTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.table.serialize_fields(&mut map)?;
        map.serialize_entry("events", &self.events)?;
        map.serialize_entry("routes", &self.routes)?;
        map.end()
    }
}

/// Everything collected during one conversion run
#[derive(Debug, Default)]
pub struct HealthData {
    pub locale: Option<String>,
    /// Raw `<ExportDate value>`
    pub export_date: Option<String>,
    pub me: Option<Profile>,
    /// Record and correlation tables, keyed by normalized type
    pub records: IndexMap<String, Table>,
    /// Workout tables, keyed by normalized activity type
    pub workouts: IndexMap<String, WorkoutTable>,
    pub activity_summaries: Table,
    pub clinical_records: Table,
    pub diagnostics: Diagnostics,
    seen_types: HashSet<String>,
}

impl HealthData {
    /// Log a raw type identifier the first time it is seen
    pub(crate) fn note_type(&mut self, kind: &'static str, raw: &str) {
        if !self.seen_types.contains(raw) {
            info!(kind, raw, "found new type");
            self.seen_types.insert(raw.to_string());
        }
    }

    pub(crate) fn workout(&mut self, kind: &str) -> &mut WorkoutTable {
        self.workouts.entry(kind.to_string()).or_default()
    }

    pub fn record(&self, kind: &str) -> Option<&Table> {
        self.records.get(kind)
    }

    /// Distinct raw type identifiers seen so far
    pub fn seen_types(&self) -> usize {
        self.seen_types.len()
    }
}

/// Result of a successful run
#[derive(Debug)]
pub struct Conversion {
    pub health: HealthData,
    pub bytes_read: u64,
}

/// Convert an export from any byte source
pub fn convert_reader<R: Read>(
    source: R,
    chunk_size: usize,
    total_len: Option<u64>,
) -> Result<Conversion> {
    let mut converter = Converter::new();
    let bytes_read = read_document(source, &mut converter, chunk_size, total_len)?;
    Ok(Conversion {
        health: converter.into_data(),
        bytes_read,
    })
}

/// Convert an in-memory export
pub fn convert_bytes(input: &[u8]) -> Result<Conversion> {
    let mut converter = Converter::new();
    read_slice(input, &mut converter)?;
    Ok(Conversion {
        health: converter.into_data(),
        bytes_read: input.len() as u64,
    })
}

/// Convert an export file
pub fn convert_file(path: &Path, chunk_size: usize) -> Result<Conversion> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let total_len = file.metadata().ok().map(|m| m.len());
    info!(path = %path.display(), bytes = ?total_len, "converting export");
    convert_reader(BufReader::new(file), chunk_size, total_len)
}
