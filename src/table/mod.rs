//! Columnar Table Builder
//!
//! A [`Table`] accumulates every row observed for one normalized type.
//! Columns are discovered while reading: the header grows append-only, and
//! a column's index never changes once assigned.
//!
//! Rows are kept as sparse `column -> cell` mappings and are only projected
//! to positional arrays when serialized, so adding a column late never
//! disturbs rows that were written before it existed.

pub mod dedup;

use std::collections::HashMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

pub use dedup::{DedupDictionary, DedupId};

/// Delimiter of the CSV encoding
pub const CSV_DELIMITER: char = ',';
/// Stored in place of [`CSV_DELIMITER`] inside string values
pub const DELIMITER_SUBSTITUTE: char = '|';

/// Header of a per-sample sub-table
pub const TIME_SERIES_HEADER: [&str; 3] = ["Date", "Time", "Value"];

/// One stored value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Int(i64),
    Id(DedupId),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The float as an integer when it has no fractional part
    fn integral(n: f64) -> Option<i64> {
        const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
        (n.fract() == 0.0 && n.abs() <= MAX_EXACT).then_some(n as i64)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => match Cell::integral(*n) {
                Some(i) => write!(f, "{i}"),
                None => write!(f, "{n}"),
            },
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Id(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) => match Cell::integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Id(id) => id.serialize(serializer),
        }
    }
}

/// Sparse row: the cells written so far, keyed by column index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(usize, Cell)>,
}

impl Row {
    pub fn get(&self, column: usize) -> Option<&Cell> {
        self.cells.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    fn set(&mut self, column: usize, cell: Cell) {
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = cell,
            None => self.cells.push((column, cell)),
        }
    }

    /// Positional width: one past the highest written column
    pub fn width(&self) -> usize {
        self.cells.iter().map(|(c, _)| c + 1).max().unwrap_or(0)
    }

    /// Positional projection, with `None` for columns never written
    pub fn project(&self) -> Vec<Option<&Cell>> {
        let mut out = vec![None; self.width()];
        for (column, cell) in &self.cells {
            out[*column] = Some(cell);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Rows and columns for one record type
#[derive(Debug, Clone, Default)]
pub struct Table {
    header: Vec<String>,
    columns: HashMap<String, usize>,
    rows: Vec<Row>,
    dedup: DedupDictionary,
    time_series: Option<Box<Table>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table whose header is fixed up front
    pub fn with_header<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Table::new();
        for column in columns {
            table.column_index(column.into());
        }
        table
    }

    /// Append an empty row; subsequent writes land in it
    pub fn push_row(&mut self) {
        self.rows.push(Row::default());
    }

    /// Write `value` to `column` of the current row.
    ///
    /// An absent value creates no column and writes nothing. Text has the
    /// CSV delimiter substituted and, with `dedup`, is replaced by its id.
    pub fn set_column(&mut self, column: &str, value: Option<Cell>, dedup: bool) {
        let Some(value) = value else {
            return;
        };
        if self.rows.is_empty() {
            debug_assert!(false, "set_column('{column}') before push_row");
            return;
        }

        let cell = match value {
            Cell::Text(s) => {
                let s = substitute_delimiter(s);
                if dedup {
                    Cell::Id(self.dedup.lookup(&s))
                } else {
                    Cell::Text(s)
                }
            }
            other => other,
        };

        let index = self.column_index_str(column);
        if let Some(row) = self.rows.last_mut() {
            row.set(index, cell);
        }
    }

    /// Index of `name`, appending it to the header when unseen
    pub fn column_index(&mut self, name: String) -> usize {
        if let Some(&index) = self.columns.get(&name) {
            return index;
        }
        let index = self.header.len();
        self.header.push(name.clone());
        self.columns.insert(name, index);
        index
    }

    fn column_index_str(&mut self, name: &str) -> usize {
        match self.columns.get(name) {
            Some(&index) => index,
            None => self.column_index(name.to_string()),
        }
    }

    /// Append one per-sample row to the lazily created sub-table
    pub fn push_sample(&mut self, date: Option<&str>, time: Option<&str>, value: f64) {
        let series = self
            .time_series
            .get_or_insert_with(|| Box::new(Table::with_header(TIME_SERIES_HEADER)));
        series.push_row();
        series.set_column(TIME_SERIES_HEADER[0], date.map(Cell::text), false);
        series.set_column(TIME_SERIES_HEADER[1], time.map(Cell::text), false);
        series.set_column(TIME_SERIES_HEADER[2], Some(Cell::Number(value)), false);
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row` for the named column
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column(column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn dedup(&self) -> &DedupDictionary {
        &self.dedup
    }

    pub fn time_series(&self) -> Option<&Table> {
        self.time_series.as_deref()
    }

    /// Cell with dedup ids resolved back to their original text
    pub fn resolve<'a>(&'a self, cell: &'a Cell) -> Option<&'a str> {
        match cell {
            Cell::Id(id) => self.dedup.resolve(*id),
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Replace the CSV delimiter inside a string value
pub fn substitute_delimiter(value: String) -> String {
    if value.contains(CSV_DELIMITER) {
        value.replace(CSV_DELIMITER, &DELIMITER_SUBSTITUTE.to_string())
    } else {
        value
    }
}

/// Positional row view used for serialization
struct Projected<'a>(&'a Row);

impl Serialize for Projected<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let cells = self.0.project();
        let mut seq = serializer.serialize_seq(Some(cells.len()))?;
        for cell in cells {
            seq.serialize_element(&cell)?;
        }
        seq.end()
    }
}

struct Values<'a>(&'a [Row]);

impl Serialize for Values<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(Projected))
    }
}

impl Table {
    /// Serialize the table fields into an already open map, so that
    /// wrappers can append their own entries.
    pub(crate) fn serialize_fields<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("header", &self.header)?;
        map.serialize_entry("values", &Values(&self.rows))?;
        map.serialize_entry("abbr", &self.dedup)?;
        if let Some(series) = &self.time_series {
            map.serialize_entry("timeSeries", series.as_ref())?;
        }
        Ok(())
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.serialize_fields(&mut map)?;
        map.end()
    }
}
