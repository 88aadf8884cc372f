//! Table Exporter
//!
//! Writes the finished tables of a run. Per table stem `T`:
//!
//! - `T.json`: `{header, values, abbr, timeSeries?}` (workouts add `events`
//!   and `routes`)
//! - `csv/T.csv`: one `id, value` legend line per dedup id, the header
//!   line, then one line per row
//!
//! plus `healthData.json` for the fields that are not tabular.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ConvertConfig;
use crate::convert::{HealthData, Profile};
use crate::error::{ConvertError, Result};
use crate::table::Table;

pub const HEALTH_DATA_STEM: &str = "healthData";
pub const ACTIVITY_SUMMARIES_STEM: &str = "activitySummaries";
pub const CLINICAL_RECORDS_STEM: &str = "clinicalRecords";

/// Stem of a record table's per-sample sub-table
pub fn samples_stem(kind: &str) -> String {
    format!("{kind}.bpm")
}

pub fn workout_stem(kind: &str) -> String {
    format!("Workout.{kind}")
}

/// Non-tabular contents of `healthData.json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Overview<'a> {
    locale: Option<&'a str>,
    export_date: Option<&'a str>,
    me: Option<&'a Profile>,
    /// Row count per written table stem
    tables: IndexMap<String, usize>,
    unknown_extensions: usize,
    missing_attributes: usize,
    malformed_values: usize,
}

/// Writes artifacts according to a [`ConvertConfig`]
pub struct Exporter<'a> {
    config: &'a ConvertConfig,
    written: Vec<PathBuf>,
}

impl<'a> Exporter<'a> {
    pub fn new(config: &'a ConvertConfig) -> Self {
        Exporter {
            config,
            written: Vec::new(),
        }
    }

    /// Write every table of `health`, then `healthData.json`.
    /// Returns the paths written.
    pub fn write_all(mut self, health: &HealthData) -> Result<Vec<PathBuf>> {
        self.prepare_dirs()?;
        let mut tables = IndexMap::new();

        for (kind, table) in &health.records {
            self.write_table(kind, table, table)?;
            tables.insert(kind.clone(), table.row_count());
            if let Some(series) = table.time_series() {
                let stem = samples_stem(kind);
                self.write_table(&stem, series, series)?;
                tables.insert(stem, series.row_count());
            }
        }

        for (kind, workout) in &health.workouts {
            let stem = workout_stem(kind);
            self.write_table(&stem, workout, &workout.table)?;
            tables.insert(stem, workout.table.row_count());
        }

        for (stem, table) in [
            (ACTIVITY_SUMMARIES_STEM, &health.activity_summaries),
            (CLINICAL_RECORDS_STEM, &health.clinical_records),
        ] {
            if !table.is_empty() {
                self.write_table(stem, table, table)?;
                tables.insert(stem.to_string(), table.row_count());
            }
        }

        if self.config.json {
            let overview = Overview {
                locale: health.locale.as_deref(),
                export_date: health.export_date.as_deref(),
                me: health.me.as_ref(),
                tables,
                unknown_extensions: health.diagnostics.unknown_extensions,
                missing_attributes: health.diagnostics.missing_attributes,
                malformed_values: health.diagnostics.malformed_values,
            };
            let path = self.json_path(HEALTH_DATA_STEM);
            write_json(&path, &overview, self.config.pretty)?;
            self.written.push(path);
        }

        Ok(self.written)
    }

    fn prepare_dirs(&self) -> Result<()> {
        let mut dirs = vec![self.config.output_dir.clone()];
        if self.config.csv {
            dirs.push(self.config.csv_dir());
        }
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;
        }
        Ok(())
    }

    fn json_path(&self, stem: &str) -> PathBuf {
        self.config.output_dir.join(format!("{stem}.json"))
    }

    fn csv_path(&self, stem: &str) -> PathBuf {
        self.config.csv_dir().join(format!("{stem}.csv"))
    }

    /// `document` is what goes into the JSON artifact; `table` feeds the CSV
    fn write_table<T: Serialize>(
        &mut self,
        stem: &str,
        document: &T,
        table: &Table,
    ) -> Result<()> {
        if self.config.json {
            let path = self.json_path(stem);
            write_json(&path, document, self.config.pretty)?;
            self.written.push(path);
        }
        if self.config.csv && !table.is_empty() {
            let path = self.csv_path(stem);
            write_csv(&path, table)?;
            self.written.push(path);
        }
        info!(stem, rows = table.row_count(), columns = table.header().len(), "saved table");
        Ok(())
    }
}

/// Write every artifact of a run
pub fn write_all(health: &HealthData, config: &ConvertConfig) -> Result<Vec<PathBuf>> {
    Exporter::new(config).write_all(health)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let file = File::create(path).map_err(|e| ConvertError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let written = if pretty {
        serde_json::to_writer_pretty(&mut writer, value)
    } else {
        serde_json::to_writer(&mut writer, value)
    };
    written.map_err(|source| ConvertError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| ConvertError::io(path, e))?;
    debug!(path = %path.display(), "wrote json");
    Ok(())
}

pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let file = File::create(path).map_err(|e| ConvertError::io(path, e))?;
    let mut out = BufWriter::new(file);

    // Legend lines are written verbatim, outside csv quoting
    for (id, value) in table.dedup().entries() {
        writeln!(out, "{id}, {value}").map_err(|e| ConvertError::io(path, e))?;
    }

    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
    let csv_err = |source: csv::Error| ConvertError::Csv {
        path: path.to_path_buf(),
        source,
    };
    writer.write_record(table.header()).map_err(csv_err)?;

    let width = table.header().len();
    for row in table.rows() {
        let mut cells = row.project();
        cells.resize(width, None);
        let record = cells
            .into_iter()
            .map(|cell| cell.map(ToString::to_string).unwrap_or_default());
        writer.write_record(record).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| ConvertError::io(path, e))?;
    Ok(())
}
