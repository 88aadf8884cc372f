//! Per-field attribute transformations
//!
//! Each output column is described by a [`FieldSpec`]: which attribute it
//! reads, how the raw string is transformed, and whether its absence is a
//! problem worth reporting.

use chrono::{DateTime, FixedOffset};

use super::diagnostics::{Diagnostic, Diagnostics};
use crate::reader::TagEvent;
use crate::table::{Cell, Table};

/// Attribute every relative offset is measured from
pub const START_DATE: &str = "startDate";

/// Format used by the export for timestamps, e.g. `2019-10-09 19:14:38 -0700`
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Raw string, verbatim
    Copy,
    /// Parsed as a number
    Number,
    /// Milliseconds relative to `startDate`
    Offset,
    /// Replaced by a dedup id
    Lookup,
    /// Number when numeric, otherwise a dedup id for the symbolic value
    Measure,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub attribute: &'static str,
    pub column: &'static str,
    pub transform: Transform,
    pub required: bool,
}

const fn field(attribute: &'static str, transform: Transform, required: bool) -> FieldSpec {
    FieldSpec {
        attribute,
        column: attribute,
        transform,
        required,
    }
}

/// Columns of a `<Record>` or `<Correlation>` row
pub const RECORD_FIELDS: &[FieldSpec] = &[
    field("unit", Transform::Copy, false),
    field("startDate", Transform::Copy, true),
    field("endDate", Transform::Offset, true),
    field("creationDate", Transform::Offset, false),
    field("sourceName", Transform::Lookup, true),
    field("sourceVersion", Transform::Copy, false),
    field("device", Transform::Lookup, false),
    field("value", Transform::Measure, false),
];

/// Columns of a `<Workout>` row
pub const WORKOUT_FIELDS: &[FieldSpec] = &[
    field("startDate", Transform::Copy, true),
    field("endDate", Transform::Offset, true),
    field("creationDate", Transform::Offset, false),
    field("duration", Transform::Number, false),
    field("durationUnit", Transform::Copy, false),
    field("totalDistance", Transform::Number, false),
    field("totalDistanceUnit", Transform::Copy, false),
    field("totalEnergyBurned", Transform::Number, false),
    field("totalEnergyBurnedUnit", Transform::Copy, false),
    field("sourceName", Transform::Lookup, true),
    field("sourceVersion", Transform::Copy, false),
    field("device", Transform::Lookup, false),
];

/// Known keys of a `<WorkoutRoute>`, written before any other attribute
pub const ROUTE_FIELDS: &[FieldSpec] = &[
    field("sourceName", Transform::Copy, true),
    field("sourceVersion", Transform::Copy, false),
    field("startDate", Transform::Copy, true),
    field("endDate", Transform::Offset, true),
    field("creationDate", Transform::Offset, false),
];

/// Result of transforming one attribute
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Copied or parsed straight from the attribute
    Direct(Cell),
    /// Computed from this and another attribute
    Derived(Cell),
    /// To be replaced by a dedup id
    Lookup(String),
}

impl FieldValue {
    /// The cell to store and whether it goes through the dedup dictionary
    pub fn into_cell(self) -> (Cell, bool) {
        match self {
            FieldValue::Direct(cell) | FieldValue::Derived(cell) => (cell, false),
            FieldValue::Lookup(s) => (Cell::Text(s), true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    Missing,
    Malformed(String),
}

/// Parse an export timestamp (RFC 3339 or `%Y-%m-%d %H:%M:%S %z`)
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, EXPORT_DATE_FORMAT))
        .ok()
}

/// Parse a finite number
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Transform one attribute of `tag`.
///
/// `start` is the already parsed `startDate`; offsets are skipped without a
/// further report when it is unavailable.
pub fn extract(
    spec: &FieldSpec,
    tag: &TagEvent,
    start: Option<&DateTime<FixedOffset>>,
) -> Result<Option<FieldValue>, FieldError> {
    let Some(raw) = tag.attr(spec.attribute) else {
        return if spec.required {
            Err(FieldError::Missing)
        } else {
            Ok(None)
        };
    };

    let value = match spec.transform {
        Transform::Copy => FieldValue::Direct(Cell::text(raw)),
        Transform::Lookup => FieldValue::Lookup(raw.to_string()),
        Transform::Number => match parse_number(raw) {
            Some(n) => FieldValue::Direct(Cell::Number(n)),
            None => return Err(FieldError::Malformed(raw.to_string())),
        },
        Transform::Measure => match parse_number(raw) {
            Some(n) => FieldValue::Direct(Cell::Number(n)),
            None => FieldValue::Lookup(raw.to_string()),
        },
        Transform::Offset => {
            let Some(date) = parse_date(raw) else {
                return Err(FieldError::Malformed(raw.to_string()));
            };
            let Some(start) = start else {
                return Ok(None);
            };
            FieldValue::Derived(Cell::Int((date - *start).num_milliseconds()))
        }
    };
    Ok(Some(value))
}

/// Parse `startDate`, reporting a malformed value. Absence is reported by
/// the field that requires it.
pub fn start_date(tag: &TagEvent, diagnostics: &mut Diagnostics) -> Option<DateTime<FixedOffset>> {
    let raw = tag.attr(START_DATE)?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        diagnostics.report(Diagnostic::malformed_value(&tag.name, START_DATE, raw));
    }
    parsed
}

/// Transform every field of `specs`, reporting problems and handing each
/// successful value to `sink`
pub fn apply<F>(specs: &[FieldSpec], tag: &TagEvent, diagnostics: &mut Diagnostics, mut sink: F)
where
    F: FnMut(&'static str, FieldValue),
{
    let start = start_date(tag, diagnostics);
    for spec in specs {
        match extract(spec, tag, start.as_ref()) {
            Ok(Some(value)) => sink(spec.column, value),
            Ok(None) => {}
            Err(FieldError::Missing) => {
                diagnostics.report(Diagnostic::missing_attribute(&tag.name, spec.attribute))
            }
            Err(FieldError::Malformed(raw)) => {
                diagnostics.report(Diagnostic::malformed_value(&tag.name, spec.attribute, &raw))
            }
        }
    }
}

/// Fill the current row of `table` from `tag`
pub fn populate(
    table: &mut Table,
    specs: &[FieldSpec],
    tag: &TagEvent,
    diagnostics: &mut Diagnostics,
) {
    apply(specs, tag, diagnostics, |column, value| {
        let (cell, dedup) = value.into_cell();
        table.set_column(column, Some(cell), dedup);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Attributes;

    fn tag(attrs: &[(&str, &str)]) -> TagEvent {
        TagEvent::new("Record", attrs.iter().copied().collect::<Attributes>())
    }

    #[test]
    fn test_parse_date_formats() {
        let a = parse_date("2024-01-01T00:00:00Z").unwrap();
        let b = parse_date("2023-12-31 17:00:00 -0700").unwrap();
        assert_eq!(a, b);
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_offsets_relative_to_start() {
        let t = tag(&[
            ("startDate", "2024-01-01T00:00:05Z"),
            ("endDate", "2024-01-01T00:00:10Z"),
            ("creationDate", "2024-01-01T00:00:00Z"),
        ]);
        let start = parse_date("2024-01-01T00:00:05Z");
        let end = extract(&RECORD_FIELDS[2], &t, start.as_ref()).unwrap();
        let created = extract(&RECORD_FIELDS[3], &t, start.as_ref()).unwrap();
        assert_eq!(end, Some(FieldValue::Derived(Cell::Int(5000))));
        assert_eq!(created, Some(FieldValue::Derived(Cell::Int(-5000))));
    }

    #[test]
    fn test_required_vs_optional_absence() {
        let t = tag(&[]);
        let source = RECORD_FIELDS.iter().find(|f| f.attribute == "sourceName").unwrap();
        let unit = RECORD_FIELDS.iter().find(|f| f.attribute == "unit").unwrap();
        assert_eq!(extract(source, &t, None), Err(FieldError::Missing));
        assert_eq!(extract(unit, &t, None), Ok(None));
    }

    #[test]
    fn test_measure_keeps_symbolic_values() {
        let value = RECORD_FIELDS.iter().find(|f| f.attribute == "value").unwrap();
        let numeric = tag(&[("value", "72")]);
        let symbolic = tag(&[("value", "HKCategoryValueSleepAnalysisInBed")]);
        assert_eq!(
            extract(value, &numeric, None),
            Ok(Some(FieldValue::Direct(Cell::Number(72.0))))
        );
        assert_eq!(
            extract(value, &symbolic, None),
            Ok(Some(FieldValue::Lookup("HKCategoryValueSleepAnalysisInBed".into())))
        );
    }

    #[test]
    fn test_malformed_number() {
        let duration = WORKOUT_FIELDS.iter().find(|f| f.attribute == "duration").unwrap();
        let t = tag(&[("duration", "NaN")]);
        assert_eq!(extract(duration, &t, None), Err(FieldError::Malformed("NaN".into())));
    }

    #[test]
    fn test_populate_reports_and_keeps_partial_row() {
        let mut table = Table::new();
        let mut diags = Diagnostics::default();
        table.push_row();
        let t = tag(&[
            ("type", "HKQuantityTypeIdentifierHeartRate"),
            ("startDate", "2024-01-01T00:00:00Z"),
            ("endDate", "garbage"),
            ("value", "72"),
        ]);
        populate(&mut table, RECORD_FIELDS, &t, &mut diags);

        assert_eq!(table.header(), ["startDate", "value"]);
        assert_eq!(diags.malformed_values, 1);
        assert_eq!(diags.missing_attributes, 1);
    }
}
