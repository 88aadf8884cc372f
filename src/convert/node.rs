//! Node Dispatch
//!
//! One [`Node`] is live per open element. It interprets the element's
//! children according to its structural position and writes what it reads
//! into the run's [`HealthData`].

use tracing::debug;

use super::diagnostics::Diagnostic;
use super::fields::{self, parse_date, parse_number, RECORD_FIELDS, ROUTE_FIELDS, WORKOUT_FIELDS};
use super::schema::{
    classify_record, classify_workout, ChildSet, CorrelationChild, HealthDataChild, RecordChild,
    RootChild, RouteChild, SampleListChild, WorkoutChild,
};
use super::{HealthData, Profile, Route};
use crate::error::{ConvertError, Result};
use crate::reader::TagEvent;
use crate::table::Cell;

/// Deduplicated columns of a `<ClinicalRecord>` row
const CLINICAL_LOOKUPS: [&str; 2] = ["sourceName", "fhirVersion"];

/// An open `<Record>` or `<Correlation>`, or the sample list nested in one
#[derive(Debug, Clone, PartialEq)]
pub struct RecordNode {
    /// Normalized type, the key of its table
    pub kind: String,
    /// Raw `startDate`, repeated on each per-sample row
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutNode {
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Root,
    HealthData,
    ExportDate,
    Profile,
    Record(RecordNode),
    Correlation(RecordNode),
    SampleList(RecordNode),
    Workout(WorkoutNode),
    WorkoutRoute(Route),
    /// Leaf or skipped subtree; every descendant is ignored
    Skip,
}

impl Node {
    /// Interpret `tag` as a child of this node and return the node for it.
    ///
    /// An error is fatal for the whole run.
    pub fn handle_child(&mut self, tag: &TagEvent, data: &mut HealthData) -> Result<Node> {
        match self {
            Node::Root => match rigid_child::<RootChild>(tag)? {
                RootChild::HealthData => {
                    data.locale = required(tag, "locale", data).map(str::to_string);
                    Ok(Node::HealthData)
                }
            },
            Node::HealthData => {
                let Some(child) = open_child::<HealthDataChild>(tag, data) else {
                    return Ok(Node::Skip);
                };
                match child {
                    HealthDataChild::ExportDate => {
                        open_export_date(tag, data);
                        Ok(Node::ExportDate)
                    }
                    HealthDataChild::Me => {
                        data.me = Some(Profile::from_tag(tag, data));
                        Ok(Node::Profile)
                    }
                    HealthDataChild::Record => open_record(tag, "record", data).map(Node::Record),
                    HealthDataChild::Correlation => {
                        open_record(tag, "correlation", data).map(Node::Correlation)
                    }
                    HealthDataChild::Workout => open_workout(tag, data).map(Node::Workout),
                    HealthDataChild::ActivitySummary => {
                        open_activity_summary(tag, data);
                        Ok(Node::Skip)
                    }
                    HealthDataChild::ClinicalRecord => {
                        open_clinical_record(tag, data);
                        Ok(Node::Skip)
                    }
                }
            }
            Node::ExportDate => Err(violation(tag, "ExportDate")),
            Node::Profile => Err(violation(tag, "Me")),
            Node::Record(record) => match open_child::<RecordChild>(tag, data) {
                Some(RecordChild::MetadataEntry) => {
                    metadata_column(&record.kind, tag, data);
                    Ok(Node::Skip)
                }
                Some(RecordChild::HeartRateVariabilityMetadataList) => {
                    Ok(Node::SampleList(record.clone()))
                }
                None => Ok(Node::Skip),
            },
            Node::Correlation(record) => match open_child::<CorrelationChild>(tag, data) {
                Some(CorrelationChild::MetadataEntry) => {
                    metadata_column(&record.kind, tag, data);
                    Ok(Node::Skip)
                }
                // repeated as top-level records
                Some(CorrelationChild::Record) | None => Ok(Node::Skip),
            },
            Node::SampleList(record) => {
                if let Some(SampleListChild::InstantaneousBeatsPerMinute) =
                    open_child::<SampleListChild>(tag, data)
                {
                    push_sample(record, tag, data);
                }
                Ok(Node::Skip)
            }
            Node::Workout(workout) => {
                match open_child::<WorkoutChild>(tag, data) {
                    Some(WorkoutChild::MetadataEntry) => {
                        if let Some((key, value)) = metadata_entry(tag, data) {
                            let table = &mut data.workout(&workout.kind).table;
                            table.set_column(key, Some(Cell::text(value)), false);
                        }
                    }
                    Some(WorkoutChild::WorkoutEvent) => {
                        data.workout(&workout.kind)
                            .events
                            .push(tag.attributes.clone());
                    }
                    Some(WorkoutChild::WorkoutRoute) => {
                        return Ok(Node::WorkoutRoute(open_route(tag, data)));
                    }
                    None => {}
                }
                Ok(Node::Skip)
            }
            Node::WorkoutRoute(route) => {
                match open_child::<RouteChild>(tag, data) {
                    Some(RouteChild::MetadataEntry) => {
                        if let Some((key, value)) = metadata_entry(tag, data) {
                            route.insert_if_absent(key, Cell::text(value));
                        }
                    }
                    Some(RouteChild::FileReference) => {
                        if let Some(path) = required(tag, "path", data) {
                            route.insert_if_absent("FileReference", Cell::text(path));
                        }
                    }
                    None => {}
                }
                Ok(Node::Skip)
            }
            Node::Skip => Ok(Node::Skip),
        }
    }

    /// Flush state aggregated by this node into its parent, once the
    /// element's close tag has been seen
    pub fn on_close(self, parent: &Node, data: &mut HealthData) {
        if let (Node::WorkoutRoute(route), Node::Workout(workout)) = (self, parent) {
            data.workout(&workout.kind).routes.push(route);
        }
    }
}

fn violation(tag: &TagEvent, position: &'static str) -> ConvertError {
    ConvertError::SchemaViolation {
        element: tag.name.clone(),
        position,
    }
}

/// Child at a rigid position: anything unknown is fatal
fn rigid_child<C: ChildSet>(tag: &TagEvent) -> Result<C> {
    C::from_name(&tag.name).ok_or_else(|| violation(tag, C::POSITION))
}

/// Child at an open position: anything unknown is reported and skipped
fn open_child<C: ChildSet>(tag: &TagEvent, data: &mut HealthData) -> Option<C> {
    let child = C::from_name(&tag.name);
    if child.is_none() {
        data.diagnostics
            .report(Diagnostic::unknown_extension(&tag.name, C::POSITION));
    }
    child
}

fn required<'t>(tag: &'t TagEvent, attribute: &str, data: &mut HealthData) -> Option<&'t str> {
    let value = tag.attr(attribute);
    if value.is_none() {
        data.diagnostics
            .report(Diagnostic::missing_attribute(&tag.name, attribute));
    }
    value
}

fn metadata_entry<'t>(tag: &'t TagEvent, data: &mut HealthData) -> Option<(&'t str, &'t str)> {
    let key = required(tag, "key", data);
    let value = required(tag, "value", data);
    key.zip(value)
}

fn metadata_column(kind: &str, tag: &TagEvent, data: &mut HealthData) {
    if let Some((key, value)) = metadata_entry(tag, data) {
        if let Some(table) = data.records.get_mut(kind) {
            table.set_column(key, Some(Cell::text(value)), false);
        }
    }
}

fn open_export_date(tag: &TagEvent, data: &mut HealthData) {
    let Some(value) = required(tag, "value", data) else {
        return;
    };
    if parse_date(value).is_none() {
        data.diagnostics
            .report(Diagnostic::malformed_value(&tag.name, "value", value));
    }
    data.export_date = Some(value.to_string());
}

/// Classify a record or correlation and start its row
fn open_record(tag: &TagEvent, kind: &'static str, data: &mut HealthData) -> Result<RecordNode> {
    let raw = tag.attr("type").unwrap_or_default();
    data.note_type(kind, raw);
    let normalized = classify_record(raw).ok_or_else(|| ConvertError::UnclassifiedType {
        kind,
        raw: raw.to_string(),
    })?;

    let table = data.records.entry(normalized.to_string()).or_default();
    table.push_row();
    fields::populate(table, RECORD_FIELDS, tag, &mut data.diagnostics);

    Ok(RecordNode {
        kind: normalized.to_string(),
        start_date: tag.attr(fields::START_DATE).map(str::to_string),
    })
}

fn open_workout(tag: &TagEvent, data: &mut HealthData) -> Result<WorkoutNode> {
    let raw = tag.attr("workoutActivityType").unwrap_or_default();
    data.note_type("workout", raw);
    let normalized = classify_workout(raw).ok_or_else(|| ConvertError::UnclassifiedType {
        kind: "workout",
        raw: raw.to_string(),
    })?;

    let workout = data.workouts.entry(normalized.to_string()).or_default();
    workout.table.push_row();
    fields::populate(&mut workout.table, WORKOUT_FIELDS, tag, &mut data.diagnostics);

    Ok(WorkoutNode {
        kind: normalized.to_string(),
    })
}

/// Known route fields first, then every other attribute not already set
fn open_route(tag: &TagEvent, data: &mut HealthData) -> Route {
    let mut route = Route::default();
    fields::apply(ROUTE_FIELDS, tag, &mut data.diagnostics, |column, value| {
        route.insert_if_absent(column, value.into_cell().0);
    });
    for (name, value) in tag.attributes.iter() {
        route.insert_if_absent(name, Cell::text(value));
    }
    route
}

fn push_sample(record: &RecordNode, tag: &TagEvent, data: &mut HealthData) {
    let Some(bpm) = tag.attr("bpm").and_then(parse_number) else {
        debug!(element = %tag.name, "dropping non-numeric sample");
        return;
    };
    if let Some(table) = data.records.get_mut(&record.kind) {
        table.push_sample(record.start_date.as_deref(), tag.attr("time"), bpm);
    }
}

fn open_activity_summary(tag: &TagEvent, data: &mut HealthData) {
    let table = &mut data.activity_summaries;
    table.push_row();
    for (name, value) in tag.attributes.iter() {
        table.set_column(name, Some(Cell::text(value)), false);
    }
}

fn open_clinical_record(tag: &TagEvent, data: &mut HealthData) {
    let table = &mut data.clinical_records;
    table.push_row();
    for (name, value) in tag.attributes.iter() {
        let dedup = CLINICAL_LOOKUPS.contains(&name);
        table.set_column(name, Some(Cell::text(value)), dedup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Attributes;

    fn tag(name: &str, attrs: &[(&str, &str)]) -> TagEvent {
        TagEvent::new(name, attrs.iter().copied().collect::<Attributes>())
    }

    #[test]
    fn test_root_is_rigid() {
        let mut data = HealthData::default();
        let err = Node::Root
            .handle_child(&tag("Foo", &[]), &mut data)
            .unwrap_err();
        let ConvertError::SchemaViolation { element, position } = err else {
            panic!("expected a schema violation, got {err:?}");
        };
        assert_eq!(element, "Foo");
        assert_eq!(position, "document root");
    }

    #[test]
    fn test_health_data_sets_locale() {
        let mut data = HealthData::default();
        let node = Node::Root
            .handle_child(&tag("HealthData", &[("locale", "en_US")]), &mut data)
            .unwrap();
        assert_eq!(node, Node::HealthData);
        assert_eq!(data.locale.as_deref(), Some("en_US"));
    }

    #[test]
    fn test_unknown_health_data_child_is_skipped() {
        let mut data = HealthData::default();
        let node = Node::HealthData
            .handle_child(&tag("Audiogram", &[("type", "x")]), &mut data)
            .unwrap();
        assert_eq!(node, Node::Skip);
        assert_eq!(data.diagnostics.unknown_extensions, 1);
        assert!(data.records.is_empty());
    }

    #[test]
    fn test_profile_children_are_fatal() {
        let mut data = HealthData::default();
        let err = Node::Profile
            .handle_child(&tag("Extra", &[]), &mut data)
            .unwrap_err();
        assert!(matches!(err, ConvertError::SchemaViolation { position: "Me", .. }));
    }

    #[test]
    fn test_record_without_type_is_fatal() {
        let mut data = HealthData::default();
        let err = Node::HealthData
            .handle_child(&tag("Record", &[("sourceName", "Watch")]), &mut data)
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnclassifiedType { kind: "record", .. }));
    }

    #[test]
    fn test_skip_swallows_everything() {
        let mut data = HealthData::default();
        let node = Node::Skip
            .handle_child(&tag("Anything", &[]), &mut data)
            .unwrap();
        assert_eq!(node, Node::Skip);
        assert!(data.diagnostics.is_empty());
    }

    #[test]
    fn test_route_flushed_into_parent_workout() {
        let mut data = HealthData::default();
        let mut workout = Node::HealthData
            .handle_child(
                &tag(
                    "Workout",
                    &[
                        ("workoutActivityType", "HKWorkoutActivityTypeRunning"),
                        ("sourceName", "Watch"),
                        ("device", "Watch"),
                        ("startDate", "2024-01-01T00:00:00Z"),
                        ("endDate", "2024-01-01T00:30:00Z"),
                    ],
                ),
                &mut data,
            )
            .unwrap();
        let route = workout
            .handle_child(
                &tag(
                    "WorkoutRoute",
                    &[
                        ("sourceName", "Watch"),
                        ("startDate", "2024-01-01T00:00:00Z"),
                        ("endDate", "2024-01-01T00:00:01Z"),
                    ],
                ),
                &mut data,
            )
            .unwrap();
        assert!(data.workouts["Running"].routes.is_empty());

        route.on_close(&workout, &mut data);
        let routes = &data.workouts["Running"].routes;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].get("endDate"), Some(&Cell::Int(1000)));
    }
}
