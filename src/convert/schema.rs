//! Export schema: which child elements each structural position accepts,
//! and how vendor type identifiers map to table names.
//!
//! Every position has its own closed child enum. Adding an element to the
//! schema means adding a variant, and the node dispatch `match` will not
//! compile until it is handled.

use std::sync::LazyLock;

use regex::Regex;

/// A closed set of element names accepted at one structural position
pub trait ChildSet: Sized + Copy {
    /// Human-readable position, used in logs and errors
    const POSITION: &'static str;

    fn from_name(name: &str) -> Option<Self>;
}

macro_rules! child_set {
    ($(#[$meta:meta])* $name:ident, $position:literal { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl ChildSet for $name {
            const POSITION: &'static str = $position;

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

child_set!(
    /// Children of the document root (rigid)
    RootChild, "document root" { HealthData }
);

child_set!(
    /// Children of `<HealthData>` (open)
    HealthDataChild, "HealthData" {
        ExportDate,
        Me,
        Record,
        Correlation,
        Workout,
        ActivitySummary,
        ClinicalRecord,
    }
);

child_set!(
    /// Children of `<Record>` (open)
    RecordChild, "Record" { MetadataEntry, HeartRateVariabilityMetadataList }
);

child_set!(
    /// Children of `<Correlation>` (open)
    CorrelationChild, "Correlation" { MetadataEntry, Record }
);

child_set!(
    /// Children of `<HeartRateVariabilityMetadataList>` (open)
    SampleListChild, "HeartRateVariabilityMetadataList" { InstantaneousBeatsPerMinute }
);

child_set!(
    /// Children of `<Workout>` (open)
    WorkoutChild, "Workout" { MetadataEntry, WorkoutEvent, WorkoutRoute }
);

child_set!(
    /// Children of `<WorkoutRoute>` (open)
    RouteChild, "WorkoutRoute" { MetadataEntry, FileReference }
);

/// `HKQuantityTypeIdentifierHeartRate` -> `HeartRate`
static IDENTIFIER_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HK.*TypeIdentifier(.+)$").unwrap());

/// `HKWorkoutActivityTypeRunning` -> `Running`,
/// `HKDataTypeSleepDurationGoal` -> `SleepDurationGoal`
static PLAIN_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^HK.*Type(.+)$").unwrap());

fn capture<'a>(re: &Regex, raw: &'a str) -> Option<&'a str> {
    re.captures(raw).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Normalized table name for a record or correlation `type`
pub fn classify_record(raw: &str) -> Option<&str> {
    capture(&IDENTIFIER_TYPE, raw).or_else(|| capture(&PLAIN_TYPE, raw))
}

/// Normalized table name for a `workoutActivityType`
pub fn classify_workout(raw: &str) -> Option<&str> {
    capture(&PLAIN_TYPE, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_sets() {
        assert_eq!(RootChild::from_name("HealthData"), Some(RootChild::HealthData));
        assert_eq!(RootChild::from_name("Foo"), None);
        assert_eq!(
            HealthDataChild::from_name("ActivitySummary"),
            Some(HealthDataChild::ActivitySummary)
        );
        assert_eq!(HealthDataChild::from_name("Audiogram"), None);
        assert_eq!(RouteChild::from_name("FileReference"), Some(RouteChild::FileReference));
        assert_eq!(WorkoutChild::POSITION, "Workout");
    }

    #[test]
    fn test_classify_record() {
        assert_eq!(classify_record("HKQuantityTypeIdentifierHeartRate"), Some("HeartRate"));
        assert_eq!(
            classify_record("HKCategoryTypeIdentifierSleepAnalysis"),
            Some("SleepAnalysis")
        );
        assert_eq!(
            classify_record("HKCorrelationTypeIdentifierBloodPressure"),
            Some("BloodPressure")
        );
        assert_eq!(classify_record("HKDataTypeSleepDurationGoal"), Some("SleepDurationGoal"));
        assert_eq!(classify_record("HeartRate"), None);
        assert_eq!(classify_record("HKUnknownIdentifier"), None);
    }

    #[test]
    fn test_classify_workout() {
        assert_eq!(classify_workout("HKWorkoutActivityTypeRunning"), Some("Running"));
        assert_eq!(
            classify_workout("HKWorkoutActivityTypeTraditionalStrengthTraining"),
            Some("TraditionalStrengthTraining")
        );
        assert_eq!(classify_workout("Running"), None);
    }
}
