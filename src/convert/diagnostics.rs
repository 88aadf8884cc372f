//! Recoverable conversion problems
//!
//! These never interrupt the event stream. Each one is logged as a
//! structured `warn` event and tallied in the run's [`Diagnostics`].

use std::fmt;

use tracing::warn;

/// Samples kept verbatim; later diagnostics are only counted
pub const MAX_SAMPLES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Unrecognized element at an open position; its subtree was skipped
    UnknownExtension,
    /// A required attribute was absent; the field was left unset
    MissingAttribute,
    /// A date or number failed to parse; the field was left unset
    MalformedValue,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::UnknownExtension => "unknown extension",
            DiagnosticKind::MissingAttribute => "missing required attribute",
            DiagnosticKind::MalformedValue => "malformed value",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Element the problem was found on
    pub element: String,
    /// Structural position, attribute name, or offending value
    pub detail: String,
}

impl Diagnostic {
    pub fn unknown_extension(element: &str, position: &str) -> Self {
        Diagnostic {
            kind: DiagnosticKind::UnknownExtension,
            element: element.to_string(),
            detail: format!("in {position}"),
        }
    }

    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        Diagnostic {
            kind: DiagnosticKind::MissingAttribute,
            element: element.to_string(),
            detail: attribute.to_string(),
        }
    }

    pub fn malformed_value(element: &str, attribute: &str, value: &str) -> Self {
        Diagnostic {
            kind: DiagnosticKind::MalformedValue,
            element: element.to_string(),
            detail: format!("{attribute}='{value}'"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on <{}>: {}", self.kind, self.element, self.detail)
    }
}

/// Per-run tally of recoverable problems
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub unknown_extensions: usize,
    pub missing_attributes: usize,
    pub malformed_values: usize,
    samples: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn report(&mut self, diagnostic: Diagnostic) {
        warn!(
            kind = %diagnostic.kind,
            element = %diagnostic.element,
            detail = %diagnostic.detail,
            "skipping"
        );

        match diagnostic.kind {
            DiagnosticKind::UnknownExtension => self.unknown_extensions += 1,
            DiagnosticKind::MissingAttribute => self.missing_attributes += 1,
            DiagnosticKind::MalformedValue => self.malformed_values += 1,
        }
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(diagnostic);
        }
    }

    /// The first [`MAX_SAMPLES`] diagnostics, in order of occurrence
    pub fn samples(&self) -> &[Diagnostic] {
        &self.samples
    }

    pub fn total(&self) -> usize {
        self.unknown_extensions + self.missing_attributes + self.malformed_values
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_kind() {
        let mut diags = Diagnostics::default();
        diags.report(Diagnostic::unknown_extension("Audiogram", "HealthData"));
        diags.report(Diagnostic::missing_attribute("Record", "sourceName"));
        diags.report(Diagnostic::missing_attribute("Record", "endDate"));
        assert_eq!(diags.unknown_extensions, 1);
        assert_eq!(diags.missing_attributes, 2);
        assert_eq!(diags.malformed_values, 0);
        assert_eq!(diags.total(), 3);
        assert_eq!(diags.samples()[1].detail, "sourceName");
    }

    #[test]
    fn test_samples_capped() {
        let mut diags = Diagnostics::default();
        for _ in 0..(MAX_SAMPLES + 10) {
            diags.report(Diagnostic::malformed_value("Record", "value", "x"));
        }
        assert_eq!(diags.samples().len(), MAX_SAMPLES);
        assert_eq!(diags.malformed_values, MAX_SAMPLES + 10);
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::malformed_value("Workout", "duration", "abc");
        assert_eq!(d.to_string(), "malformed value on <Workout>: duration='abc'");
    }
}
