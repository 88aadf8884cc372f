//! Stack Machine
//!
//! Drives node dispatch from tag events. The node of the innermost open
//! element is `current`; its ancestors wait on `stack`.

use std::mem;

use tracing::debug;

use super::node::Node;
use super::HealthData;
use crate::error::{ConvertError, Result};
use crate::reader::{TagEvent, TagHandler};

/// Parser state of one conversion run
#[derive(Debug)]
pub struct Converter {
    current: Node,
    stack: Vec<Node>,
    data: HealthData,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    pub fn new() -> Self {
        Converter {
            current: Node::Root,
            stack: Vec::with_capacity(8),
            data: HealthData::default(),
        }
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn data(&self) -> &HealthData {
        &self.data
    }

    /// Finish the run and hand over everything collected
    pub fn into_data(self) -> HealthData {
        self.data
    }
}

impl TagHandler for Converter {
    fn open_tag(&mut self, tag: &TagEvent) -> Result<()> {
        let child = self.current.handle_child(tag, &mut self.data)?;
        self.stack.push(mem::replace(&mut self.current, child));
        Ok(())
    }

    fn close_tag(&mut self, name: &str) -> Result<()> {
        let parent = self.stack.pop().ok_or_else(|| ConvertError::UnbalancedClose {
            name: name.to_string(),
        })?;
        let closed = mem::replace(&mut self.current, parent);
        closed.on_close(&self.current, &mut self.data);
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if !text.trim().is_empty() {
            debug!(len = text.len(), "ignoring text content");
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(ConvertError::Truncated {
                detail: format!("{} element(s) still open", self.stack.len()),
            });
        }
        debug!(
            tables = self.data.records.len(),
            workouts = self.data.workouts.len(),
            "conversion complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Attributes;

    fn open(conv: &mut Converter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        conv.open_tag(&TagEvent::new(name, attrs.iter().copied().collect::<Attributes>()))
    }

    #[test]
    fn test_push_pop_restores_parent() {
        let mut conv = Converter::new();
        open(&mut conv, "HealthData", &[("locale", "en_US")]).unwrap();
        assert_eq!(conv.current, Node::HealthData);
        open(&mut conv, "Unknown", &[]).unwrap();
        assert_eq!(conv.current, Node::Skip);
        open(&mut conv, "Nested", &[]).unwrap();
        assert_eq!(conv.depth(), 3);

        conv.close_tag("Nested").unwrap();
        conv.close_tag("Unknown").unwrap();
        assert_eq!(conv.current, Node::HealthData);
        conv.close_tag("HealthData").unwrap();
        assert_eq!(conv.current, Node::Root);
        conv.end().unwrap();

        // nested element under a skipped subtree is not reported again
        assert_eq!(conv.data().diagnostics.unknown_extensions, 1);
    }

    #[test]
    fn test_close_without_open() {
        let mut conv = Converter::new();
        let err = conv.close_tag("HealthData").unwrap_err();
        assert!(matches!(err, ConvertError::UnbalancedClose { .. }));
    }

    #[test]
    fn test_end_with_open_elements() {
        let mut conv = Converter::new();
        open(&mut conv, "HealthData", &[("locale", "en_US")]).unwrap();
        assert!(matches!(conv.end(), Err(ConvertError::Truncated { .. })));
    }

    #[test]
    fn test_handler_error_leaves_stack_untouched() {
        let mut conv = Converter::new();
        assert!(open(&mut conv, "NotHealthData", &[]).is_err());
        assert_eq!(conv.depth(), 0);
        assert_eq!(conv.current, Node::Root);
    }
}
