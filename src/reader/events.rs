//! Tag Event Types
//!
//! Events delivered by the streaming reader, and the push-based handler
//! trait that consumes them.

use crate::error::Result;
use indexmap::IndexMap;
use serde::Serialize;

/// Attributes of one start tag, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attribute. A repeated name keeps its first value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_insert_with(|| value.into());
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

/// One open tag: element name plus its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEvent {
    pub name: String,
    pub attributes: Attributes,
}

impl TagEvent {
    pub fn new(name: impl Into<String>, attributes: Attributes) -> Self {
        TagEvent {
            name: name.into(),
            attributes,
        }
    }

    /// Get an attribute value by name
    #[inline]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }
}

/// Trait for consuming tag events
///
/// The reader calls these methods strictly in document order, and each call
/// runs to completion before the next event is produced. An error returned
/// from any method aborts the read.
pub trait TagHandler {
    /// Called when an element opens. Self-closing elements get an
    /// `open_tag` immediately followed by a `close_tag`.
    fn open_tag(&mut self, tag: &TagEvent) -> Result<()>;

    /// Called when an element closes
    fn close_tag(&mut self, name: &str) -> Result<()>;

    /// Called for character data between tags, entities decoded
    fn text(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Called once after the last event of a well-formed document
    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_preserve_order() {
        let attrs: Attributes = [("type", "A"), ("sourceName", "B"), ("unit", "C")]
            .into_iter()
            .collect();
        let names: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["type", "sourceName", "unit"]);
    }

    #[test]
    fn test_duplicate_attribute_keeps_first() {
        let mut attrs = Attributes::new();
        attrs.insert("value", "1");
        attrs.insert("value", "2");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("value"), Some("1"));
    }
}
