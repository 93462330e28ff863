use std::collections::BTreeMap;

use serde::Serialize;

use crate::event::clock;
use crate::event::request_event::serialize_nanos;

pub const VITAL_SPAN_NAME: &str = "vital";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// A named interval under construction.
#[derive(Clone, Debug)]
pub struct Span {
    name: String,
    start_time: u128,
    attributes: Attributes,
}

/// An ended span. Cannot be modified.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanSnapshot {
    pub name: String,
    #[serde(serialize_with = "serialize_nanos")]
    pub start_time: u128,
    #[serde(serialize_with = "serialize_nanos")]
    pub end_time: u128,
    pub attributes: Attributes,
}

impl Span {
    /// Starts the span now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Span {
            name: name.into(),
            start_time: clock::monotonic_nanos(),
            attributes: Attributes::new(),
        }
    }

    /// Overrides the start time, e.g. `0` for spans timed by the client.
    #[must_use]
    pub fn with_start_time(mut self, start_time: u128) -> Self {
        self.start_time = start_time;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ends the span. Without `end_time` the monotonic clock is read.
    #[must_use]
    pub fn end(self, end_time: Option<u128>) -> SpanSnapshot {
        SpanSnapshot {
            name: self.name,
            start_time: self.start_time,
            end_time: end_time.unwrap_or_else(clock::monotonic_nanos),
            attributes: self.attributes,
        }
    }
}
