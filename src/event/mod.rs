//! Telemetry records handed to the exporter.
//!
//! A [`RequestEvent`] is created when a request starts and finalized exactly
//! once when the response finishes. A [`Span`] is ended into an immutable
//! [`SpanSnapshot`]. Both travel to the exporter wrapped in a [`Record`].

pub mod clock;
pub mod encoder;
pub mod request_event;
pub mod span;

use serde::Serialize;

pub use encoder::{decode_object, encode_object};
pub use request_event::{RequestEvent, RequestEventDetails, RequestEventUpdate, RequestType};
pub use span::{AttributeValue, Attributes, Span, SpanSnapshot, VITAL_SPAN_NAME};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "details", rename_all = "lowercase")]
pub enum Record {
    Request(RequestEvent),
    Span(SpanSnapshot),
}

impl From<RequestEvent> for Record {
    fn from(event: RequestEvent) -> Self {
        Record::Request(event)
    }
}

impl From<SpanSnapshot> for Record {
    fn from(span: SpanSnapshot) -> Self {
        Record::Span(span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("request event was already finalized")]
    AlreadyFinalized,
}
