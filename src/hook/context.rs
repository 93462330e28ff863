use std::sync::Arc;

use crate::config::Config;
use crate::event::{Record, Span, SpanSnapshot};
use crate::exporter::Exporter;
use crate::filter::Filter;

pub const ROUTE_ID_ATTRIBUTE: &str = "remix.route.id";

/// Per-request handle exposed to downstream handlers.
///
/// Every field is `None` when the request is not instrumented; span helpers
/// then return `None` and sending is a no-op.
#[derive(Clone, Debug, Default)]
pub struct MetronomeContext {
    pub config: Option<Arc<Config>>,
    pub exporter: Option<Exporter>,
    pub filter: Option<Arc<Filter>>,
    /// Version of this crate.
    pub version: Option<String>,
    pub app_version: Option<String>,
    pub hash: Option<String>,
    pub ip: Option<String>,
    pub adapter: Option<String>,
}

impl MetronomeContext {
    #[must_use]
    pub fn empty() -> Self {
        MetronomeContext::default()
    }

    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.exporter.is_some()
    }

    #[must_use]
    pub fn span(&self, name: impl Into<String>) -> Option<Span> {
        self.exporter.as_ref().map(|_| Span::new(name))
    }

    /// Span for work done by a route handler, `None` when the route is ignored.
    #[must_use]
    pub fn route_span(&self, route_id: &str, name: impl Into<String>) -> Option<Span> {
        let filter = self.filter.as_ref()?;
        if filter.should_ignore_route(route_id) {
            return None;
        }

        let mut span = self.span(name)?;
        span.set_attribute(ROUTE_ID_ATTRIBUTE, route_id);
        Some(span)
    }

    /// Queues `snapshot` for export.
    pub fn send_span(&self, snapshot: SpanSnapshot) {
        if let Some(exporter) = &self.exporter {
            exporter.send(vec![Record::from(snapshot)]);
        }
    }
}
