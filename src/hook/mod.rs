//! Per-request instrumentation.
//!
//! [`Instrumentation::on_request`] runs the ignore checks in a fixed order:
//! method, environment gate, the opt-out predicate, then the path. The first
//! three yield an empty context. An ignored path still gets a populated
//! context so downstream spans keep working, only the request event is
//! skipped.

pub mod context;
pub mod guard;

use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::event::{RequestEvent, RequestEventDetails, RequestType};
use crate::exporter::Exporter;
use crate::filter::Filter;
use crate::request::RequestDescriptor;

pub use context::MetronomeContext;
pub use guard::RequestGuard;

#[derive(Clone, Debug)]
pub struct InstrumentationOptions {
    /// Version of the instrumented application.
    pub app_version: String,
    /// Build identifier of the instrumented application.
    pub hash: String,
    pub adapter: String,
}

impl Default for InstrumentationOptions {
    fn default() -> Self {
        InstrumentationOptions {
            app_version: String::new(),
            hash: String::new(),
            adapter: crate::adapter::ADAPTER_NAME.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct Instrumentation {
    filter: Arc<Filter>,
    exporter: Exporter,
    options: InstrumentationOptions,
}

impl Instrumentation {
    pub fn new(
        filter: Arc<Filter>,
        exporter: Exporter,
        options: InstrumentationOptions,
    ) -> Result<Self, ConfigError> {
        let config = filter.config();
        if config.require_api_key && config.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        if !config.is_instrumentation_enabled() {
            debug!(
                "HOOK | Environment is {}, requests will not be instrumented",
                config.environment
            );
        }

        Ok(Instrumentation {
            filter,
            exporter,
            options,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        self.filter.config()
    }

    #[must_use]
    pub fn filter(&self) -> &Arc<Filter> {
        &self.filter
    }

    #[must_use]
    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    #[must_use]
    pub fn options(&self) -> &InstrumentationOptions {
        &self.options
    }

    /// Context for requests handled outside of `on_request`, such as the
    /// vitals route.
    #[must_use]
    pub fn context(&self, ip: String) -> MetronomeContext {
        MetronomeContext {
            config: Some(Arc::clone(self.config())),
            exporter: Some(self.exporter.clone()),
            filter: Some(Arc::clone(&self.filter)),
            version: Some(crate::METRONOME_VERSION.to_string()),
            app_version: Some(self.options.app_version.clone()),
            hash: Some(self.options.hash.clone()),
            ip: Some(ip),
            adapter: Some(self.options.adapter.clone()),
        }
    }

    pub async fn on_request(
        &self,
        request: &RequestDescriptor,
    ) -> (MetronomeContext, Option<RequestGuard>) {
        if self.filter.should_ignore_method(&request.method) {
            debug!("HOOK | Ignoring {} {}", request.method, request.url);
            return (MetronomeContext::empty(), None);
        }

        let config = self.config();
        if !config.is_instrumentation_enabled() {
            return (MetronomeContext::empty(), None);
        }

        if self.filter.should_not_track(request).await {
            debug!("HOOK | Request to {} opted out of tracking", request.url);
            return (MetronomeContext::empty(), None);
        }

        let ip = request.client_ip();
        let context = self.context(ip.clone());

        if self.filter.should_ignore_path(Some(&request.url)) {
            debug!("HOOK | Ignoring path {}", request.url);
            return (context, None);
        }

        let event = RequestEvent::new(RequestEventDetails {
            adapter: self.options.adapter.clone(),
            method: request.method.clone(),
            pathname: request.pathname(),
            version: crate::METRONOME_VERSION.to_string(),
            hash: self.options.hash.clone(),
            ip,
            ua: request.user_agent().to_string(),
            request_type: Some(RequestType::from_query(request.query().as_deref())),
        });
        let guard = RequestGuard::new(
            event,
            self.exporter.clone(),
            config.flush_strategy.awaits_request_export(),
        );

        (context, Some(guard))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderMap, HeaderValue, header};

    use super::*;
    use crate::config::IgnoreRule;
    use crate::filter::PredicateError;

    fn production() -> Config {
        Config {
            environment: "production".to_string(),
            suppress_warnings: true,
            ..Config::default()
        }
    }

    fn instrumentation_with(filter: Filter) -> Instrumentation {
        let config = Arc::clone(filter.config());
        let (exporter, _service) = Exporter::new(config, "https://collector.example.com".into());
        Instrumentation::new(
            Arc::new(filter),
            exporter,
            InstrumentationOptions {
                hash: "abc123".to_string(),
                ..InstrumentationOptions::default()
            },
        )
        .unwrap()
    }

    fn instrumentation(config: Config) -> Instrumentation {
        instrumentation_with(Filter::new(Arc::new(config)))
    }

    #[test]
    fn required_api_key_is_enforced() {
        let config = Arc::new(Config {
            require_api_key: true,
            ..production()
        });
        let (exporter, _service) = Exporter::new(Arc::clone(&config), config.get_endpoint());
        let result = Instrumentation::new(
            Arc::new(Filter::new(config)),
            exporter,
            InstrumentationOptions::default(),
        );
        assert_eq!(result.err(), Some(ConfigError::MissingApiKey));
    }

    #[tokio::test]
    async fn tracked_request_builds_event() {
        let instrumentation = instrumentation(production());
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4"));
        let request =
            RequestDescriptor::new("GET", "/products/7?_data=routes%2Fproducts").with_headers(headers);

        let (context, guard) = instrumentation.on_request(&request).await;
        assert!(context.is_instrumented());
        assert_eq!(context.ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(context.adapter.as_deref(), Some("axum"));

        let event = guard.unwrap().pending_event().unwrap();
        assert_eq!(event.method, "GET");
        assert_eq!(event.pathname, "/products/7");
        assert_eq!(event.ua, "curl/8.0");
        assert_eq!(event.ip, "198.51.100.4");
        assert_eq!(event.hash, "abc123");
        assert_eq!(event.version, crate::METRONOME_VERSION);
        assert_eq!(event.request_type, RequestType::Data);
    }

    #[tokio::test]
    async fn head_request_is_ignored() {
        let instrumentation = instrumentation(production());
        let (context, guard) = instrumentation
            .on_request(&RequestDescriptor::new("HEAD", "/"))
            .await;
        assert!(!context.is_instrumented());
        assert!(guard.is_none());
    }

    #[tokio::test]
    async fn non_production_is_ignored_unless_bypassed() {
        let development = instrumentation(Config::default());
        let (context, guard) = development
            .on_request(&RequestDescriptor::new("GET", "/"))
            .await;
        assert!(!context.is_instrumented());
        assert!(guard.is_none());

        let bypassed = instrumentation(Config {
            bypass: true,
            suppress_warnings: true,
            ..Config::default()
        });
        let (context, guard) = bypassed.on_request(&RequestDescriptor::new("GET", "/")).await;
        assert!(context.is_instrumented());
        assert!(guard.is_some());
    }

    #[tokio::test]
    async fn ignored_path_keeps_context() {
        let instrumentation = instrumentation(Config {
            ignored_pathnames: vec![IgnoreRule::literal("/healthz")],
            ..production()
        });
        let (context, guard) = instrumentation
            .on_request(&RequestDescriptor::new("GET", "/healthz"))
            .await;
        assert!(context.is_instrumented());
        assert!(guard.is_none());
    }

    #[tokio::test]
    async fn opted_out_request_is_ignored() {
        let filter = Filter::new(Arc::new(production())).with_do_not_track(
            |request: &RequestDescriptor| {
                let opted_out = request.headers.contains_key("dnt");
                async move { Ok::<bool, PredicateError>(opted_out) }
            },
        );
        let instrumentation = instrumentation_with(filter);

        let mut headers = HeaderMap::new();
        headers.insert("dnt", HeaderValue::from_static("1"));
        let (context, guard) = instrumentation
            .on_request(&RequestDescriptor::new("GET", "/").with_headers(headers))
            .await;
        assert!(!context.is_instrumented());
        assert!(guard.is_none());
    }

    #[tokio::test]
    async fn method_check_short_circuits_predicate() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let filter = Filter::new(Arc::new(production())).with_do_not_track(
            |_: &RequestDescriptor| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                async { Ok::<bool, PredicateError>(false) }
            },
        );
        let instrumentation = instrumentation_with(filter);

        let _ = instrumentation
            .on_request(&RequestDescriptor::new("HEAD", "/"))
            .await;
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        let _ = instrumentation
            .on_request(&RequestDescriptor::new("GET", "/"))
            .await;
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_predicate_still_tracks() {
        let filter = Filter::new(Arc::new(production())).with_do_not_track(
            |_: &RequestDescriptor| async {
                Err::<bool, PredicateError>("lookup failed".into())
            },
        );
        let instrumentation = instrumentation_with(filter);
        let (context, guard) = instrumentation
            .on_request(&RequestDescriptor::new("GET", "/"))
            .await;
        assert!(context.is_instrumented());
        assert!(guard.is_some());
    }
}
