//! Decides whether a request is instrumented.
//!
//! Route and path verdicts are memoized for the lifetime of the process:
//! the configuration is immutable and a deployment only has so many routes
//! and paths, so after warm-up every check is a single map lookup.

pub mod cache;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::Url;
use tracing::{debug, error};

use crate::config::Config;
use crate::filter::cache::MatcherCache;
use crate::request::RequestDescriptor;

/// Requests whose url contains this marker belong to the instrumentation itself.
pub const RESERVED_PATH_MARKER: &str = "__metronome";

const LOCAL_BASE_URL: &str = "http://localhost";

pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

/// User-supplied opt-out predicate. `Ok(true)` suppresses instrumentation.
#[async_trait]
pub trait DoNotTrack: Send + Sync {
    async fn do_not_track(&self, request: &RequestDescriptor) -> Result<bool, PredicateError>;
}

#[async_trait]
impl<F, Fut> DoNotTrack for F
where
    F: Fn(&RequestDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, PredicateError>> + Send + 'static,
{
    async fn do_not_track(&self, request: &RequestDescriptor) -> Result<bool, PredicateError> {
        (self)(request).await
    }
}

pub struct Filter {
    config: Arc<Config>,
    ignored_route_cache: MatcherCache<String>,
    ignored_pathname_cache: MatcherCache<String>,
    do_not_track: Option<Arc<dyn DoNotTrack>>,
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("config", &self.config)
            .field("cached_routes", &self.ignored_route_cache.len())
            .field("cached_pathnames", &self.ignored_pathname_cache.len())
            .field("do_not_track", &self.do_not_track.is_some())
            .finish()
    }
}

/// Strips an optional leading `/` followed by `routes/`.
fn normalize_route_id(route_id: &str) -> &str {
    route_id
        .strip_prefix('/')
        .unwrap_or(route_id)
        .strip_prefix("routes/")
        .unwrap_or(route_id)
}

fn resolve_pathname(raw_url: &str) -> Option<String> {
    let url = if raw_url.starts_with("http") {
        Url::parse(raw_url)
    } else {
        Url::parse(LOCAL_BASE_URL).and_then(|base| base.join(raw_url))
    };

    match url {
        Ok(url) => Some(url.path().to_string()),
        Err(e) => {
            debug!("FILTER | Failed to parse url {raw_url}: {e}");
            None
        }
    }
}

impl Filter {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Filter {
            config,
            ignored_route_cache: MatcherCache::new(),
            ignored_pathname_cache: MatcherCache::new(),
            do_not_track: None,
        }
    }

    #[must_use]
    pub fn with_do_not_track(mut self, predicate: impl DoNotTrack + 'static) -> Self {
        self.do_not_track = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Ingestion url the exporter posts batches to.
    #[must_use]
    pub fn get_endpoint(&self) -> String {
        self.config.get_endpoint()
    }

    pub fn should_ignore_route(&self, route_id: &str) -> bool {
        self.ignored_route_cache
            .get_or_insert_with(&route_id.to_string(), || {
                self.config
                    .ignored_routes
                    .iter()
                    .any(|rule| rule.matches_with(route_id, normalize_route_id))
            })
    }

    pub fn should_ignore_path(&self, raw_url: Option<&str>) -> bool {
        let Some(raw_url) = raw_url.filter(|url| !url.is_empty()) else {
            return false;
        };

        if raw_url.contains(RESERVED_PATH_MARKER) {
            return true;
        }

        self.ignored_pathname_cache
            .get_or_insert_with(&raw_url.to_string(), || {
                let Some(pathname) = resolve_pathname(raw_url) else {
                    return false;
                };
                self.config
                    .ignored_pathnames
                    .iter()
                    .any(|rule| rule.matches(&pathname))
            })
    }

    #[must_use]
    pub fn should_ignore_method(&self, method: &str) -> bool {
        method.eq_ignore_ascii_case("HEAD") && self.config.ignore_head_method
    }

    /// Runs the opt-out predicate. Errors and panics count as "track".
    pub async fn should_not_track(&self, request: &RequestDescriptor) -> bool {
        let Some(predicate) = &self.do_not_track else {
            return false;
        };

        match AssertUnwindSafe(predicate.do_not_track(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                error!("FILTER | The doNotTrack predicate returned an error, ignoring it: {e}");
                false
            }
            Err(_) => {
                error!("FILTER | The doNotTrack predicate panicked, ignoring it");
                false
            }
        }
    }
}
