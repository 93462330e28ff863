//! axum integration.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use axum::{Router, routing::get};
//! # fn wire(instrumentation: Arc<metronome::hook::Instrumentation>) -> Router {
//! let app = Router::new().route("/", get(|| async { "hello" }));
//! metronome::adapter::instrumented(app, instrumentation)
//! # }
//! ```

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::post;

use crate::hook::Instrumentation;
use crate::request::RequestDescriptor;
use crate::routes::web_vitals::{VitalsState, WEB_VITALS_PATH, web_vitals_handler};

pub const ADAPTER_NAME: &str = "axum";

/// Middleware running the hook around the inner service. The request's
/// [`crate::hook::MetronomeContext`] is available to handlers as an
/// `Extension`.
pub async fn instrument(
    State(instrumentation): State<Arc<Instrumentation>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let descriptor = RequestDescriptor::from_parts(&parts);
    let mut request = Request::from_parts(parts, body);

    let (context, guard) = instrumentation.on_request(&descriptor).await;
    request.extensions_mut().insert(context);

    let response = next.run(request).await;

    if let Some(guard) = guard {
        guard.finish(response.status().as_u16()).await;
    }
    response
}

/// Router serving `POST /__metronome/web-vitals`.
pub fn router(instrumentation: Arc<Instrumentation>) -> Router {
    router_with_state(VitalsState::new(instrumentation))
}

pub fn router_with_state(state: VitalsState) -> Router {
    Router::new()
        .route(WEB_VITALS_PATH, post(web_vitals_handler))
        .with_state(state)
}

/// Mounts the vitals route on `app` and instruments every route.
pub fn instrumented(app: Router, instrumentation: Arc<Instrumentation>) -> Router {
    app.merge(router(Arc::clone(&instrumentation)))
        .layer(middleware::from_fn_with_state(instrumentation, instrument))
}
