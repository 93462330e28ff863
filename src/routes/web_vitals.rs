use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::USER_AGENT;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{Attributes, Span, SpanSnapshot, VITAL_SPAN_NAME, decode_object};
use crate::hook::{Instrumentation, MetronomeContext};
use crate::http::extract_request_body;
use crate::request::RequestDescriptor;

pub const WEB_VITALS_PATH: &str = "/__metronome/web-vitals";

const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebVitalMetric {
    pub name: String,
    pub value: f64,
    pub id: String,
    pub delta: f64,
}

/// A vital as reported by the browser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebVital {
    pub metric: WebVitalMetric,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub route_path: String,
    #[serde(default)]
    pub pathname: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceInfo {
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    /// `desktop`, `smartphone`, `tablet`, ...
    pub device_type: Option<String>,
    pub brand: Option<String>,
}

/// Extracts device information from a user agent.
pub trait DeviceDetector: Send + Sync {
    fn detect(&self, user_agent: &str) -> DeviceInfo;
}

/// Reports every field as unknown.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnknownDeviceDetector;

impl DeviceDetector for UnknownDeviceDetector {
    fn detect(&self, _user_agent: &str) -> DeviceInfo {
        DeviceInfo::default()
    }
}

#[must_use]
pub fn device_category(device_type: Option<&str>) -> &'static str {
    match device_type {
        Some("desktop") => "desktop",
        Some("tablet" | "smartphone") => "mobile",
        _ => UNKNOWN,
    }
}

fn or_unknown(value: Option<&str>) -> String {
    value
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Builds the `vital` span. Vitals are timed by the browser, so the span
/// carries zero start and end times.
#[must_use]
pub fn vital_span(
    vital: &WebVital,
    user_agent: &str,
    device: &DeviceInfo,
    context: &MetronomeContext,
) -> SpanSnapshot {
    let mut attributes = Attributes::new();
    let mut set = |key: &str, value: crate::event::AttributeValue| {
        attributes.insert(key.to_string(), value);
    };

    set("device.ua", user_agent.into());
    set("device.client.name", or_unknown(device.client_name.as_deref()).into());
    set(
        "device.client.version",
        or_unknown(device.client_version.as_deref()).into(),
    );
    set(
        "device.category",
        device_category(device.device_type.as_deref()).into(),
    );
    set("device.type", or_unknown(device.device_type.as_deref()).into());
    set("device.brand", or_unknown(device.brand.as_deref()).into());
    set("device.connection", or_unknown(Some(vital.connection.as_str())).into());
    set("remix.route.id", vital.route_id.as_str().into());
    set("remix.route.path", vital.route_path.as_str().into());
    set("remix.pathname", vital.pathname.as_str().into());
    set("vital.name", vital.metric.name.as_str().into());
    set("vital.value", vital.metric.value.into());
    set("vital.id", vital.metric.id.as_str().into());
    set("vital.delta", vital.metric.delta.into());
    set(
        "app.version",
        context.app_version.clone().unwrap_or_default().into(),
    );
    set("app.hash", context.hash.clone().unwrap_or_default().into());
    set(
        "metronome.version",
        context.version.clone().unwrap_or_default().into(),
    );

    Span::new(VITAL_SPAN_NAME)
        .with_start_time(0)
        .with_attributes(attributes)
        .end(Some(0))
}

/// Decodes `body` and sends the resulting span. Returns the span when one was
/// sent.
pub fn handle_web_vital(
    body: &str,
    user_agent: &str,
    context: &MetronomeContext,
    detector: &dyn DeviceDetector,
) -> Option<SpanSnapshot> {
    let Some(vital) = decode_object::<WebVital>(body) else {
        debug!("VITALS | Discarding undecodable vital");
        return None;
    };

    let device = detector.detect(user_agent);
    let span = vital_span(&vital, user_agent, &device, context);
    context.send_span(span.clone());
    Some(span)
}

#[derive(Clone)]
pub struct VitalsState {
    pub instrumentation: Arc<Instrumentation>,
    pub detector: Arc<dyn DeviceDetector>,
}

impl VitalsState {
    #[must_use]
    pub fn new(instrumentation: Arc<Instrumentation>) -> Self {
        VitalsState {
            instrumentation,
            detector: Arc::new(UnknownDeviceDetector),
        }
    }

    #[must_use]
    pub fn with_detector(mut self, detector: impl DeviceDetector + 'static) -> Self {
        self.detector = Arc::new(detector);
        self
    }
}

fn no_content() -> Response {
    (StatusCode::NO_CONTENT, "").into_response()
}

/// `POST /__metronome/web-vitals`. Always answers 204 with an empty body.
pub async fn web_vitals_handler(State(state): State<VitalsState>, request: Request) -> Response {
    let (parts, body) = match extract_request_body(request).await {
        Ok(r) => r,
        Err(e) => {
            debug!("VITALS | Failed to read request body: {e}");
            return no_content();
        }
    };

    if !state.instrumentation.config().is_instrumentation_enabled() {
        return no_content();
    }

    let descriptor = RequestDescriptor::from_parts(&parts);
    let context = state.instrumentation.context(descriptor.client_ip());
    let user_agent = parts
        .headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    handle_web_vital(
        &String::from_utf8_lossy(&body),
        user_agent,
        &context,
        state.detector.as_ref(),
    );

    no_content()
}
