use serde::Serialize;

use crate::event::{EventError, clock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Client-side navigation fetching loader data (`?_data=...`).
    Data,
    Document,
}

impl RequestType {
    /// `data` when the query string carries a `_data` parameter.
    #[must_use]
    pub fn from_query(query: Option<&str>) -> Self {
        let has_data = query.is_some_and(|query| {
            query
                .split('&')
                .any(|pair| pair.split('=').next() == Some("_data"))
        });
        if has_data {
            RequestType::Data
        } else {
            RequestType::Document
        }
    }
}

/// Outcome applied once when the response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestEventUpdate {
    pub errored: bool,
    pub status_code: u16,
    /// Nanoseconds between request start and response finish.
    pub duration: u128,
}

/// Telemetry for one served HTTP request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub adapter: String,
    pub method: String,
    pub pathname: String,
    pub version: String,
    pub hash: String,
    pub ip: String,
    pub ua: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub timestamp: i64,
    #[serde(serialize_with = "serialize_nanos")]
    pub start_time: u128,
    pub status_code: u16,
    pub errored: bool,
    #[serde(serialize_with = "serialize_nanos")]
    pub duration: u128,
    #[serde(skip)]
    finalized: bool,
}

/// Fields known when the request starts.
#[derive(Clone, Debug, Default)]
pub struct RequestEventDetails {
    pub adapter: String,
    pub method: String,
    pub pathname: String,
    pub version: String,
    pub hash: String,
    pub ip: String,
    pub ua: String,
    pub request_type: Option<RequestType>,
}

impl RequestEvent {
    /// Stamps the wall clock and the monotonic start time.
    #[must_use]
    pub fn new(details: RequestEventDetails) -> Self {
        RequestEvent {
            adapter: details.adapter,
            method: details.method,
            pathname: details.pathname,
            version: details.version,
            hash: details.hash,
            ip: details.ip,
            ua: details.ua,
            request_type: details.request_type.unwrap_or(RequestType::Document),
            timestamp: clock::timestamp_millis(),
            start_time: clock::monotonic_nanos(),
            status_code: 200,
            errored: false,
            duration: 0,
            finalized: false,
        }
    }

    /// Applies the outcome. Only the first call has an effect.
    pub fn update(&mut self, update: RequestEventUpdate) -> Result<(), EventError> {
        if self.finalized {
            return Err(EventError::AlreadyFinalized);
        }
        self.errored = update.errored;
        self.status_code = update.status_code;
        self.duration = update.duration;
        self.finalized = true;
        Ok(())
    }

    /// Computes the duration from the monotonic clock and applies `status_code`.
    pub fn finalize(&mut self, status_code: u16) -> Result<(), EventError> {
        let duration = clock::monotonic_nanos().saturating_sub(self.start_time);
        self.update(RequestEventUpdate {
            errored: (400..600).contains(&status_code),
            status_code,
            duration,
        })
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

// u128 is not representable in JSON numbers for every consumer, clamp to u64
#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize_nanos<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(*value).unwrap_or(u64::MAX))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event() -> RequestEvent {
        RequestEvent::new(RequestEventDetails {
            adapter: "axum".to_string(),
            method: "GET".to_string(),
            pathname: "/".to_string(),
            ..RequestEventDetails::default()
        })
    }

    #[test]
    fn update_applies_once() {
        let mut event = event();
        event
            .update(RequestEventUpdate {
                errored: true,
                status_code: 500,
                duration: 42,
            })
            .unwrap();

        let second = event.update(RequestEventUpdate {
            errored: false,
            status_code: 200,
            duration: 1,
        });
        assert_eq!(second, Err(EventError::AlreadyFinalized));
        assert_eq!(event.status_code, 500);
        assert!(event.errored);
        assert_eq!(event.duration, 42);
    }

    #[test]
    fn finalize_marks_client_and_server_errors() {
        for (status, errored) in [(200, false), (302, false), (404, true), (503, true)] {
            let mut event = event();
            event.finalize(status).unwrap();
            assert_eq!(event.errored, errored, "status {status}");
            assert!(event.is_finalized());
        }
    }

    #[test]
    fn request_type_from_query() {
        assert_eq!(
            RequestType::from_query(Some("_data=routes%2Findex")),
            RequestType::Data
        );
        assert_eq!(RequestType::from_query(Some("a=1&_data")), RequestType::Data);
        assert_eq!(
            RequestType::from_query(Some("my_data=1")),
            RequestType::Document
        );
        assert_eq!(RequestType::from_query(None), RequestType::Document);
    }

    #[test]
    fn serializes_camel_case() {
        let mut event = event();
        event.finalize(201).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["type"], "document");
        assert!(json.get("finalized").is_none());
        assert!(json["startTime"].is_u64());
    }
}
