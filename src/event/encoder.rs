use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

/// Decodes a client-submitted payload.
///
/// Accepts plain JSON text or base64-encoded JSON. Returns `None` on empty or
/// malformed input; callers drop the payload and still answer successfully.
pub fn decode_object<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        debug!("ENCODER | Empty payload");
        return None;
    }

    let json_error = match serde_json::from_str::<T>(raw) {
        Ok(value) => return Some(value),
        Err(e) => e,
    };

    let decoded = match STANDARD.decode(raw) {
        Ok(decoded) => decoded,
        Err(_) => {
            debug!("ENCODER | Failed to decode payload: {json_error}");
            return None;
        }
    };

    match serde_json::from_slice::<T>(&decoded) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("ENCODER | Failed to decode base64 payload: {e}");
            None
        }
    }
}

/// Encodes `value` the way the browser bundle submits it.
pub fn encode_object<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_vec(value) {
        Ok(json) => Some(STANDARD.encode(json)),
        Err(e) => {
            debug!("ENCODER | Failed to encode payload: {e}");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Metric {
        name: String,
        value: f64,
    }

    #[test]
    fn decode_plain_json() {
        let metric: Metric = decode_object(r#"{"name":"CLS","value":0.1}"#).unwrap();
        assert_eq!(
            metric,
            Metric {
                name: "CLS".to_string(),
                value: 0.1
            }
        );
    }

    #[test]
    fn decode_encoded_payload() {
        let metric = Metric {
            name: "LCP".to_string(),
            value: 2500.0,
        };
        let encoded = encode_object(&metric).unwrap();
        assert_eq!(decode_object::<Metric>(&encoded), Some(metric));
    }

    #[test]
    fn malformed_is_none() {
        assert_eq!(decode_object::<Metric>(""), None);
        assert_eq!(decode_object::<Metric>("   "), None);
        assert_eq!(decode_object::<Metric>("{not json"), None);
        assert_eq!(decode_object::<Metric>(r#"{"name":"CLS"}"#), None);
        assert_eq!(decode_object::<Metric>("bm90IGpzb24="), None);
    }
}
