use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// A single entry of `ignored_routes` or `ignored_pathnames`.
///
/// In YAML a plain string is a literal and `{ pattern: "<regex>" }` is a
/// pattern. In environment variables the list is a JSON array with the same
/// shape.
#[derive(Clone, Debug)]
pub enum IgnoreRule {
    Literal(String),
    Pattern(Regex),
}

impl IgnoreRule {
    /// Builds a pattern rule, failing when `pattern` is not a valid regex.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(IgnoreRule::Pattern(Regex::new(pattern)?))
    }

    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        IgnoreRule::Literal(value.into())
    }

    /// Literal rules compare for equality after `normalize` is applied to both
    /// sides; pattern rules search the normalized candidate.
    #[must_use]
    pub fn matches_with(&self, candidate: &str, normalize: impl Fn(&str) -> &str) -> bool {
        let candidate = normalize(candidate);
        match self {
            IgnoreRule::Literal(literal) => normalize(literal) == candidate,
            IgnoreRule::Pattern(regex) => regex.is_match(candidate),
        }
    }

    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.matches_with(candidate, |s| s)
    }
}

impl PartialEq for IgnoreRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IgnoreRule::Literal(a), IgnoreRule::Literal(b)) => a == b,
            (IgnoreRule::Pattern(a), IgnoreRule::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

fn parse_rule(value: JsonValue) -> Option<IgnoreRule> {
    match value {
        JsonValue::String(s) => Some(IgnoreRule::Literal(s)),
        JsonValue::Object(map) => match map.get("pattern") {
            Some(JsonValue::String(pattern)) => match IgnoreRule::pattern(pattern) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::error!("Failed to compile ignore pattern {pattern}: {e}, ignoring");
                    None
                }
            },
            _ => {
                tracing::error!("Ignore rule object is missing a `pattern` string, ignoring");
                None
            }
        },
        other => {
            tracing::error!("Unsupported ignore rule {other}, ignoring");
            None
        }
    }
}

pub fn deserialize_ignore_rules<'de, D>(deserializer: D) -> Result<Vec<IgnoreRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;

    let values = match value {
        // Environment variables carry the list as a JSON string
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
            Ok(JsonValue::Array(a)) => a,
            Ok(_) | Err(_) => {
                // A bare word is treated as a single literal
                if s.trim().is_empty() {
                    return Ok(Vec::new());
                }
                vec![JsonValue::String(s)]
            }
        },
        JsonValue::Array(a) => a,
        JsonValue::Null => return Ok(Vec::new()),
        other => {
            tracing::error!("Failed to parse ignore rules {other}, ignoring");
            return Ok(Vec::new());
        }
    };

    Ok(values.into_iter().filter_map(parse_rule).collect())
}
