use compact_str::{CompactString, ToCompactString};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A parsed field path such as `user[profile][code]`
///
/// Every `]` is dropped and the rest is split on `[`, so `a[b][c]` navigates
/// `a`, then `b`, then `c`. There is no escaping for literal brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: CompactString,
    segments: Vec<CompactString>,
}

impl FieldPath {
    /// Parse a field path
    pub fn parse(path: &str) -> Self {
        let stripped: CompactString = path.chars().filter(|c| *c != ']').collect();
        let segments = stripped.split('[').map(CompactString::from).collect();
        Self {
            raw: path.into(),
            segments,
        }
    }

    /// The path as it was written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The keys navigated, outermost first
    pub fn segments(&self) -> &[CompactString] {
        &self.segments
    }
}

impl FromStr for FieldPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Look up the scalar at `path` inside `container`
///
/// The walk stops at the first scalar it meets, even when segments remain.
/// Missing keys, `null`, and paths that end on an object or array yield `None`.
/// Arrays are indexed by decimal segments.
pub fn extract<'a>(container: Option<&'a Value>, path: &FieldPath) -> Option<&'a Value> {
    let mut current = container?;
    for segment in path.segments() {
        let next = match current {
            Value::Object(map) => map.get(segment.as_str()),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            None | Some(Value::Null) => return None,
            Some(nested @ (Value::Object(_) | Value::Array(_))) => current = nested,
            Some(scalar) => return Some(scalar),
        }
    }
    None
}

/// Render a scalar as token text; containers and `null` have no rendering
pub fn scalar_text(value: &Value) -> Option<CompactString> {
    match value {
        Value::String(s) => Some(s.as_str().into()),
        Value::Number(n) => Some(n.to_compact_string()),
        Value::Bool(b) => Some(b.to_compact_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Find the submitted token, preferring `body` over `query`
pub fn lookup_token(
    body: Option<&Value>,
    query: Option<&Value>,
    path: &FieldPath,
) -> Option<CompactString> {
    extract(body, path)
        .or_else(|| extract(query, path))
        .and_then(scalar_text)
}

/// Build a nested container from an `application/x-www-form-urlencoded` string
///
/// Keys use the field path syntax, so `otp[value]=1` becomes `{"otp": {"value": "1"}}`.
/// When a key repeats, or conflicts with an existing scalar, the first value is kept.
pub fn container_from_urlencoded(input: &str) -> Result<Value, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(input)?;
    let mut root = Map::new();
    for (key, value) in pairs {
        insert_nested(&mut root, FieldPath::parse(&key).segments(), value);
    }
    Ok(Value::Object(root))
}

fn insert_nested(root: &mut Map<String, Value>, segments: &[CompactString], value: String) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut map = root;
    for segment in parents {
        let entry = map
            .entry(segment.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(child) => map = child,
            _ => return,
        }
    }
    map.entry(last.as_str()).or_insert(Value::String(value));
}
