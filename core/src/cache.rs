//! In-memory response cache for GET requests.
//!
//! Entries expire lazily: a stale entry stays in the map (and is counted by
//! [`ResponseCache::len`]) until the next [`ResponseCache::get`] for its key
//! removes it. There is no background sweep.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::clock::Clock;

/// Scalar query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl QueryValue {
    /// Text sent on the wire as a query-string value.
    pub fn to_query_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    fn key_repr(&self) -> String {
        match self {
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::Str(s) => quote_str(s),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// Single quotes unless the text holds a single quote and no double quote.
fn quote_str(raw: &str) -> String {
    let quote = if raw.contains('\'') && !raw.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(raw.len() + 2);
    out.push(quote);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Builds the cache key for `endpoint` and its query parameters.
///
/// Parameters are sorted by name so that callers passing the same pairs in a
/// different order land on the same key:
/// `users/123:[('limit', 10), ('sort', 'name')]`. No parameters gives
/// `users/123:`.
pub fn cache_key(endpoint: &str, params: &[(String, QueryValue)]) -> String {
    if params.is_empty() {
        return format!("{endpoint}:");
    }
    let mut rendered: Vec<(&str, String)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.key_repr()))
        .collect();
    rendered.sort();
    let pairs = rendered
        .iter()
        .map(|(k, v)| format!("({}, {v})", quote_str(k)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{endpoint}:[{pairs}]")
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    stored_at: DateTime<Utc>,
}

pub struct ResponseCache {
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the payload if it is younger than the TTL. A stale entry is
    /// removed as a side effect.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        if now - entry.stored_at < self.ttl {
            return Some(entry.payload.clone());
        }
        entries.remove(key);
        None
    }

    /// Stores `payload` under `key`, replacing any previous entry and
    /// restarting its TTL.
    pub fn set(&self, key: impl Into<String>, payload: Value) {
        let stored_at = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), CacheEntry { payload, stored_at });
    }

    /// Entries currently held, including expired ones no lookup has touched yet.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}
