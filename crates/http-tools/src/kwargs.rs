//! Recovery of structured arguments from a free-text `kwargs` blob.
//!
//! Some callers hand over a single string instead of an argument map. Strategies are tried in a
//! fixed order and the first one yielding a map wins; if none does, the result is empty and the
//! binder reports whatever is then missing.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;
use tracing::debug;

static EMBEDDED_OBJECT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Json,
    UnescapedQuotes,
    UnescapedBackslashes,
    UnescapedBoth,
    EmbeddedObject,
    QueryString,
    CommaPairs,
}

/// Parse `raw` into an argument map; an empty map means every strategy failed.
#[must_use]
pub fn parse_kwargs(raw: &str) -> Map<String, Value> {
    parse_kwargs_with_strategy(raw).map_or_else(Map::new, |(map, _)| map)
}

/// Like [`parse_kwargs`], also reporting which strategy succeeded.
#[must_use]
pub fn parse_kwargs_with_strategy(raw: &str) -> Option<(Map<String, Value>, Strategy)> {
    let input = raw.trim();
    if input.is_empty() {
        return None;
    }

    let attempts: [(Strategy, fn(&str) -> Option<Map<String, Value>>); 7] = [
        (Strategy::Json, json_object),
        (Strategy::UnescapedQuotes, |s| json_object(&s.replace("\\\"", "\""))),
        (Strategy::UnescapedBackslashes, |s| {
            json_object(&s.replace("\\\\", "\\"))
        }),
        (Strategy::UnescapedBoth, |s| {
            json_object(&s.replace("\\\\", "\\").replace("\\\"", "\""))
        }),
        (Strategy::EmbeddedObject, embedded_object),
        (Strategy::QueryString, query_string),
        (Strategy::CommaPairs, comma_pairs),
    ];

    for (strategy, attempt) in attempts {
        if let Some(map) = attempt(input) {
            debug!(?strategy, keys = map.len(), "recovered kwargs");
            return Some((map, strategy));
        }
    }
    debug!("kwargs could not be parsed by any strategy");
    None
}

fn json_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn embedded_object(s: &str) -> Option<Map<String, Value>> {
    let re = EMBEDDED_OBJECT.as_ref()?;
    let found = re.find(s)?;
    json_object(found.as_str())
}

/// `a=1&b=2`. Inputs with commas and no `&` are left to [`comma_pairs`].
fn query_string(s: &str) -> Option<Map<String, Value>> {
    if !s.contains('=') || (s.contains(',') && !s.contains('&')) {
        return None;
    }
    let mut map = Map::new();
    for segment in s.split('&').filter(|seg| !seg.is_empty()) {
        if !segment.contains('=') {
            return None;
        }
        for (k, v) in url::form_urlencoded::parse(segment.as_bytes()) {
            if k.trim().is_empty() {
                return None;
            }
            map.insert(k.trim().to_string(), Value::String(v.into_owned()));
        }
    }
    (!map.is_empty()).then_some(map)
}

/// `a=1, b=two`, numeric values become numbers. A fragment without `=` continues the
/// previous value, so `ids=1,2` keeps both parts as the text `"1,2"`.
fn comma_pairs(s: &str) -> Option<Map<String, Value>> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for fragment in s.split(',') {
        match fragment.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                pairs.push((k.trim().to_string(), v.trim().to_string()));
            }
            Some(_) => {}
            None => {
                if let Some((_, value)) = pairs.last_mut() {
                    value.push(',');
                    value.push_str(fragment.trim());
                }
            }
        }
    }
    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| {
            let value = scalar_from_text(&v);
            (k, value)
        })
        .collect();
    (!map.is_empty()).then_some(map)
}

fn scalar_from_text(v: &str) -> Value {
    if let Ok(i) = v.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = v.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    let unquoted = v
        .strip_prefix('"')
        .and_then(|x| x.strip_suffix('"'))
        .or_else(|| v.strip_prefix('\'').and_then(|x| x.strip_suffix('\'')))
        .unwrap_or(v);
    Value::String(unquoted.to_string())
}
