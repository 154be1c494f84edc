//! Evaluation of native queries against in-memory documents.
//!
//! Fields follow the index mapping. Reserved keyword fields and `.keyword`
//! sub-fields hold the raw value and match it exactly and case-sensitively.
//! Any other string field is a text field holding lowercased word tokens.
//! Term, prefix and wildcard clauses compare against those tokens unanalyzed,
//! while `query_string` input is analyzed the same way as the text.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};
use tantivy_query_grammar::{Occur, UserInputAst, UserInputBound, UserInputLeaf, UserInputLiteral};

use crate::error::{SearchError, StorageError, StorageResult};
use crate::query::parse_free_text;
use crate::types::fields;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Returns `true` if the document matches the native query.
pub(crate) fn matches(query: &Value, id: &str, doc: &Value) -> StorageResult<bool> {
    let body = query
        .as_object()
        .filter(|m| m.len() == 1)
        .ok_or_else(|| unsupported(format!("query must have a single clause: {}", query)))?;
    let Some((kind, body)) = body.iter().next() else {
        return Err(unsupported("empty query"));
    };

    match kind.as_str() {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "term" => {
            let (field, value) = field_operand(body)?;
            Ok(term_matches(doc, field, value))
        }
        "terms" => {
            let (field, list) = field_operand(body)?;
            let list = list
                .as_array()
                .ok_or_else(|| unsupported("terms requires an array"))?;
            Ok(list.iter().any(|t| term_matches(doc, field, t)))
        }
        "prefix" => {
            let (field, value) = field_operand(body)?;
            let prefix = text_of(value);
            Ok(indexed_terms(doc, field)
                .iter()
                .any(|t| t.starts_with(&prefix)))
        }
        "wildcard" => {
            let (field, value) = field_operand(body)?;
            let re = wildcard_regex(&text_of(value))?;
            Ok(indexed_terms(doc, field).iter().any(|t| re.is_match(t)))
        }
        "range" => {
            let (field, bounds) = field_operand(body)?;
            let bounds = bounds
                .as_object()
                .ok_or_else(|| unsupported("range requires bounds"))?;
            Ok(values_at(doc, field)
                .into_iter()
                .any(|v| in_range(v, bounds)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("exists requires a field"))?;
            Ok(values_at(doc, field).iter().any(|v| !v.is_null()))
        }
        "ids" => {
            let values = body
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| unsupported("ids requires values"))?;
            Ok(values.iter().any(|v| v.as_str() == Some(id)))
        }
        "bool" => eval_bool(body, id, doc),
        "nested" => {
            let inner = body
                .get("query")
                .ok_or_else(|| unsupported("nested requires a query"))?;
            matches(inner, id, doc)
        }
        "query_string" => {
            let query = body
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("query_string requires a query"))?;
            let ast = parse_free_text(query)?;
            eval_ast(&ast, doc)
        }
        "more_like_this" => Ok(more_like_this(body, doc)),
        "geo_distance" => geo_distance(body, doc),
        other => Err(unsupported(other)),
    }
}

/// Orders two field values; numbers numerically, everything else as text.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

/// Returns the first value of a (dotted) field.
pub(crate) fn first_value<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    values_at(doc, field).into_iter().next()
}

fn unsupported(construct: impl Into<String>) -> StorageError {
    StorageError::Search(SearchError::UnsupportedQuery {
        construct: construct.into(),
    })
}

/// Splits `{field: operand}` and unwraps `{field: {"value": operand}}`.
fn field_operand(body: &Value) -> StorageResult<(&str, &Value)> {
    let (field, operand) = body
        .as_object()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() != "boost"))
        .ok_or_else(|| unsupported(format!("expected a field clause: {}", body)))?;
    let operand = match operand.get("value") {
        Some(v) if operand.is_object() => v,
        _ => operand,
    };
    Ok((field.as_str(), operand))
}

fn clauses<'a>(body: &'a Value, occur: &str) -> Vec<&'a Value> {
    match body.get(occur) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn eval_bool(body: &Value, id: &str, doc: &Value) -> StorageResult<bool> {
    let must = clauses(body, "must");
    let filter = clauses(body, "filter");
    let should = clauses(body, "should");
    let must_not = clauses(body, "must_not");

    for q in must.iter().chain(filter.iter()) {
        if !matches(q, id, doc)? {
            return Ok(false);
        }
    }
    for q in &must_not {
        if matches(q, id, doc)? {
            return Ok(false);
        }
    }

    let default_min = usize::from(must.is_empty() && filter.is_empty() && !should.is_empty());
    let min_should = body
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .map_or(default_min, |n| n as usize);
    if min_should == 0 {
        return Ok(true);
    }
    let mut matched = 0;
    for q in &should {
        if matches(q, id, doc)? {
            matched += 1;
            if matched >= min_should {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Returns `true` if the path is mapped as an exact keyword.
fn is_keyword_path(path: &str) -> bool {
    path.strip_suffix(".keyword").is_some() || fields::KEYWORDS.contains(&path)
}

/// Terms the index holds for a field: raw strings on keyword paths, lowercased
/// tokens on text paths, and the plain rendering of non-string values.
fn indexed_terms(doc: &Value, path: &str) -> Vec<String> {
    let keyword = is_keyword_path(path);
    values_at(doc, path)
        .into_iter()
        .filter(|v| !v.is_object() && !v.is_null())
        .flat_map(|v| match v {
            Value::String(s) if !keyword => tokens(s),
            other => vec![text_of(other)],
        })
        .collect()
}

fn term_matches(doc: &Value, path: &str, term: &Value) -> bool {
    if let Value::Number(n) = term {
        let wanted = n.as_f64();
        return values_at(doc, path)
            .into_iter()
            .any(|v| as_number(v) == wanted);
    }
    if let Value::Bool(wanted) = term {
        return values_at(doc, path)
            .into_iter()
            .any(|v| v.as_bool() == Some(*wanted));
    }
    let wanted = text_of(term);
    indexed_terms(doc, path).iter().any(|t| *t == wanted)
}

fn eval_ast(ast: &UserInputAst, doc: &Value) -> StorageResult<bool> {
    match ast {
        UserInputAst::Boost(inner, _) => eval_ast(inner, doc),
        UserInputAst::Leaf(leaf) => eval_leaf(leaf, doc),
        UserInputAst::Clause(items) => {
            let mut has_must = false;
            let mut any_should = false;
            let mut should_matched = false;
            for (occur, sub) in items {
                let matched = eval_ast(sub, doc)?;
                match occur {
                    Some(Occur::Must) => {
                        has_must = true;
                        if !matched {
                            return Ok(false);
                        }
                    }
                    Some(Occur::MustNot) => {
                        if matched {
                            return Ok(false);
                        }
                    }
                    Some(Occur::Should) | None => {
                        any_should = true;
                        should_matched |= matched;
                    }
                }
            }
            Ok(has_must || !any_should || should_matched)
        }
    }
}

fn eval_leaf(leaf: &UserInputLeaf, doc: &Value) -> StorageResult<bool> {
    match leaf {
        UserInputLeaf::All => Ok(true),
        UserInputLeaf::Literal(literal) => eval_literal(literal, doc),
        UserInputLeaf::Range {
            field,
            lower,
            upper,
            ..
        } => {
            let mut bounds = Map::new();
            for (bound, inclusive, exclusive) in [(lower, "gte", "gt"), (upper, "lte", "lt")] {
                match bound {
                    UserInputBound::Inclusive(v) => {
                        bounds.insert(inclusive.to_string(), Value::String(v.clone()));
                    }
                    UserInputBound::Exclusive(v) => {
                        bounds.insert(exclusive.to_string(), Value::String(v.clone()));
                    }
                    UserInputBound::Unbounded => {}
                }
            }
            let candidates = match field {
                Some(f) => values_at(doc, f),
                None => leaf_values(doc),
            };
            if bounds.is_empty() {
                return Ok(candidates.iter().any(|v| !v.is_null()));
            }
            Ok(candidates.into_iter().any(|v| in_range(v, &bounds)))
        }
        _ => Err(unsupported("free-text construct")),
    }
}

fn eval_literal(literal: &UserInputLiteral, doc: &Value) -> StorageResult<bool> {
    let UserInputLiteral {
        field_name,
        phrase,
        prefix,
        ..
    } = literal;
    let field = field_name.as_deref();

    if phrase == "*" {
        return Ok(field.is_some_and(|f| values_at(doc, f).iter().any(|v| !v.is_null())));
    }
    if field.is_some_and(is_keyword_path) {
        let pattern = if *prefix {
            format!("{}*", phrase)
        } else {
            phrase.clone()
        };
        let re = wildcard_regex(&pattern)?;
        let terms = field.map(|f| indexed_terms(doc, f)).unwrap_or_default();
        return Ok(terms.iter().any(|t| re.is_match(t)));
    }

    let texts = texts_at(doc, field);
    if *prefix || phrase.contains(['*', '?']) {
        let pattern = if *prefix {
            format!("{}*", phrase.to_lowercase())
        } else {
            phrase.to_lowercase()
        };
        let re = wildcard_regex(&pattern)?;
        return Ok(texts
            .iter()
            .any(|s| tokens(s).iter().any(|t| re.is_match(t))));
    }
    let wanted = tokens(phrase);
    if wanted.is_empty() {
        return Ok(false);
    }
    Ok(texts.iter().any(|s| {
        tokens(s)
            .windows(wanted.len())
            .any(|w| w == wanted.as_slice())
    }))
}

fn more_like_this(body: &Value, doc: &Value) -> bool {
    let like = body.get("like").map(text_of).unwrap_or_default();
    let wanted = tokens(&like);
    if wanted.is_empty() {
        return false;
    }
    let texts: Vec<String> = match body.get("fields").and_then(Value::as_array) {
        Some(list) => list
            .iter()
            .filter_map(Value::as_str)
            .flat_map(|f| texts_at(doc, Some(f)))
            .collect(),
        None => doc
            .as_object()
            .map(|m| {
                m.iter()
                    .filter(|(k, _)| !fields::METADATA.contains(&k.as_str()))
                    .flat_map(|(_, v)| leaf_values(v))
                    .map(text_of)
                    .collect()
            })
            .unwrap_or_default(),
    };
    texts
        .iter()
        .flat_map(|s| tokens(s))
        .any(|t| wanted.contains(&t))
}

fn geo_distance(body: &Value, doc: &Value) -> StorageResult<bool> {
    let map = body
        .as_object()
        .ok_or_else(|| unsupported("geo_distance requires an object"))?;
    let radius_km = map
        .get("distance")
        .and_then(parse_distance_km)
        .ok_or_else(|| unsupported("geo_distance requires a distance"))?;
    let (field, origin) = map
        .iter()
        .find(|(k, _)| !matches!(k.as_str(), "distance" | "distance_type" | "validation_method"))
        .ok_or_else(|| unsupported("geo_distance requires a point field"))?;
    let origin = parse_point(origin).ok_or_else(|| unsupported("invalid geo point"))?;

    Ok(values_at(doc, field)
        .into_iter()
        .filter_map(parse_point)
        .any(|p| haversine_km(origin, p) <= radius_km))
}

fn parse_distance_km(value: &Value) -> Option<f64> {
    if let Some(meters) = value.as_f64() {
        return Some(meters / 1000.0);
    }
    let s = value.as_str()?.trim();
    let (number, factor) = if let Some(n) = s.strip_suffix("km") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("mi") {
        (n, 1.609_344)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 0.001)
    } else {
        (s, 0.001)
    };
    number.trim().parse::<f64>().ok().map(|n| n * factor)
}

/// Parses `"lat,lon"`, `{"lat", "lon"}` or `[lon, lat]`.
fn parse_point(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
        }
        Value::Object(m) => Some((m.get("lat")?.as_f64()?, m.get("lon")?.as_f64()?)),
        Value::Array(items) if items.len() == 2 => Some((items[1].as_f64()?, items[0].as_f64()?)),
        _ => None,
    }
}

fn haversine_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

fn in_range(value: &Value, bounds: &Map<String, Value>) -> bool {
    if value.is_null() || bounds.is_empty() {
        return false;
    }
    bounds.iter().all(|(op, bound)| {
        let ord = compare_values(value, bound);
        match op.as_str() {
            "gt" => ord == Ordering::Greater,
            "gte" => ord != Ordering::Less,
            "lt" => ord == Ordering::Less,
            "lte" => ord != Ordering::Greater,
            _ => true,
        }
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn wildcard_regex(pattern: &str) -> StorageResult<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| unsupported(format!("wildcard '{}': {}", pattern, e)))
}

/// Resolves a dotted field path, flattening arrays along the way.
fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for part in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value.get(part) {
                Some(Value::Array(items)) => next.extend(items.iter()),
                Some(v) => next.push(v),
                None => {}
            }
        }
        current = next;
    }
    if current.is_empty() {
        if let Some(base) = path.strip_suffix(".keyword") {
            return values_at(doc, base);
        }
    }
    current
}

fn leaf_values(value: &Value) -> Vec<&Value> {
    match value {
        Value::Object(m) => m.values().flat_map(leaf_values).collect(),
        Value::Array(items) => items.iter().flat_map(leaf_values).collect(),
        Value::Null => Vec::new(),
        leaf => vec![leaf],
    }
}

fn texts_at(doc: &Value, field: Option<&str>) -> Vec<String> {
    let values = match field {
        Some(f) => values_at(doc, f),
        None => leaf_values(doc),
    };
    values
        .into_iter()
        .filter(|v| !v.is_object())
        .map(text_of)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "id": "n1",
            "type": "note",
            "appid": "acct-42",
            "title": "Meeting notes",
            "tags": ["work", "weekly"],
            "votes": 7,
            "latlng": "42.69,23.32",
            "nstd": [{"color": "red"}, {"color": "blue"}],
        })
    }

    fn check(query: Value) -> bool {
        matches(&query, "n1", &doc()).unwrap()
    }

    #[test]
    fn test_term_and_terms() {
        assert!(check(json!({"term": {"type": "note"}})));
        assert!(check(json!({"term": {"tags": "weekly"}})));
        assert!(check(json!({"term": {"title.keyword": "Meeting notes"}})));
        assert!(check(json!({"term": {"title": "meeting"}})));
        assert!(!check(json!({"term": {"type": "task"}})));
        assert!(check(json!({"terms": {"type": ["task", "note"]}})));
        assert!(check(json!({"term": {"votes": {"value": 7}}})));
    }

    #[test]
    fn test_term_is_case_exact() {
        assert!(!check(json!({"term": {"title.keyword": "meeting notes"}})));
        assert!(!check(json!({"term": {"title.keyword": "Meeting"}})));
        assert!(!check(json!({"term": {"title": "Meeting"}})));
        assert!(!check(json!({"term": {"type": "Note"}})));
        assert!(!check(json!({"terms": {"tags": ["Work", "WEEKLY"]}})));
    }

    #[test]
    fn test_prefix_and_wildcard() {
        assert!(check(json!({"prefix": {"title.keyword": "Mee"}})));
        assert!(!check(json!({"prefix": {"title.keyword": "mee"}})));
        assert!(!check(json!({"prefix": {"title.keyword": "not"}})));
        assert!(check(json!({"prefix": {"title": "not"}})));
        assert!(!check(json!({"prefix": {"title": "Mee"}})));
        assert!(check(json!({"wildcard": {"title.keyword": "M?et*"}})));
        assert!(!check(json!({"wildcard": {"title.keyword": "m?et*"}})));
        assert!(check(json!({"wildcard": {"title": "m?et*"}})));
        assert!(!check(json!({"wildcard": {"title.keyword": "Z*"}})));
    }

    #[test]
    fn test_range() {
        assert!(check(json!({"range": {"votes": {"gte": 7, "lt": 10}}})));
        assert!(!check(json!({"range": {"votes": {"gt": 7}}})));
        assert!(!check(json!({"range": {"missing": {"lte": 1}}})));
    }

    #[test]
    fn test_bool() {
        assert!(check(json!({"bool": {
            "must": [{"term": {"type": "note"}}],
            "must_not": [{"term": {"tags": "archived"}}]
        }})));
        assert!(!check(json!({"bool": {"should": [{"term": {"type": "x"}}]}})));
        assert!(check(json!({"bool": {
            "must": {"term": {"type": "note"}},
            "should": [{"term": {"type": "x"}}]
        }})));
        assert!(check(json!({"bool": {"must_not": [{"term": {"type": "x"}}]}})));
    }

    #[test]
    fn test_ids() {
        assert!(check(json!({"ids": {"values": ["n1", "n2"]}})));
        assert!(!check(json!({"ids": {"values": ["n2"]}})));
    }

    #[test]
    fn test_query_string() {
        assert!(check(json!({"query_string": {"query": "meeting"}})));
        assert!(check(json!({"query_string": {"query": "MEETING"}})));
        assert!(check(json!({"query_string": {"query": "title:meet*"}})));
        assert!(check(json!({"query_string": {"query": "\"meeting notes\""}})));
        assert!(!check(json!({"query_string": {"query": "\"notes meeting\""}})));
        assert!(check(json!({"query_string": {"query": "votes:[5 TO 10]"}})));
        assert!(!check(json!({"query_string": {"query": "votes:{7 TO 10}"}})));
        assert!(!check(json!({"query_string": {"query": "title:meeting -tags:work"}})));
        assert!(check(json!({"query_string": {"query": "title:meeting -tags:archived"}})));
        assert!(check(json!({"query_string": {"query": "+type:note +(title:retro OR title:notes)"}})));
        assert!(check(json!({"query_string": {"query": "*"}})));
        assert!(matches(&json!({"query_string": {"query": "(open"}}), "n1", &doc()).is_err());
    }

    #[test]
    fn test_query_string_on_keyword_field_is_exact() {
        assert!(check(json!({"query_string": {"query": "type:note"}})));
        assert!(!check(json!({"query_string": {"query": "type:Note"}})));
    }

    #[test]
    fn test_nested() {
        assert!(check(json!({"nested": {
            "path": "nstd",
            "query": {"query_string": {"query": "nstd.color:red"}}
        }})));
        assert!(!check(json!({"nested": {
            "path": "nstd",
            "query": {"query_string": {"query": "nstd.color:green"}}
        }})));
    }

    #[test]
    fn test_more_like_this() {
        assert!(check(json!({"more_like_this": {"like": "weekly sync", "min_doc_freq": 1}})));
        assert!(check(json!({"more_like_this": {"like": "notes", "fields": ["title"]}})));
        assert!(!check(json!({"more_like_this": {"like": "note", "fields": ["title"]}})));
    }

    #[test]
    fn test_geo_distance() {
        assert!(check(json!({"geo_distance": {
            "distance": "5km", "latlng": {"lat": 42.70, "lon": 23.33}
        }})));
        assert!(!check(json!({"geo_distance": {
            "distance": "5km", "latlng": {"lat": 48.85, "lon": 2.35}
        }})));
    }

    #[test]
    fn test_unsupported_clause() {
        assert!(matches(&json!({"script": {}}), "n1", &doc()).is_err());
        assert!(matches(&json!({}), "n1", &doc()).is_err());
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!("10")), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
