//! Backend-agnostic query vocabulary and its translation to native queries.
//!
//! Callers describe a query with a [`QueryDescriptor`]; the
//! [`QueryTranslator`] turns it into a [`NativeQuery`] in the index engine's
//! query DSL, or into "no query" when the descriptor has nothing usable to
//! filter on.
//!
//! # Example
//!
//! ```
//! use kestrel_search::query::{QueryDescriptor, QueryTranslator, RangeOp, TermFilter};
//! use serde_json::json;
//!
//! let translator = QueryTranslator::new(false);
//! let query = QueryDescriptor::Terms {
//!     filters: vec![TermFilter::range("age", RangeOp::Gte, json!(30))],
//!     must_match_all: true,
//! };
//!
//! let native = translator.translate(&query).unwrap();
//! assert_eq!(native.as_json(), &json!({"range": {"age": {"gte": 30}}}));
//! ```

mod sanitize;
mod translator;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::types::fields;

pub(crate) use sanitize::parse_free_text;
pub use sanitize::{MATCH_ALL_QUERY, MAX_NESTING_DEPTH, sanitize_query};
pub use translator::QueryTranslator;

/// An abstract query, one variant per query operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryDescriptor {
    /// Field equals any of the given terms.
    TermsInList {
        /// Field name.
        field: String,
        /// Accepted values.
        terms: Vec<Value>,
    },
    /// Field starts with a prefix.
    Prefix {
        /// Field name.
        field: String,
        /// Required prefix.
        prefix: String,
    },
    /// Lucene-like free-text query.
    FreeText {
        /// Raw, unsanitized query string.
        query: String,
    },
    /// Free-text query against a field of the nested object.
    NestedFreeText {
        /// Field name inside the nested object.
        field: String,
        /// Raw, unsanitized query string.
        query: String,
    },
    /// Field matches a `*`/`?` wildcard pattern.
    Wildcard {
        /// Field name.
        field: String,
        /// Wildcard pattern.
        pattern: String,
    },
    /// Object carries every one of the tags.
    TagsAll {
        /// Required tags.
        tags: Vec<String>,
    },
    /// Composition of equality and range filters.
    Terms {
        /// Filters to compose.
        filters: Vec<TermFilter>,
        /// Conjunction when `true`, disjunction otherwise.
        must_match_all: bool,
    },
    /// Objects similar to a piece of text.
    SimilarTo {
        /// Fields to compare; all fields when empty.
        fields: Vec<String>,
        /// Text to compare against.
        like_text: String,
        /// Object id excluded from the results.
        exclude_id: Option<String>,
    },
    /// Objects within a radius of a point.
    GeoNearby {
        /// Latitude.
        lat: f64,
        /// Longitude.
        lng: f64,
        /// Radius in kilometers.
        radius_km: f64,
    },
    /// Every object.
    MatchAll,
}

/// Relational operator of a range filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeOp {
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl RangeOp {
    /// Returns the operator's name in the native range query.
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            ">" => Some(RangeOp::Gt),
            ">=" => Some(RangeOp::Gte),
            "<" => Some(RangeOp::Lt),
            "<=" => Some(RangeOp::Lte),
            _ => None,
        }
    }
}

/// A single filter inside a [`QueryDescriptor::Terms`] composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TermFilter {
    /// Field equals a value.
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Field compares to a value.
    Range {
        /// Field name.
        field: String,
        /// Operator.
        op: RangeOp,
        /// Bound.
        value: Value,
    },
}

impl TermFilter {
    /// Creates an equality filter.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        TermFilter::Eq {
            field: field.into(),
            value,
        }
    }

    /// Creates a range filter.
    pub fn range(field: impl Into<String>, op: RangeOp, value: Value) -> Self {
        TermFilter::Range {
            field: field.into(),
            op,
            value,
        }
    }

    /// Returns the filtered field.
    pub fn field(&self) -> &str {
        match self {
            TermFilter::Eq { field, .. } | TermFilter::Range { field, .. } => field,
        }
    }

    /// Returns the operand.
    pub fn value(&self) -> &Value {
        match self {
            TermFilter::Eq { value, .. } | TermFilter::Range { value, .. } => value,
        }
    }

    /// Returns `true` if the filter has a blank field or a null/blank value.
    pub fn is_blank(&self) -> bool {
        let blank_value = match self.value() {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        self.field().trim().is_empty() || blank_value
    }

    /// Converts a legacy terms map into explicit filters.
    ///
    /// A key ending in `<`, `>`, `<=` or `>=` becomes a range filter on the
    /// key with the operator stripped. Blank keys and null or blank values
    /// are skipped.
    ///
    /// ```
    /// use kestrel_search::query::{RangeOp, TermFilter};
    /// use serde_json::json;
    ///
    /// let map = json!({"age>=": 30, "name": "Ann", "skip": " "});
    /// let filters = TermFilter::from_terms_map(map.as_object().unwrap());
    /// assert_eq!(filters, vec![
    ///     TermFilter::range("age", RangeOp::Gte, json!(30)),
    ///     TermFilter::eq("name", json!("Ann")),
    /// ]);
    /// ```
    pub fn from_terms_map(terms: &Map<String, Value>) -> Vec<TermFilter> {
        terms
            .iter()
            .filter_map(|(key, value)| {
                let filter = Self::parse_key(key, value.clone());
                (!filter.is_blank()).then_some(filter)
            })
            .collect()
    }

    fn parse_key(key: &str, value: Value) -> Self {
        let trimmed = key.trim();
        let op = [">=", "<=", ">", "<"]
            .into_iter()
            .find(|suffix| trimmed.ends_with(suffix))
            .and_then(RangeOp::from_suffix);

        match op {
            Some(op) => {
                let field = trimmed
                    .trim_end_matches(|c: char| matches!(c, '<' | '>' | '=') || c.is_whitespace());
                TermFilter::range(field, op, value)
            }
            None => TermFilter::eq(key, value),
        }
    }

    pub(crate) fn to_native(&self) -> Value {
        match self {
            TermFilter::Eq { field, value } => {
                json!({ "term": { (exact_field(field, value)): value } })
            }
            TermFilter::Range { field, op, value } => {
                json!({ "range": { (exact_field(field, value)): { (op.as_str()): value } } })
            }
        }
    }
}

/// Returns the index field holding the unanalyzed value of `field` when
/// compared against `operand`.
///
/// Dynamic string fields are analyzed text; their exact value lives in the
/// `keyword` subfield. Reserved fields are keywords already, and non-string
/// operands (numbers, booleans) compare against the field itself.
pub(crate) fn exact_field(field: &str, operand: &Value) -> String {
    let field = field.trim();
    let textual = match operand {
        Value::String(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_string),
        _ => false,
    };
    let suffix = format!(".{}", fields::KEYWORD_SUBFIELD);
    if !textual || fields::KEYWORDS.contains(&field) || field.ends_with(&suffix) {
        field.to_string()
    } else {
        format!("{}{}", field, suffix)
    }
}

/// A query in the index engine's native query DSL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeQuery(Value);

impl NativeQuery {
    /// Wraps a raw native query.
    pub fn new(query: Value) -> Self {
        Self(query)
    }

    /// The universal "match everything" query.
    pub fn match_all() -> Self {
        Self(json!({ "match_all": {} }))
    }

    /// Returns the query as JSON.
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Consumes the query, returning its JSON.
    pub fn into_json(self) -> Value {
        self.0
    }
}

impl From<Value> for NativeQuery {
    fn from(query: Value) -> Self {
        Self(query)
    }
}
