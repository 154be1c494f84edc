//! Translation of query descriptors into the native query DSL.

use serde_json::{Value, json};

use crate::types::fields;

use super::sanitize::sanitize_query;
use super::{NativeQuery, QueryDescriptor, TermFilter, exact_field};

/// Converts [`QueryDescriptor`]s into native queries.
///
/// `translate` returns `None` ("no query") when the descriptor carries
/// nothing usable: blank fields, blank text, empty term lists, or, in strict
/// mode, unparsable free text. Callers skip the search in that case; it is
/// distinct from a query that matches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTranslator {
    strict: bool,
}

impl QueryTranslator {
    /// Creates a translator; `strict` rejects unparsable free text instead of
    /// broadening it to match everything.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Returns `true` if unparsable free text is rejected.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Translates a descriptor into a native query.
    pub fn translate(&self, descriptor: &QueryDescriptor) -> Option<NativeQuery> {
        let query = match descriptor {
            QueryDescriptor::TermsInList { field, terms } => {
                if blank(field) || terms.is_empty() {
                    return None;
                }
                let terms = Value::Array(terms.clone());
                json!({ "terms": { (exact_field(field, &terms)): terms } })
            }
            QueryDescriptor::Prefix { field, prefix } => {
                if blank(field) || blank(prefix) {
                    return None;
                }
                let prefix = Value::String(prefix.clone());
                json!({ "prefix": { (exact_field(field, &prefix)): prefix } })
            }
            QueryDescriptor::FreeText { query } => {
                if blank(query) {
                    return None;
                }
                self.query_string(query)?
            }
            QueryDescriptor::NestedFreeText { field, query } => {
                if blank(field) || blank(query) {
                    return None;
                }
                let fielded = format!("{}.{}:{}", fields::NESTED, field.trim(), query.trim());
                json!({
                    "nested": {
                        "path": fields::NESTED,
                        "query": self.query_string(&fielded)?,
                    }
                })
            }
            QueryDescriptor::Wildcard { field, pattern } => {
                if blank(field) || blank(pattern) {
                    return None;
                }
                let pattern = Value::String(pattern.clone());
                json!({ "wildcard": { (exact_field(field, &pattern)): pattern } })
            }
            QueryDescriptor::TagsAll { tags } => {
                let must: Vec<Value> = tags
                    .iter()
                    .filter(|tag| !blank(tag))
                    .map(|tag| json!({ "term": { (fields::TAGS): tag } }))
                    .collect();
                if must.is_empty() {
                    return None;
                }
                json!({ "bool": { "must": must } })
            }
            QueryDescriptor::Terms {
                filters,
                must_match_all,
            } => return Self::terms(filters, *must_match_all),
            QueryDescriptor::SimilarTo {
                fields: compare,
                like_text,
                exclude_id,
            } => {
                if blank(like_text) {
                    return None;
                }
                let mut mlt = json!({
                    "like": like_text,
                    "min_doc_freq": 1,
                    "min_term_freq": 1,
                });
                let compare: Vec<&String> = compare.iter().filter(|f| !blank(f)).collect();
                if !compare.is_empty() {
                    mlt["fields"] = json!(compare);
                }
                let similar = json!({ "more_like_this": mlt });
                match exclude_id.as_deref().filter(|id| !blank(id)) {
                    Some(id) => json!({
                        "bool": {
                            "must_not": [{ "term": { (fields::ID): id } }],
                            "filter": [similar],
                        }
                    }),
                    None => similar,
                }
            }
            QueryDescriptor::GeoNearby {
                lat,
                lng,
                radius_km,
            } => json!({
                "geo_distance": {
                    "distance": format!("{}km", radius_km),
                    (fields::LATLNG): { "lat": lat, "lon": lng },
                }
            }),
            QueryDescriptor::MatchAll => return Some(NativeQuery::match_all()),
        };
        Some(NativeQuery::new(query))
    }

    /// Composes equality and range filters.
    ///
    /// Blank filters are skipped. A single usable filter is returned bare;
    /// none at all yields `None`.
    pub fn terms(filters: &[TermFilter], must_match_all: bool) -> Option<NativeQuery> {
        let mut clauses: Vec<Value> = filters
            .iter()
            .filter(|f| !f.is_blank())
            .map(TermFilter::to_native)
            .collect();
        match clauses.len() {
            0 => None,
            1 => clauses.pop().map(NativeQuery::new),
            _ => {
                let occur = if must_match_all { "must" } else { "should" };
                Some(NativeQuery::new(json!({ "bool": { occur: clauses } })))
            }
        }
    }

    /// Builds a query-string query from sanitized free text.
    pub fn free_text(&self, query: &str) -> Option<NativeQuery> {
        self.query_string(query).map(NativeQuery::new)
    }

    fn query_string(&self, raw: &str) -> Option<Value> {
        let sanitized = sanitize_query(raw, self.strict)?;
        Some(json!({
            "query_string": {
                "query": sanitized,
                "allow_leading_wildcard": false,
            }
        }))
    }
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RangeOp;

    fn translate(d: QueryDescriptor) -> Option<Value> {
        QueryTranslator::new(false).translate(&d).map(NativeQuery::into_json)
    }

    #[test]
    fn test_terms_in_list() {
        let q = translate(QueryDescriptor::TermsInList {
            field: "status".into(),
            terms: vec![json!("open"), json!("closed")],
        });
        assert_eq!(q, Some(json!({"terms": {"status.keyword": ["open", "closed"]}})));
        let ids = translate(QueryDescriptor::TermsInList {
            field: "id".into(),
            terms: vec![json!("a")],
        });
        assert_eq!(ids, Some(json!({"terms": {"id": ["a"]}})));
        assert_eq!(
            translate(QueryDescriptor::TermsInList {
                field: " ".into(),
                terms: vec![json!("x")]
            }),
            None
        );
    }

    #[test]
    fn test_prefix_and_wildcard() {
        assert_eq!(
            translate(QueryDescriptor::Prefix {
                field: "title".into(),
                prefix: "Mee".into()
            }),
            Some(json!({"prefix": {"title.keyword": "Mee"}}))
        );
        assert_eq!(
            translate(QueryDescriptor::Wildcard {
                field: "title".into(),
                pattern: "M?et*".into()
            }),
            Some(json!({"wildcard": {"title.keyword": "M?et*"}}))
        );
        assert_eq!(
            translate(QueryDescriptor::Prefix {
                field: "title".into(),
                prefix: "".into()
            }),
            None
        );
    }

    #[test]
    fn test_free_text_is_sanitized() {
        let q = translate(QueryDescriptor::FreeText {
            query: "*notes AND".into(),
        })
        .unwrap();
        assert_eq!(q["query_string"]["query"], "notes");
        assert_eq!(q["query_string"]["allow_leading_wildcard"], false);

        let broad = translate(QueryDescriptor::FreeText {
            query: "title:(open".into(),
        })
        .unwrap();
        assert_eq!(broad["query_string"]["query"], "*");
    }

    #[test]
    fn test_free_text_strict() {
        let strict = QueryTranslator::new(true);
        assert!(
            strict
                .translate(&QueryDescriptor::FreeText {
                    query: "title:(open".into()
                })
                .is_none()
        );
        assert!(strict.is_strict());
    }

    #[test]
    fn test_nested_free_text() {
        let q = translate(QueryDescriptor::NestedFreeText {
            field: "color".into(),
            query: "red".into(),
        })
        .unwrap();
        assert_eq!(q["nested"]["path"], "nstd");
        assert_eq!(q["nested"]["query"]["query_string"]["query"], "nstd.color:red");
    }

    #[test]
    fn test_tags_all() {
        assert_eq!(
            translate(QueryDescriptor::TagsAll {
                tags: vec!["a".into(), " ".into(), "b".into()]
            }),
            Some(json!({"bool": {"must": [
                {"term": {"tags": "a"}},
                {"term": {"tags": "b"}}
            ]}}))
        );
        assert_eq!(translate(QueryDescriptor::TagsAll { tags: vec![] }), None);
    }

    #[test]
    fn test_terms_composition() {
        let single = QueryTranslator::terms(
            &[TermFilter::range("age", RangeOp::Gte, json!(30))],
            true,
        );
        assert_eq!(
            single.map(NativeQuery::into_json),
            Some(json!({"range": {"age": {"gte": 30}}}))
        );

        let both = QueryTranslator::terms(
            &[
                TermFilter::eq("name", json!("Ann")),
                TermFilter::range("age", RangeOp::Lt, json!(40)),
            ],
            false,
        )
        .unwrap();
        assert_eq!(
            both.into_json(),
            json!({"bool": {"should": [
                {"term": {"name.keyword": "Ann"}},
                {"range": {"age": {"lt": 40}}}
            ]}})
        );

        assert!(QueryTranslator::terms(&[TermFilter::eq("name", json!(" "))], true).is_none());
        assert!(QueryTranslator::terms(&[], true).is_none());
    }

    #[test]
    fn test_similar_to() {
        let q = translate(QueryDescriptor::SimilarTo {
            fields: vec!["title".into()],
            like_text: "weekly meeting".into(),
            exclude_id: Some("n1".into()),
        })
        .unwrap();
        assert_eq!(q["bool"]["must_not"][0], json!({"term": {"id": "n1"}}));
        let mlt = &q["bool"]["filter"][0]["more_like_this"];
        assert_eq!(mlt["min_doc_freq"], 1);
        assert_eq!(mlt["min_term_freq"], 1);
        assert_eq!(mlt["fields"], json!(["title"]));

        let bare = translate(QueryDescriptor::SimilarTo {
            fields: vec![],
            like_text: "x".into(),
            exclude_id: None,
        })
        .unwrap();
        assert!(bare["more_like_this"].get("fields").is_none());
    }

    #[test]
    fn test_geo_nearby() {
        let q = translate(QueryDescriptor::GeoNearby {
            lat: 42.5,
            lng: 23.3,
            radius_km: 10.0,
        })
        .unwrap();
        assert_eq!(q["geo_distance"]["distance"], "10km");
        assert_eq!(q["geo_distance"]["latlng"], json!({"lat": 42.5, "lon": 23.3}));
    }

    #[test]
    fn test_match_all() {
        assert_eq!(
            translate(QueryDescriptor::MatchAll),
            Some(json!({"match_all": {}}))
        );
    }
}
