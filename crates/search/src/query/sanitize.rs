//! Free-text query sanitation.
//!
//! User input is cleaned up before it reaches the Lucene-like query parser of
//! the index engine, which would otherwise fail at execution time or
//! silently match nothing. The trial parse uses tantivy's query grammar.

use tantivy_query_grammar::{UserInputAst, parse_query};

use crate::error::{SearchError, SearchResult};

/// The universal "match everything" free-text query.
pub const MATCH_ALL_QUERY: &str = "*";

/// Deepest parenthesis nesting accepted in a free-text query.
pub const MAX_NESTING_DEPTH: usize = 32;

const DANGLING_OPERATORS: [&str; 3] = ["and", "or", "not"];

/// Sanitizes a free-text query.
///
/// - leading wildcards are stripped
/// - a wildcard following whitespace is dropped
/// - dangling trailing `AND`/`OR`/`NOT` tokens are trimmed (any case)
/// - the result is trial-parsed
///
/// A query that still fails to parse becomes [`MATCH_ALL_QUERY`], or `None`
/// when `strict` is set.
///
/// ```
/// use kestrel_search::query::sanitize_query;
///
/// assert_eq!(sanitize_query("*foo", false).as_deref(), Some("foo"));
/// assert_eq!(sanitize_query("foo AND", false).as_deref(), Some("foo"));
/// assert_eq!(sanitize_query("(foo", false).as_deref(), Some("*"));
/// assert_eq!(sanitize_query("(foo", true), None);
/// ```
pub fn sanitize_query(query: &str, strict: bool) -> Option<String> {
    let mut q = query.trim().to_string();

    if q.len() > 1 {
        q = q.trim_start_matches(['*', '?']).trim_start().to_string();
    }
    if q.len() > 1 && has_spaced_wildcard(&q) {
        q = collapse_spaced_wildcards(&q).trim().to_string();
    }
    q = trim_dangling_operators(&q);

    if q.is_empty() {
        return Some(MATCH_ALL_QUERY.to_string());
    }

    match parse_free_text(&q) {
        Ok(_) => Some(q),
        Err(e) => {
            tracing::debug!(query = %query, error = %e, "Unparsable free-text query");
            if strict {
                None
            } else {
                Some(MATCH_ALL_QUERY.to_string())
            }
        }
    }
}

/// Parses a free-text query into its syntax tree.
///
/// Queries nested deeper than [`MAX_NESTING_DEPTH`] are rejected before
/// parsing.
pub(crate) fn parse_free_text(query: &str) -> SearchResult<UserInputAst> {
    let depth = nesting_depth(query);
    if depth > MAX_NESTING_DEPTH {
        return Err(parse_error(
            query,
            format!("nesting depth {} exceeds {}", depth, MAX_NESTING_DEPTH),
        ));
    }
    parse_query(query).map_err(|_| parse_error(query, "invalid syntax".to_string()))
}

fn parse_error(query: &str, message: String) -> SearchError {
    let query = match query.char_indices().nth(64) {
        Some((end, _)) => format!("{}...", &query[..end]),
        None => query.to_string(),
    };
    SearchError::QueryParseError { query, message }
}

/// Deepest run of open parentheses outside quoted phrases.
fn nesting_depth(query: &str) -> usize {
    let (mut depth, mut max) = (0usize, 0usize);
    let mut quoted = false;
    let mut chars = query.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => quoted = !quoted,
            '(' if !quoted => {
                depth += 1;
                max = max.max(depth);
            }
            ')' if !quoted => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

fn has_spaced_wildcard(q: &str) -> bool {
    let mut prev_ws = false;
    for c in q.chars() {
        if prev_ws && c == '*' {
            return true;
        }
        prev_ws = c.is_whitespace();
    }
    false
}

fn collapse_spaced_wildcards(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    let mut chars = q.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() && chars.peek() == Some(&'*') {
            chars.next();
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

fn trim_dangling_operators(q: &str) -> String {
    let mut rest = q.trim_end();
    loop {
        let (head, last) = match rest.rsplit_once(char::is_whitespace) {
            Some((head, last)) => (head, last),
            None => ("", rest),
        };
        if DANGLING_OPERATORS
            .iter()
            .any(|op| last.eq_ignore_ascii_case(op))
        {
            rest = head.trim_end();
        } else {
            return rest.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lenient(q: &str) -> String {
        sanitize_query(q, false).unwrap()
    }

    #[test]
    fn test_leading_wildcard_stripped() {
        assert_eq!(lenient("*foo"), "foo");
        assert_eq!(lenient("**?foo"), "foo");
        assert_eq!(lenient("*"), "*");
    }

    #[test]
    fn test_spaced_wildcards_collapsed() {
        assert_eq!(lenient("foo *bar"), "foo bar");
        assert_eq!(lenient("foo *"), "foo");
        assert_eq!(lenient("fo* bar"), "fo* bar");
    }

    #[test]
    fn test_trailing_operators_trimmed() {
        assert_eq!(lenient("foo AND"), "foo");
        assert_eq!(lenient("foo or"), "foo");
        assert_eq!(lenient("foo bar Not"), "foo bar");
        assert_eq!(lenient("foo AND NOT"), "foo");
        assert_eq!(lenient("sand"), "sand");
        assert_eq!(lenient("AND"), "*");
    }

    #[test]
    fn test_unparsable_becomes_match_all() {
        assert_eq!(lenient("(foo"), "*");
        assert_eq!(lenient("title:(open"), "*");
        assert_eq!(lenient("\"open phrase"), "*");
        assert_eq!(lenient("a)"), "*");
    }

    #[test]
    fn test_deep_nesting_is_unparsable() {
        let deep = format!("{}a{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(lenient(&deep), "*");
        assert_eq!(sanitize_query(&deep, true), None);

        let limit = format!(
            "{}a{}",
            "(".repeat(MAX_NESTING_DEPTH),
            ")".repeat(MAX_NESTING_DEPTH)
        );
        assert_eq!(lenient(&limit), limit);
        assert!(matches!(
            parse_free_text(&format!("(({}", limit)),
            Err(SearchError::QueryParseError { .. })
        ));
    }

    #[test]
    fn test_nesting_depth_ignores_quotes_and_escapes() {
        assert_eq!(nesting_depth("a (b (c) d)"), 2);
        assert_eq!(nesting_depth("\"((((\" x"), 0);
        assert_eq!(nesting_depth("\\( (x)"), 1);
    }

    #[test]
    fn test_strict_mode_rejects() {
        assert_eq!(sanitize_query("(foo", true), None);
        assert_eq!(sanitize_query("foo AND", true).as_deref(), Some("foo"));
    }

    #[test]
    fn test_blank_is_match_all() {
        assert_eq!(lenient(""), "*");
        assert_eq!(lenient("   "), "*");
    }

    #[test]
    fn test_valid_queries_untouched() {
        for q in [
            "title:Meeting",
            "a AND (b OR c)",
            "\"exact phrase\"",
            "age:[10 TO 20]",
            "-archived +title:notes",
        ] {
            assert_eq!(lenient(q), q);
        }
    }
}
