//! IndexClient implementation for Elasticsearch.

use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::http::request::JsonBody;
use elasticsearch::indices::IndicesRefreshParts;
use elasticsearch::{
    BulkParts, ClearScrollParts, DeleteParts, GetParts, IndexParts, MgetParts, ScrollParts,
    SearchParts,
};
use serde_json::{Value, json};

use crate::core::{
    BulkFailure, BulkOperation, BulkResponse, Hit, IndexClient, IndexDocument, ScrollPage,
    SearchHits, SearchRequest, SortOrder,
};
use crate::error::{SearchError, StorageError, StorageResult, ValidationError};
use crate::query::NativeQuery;

use super::backend::{BACKEND_NAME, ElasticsearchIndex, internal_error};
use super::schema;

fn keep_alive_param(keep_alive: Duration) -> String {
    format!("{}s", keep_alive.as_secs().max(1))
}

/// Index names must be lower case.
pub(super) fn index_name(index: &str) -> String {
    index.to_lowercase()
}

fn index_not_found(index: &str) -> StorageError {
    StorageError::Validation(ValidationError::ResourceNotFound {
        name: index.to_string(),
    })
}

/// Builds the body of a paged search.
fn search_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "query": request.query.as_json(),
        "track_total_hits": true,
    });
    if let SortOrder::Field { field, descending } = &request.sort {
        body["sort"] = json!([{
            field.as_str(): {
                "order": if *descending { "desc" } else { "asc" },
                "missing": "_last",
                "unmapped_type": "keyword",
            }
        }]);
    }
    body
}

fn parse_hit(hit: &Value) -> Option<Hit> {
    Some(Hit {
        id: hit.get("_id")?.as_str()?.to_string(),
        score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
        source: hit.get("_source").cloned().unwrap_or_else(|| json!({})),
    })
}

/// Parses the hits of a search or scroll response.
fn parse_hits(body: &Value) -> SearchHits {
    let hits: Vec<Hit> = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().filter_map(parse_hit).collect())
        .unwrap_or_default();
    let total = body
        .pointer("/hits/total/value")
        .and_then(Value::as_u64)
        .unwrap_or(hits.len() as u64);
    SearchHits { total, hits }
}

fn parse_scroll(body: &Value) -> ScrollPage {
    ScrollPage {
        scroll_id: body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        hits: parse_hits(body).hits,
    }
}

/// Builds the action and source lines of a bulk request.
fn bulk_lines(operations: Vec<BulkOperation>) -> Vec<Value> {
    let mut lines = Vec::with_capacity(operations.len() * 2);
    for op in operations {
        match op {
            BulkOperation::Index(IndexDocument { index, id, source }) => {
                lines.push(json!({ "index": { "_index": index_name(&index), "_id": id } }));
                lines.push(source);
            }
            BulkOperation::Delete { index, id } => {
                lines.push(json!({ "delete": { "_index": index_name(&index), "_id": id } }));
            }
        }
    }
    lines
}

/// Parses a bulk response into per-item failures.
///
/// Deleting a missing document is not a failure.
fn parse_bulk(body: &Value, items: usize) -> BulkResponse {
    let failures = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object()?.values().next())
                .filter(|result| result.get("error").is_some())
                .map(|result| BulkFailure {
                    id: result
                        .get("_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    reason: result
                        .pointer("/error/reason")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    BulkResponse {
        took_ms: body.get("took").and_then(Value::as_u64).unwrap_or(0),
        items,
        failures,
    }
}

impl ElasticsearchIndex {
    async fn read_json(response: elasticsearch::http::response::Response, what: &str) -> StorageResult<Value> {
        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "{} failed (status {}): {}",
                what, status, body
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| internal_error(format!("Failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl IndexClient for ElasticsearchIndex {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn index_exists(&self, index: &str) -> StorageResult<bool> {
        schema::index_exists(self, index).await
    }

    async fn create_index(&self, index: &str) -> StorageResult<()> {
        schema::create_index(self, index).await
    }

    async fn delete_index(&self, index: &str) -> StorageResult<()> {
        schema::delete_index(self, index).await
    }

    async fn index(&self, doc: IndexDocument) -> StorageResult<()> {
        let index = index_name(&doc.index);
        let response = self
            .client()
            .index(IndexParts::IndexId(&index, &doc.id))
            .body(doc.source)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to index document: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to index document (status {}): {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> StorageResult<()> {
        let index = index_name(index);
        let index = index.as_str();
        let response = self
            .client()
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete document: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to delete document (status {}): {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> StorageResult<Option<Value>> {
        let index = index_name(index);
        let index = index.as_str();
        let response = self
            .client()
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to get document: {}", e)))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        let body = Self::read_json(response, "Get").await?;
        if !body.get("found").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn multi_get(&self, index: &str, ids: &[String]) -> StorageResult<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let index = index_name(index);
        let response = self
            .client()
            .mget(MgetParts::Index(&index))
            .body(json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to get documents: {}", e)))?;

        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let body = Self::read_json(response, "Multi-get").await?;
        Ok(body
            .get("docs")
            .and_then(Value::as_array)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.get("found").and_then(Value::as_bool).unwrap_or(false))
                    .filter_map(|d| d.get("_source").cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn bulk(&self, operations: Vec<BulkOperation>) -> StorageResult<BulkResponse> {
        let items = operations.len();
        if items == 0 {
            return Ok(BulkResponse::default());
        }
        let body: Vec<JsonBody<Value>> = bulk_lines(operations).into_iter().map(JsonBody::from).collect();
        let response = self
            .client()
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| internal_error(format!("Bulk request failed: {}", e)))?;

        let body = Self::read_json(response, "Bulk").await?;
        Ok(parse_bulk(&body, items))
    }

    async fn search(&self, request: SearchRequest) -> StorageResult<SearchHits> {
        let index = index_name(&request.index);
        let response = self
            .client()
            .search(SearchParts::Index(&[&index]))
            .from(request.from as i64)
            .size(i64::from(request.size))
            .body(search_body(&request))
            .send()
            .await
            .map_err(|e| internal_error(format!("Search failed: {}", e)))?;

        if !response.status_code().is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(index_not_found(&index));
            }
            return Err(internal_error(format!("Search failed: {}", body)));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse search response: {}", e)))?;
        Ok(parse_hits(&body))
    }

    async fn scroll_start(
        &self,
        index: &str,
        query: &NativeQuery,
        size: u32,
        keep_alive: Duration,
    ) -> StorageResult<ScrollPage> {
        let keep_alive = keep_alive_param(keep_alive);
        let index = index_name(index);
        let index = index.as_str();
        let response = self
            .client()
            .search(SearchParts::Index(&[index]))
            .scroll(&keep_alive)
            .size(i64::from(size.max(1)))
            .body(json!({ "query": query.as_json(), "sort": ["_doc"] }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Scroll failed: {}", e)))?;

        if !response.status_code().is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(index_not_found(index));
            }
            return Err(internal_error(format!("Scroll failed: {}", body)));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse scroll response: {}", e)))?;
        Ok(parse_scroll(&body))
    }

    async fn scroll_next(&self, scroll_id: &str, keep_alive: Duration) -> StorageResult<ScrollPage> {
        let response = self
            .client()
            .scroll(ScrollParts::None)
            .body(json!({ "scroll": keep_alive_param(keep_alive), "scroll_id": scroll_id }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Scroll failed: {}", e)))?;

        if response.status_code().as_u16() == 404 {
            return Err(StorageError::Search(SearchError::InvalidScroll {
                scroll_id: scroll_id.to_string(),
            }));
        }
        let body = Self::read_json(response, "Scroll").await?;
        Ok(parse_scroll(&body))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> StorageResult<()> {
        let response = self
            .client()
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to clear scroll: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(internal_error(format!("Failed to clear scroll (status {})", status)));
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> StorageResult<()> {
        let index = index_name(index);
        let index = index.as_str();
        self.client()
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to refresh index {}: {}", index, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_sort() {
        let mut request = SearchRequest {
            index: "platform-acme".into(),
            query: NativeQuery::match_all(),
            sort: SortOrder::Score,
            from: 0,
            size: 10,
        };
        let body = search_body(&request);
        assert!(body.get("sort").is_none());
        assert_eq!(body["track_total_hits"], true);

        request.sort = SortOrder::Field {
            field: "timestamp".into(),
            descending: true,
        };
        let body = search_body(&request);
        assert_eq!(body["sort"][0]["timestamp"]["order"], "desc");
    }

    #[test]
    fn test_parse_hits() {
        let body = json!({
            "hits": {
                "total": { "value": 42, "relation": "eq" },
                "hits": [
                    { "_id": "a", "_score": 1.5, "_source": { "id": "a" } },
                    { "_id": "b", "_score": null, "_source": { "id": "b" } },
                    { "_score": 1.0 }
                ]
            }
        });
        let hits = parse_hits(&body);
        assert_eq!(hits.total, 42);
        assert_eq!(hits.hits.len(), 2);
        assert_eq!(hits.hits[0].score, 1.5);
        assert_eq!(hits.hits[1].score, 0.0);
    }

    #[test]
    fn test_parse_scroll() {
        let page = parse_scroll(&json!({ "_scroll_id": "s1", "hits": { "hits": [] } }));
        assert_eq!(page.scroll_id.as_deref(), Some("s1"));
        assert!(page.hits.is_empty());
    }

    #[test]
    fn test_bulk_lines() {
        let lines = bulk_lines(vec![
            BulkOperation::Index(IndexDocument {
                index: "I".into(),
                id: "a".into(),
                source: json!({ "id": "a" }),
            }),
            BulkOperation::Delete {
                index: "i".into(),
                id: "b".into(),
            },
        ]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["index"]["_id"], "a");
        assert_eq!(lines[0]["index"]["_index"], "i");
        assert_eq!(lines[1]["id"], "a");
        assert_eq!(lines[2]["delete"]["_id"], "b");
    }

    #[test]
    fn test_parse_bulk_failures() {
        let body = json!({
            "took": 7,
            "errors": true,
            "items": [
                { "index": { "_id": "a", "status": 201 } },
                { "index": { "_id": "b", "status": 400, "error": { "reason": "mapper_parsing_exception" } } },
                { "delete": { "_id": "c", "status": 404, "result": "not_found" } }
            ]
        });
        let resp = parse_bulk(&body, 3);
        assert_eq!(resp.took_ms, 7);
        assert_eq!(resp.failures.len(), 1);
        assert_eq!(resp.failures[0].id, "b");
        assert_eq!(resp.failure_message(), "[b]: mapper_parsing_exception");
    }
}
