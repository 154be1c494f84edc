//! Index mapping and index administration.

use elasticsearch::indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts};
use serde_json::{Value, json};

use crate::error::{StorageError, StorageResult, ValidationError};
use crate::types::fields;

use super::backend::{ElasticsearchIndex, IndexSettings, internal_error};
use super::client::index_name;

/// Creates the index mapping for searchable objects.
///
/// Unknown string fields become analyzed text with a `keyword` subfield, so
/// both free-text and exact term queries work on any field.
pub fn create_index_mapping(settings: &IndexSettings) -> Value {
    json!({
        "settings": {
            "number_of_shards": settings.shards,
            "number_of_replicas": settings.replicas,
            "index.max_result_window": settings.max_result_window,
            "refresh_interval": settings.refresh_interval,
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "strings": {
                        "match_mapping_type": "string",
                        "mapping": {
                            "type": "text",
                            "fields": {
                                "keyword": { "type": "keyword", "ignore_above": 256 }
                            }
                        }
                    }
                }
            ],
            "properties": {
                (fields::ID): { "type": "keyword" },
                (fields::TYPE): { "type": "keyword" },
                (fields::APPID): { "type": "keyword" },
                (fields::PARENT_ID): { "type": "keyword" },
                (fields::TAGS): { "type": "keyword" },
                (fields::TAG): { "type": "keyword" },
                (fields::STORED): { "type": "boolean" },
                (fields::EXPIRES): { "type": "date", "format": "epoch_millis" },
                (fields::TIMESTAMP): { "type": "date", "format": "epoch_millis" },
                (fields::LATLNG): { "type": "geo_point" },
                (fields::NESTED): { "type": "nested" },
            }
        }
    })
}

/// Returns `true` if the index exists.
pub async fn index_exists(backend: &ElasticsearchIndex, index: &str) -> StorageResult<bool> {
    let index = index_name(index);
    let index = index.as_str();
    let response = backend
        .client()
        .indices()
        .exists(IndicesExistsParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to check index existence: {}", e)))?;

    Ok(response.status_code().is_success())
}

/// Creates an index with the object mapping.
pub async fn create_index(backend: &ElasticsearchIndex, index: &str) -> StorageResult<()> {
    let index = index_name(index);
    let index = index.as_str();
    let mapping = create_index_mapping(&backend.config().index);

    let response = backend
        .client()
        .indices()
        .create(IndicesCreateParts::Index(index))
        .body(mapping)
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to create index {}: {}", index, e)))?;

    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if body.contains("resource_already_exists_exception") {
            return Err(StorageError::Validation(ValidationError::ResourceAlreadyExists {
                name: index.to_string(),
            }));
        }
        return Err(internal_error(format!(
            "Failed to create index {} (status {}): {}",
            index, status, body
        )));
    }

    tracing::debug!("Created Elasticsearch index '{}'", index);
    Ok(())
}

/// Deletes an index.
pub async fn delete_index(backend: &ElasticsearchIndex, index: &str) -> StorageResult<()> {
    let index = index_name(index);
    let index = index.as_str();
    let response = backend
        .client()
        .indices()
        .delete(IndicesDeleteParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to delete index {}: {}", index, e)))?;

    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if body.contains("index_not_found_exception") {
            return Err(StorageError::Validation(ValidationError::ResourceNotFound {
                name: index.to_string(),
            }));
        }
        return Err(internal_error(format!(
            "Failed to delete index {}: {}",
            index, body
        )));
    }

    tracing::debug!("Deleted Elasticsearch index '{}'", index);
    Ok(())
}
