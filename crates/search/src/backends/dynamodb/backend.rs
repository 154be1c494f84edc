//! DynamoDB client, primary store and table admin.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, KeyType, KeysAndAttributes,
    Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType, TableStatus,
};
use aws_smithy_types::timeout::TimeoutConfig;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::{KEY_ATTRIBUTE, PrimaryStore, ScanPage, TableAdmin, TableListPage, TableSpec, Throughput};
use crate::error::{BackendError, StorageError, StorageResult, ValidationError};
use crate::tenant::TenantContext;
use crate::types::{PhysicalResourceDescriptor, ResourceStatus, SearchableObject, fields};

use super::codec::{self, Item};

const BACKEND_NAME: &str = "dynamodb";

/// Most keys DynamoDB accepts in one batch read.
const MAX_BATCH_GET: usize = 100;

/// Attempts at reading keys the service left unprocessed.
const MAX_UNPROCESSED_RETRIES: u32 = 5;

/// Type of the secondary index range key. Items carry `timestamp` as a
/// number attribute, and a key declared as a string would reject them.
const RANGE_KEY_TYPE: ScalarAttributeType = ScalarAttributeType::N;

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        message,
        source: None,
    })
}

fn build_error(e: impl std::fmt::Display) -> StorageError {
    internal_error(format!("Invalid DynamoDB request: {}", e))
}

/// DynamoDB backend configuration.
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// DynamoDB-backed primary store.
#[derive(Clone)]
pub struct DynamoDbBackend {
    client: Client,
}

impl std::fmt::Debug for DynamoDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbBackend").finish_non_exhaustive()
    }
}

impl DynamoDbBackend {
    /// Creates a backend from the shared SDK configuration.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region_str) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region_str));
        }

        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Creates a backend from a pre-built client (for testing).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Writes an object into the tenant's table.
    pub async fn put_object(&self, tenant: &TenantContext, object: &SearchableObject) -> StorageResult<()> {
        let key = tenant.storage_key(&object.id);
        self.client
            .put_item()
            .table_name(tenant.resource_name())
            .set_item(Some(codec::to_item(&key, object)))
            .send()
            .await
            .map_err(|e| internal_error(format!("DynamoDB PutItem failed: {}", e)))?;
        Ok(())
    }

    /// Removes an object from the tenant's table.
    pub async fn delete_object(&self, tenant: &TenantContext, object_id: &str) -> StorageResult<()> {
        self.client
            .delete_item()
            .table_name(tenant.resource_name())
            .set_key(Some(codec::key(&tenant.storage_key(object_id))))
            .send()
            .await
            .map_err(|e| internal_error(format!("DynamoDB DeleteItem failed: {}", e)))?;
        Ok(())
    }

    /// Reads one chunk of keys, retrying the keys the service leaves
    /// unprocessed.
    async fn batch_get_chunk(&self, table: &str, keys: Vec<Item>, consistent_read: bool) -> StorageResult<Vec<Item>> {
        let mut items = Vec::with_capacity(keys.len());
        let mut pending = Some(HashMap::from([(
            table.to_string(),
            KeysAndAttributes::builder()
                .set_keys(Some(keys))
                .consistent_read(consistent_read)
                .build()
                .map_err(build_error)?,
        )]));

        let mut attempt = 0;
        while let Some(request_items) = pending.take() {
            let response = self
                .client
                .batch_get_item()
                .set_request_items(Some(request_items))
                .send()
                .await
                .map_err(|e| internal_error(format!("DynamoDB BatchGetItem failed: {}", e)))?;

            if let Some(found) = response.responses().and_then(|r| r.get(table)) {
                items.extend(found.iter().cloned());
            }

            match response.unprocessed_keys() {
                Some(unprocessed) if !unprocessed.is_empty() => {
                    attempt += 1;
                    if attempt > MAX_UNPROCESSED_RETRIES {
                        warn!(table = %table, "Giving up on unprocessed keys after {} attempts", attempt - 1);
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    pending = Some(unprocessed.clone());
                }
                _ => {}
            }
        }
        Ok(items)
    }
}

fn status_from(status: Option<&TableStatus>) -> ResourceStatus {
    match status {
        Some(TableStatus::Creating) => ResourceStatus::Creating,
        Some(TableStatus::Active) => ResourceStatus::Active,
        Some(TableStatus::Updating) => ResourceStatus::Updating,
        Some(TableStatus::Deleting) => ResourceStatus::Deleting,
        _ => ResourceStatus::Unknown,
    }
}

fn throughput(t: Throughput) -> StorageResult<ProvisionedThroughput> {
    ProvisionedThroughput::builder()
        .read_capacity_units(t.read.max(1))
        .write_capacity_units(t.write.max(1))
        .build()
        .map_err(build_error)
}

fn key_element(name: &str, key_type: KeyType) -> StorageResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn attribute(name: &str, attribute_type: ScalarAttributeType) -> StorageResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(attribute_type)
        .build()
        .map_err(build_error)
}

#[async_trait]
impl PrimaryStore for DynamoDbBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn batch_get(
        &self,
        tenant: &TenantContext,
        ids: &[String],
        consistent_read: bool,
    ) -> StorageResult<HashMap<String, SearchableObject>> {
        let mut keys: Vec<String> = ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| tenant.storage_key(id))
            .collect();
        keys.sort();
        keys.dedup();

        let mut found = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_BATCH_GET) {
            let keys = chunk.iter().map(|k| codec::key(k)).collect();
            let items = self
                .batch_get_chunk(tenant.resource_name(), keys, consistent_read)
                .await?;
            for item in &items {
                if let Some(object) = codec::from_item(item) {
                    found.insert(object.id.clone(), object);
                }
            }
        }
        debug!(tenant = %tenant.tenant_id(), requested = ids.len(), found = found.len(), "Batch read");
        Ok(found)
    }

    async fn scan(
        &self,
        tenant: &TenantContext,
        cursor: Option<&str>,
        limit: u32,
    ) -> StorageResult<ScanPage> {
        let mut request = self
            .client
            .scan()
            .table_name(tenant.resource_name())
            .limit(i32::try_from(limit.max(1)).unwrap_or(i32::MAX));

        if let Some(start) = cursor {
            request = request.set_exclusive_start_key(Some(codec::key(start)));
        }
        if tenant.is_shared() {
            request = request
                .filter_expression("begins_with(#k, :prefix) AND #a = :appid")
                .expression_attribute_names("#k", KEY_ATTRIBUTE)
                .expression_attribute_names("#a", fields::APPID)
                .expression_attribute_values(
                    ":prefix",
                    aws_sdk_dynamodb::types::AttributeValue::S(tenant.key_prefix().to_string()),
                )
                .expression_attribute_values(
                    ":appid",
                    aws_sdk_dynamodb::types::AttributeValue::S(tenant.tenant_id().to_string()),
                );
        }

        let response = request
            .send()
            .await
            .map_err(|e| internal_error(format!("DynamoDB Scan failed: {}", e)))?;

        let objects = response.items().iter().filter_map(codec::from_item).collect();
        let next_cursor = response
            .last_evaluated_key()
            .filter(|key| !key.is_empty())
            .and_then(|key| key.get(KEY_ATTRIBUTE))
            .and_then(|k| k.as_s().ok())
            .cloned();

        Ok(ScanPage {
            objects,
            next_cursor,
        })
    }
}

#[async_trait]
impl TableAdmin for DynamoDbBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn describe_table(&self, name: &str) -> StorageResult<Option<PhysicalResourceDescriptor>> {
        let response = match self.client.describe_table().table_name(name).send().await {
            Ok(response) => response,
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());
                if not_found {
                    return Ok(None);
                }
                return Err(internal_error(format!("DynamoDB DescribeTable failed: {}", e)));
            }
        };
        let Some(table) = response.table() else {
            return Ok(None);
        };

        let provisioned = table.provisioned_throughput();
        Ok(Some(PhysicalResourceDescriptor {
            name: table.table_name().unwrap_or(name).to_string(),
            status: status_from(table.table_status()),
            created_at: table
                .creation_date_time()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
            size_bytes: table.table_size_bytes().unwrap_or(0),
            item_count: table.item_count().unwrap_or(0),
            read_capacity: provisioned.and_then(|p| p.read_capacity_units()).unwrap_or(0),
            write_capacity: provisioned.and_then(|p| p.write_capacity_units()).unwrap_or(0),
        }))
    }

    async fn create_table(&self, spec: &TableSpec) -> StorageResult<()> {
        let mut request = self
            .client
            .create_table()
            .table_name(&spec.name)
            .key_schema(key_element(&spec.key_attribute, KeyType::Hash)?)
            .attribute_definitions(attribute(&spec.key_attribute, ScalarAttributeType::S)?)
            .provisioned_throughput(throughput(spec.throughput)?);

        if let Some(gsi) = &spec.secondary_index {
            request = request
                .attribute_definitions(attribute(&gsi.hash_key, ScalarAttributeType::S)?)
                .attribute_definitions(attribute(&gsi.range_key, RANGE_KEY_TYPE)?)
                .global_secondary_indexes(
                    GlobalSecondaryIndex::builder()
                        .index_name(&gsi.name)
                        .key_schema(key_element(&gsi.hash_key, KeyType::Hash)?)
                        .key_schema(key_element(&gsi.range_key, KeyType::Range)?)
                        .projection(Projection::builder().projection_type(ProjectionType::All).build())
                        .provisioned_throughput(throughput(gsi.throughput)?)
                        .build()
                        .map_err(build_error)?,
                );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_in_use_exception()) => {
                Err(StorageError::Validation(ValidationError::ResourceAlreadyExists {
                    name: spec.name.clone(),
                }))
            }
            Err(e) => Err(internal_error(format!("DynamoDB CreateTable failed: {}", e))),
        }
    }

    async fn update_throughput(&self, name: &str, t: Throughput) -> StorageResult<()> {
        self.client
            .update_table()
            .table_name(name)
            .provisioned_throughput(throughput(t)?)
            .send()
            .await
            .map_err(|e| internal_error(format!("DynamoDB UpdateTable failed: {}", e)))?;
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> StorageResult<()> {
        match self.client.delete_table().table_name(name).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_not_found_exception()) => {
                Err(StorageError::Validation(ValidationError::ResourceNotFound {
                    name: name.to_string(),
                }))
            }
            Err(e) => Err(internal_error(format!("DynamoDB DeleteTable failed: {}", e))),
        }
    }

    async fn list_tables(&self, start_after: Option<&str>, limit: u32) -> StorageResult<TableListPage> {
        let response = self
            .client
            .list_tables()
            .set_exclusive_start_table_name(start_after.map(str::to_string))
            .limit(i32::try_from(limit.clamp(1, 100)).unwrap_or(100))
            .send()
            .await
            .map_err(|e| internal_error(format!("DynamoDB ListTables failed: {}", e)))?;

        Ok(TableListPage {
            names: response.table_names().to_vec(),
            last_evaluated: response.last_evaluated_table_name().map(str::to_string),
        })
    }
}
