//! DynamoDB implementation of the results table
//!
//! Credentials come from three environment variables captured when the table
//! handle is created. A missing variable does not fail construction; it fails
//! the first request, which is when the table is first needed.

use super::{ItemKey, ScanAndDelete};
use crate::config::{ConfigError, TableSection};
use async_trait::async_trait;
use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// DynamoDB accepts at most 25 requests per BatchWriteItem call
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Rounds of resubmitting unprocessed items before giving up
pub const MAX_BATCH_ATTEMPTS: u32 = 10;

/// Remote table errors
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Missing table credentials: {0}")]
    Credentials(#[from] ConfigError),
    #[error("DynamoDB request failed: {0}")]
    Service(#[from] aws_sdk_dynamodb::Error),
    #[error("Invalid DynamoDB request: {0}")]
    Build(#[from] aws_sdk_dynamodb::error::BuildError),
    #[error("{remaining} deletes still unprocessed after {attempts} attempts")]
    Unprocessed { remaining: usize, attempts: u32 },
}

/// One credential captured from the environment
#[derive(Debug, Clone)]
struct EnvCredential {
    name: String,
    value: Option<String>,
}

impl EnvCredential {
    fn capture(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: std::env::var(name).ok(),
        }
    }

    fn require(&self) -> Result<String, ConfigError> {
        self.value
            .clone()
            .ok_or_else(|| ConfigError::EnvVarNotFound(self.name.clone()))
    }
}

/// DynamoDB results table keyed by a single attribute
pub struct DynamoTable {
    table_name: String,
    key_attribute: String,
    access_key: EnvCredential,
    secret_key: EnvCredential,
    region: EnvCredential,
    client: OnceCell<Client>,
}

impl DynamoTable {
    /// Capture credentials from the environment variables named in the config
    pub fn from_env(section: &TableSection) -> Self {
        Self {
            table_name: section.name.clone(),
            key_attribute: section.key_attribute.clone(),
            access_key: EnvCredential::capture(&section.access_key_env),
            secret_key: EnvCredential::capture(&section.secret_key_env),
            region: EnvCredential::capture(&section.region_env),
            client: OnceCell::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Client built on first use from the captured credentials
    async fn client(&self) -> Result<&Client, TableError> {
        self.client
            .get_or_try_init(|| async {
                let access_key = self.access_key.require()?;
                let secret_key = self.secret_key.require()?;
                let region = self.region.require()?;

                debug!(region = %region, table = %self.table_name, "Creating DynamoDB client");
                let config = aws_sdk_dynamodb::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .credentials_provider(Credentials::new(
                        access_key,
                        secret_key,
                        None,
                        None,
                        "publisher-environment",
                    ))
                    .build();

                Ok::<_, TableError>(Client::from_conf(config))
            })
            .await
    }

    fn delete_request(&self, key: &ItemKey) -> Result<WriteRequest, TableError> {
        let delete = DeleteRequest::builder()
            .key(&self.key_attribute, key_to_attribute(key))
            .build()?;
        Ok(WriteRequest::builder().delete_request(delete).build())
    }
}

/// Convert a scanned key attribute; other attribute types cannot be keys
pub fn key_from_attribute(value: &AttributeValue) -> Option<ItemKey> {
    match value {
        AttributeValue::S(s) => Some(ItemKey::Text(s.clone())),
        AttributeValue::N(n) => Some(ItemKey::Number(n.clone())),
        _ => None,
    }
}

pub fn key_to_attribute(key: &ItemKey) -> AttributeValue {
    match key {
        ItemKey::Text(s) => AttributeValue::S(s.clone()),
        ItemKey::Number(n) => AttributeValue::N(n.clone()),
    }
}

#[async_trait]
impl ScanAndDelete for DynamoTable {
    type Error = TableError;

    /// Scan the whole table, following pagination, projecting only the key
    async fn scan_keys(&self) -> Result<Vec<ItemKey>, Self::Error> {
        let client = self.client().await?;

        let mut keys = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let output = client
                .scan()
                .table_name(&self.table_name)
                .projection_expression("#k")
                .expression_attribute_names("#k", &self.key_attribute)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(aws_sdk_dynamodb::Error::from)?;

            for item in output.items() {
                match item.get(&self.key_attribute).and_then(key_from_attribute) {
                    Some(key) => keys.push(key),
                    None => warn!(
                        table = %self.table_name,
                        "Skipping item without a usable '{}' key", self.key_attribute
                    ),
                }
            }

            match output.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        debug!(table = %self.table_name, count = keys.len(), "Scanned table");
        Ok(keys)
    }

    /// Batch delete by primary key, resubmitting unprocessed items
    async fn delete_keys(&self, keys: &[ItemKey]) -> Result<usize, Self::Error> {
        let client = self.client().await?;

        let mut deleted = 0;
        for chunk in keys.chunks(BATCH_WRITE_LIMIT) {
            let mut requests = chunk
                .iter()
                .map(|key| self.delete_request(key))
                .collect::<Result<Vec<_>, _>>()?;

            let mut attempts = 0;
            while !requests.is_empty() {
                if attempts == MAX_BATCH_ATTEMPTS {
                    return Err(TableError::Unprocessed {
                        remaining: requests.len(),
                        attempts,
                    });
                }
                attempts += 1;

                let output = client
                    .batch_write_item()
                    .request_items(&self.table_name, requests)
                    .send()
                    .await
                    .map_err(aws_sdk_dynamodb::Error::from)?;

                requests = output
                    .unprocessed_items()
                    .and_then(|items| items.get(&self.table_name))
                    .cloned()
                    .unwrap_or_default();

                if !requests.is_empty() {
                    debug!(
                        remaining = requests.len(),
                        attempt = attempts,
                        "Resubmitting unprocessed deletes"
                    );
                }
            }

            deleted += chunk.len();
        }

        info!(table = %self.table_name, deleted, "Deleted table items");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_with_unset_env() -> TableSection {
        TableSection {
            access_key_env: "SANITATION_TEST_UNSET_ACCESS".to_string(),
            secret_key_env: "SANITATION_TEST_UNSET_SECRET".to_string(),
            region_env: "SANITATION_TEST_UNSET_REGION".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_key_attribute_round_trip_types() {
        assert_eq!(
            key_from_attribute(&AttributeValue::S("101".to_string())),
            Some(ItemKey::Text("101".to_string()))
        );
        assert_eq!(
            key_from_attribute(&AttributeValue::N("7".to_string())),
            Some(ItemKey::Number("7".to_string()))
        );
        assert_eq!(key_from_attribute(&AttributeValue::Bool(true)), None);

        assert_eq!(
            key_to_attribute(&ItemKey::Number("7".to_string())),
            AttributeValue::N("7".to_string())
        );
    }

    #[test]
    fn test_construction_does_not_require_credentials() {
        let table = DynamoTable::from_env(&section_with_unset_env());
        assert_eq!(table.table_name(), "TestResults");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_first_operation() {
        let table = DynamoTable::from_env(&section_with_unset_env());

        let err = table.scan_keys().await.unwrap_err();
        match err {
            TableError::Credentials(ConfigError::EnvVarNotFound(name)) => {
                assert_eq!(name, "SANITATION_TEST_UNSET_ACCESS");
            }
            other => panic!("expected missing credential error, got {other:?}"),
        }

        assert!(table.delete_keys(&[]).await.is_err());
    }

    #[test]
    fn test_delete_request_uses_key_attribute() {
        let table = DynamoTable::from_env(&section_with_unset_env());
        let request = table
            .delete_request(&ItemKey::Text("101".to_string()))
            .unwrap();

        let key = request.delete_request().unwrap().key();
        assert_eq!(key.get("id_number"), Some(&AttributeValue::S("101".to_string())));
    }
}
