//! Remote results table
//!
//! The pipeline only ever needs two operations on the table: list every key,
//! then delete those keys. [`ScanAndDelete`] is that seam;
//! [`DynamoTable`] implements it against DynamoDB.

use std::fmt;

pub mod dynamo;

pub use dynamo::{DynamoTable, TableError};

/// Primary key value of a remote table item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// String attribute
    Text(String),
    /// Number attribute, kept in its wire form
    Number(String),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Text(value) | ItemKey::Number(value) => f.write_str(value),
        }
    }
}

/// Bulk access to the remote table
#[async_trait::async_trait]
pub trait ScanAndDelete: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Keys of every item currently in the table
    async fn scan_keys(&self) -> Result<Vec<ItemKey>, Self::Error>;

    /// Delete the given keys, returning how many were deleted
    async fn delete_keys(&self, keys: &[ItemKey]) -> Result<usize, Self::Error>;
}
