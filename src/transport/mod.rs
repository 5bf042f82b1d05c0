//! Transport layer for publishing payloads
//!
//! This module provides the publishing abstraction used by the pipeline and
//! its MQTT implementation.

pub mod mqtt;

/// Publishing seam between the pipeline and the broker
///
/// Enables dependency injection so the pipeline can be exercised against an
/// in-memory double.
#[async_trait::async_trait]
pub trait Publish: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the session; succeeds only once the broker accepted it
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Publish one message to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error>;

    /// Close the session. Safe to call on a client that never connected.
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}
