//! MQTT client for publishing to AWS IoT Core
//!
//! Split the same way as the rest of the transport code: pure functions in
//! [`connection`] and [`message_handler`], I/O in [`client`].
//!
//! - [`connection`] - broker URL parsing, TLS material loading, connection state
//! - [`message_handler`] - routing of rumqttc events
//! - [`client`] - the event loop driver and publish operations
//!
//! # Usage
//!
//! ```rust,no_run
//! use sanitation_publisher::config::{BrokerSection, TlsSection};
//! use sanitation_publisher::transport::mqtt::MqttClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = MqttClient::new(BrokerSection::default(), TlsSection::default())?;
//! client.connect().await?;
//! client.publish("sdk/test/python", b"{}".to_vec()).await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use client::MqttClient;
pub use connection::{ConnectionState, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
