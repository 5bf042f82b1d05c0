//! Sanitation publisher
//!
//! Reads sanitation inspection rows from a spreadsheet and publishes each one
//! as a JSON message over a mutually authenticated MQTT connection to AWS IoT.
//! Once every row is out it waits, then clears the DynamoDB results table.
//!
//! # Overview
//!
//! - [`source`]: spreadsheet rows as [`protocol::Record`]s
//! - [`protocol`]: payload format and topic rules
//! - [`transport`]: MQTT over TLS 1.2 with client certificates
//! - [`table`]: scan and bulk delete of the results table
//! - [`publisher`]: the pipeline tying them together
//!
//! # Quick Start
//!
//! ```rust
//! use sanitation_publisher::protocol::{CellValue, Payload, Record};
//!
//! let record = Record {
//!     hotel_name: "Cafe A".to_string(),
//!     id_number: CellValue::Int(101),
//!     sanitation: CellValue::from("Pass"),
//!     image_name: "a.jpg".to_string(),
//!     image_path: "a.jpg".to_string(),
//! };
//!
//! let payload = Payload::from_record(&record, "aGVsbG8=".to_string());
//! let json = serde_json::to_string(&payload).unwrap();
//! assert!(json.starts_with(r#"{"hotel_name":"Cafe A","id_number":"101""#));
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod publisher;
pub mod source;
pub mod table;
pub mod testing;
pub mod transport;

pub use config::*;
pub use error::{PublisherError, PublisherResult};
pub use protocol::*;
pub use publisher::{CheckReport, Publisher, PublisherSettings, PublisherState, RunOutcome};
