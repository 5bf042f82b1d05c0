//! Record and payload types for the sanitation publisher
//!
//! This module holds the row model read from the spreadsheet, the JSON payload
//! published per row, and the rules for the topic it is published to.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
