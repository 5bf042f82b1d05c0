//! Observability for the sanitation publisher
//!
//! Structured logging only; the publisher is a one-shot process with nothing
//! to scrape.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{record_span, run_span};
