//! Publish topic validation
//!
//! AWS IoT Core accepts topics of at most 256 bytes. Publishing to a filter
//! containing wildcards is rejected by every broker, so catch it up front.

use thiserror::Error;

/// Maximum topic length accepted by AWS IoT Core
pub const MAX_TOPIC_BYTES: usize = 256;

pub fn validate_publish_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }

    if topic.len() > MAX_TOPIC_BYTES {
        return Err(TopicError::TooLong(topic.len()));
    }

    for ch in topic.chars() {
        match ch {
            '+' | '#' => return Err(TopicError::Wildcard(ch)),
            '\0' => return Err(TopicError::NulCharacter),
            _ => {}
        }
    }

    Ok(())
}

/// Topic validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic cannot be empty")]
    Empty,
    #[error("Topic is {0} bytes, maximum is 256")]
    TooLong(usize),
    #[error("Topic contains wildcard character: '{0}'")]
    Wildcard(char),
    #[error("Topic contains a NUL character")]
    NulCharacter,
}
