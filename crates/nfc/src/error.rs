use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("No tag reader hardware present")]
    ReaderUnavailable,

    #[error("Tag reader is disabled")]
    ReaderDisabled,

    #[error("Tag detection already active")]
    AlreadyReading,

    #[error("Tag detection was stopped")]
    ReaderStopped,

    #[error("Tag UID too short: {len} bytes, need at least {min}")]
    UidTooShort { len: usize, min: usize },

    #[error("Tag does not support a command sub-session")]
    SubSessionUnavailable,

    #[error("Tag command sub-session timed out")]
    SubSessionTimeout,

    #[error(
        "Unexpected status trailer: expected {expected:02X?}, got {actual:02X?}"
    )]
    UnexpectedStatusTrailer { expected: [u8; 2], actual: [u8; 2] },

    #[error("Malformed tag response: {0}")]
    MalformedResponse(String),

    #[error("Tag backend error: {0}")]
    Backend(String),
}

impl TagError {
    /// Whether presenting a tag again could succeed without operator
    /// intervention. Protocol-level mismatches count: a different tag may
    /// carry the right applet.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TagError::SubSessionTimeout
                | TagError::UnexpectedStatusTrailer { .. }
                | TagError::MalformedResponse(_)
                | TagError::Backend(_)
        )
    }

    /// Short operator-facing description.
    pub fn user_message(&self) -> &'static str {
        match self {
            TagError::ReaderUnavailable => "This device has no NFC reader",
            TagError::ReaderDisabled => "Turn on NFC and try again",
            TagError::AlreadyReading => "Tag reading is already running",
            TagError::ReaderStopped => "Tag reading was cancelled",
            TagError::UidTooShort { .. } => "This tag is not a valid vehicle key",
            TagError::SubSessionUnavailable => "This tag type is not supported",
            TagError::SubSessionTimeout => "Hold the tag steady and try again",
            TagError::UnexpectedStatusTrailer { .. } => "Vehicle key was rejected",
            TagError::MalformedResponse(_) => "Tag response was garbled, try again",
            TagError::Backend(_) => "Tag reader error, try again",
        }
    }
}

pub type Result<T> = std::result::Result<T, TagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_protocol_mismatches_are_retryable() {
        assert!(TagError::SubSessionTimeout.is_retryable());
        assert!(TagError::UnexpectedStatusTrailer {
            expected: [0x90, 0x00],
            actual: [0x6F, 0x00],
        }
        .is_retryable());
        assert!(!TagError::UidTooShort { len: 2, min: 4 }.is_retryable());
        assert!(!TagError::ReaderUnavailable.is_retryable());
    }
}
