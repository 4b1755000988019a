use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProximityError {
    #[error("Bluetooth radio not present on this device")]
    RadioUnavailable,

    #[error("Bluetooth radio is disabled")]
    RadioDisabled,

    #[error("A scan is already running on this channel")]
    AlreadyScanning,

    #[error("No matching peer found before the scan deadline")]
    PeerNotFound,

    #[error("Access-control service not found on peer")]
    ServiceNotFound,

    #[error("Access-control characteristic not found on peer")]
    CharacteristicNotFound,

    #[error("Characteristic supports no write mode")]
    NoWritableCharacteristic,

    #[error("Peer rejected the payload write: {0}")]
    WriteRejected(String),

    #[error("Connection dropped before the exchange completed")]
    ConnectionDropped,

    #[error("Radio backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ProximityError>;

/// Error categories for retry policy and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Hardware absent. Not retryable without different hardware.
    Hardware,
    /// The user must act first (enable the radio).
    UserAction,
    /// Transient condition, safe to retry.
    Transient,
    /// Protocol-level mismatch. Retryable, but surfaced distinctly since it
    /// may indicate a wrong or compromised peer.
    Protocol,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Hardware => write!(f, "hardware"),
            ErrorCategory::UserAction => write!(f, "user_action"),
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Protocol => write!(f, "protocol"),
        }
    }
}

impl ProximityError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProximityError::RadioUnavailable => ErrorCategory::Hardware,
            ProximityError::RadioDisabled => ErrorCategory::UserAction,
            ProximityError::AlreadyScanning => ErrorCategory::Transient,
            ProximityError::PeerNotFound => ErrorCategory::Transient,
            ProximityError::ServiceNotFound => ErrorCategory::Protocol,
            ProximityError::CharacteristicNotFound => ErrorCategory::Protocol,
            ProximityError::NoWritableCharacteristic => ErrorCategory::Protocol,
            ProximityError::WriteRejected(_) => ErrorCategory::Protocol,
            ProximityError::ConnectionDropped => ErrorCategory::Transient,
            ProximityError::Backend(_) => ErrorCategory::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Hardware)
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ProximityError::RadioUnavailable => {
                "This device has no Bluetooth radio.".to_string()
            }
            ProximityError::RadioDisabled => {
                "Bluetooth is turned off. Please enable it and try again.".to_string()
            }
            ProximityError::AlreadyScanning => {
                "A scan is already in progress.".to_string()
            }
            ProximityError::PeerNotFound => {
                "The vehicle could not be found nearby. Move closer and try again."
                    .to_string()
            }
            ProximityError::ServiceNotFound | ProximityError::CharacteristicNotFound => {
                "The nearby device does not look like the expected vehicle.".to_string()
            }
            ProximityError::NoWritableCharacteristic => {
                "The vehicle does not accept access commands over this link.".to_string()
            }
            ProximityError::WriteRejected(reason) => {
                format!("The vehicle rejected the access command: {}.", reason)
            }
            ProximityError::ConnectionDropped => {
                "The connection to the vehicle was lost. Please try again.".to_string()
            }
            ProximityError::Backend(details) => {
                format!("Bluetooth error: {}. Please try again.", details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_errors_not_retryable() {
        assert!(!ProximityError::RadioUnavailable.is_retryable());
        assert!(ProximityError::RadioDisabled.is_retryable());
        assert!(ProximityError::PeerNotFound.is_retryable());
    }

    #[test]
    fn test_protocol_errors_surface_distinctly() {
        assert_eq!(
            ProximityError::ServiceNotFound.category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            ProximityError::WriteRejected("nack".to_string()).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            ProximityError::PeerNotFound.category(),
            ErrorCategory::Transient
        );
    }
}
