use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a discovered radio peer, stable for the scan's
/// duration.
pub type PeerAddress = String;

/// A radio peer discovered during a scan. Ephemeral: created per scan result
/// and discarded when the scan ends or the matching peer is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityPeer {
    pub address: PeerAddress,
    pub name: Option<String>,
    pub signal_strength: Option<i8>,
    pub services: Vec<Uuid>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ProximityPeer {
    pub fn new(address: impl Into<PeerAddress>) -> Self {
        let now = Utc::now();
        Self {
            address: address.into(),
            name: None,
            signal_strength: None,
            services: Vec::new(),
            discovered_at: now,
            last_seen: now,
        }
    }

    pub fn advertises_service(&self, service: &Uuid) -> bool {
        self.services.contains(service)
    }
}

/// Declared write capabilities of the access-control characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProps {
    pub write: bool,
    pub write_without_response: bool,
    pub signed_write: bool,
}

/// Acknowledgment behavior used when handing the payload to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write without acknowledgment. Fastest, avoids pairing prompts.
    Unacknowledged,
    /// Write with acknowledgment. May trigger a pairing prompt.
    Acknowledged,
    /// Authenticated signed write. Requires an existing bond.
    Signed,
}

impl WriteMode {
    /// Pick a write mode from the characteristic's declared capabilities.
    ///
    /// Selection is deterministic: unacknowledged beats acknowledged beats
    /// signed. Returns `None` when the characteristic supports no write at
    /// all.
    pub fn select(props: &CharacteristicProps) -> Option<WriteMode> {
        if props.write_without_response {
            Some(WriteMode::Unacknowledged)
        } else if props.write {
            Some(WriteMode::Acknowledged)
        } else if props.signed_write {
            Some(WriteMode::Signed)
        } else {
            None
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Unacknowledged => write!(f, "unacknowledged"),
            WriteMode::Acknowledged => write!(f, "acknowledged"),
            WriteMode::Signed => write!(f, "signed"),
        }
    }
}

/// State of the single live connection owned by a `ProximityChannel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ServicesDiscovering,
    Ready,
    WritingPayload,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ServicesDiscovering => "services_discovering",
            ConnectionState::Ready => "ready",
            ConnectionState::WritingPayload => "writing_payload",
            ConnectionState::Closing => "closing",
        };
        write!(f, "{}", name)
    }
}

/// Confirmation that the access payload reached the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityResult {
    pub peer_address: PeerAddress,
    pub write_mode: WriteMode,
    pub payload_len: usize,
    pub completed_at: DateTime<Utc>,
}

impl ProximityResult {
    /// Opaque proof token handed to the remote verifier.
    pub fn proof_token(&self) -> String {
        format!("{}|{}", self.peer_address, self.write_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_prefers_unacknowledged() {
        let props = CharacteristicProps {
            write: true,
            write_without_response: true,
            signed_write: true,
        };
        assert_eq!(WriteMode::select(&props), Some(WriteMode::Unacknowledged));
    }

    #[test]
    fn test_write_mode_falls_back_to_acknowledged() {
        let props = CharacteristicProps {
            write: true,
            write_without_response: false,
            signed_write: true,
        };
        assert_eq!(WriteMode::select(&props), Some(WriteMode::Acknowledged));
    }

    #[test]
    fn test_write_mode_signed_is_last_resort() {
        let props = CharacteristicProps {
            write: false,
            write_without_response: false,
            signed_write: true,
        };
        assert_eq!(WriteMode::select(&props), Some(WriteMode::Signed));
    }

    #[test]
    fn test_write_mode_none_when_unwritable() {
        assert_eq!(WriteMode::select(&CharacteristicProps::default()), None);
    }

    #[test]
    fn test_peer_service_match() {
        let service = Uuid::from_u128(0x12345678_0000_1000_8000_111033441122);
        let mut peer = ProximityPeer::new("AA:11:22:33:44:55");
        assert!(!peer.advertises_service(&service));
        peer.services.push(service);
        assert!(peer.advertises_service(&service));
    }
}
