use crate::reader::{RawTag, SubSession};
use crate::{STATUS_OK, VEHICLE_AID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A detected tag after parsing, ready for validation.
pub struct TagReading {
    /// Raw UID bytes as the reader reported them.
    pub uid: Vec<u8>,
    /// Canonical UID, upper-case hex bytes joined by colons
    /// (e.g. `04:A2:1B:33`).
    pub uid_hex: String,
    /// Normalized technology names, e.g. `IsoDep`, `NfcA`.
    pub technologies: BTreeSet<String>,
    pub detected_at: DateTime<Utc>,
    /// Command session inherited from the raw tag, consumed by validation.
    pub sub_session: Option<Box<dyn SubSession>>,
}

impl std::fmt::Debug for TagReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagReading")
            .field("uid_hex", &self.uid_hex)
            .field("technologies", &self.technologies)
            .field("detected_at", &self.detected_at)
            .field("sub_session", &self.sub_session.is_some())
            .finish()
    }
}

impl TagReading {
    /// Parse a raw tag into its canonical form. Pure per-field mapping, no
    /// policy checks.
    pub fn from_raw(raw: RawTag) -> Self {
        let uid_hex = raw
            .uid
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");

        let technologies = raw
            .technologies
            .iter()
            .map(|tech| {
                tech.rsplit('.')
                    .next()
                    .unwrap_or(tech.as_str())
                    .to_string()
            })
            .collect();

        Self {
            uid: raw.uid,
            uid_hex,
            technologies,
            detected_at: Utc::now(),
            sub_session: raw.sub_session,
        }
    }
}

/// Acceptance rules applied when a tag is validated.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    /// Minimum UID length in bytes.
    pub min_uid_bytes: usize,
    /// Applet to SELECT on the tag.
    pub application_id: Vec<u8>,
    /// Status trailer required for acceptance.
    pub expected_trailer: [u8; 2],
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            min_uid_bytes: 4,
            application_id: VEHICLE_AID.to_vec(),
            expected_trailer: STATUS_OK,
        }
    }
}

/// A tag that passed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedTag {
    pub uid_hex: String,
    pub validated_at: DateTime<Utc>,
}

impl ValidatedTag {
    /// Token carried into the remote verification step.
    pub fn proof_token(&self) -> String {
        self.uid_hex.clone()
    }
}
