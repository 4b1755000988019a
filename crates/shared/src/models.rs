use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One independent proof of identity or possession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Factor {
    Face,
    Proximity,
    Tag,
}

impl Factor {
    pub const ALL: [Factor; 3] = [Factor::Face, Factor::Proximity, Factor::Tag];
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Factor::Face => write!(f, "face"),
            Factor::Proximity => write!(f, "proximity"),
            Factor::Tag => write!(f, "tag"),
        }
    }
}

/// Channel-specific proof captured when a factor completes.
///
/// Once captured the proof is immutable for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorProof {
    pub factor: Factor,
    pub token: String,
    pub captured_at: DateTime<Utc>,
}

impl FactorProof {
    pub fn new(factor: Factor, token: impl Into<String>) -> Self {
        Self {
            factor,
            token: token.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Lifecycle of a single authentication factor.
///
/// Legal transitions: `Pending -> InProgress -> {Completed | Failed}` and
/// `Failed -> Pending` (explicit retry only). `InProgress` is always observed
/// before a terminal state, even for effectively instantaneous factors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum FactorStatus {
    Pending,
    InProgress,
    Completed(FactorProof),
    Failed(String),
}

impl FactorStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, FactorStatus::Completed(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FactorStatus::Completed(_) | FactorStatus::Failed(_))
    }

    pub fn proof(&self) -> Option<&FactorProof> {
        match self {
            FactorStatus::Completed(proof) => Some(proof),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            FactorStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` follows the legal transition graph.
    pub fn can_transition_to(&self, next: &FactorStatus) -> bool {
        use FactorStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed(_))
                | (InProgress, Failed(_))
                | (Failed(_), Pending)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FactorStatus::Pending => "pending",
            FactorStatus::InProgress => "in_progress",
            FactorStatus::Completed(_) => "completed",
            FactorStatus::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for FactorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Terminal outcome of one authentication attempt.
///
/// The remote verifier's answer is final: partial success is never reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Undecided,
    Accepted { token: String },
    Rejected { reason: String },
}

impl SessionOutcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, SessionOutcome::Undecided)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed() -> FactorStatus {
        FactorStatus::Completed(FactorProof::new(Factor::Tag, "AA:BB:CC:DD"))
    }

    #[test]
    fn test_legal_transitions() {
        assert!(FactorStatus::Pending.can_transition_to(&FactorStatus::InProgress));
        assert!(FactorStatus::InProgress.can_transition_to(&completed()));
        assert!(FactorStatus::InProgress
            .can_transition_to(&FactorStatus::Failed("timeout".to_string())));
        assert!(FactorStatus::Failed("timeout".to_string())
            .can_transition_to(&FactorStatus::Pending));
    }

    #[test]
    fn test_illegal_transitions() {
        // No state may be skipped
        assert!(!FactorStatus::Pending.can_transition_to(&completed()));
        assert!(!FactorStatus::Pending
            .can_transition_to(&FactorStatus::Failed("x".to_string())));

        // Completed proofs are immutable
        assert!(!completed().can_transition_to(&FactorStatus::Pending));
        assert!(!completed().can_transition_to(&FactorStatus::InProgress));
        assert!(!completed().can_transition_to(&FactorStatus::Failed("x".to_string())));

        // Failed never recovers automatically
        assert!(!FactorStatus::Failed("x".to_string()).can_transition_to(&completed()));
        assert!(!FactorStatus::Failed("x".to_string())
            .can_transition_to(&FactorStatus::InProgress));

        // No self-loops
        assert!(!FactorStatus::InProgress.can_transition_to(&FactorStatus::InProgress));
    }

    #[test]
    fn test_status_helpers() {
        assert!(completed().is_completed());
        assert!(completed().is_terminal());
        assert!(FactorStatus::Failed("x".to_string()).is_terminal());
        assert!(!FactorStatus::InProgress.is_terminal());
        assert_eq!(completed().proof().unwrap().token, "AA:BB:CC:DD");
        assert_eq!(
            FactorStatus::Failed("timeout".to_string()).failure_reason(),
            Some("timeout")
        );
    }

    #[test]
    fn test_status_serde_round_trip() {
        let statuses = [
            FactorStatus::Pending,
            FactorStatus::InProgress,
            completed(),
            FactorStatus::Failed("timeout".to_string()),
        ];
        for status in statuses {
            let json = serde_json::to_string(&status).unwrap();
            let back: FactorStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }

        let json = serde_json::to_value(FactorStatus::Failed("timeout".to_string())).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["detail"], "timeout");
    }

    #[test]
    fn test_outcome_decided() {
        assert!(!SessionOutcome::Undecided.is_decided());
        assert!(SessionOutcome::Accepted {
            token: "t".to_string()
        }
        .is_decided());
        assert!(SessionOutcome::Rejected {
            reason: "r".to_string()
        }
        .is_decided());
    }
}
