// MFA session orchestrator - owns factor statuses and drives the channels

use crate::verifier::{RemoteVerifier, VerifyRequest};
use crate::{MfaError, Result};
use nfc::{TagChannel, TagPolicy};
use proximity::{ProximityChannel, ScanFilter, ACCESS_SERVICE_UUID};
use shared::{Factor, FactorProof, FactorStatus, MfaConfig, SessionOutcome};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payload written to the vehicle's access characteristic.
pub const ACCESS_PAYLOAD: &[u8] = b"ACCESS";

/// Ordering imposed on factor activation.
///
/// `Sequential` gates the device factors on face completion; `Parallel`
/// imposes no ordering at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPolicy {
    Sequential,
    Parallel,
}

struct Inner {
    session_id: Uuid,
    user_id: String,
    config: MfaConfig,
    policy: ActivationPolicy,
    required: BTreeSet<Factor>,
    statuses: RwLock<HashMap<Factor, FactorStatus>>,
    /// Activation generation per factor. Bumped on retry so that events from
    /// an aborted attempt can never touch the new one.
    generations: RwLock<HashMap<Factor, u64>>,
    outcome: RwLock<SessionOutcome>,
    proximity: Arc<ProximityChannel>,
    tag: Arc<TagChannel>,
    verifier: Box<dyn RemoteVerifier>,
    tasks: Mutex<HashMap<Factor, JoinHandle<()>>>,
}

/// One multi-factor authentication attempt for one user and vehicle.
///
/// The session is the single writer of factor statuses; channel tasks report
/// back through it and observers only read snapshots.
#[derive(Clone)]
pub struct MfaSession {
    inner: Arc<Inner>,
}

impl MfaSession {
    pub fn new(
        user_id: impl Into<String>,
        required: BTreeSet<Factor>,
        policy: ActivationPolicy,
        config: MfaConfig,
        proximity: Arc<ProximityChannel>,
        tag: Arc<TagChannel>,
        verifier: Box<dyn RemoteVerifier>,
    ) -> Self {
        let statuses = required
            .iter()
            .map(|factor| (*factor, FactorStatus::Pending))
            .collect();
        let generations = required.iter().map(|factor| (*factor, 0)).collect();

        let session = Self {
            inner: Arc::new(Inner {
                session_id: Uuid::new_v4(),
                user_id: user_id.into(),
                config,
                policy,
                required,
                statuses: RwLock::new(statuses),
                generations: RwLock::new(generations),
                outcome: RwLock::new(SessionOutcome::Undecided),
                proximity,
                tag,
                verifier,
                tasks: Mutex::new(HashMap::new()),
            }),
        };

        info!(
            session_id = %session.inner.session_id,
            user_id = %session.inner.user_id,
            required = ?session.inner.required,
            policy = ?session.inner.policy,
            "MFA session created"
        );
        session
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub async fn status_of(&self, factor: Factor) -> Option<FactorStatus> {
        self.inner.statuses.read().await.get(&factor).cloned()
    }

    /// Point-in-time copy of every factor status.
    pub async fn snapshot(&self) -> BTreeMap<Factor, FactorStatus> {
        self.inner
            .statuses
            .read()
            .await
            .iter()
            .map(|(factor, status)| (*factor, status.clone()))
            .collect()
    }

    pub async fn outcome(&self) -> SessionOutcome {
        self.inner.outcome.read().await.clone()
    }

    /// Start the BLE factor: scan for the vehicle, connect, write the access
    /// payload. Runs in the background under the configured timeout.
    pub async fn start_proximity_factor(&self) -> Result<()> {
        let generation = self.begin(Factor::Proximity).await?;

        let session = self.clone();
        let channel = Arc::clone(&self.inner.proximity);
        let deadline = Duration::from_secs(self.inner.config.proximity_timeout_secs);

        let handle = tokio::spawn(async move {
            let drive = async {
                // The factor timeout is the authoritative bound; the scan
                // window is kept wider so expiry always surfaces as a
                // timeout, not a missing peer.
                let peer = channel
                    .scan_for_match(
                        ScanFilter::for_service(ACCESS_SERVICE_UUID),
                        deadline.saturating_mul(2),
                    )
                    .await?;
                channel.connect_and_authorize(&peer, ACCESS_PAYLOAD).await
            };

            match tokio::time::timeout(deadline, drive).await {
                Ok(Ok(result)) => {
                    let proof = FactorProof::new(Factor::Proximity, result.proof_token());
                    session
                        .apply_event(Factor::Proximity, generation, FactorStatus::Completed(proof))
                        .await;
                }
                Ok(Err(err)) => {
                    session
                        .apply_event(
                            Factor::Proximity,
                            generation,
                            FactorStatus::Failed(err.to_string()),
                        )
                        .await;
                }
                Err(_) => {
                    channel.stop().await;
                    session
                        .apply_event(
                            Factor::Proximity,
                            generation,
                            FactorStatus::Failed("timeout".to_string()),
                        )
                        .await;
                }
            }
        });

        self.track_task(Factor::Proximity, handle).await;
        Ok(())
    }

    /// Start the NFC factor: wait for a tap that validates against the
    /// policy. Runs in the background under the configured timeout.
    pub async fn start_tag_factor(&self, policy: TagPolicy) -> Result<()> {
        let generation = self.begin(Factor::Tag).await?;

        let session = self.clone();
        let channel = Arc::clone(&self.inner.tag);
        let deadline = Duration::from_secs(self.inner.config.tag_timeout_secs);

        let handle = tokio::spawn(async move {
            let window = deadline.saturating_mul(2);
            match tokio::time::timeout(deadline, channel.read_validated(&policy, window)).await {
                Ok(Ok(tag)) => {
                    let proof = FactorProof::new(Factor::Tag, tag.proof_token());
                    session
                        .apply_event(Factor::Tag, generation, FactorStatus::Completed(proof))
                        .await;
                }
                Ok(Err(err)) => {
                    session
                        .apply_event(Factor::Tag, generation, FactorStatus::Failed(err.to_string()))
                        .await;
                }
                Err(_) => {
                    channel.stop().await;
                    session
                        .apply_event(
                            Factor::Tag,
                            generation,
                            FactorStatus::Failed("timeout".to_string()),
                        )
                        .await;
                }
            }
        });

        self.track_task(Factor::Tag, handle).await;
        Ok(())
    }

    /// Acceptance policy seeded from the session configuration.
    pub fn default_tag_policy(&self) -> TagPolicy {
        TagPolicy {
            min_uid_bytes: self.inner.config.min_tag_uid_bytes,
            ..TagPolicy::default()
        }
    }

    /// Record a face capture produced outside this crate.
    ///
    /// The face factor has no channel task; its producer reports the final
    /// result directly. `InProgress` is still always observed.
    pub async fn complete_face_factor(&self, face_token: impl Into<String>) -> Result<()> {
        let proof = FactorProof::new(Factor::Face, face_token);
        self.finish_face_factor(FactorStatus::Completed(proof))
            .await?;
        info!(session_id = %self.inner.session_id, "Face factor completed");
        Ok(())
    }

    /// Record a face capture failure produced outside this crate.
    pub async fn fail_face_factor(&self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.finish_face_factor(FactorStatus::Failed(reason.clone()))
            .await?;
        warn!(session_id = %self.inner.session_id, %reason, "Face factor failed");
        Ok(())
    }

    /// Walk the face factor to a terminal state. An instantaneous capture
    /// still follows `Pending -> InProgress -> terminal`; the check and the
    /// write share one critical section so concurrent reports cannot
    /// overwrite an earlier terminal state.
    async fn finish_face_factor(&self, terminal: FactorStatus) -> Result<()> {
        self.require(Factor::Face)?;
        self.ensure_undecided().await?;

        let mut statuses = self.inner.statuses.write().await;
        let current = statuses
            .get(&Factor::Face)
            .cloned()
            .unwrap_or(FactorStatus::Pending);
        match current {
            FactorStatus::Pending | FactorStatus::InProgress => {}
            other => {
                return Err(MfaError::InvalidTransition {
                    factor: Factor::Face,
                    from: other.name(),
                    to: terminal.name(),
                })
            }
        }
        statuses.insert(Factor::Face, terminal);
        Ok(())
    }

    /// Return a failed factor to `Pending` so it can be started again.
    ///
    /// The only path out of `Failed`. Any lingering task from the failed
    /// attempt is aborted and its channel stopped; the generation bump makes
    /// late events from that attempt inert.
    pub async fn retry(&self, factor: Factor) -> Result<()> {
        self.require(factor)?;
        self.ensure_undecided().await?;

        {
            let statuses = self.inner.statuses.read().await;
            let current = statuses.get(&factor).cloned().unwrap_or(FactorStatus::Pending);
            if !matches!(current, FactorStatus::Failed(_)) {
                return Err(MfaError::InvalidTransition {
                    factor,
                    from: current.name(),
                    to: "pending",
                });
            }
        }

        if let Some(handle) = self.inner.tasks.lock().await.remove(&factor) {
            handle.abort();
        }
        match factor {
            Factor::Proximity => self.inner.proximity.stop().await,
            Factor::Tag => self.inner.tag.stop().await,
            Factor::Face => {}
        }

        *self
            .inner
            .generations
            .write()
            .await
            .entry(factor)
            .or_insert(0) += 1;
        self.inner
            .statuses
            .write()
            .await
            .insert(factor, FactorStatus::Pending);

        info!(session_id = %self.inner.session_id, %factor, "Factor reset for retry");
        Ok(())
    }

    /// Submit the proof bundle to the remote verifier.
    ///
    /// Errors with [`MfaError::NotAllFactorsComplete`] unless every required
    /// factor is `Completed`; the verifier is never contacted early. A reject
    /// or transport failure decides the session against the user.
    pub async fn submit(&self) -> Result<SessionOutcome> {
        self.ensure_undecided().await?;

        let snapshot = self.snapshot().await;
        if !snapshot.values().all(|status| status.is_completed()) {
            debug!(
                session_id = %self.inner.session_id,
                "Submit requested before all factors completed"
            );
            return Err(MfaError::NotAllFactorsComplete);
        }

        let token_for = |factor: Factor| {
            snapshot
                .get(&factor)
                .and_then(|status| status.proof())
                .map(|proof| proof.token.clone())
        };

        let request = VerifyRequest {
            session_id: self.inner.session_id,
            user_id: self.inner.user_id.clone(),
            face_token: token_for(Factor::Face),
            proximity_token: token_for(Factor::Proximity),
            tag_uid: token_for(Factor::Tag),
        };

        let outcome = match self.inner.verifier.verify(&request).await {
            Ok(response) if response.verified => SessionOutcome::Accepted {
                token: response.token.unwrap_or_default(),
            },
            Ok(response) => SessionOutcome::Rejected {
                reason: response
                    .message
                    .unwrap_or_else(|| "verification rejected".to_string()),
            },
            Err(err) => SessionOutcome::Rejected {
                reason: err.to_string(),
            },
        };

        if let SessionOutcome::Rejected { reason } = &outcome {
            warn!(session_id = %self.inner.session_id, %reason, "Session rejected");
            self.fail_non_terminal(reason.clone()).await;
        } else {
            info!(session_id = %self.inner.session_id, "Session accepted");
        }

        *self.inner.outcome.write().await = outcome.clone();
        Ok(outcome)
    }

    /// Submit if every required factor has completed; `Ok(None)` otherwise.
    pub async fn try_submit(&self) -> Result<Option<SessionOutcome>> {
        match self.submit().await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(MfaError::NotAllFactorsComplete) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Tear the session down: abort in-flight factor tasks and stop both
    /// channels. Idempotent.
    pub async fn abandon(&self) {
        for (factor, handle) in self.inner.tasks.lock().await.drain() {
            debug!(%factor, "Aborting factor task");
            handle.abort();
        }
        self.inner.proximity.stop().await;
        self.inner.tag.stop().await;

        let mut outcome = self.inner.outcome.write().await;
        if !outcome.is_decided() {
            *outcome = SessionOutcome::Rejected {
                reason: "session abandoned".to_string(),
            };
            info!(session_id = %self.inner.session_id, "Session abandoned");
        }
    }

    /// Move every in-progress factor to `Failed`. A decided session leaves
    /// nothing dangling in `InProgress`.
    async fn fail_non_terminal(&self, reason: String) {
        let mut statuses = self.inner.statuses.write().await;
        for status in statuses.values_mut() {
            if matches!(status, FactorStatus::InProgress) {
                *status = FactorStatus::Failed(reason.clone());
            }
        }
    }

    fn require(&self, factor: Factor) -> Result<()> {
        if self.inner.required.contains(&factor) {
            Ok(())
        } else {
            Err(MfaError::FactorNotRequired(factor))
        }
    }

    async fn ensure_undecided(&self) -> Result<()> {
        if self.inner.outcome.read().await.is_decided() {
            Err(MfaError::SessionFinished)
        } else {
            Ok(())
        }
    }

    /// Common activation preamble: required, session live, ordering gate,
    /// `Pending -> InProgress`. Returns the generation the new attempt runs
    /// under.
    async fn begin(&self, factor: Factor) -> Result<u64> {
        self.require(factor)?;
        self.ensure_undecided().await?;

        if self.inner.policy == ActivationPolicy::Sequential
            && factor != Factor::Face
            && self.inner.required.contains(&Factor::Face)
        {
            let face_done = self
                .status_of(Factor::Face)
                .await
                .map(|status| status.is_completed())
                .unwrap_or(false);
            if !face_done {
                return Err(MfaError::FactorNotReady {
                    factor,
                    gate: Factor::Face,
                });
            }
        }

        {
            let mut statuses = self.inner.statuses.write().await;
            let current = statuses.get(&factor).cloned().unwrap_or(FactorStatus::Pending);
            if !current.can_transition_to(&FactorStatus::InProgress) {
                return Err(MfaError::InvalidTransition {
                    factor,
                    from: current.name(),
                    to: "in_progress",
                });
            }
            statuses.insert(factor, FactorStatus::InProgress);
        }
        info!(session_id = %self.inner.session_id, %factor, "Factor started");

        let generations = self.inner.generations.read().await;
        Ok(*generations.get(&factor).unwrap_or(&0))
    }

    /// Apply a status report from a factor task. Reports from a superseded
    /// generation or outside the legal transition graph are logged and
    /// dropped, never applied.
    async fn apply_event(&self, factor: Factor, generation: u64, next: FactorStatus) {
        let current_generation = *self
            .inner
            .generations
            .read()
            .await
            .get(&factor)
            .unwrap_or(&0);
        if generation != current_generation {
            debug!(
                session_id = %self.inner.session_id,
                %factor,
                stale = generation,
                current = current_generation,
                "Dropping stale factor event"
            );
            return;
        }

        let mut statuses = self.inner.statuses.write().await;
        let current = statuses.get(&factor).cloned().unwrap_or(FactorStatus::Pending);
        if !current.can_transition_to(&next) {
            warn!(
                session_id = %self.inner.session_id,
                %factor,
                from = current.name(),
                to = next.name(),
                "Dropping illegal factor transition"
            );
            return;
        }

        info!(
            session_id = %self.inner.session_id,
            %factor,
            status = next.name(),
            "Factor status updated"
        );
        statuses.insert(factor, next);
    }

    async fn track_task(&self, factor: Factor, handle: JoinHandle<()>) {
        if let Some(previous) = self.inner.tasks.lock().await.insert(factor, handle) {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerifyResponse;
    use async_trait::async_trait;
    use nfc::mock::MockReader;
    use proximity::mock::MockRadio;

    struct AcceptAll;

    #[async_trait]
    impl RemoteVerifier for AcceptAll {
        async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResponse> {
            Ok(VerifyResponse {
                verified: true,
                token: None,
                message: None,
            })
        }
    }

    fn bare_session() -> MfaSession {
        MfaSession::new(
            "driver-7",
            Factor::ALL.iter().copied().collect(),
            ActivationPolicy::Parallel,
            MfaConfig::default(),
            Arc::new(ProximityChannel::new(Arc::new(MockRadio::new(vec![])))),
            Arc::new(TagChannel::new(Arc::new(MockReader::new(vec![])))),
            Box::new(AcceptAll),
        )
    }

    #[test]
    fn access_payload_matches_the_vehicle_profile() {
        assert_eq!(ACCESS_PAYLOAD, b"ACCESS");
    }

    #[tokio::test]
    async fn event_from_a_superseded_attempt_is_dropped() {
        let session = bare_session();

        let first = session.begin(Factor::Proximity).await.unwrap();
        session
            .apply_event(
                Factor::Proximity,
                first,
                FactorStatus::Failed("timeout".to_string()),
            )
            .await;
        session.retry(Factor::Proximity).await.unwrap();

        // A late completion from the timed-out attempt never resurrects it.
        let proof = FactorProof::new(Factor::Proximity, "stale-proof");
        session
            .apply_event(
                Factor::Proximity,
                first,
                FactorStatus::Completed(proof.clone()),
            )
            .await;
        assert_eq!(
            session.status_of(Factor::Proximity).await,
            Some(FactorStatus::Pending)
        );

        // Nor while the next attempt is already running.
        let second = session.begin(Factor::Proximity).await.unwrap();
        session
            .apply_event(Factor::Proximity, first, FactorStatus::Completed(proof))
            .await;
        assert_eq!(
            session.status_of(Factor::Proximity).await,
            Some(FactorStatus::InProgress)
        );

        // The live generation still lands normally.
        let proof = FactorProof::new(Factor::Proximity, "fresh-proof");
        session
            .apply_event(Factor::Proximity, second, FactorStatus::Completed(proof))
            .await;
        assert!(session
            .status_of(Factor::Proximity)
            .await
            .unwrap()
            .is_completed());
    }

    #[tokio::test]
    async fn concurrent_face_reports_leave_one_terminal_state() {
        for _ in 0..64 {
            let session = bare_session();

            let complete = {
                let session = session.clone();
                tokio::spawn(async move { session.complete_face_factor("face-ok").await })
            };
            let fail = {
                let session = session.clone();
                tokio::spawn(async move { session.fail_face_factor("liveness").await })
            };
            let complete = complete.await.unwrap();
            let fail = fail.await.unwrap();

            assert!(
                complete.is_ok() ^ fail.is_ok(),
                "exactly one face report may land"
            );
            let status = session.status_of(Factor::Face).await.unwrap();
            if complete.is_ok() {
                assert_eq!(status.proof().unwrap().token, "face-ok");
            } else {
                assert_eq!(status.failure_reason(), Some("liveness"));
            }
        }
    }
}
