// Server-side completion variant: poll the backend until it reports that
// every factor verified

use crate::{MfaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Per-factor verification flags as the backend reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub face_verified: bool,
    #[serde(default)]
    pub ble_verified: bool,
    #[serde(default)]
    pub nfc_verified: bool,
    #[serde(default)]
    pub all_verified: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Where poll results come from. Implementations must be cheap to call
/// repeatedly.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<PollResponse>;
}

/// HTTP source speaking the production result endpoint.
pub struct HttpCompletionSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCompletionSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &shared::MfaConfig) -> Self {
        Self::new(config.verifier_base_url.clone())
    }
}

#[async_trait]
impl CompletionSource for HttpCompletionSource {
    async fn fetch(&self, user_id: &str) -> Result<PollResponse> {
        let url = format!("{}/auth/result", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(|e| MfaError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MfaError::Transport(format!(
                "result endpoint returned HTTP {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MfaError::Transport(e.to_string()))
    }
}

/// What one polling run observed.
#[derive(Debug, Clone)]
pub struct PollResult {
    /// The backend reported `all_verified` before the poller was stopped.
    pub completed: bool,
    /// Completion was observed after the debounce window, safe to hand the
    /// user off immediately.
    pub ready_for_handoff: bool,
    /// Polls performed, successful or not.
    pub iterations: u32,
    pub last: Option<PollResponse>,
}

/// Polls a [`CompletionSource`] at a fixed interval until completion or stop.
///
/// The loop ends the moment `all_verified` is observed. The debounce window
/// only withholds `ready_for_handoff` when completion arrives faster than the
/// operator can follow; it never extends the loop. Transport errors are
/// logged and polling continues.
#[derive(Clone)]
pub struct CompletionPoller {
    source: Arc<dyn CompletionSource>,
    interval: Duration,
    debounce_iterations: u32,
    stopped: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
}

impl CompletionPoller {
    pub fn new(source: Arc<dyn CompletionSource>, interval: Duration, debounce_iterations: u32) -> Self {
        Self {
            source,
            interval,
            debounce_iterations,
            stopped: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(source: Arc<dyn CompletionSource>, config: &shared::MfaConfig) -> Self {
        Self::new(
            source,
            Duration::from_secs(config.poll_interval_secs),
            config.poll_debounce_iterations,
        )
    }

    /// Poll until the backend reports completion or [`CompletionPoller::stop`]
    /// is called.
    pub async fn run(&self, user_id: &str) -> PollResult {
        let mut iterations = 0u32;
        let mut last = None;
        let mut completed = false;

        while !self.stopped.load(Ordering::SeqCst) {
            iterations += 1;

            match self.source.fetch(user_id).await {
                Ok(response) => {
                    debug!(
                        iteration = iterations,
                        face = response.face_verified,
                        ble = response.ble_verified,
                        nfc = response.nfc_verified,
                        "Poll result"
                    );
                    let all_verified = response.all_verified;
                    last = Some(response);
                    if all_verified {
                        completed = true;
                        break;
                    }
                }
                Err(err) => {
                    warn!(iteration = iterations, error = %err, "Poll failed, continuing");
                }
            }

            tokio::select! {
                _ = self.stop_signal.notified() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        let ready_for_handoff = completed && iterations >= self.debounce_iterations;
        if completed {
            info!(iterations, ready_for_handoff, "Polling observed completion");
        } else {
            info!(iterations, "Polling stopped without completion");
        }

        PollResult {
            completed,
            ready_for_handoff,
            iterations,
            last,
        }
    }

    /// Stop an in-flight run promptly. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
    }
}
