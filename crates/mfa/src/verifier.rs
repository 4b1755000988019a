// Remote verifier client - the single network boundary of a session

use crate::{MfaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Proof bundle submitted once every required factor has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub session_id: Uuid,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_token: Option<String>,
    #[serde(rename = "ble_hash_key", skip_serializing_if = "Option::is_none")]
    pub proximity_token: Option<String>,
    #[serde(rename = "nfc_uid", skip_serializing_if = "Option::is_none")]
    pub tag_uid: Option<String>,
}

/// The verifier's final answer. Partial success is never reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The session's only network dependency. Implementations decide accept or
/// reject; transport failures surface as [`MfaError::Transport`].
#[async_trait]
pub trait RemoteVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse>;
}

/// HTTP verifier speaking the production authentication endpoint.
pub struct HttpVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVerifier {
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
impl RemoteVerifier for HttpVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse> {
        let url = format!("{}/mfa/authenticate", self.base_url);
        debug!(%url, session_id = %request.session_id, "Submitting proof bundle");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| MfaError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(MfaError::VerifierRejected(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(MfaError::Transport(format!(
                "verifier returned HTTP {}",
                status
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| MfaError::Transport(e.to_string()))?;

        info!(
            session_id = %request.session_id,
            verified = body.verified,
            "Verifier responded"
        );
        Ok(body)
    }
}
