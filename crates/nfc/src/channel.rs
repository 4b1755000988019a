// Tag channel - detection stream plus policy validation

use crate::apdu::{select_command, split_trailer};
use crate::reader::{ReaderState, TagReader};
use crate::{Result, TagError, TagPolicy, TagReading, ValidatedTag};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

const DEFAULT_SUB_SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one NFC reader: streams presented tags and validates them against
/// an acceptance policy.
pub struct TagChannel {
    reader: Arc<dyn TagReader>,
    reading: Arc<RwLock<bool>>,
    sub_session_timeout: Duration,
}

impl TagChannel {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self {
            reader,
            reading: Arc::new(RwLock::new(false)),
            sub_session_timeout: DEFAULT_SUB_SESSION_TIMEOUT,
        }
    }

    pub fn with_sub_session_timeout(mut self, timeout: Duration) -> Self {
        self.sub_session_timeout = timeout;
        self
    }

    /// Enter reader mode and stream parsed tags, one per tap.
    ///
    /// Fails with `AlreadyReading` while a stream is active, and fast-fails
    /// when the reader is absent or disabled.
    pub async fn enable_reading(&self) -> Result<mpsc::Receiver<TagReading>> {
        {
            let mut reading = self.reading.write().await;
            if *reading {
                return Err(TagError::AlreadyReading);
            }

            match self.reader.state().await {
                ReaderState::Unavailable => return Err(TagError::ReaderUnavailable),
                ReaderState::Disabled => return Err(TagError::ReaderDisabled),
                ReaderState::Ready => {}
            }

            info!("Enabling tag reading");
            *reading = true;
        }

        let mut raw_stream = match self.reader.enable_reading().await {
            Ok(stream) => stream,
            Err(err) => {
                *self.reading.write().await = false;
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(raw) = raw_stream.recv().await {
                let reading = TagReading::from_raw(raw);
                debug!(uid = %reading.uid_hex, "Tag detected");
                if tx.send(reading).await.is_err() {
                    debug!("Tag consumer dropped");
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Leave reader mode. Idempotent.
    pub async fn disable_reading(&self) -> Result<()> {
        let mut reading = self.reading.write().await;
        if !*reading {
            debug!("Tag reading not active");
            return Ok(());
        }

        info!("Disabling tag reading");
        self.reader.disable_reading().await?;
        *reading = false;
        Ok(())
    }

    pub async fn is_reading(&self) -> bool {
        *self.reading.read().await
    }

    /// Validate one reading against the policy.
    ///
    /// The UID length check runs before any tag communication so that
    /// obviously bogus tags never get a command session. The SELECT exchange
    /// is bounded by the sub-session timeout; on expiry the tag may have left
    /// the field and the session is unusable, so the reading is consumed
    /// either way.
    pub async fn validate(
        &self,
        mut reading: TagReading,
        policy: &TagPolicy,
    ) -> Result<ValidatedTag> {
        if reading.uid.len() < policy.min_uid_bytes {
            return Err(TagError::UidTooShort {
                len: reading.uid.len(),
                min: policy.min_uid_bytes,
            });
        }

        let session = reading
            .sub_session
            .as_mut()
            .ok_or(TagError::SubSessionUnavailable)?;

        let apdu = select_command(&policy.application_id);
        debug!(uid = %reading.uid_hex, "Selecting vehicle applet");

        let exchange = async {
            let response = session.transceive(&apdu).await?;
            let (_, trailer) = split_trailer(&response)?;
            Ok::<[u8; 2], TagError>(trailer)
        };

        let outcome = match tokio::time::timeout(self.sub_session_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(uid = %reading.uid_hex, "Tag sub-session timed out");
                Err(TagError::SubSessionTimeout)
            }
        };

        // The session was touched, so it is released on every exit path.
        if let Some(session) = reading.sub_session.as_mut() {
            if let Err(err) = session.close().await {
                debug!(error = %err, "Error closing tag sub-session");
            }
        }

        let trailer = outcome?;

        if trailer != policy.expected_trailer {
            return Err(TagError::UnexpectedStatusTrailer {
                expected: policy.expected_trailer,
                actual: trailer,
            });
        }

        info!(uid = %reading.uid_hex, "Tag validated");
        Ok(ValidatedTag {
            uid_hex: reading.uid_hex,
            validated_at: Utc::now(),
        })
    }

    /// Convenience: wait for the next tap that passes validation, skipping
    /// readings the policy rejects, until the deadline elapses.
    pub async fn read_validated(
        &self,
        policy: &TagPolicy,
        deadline: Duration,
    ) -> Result<ValidatedTag> {
        let mut stream = self.enable_reading().await?;

        let wait = async {
            while let Some(reading) = stream.recv().await {
                // Every validation failure is per-tag; keep waiting for the
                // next tap.
                match self.validate(reading, policy).await {
                    Ok(tag) => return Ok(tag),
                    Err(err) => {
                        warn!(error = %err, "Rejected tag, waiting for another tap");
                    }
                }
            }
            Err(TagError::ReaderStopped)
        };

        let result = tokio::time::timeout(deadline, wait).await;

        if let Err(err) = self.disable_reading().await {
            warn!(error = %err, "Failed to disable reading after validation window");
        }

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(TagError::ReaderStopped),
        }
    }

    /// Shut the channel down. Idempotent.
    pub async fn stop(&self) {
        if let Err(err) = self.disable_reading().await {
            warn!(error = %err, "Error disabling reading during channel stop");
        }
    }
}
