// In-memory reader for development and tests, no hardware required

use crate::apdu::STATUS_OK;
use crate::reader::{RawTag, ReaderState, SubSession, TagReader};
use crate::{Result, TagError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Scripted behavior for [`MockSubSession`].
#[derive(Debug, Clone)]
pub struct MockSessionBehavior {
    /// Response returned by every transceive.
    pub response: Vec<u8>,
    /// Added latency before each transceive completes.
    pub transceive_delay: Duration,
    /// Error message to fail transceive with, `None` for success.
    pub transceive_failure: Option<String>,
}

impl Default for MockSessionBehavior {
    fn default() -> Self {
        Self {
            response: STATUS_OK.to_vec(),
            transceive_delay: Duration::ZERO,
            transceive_failure: None,
        }
    }
}

/// Counters shared so tests can assert session lifecycle invariants.
#[derive(Debug, Default)]
pub struct MockSessionStats {
    pub transceive_count: AtomicUsize,
    pub close_count: AtomicUsize,
    pub commands: Mutex<Vec<Vec<u8>>>,
}

pub struct MockSubSession {
    behavior: MockSessionBehavior,
    stats: Arc<MockSessionStats>,
    open: AtomicBool,
}

impl MockSubSession {
    pub fn new(behavior: MockSessionBehavior, stats: Arc<MockSessionStats>) -> Self {
        Self {
            behavior,
            stats,
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SubSession for MockSubSession {
    async fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TagError::Backend("session closed".to_string()));
        }
        self.stats.transceive_count.fetch_add(1, Ordering::SeqCst);
        self.stats.commands.lock().await.push(command.to_vec());

        if !self.behavior.transceive_delay.is_zero() {
            tokio::time::sleep(self.behavior.transceive_delay).await;
        }
        if let Some(reason) = &self.behavior.transceive_failure {
            return Err(TagError::Backend(reason.clone()));
        }
        Ok(self.behavior.response.clone())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.stats.close_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Script for one tag presented by a [`MockReader`].
pub struct MockTag {
    pub uid: Vec<u8>,
    pub technologies: Vec<String>,
    /// `None` produces a tag with no command session.
    pub session_behavior: Option<MockSessionBehavior>,
}

impl MockTag {
    /// An ISO-DEP capable vehicle key that answers SELECT with `90 00`.
    pub fn vehicle_key(uid: Vec<u8>) -> Self {
        Self {
            uid,
            technologies: vec![
                "android.nfc.tech.IsoDep".to_string(),
                "android.nfc.tech.NfcA".to_string(),
            ],
            session_behavior: Some(MockSessionBehavior::default()),
        }
    }
}

/// Reader backed by a scripted tag list instead of hardware.
pub struct MockReader {
    state: ReaderState,
    tags: Mutex<Vec<MockTag>>,
    /// Delay before each tag is emitted on the detection stream.
    pub tap_delay: Duration,
    session_stats: Arc<MockSessionStats>,
    reading: AtomicBool,
}

impl MockReader {
    pub fn new(tags: Vec<MockTag>) -> Self {
        Self {
            state: ReaderState::Ready,
            tags: Mutex::new(tags),
            tap_delay: Duration::ZERO,
            session_stats: Arc::new(MockSessionStats::default()),
            reading: AtomicBool::new(false),
        }
    }

    pub fn with_state(mut self, state: ReaderState) -> Self {
        self.state = state;
        self
    }

    /// Counters shared by every sub-session this reader has handed out.
    pub fn session_stats(&self) -> Arc<MockSessionStats> {
        Arc::clone(&self.session_stats)
    }
}

#[async_trait]
impl TagReader for MockReader {
    async fn state(&self) -> ReaderState {
        self.state
    }

    async fn enable_reading(&self) -> Result<mpsc::Receiver<RawTag>> {
        self.reading.store(true, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);

        let tags = std::mem::take(&mut *self.tags.lock().await);
        let stats = Arc::clone(&self.session_stats);
        let delay = self.tap_delay;

        tokio::spawn(async move {
            for tag in tags {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let sub_session = tag.session_behavior.map(|behavior| {
                    Box::new(MockSubSession::new(behavior, Arc::clone(&stats)))
                        as Box<dyn SubSession>
                });
                let raw = RawTag {
                    uid: tag.uid,
                    technologies: tag.technologies,
                    sub_session,
                };
                if tx.send(raw).await.is_err() {
                    break;
                }
            }
            // Keep the stream open after the scripted taps drain, like a real
            // reader waiting for the next tag.
            std::future::pending::<()>().await;
        });

        Ok(rx)
    }

    async fn disable_reading(&self) -> Result<()> {
        self.reading.store(false, Ordering::SeqCst);
        Ok(())
    }
}
