// Reader abstraction - the hardware seam between the channel and the NFC
// controller

use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Availability of the tag reader hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unavailable,
    Disabled,
    Ready,
}

/// A tag as the hardware reports it, before parsing.
pub struct RawTag {
    /// Raw UID bytes, typically 4, 7 or 10 for ISO 14443-A tags.
    pub uid: Vec<u8>,
    /// Platform technology identifiers, e.g. `android.nfc.tech.IsoDep`.
    pub technologies: Vec<String>,
    /// Command session for tags that support ISO-DEP, `None` otherwise.
    pub sub_session: Option<Box<dyn SubSession>>,
}

impl std::fmt::Debug for RawTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTag")
            .field("uid", &self.uid)
            .field("technologies", &self.technologies)
            .field("sub_session", &self.sub_session.is_some())
            .finish()
    }
}

/// One NFC reader. The channel owns exactly one implementation and the tag
/// stream is single-consumer.
#[async_trait]
pub trait TagReader: Send + Sync {
    async fn state(&self) -> ReaderState;

    /// Put the reader into detection mode and stream presented tags.
    ///
    /// The stream ends when [`TagReader::disable_reading`] is called.
    async fn enable_reading(&self) -> Result<mpsc::Receiver<RawTag>>;

    /// Leave detection mode. Idempotent.
    async fn disable_reading(&self) -> Result<()>;
}

/// Short-lived command exchange with one physically present tag.
///
/// The session dies with physical proximity: once the tag leaves the field
/// every call fails and the session cannot be reopened.
#[async_trait]
pub trait SubSession: Send + Sync {
    /// Send one command and await the tag's full response.
    async fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Release the tag. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
