// Radio abstraction - the hardware seam between the channel and the BLE stack

use crate::{CharacteristicProps, ProximityPeer, Result, WriteMode};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Availability of the underlying radio hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Unavailable,
    Disabled,
    Ready,
}

/// Optional service filter applied while scanning.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub service: Option<Uuid>,
}

impl ScanFilter {
    pub fn for_service(service: Uuid) -> Self {
        Self {
            service: Some(service),
        }
    }
}

/// One short-range radio. The channel owns exactly one implementation and is
/// the only caller; the scan stream and the peer link are both single-consumer.
#[async_trait]
pub trait Radio: Send + Sync {
    async fn state(&self) -> RadioState;

    /// Put the radio into active discovery mode and stream discovered peers.
    ///
    /// The stream is infinite until [`Radio::stop_scan`] is called, at which
    /// point the sender side is dropped and the receiver terminates.
    async fn start_scan(&self, filter: ScanFilter) -> Result<mpsc::Receiver<ProximityPeer>>;

    /// Stop an active scan. Idempotent: safe to call when no scan is running.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a connection to the given peer.
    async fn connect(&self, peer: &ProximityPeer) -> Result<Box<dyn PeerLink>>;
}

/// A live connection to one peer.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Run service discovery and locate the access-control characteristic,
    /// returning its declared write capabilities.
    async fn discover_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicProps>;

    /// Transmit the payload using the selected write mode.
    async fn write(&mut self, payload: &[u8], mode: WriteMode) -> Result<()>;

    /// Close the connection. Idempotent: closing an already-closed link is a
    /// no-op.
    async fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}
