// Proximity channel - owns one radio and at most one live connection

use crate::radio::{PeerLink, Radio, RadioState, ScanFilter};
use crate::{
    ConnectionState, ProximityError, ProximityPeer, ProximityResult, Result, WriteMode,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives one short-range radio through scan / connect / write / close cycles.
///
/// The channel owns the radio exclusively. At most one scan and at most one
/// live connection exist at any time; a new connection attempt fully closes
/// any prior link first.
pub struct ProximityChannel {
    radio: Arc<dyn Radio>,
    service: Uuid,
    characteristic: Uuid,
    scanning: Arc<RwLock<bool>>,
    connection_state: Arc<RwLock<ConnectionState>>,
    live_link: Arc<Mutex<Option<Box<dyn PeerLink>>>>,
}

impl ProximityChannel {
    /// Create a channel speaking the default vehicle access profile.
    pub fn new(radio: Arc<dyn Radio>) -> Self {
        Self::with_profile(
            radio,
            crate::backend::ACCESS_SERVICE_UUID,
            crate::backend::ACCESS_CHARACTERISTIC_UUID,
        )
    }

    pub fn with_profile(radio: Arc<dyn Radio>, service: Uuid, characteristic: Uuid) -> Self {
        Self {
            radio,
            service,
            characteristic,
            scanning: Arc::new(RwLock::new(false)),
            connection_state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            live_link: Arc::new(Mutex::new(None)),
        }
    }

    /// Start discovering peers.
    ///
    /// Fails with `AlreadyScanning` while a scan is active, and fast-fails
    /// when the radio is absent or disabled. The returned stream is infinite
    /// until [`ProximityChannel::stop_scan`] is called.
    pub async fn scan(&self, filter: ScanFilter) -> Result<mpsc::Receiver<ProximityPeer>> {
        {
            let mut scanning = self.scanning.write().await;
            if *scanning {
                return Err(ProximityError::AlreadyScanning);
            }

            match self.radio.state().await {
                RadioState::Unavailable => return Err(ProximityError::RadioUnavailable),
                RadioState::Disabled => return Err(ProximityError::RadioDisabled),
                RadioState::Ready => {}
            }

            info!(service = ?filter.service, "Starting proximity scan");
            *scanning = true;
        }

        match self.radio.start_scan(filter).await {
            Ok(receiver) => Ok(receiver),
            Err(err) => {
                *self.scanning.write().await = false;
                Err(err)
            }
        }
    }

    /// Stop an active scan. Idempotent.
    pub async fn stop_scan(&self) -> Result<()> {
        let mut scanning = self.scanning.write().await;
        if !*scanning {
            debug!("No active scan to stop");
            return Ok(());
        }

        info!("Stopping proximity scan");
        // The channel-side scan is over even if the radio refuses the stop;
        // leaving the flag set would wedge every future scan.
        *scanning = false;
        self.radio.stop_scan().await
    }

    pub async fn is_scanning(&self) -> bool {
        *self.scanning.read().await
    }

    /// Scan until the first peer appears or the deadline elapses.
    ///
    /// The scan is always stopped on the way out, match or no match.
    pub async fn scan_for_match(
        &self,
        filter: ScanFilter,
        deadline: Duration,
    ) -> Result<ProximityPeer> {
        let mut receiver = self.scan(filter).await?;
        let found = tokio::time::timeout(deadline, receiver.recv()).await;

        if let Err(err) = self.stop_scan().await {
            warn!(error = %err, "Failed to stop scan after match window");
        }

        match found {
            Ok(Some(peer)) => {
                info!(address = %peer.address, rssi = ?peer.signal_strength, "Matched peer");
                Ok(peer)
            }
            Ok(None) => Err(ProximityError::PeerNotFound),
            Err(_) => {
                debug!(deadline_ms = deadline.as_millis() as u64, "Scan deadline elapsed");
                Err(ProximityError::PeerNotFound)
            }
        }
    }

    /// Connect to `peer`, hand it the access payload, and close the
    /// connection again.
    ///
    /// The close runs on every exit path, success or failure. If the future
    /// driving this call is cancelled mid-flight, the link stays parked in
    /// the channel and [`ProximityChannel::stop`] (or the next connect)
    /// closes it.
    pub async fn connect_and_authorize(
        &self,
        peer: &ProximityPeer,
        payload: &[u8],
    ) -> Result<ProximityResult> {
        // Invariant: no two concurrent connections from the same channel.
        self.close_connection().await;

        self.set_state(ConnectionState::Connecting).await;
        info!(address = %peer.address, "Connecting to peer");

        let link = match self.radio.connect(peer).await {
            Ok(link) => link,
            Err(err) => {
                self.set_state(ConnectionState::Disconnected).await;
                return Err(err);
            }
        };

        {
            let mut slot = self.live_link.lock().await;
            *slot = Some(link);
        }

        let outcome = self.authorize_on_link(peer, payload).await;

        self.set_state(ConnectionState::Closing).await;
        self.close_connection().await;
        self.set_state(ConnectionState::Disconnected).await;

        outcome
    }

    async fn authorize_on_link(
        &self,
        peer: &ProximityPeer,
        payload: &[u8],
    ) -> Result<ProximityResult> {
        let mut slot = self.live_link.lock().await;
        let link = slot.as_mut().ok_or(ProximityError::ConnectionDropped)?;

        self.set_state(ConnectionState::ServicesDiscovering).await;
        let props = link
            .discover_characteristic(self.service, self.characteristic)
            .await?;

        let mode = WriteMode::select(&props).ok_or(ProximityError::NoWritableCharacteristic)?;
        debug!(%mode, "Selected write mode");

        self.set_state(ConnectionState::Ready).await;
        self.set_state(ConnectionState::WritingPayload).await;
        info!(address = %peer.address, %mode, len = payload.len(), "Writing access payload");
        link.write(payload, mode).await?;

        Ok(ProximityResult {
            peer_address: peer.address.clone(),
            write_mode: mode,
            payload_len: payload.len(),
            completed_at: Utc::now(),
        })
    }

    /// Close the live connection if one exists. Idempotent; close failures
    /// are logged, never propagated.
    pub async fn close_connection(&self) {
        let link = self.live_link.lock().await.take();
        if let Some(mut link) = link {
            if let Err(err) = link.close().await {
                warn!(error = %err, "Error closing peer link");
            }
        }
    }

    /// Stop everything this channel is doing: the scan, and any live
    /// connection. Idempotent and safe after cancellation.
    pub async fn stop(&self) {
        if let Err(err) = self.stop_scan().await {
            warn!(error = %err, "Error stopping scan during channel stop");
        }
        self.close_connection().await;
        self.set_state(ConnectionState::Disconnected).await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        let mut current = self.connection_state.write().await;
        if *current != state {
            debug!(from = %*current, to = %state, "Connection state change");
            *current = state;
        }
    }
}
