// In-memory radio for development and tests, no hardware required

use crate::radio::{PeerLink, Radio, RadioState, ScanFilter};
use crate::{CharacteristicProps, ProximityError, ProximityPeer, Result, WriteMode};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Scripted behavior for the links a [`MockRadio`] hands out.
#[derive(Debug, Clone)]
pub struct MockLinkBehavior {
    pub props: CharacteristicProps,
    /// Error message to fail writes with, `None` for success.
    pub write_failure: Option<String>,
    /// Added latency before each write completes.
    pub write_delay: Duration,
    /// When set, `discover_characteristic` fails for every service.
    pub missing_characteristic: bool,
}

impl Default for MockLinkBehavior {
    fn default() -> Self {
        Self {
            props: CharacteristicProps {
                write: true,
                write_without_response: true,
                signed_write: false,
            },
            write_failure: None,
            write_delay: Duration::ZERO,
            missing_characteristic: false,
        }
    }
}

/// Shared counters exposed so tests can assert link lifecycle invariants.
#[derive(Debug, Default)]
pub struct MockLinkStats {
    pub close_count: AtomicUsize,
    pub writes: Mutex<Vec<(Vec<u8>, WriteMode)>>,
}

pub struct MockPeerLink {
    behavior: MockLinkBehavior,
    stats: Arc<MockLinkStats>,
    open: AtomicBool,
}

#[async_trait]
impl PeerLink for MockPeerLink {
    async fn discover_characteristic(
        &mut self,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<CharacteristicProps> {
        if !self.is_open() {
            return Err(ProximityError::ConnectionDropped);
        }
        if self.behavior.missing_characteristic {
            return Err(ProximityError::CharacteristicNotFound);
        }
        Ok(self.behavior.props)
    }

    async fn write(&mut self, payload: &[u8], mode: WriteMode) -> Result<()> {
        if !self.is_open() {
            return Err(ProximityError::ConnectionDropped);
        }
        if !self.behavior.write_delay.is_zero() {
            tokio::time::sleep(self.behavior.write_delay).await;
        }
        if let Some(reason) = &self.behavior.write_failure {
            return Err(ProximityError::WriteRejected(reason.clone()));
        }
        self.stats.writes.lock().await.push((payload.to_vec(), mode));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Close is idempotent: only the first call counts.
        if self.open.swap(false, Ordering::SeqCst) {
            self.stats.close_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Radio backed by a scripted peer list instead of hardware.
pub struct MockRadio {
    state: RadioState,
    peers: Vec<ProximityPeer>,
    /// Delay before each peer is emitted on the scan stream.
    pub peer_delay: Duration,
    /// Error message to fail `connect` with, `None` for success.
    pub connect_failure: Option<String>,
    /// Error message to fail `stop_scan` with, `None` for success.
    pub stop_failure: Option<String>,
    pub link_behavior: MockLinkBehavior,
    link_stats: Arc<MockLinkStats>,
    scanning: AtomicBool,
}

impl MockRadio {
    pub fn new(peers: Vec<ProximityPeer>) -> Self {
        Self {
            state: RadioState::Ready,
            peers,
            peer_delay: Duration::ZERO,
            connect_failure: None,
            stop_failure: None,
            link_behavior: MockLinkBehavior::default(),
            link_stats: Arc::new(MockLinkStats::default()),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn with_state(mut self, state: RadioState) -> Self {
        self.state = state;
        self
    }

    pub fn with_link_behavior(mut self, behavior: MockLinkBehavior) -> Self {
        self.link_behavior = behavior;
        self
    }

    /// Counters shared by every link this radio has handed out.
    pub fn link_stats(&self) -> Arc<MockLinkStats> {
        Arc::clone(&self.link_stats)
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn state(&self) -> RadioState {
        self.state
    }

    async fn start_scan(&self, filter: ScanFilter) -> Result<mpsc::Receiver<ProximityPeer>> {
        self.scanning.store(true, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        let peers = self.peers.clone();
        let delay = self.peer_delay;

        tokio::spawn(async move {
            for peer in peers {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Some(service) = filter.service {
                    if !peer.advertises_service(&service) {
                        continue;
                    }
                }
                if tx.send(peer).await.is_err() {
                    break;
                }
            }
            // Keep the stream open after the scripted peers drain, like a
            // real scan that simply sees nothing else.
            std::future::pending::<()>().await;
        });

        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scanning.store(false, Ordering::SeqCst);
        if let Some(reason) = &self.stop_failure {
            return Err(ProximityError::Backend(reason.clone()));
        }
        Ok(())
    }

    async fn connect(&self, _peer: &ProximityPeer) -> Result<Box<dyn PeerLink>> {
        if let Some(reason) = &self.connect_failure {
            return Err(ProximityError::Backend(reason.clone()));
        }
        Ok(Box::new(MockPeerLink {
            behavior: self.link_behavior.clone(),
            stats: Arc::clone(&self.link_stats),
            open: AtomicBool::new(true),
        }))
    }
}

/// Convenience peer advertising the vehicle access service.
pub fn access_peer(address: &str) -> ProximityPeer {
    let mut peer = ProximityPeer::new(address);
    peer.name = Some("VEHICLE-UNIT".to_string());
    peer.signal_strength = Some(-48);
    peer.services.push(crate::backend::ACCESS_SERVICE_UUID);
    peer
}
