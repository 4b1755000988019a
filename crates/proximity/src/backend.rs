// btleplug-backed radio implementation

use crate::radio::{PeerLink, Radio, RadioState, ScanFilter};
use crate::{CharacteristicProps, ProximityError, ProximityPeer, Result, WriteMode};
use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// GATT service advertised by the in-vehicle access unit.
pub const ACCESS_SERVICE_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x12345678_0000_1000_8000_111033441122);

/// Characteristic the access payload is written to.
pub const ACCESS_CHARACTERISTIC_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0xc0de0001_0000_1000_8000_000000000001);

/// How often the scan loop re-reads the adapter's peripheral cache.
const SCAN_POLL_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_millis(500);

/// [`Radio`] backed by the host's Bluetooth adapter via btleplug.
pub struct BtleRadio {
    adapter: Adapter,
    stopping: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
}

impl BtleRadio {
    /// Bind to the first Bluetooth adapter on the host.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| ProximityError::Backend(format!("Failed to create BLE manager: {}", e)))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| ProximityError::Backend(format!("Failed to get BLE adapters: {}", e)))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(ProximityError::RadioUnavailable)?;

        Ok(Self {
            adapter,
            stopping: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
        })
    }

    async fn poll_peripherals(
        adapter: Adapter,
        filter: ScanFilter,
        tx: mpsc::Sender<ProximityPeer>,
        stopping: Arc<AtomicBool>,
        stop_signal: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                _ = stop_signal.notified() => {}
                _ = tokio::time::sleep(SCAN_POLL_INTERVAL) => {}
            }
            // The flag catches a stop raised while the previous batch was
            // still being processed.
            if stopping.load(Ordering::SeqCst) {
                debug!("Scan loop stopped");
                return;
            }

            let peripherals = match adapter.peripherals().await {
                Ok(peripherals) => peripherals,
                Err(e) => {
                    error!("Failed to read peripherals: {}", e);
                    continue;
                }
            };

            for peripheral in peripherals {
                let properties = match peripheral.properties().await {
                    Ok(Some(p)) => p,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!("Failed to read peripheral properties: {}", e);
                        continue;
                    }
                };

                if let Some(service) = filter.service {
                    if !properties.services.contains(&service) {
                        continue;
                    }
                }

                let now = Utc::now();
                let peer = ProximityPeer {
                    address: peripheral.address().to_string(),
                    name: properties.local_name.clone(),
                    signal_strength: properties.rssi.map(|r| r.clamp(-128, 127) as i8),
                    services: properties.services.clone(),
                    discovered_at: now,
                    last_seen: now,
                };

                if tx.send(peer).await.is_err() {
                    debug!("Scan consumer dropped, stopping scan loop");
                    return;
                }
            }
        }
    }

    async fn peripheral_by_address(&self, address: &str) -> Result<Peripheral> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| ProximityError::Backend(format!("Failed to read peripherals: {}", e)))?;

        for peripheral in peripherals {
            if peripheral.address().to_string() == address {
                return Ok(peripheral);
            }
        }

        Err(ProximityError::PeerNotFound)
    }
}

#[async_trait]
impl Radio for BtleRadio {
    async fn state(&self) -> RadioState {
        // btleplug exposes no powered-off probe on all platforms; a failing
        // peripheral read is the closest signal we get.
        match self.adapter.peripherals().await {
            Ok(_) => RadioState::Ready,
            Err(_) => RadioState::Disabled,
        }
    }

    async fn start_scan(&self, filter: ScanFilter) -> Result<mpsc::Receiver<ProximityPeer>> {
        self.adapter
            .start_scan(btleplug::api::ScanFilter::default())
            .await
            .map_err(|e| ProximityError::Backend(format!("Failed to start BLE scan: {}", e)))?;

        self.stopping.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(32);
        let adapter = self.adapter.clone();
        let stopping = Arc::clone(&self.stopping);
        let stop_signal = Arc::clone(&self.stop_signal);

        tokio::spawn(Self::poll_peripherals(adapter, filter, tx, stopping, stop_signal));

        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| ProximityError::Backend(format!("Failed to stop BLE scan: {}", e)))
    }

    async fn connect(&self, peer: &ProximityPeer) -> Result<Box<dyn PeerLink>> {
        let peripheral = self.peripheral_by_address(&peer.address).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| ProximityError::Backend(format!("Failed to connect: {}", e)))?;

        info!(address = %peer.address, "Connected to peripheral");

        Ok(Box::new(BtleLink {
            peripheral,
            characteristic: None,
        }))
    }
}

/// Live GATT connection to a single peripheral.
pub struct BtleLink {
    peripheral: Peripheral,
    characteristic: Option<Characteristic>,
}

#[async_trait]
impl PeerLink for BtleLink {
    async fn discover_characteristic(
        &mut self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Result<CharacteristicProps> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| ProximityError::Backend(format!("Service discovery failed: {}", e)))?;

        let found = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic);

        let found = match found {
            Some(c) => c,
            None if self
                .peripheral
                .services()
                .iter()
                .all(|s| s.uuid != service) =>
            {
                return Err(ProximityError::ServiceNotFound)
            }
            None => return Err(ProximityError::CharacteristicNotFound),
        };

        let props = CharacteristicProps {
            write: found.properties.contains(CharPropFlags::WRITE),
            write_without_response: found
                .properties
                .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            signed_write: found
                .properties
                .contains(CharPropFlags::AUTHENTICATED_SIGNED_WRITES),
        };

        self.characteristic = Some(found);
        Ok(props)
    }

    async fn write(&mut self, payload: &[u8], mode: WriteMode) -> Result<()> {
        let characteristic = self
            .characteristic
            .as_ref()
            .ok_or(ProximityError::CharacteristicNotFound)?;

        // btleplug has no dedicated signed-write call; signed falls back to
        // an acknowledged write.
        let write_type = match mode {
            WriteMode::Unacknowledged => WriteType::WithoutResponse,
            WriteMode::Acknowledged | WriteMode::Signed => WriteType::WithResponse,
        };

        self.peripheral
            .write(characteristic, payload, write_type)
            .await
            .map_err(|e| ProximityError::WriteRejected(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Error disconnecting peripheral: {}", e);
        }
        self.characteristic = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.characteristic.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_profile_uuids_are_stable() {
        assert_eq!(
            ACCESS_SERVICE_UUID.to_string(),
            "12345678-0000-1000-8000-111033441122"
        );
        assert_eq!(
            ACCESS_CHARACTERISTIC_UUID.to_string(),
            "c0de0001-0000-1000-8000-000000000001"
        );
    }
}
