use proximity::mock::{access_peer, MockLinkBehavior, MockRadio};
use proximity::{
    CharacteristicProps, ConnectionState, ProximityChannel, ProximityError, RadioState, ScanFilter,
    WriteMode, ACCESS_SERVICE_UUID,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn scan_for_match_returns_first_advertising_peer() {
    let radio = MockRadio::new(vec![access_peer("AA:BB:CC:DD:EE:01")]);
    let channel = ProximityChannel::new(Arc::new(radio));

    let peer = channel
        .scan_for_match(
            ScanFilter::for_service(ACCESS_SERVICE_UUID),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(peer.address, "AA:BB:CC:DD:EE:01");
    assert!(!channel.is_scanning().await, "scan must stop after a match");
}

#[tokio::test]
async fn scan_filter_skips_peers_without_the_service() {
    let mut stranger = access_peer("AA:BB:CC:DD:EE:02");
    stranger.services.clear();

    let radio = MockRadio::new(vec![stranger]);
    let channel = ProximityChannel::new(Arc::new(radio));

    let result = channel
        .scan_for_match(
            ScanFilter::for_service(ACCESS_SERVICE_UUID),
            Duration::from_millis(100),
        )
        .await;

    assert!(matches!(result, Err(ProximityError::PeerNotFound)));
    assert!(!channel.is_scanning().await);
}

#[tokio::test]
async fn scan_deadline_maps_to_peer_not_found() {
    let mut radio = MockRadio::new(vec![access_peer("AA:BB:CC:DD:EE:03")]);
    radio.peer_delay = Duration::from_secs(5);
    let channel = ProximityChannel::new(Arc::new(radio));

    let result = channel
        .scan_for_match(
            ScanFilter::for_service(ACCESS_SERVICE_UUID),
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(ProximityError::PeerNotFound)));
}

#[tokio::test]
async fn second_scan_while_active_is_rejected() {
    let radio = MockRadio::new(vec![]);
    let channel = ProximityChannel::new(Arc::new(radio));

    let _stream = channel.scan(ScanFilter::default()).await.unwrap();
    let second = channel.scan(ScanFilter::default()).await;

    assert!(matches!(second, Err(ProximityError::AlreadyScanning)));

    channel.stop_scan().await.unwrap();
    assert!(channel.scan(ScanFilter::default()).await.is_ok());
}

#[tokio::test]
async fn failed_stop_does_not_wedge_the_channel() {
    let mut radio = MockRadio::new(vec![access_peer("AA:BB:CC:DD:EE:04")]);
    radio.stop_failure = Some("adapter reset".to_string());
    let channel = ProximityChannel::new(Arc::new(radio));

    let _stream = channel.scan(ScanFilter::default()).await.unwrap();
    let result = channel.stop_scan().await;

    assert!(matches!(result, Err(ProximityError::Backend(_))));
    assert!(!channel.is_scanning().await);
    // The next scan must not be refused as already running.
    assert!(channel.scan(ScanFilter::default()).await.is_ok());
}

#[tokio::test]
async fn disabled_radio_fails_fast() {
    let radio = MockRadio::new(vec![]).with_state(RadioState::Disabled);
    let channel = ProximityChannel::new(Arc::new(radio));

    let result = channel.scan(ScanFilter::default()).await;
    assert!(matches!(result, Err(ProximityError::RadioDisabled)));
    assert!(!channel.is_scanning().await);
}

#[tokio::test]
async fn authorize_writes_payload_and_closes_exactly_once() {
    let radio = MockRadio::new(vec![]);
    let stats = radio.link_stats();
    let channel = ProximityChannel::new(Arc::new(radio));
    let peer = access_peer("AA:BB:CC:DD:EE:10");

    let result = channel.connect_and_authorize(&peer, b"ACCESS").await.unwrap();

    assert_eq!(result.peer_address, "AA:BB:CC:DD:EE:10");
    assert_eq!(result.write_mode, WriteMode::Unacknowledged);
    assert_eq!(result.payload_len, 6);

    let writes = stats.writes.lock().await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, b"ACCESS");
    assert_eq!(stats.close_count.load(Ordering::SeqCst), 1);
    assert_eq!(channel.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn acknowledged_write_used_when_unacknowledged_missing() {
    let behavior = MockLinkBehavior {
        props: CharacteristicProps {
            write: true,
            write_without_response: false,
            signed_write: true,
        },
        ..Default::default()
    };
    let radio = MockRadio::new(vec![]).with_link_behavior(behavior);
    let channel = ProximityChannel::new(Arc::new(radio));
    let peer = access_peer("AA:BB:CC:DD:EE:11");

    let result = channel.connect_and_authorize(&peer, b"ACCESS").await.unwrap();
    assert_eq!(result.write_mode, WriteMode::Acknowledged);
}

#[tokio::test]
async fn unwritable_characteristic_is_an_error_and_still_closes() {
    let behavior = MockLinkBehavior {
        props: CharacteristicProps::default(),
        ..Default::default()
    };
    let radio = MockRadio::new(vec![]).with_link_behavior(behavior);
    let stats = radio.link_stats();
    let channel = ProximityChannel::new(Arc::new(radio));
    let peer = access_peer("AA:BB:CC:DD:EE:12");

    let result = channel.connect_and_authorize(&peer, b"ACCESS").await;

    assert!(matches!(
        result,
        Err(ProximityError::NoWritableCharacteristic)
    ));
    assert_eq!(stats.close_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn write_failure_propagates_but_link_is_closed() {
    let behavior = MockLinkBehavior {
        write_failure: Some("GATT error 133".to_string()),
        ..Default::default()
    };
    let radio = MockRadio::new(vec![]).with_link_behavior(behavior);
    let stats = radio.link_stats();
    let channel = ProximityChannel::new(Arc::new(radio));
    let peer = access_peer("AA:BB:CC:DD:EE:13");

    let result = channel.connect_and_authorize(&peer, b"ACCESS").await;

    assert!(matches!(result, Err(ProximityError::WriteRejected(_))));
    assert_eq!(stats.close_count.load(Ordering::SeqCst), 1);
    assert_eq!(channel.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn cancelled_authorize_leaves_link_closable_via_stop() {
    let behavior = MockLinkBehavior {
        write_delay: Duration::from_secs(10),
        ..Default::default()
    };
    let radio = MockRadio::new(vec![]).with_link_behavior(behavior);
    let stats = radio.link_stats();
    let channel = Arc::new(ProximityChannel::new(Arc::new(radio)));
    let peer = access_peer("AA:BB:CC:DD:EE:14");

    let task = {
        let channel = Arc::clone(&channel);
        let peer = peer.clone();
        tokio::spawn(async move { channel.connect_and_authorize(&peer, b"ACCESS").await })
    };

    // Let the task get as far as the blocked write, then cancel it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    task.abort();
    assert!(task.await.is_err());
    assert_eq!(stats.close_count.load(Ordering::SeqCst), 0);

    channel.stop().await;
    assert_eq!(stats.close_count.load(Ordering::SeqCst), 1);
    assert_eq!(channel.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let radio = MockRadio::new(vec![]);
    let channel = ProximityChannel::new(Arc::new(radio));

    channel.stop().await;
    channel.stop().await;
    assert_eq!(channel.connection_state().await, ConnectionState::Disconnected);
}
