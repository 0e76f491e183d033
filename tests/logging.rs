//! Warnings emitted when a transfer degrades or fails.

use std::time::Duration;

use bts::{BtsConfig, BtsSession, Notification, notification_channel};
use bts_testing::{LoggerHandle, PeripheralBuilder, logger, peripheral};
use log::Level;
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn stale_notifications_are_discarded_with_a_warning(mut logger: LoggerHandle) {
    let (tx, rx) = notification_channel(8);
    let peripheral = PeripheralBuilder::default().build(tx.clone());
    let mut session = BtsSession::builder(peripheral.clone())
        .write_characteristic(peripheral::WRITE_HANDLE)
        .read_characteristic(peripheral::READ_HANDLE, peripheral::CCCD_HANDLE)
        .notifications(rx)
        .config(BtsConfig::default().with_fragment_delay(Duration::ZERO))
        .open()
        .await
        .expect("session opens");
    tx.try_send(Notification::new(peripheral::READ_HANDLE, vec![0x10, 0x00, 0x00, 0x01, 0x00]))
        .expect("queue has capacity");

    session.write(vec![5_u8; 45]).await.expect("write succeeds");

    assert_eq!(peripheral.received_blocks()[0].data.len(), 45);
    let warnings = logger.messages_at(Level::Warn);
    assert!(
        warnings
            .iter()
            .any(|message| message.contains("discarded stale notifications")),
        "missing stale notification warning: {warnings:?}"
    );
}

#[rstest]
#[tokio::test]
async fn failed_transfer_is_logged(mut logger: LoggerHandle) {
    let (_peripheral, mut session) = bts_testing::open_session(
        PeripheralBuilder::default().drop_fragment(1).offer(vec![3_u8; 60]),
        BtsConfig::default().with_fragment_delay(Duration::ZERO),
    )
    .await
    .expect("session opens");

    session.read().await.expect_err("read fails");

    let warnings = logger.messages_at(Level::Warn);
    assert!(
        warnings
            .iter()
            .any(|message| message.contains("read finished with missing fragments")),
        "missing fragment warning absent: {warnings:?}"
    );
    assert!(
        warnings
            .iter()
            .any(|message| message.contains("block transfer failed")),
        "failure warning absent: {warnings:?}"
    );
}
