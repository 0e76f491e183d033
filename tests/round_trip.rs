//! Blocks of any supported size survive a write and a read unchanged.

use std::time::Duration;

use bts::{BtsConfig, FragmentSource};
use bts_testing::{PeripheralBuilder, open_session};
use bytes::Bytes;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime builds")
}

async fn round_trip(data: Bytes, window: u16, source: FragmentSource) -> (Bytes, Bytes) {
    let config = BtsConfig::default()
        .with_fragment_delay(Duration::ZERO)
        .with_fragment_source(source);
    let (peripheral, mut session) = open_session(
        PeripheralBuilder::default()
            .window(window)
            .fragment_source(source)
            .offer(data.clone()),
        config,
    )
    .await
    .expect("session opens");

    session.write(data).await.expect("write succeeds");
    let written = peripheral.received_blocks()[0].data.clone();
    let read = session.read().await.expect("read succeeds");
    (written, read)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn blocks_round_trip(
        data in proptest::collection::vec(any::<u8>(), 0..=10_000),
        window in 1_u16..=64,
        poll in any::<bool>(),
    ) {
        let source = if poll { FragmentSource::Poll } else { FragmentSource::Notification };
        let data = Bytes::from(data);
        let (written, read) = runtime().block_on(round_trip(data.clone(), window, source));
        prop_assert_eq!(written, data.clone());
        prop_assert_eq!(read, data);
    }
}

#[test]
fn boundary_sizes_round_trip() {
    let rt = runtime();
    for len in [0, 1, 19, 20, 21, 39, 40, 41, 320, 10_000] {
        let data: Bytes = (0..len).map(|i| (i % 256) as u8).collect();
        let (written, read) = rt.block_on(round_trip(data.clone(), u16::MAX, FragmentSource::Notification));
        assert_eq!(written, data, "write of {len} bytes");
        assert_eq!(read, data, "read of {len} bytes");
    }
}
