//! State machine tests for both transfer directions.
//!
//! These run without any transport: packets are fed to the engines directly.

use std::num::NonZeroUsize;

use bytes::Bytes;
use rstest::{fixture, rstest};

use crate::{
    error::TransferError,
    packet::{FragmentIndex, Packet, PacketType},
    transfer::*,
};

#[fixture]
fn fragment_size() -> NonZeroUsize { NonZeroUsize::new(20).expect("non-zero") }

fn block(len: usize) -> Bytes { (0..len).map(|i| (i % 251) as u8).collect() }

fn request(start: u16, count: u16) -> Packet {
    Packet::WriteRequest {
        start: FragmentIndex::new(start),
        count,
    }
}

fn read_fragment(index: u16, last: bool, payload: &'static [u8]) -> Packet {
    Packet::ReadPayload {
        index: FragmentIndex::new(index),
        last,
        payload: Bytes::from_static(payload),
    }
}

fn drain(transfer: &mut WriteTransfer) -> Vec<Packet> { std::iter::from_fn(|| transfer.next_fragment()).collect() }

#[rstest]
fn write_of_45_bytes_sends_three_fragments(fragment_size: NonZeroUsize) {
    let data = block(45);
    let mut transfer = WriteTransfer::new(data.clone(), 0, fragment_size).expect("block fits");
    assert_eq!(transfer.fragment_count(), 3);
    assert_eq!(
        transfer.start(),
        Packet::WriteSetup {
            length: 45,
            offset: 0,
            fragment_count: 3
        }
    );
    assert_eq!(transfer.state(), WriteState::SetupSent);

    transfer.on_request(request(0, 3)).expect("grant accepted");
    let fragments = drain(&mut transfer);

    let kinds: Vec<_> = fragments.iter().map(Packet::packet_type).collect();
    assert_eq!(
        kinds,
        vec![
            PacketType::WritePayloadMore,
            PacketType::WritePayloadMore,
            PacketType::WritePayloadLast
        ]
    );
    let mut reassembled = Vec::new();
    for fragment in fragments {
        let Packet::WritePayload { payload, .. } = fragment else {
            panic!("expected payload fragment");
        };
        reassembled.extend_from_slice(&payload);
    }
    assert_eq!(reassembled, data);
    assert!(transfer.is_done());
}

#[rstest]
fn write_returns_to_awaiting_request_when_window_is_exhausted(fragment_size: NonZeroUsize) {
    let mut transfer = WriteTransfer::new(block(100), 0, fragment_size).expect("block fits");
    transfer.start();

    transfer.on_request(request(0, 2)).expect("first grant");
    assert_eq!(drain(&mut transfer).len(), 2);
    assert_eq!(transfer.state(), WriteState::AwaitingRequest);

    transfer.on_request(request(2, 2)).expect("second grant");
    assert_eq!(drain(&mut transfer).len(), 2);
    assert_eq!(transfer.state(), WriteState::AwaitingRequest);

    transfer.on_request(request(4, 2)).expect("third grant");
    let tail = drain(&mut transfer);
    assert_eq!(tail.len(), 1, "window is cut short by the last fragment");
    assert_eq!(tail[0].packet_type(), PacketType::WritePayloadLast);
    assert!(transfer.is_done());
}

#[rstest]
fn peer_may_re_request_an_earlier_window(fragment_size: NonZeroUsize) {
    let mut transfer = WriteTransfer::new(block(60), 0, fragment_size).expect("block fits");
    transfer.start();
    transfer.on_request(request(0, 2)).expect("first grant");
    drain(&mut transfer);

    transfer.on_request(request(1, 2)).expect("repeat grant");
    let indices: Vec<_> = drain(&mut transfer)
        .into_iter()
        .map(|packet| match packet {
            Packet::WritePayload { index, .. } => index.get(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(indices, vec![1, 2]);
    assert!(transfer.is_done());
}

#[rstest]
fn empty_block_is_written_directly(fragment_size: NonZeroUsize) {
    let mut transfer = WriteTransfer::new(Bytes::new(), 0, fragment_size).expect("block fits");
    assert_eq!(
        transfer.start(),
        Packet::WriteDirect {
            payload: Bytes::new()
        }
    );
    assert!(transfer.is_done());
    assert!(transfer.next_fragment().is_none());
}

#[rstest]
#[case::notify(Packet::Notify { payload: Bytes::new() })]
#[case::read_setup(Packet::ReadSetup { fragment_count: 1, length: 1 })]
#[case::write_payload(Packet::WritePayload {
    index: FragmentIndex::zero(),
    last: true,
    payload: Bytes::new(),
})]
fn write_rejects_non_request_notifications(fragment_size: NonZeroUsize, #[case] packet: Packet) {
    let mut transfer = WriteTransfer::new(block(30), 0, fragment_size).expect("block fits");
    transfer.start();
    let found = packet.packet_type();
    let err = transfer.on_request(packet).expect_err("must be rejected");
    assert!(matches!(
        err,
        TransferError::UnexpectedPacket { found: f, .. } if f == found
    ));
}

#[rstest]
#[case::past_end(2, 1)]
#[case::empty_window(0, 0)]
fn write_rejects_invalid_windows(
    fragment_size: NonZeroUsize,
    #[case] start: u16,
    #[case] count: u16,
) {
    let mut transfer = WriteTransfer::new(block(30), 0, fragment_size).expect("block fits");
    transfer.start();
    let err = transfer
        .on_request(request(start, count))
        .expect_err("window must be rejected");
    assert!(matches!(err, TransferError::FragmentOutOfRange { .. }));
}

#[rstest]
fn write_rejects_request_before_setup(fragment_size: NonZeroUsize) {
    let mut transfer = WriteTransfer::new(block(30), 0, fragment_size).expect("block fits");
    let err = transfer
        .on_request(request(0, 1))
        .expect_err("no grant expected before setup");
    assert!(matches!(err, TransferError::UnexpectedPacket { .. }));
}

#[test]
fn write_rejects_blocks_beyond_the_counter_range() {
    let one = NonZeroUsize::new(1).expect("non-zero");
    let err = WriteTransfer::new(block(0x1_0000), 0, one).expect_err("too many fragments");
    assert!(matches!(
        err,
        TransferError::BlockTooLarge {
            len: 0x1_0000,
            limit: 0xFFFF
        }
    ));
}

#[rstest]
fn write_rejects_offsets_beyond_24_bits(fragment_size: NonZeroUsize) {
    let err = WriteTransfer::new(block(4), 0x0100_0000, fragment_size).expect_err("offset too large");
    assert!(matches!(err, TransferError::BlockTooLarge { .. }));
}

#[test]
fn read_direct_completes_without_request() {
    let mut transfer = ReadTransfer::new();
    let step = transfer
        .on_initial(Packet::ReadDirect {
            payload: Bytes::from_static(b"abc"),
        })
        .expect("direct accepted");
    assert_eq!(step, ReadStep::Complete(Bytes::from_static(b"abc")));
    assert_eq!(transfer.state(), ReadState::Done);
}

#[test]
fn read_setup_requests_every_fragment() {
    let mut transfer = ReadTransfer::new();
    let step = transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 3,
            length: 45,
        })
        .expect("setup accepted");
    assert_eq!(
        step,
        ReadStep::Request(Packet::ReadRequest {
            start: FragmentIndex::zero(),
            count: 3
        })
    );
    assert_eq!(
        transfer.state(),
        ReadState::Receiving { fragment_count: 3 }
    );
}

#[test]
fn read_setup_with_zero_fragments_is_empty() {
    let mut transfer = ReadTransfer::new();
    let step = transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 0,
            length: 0,
        })
        .expect("setup accepted");
    assert_eq!(step, ReadStep::Complete(Bytes::new()));
}

#[test]
fn read_rejects_unexpected_initial_value() {
    let mut transfer = ReadTransfer::new();
    let err = transfer
        .on_initial(read_fragment(0, true, b"x"))
        .expect_err("payload before setup");
    assert!(matches!(
        err,
        TransferError::UnexpectedPacket {
            found: PacketType::ReadPayloadLast,
            ..
        }
    ));
}

#[test]
fn read_reassembles_fragments_in_index_order() {
    let mut transfer = ReadTransfer::new();
    transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 3,
            length: 9,
        })
        .expect("setup accepted");

    assert_eq!(
        transfer.on_fragment(read_fragment(1, false, b"def")).expect("fragment 1"),
        FragmentStatus::Incomplete
    );
    assert_eq!(
        transfer.on_fragment(read_fragment(0, false, b"abc")).expect("fragment 0"),
        FragmentStatus::Incomplete
    );
    assert_eq!(
        transfer.on_fragment(read_fragment(2, true, b"ghi")).expect("fragment 2"),
        FragmentStatus::Complete
    );
    assert_eq!(transfer.finish().expect("complete"), Bytes::from_static(b"abcdefghi"));
}

#[test]
fn read_reports_missing_fragments() {
    let mut transfer = ReadTransfer::new();
    transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 3,
            length: 9,
        })
        .expect("setup accepted");
    transfer.on_fragment(read_fragment(0, false, b"abc")).expect("fragment 0");
    transfer.on_fragment(read_fragment(2, true, b"ghi")).expect("fragment 2");

    let err = transfer.finish().expect_err("fragment 1 is missing");
    assert!(matches!(
        err,
        TransferError::IncompleteTransfer {
            missing: 1,
            total: 3
        }
    ));
}

#[test]
fn read_rejects_fragment_index_past_count() {
    let mut transfer = ReadTransfer::new();
    transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 2,
            length: 4,
        })
        .expect("setup accepted");
    let err = transfer
        .on_fragment(read_fragment(2, true, b"zz"))
        .expect_err("index out of range");
    assert!(matches!(
        err,
        TransferError::FragmentOutOfRange { count: 2, .. }
    ));
}

#[test]
fn read_rejects_write_direction_packets_while_receiving() {
    let mut transfer = ReadTransfer::new();
    transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 2,
            length: 4,
        })
        .expect("setup accepted");
    let err = transfer
        .on_fragment(request(0, 1))
        .expect_err("write request is not a read fragment");
    assert!(matches!(
        err,
        TransferError::UnexpectedPacket {
            found: PacketType::WriteRequest,
            ..
        }
    ));
}

#[test]
fn end_of_transfer_uses_sentinel_index() {
    assert_eq!(
        ReadTransfer::end_of_transfer(),
        Packet::ReadRequest {
            start: FragmentIndex::new(0xFFFF),
            count: 1
        }
    );
}

#[test]
fn fragment_table_replaces_duplicates() {
    let mut table = FragmentTable::new(2);
    table
        .insert(FragmentIndex::zero(), Bytes::from_static(b"old"))
        .expect("slot 0");
    table
        .insert(FragmentIndex::zero(), Bytes::from_static(b"new"))
        .expect("slot 0 again");
    assert_eq!(table.missing(), 1);
    table
        .insert(FragmentIndex::new(1), Bytes::from_static(b"!"))
        .expect("slot 1");
    assert_eq!(table.assemble().expect("full"), Bytes::from_static(b"new!"));
}

#[test]
fn final_fragment_of_a_full_counter_range_is_last() {
    let mut transfer =
        WriteTransfer::new(block(write::MAX_FRAGMENT_COUNT), 0, NonZeroUsize::MIN).expect("block fits");
    assert_eq!(transfer.fragment_count(), u16::MAX);
    transfer.start();
    transfer
        .on_request(request(u16::MAX - 2, 2))
        .expect("grant accepted");

    let tail: Vec<_> = drain(&mut transfer)
        .into_iter()
        .map(|packet| match packet {
            Packet::WritePayload { index, last, .. } => (index.get(), last),
            other => panic!("unexpected {other:?}"),
        })
        .collect();

    assert_eq!(tail, vec![(u16::MAX - 2, false), (u16::MAX - 1, true)]);
    assert!(transfer.is_done());
}

#[test]
fn repeated_fragments_do_not_count_as_progress() {
    let mut transfer = ReadTransfer::new();
    transfer
        .on_initial(Packet::ReadSetup {
            fragment_count: 2,
            length: 6,
        })
        .expect("setup accepted");

    for _ in 0..3 {
        transfer
            .on_fragment(read_fragment(0, false, b"abc"))
            .expect("fragment filed");
    }

    assert_eq!(transfer.fragments_received(), 1);
}
