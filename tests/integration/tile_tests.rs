//! Tile upload through the session: reassembly, RLE, SD retry path and
//! the stop-and-wait acknowledgement.

use crate::mock_io::{FsOp, Rig};

use velonav::app::ports::OpenMode;
use velonav::link::Characteristic;
use velonav::link::reassembler::Phase;
use velonav::link::rle;
use velonav::link::tile::{TILE_ACK, TileHeader, encode_header};
use velonav::storage::index_record;

fn tile(compressed: bool, zoom: u8, x: u32, y: u32, payload: &[u8]) -> Vec<u8> {
    let mut msg = encode_header(&TileHeader {
        compressed,
        zoom,
        x,
        y,
        size: payload.len() as u32,
    })
    .to_vec();
    msg.extend_from_slice(payload);
    msg
}

fn acks(rig: &Rig) -> usize {
    rig.notifier.on(Characteristic::Tile).len()
}

#[test]
fn raw_tile_scenario_is_stored_byte_exact() {
    let mut rig = Rig::new();
    let mut msg = vec![0x00, 0x0F, 0, 0, 0, 5, 0, 0, 0, 9, 0, 0, 0x10, 0x00];
    msg.extend(std::iter::repeat_n(0xFF, 4096));

    rig.write_chunked(Characteristic::Tile, &msg, 244);

    assert_eq!(rig.fs.file("/tiles/15/5/9.bin"), Some(vec![0xFF; 4096]));
    assert_eq!(rig.notifier.on(Characteristic::Tile), vec![vec![TILE_ACK]]);
    assert_eq!(rig.session.rx_phase(Characteristic::Tile), Some(Phase::AwaitingHeader));
    assert_eq!(rig.session.stats().tiles_saved, 1);
}

#[test]
fn saved_tile_is_appended_to_index() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Tile, &tile(false, 12, 2048, 1361, &[1, 2, 3]));
    rig.write(Characteristic::Tile, &tile(false, 12, 2049, 1361, &[4]));

    let mut expected = index_record(12, 2048, 1361).to_vec();
    expected.extend_from_slice(&index_record(12, 2049, 1361));
    assert_eq!(rig.fs.file("/tiles/index.bin"), Some(expected));
}

#[test]
fn compressed_tile_is_decoded_before_write() {
    let mut rig = Rig::new();
    let bitmap: Vec<u8> = (0..8192).map(|i| if i < 4000 { 0x00 } else { 0xAA }).collect();
    let packed = rle::encode(&bitmap);
    assert!(packed.len() < bitmap.len());

    rig.write_chunked(Characteristic::Tile, &tile(true, 14, 8, 3, &packed), 180);

    assert_eq!(rig.fs.file("/tiles/14/8/3.bin"), Some(bitmap));
    assert_eq!(acks(&rig), 1);
}

#[test]
fn undecodable_tile_is_acked_but_not_written() {
    let mut rig = Rig::new();
    // Odd-length RLE stream: last pair is truncated.
    rig.write(Characteristic::Tile, &tile(true, 10, 1, 1, &[3, 0xAA, 7]));

    assert_eq!(rig.fs.file("/tiles/10/1/1.bin"), None);
    assert_eq!(rig.session.stats().decode_failures, 1);
    assert_eq!(acks(&rig), 1);
}

#[test]
fn two_tiles_in_one_write_are_both_handled() {
    let mut rig = Rig::new();
    let mut both = tile(false, 3, 1, 2, &[9; 10]);
    both.extend(tile(false, 3, 1, 3, &[8; 5]));

    rig.write(Characteristic::Tile, &both);

    assert_eq!(rig.fs.file("/tiles/3/1/2.bin"), Some(vec![9; 10]));
    assert_eq!(rig.fs.file("/tiles/3/1/3.bin"), Some(vec![8; 5]));
    assert_eq!(acks(&rig), 2);
}

#[test]
fn rejected_header_resets_silently() {
    let mut rig = Rig::new();
    // Zoom 21 is out of range.
    rig.write(Characteristic::Tile, &tile(false, 21, 0, 0, &[1, 2, 3]));

    assert_eq!(acks(&rig), 0);
    assert_eq!(rig.session.rx_phase(Characteristic::Tile), Some(Phase::AwaitingHeader));
    assert_eq!(rig.session.rx_stats().rejected, 1);
    assert_eq!(rig.fs.count(FsOp::Open(OpenMode::Write)), 0);

    // The next good tile goes through untouched.
    rig.write(Characteristic::Tile, &tile(false, 20, 0, 0, &[7]));
    assert_eq!(rig.fs.file("/tiles/20/0/0.bin"), Some(vec![7]));
}

#[test]
fn stray_bytes_before_header_are_dropped() {
    let mut rig = Rig::new();
    let mut msg = vec![0x7E, 0x42];
    msg.extend(tile(false, 1, 0, 1, &[5, 5]));
    rig.write(Characteristic::Tile, &msg);

    assert_eq!(rig.session.rx_stats().stray_bytes, 2);
    assert_eq!(rig.fs.file("/tiles/1/0/1.bin"), Some(vec![5, 5]));
}

#[test]
fn skip_mode_consumes_payload_and_acks_once() {
    let mut rig = Rig::without_memory();
    let msg = tile(false, 15, 5, 9, &[0xFF; 4096]);

    rig.write_chunked(Characteristic::Tile, &msg[..1000], 100);
    assert_eq!(rig.session.rx_phase(Characteristic::Tile), Some(Phase::Skipping));
    assert_eq!(acks(&rig), 0);

    rig.write_chunked(Characteristic::Tile, &msg[1000..], 100);
    assert_eq!(rig.session.rx_phase(Characteristic::Tile), Some(Phase::AwaitingHeader));
    assert_eq!(acks(&rig), 1);
    assert_eq!(rig.fs.file("/tiles/15/5/9.bin"), None);

    let rx = rig.session.rx_stats();
    assert_eq!(rx.skipped, 1);
    assert_eq!(rx.alloc_failures, 1);
}

#[test]
fn open_retries_then_creates_directory() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Tile, &tile(false, 9, 4, 4, &[1]));

    // Three attempts into the missing directory, mkdir, one final open.
    assert_eq!(rig.fs.count(FsOp::Mkdir), 1);
    assert_eq!(rig.delay.calls(), vec![20, 20]);
    assert_eq!(rig.fs.file("/tiles/9/4/4.bin"), Some(vec![1]));

    // Directory exists now: no mkdir, no back-off.
    rig.fs.clear_ops();
    rig.write(Characteristic::Tile, &tile(false, 9, 4, 5, &[2]));
    assert_eq!(rig.fs.count(FsOp::Mkdir), 0);
    assert_eq!(rig.delay.calls(), vec![20, 20]);
}

#[test]
fn transient_open_failure_recovers_without_mkdir() {
    let mut rig = Rig::new();
    rig.fs.put("/tiles/2/2/1.bin", b"old");
    rig.fs.clear_ops();
    rig.fs.state().fail_opens = 1;

    rig.write(Characteristic::Tile, &tile(false, 2, 2, 2, &[6, 6]));

    assert_eq!(rig.fs.file("/tiles/2/2/2.bin"), Some(vec![6, 6]));
    assert_eq!(rig.fs.count(FsOp::Mkdir), 0);
    assert_eq!(rig.delay.calls(), vec![20]);
}

#[test]
fn storage_failure_throttles_then_acks() {
    let mut rig = Rig::new();
    rig.fs.state().broken_path = Some("/tiles/5/5/5.bin".into());

    rig.write(Characteristic::Tile, &tile(false, 5, 5, 5, &[1, 2]));

    assert_eq!(rig.session.stats().storage_failures, 1);
    assert_eq!(rig.delay.calls().last(), Some(&200));
    assert_eq!(acks(&rig), 1);
    assert_eq!(rig.fs.open_handles(), 0);
}

#[test]
fn existing_tile_is_replaced() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Tile, &tile(false, 7, 1, 1, &[1, 1, 1, 1]));
    rig.write(Characteristic::Tile, &tile(false, 7, 1, 1, &[2]));

    assert_eq!(rig.fs.file("/tiles/7/1/1.bin"), Some(vec![2]));
    assert_eq!(rig.fs.count(FsOp::Remove), 2);
}

#[test]
fn index_failure_does_not_fail_save() {
    let mut rig = Rig::new();
    rig.fs.state().broken_path = Some("/tiles/index.bin".into());

    rig.write(Characteristic::Tile, &tile(false, 4, 0, 0, &[3]));

    assert_eq!(rig.fs.file("/tiles/4/0/0.bin"), Some(vec![3]));
    assert_eq!(rig.session.stats().tiles_saved, 1);
    assert_eq!(rig.session.stats().storage_failures, 0);
}
