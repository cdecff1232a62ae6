//! Session lifecycle and control characteristics.

use crate::mock_io::Rig;

use velonav::link::Characteristic;
use velonav::link::channels::{self, LinkChannel, LinkEvent};
use velonav::link::control::{
    ACTIVE_TRIP, LIST_END, LIST_ENTRY, LIST_START, RECORDING_LIST, TRIP_READY, TRIP_START,
    TRIP_STOP,
};
use velonav::link::reassembler::Phase;
use velonav::link::session::{Collaborators, SessionFlags};
use velonav::link::tile::{TileHeader, encode_header};

fn tile_header(size: u32) -> Vec<u8> {
    tile_at(2, size)
}

fn tile_at(y: u32, size: u32) -> Vec<u8> {
    encode_header(&TileHeader {
        compressed: false,
        zoom: 10,
        x: 1,
        y,
        size,
    })
    .to_vec()
}

fn handle(rig: &mut Rig, event: LinkEvent) {
    let mut io = Collaborators {
        notifier: &mut rig.notifier,
        navigation: &mut rig.nav,
        notifications: &mut rig.notes,
        display: &mut rig.display,
    };
    rig.session.handle(event, &mut io);
}

fn named(action: u8, name: &str) -> Vec<u8> {
    [&[action, name.len() as u8][..], name.as_bytes()].concat()
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn disconnect_drops_partial_upload() {
    let mut rig = Rig::new();
    let mut msg = tile_header(1000);
    msg.extend_from_slice(&[0xAB; 300]);
    rig.write(Characteristic::Tile, &msg);
    assert_eq!(rig.session.rx_phase(Characteristic::Tile), Some(Phase::Accumulating));

    handle(&mut rig, LinkEvent::Disconnected);
    assert!(rig.session.is_quiescent());
    assert!(!rig.session.is_connected());

    handle(&mut rig, LinkEvent::Connected);
    let mut fresh = tile_header(2);
    fresh.extend_from_slice(&[5, 6]);
    rig.write(Characteristic::Tile, &fresh);

    assert_eq!(rig.fs.file("/tiles/10/1/2.bin"), Some(vec![5, 6]));
    assert_eq!(rig.notifier.on(Characteristic::Tile).len(), 1);
}

#[test]
fn connect_resets_stale_state() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Trip, &[0, 4, 0, 0]);
    rig.write(Characteristic::TripControl, &[TRIP_READY]);
    assert!(!rig.session.is_quiescent());

    handle(&mut rig, LinkEvent::Connected);

    assert!(rig.session.is_quiescent());
    assert_eq!(rig.session.flags(), &SessionFlags::default());
    assert_eq!(rig.session.stats().commands, 0);
}

#[test]
fn disconnect_mid_download_closes_files() {
    let mut rig = Rig::new();
    rig.fs.put("/recordings/long.gpx", &[1; 5000]);
    rig.fs.put("/recordings/long.json", b"{}");
    rig.write(Characteristic::RecordingControl, &named(0x02, "long"));
    rig.tick(0);
    rig.tick(20);
    assert_eq!(rig.fs.open_handles(), 2);

    handle(&mut rig, LinkEvent::Disconnected);

    assert!(!rig.session.recording().is_active());
    assert_eq!(rig.fs.open_handles(), 0);
    let frames = rig.notifier.sent.len();
    rig.tick(40);
    assert_eq!(rig.notifier.sent.len(), frames, "no traffic while disconnected");
}

#[test]
fn reset_is_idempotent() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Weather, &[0; 40]);
    rig.write(Characteristic::RecordingControl, &[RECORDING_LIST]);

    rig.session.reset();
    let flags = rig.session.flags().clone();
    let phases: Vec<_> = Characteristic::ALL.iter().map(|&c| rig.session.rx_phase(c)).collect();

    rig.session.reset();
    assert_eq!(rig.session.flags(), &flags);
    let again: Vec<_> = Characteristic::ALL.iter().map(|&c| rig.session.rx_phase(c)).collect();
    assert_eq!(phases, again);
    assert!(rig.session.is_quiescent());
}

#[test]
fn events_flow_through_the_channel() {
    static CHANNEL: LinkChannel = LinkChannel::new();
    let mut rig = Rig::new();
    handle(&mut rig, LinkEvent::Disconnected);

    assert!(channels::push(&CHANNEL, LinkEvent::Connected));
    assert!(channels::push_write(&CHANNEL, Characteristic::DeviceStatus, &[80, 1, 0, 0, 0, 0, 0, 0]));

    let mut events = Vec::new();
    let n = channels::drain(&CHANNEL, |e| events.push(e));
    assert_eq!(n, 2);
    for e in events {
        handle(&mut rig, e);
    }

    assert!(rig.session.is_connected());
    assert_eq!(rig.display.status[0].phone_battery, Some(80));
}

/// Push `msg` as 100-byte writes without draining in between.
fn flood(channel: &LinkChannel, msg: &[u8]) -> usize {
    msg.chunks(100)
        .filter(|c| !channels::push_write(channel, Characteristic::Tile, c))
        .count()
}

fn drain_into(rig: &mut Rig, channel: &LinkChannel) {
    let mut events = Vec::new();
    channels::drain(channel, |e| events.push(e));
    for e in events {
        handle(rig, e);
    }
}

#[test]
fn lost_writes_never_merge_two_tiles() {
    static CHANNEL: LinkChannel = LinkChannel::new();
    let mut rig = Rig::new();

    let mut a = tile_at(2, 4000);
    a.extend_from_slice(&[0x11; 4000]);
    assert!(flood(&CHANNEL, &a) > 0, "queue must overflow");
    drain_into(&mut rig, &CHANNEL);

    let mut b = tile_at(3, 4000);
    b.extend_from_slice(&[0xAA; 4000]);
    assert!(flood(&CHANNEL, &b) > 0);
    drain_into(&mut rig, &CHANNEL);

    assert_eq!(rig.fs.file("/tiles/10/1/2.bin"), None);
    assert_eq!(rig.fs.file("/tiles/10/1/3.bin"), None);
    assert_eq!(rig.session.stats().overruns, 2);
    assert!(rig.notifier.on(Characteristic::Tile).is_empty());
    assert_eq!(rig.session.rx_phase(Characteristic::Tile), Some(Phase::AwaitingHeader));

    // The link recovers once the queue has room.
    let mut c = tile_at(4, 2);
    c.extend_from_slice(&[7, 8]);
    assert_eq!(flood(&CHANNEL, &c), 0);
    drain_into(&mut rig, &CHANNEL);
    assert_eq!(rig.fs.file("/tiles/10/1/4.bin"), Some(vec![7, 8]));
    assert_eq!(rig.notifier.on(Characteristic::Tile).len(), 1);
}

#[test]
fn overrun_on_control_characteristic_is_counted() {
    let mut rig = Rig::new();
    handle(&mut rig, LinkEvent::Overrun(Characteristic::TripControl));
    assert_eq!(rig.session.stats().overruns, 1);
    assert!(rig.session.is_quiescent());
}

// ── Trip control ──────────────────────────────────────────────

#[test]
fn ready_announces_trips_and_active_trip() {
    let mut rig = Rig::new();
    rig.fs.put("/trips/b-route.gpx", b"<gpx/>");
    rig.fs.put("/trips/a-route.gpx", b"<gpx/>");
    rig.fs.put("/trips/a-route.json", b"{}");
    rig.nav.active = Some("a-route".into());

    rig.tick(0);
    assert!(rig.notifier.sent.is_empty(), "nothing before READY");

    rig.write(Characteristic::TripControl, &[TRIP_READY]);
    rig.tick(10);

    let frames = rig.notifier.on(Characteristic::TripControl);
    assert_eq!(
        frames,
        vec![
            vec![LIST_START, 0, 2],
            named(LIST_ENTRY, "a-route"),
            named(LIST_ENTRY, "b-route"),
            vec![LIST_END],
            named(ACTIVE_TRIP, "a-route"),
        ]
    );

    // Sent once per READY.
    rig.tick(20);
    assert_eq!(rig.notifier.on(Characteristic::TripControl).len(), 5);
}

#[test]
fn start_and_stop_drive_navigation() {
    let mut rig = Rig::new();
    rig.write(Characteristic::TripControl, &[TRIP_READY]);
    rig.tick(0);
    let before = rig.notifier.on(Characteristic::TripControl).len();

    rig.write(Characteristic::TripControl, &named(TRIP_START, "evening"));
    rig.tick(10);
    assert_eq!(rig.nav.started, vec!["evening".to_string()]);
    let frames = rig.notifier.on(Characteristic::TripControl);
    assert_eq!(frames[before..], [named(ACTIVE_TRIP, "evening")]);

    rig.write(Characteristic::TripControl, &[TRIP_STOP]);
    rig.tick(20);
    assert_eq!(rig.nav.stops, 1);
    let frames = rig.notifier.on(Characteristic::TripControl);
    assert_eq!(frames.last(), Some(&vec![ACTIVE_TRIP, 0]));
}

#[test]
fn refused_list_is_retried() {
    let mut rig = Rig::new();
    rig.fs.put("/trips/x.gpx", b"<gpx/>");
    rig.write(Characteristic::TripControl, &[TRIP_READY]);
    rig.notifier.refuse_next = 1;
    rig.tick(0);
    rig.tick(10);

    let frames = rig.notifier.on(Characteristic::TripControl);
    assert_eq!(frames.iter().filter(|f| f[0] == LIST_END).count(), 1);
    assert_eq!(frames.iter().filter(|f| f[0] == ACTIVE_TRIP).count(), 1);
}

#[test]
fn malformed_commands_are_counted() {
    let mut rig = Rig::new();
    rig.write(Characteristic::TripControl, &[0x7F]);
    rig.write(Characteristic::TripControl, &[TRIP_START, 10, b'a']);
    rig.write(Characteristic::RecordingControl, &named(0x02, "../x"));

    assert_eq!(rig.session.stats().bad_commands, 3);
    assert!(rig.nav.started.is_empty());
}

// ── Recording control ─────────────────────────────────────────

#[test]
fn recording_list_without_ready() {
    let mut rig = Rig::new();
    rig.fs.put("/recordings/2024-05-02.gpx", b"<gpx/>");
    rig.fs.put("/recordings/2024-05-02.json", b"{}");
    rig.fs.put("/recordings/notes.txt", b"");

    rig.write(Characteristic::RecordingControl, &[RECORDING_LIST]);
    rig.tick(0);

    assert_eq!(
        rig.notifier.on(Characteristic::RecordingControl),
        vec![
            vec![LIST_START, 0, 1],
            named(LIST_ENTRY, "2024-05-02"),
            vec![LIST_END],
        ]
    );
    assert!(rig.notifier.on(Characteristic::TripControl).is_empty());
}

#[test]
fn writes_to_notify_only_characteristics_are_ignored() {
    let mut rig = Rig::new();
    rig.write(Characteristic::TileInventory, &[1, 2, 3]);
    rig.write(Characteristic::RecordingTransfer, &[1]);

    assert!(rig.session.is_quiescent());
    assert!(rig.notifier.sent.is_empty());
}
