//! Weather, radar, device status and phone notifications through the
//! session, including fragmentation and the legacy notification format.

use crate::mock_io::Rig;

use velonav::link::Characteristic;
use velonav::link::notification::{ACTION_ADD, ACTION_DISMISS, ADD_LEN, LEGACY_ADD_LEN};
use velonav::link::radar::{RADAR_LEN, TIMING_MAGIC};
use velonav::link::reassembler::Phase;
use velonav::link::status::STATUS_LEN;
use velonav::link::weather::WEATHER_LEN;

fn weather(location: &[u8], hourly: u8) -> Vec<u8> {
    let mut raw = vec![0u8; WEATHER_LEN];
    raw[65..65 + location.len()].copy_from_slice(location);
    raw[97..99].copy_from_slice(&21i16.to_be_bytes());
    raw[114] = hourly;
    raw
}

fn notification_body(id: u32, app: &[u8], icon: bool) -> Vec<u8> {
    let mut b = vec![0u8; ADD_LEN];
    b[0..4].copy_from_slice(&id.to_be_bytes());
    b[4..4 + app.len()].copy_from_slice(app);
    if icon {
        b[LEGACY_ADD_LEN] = 1;
        b[LEGACY_ADD_LEN + 1..].fill(0x55);
    }
    b
}

#[test]
fn weather_in_mtu_chunks_reaches_display() {
    let mut rig = Rig::new();
    rig.write_chunked(Characteristic::Weather, &weather(b"Bern", 9), 20);

    assert_eq!(rig.display.weather.len(), 1);
    let w = &rig.display.weather[0];
    assert_eq!(w.location.as_str(), "Bern");
    assert_eq!(w.current_temp, 21);
    assert_eq!(w.hourly.len(), 6, "hourly count is clamped");
    assert!(w.error.is_none());
}

#[test]
fn weather_error_flag_carries_message() {
    let mut rig = Rig::new();
    let mut raw = weather(b"", 0);
    raw[0] = 1;
    raw[1..13].copy_from_slice(b"API down 503");
    rig.write(Characteristic::Weather, &raw);

    assert_eq!(
        rig.display.weather[0].error.as_deref(),
        Some("API down 503")
    );
}

#[test]
fn radar_frame_with_timing_block() {
    let mut rig = Rig::new();
    let mut raw = vec![0u8; RADAR_LEN];
    raw[1] = 3;
    raw[2] = 5;
    raw[3] = 12;
    // 10:00 = 600 minutes, little-endian.
    raw[4..8].copy_from_slice(&[0x58, 0x02, TIMING_MAGIC, 5]);
    raw[68] = 0xF0;

    rig.write_chunked(Characteristic::Radar, &raw, 509);

    assert_eq!(rig.display.radar.len(), 1);
    let r = &rig.display.radar[0];
    assert_eq!(r.frame_minutes(), Some(615));
    assert_eq!(r.image.len(), RADAR_LEN - 68);
    assert_eq!(r.image[0], 0xF0);
}

#[test]
fn device_status_whole_write() {
    let mut rig = Rig::new();
    let raw: [u8; STATUS_LEN] = [55, 0, 0x65, 0x00, 0x00, 0x01, 0x00, 0x3C];
    rig.write(Characteristic::DeviceStatus, &raw);

    let s = rig.display.status[0];
    assert_eq!(s.phone_battery, Some(55));
    assert!(!s.charging);
    assert_eq!(s.utc_offset_minutes, 60);
}

#[test]
fn back_to_back_records_in_one_write() {
    let mut rig = Rig::new();
    let mut two = vec![10, 1, 0, 0, 0, 0, 0, 0];
    two.extend_from_slice(&[20, 0, 0, 0, 0, 0, 0, 0]);
    rig.write(Characteristic::DeviceStatus, &two);

    let batteries: Vec<_> = rig.display.status.iter().map(|s| s.phone_battery).collect();
    assert_eq!(batteries, vec![Some(10), Some(20)]);
}

#[test]
fn fixed_record_dropped_without_memory() {
    let mut rig = Rig::without_memory();
    rig.write_chunked(Characteristic::Weather, &weather(b"Chur", 0), 50);

    assert!(rig.display.weather.is_empty());
    assert_eq!(rig.session.rx_phase(Characteristic::Weather), Some(Phase::AwaitingHeader));
    assert_eq!(rig.session.rx_stats().skipped, 1);
}

#[test]
fn notification_add_with_icon_fragmented() {
    let mut rig = Rig::new();
    let mut msg = vec![ACTION_ADD];
    msg.extend(notification_body(7, b"Signal", true));

    rig.write_chunked(Characteristic::Notification, &msg, 100);

    assert_eq!(rig.notes.added.len(), 1);
    let n = &rig.notes.added[0];
    assert_eq!(n.id, 7);
    assert_eq!(n.app.as_str(), "Signal");
    assert_eq!(n.icon.as_ref().map(|i| i.len()), Some(195));
}

#[test]
fn legacy_add_in_single_write() {
    let mut rig = Rig::new();
    let mut msg = vec![ACTION_ADD];
    msg.extend_from_slice(&notification_body(9, b"Mail", false)[..LEGACY_ADD_LEN]);

    rig.write(Characteristic::Notification, &msg);

    assert_eq!(rig.notes.added.len(), 1);
    assert_eq!(rig.notes.added[0].id, 9);
    assert!(rig.notes.added[0].icon.is_none());
    assert!(rig.session.is_quiescent());
}

#[test]
fn full_write_at_mtu_232_is_a_chunk_not_a_legacy_add() {
    let mut rig = Rig::new();
    // 232 - 3 leaves exactly the legacy length per write.
    rig.session.on_mtu(232);
    let mut msg = vec![ACTION_ADD];
    msg.extend(notification_body(11, b"Maps", true));

    rig.write(Characteristic::Notification, &msg[..LEGACY_ADD_LEN + 1]);
    assert!(rig.notes.added.is_empty());
    rig.write(Characteristic::Notification, &msg[LEGACY_ADD_LEN + 1..]);

    assert_eq!(rig.notes.added.len(), 1);
    assert_eq!(rig.notes.added[0].id, 11);
    assert_eq!(rig.notes.added[0].icon.as_ref().map(|i| i.len()), Some(195));
}

#[test]
fn legacy_add_still_recognised_after_larger_mtu() {
    let mut rig = Rig::new();
    rig.session.on_mtu(247);
    let mut msg = vec![ACTION_ADD];
    msg.extend_from_slice(&notification_body(12, b"Chat", false)[..LEGACY_ADD_LEN]);

    rig.write(Characteristic::Notification, &msg);

    assert_eq!(rig.notes.added.len(), 1);
    assert!(rig.notes.added[0].icon.is_none());
}

#[test]
fn dismiss_by_id() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Notification, &[ACTION_DISMISS, 0, 0, 1, 0]);

    assert_eq!(rig.notes.dismissed, vec![256]);
}

#[test]
fn unknown_notification_action_is_stray() {
    let mut rig = Rig::new();
    rig.write(Characteristic::Notification, &[0x09]);

    assert!(rig.notes.added.is_empty());
    assert_eq!(rig.session.rx_stats().stray_bytes, 1);
}
