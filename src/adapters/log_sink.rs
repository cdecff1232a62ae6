//! Log-based collaborator adapter.
//!
//! [`LogNavigation`], [`LogNotifications`] and [`LogDisplay`] implement
//! the link's driven ports by writing what it delivered to the ESP-IDF
//! logger (UART / USB-CDC in production). Route maths and e-paper
//! rendering replace them on a full build; they keep just enough state
//! for the link to answer the phone correctly.

use log::info;

use crate::app::ports::{AssetName, DisplayPort, NavigationPort, NotificationPort};
use crate::link::notification::PhoneNotification;
use crate::link::radar::RadarFrame;
use crate::link::status::DeviceStatus;
use crate::link::weather::WeatherReport;

/// Matches the on-device notification list.
const MAX_NOTIFICATIONS: usize = 16;

/// Navigation stand-in: remembers which trip is active.
#[derive(Debug, Default)]
pub struct LogNavigation {
    active_trip: Option<AssetName>,
}

/// Notification list stand-in: remembers which ids are shown.
#[derive(Debug, Default)]
pub struct LogNotifications {
    shown: heapless::Vec<u32, MAX_NOTIFICATIONS>,
}

impl LogNotifications {
    /// Ids of notifications currently shown, oldest first.
    pub fn ids(&self) -> &[u32] {
        &self.shown
    }
}

#[derive(Debug, Default)]
pub struct LogDisplay;

impl NavigationPort for LogNavigation {
    fn load_route(&mut self, gpx: &[u8]) {
        info!("NAV | route loaded from memory ({} B)", gpx.len());
        self.active_trip = None;
    }

    fn start_trip(&mut self, name: &str) {
        info!("NAV | start trip '{}'", name);
        let mut owned = AssetName::new();
        self.active_trip = owned.push_str(name).ok().map(|()| owned);
    }

    fn stop(&mut self) {
        info!("NAV | stop");
        self.active_trip = None;
    }

    fn trip_stored(&mut self, name: &str) {
        info!("NAV | trip '{}' stored", name);
    }

    fn active_trip(&self) -> Option<&str> {
        self.active_trip.as_deref()
    }
}

impl NotificationPort for LogNotifications {
    fn add(&mut self, n: &PhoneNotification) {
        info!(
            "NOTIF | +{} [{}] {}: {} (icon={})",
            n.id,
            n.app,
            n.title,
            n.text,
            n.icon.is_some()
        );
        self.shown.retain(|&id| id != n.id);
        if self.shown.is_full() {
            self.shown.remove(0);
        }
        let _ = self.shown.push(n.id);
    }

    fn dismiss(&mut self, id: u32) {
        info!("NOTIF | -{}", id);
        self.shown.retain(|&i| i != id);
    }
}

impl DisplayPort for LogDisplay {
    fn show_weather(&mut self, w: &WeatherReport) {
        if let Some(err) = &w.error {
            info!("WEATHER | error: {}", err);
            return;
        }
        info!(
            "WEATHER | {} | {}° (feels {}°) | cond={} hum={}% | wind {}@{}° | {} hPa | \
             rain {}% | {} hourly",
            w.location,
            w.current_temp,
            w.feels_like,
            w.condition,
            w.humidity,
            w.wind_speed,
            w.wind_dir,
            w.pressure,
            w.precip_chance,
            w.hourly.len(),
        );
    }

    fn show_radar(&mut self, r: &RadarFrame) {
        if let Some(err) = &r.error {
            info!("RADAR | error: {}", err);
            return;
        }
        info!(
            "RADAR | frame {:+} of {} | step {} min | at {:?} min | {} B image",
            r.frame_offset,
            r.total_frames,
            r.step_minutes,
            r.frame_minutes(),
            r.image.len(),
        );
    }

    fn update_device_status(&mut self, s: &DeviceStatus) {
        info!(
            "STATUS | phone battery {:?}% charging={} | t={} utc{:+}min",
            s.phone_battery, s.charging, s.unix_time, s.utc_offset_minutes
        );
    }
}
