//! ESP32 time adapter.
//!
//! Monotonic milliseconds for link pacing, plus a [`DelayNs`] for the
//! storage retry back-off on hosts.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` (microsecond
//!   precision, monotonic). Delays use `esp_idf_hal::delay::FreeRtos`.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and
//!   `std::thread::sleep` for host-side simulation.

/// Monotonic clock since construction (host) or boot (device).
pub struct Uptime {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since start (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1_000
    }
}

/// Blocking delay backed by `std::thread::sleep`.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

#[cfg(not(target_os = "espidf"))]
impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
