//! VeloNav firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleAdapter        SdCardFs       LogNavigation      Uptime    │
//! │  (Notifier +       (FileSystem)   LogNotifications             │
//! │   LINK_CHANNEL)                   LogDisplay                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              LinkSession (pure logic)                  │    │
//! │  │  Reassemblers · AssetStore · ChunkSenders              │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::spi::{SpiDriver, SpiDriverConfig};
use esp_idf_svc::io::vfs::MountedFatfs;
use esp_idf_svc::sd::spi::SdSpiHostDriver;
use esp_idf_svc::sd::{SdCardConfiguration, SdCardDriver};

use velonav::adapters::ble::BleAdapter;
use velonav::adapters::log_sink::{LogDisplay, LogNavigation, LogNotifications};
use velonav::adapters::sd_card::{MOUNT_POINT, SdCardFs};
use velonav::adapters::time::Uptime;
use velonav::config::LinkConfig;
use velonav::link::channels::{self, LINK_CHANNEL, LinkEvent};
use velonav::link::session::{Collaborators, LinkSession};
use velonav::pins;

/// Advertised GAP name.
const DEVICE_NAME: &str = "VeloNav";

/// Main loop period. Shorter than the fastest pacing interval.
const LOOP_PERIOD_MS: u32 = 10;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  VeloNav v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;

    // ── 2. Shared SPI bus + SD card ───────────────────────────
    // Park the e-paper chip select before the card sees any clock.
    let mut epd_cs = PinDriver::output(unsafe { AnyOutputPin::new(pins::EPD_CS_GPIO) })?;
    epd_cs.set_high()?;

    let spi = SpiDriver::new(
        peripherals.spi2,
        unsafe { AnyIOPin::new(pins::SPI_SCLK_GPIO) },
        unsafe { AnyIOPin::new(pins::SPI_MOSI_GPIO) },
        Some(unsafe { AnyIOPin::new(pins::SPI_MISO_GPIO) }),
        &SpiDriverConfig::default(),
    )?;
    let sd_driver = SdCardDriver::new_spi(
        SdSpiHostDriver::new(
            spi,
            Some(unsafe { AnyIOPin::new(pins::SD_CS_GPIO) }),
            AnyIOPin::none(),
            AnyIOPin::none(),
            AnyIOPin::none(),
            None,
        )?,
        &SdCardConfiguration::new(),
    )?;
    let _fatfs = MountedFatfs::mount(
        Fatfs::new_sdcard(0, sd_driver)?,
        MOUNT_POINT,
        pins::SD_MAX_OPEN_FILES,
    )?;
    info!("SD card mounted at {}", MOUNT_POINT);

    // ── 3. Config (SD override or defaults) ───────────────────
    let mut fs = SdCardFs::new(MOUNT_POINT);
    let config = LinkConfig::load(&mut fs);

    // ── 4. Adapters + session ─────────────────────────────────
    let mut name = heapless::String::<24>::new();
    if name.push_str(DEVICE_NAME).is_err() {
        warn!("device name truncated");
    }
    let mut ble = BleAdapter::new(name);
    ble.start();

    let mut navigation = LogNavigation::default();
    let mut notifications = LogNotifications::default();
    let mut display = LogDisplay;
    let uptime = Uptime::new();
    let mut session = LinkSession::new(fs, FreeRtos, config);

    info!("System ready. Entering link loop.");

    // ── 5. Link loop ──────────────────────────────────────────
    loop {
        channels::drain(&LINK_CHANNEL, |event| {
            match &event {
                LinkEvent::Connected => ble.on_central_connected(),
                LinkEvent::Disconnected => ble.on_central_disconnected(),
                LinkEvent::Write { .. } | LinkEvent::MtuChanged(_) | LinkEvent::Overrun(_) => {}
            }
            let mut io = Collaborators {
                notifier: &mut ble,
                navigation: &mut navigation,
                notifications: &mut notifications,
                display: &mut display,
            };
            session.handle(event, &mut io);
        });

        let mut io = Collaborators {
            notifier: &mut ble,
            navigation: &mut navigation,
            notifications: &mut notifications,
            display: &mut display,
        };
        session.tick(uptime.uptime_ms(), &mut io);

        FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
