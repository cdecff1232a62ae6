//! GPIO / peripheral pin assignments for the VeloNav main board.
//!
//! Single source of truth. The SD card and the e-paper panel share one
//! SPI bus; only the SD card side is driven from this crate.

// ---------------------------------------------------------------------------
// Shared SPI bus (SPI2 / FSPI)
// ---------------------------------------------------------------------------

pub const SPI_SCLK_GPIO: i32 = 12;
pub const SPI_MOSI_GPIO: i32 = 11;
pub const SPI_MISO_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// SD card (SPI mode)
// ---------------------------------------------------------------------------

/// Chip select, active LOW.
pub const SD_CS_GPIO: i32 = 10;

/// Open files the FAT VFS may hold at once (tile + index + recording pair).
pub const SD_MAX_OPEN_FILES: usize = 5;

// ---------------------------------------------------------------------------
// E-paper panel (same bus, separate chip select)
// ---------------------------------------------------------------------------

/// Held HIGH at boot so the panel never answers SD traffic.
pub const EPD_CS_GPIO: i32 = 9;
