//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements         | Connects to                 |
//! |------------|--------------------|-----------------------------|
//! | `ble`      | Notifier           | Bluedroid GATT server       |
//! |            | (LinkEvent source) | `LINK_CHANNEL`              |
//! | `sd_card`  | FileSystem         | FAT volume via ESP-IDF VFS  |
//! | `log_sink` | NavigationPort     | Serial log output           |
//! |            | NotificationPort   |                             |
//! |            | DisplayPort        |                             |
//! | `time`     | (uptime, DelayNs)  | ESP32 system timer          |

pub mod ble;
pub mod log_sink;
pub mod sd_card;
pub mod time;
