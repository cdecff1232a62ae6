//! Application boundary.
//!
//! The link engine talks to storage and to the rest of the device only
//! through the **port traits** defined in [`ports`], keeping the protocol
//! core fully testable without an SD card, a display or a radio.

pub mod ports;
