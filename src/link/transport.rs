//! Outbound notification port.
//!
//! Concrete implementations:
//! - Bluedroid GATT server on the device ([`crate::adapters::ble`])
//! - recording mocks in the integration tests
//!
//! The session and senders are written against [`Notifier`] only, so the
//! protocol core never touches the radio.

use crate::error::NotifyError;

use super::Characteristic;

/// Largest single notification payload (ATT MTU 515 minus headers).
pub const MAX_NOTIFY_LEN: usize = 512;

/// ATT MTU the device offers in the exchange.
pub const ATT_MAX_MTU: u16 = 517;

/// Opcode and handle in front of every ATT write value.
pub const ATT_WRITE_OVERHEAD: u16 = 3;

/// Sends one GATT notification to the connected phone.
pub trait Notifier {
    /// Queue `data` as a notification on `characteristic`.
    ///
    /// `Err(Congested)` is transient: the caller keeps the frame and
    /// tries again later.
    fn notify(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<(), NotifyError>;
}

/// Discards every notification. Used before the GATT server is up.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&mut self, _characteristic: Characteristic, data: &[u8]) -> Result<(), NotifyError> {
        if data.len() > MAX_NOTIFY_LEN {
            return Err(NotifyError::TooLarge);
        }
        Ok(())
    }
}
