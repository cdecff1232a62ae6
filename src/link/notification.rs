//! Phone notification mirror.
//!
//! One action byte, then a fixed body:
//!
//! | action | body |
//! |---|---|
//! | `0x01` add | `id(4) appName[32] title[64] text[128] hasIcon(1) icon[195]` |
//! | `0x02` dismiss | `id(4)` |
//!
//! Phone builds before icon support send add without `hasIcon`/`icon`
//! (228-byte body). Those always arrive as one 229-byte write, which is
//! how they are told apart from the first chunk of a current-format add.
//! That only holds while 229 bytes is less than a full write: at an ATT
//! MTU of 232 the first chunk of a current add is also 229 bytes, so the
//! session treats a write that fills the MTU as a chunk, never as a
//! legacy add.

use crate::error::FrameError;

use super::reassembler::{FrameSpec, Limits};
use super::wire::{be_u32, fixed_str};

pub const ACTION_ADD: u8 = 0x01;
pub const ACTION_DISMISS: u8 = 0x02;

/// 40×39 pixels, 1 bit per pixel, rows padded to whole bytes.
pub const ICON_LEN: usize = 195;

const TEXT_LEN: usize = 4 + 32 + 64 + 128;
pub const ADD_LEN: usize = TEXT_LEN + 1 + ICON_LEN;
pub const LEGACY_ADD_LEN: usize = TEXT_LEN;
pub const DISMISS_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNotification {
    pub id: u32,
    pub app: heapless::String<32>,
    pub title: heapless::String<64>,
    pub text: heapless::String<128>,
    pub icon: Option<heapless::Vec<u8, ICON_LEN>>,
}

impl PhoneNotification {
    /// Parse an add body in either wire format.
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() != ADD_LEN && body.len() != LEGACY_ADD_LEN {
            return None;
        }
        let icon = if body.len() == ADD_LEN && body[TEXT_LEN] != 0 {
            heapless::Vec::from_slice(&body[TEXT_LEN + 1..]).ok()
        } else {
            None
        };
        Some(Self {
            id: be_u32(body, 0),
            app: fixed_str(&body[4..36]),
            title: fixed_str(&body[36..100]),
            text: fixed_str(&body[100..228]),
            icon,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Add,
    Dismiss,
}

pub struct NotificationFrame;

impl FrameSpec for NotificationFrame {
    type Header = NotificationAction;
    const NAME: &'static str = "notification";
    const HEADER_LEN: usize = 1;

    fn precheck(first: u8) -> bool {
        first == ACTION_ADD || first == ACTION_DISMISS
    }

    fn parse_header(raw: &[u8], _limits: &Limits) -> Result<(NotificationAction, usize), FrameError> {
        match raw[0] {
            ACTION_ADD => Ok((NotificationAction::Add, ADD_LEN)),
            ACTION_DISMISS => Ok((NotificationAction::Dismiss, DISMISS_LEN)),
            other => Err(FrameError::UnknownAction(other)),
        }
    }
}

/// Recognise a legacy add that arrived whole in one write.
pub fn parse_legacy_write(write: &[u8]) -> Option<PhoneNotification> {
    match write.split_first() {
        Some((&ACTION_ADD, body)) if body.len() == LEGACY_ADD_LEN => PhoneNotification::parse(body),
        _ => None,
    }
}
