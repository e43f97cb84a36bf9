//! # Controller and joybus
//!
//! The PIF talks to the controller ports through a 64 byte command block in
//! PIF RAM. Each channel entry is laid out as:
//!
//! ```text
//! [tx length][rx length][tx bytes ...][rx bytes ...]
//! ```
//!
//! A `0x00` byte skips a channel, `0xFF` is padding and `0xFE` ends the block.
//! The last byte of PIF RAM is the control byte, cleared once the block has
//! been processed.

use serde::{Deserialize, Serialize};

/// Size of the PIF RAM command block.
pub const PIF_RAM_LENGTH: usize = 0x40;

const JOYBUS_INFO: u8 = 0x00;
const JOYBUS_READ_BUTTONS: u8 = 0x01;
const JOYBUS_RESET: u8 = 0xFF;

/// Standard controller, no accessory in the pak slot.
const CONTROLLER_INFO: [u8; 3] = [0x05, 0x00, 0x02];

/// Set in the rx length byte when nothing answers on a channel.
const NO_DEVICE: u8 = 0x80;

/// Host input bits accepted by `set_input_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostButton {
    A = 1 << 0,
    B = 1 << 1,
    Start = 1 << 2,
    Z = 1 << 3,
    DUp = 1 << 4,
    DDown = 1 << 5,
    DLeft = 1 << 6,
    DRight = 1 << 7,
    L = 1 << 8,
    R = 1 << 9,
    CUp = 1 << 10,
    CDown = 1 << 11,
    CLeft = 1 << 12,
    CRight = 1 << 13,
}

impl HostButton {
    /// Bit of the same button in the joybus button word.
    #[must_use]
    pub const fn joybus_bit(self) -> u16 {
        match self {
            Self::A => 0x8000,
            Self::B => 0x4000,
            Self::Z => 0x2000,
            Self::Start => 0x1000,
            Self::DUp => 0x0800,
            Self::DDown => 0x0400,
            Self::DLeft => 0x0200,
            Self::DRight => 0x0100,
            Self::L => 0x0020,
            Self::R => 0x0010,
            Self::CUp => 0x0008,
            Self::CDown => 0x0004,
            Self::CLeft => 0x0002,
            Self::CRight => 0x0001,
        }
    }
}

const ALL_BUTTONS: [HostButton; 14] = [
    HostButton::A,
    HostButton::B,
    HostButton::Start,
    HostButton::Z,
    HostButton::DUp,
    HostButton::DDown,
    HostButton::DLeft,
    HostButton::DRight,
    HostButton::L,
    HostButton::R,
    HostButton::CUp,
    HostButton::CDown,
    HostButton::CLeft,
    HostButton::CRight,
];

/// Controller plugged into port 1.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Controller {
    /// Button word as reported over joybus (active high).
    pub buttons: u16,
    pub stick_x: i8,
    pub stick_y: i8,
}

impl Controller {
    /// Converts the host mask into the joybus button word.
    pub fn set_input_state(&mut self, mask: u16) {
        self.buttons = ALL_BUTTONS
            .iter()
            .filter(|&&button| mask & button as u16 != 0)
            .fold(0, |word, button| word | button.joybus_bit());
    }

    /// Runs the command block stored in PIF RAM, writing the responses in place.
    pub fn process_joybus(&self, ram: &mut [u8; PIF_RAM_LENGTH]) {
        let mut index = 0;
        let mut channel = 0;

        while index < PIF_RAM_LENGTH - 1 {
            match ram[index] {
                0xFE => break,
                0xFF => {
                    index += 1;
                    continue;
                }
                0x00 => {
                    index += 1;
                    channel += 1;
                    continue;
                }
                _ => {}
            }

            let tx_length = usize::from(ram[index] & 0x3F);
            let rx_length = usize::from(ram[index + 1] & 0x3F);
            let tx_start = index + 2;
            let rx_start = tx_start + tx_length;
            let end = rx_start + rx_length;
            if end > PIF_RAM_LENGTH - 1 {
                tracing::debug!("joybus block overruns PIF RAM at channel {channel}");
                break;
            }

            let answered = channel == 0
                && tx_length > 0
                && self.respond(ram[tx_start], &mut ram[rx_start..end]);
            if !answered {
                ram[index + 1] |= NO_DEVICE;
            }

            index = end;
            channel += 1;
        }

        ram[PIF_RAM_LENGTH - 1] = 0;
    }

    fn respond(&self, command: u8, rx: &mut [u8]) -> bool {
        let [hi, lo] = self.buttons.to_be_bytes();
        #[allow(clippy::cast_sign_loss)]
        let response = match command {
            JOYBUS_INFO | JOYBUS_RESET => CONTROLLER_INFO.to_vec(),
            JOYBUS_READ_BUTTONS => vec![hi, lo, self.stick_x as u8, self.stick_y as u8],
            _ => {
                tracing::debug!("unsupported joybus command 0x{command:02X}");
                return false;
            }
        };

        for (slot, byte) in rx.iter_mut().zip(response) {
            *slot = byte;
        }

        true
    }
}
