use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

use super::interrupt_control::MiInterrupt;
use super::{Device, DeviceOutput, DmaRequest};

pub const PI_DRAM_ADDR: u32 = 0x00;
pub const PI_CART_ADDR: u32 = 0x04;
pub const PI_RD_LEN: u32 = 0x08;
pub const PI_WR_LEN: u32 = 0x0C;
pub const PI_STATUS: u32 = 0x10;

/// Size of the register window (status plus the two domain timing banks).
pub const PI_REGISTERS_LENGTH: u32 = 0x34;

/// Peripheral Interface: moves data between the cartridge bus and RDRAM.
///
/// Transfers complete synchronously inside the register write, so the busy
/// bits of `PI_STATUS` always read as clear.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PeripheralInterface {
    pub dram_address: u32,
    pub cart_address: u32,
    read_length: u32,
    write_length: u32,
    interrupt: bool,
    /// Domain 1/2 latency, pulse width, page size and release registers.
    domain_timing: [u32; 8],
}

impl PeripheralInterface {
    fn start_transfer(&mut self, length: u32, to_rdram: bool) -> DeviceOutput {
        let len = length.get_bits(0..=23) + 1;
        let request = if to_rdram {
            DmaRequest::CartToRdram {
                cart: self.cart_address,
                dram: self.dram_address,
                len,
            }
        } else {
            DmaRequest::RdramToCart {
                dram: self.dram_address,
                cart: self.cart_address,
                len,
            }
        };

        // The address registers point past the transfer once it is done.
        self.dram_address = self.dram_address.wrapping_add(len) & 0x00FF_FFFE;
        self.cart_address = self.cart_address.wrapping_add(len) & 0xFFFF_FFFE;
        self.interrupt = true;

        DeviceOutput {
            request_interrupt: Some(MiInterrupt::Pi),
            dma: Some(request),
            ..DeviceOutput::default()
        }
    }
}

impl Device for PeripheralInterface {
    fn read(&self, offset: u32) -> u32 {
        match offset {
            PI_DRAM_ADDR => self.dram_address,
            PI_CART_ADDR => self.cart_address,
            PI_RD_LEN => self.read_length,
            PI_WR_LEN => self.write_length,
            PI_STATUS => u32::from(self.interrupt) << 3,
            0x14..PI_REGISTERS_LENGTH => self.domain_timing[((offset - 0x14) / 4) as usize],
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> DeviceOutput {
        match offset {
            PI_DRAM_ADDR => self.dram_address = value & 0x00FF_FFFE,
            PI_CART_ADDR => self.cart_address = value & 0xFFFF_FFFE,
            PI_RD_LEN => {
                self.read_length = value;
                return self.start_transfer(value, false);
            }
            PI_WR_LEN => {
                self.write_length = value;
                return self.start_transfer(value, true);
            }
            PI_STATUS => {
                if value.get_bit(1) {
                    self.interrupt = false;
                    return DeviceOutput {
                        acknowledge_interrupt: Some(MiInterrupt::Pi),
                        ..DeviceOutput::default()
                    };
                }
            }
            0x14..PI_REGISTERS_LENGTH => {
                self.domain_timing[((offset - 0x14) / 4) as usize] = value & 0xFF;
            }
            _ => {}
        }

        DeviceOutput::default()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
