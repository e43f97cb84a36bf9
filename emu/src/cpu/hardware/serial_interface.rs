use serde::{Deserialize, Serialize};

use super::interrupt_control::MiInterrupt;
use super::{Device, DeviceOutput, DmaRequest};

pub const SI_DRAM_ADDR: u32 = 0x00;
pub const SI_PIF_ADDR_RD64B: u32 = 0x04;
pub const SI_PIF_ADDR_WR64B: u32 = 0x10;
pub const SI_STATUS: u32 = 0x18;

pub const SI_REGISTERS_LENGTH: u32 = 0x1C;

/// Serial Interface: 64 byte DMA between RDRAM and PIF RAM.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SerialInterface {
    pub dram_address: u32,
    interrupt: bool,
}

impl SerialInterface {
    fn transfer(&mut self, request: DmaRequest) -> DeviceOutput {
        self.interrupt = true;

        DeviceOutput {
            request_interrupt: Some(MiInterrupt::Si),
            dma: Some(request),
            ..DeviceOutput::default()
        }
    }
}

impl Device for SerialInterface {
    fn read(&self, offset: u32) -> u32 {
        match offset {
            SI_DRAM_ADDR => self.dram_address,
            SI_STATUS => u32::from(self.interrupt) << 12,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> DeviceOutput {
        match offset {
            SI_DRAM_ADDR => {
                self.dram_address = value & 0x00FF_FFF8;
                DeviceOutput::default()
            }
            SI_PIF_ADDR_RD64B => self.transfer(DmaRequest::PifToRdram {
                dram: self.dram_address,
            }),
            SI_PIF_ADDR_WR64B => self.transfer(DmaRequest::RdramToPif {
                dram: self.dram_address,
            }),
            SI_STATUS => {
                self.interrupt = false;
                DeviceOutput {
                    acknowledge_interrupt: Some(MiInterrupt::Si),
                    ..DeviceOutput::default()
                }
            }
            _ => DeviceOutput::default(),
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write64b_requests_rdram_to_pif() {
        let mut si = SerialInterface::default();
        si.write(SI_DRAM_ADDR, 0x0012_3450);

        let output = si.write(SI_PIF_ADDR_WR64B, 0x1FC0_07C0);

        assert_eq!(output.dma, Some(DmaRequest::RdramToPif { dram: 0x0012_3450 }));
        assert_eq!(output.request_interrupt, Some(MiInterrupt::Si));
        assert_eq!(si.read(SI_STATUS), 1 << 12);
    }

    #[test]
    fn any_status_write_clears_interrupt() {
        let mut si = SerialInterface::default();
        si.write(SI_PIF_ADDR_RD64B, 0x1FC0_07C0);

        let output = si.write(SI_STATUS, 0);

        assert_eq!(output.acknowledge_interrupt, Some(MiInterrupt::Si));
        assert_eq!(si.read(SI_STATUS), 0);
    }
}
