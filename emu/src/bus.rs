//! # Physical address space
//!
//! The bus owns every addressable region of the console and the device
//! registry behind the memory-mapped registers. Regions are kept sorted by
//! base address and resolved with a binary search:
//!
//! ```text
//! 0x0000_0000  RDRAM            RAM     (configurable, 8 MiB)
//! 0x0400_0000  SP DMEM/IMEM     RAM     8 KiB
//! 0x0430_0000  MI registers     device
//! 0x0440_0000  VI registers     device
//! 0x0460_0000  PI registers     device
//! 0x0480_0000  SI registers     device
//! 0x1000_0000  Cartridge ROM    ROM     (configurable window, 64 MiB)
//! 0x1FC0_07C0  PIF RAM          RAM     64 bytes
//! ```
//!
//! Accesses are big-endian. Reads outside every region return 0 (open bus)
//! and writes there are dropped. Device registers are word sized: narrower
//! accesses are carved out of, or shifted into, the containing word.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitwise::Bits;
use crate::config::EmuConfig;
use crate::cpu::hardware::controller::PIF_RAM_LENGTH;
use crate::cpu::hardware::interrupt_control::MI_MASK;
use crate::cpu::hardware::peripheral_interface::PI_REGISTERS_LENGTH;
use crate::cpu::hardware::serial_interface::SI_REGISTERS_LENGTH;
use crate::cpu::hardware::video_interface::VI_REGISTERS_LENGTH;
use crate::cpu::hardware::{DeviceId, DeviceRegistry, DmaRequest};

pub const RDRAM_BASE: u32 = 0x0000_0000;
pub const SP_MEMORY_BASE: u32 = 0x0400_0000;
pub const SP_MEMORY_LENGTH: u32 = 0x2000;
pub const MI_BASE: u32 = 0x0430_0000;
pub const VI_BASE: u32 = 0x0440_0000;
pub const PI_BASE: u32 = 0x0460_0000;
pub const SI_BASE: u32 = 0x0480_0000;
pub const CART_ROM_BASE: u32 = 0x1000_0000;
pub const PIF_RAM_BASE: u32 = 0x1FC0_07C0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("region {new:?} at 0x{base:08X} overlaps region {existing:?}")]
    RegionConflict {
        new: RegionId,
        existing: RegionId,
        base: u32,
    },
    #[error("region {0:?} has zero length")]
    EmptyRegion(RegionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionId {
    Rdram,
    SpMemory,
    Mi,
    Vi,
    Pi,
    Si,
    CartRom,
    PifRam,
}

#[derive(Debug)]
pub enum Backing {
    Ram(Vec<u8>),
    /// Image bytes; the region may be larger than the image, the rest reads as 0.
    Rom(Vec<u8>),
    Device(DeviceId),
}

#[derive(Debug)]
pub struct Region {
    pub id: RegionId,
    pub base: u32,
    pub length: u32,
    backing: Backing,
}

impl Region {
    const fn end(&self) -> u64 {
        self.base as u64 + self.length as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte = 1,
    HalfWord = 2,
    Word = 4,
    DoubleWord = 8,
}

impl AccessWidth {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    const fn align(self, address: u32) -> u32 {
        address & !(self.bytes() - 1)
    }
}

#[derive(Debug)]
pub struct Bus {
    regions: Vec<Region>,
    pub devices: DeviceRegistry,
}

impl Bus {
    /// Builds the console memory map for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the configured sizes make two regions overlap.
    pub fn new(config: &EmuConfig) -> Result<Self, BusError> {
        let mut bus = Self {
            regions: Vec::new(),
            devices: DeviceRegistry::new(config),
        };

        let rdram = config.rdram_size;
        bus.map_region(RegionId::Rdram, RDRAM_BASE, rdram, Backing::Ram(vec![0; rdram as usize]))?;
        bus.map_region(
            RegionId::SpMemory,
            SP_MEMORY_BASE,
            SP_MEMORY_LENGTH,
            Backing::Ram(vec![0; SP_MEMORY_LENGTH as usize]),
        )?;
        bus.map_region(RegionId::Mi, MI_BASE, MI_MASK + 4, Backing::Device(DeviceId::Mi))?;
        bus.map_region(RegionId::Vi, VI_BASE, VI_REGISTERS_LENGTH, Backing::Device(DeviceId::Vi))?;
        bus.map_region(RegionId::Pi, PI_BASE, PI_REGISTERS_LENGTH, Backing::Device(DeviceId::Pi))?;
        bus.map_region(RegionId::Si, SI_BASE, SI_REGISTERS_LENGTH, Backing::Device(DeviceId::Si))?;
        bus.map_region(
            RegionId::CartRom,
            CART_ROM_BASE,
            config.rom_window_size,
            Backing::Rom(Vec::new()),
        )?;
        bus.map_region(
            RegionId::PifRam,
            PIF_RAM_BASE,
            PIF_RAM_LENGTH as u32,
            Backing::Ram(vec![0; PIF_RAM_LENGTH]),
        )?;

        Ok(bus)
    }

    /// Inserts a region, keeping the table sorted.
    ///
    /// # Errors
    ///
    /// Fails with [`BusError::RegionConflict`] if the region overlaps an existing one.
    pub fn map_region(
        &mut self,
        id: RegionId,
        base: u32,
        length: u32,
        backing: Backing,
    ) -> Result<(), BusError> {
        if length == 0 {
            return Err(BusError::EmptyRegion(id));
        }

        let index = self.regions.partition_point(|region| region.base < base);
        let end = u64::from(base) + u64::from(length);

        let conflict = index
            .checked_sub(1)
            .map(|previous| &self.regions[previous])
            .filter(|previous| previous.end() > u64::from(base))
            .or_else(|| {
                self.regions
                    .get(index)
                    .filter(|next| u64::from(next.base) < end)
            });

        if let Some(existing) = conflict {
            return Err(BusError::RegionConflict {
                new: id,
                existing: existing.id,
                base,
            });
        }

        self.regions.insert(
            index,
            Region {
                id,
                base,
                length,
                backing,
            },
        );

        Ok(())
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn find(&self, address: u32) -> Option<usize> {
        let index = self.regions.partition_point(|region| region.base <= address);
        let candidate = index.checked_sub(1)?;

        (u64::from(address) < self.regions[candidate].end()).then_some(candidate)
    }

    fn region_index(&self, id: RegionId) -> Option<usize> {
        self.regions.iter().position(|region| region.id == id)
    }

    /// Reads `width` bytes at the physical `address`, masking the low bits.
    #[must_use]
    pub fn read(&self, address: u32, width: AccessWidth) -> u64 {
        let address = width.align(address);

        let Some(index) = self.find(address) else {
            tracing::trace!("open bus read at 0x{address:08X}");
            return 0;
        };

        let region = &self.regions[index];
        let offset = address - region.base;
        match &region.backing {
            Backing::Ram(bytes) | Backing::Rom(bytes) => read_be(bytes, offset, width),
            Backing::Device(device) => self.read_device(*device, offset, width),
        }
    }

    /// Writes the low `width` bytes of `value` at the physical `address`.
    pub fn write(&mut self, address: u32, width: AccessWidth, value: u64) {
        let address = width.align(address);

        let Some(index) = self.find(address) else {
            tracing::trace!("open bus write at 0x{address:08X}");
            return;
        };

        let region = &mut self.regions[index];
        let offset = address - region.base;
        match &mut region.backing {
            Backing::Ram(bytes) => write_be(bytes, offset, width, value),
            Backing::Rom(_) => tracing::trace!("write to ROM at 0x{address:08X} dropped"),
            Backing::Device(device) => {
                let device = *device;
                self.write_device(device, offset, width, value);
            }
        }
    }

    #[must_use]
    pub fn read_word(&self, address: u32) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let word = self.read(address, AccessWidth::Word) as u32;
        word
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        self.write(address, AccessWidth::Word, value.into());
    }

    fn read_device(&self, device: DeviceId, offset: u32, width: AccessWidth) -> u64 {
        let word_offset = offset & !3;
        let word = u64::from(self.devices.handle_read(device, word_offset));

        match width {
            AccessWidth::DoubleWord => {
                (word << 32) | u64::from(self.devices.handle_read(device, word_offset + 4))
            }
            AccessWidth::Word => word,
            AccessWidth::HalfWord | AccessWidth::Byte => {
                let shift = (4 - width.bytes() - (offset & 3)) * 8;
                (word >> shift) & ((1 << (width.bytes() * 8)) - 1)
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_device(&mut self, device: DeviceId, offset: u32, width: AccessWidth, value: u64) {
        let word_offset = offset & !3;

        let writes = match width {
            AccessWidth::DoubleWord => vec![
                (word_offset, (value >> 32) as u32),
                (word_offset + 4, value as u32),
            ],
            AccessWidth::Word => vec![(word_offset, value as u32)],
            AccessWidth::HalfWord | AccessWidth::Byte => {
                let shift = (4 - width.bytes() - (offset & 3)) * 8;
                let mask = (1 << (width.bytes() * 8)) - 1;
                vec![(word_offset, ((value & mask) as u32) << shift)]
            }
        };

        for (offset, word) in writes {
            if let Some(request) = self.devices.handle_write(device, offset, word) {
                self.run_dma(request);
            }
        }
    }

    /// Carries out a transfer requested by PI or SI.
    pub fn run_dma(&mut self, request: DmaRequest) {
        tracing::trace!("{request:?}");

        match request {
            DmaRequest::CartToRdram { cart, dram, len } => {
                let data: Vec<u8> = (0..len)
                    .map(|i| self.peek(cart.wrapping_add(i)))
                    .collect();
                self.poke_slice(RDRAM_BASE + dram, &data);
            }
            DmaRequest::RdramToCart { cart, .. } => {
                tracing::debug!("PI write to cartridge address 0x{cart:08X} ignored");
            }
            DmaRequest::PifToRdram { dram } => {
                let data = self.pif_ram();
                self.poke_slice(RDRAM_BASE + dram, &data);
            }
            DmaRequest::RdramToPif { dram } => {
                let mut data = [0; PIF_RAM_LENGTH];
                for (i, byte) in (0..).zip(data.iter_mut()) {
                    *byte = self.peek(RDRAM_BASE + dram + i);
                }

                self.devices.controller.process_joybus(&mut data);
                self.poke_slice(PIF_RAM_BASE, &data);
            }
        }
    }

    fn pif_ram(&self) -> [u8; PIF_RAM_LENGTH] {
        let mut data = [0; PIF_RAM_LENGTH];
        for (i, byte) in (0..).zip(data.iter_mut()) {
            *byte = self.peek(PIF_RAM_BASE + i);
        }
        data
    }

    /// Side-effect free byte read used by DMA; device registers read as 0.
    #[must_use]
    pub fn peek(&self, address: u32) -> u8 {
        self.find(address)
            .and_then(|index| {
                let region = &self.regions[index];
                match &region.backing {
                    Backing::Ram(bytes) | Backing::Rom(bytes) => {
                        bytes.get((address - region.base) as usize).copied()
                    }
                    Backing::Device(_) => None,
                }
            })
            .unwrap_or(0)
    }

    /// Byte write into RAM regions only.
    pub fn poke(&mut self, address: u32, value: u8) {
        if let Some(index) = self.find(address) {
            let region = &mut self.regions[index];
            if let Backing::Ram(bytes) = &mut region.backing {
                if let Some(slot) = bytes.get_mut((address - region.base) as usize) {
                    *slot = value;
                }
            }
        }
    }

    pub fn poke_slice(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in (0..).zip(data) {
            self.poke(address.wrapping_add(i), byte);
        }
    }

    /// Replaces the cartridge image. The caller checks it fits the window.
    pub fn load_rom(&mut self, image: Vec<u8>) {
        if let Some(index) = self.region_index(RegionId::CartRom) {
            self.regions[index].backing = Backing::Rom(image);
        }
    }

    #[must_use]
    pub fn rom(&self) -> &[u8] {
        self.region_index(RegionId::CartRom)
            .and_then(|index| match &self.regions[index].backing {
                Backing::Rom(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn region_length(&self, id: RegionId) -> Option<u32> {
        self.region_index(id).map(|index| self.regions[index].length)
    }

    /// Contents of a RAM region.
    #[must_use]
    pub fn ram(&self, id: RegionId) -> Option<&[u8]> {
        self.region_index(id)
            .and_then(|index| match &self.regions[index].backing {
                Backing::Ram(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
    }

    pub fn ram_mut(&mut self, id: RegionId) -> Option<&mut [u8]> {
        let index = self.region_index(id)?;
        match &mut self.regions[index].backing {
            Backing::Ram(bytes) => Some(bytes.as_mut_slice()),
            _ => None,
        }
    }

    /// Every RAM region, in address order.
    pub fn ram_regions(&self) -> impl Iterator<Item = (RegionId, &[u8])> {
        self.regions.iter().filter_map(|region| match &region.backing {
            Backing::Ram(bytes) => Some((region.id, bytes.as_slice())),
            _ => None,
        })
    }

    /// Clears RAM and resets the devices; the cartridge stays loaded.
    pub fn reset(&mut self) {
        for region in &mut self.regions {
            if let Backing::Ram(bytes) = &mut region.backing {
                bytes.fill(0);
            }
        }
        self.devices.reset();
    }
}

fn read_be(bytes: &[u8], offset: u32, width: AccessWidth) -> u64 {
    (offset..offset + width.bytes()).fold(0, |value, i| {
        (value << 8) | u64::from(bytes.get(i as usize).copied().unwrap_or(0))
    })
}

#[allow(clippy::cast_possible_truncation)]
fn write_be(bytes: &mut [u8], offset: u32, width: AccessWidth, value: u64) {
    for i in 0..width.bytes() {
        if let Some(slot) = bytes.get_mut((offset + i) as usize) {
            *slot = value.get_byte((width.bytes() - 1 - i) as u8);
        }
    }
}
