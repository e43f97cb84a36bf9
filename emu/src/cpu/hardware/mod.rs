//! Memory-mapped RCP devices and the registry that owns them.
//!
//! Devices never touch memory or each other directly. A register write
//! returns a [`DeviceOutput`] describing its side effects, which the
//! registry applies to the MIPS Interface and hands DMA requests back to
//! the bus.

pub mod controller;
pub mod interrupt_control;
pub mod peripheral_interface;
pub mod serial_interface;
pub mod timers;
pub mod video_interface;

use serde::{Deserialize, Serialize};

use crate::config::EmuConfig;

use controller::Controller;
use interrupt_control::{InterruptControl, MiInterrupt};
use peripheral_interface::PeripheralInterface;
use serial_interface::SerialInterface;
use timers::Timer;
use video_interface::VideoInterface;

/// Cause.IP2, wired to the MIPS Interface.
pub const CAUSE_IP_RCP: u32 = 1 << 10;
/// Cause.IP7, wired to the Count/Compare timer.
pub const CAUSE_IP_TIMER: u32 = 1 << 15;

pub trait Device {
    /// Reads the word register at `offset` from the device base.
    fn read(&self, offset: u32) -> u32;

    fn write(&mut self, offset: u32, value: u32) -> DeviceOutput;

    fn reset(&mut self);
}

/// Side effects of a device register access.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOutput {
    pub request_interrupt: Option<MiInterrupt>,
    pub acknowledge_interrupt: Option<MiInterrupt>,
    pub dma: Option<DmaRequest>,
}

/// Transfer the bus has to carry out on behalf of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaRequest {
    CartToRdram { cart: u32, dram: u32, len: u32 },
    RdramToCart { dram: u32, cart: u32, len: u32 },
    PifToRdram { dram: u32 },
    RdramToPif { dram: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceId {
    Mi,
    Vi,
    Pi,
    Si,
    /// COP0 Count/Compare, reached through MFC0/MTC0 rather than the bus.
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    Timer,
    /// Lowest numbered unmasked MI source.
    Rcp(MiInterrupt),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistry {
    pub mi: InterruptControl,
    pub vi: VideoInterface,
    pub pi: PeripheralInterface,
    pub si: SerialInterface,
    pub timer: Timer,
    pub controller: Controller,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(config: &EmuConfig) -> Self {
        Self {
            mi: InterruptControl::default(),
            vi: VideoInterface::new(config.cycles_per_frame(), config.vi_interrupt_line),
            pi: PeripheralInterface::default(),
            si: SerialInterface::default(),
            timer: Timer::default(),
            controller: Controller::default(),
        }
    }

    /// Advances the periodic devices by `elapsed` CPU cycles.
    pub fn tick(&mut self, elapsed: u64) {
        self.timer.tick(elapsed);

        let output = self.vi.tick(elapsed);
        self.apply(output);
    }

    #[must_use]
    pub fn handle_read(&self, device: DeviceId, offset: u32) -> u32 {
        match device {
            DeviceId::Mi => self.mi.read(offset),
            DeviceId::Vi => self.vi.read(offset),
            DeviceId::Pi => self.pi.read(offset),
            DeviceId::Si => self.si.read(offset),
            DeviceId::Timer => self.timer.read(offset),
        }
    }

    /// Writes a device register, returning the DMA the bus has to perform.
    pub fn handle_write(
        &mut self,
        device: DeviceId,
        offset: u32,
        value: u32,
    ) -> Option<DmaRequest> {
        let output = match device {
            DeviceId::Mi => self.mi.write(offset, value),
            DeviceId::Vi => self.vi.write(offset, value),
            DeviceId::Pi => self.pi.write(offset, value),
            DeviceId::Si => self.si.write(offset, value),
            DeviceId::Timer => self.timer.write(offset, value),
        };

        self.apply(output);
        output.dma
    }

    fn apply(&mut self, output: DeviceOutput) {
        if let Some(interrupt) = output.acknowledge_interrupt {
            self.mi.acknowledge(interrupt);
        }
        if let Some(interrupt) = output.request_interrupt {
            tracing::trace!("{interrupt:?} interrupt requested");
            self.mi.raise(interrupt);
        }
    }

    /// The interrupt the CPU would take next, timer first.
    #[must_use]
    pub fn pending_interrupt(&self) -> Option<InterruptKind> {
        if self.timer.is_interrupt_pending() {
            return Some(InterruptKind::Timer);
        }

        let pending = self.mi.interrupt_request & self.mi.interrupt_mask & 0x3F;
        [
            MiInterrupt::Sp,
            MiInterrupt::Si,
            MiInterrupt::Ai,
            MiInterrupt::Vi,
            MiInterrupt::Pi,
            MiInterrupt::Dp,
        ]
        .into_iter()
        .find(|&interrupt| pending & (1 << interrupt as u32) != 0)
        .map(InterruptKind::Rcp)
    }

    /// Cause.IP bits currently asserted by the devices.
    #[must_use]
    pub const fn interrupt_lines(&self) -> u32 {
        let mut lines = 0;
        if self.mi.is_interrupt_pending() {
            lines |= CAUSE_IP_RCP;
        }
        if self.timer.is_interrupt_pending() {
            lines |= CAUSE_IP_TIMER;
        }
        lines
    }

    /// Resets every device. Host input is kept.
    pub fn reset(&mut self) {
        for device in [
            DeviceId::Mi,
            DeviceId::Vi,
            DeviceId::Pi,
            DeviceId::Si,
            DeviceId::Timer,
        ] {
            self.reset_device(device);
        }
    }

    pub fn reset_device(&mut self, device: DeviceId) {
        match device {
            DeviceId::Mi => self.mi.reset(),
            DeviceId::Vi => self.vi.reset(),
            DeviceId::Pi => self.pi.reset(),
            DeviceId::Si => self.si.reset(),
            DeviceId::Timer => self.timer.reset(),
        }
    }
}
