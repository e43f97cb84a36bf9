//! # Video Interface
//!
//! The VI scans the framebuffer out of RDRAM and keeps track of the beam.
//! The beam position is derived from the cycles elapsed since reset, so the
//! number of lines per frame is exact no matter how the scheduler slices
//! the frame:
//!
//! ```text
//! line = elapsed_cycles * LINES_PER_FRAME / cycles_per_frame   (mod LINES_PER_FRAME)
//! ```
//!
//! `V_CURRENT` and `V_INTR` are expressed in half-lines, as on hardware.
//! The interrupt fires when the beam enters the half-line stored in `V_INTR`,
//! which happens exactly once per frame.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

use super::interrupt_control::MiInterrupt;
use super::{Device, DeviceOutput};

pub const VI_STATUS: u32 = 0x00;
pub const VI_ORIGIN: u32 = 0x04;
pub const VI_WIDTH: u32 = 0x08;
pub const VI_V_INTR: u32 = 0x0C;
pub const VI_V_CURRENT: u32 = 0x10;
pub const VI_BURST: u32 = 0x14;
pub const VI_V_SYNC: u32 = 0x18;
pub const VI_H_SYNC: u32 = 0x1C;
pub const VI_LEAP: u32 = 0x20;
pub const VI_H_START: u32 = 0x24;
pub const VI_V_START: u32 = 0x28;
pub const VI_V_BURST: u32 = 0x2C;
pub const VI_X_SCALE: u32 = 0x30;
pub const VI_Y_SCALE: u32 = 0x34;

/// Size of the register window.
pub const VI_REGISTERS_LENGTH: u32 = 0x38;

/// NTSC progressive field.
pub const LINES_PER_FRAME: u64 = 262;

/// Half-lines per NTSC frame, the value libultra programs into `VI_V_SYNC`.
const NTSC_V_SYNC: u32 = 0x20D;

/// Pixel format selected by `VI_STATUS` bits 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    Blank,
    Reserved,
    Rgba5551,
    Rgba8888,
}

impl From<u32> for PixelType {
    fn from(status: u32) -> Self {
        match status.get_bits(0..=1) {
            0 => Self::Blank,
            1 => Self::Reserved,
            2 => Self::Rgba5551,
            _ => Self::Rgba8888,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInterface {
    /// Registers indexed by `offset / 4`. `V_CURRENT` is computed, its slot is unused.
    registers: [u32; (VI_REGISTERS_LENGTH / 4) as usize],
    cycles_per_frame: u64,
    interrupt_line: u32,
    elapsed_cycles: u64,
}

impl VideoInterface {
    #[must_use]
    pub fn new(cycles_per_frame: u64, interrupt_line: u32) -> Self {
        let mut vi = Self {
            registers: [0; (VI_REGISTERS_LENGTH / 4) as usize],
            cycles_per_frame: cycles_per_frame.max(LINES_PER_FRAME),
            interrupt_line,
            elapsed_cycles: 0,
        };
        vi.reset();
        vi
    }

    /// Advances the beam, requesting the VI interrupt when it enters `V_INTR`.
    pub fn tick(&mut self, elapsed: u64) -> DeviceOutput {
        let mut output = DeviceOutput::default();

        let before = self.absolute_line();
        self.elapsed_cycles += elapsed;
        let after = self.absolute_line();

        let target = self.registers[(VI_V_INTR / 4) as usize] & 0x3FE;
        if (before + 1..=after).any(|line| half_line(line) == target) {
            output.request_interrupt = Some(MiInterrupt::Vi);
        }

        output
    }

    /// Current line within the frame.
    #[must_use]
    pub fn current_line(&self) -> u64 {
        self.absolute_line() % LINES_PER_FRAME
    }

    #[must_use]
    pub fn pixel_type(&self) -> PixelType {
        self.register(VI_STATUS).into()
    }

    /// Physical RDRAM address of the framebuffer.
    #[must_use]
    pub fn origin(&self) -> u32 {
        self.register(VI_ORIGIN).get_bits(0..=23)
    }

    /// Framebuffer line stride in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.register(VI_WIDTH).get_bits(0..=11)
    }

    const fn register(&self, offset: u32) -> u32 {
        self.registers[(offset / 4) as usize]
    }

    fn absolute_line(&self) -> u64 {
        let lines = u128::from(self.elapsed_cycles) * u128::from(LINES_PER_FRAME)
            / u128::from(self.cycles_per_frame);
        u64::try_from(lines).unwrap_or(u64::MAX)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn half_line(absolute_line: u64) -> u32 {
    ((absolute_line % LINES_PER_FRAME) * 2) as u32
}

impl Device for VideoInterface {
    fn read(&self, offset: u32) -> u32 {
        match offset {
            VI_V_CURRENT => half_line(self.absolute_line()),
            VI_STATUS..VI_REGISTERS_LENGTH => self.register(offset),
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> DeviceOutput {
        let mut output = DeviceOutput::default();

        match offset {
            VI_V_CURRENT => output.acknowledge_interrupt = Some(MiInterrupt::Vi),
            VI_STATUS..VI_REGISTERS_LENGTH => self.registers[(offset / 4) as usize] = value,
            _ => {}
        }

        output
    }

    fn reset(&mut self) {
        self.registers = [0; (VI_REGISTERS_LENGTH / 4) as usize];
        self.registers[(VI_V_INTR / 4) as usize] = self.interrupt_line;
        self.registers[(VI_V_SYNC / 4) as usize] = NTSC_V_SYNC;
        self.elapsed_cycles = 0;
    }
}
