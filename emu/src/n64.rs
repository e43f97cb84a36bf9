use std::sync::Arc;

use crate::bus::{BusError, SP_MEMORY_BASE};
use crate::config::EmuConfig;
use crate::cpu::r4300::{CpuState, R4300};
use crate::cpu::registers::REG_SP;
use crate::render::framebuffer::Framebuffer;
use crate::rom::{self, BOOT_CODE_LENGTH, LoadError, RomHeader};
use crate::scheduler::{FrameResult, Scheduler};
use crate::snapshot::{Snapshot, StateError};

/// Stack pointer the PIF leaves behind, top of SP IMEM.
pub const BOOT_STACK_POINTER: u64 = 0xFFFF_FFFF_A400_1FF0;

/// The whole console: interpreter core, memory map, devices and the frame
/// scheduler driving them.
#[derive(Debug)]
pub struct N64 {
    pub cpu: R4300,
    config: EmuConfig,
    scheduler: Scheduler,
    framebuffer: Arc<Framebuffer>,
    header: Option<RomHeader>,
    /// Host input waiting for the next frame boundary.
    pending_input: Option<u16>,
}

impl N64 {
    /// # Errors
    ///
    /// Propagates a [`BusError`] from building the memory map.
    pub fn new(config: EmuConfig) -> Result<Self, BusError> {
        Ok(Self {
            cpu: R4300::new(&config)?,
            scheduler: Scheduler::new(config.cycles_per_frame()),
            config,
            framebuffer: Arc::default(),
            header: None,
            pending_input: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EmuConfig {
        &self.config
    }

    /// Installs a cartridge image, normalizing its byte order.
    ///
    /// The running program is not touched; call [`N64::reset`] to boot it.
    ///
    /// # Errors
    ///
    /// [`LoadError::Empty`] for a zero-length image and
    /// [`LoadError::TooLarge`] when it does not fit the cartridge window.
    /// The console is unchanged on error.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::Empty);
        }

        let max = self.config.rom_window_size as usize;
        if bytes.len() > max {
            return Err(LoadError::TooLarge {
                size: bytes.len(),
                max,
            });
        }

        let mut image = bytes.to_vec();
        let order = rom::normalize(&mut image);
        self.header = RomHeader::parse(&image);

        match &self.header {
            Some(header) => tracing::info!(
                "loaded \"{}\" ({} bytes, {order:?}), entry point 0x{:08X}",
                header.image_name(),
                image.len(),
                header.entry_point()
            ),
            None => tracing::info!("loaded headerless image ({} bytes)", image.len()),
        }

        self.cpu.bus.load_rom(image);

        Ok(())
    }

    /// Power-on state plus the PIF boot handoff: the first 4 KiB of the
    /// cartridge are copied to SP DMEM and execution starts there.
    pub fn reset(&mut self) {
        self.cpu.bus.reset();
        self.cpu.reset();
        self.scheduler.reset();
        Arc::make_mut(&mut self.framebuffer).clear();

        let boot_code_length = self.cpu.bus.rom().len().min(BOOT_CODE_LENGTH);
        let boot_code = self.cpu.bus.rom()[..boot_code_length].to_vec();
        self.cpu.bus.poke_slice(SP_MEMORY_BASE, &boot_code);
        self.cpu.registers.set_register_at(REG_SP, BOOT_STACK_POINTER);

        tracing::info!("reset, {boot_code_length} bytes of boot code in SP DMEM");
    }

    pub fn start(&mut self) {
        self.cpu.start();
    }

    pub fn stop(&mut self) {
        self.cpu.stop();
    }

    #[must_use]
    pub const fn state(&self) -> CpuState {
        self.cpu.state()
    }

    /// Advances one video frame.
    pub fn run_frame(&mut self) -> FrameResult {
        if let Some(mask) = self.pending_input.take() {
            self.cpu.bus.devices.controller.set_input_state(mask);
        }

        self.scheduler.run_frame(&mut self.cpu, &mut self.framebuffer)
    }

    /// Latches the host button mask; it takes effect at the next frame.
    pub const fn set_input_state(&mut self, mask: u16) {
        self.pending_input = Some(mask);
    }

    #[must_use]
    pub fn framebuffer(&self) -> Arc<Framebuffer> {
        Arc::clone(&self.framebuffer)
    }

    #[must_use]
    pub const fn header(&self) -> Option<&RomHeader> {
        self.header.as_ref()
    }

    /// Frames completed since reset.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.scheduler.frame()
    }

    /// # Errors
    ///
    /// Returns [`StateError::Format`] if the context cannot be serialized.
    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        Snapshot::capture(&self.cpu, &self.scheduler).to_bytes()
    }

    /// # Errors
    ///
    /// Any [`StateError`]; the console is unchanged on error.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), StateError> {
        Snapshot::from_bytes(bytes)?.restore(&mut self.cpu, &mut self.scheduler)?;

        if let Some(rdram) = self.cpu.bus.ram(crate::bus::RegionId::Rdram) {
            Arc::make_mut(&mut self.framebuffer).scan_out(rdram, &self.cpu.bus.devices.vi);
        }

        Ok(())
    }
}
