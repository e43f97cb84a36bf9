//! Save states.
//!
//! A snapshot is the whole execution context as JSON: registers, COP0,
//! device registers, every RAM region (base64) and the scheduler position.
//! Cartridge ROM is not included, a snapshot is restored on top of the
//! image that is currently loaded.

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;

use crate::bus::RegionId;
use crate::cpu::cop0::Cop0;
use crate::cpu::hardware::DeviceRegistry;
use crate::cpu::r4300::{CpuState, R4300};
use crate::cpu::registers::RegisterFile;
use crate::scheduler::Scheduler;

/// Bumped whenever the layout below changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("malformed snapshot: {0}")]
    Format(#[from] serde_json::Error),
    #[error("snapshot version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
    #[error("snapshot has {found} bytes of RDRAM, the console has {expected}")]
    RdramSize { found: usize, expected: usize },
    #[error("snapshot region {0:?} does not match the memory map")]
    Region(RegionId),
    #[error("snapshot is missing the {0:?} region")]
    MissingRegion(RegionId),
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryImage {
    region: RegionId,
    #[serde_as(as = "Base64")]
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    state: CpuState,
    registers: RegisterFile,
    cop0: Cop0,
    pc: u64,
    next_pc: u64,
    pc_in_delay_slot: bool,
    cycles: u64,
    scheduler: Scheduler,
    devices: DeviceRegistry,
    memory: Vec<MemoryImage>,
}

impl Snapshot {
    #[must_use]
    pub fn capture(cpu: &R4300, scheduler: &Scheduler) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            state: cpu.state(),
            registers: cpu.registers.clone(),
            cop0: cpu.cop0.clone(),
            pc: cpu.pc,
            next_pc: cpu.next_pc,
            pc_in_delay_slot: cpu.pc_in_delay_slot,
            cycles: cpu.cycles,
            scheduler: scheduler.clone(),
            devices: cpu.bus.devices.clone(),
            memory: cpu
                .bus
                .ram_regions()
                .map(|(region, bytes)| MemoryImage {
                    region,
                    bytes: bytes.to_vec(),
                })
                .collect(),
        }
    }

    /// # Errors
    ///
    /// Returns [`StateError::Format`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// # Errors
    ///
    /// Returns [`StateError::Format`] for malformed input and
    /// [`StateError::Version`] for a snapshot of another layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        let snapshot: Self = serde_json::from_slice(bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StateError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        Ok(snapshot)
    }

    /// Replaces the context with the snapshot.
    ///
    /// Like a reset, a restore reinitializes the whole context, run state
    /// included: a halted core comes back in the state it was captured in.
    /// Every region is validated first, so a rejected snapshot leaves
    /// the context untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::RdramSize`], [`StateError::Region`] or
    /// [`StateError::MissingRegion`] when the memory map differs from the
    /// one the snapshot was taken on.
    pub fn restore(self, cpu: &mut R4300, scheduler: &mut Scheduler) -> Result<(), StateError> {
        if let Some((region, _)) = cpu
            .bus
            .ram_regions()
            .find(|(region, _)| !self.memory.iter().any(|image| image.region == *region))
        {
            return Err(StateError::MissingRegion(region));
        }

        for image in &self.memory {
            let expected = cpu.bus.ram(image.region).map(<[u8]>::len);
            match (image.region, expected) {
                (_, Some(length)) if length == image.bytes.len() => {}
                (RegionId::Rdram, Some(length)) => {
                    return Err(StateError::RdramSize {
                        found: image.bytes.len(),
                        expected: length,
                    });
                }
                (region, _) => return Err(StateError::Region(region)),
            }
        }

        for image in self.memory {
            if let Some(ram) = cpu.bus.ram_mut(image.region) {
                ram.copy_from_slice(&image.bytes);
            }
        }

        cpu.registers = self.registers;
        cpu.cop0 = self.cop0;
        cpu.pc = self.pc;
        cpu.next_pc = self.next_pc;
        cpu.pc_in_delay_slot = self.pc_in_delay_slot;
        cpu.cycles = self.cycles;
        cpu.set_state(self.state);
        cpu.bus.devices = self.devices;
        *scheduler = self.scheduler;

        tracing::info!("state restored at cycle {}", cpu.cycles);

        Ok(())
    }
}
