//! # Frame scheduler
//!
//! A frame is the CPU cycle budget of one video field. The budget is split
//! into one slice per scan line so that devices see time advance at a
//! realistic granularity:
//!
//! ```text
//! for each line:
//!     step the core until the cumulative line target is reached
//!     tick the devices by the cycles actually consumed
//!     deliver a pending interrupt if the core accepts it
//! scan out the framebuffer, report the frame
//! ```
//!
//! Targets are cumulative, so an instruction that overshoots its slice is
//! paid back by the next one, and the overshoot of the last slice carries
//! into the next frame. Nothing here looks at the host clock: the same
//! image, input and number of frames always yield the same state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cpu::exception::Fault;
use crate::cpu::hardware::video_interface::LINES_PER_FRAME;
use crate::cpu::r4300::{CpuState, R4300};
use crate::render::framebuffer::Framebuffer;

/// Device ticks and interrupt checks per frame.
pub const SLICES_PER_FRAME: u64 = LINES_PER_FRAME;

/// Outcome of one [`Scheduler::run_frame`].
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Frames completed since reset, this one included.
    pub frame: u64,
    pub cycles: u64,
    /// First fault raised during the frame, if any.
    pub fault: Option<Fault>,
    pub faults: u32,
    pub interrupts: u32,
    /// Core state at the frame boundary.
    pub state: CpuState,
    pub framebuffer: Arc<Framebuffer>,
}

impl FrameResult {
    #[must_use]
    pub const fn faulted(&self) -> bool {
        self.fault.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduler {
    cycles_per_frame: u64,
    frame: u64,
    /// Cycles the previous frame ran past its budget.
    overshoot: u64,
}

/// Cumulative cycle target at the end of `slice`, exact for any budget.
fn slice_target(budget: u64, slice: u64) -> u64 {
    let target = u128::from(budget) * u128::from(slice) / u128::from(SLICES_PER_FRAME);
    u64::try_from(target).unwrap_or(budget)
}

impl Scheduler {
    #[must_use]
    pub fn new(cycles_per_frame: u64) -> Self {
        Self {
            cycles_per_frame: cycles_per_frame.max(SLICES_PER_FRAME),
            frame: 0,
            overshoot: 0,
        }
    }

    #[must_use]
    pub const fn cycles_per_frame(&self) -> u64 {
        self.cycles_per_frame
    }

    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    pub const fn reset(&mut self) {
        self.frame = 0;
        self.overshoot = 0;
    }

    /// Runs the core for one frame and scans out the picture.
    ///
    /// A core that is not running (or stops mid-frame) ends the frame
    /// early; time does not advance for the devices while it is stopped.
    pub fn run_frame(
        &mut self,
        cpu: &mut R4300,
        framebuffer: &mut Arc<Framebuffer>,
    ) -> FrameResult {
        let budget = self.cycles_per_frame;
        let mut consumed = self.overshoot.min(budget);
        let mut ticked = consumed;
        let mut fault = None;
        let mut faults = 0;
        let mut interrupts = 0;

        for slice in 1..=SLICES_PER_FRAME {
            let target = slice_target(budget, slice);

            while consumed < target && cpu.state() == CpuState::Running {
                let step = cpu.step();
                consumed += step.cycles_consumed;

                if let Some(raised) = step.fault {
                    fault.get_or_insert(raised);
                    faults += 1;
                }
            }

            if consumed > ticked {
                cpu.bus.devices.tick(consumed - ticked);
                ticked = consumed;
            }

            if cpu.check_interrupts() {
                interrupts += 1;
            }

            if cpu.state() != CpuState::Running {
                tracing::debug!("core {:?}, frame {} ends early", cpu.state(), self.frame);
                break;
            }
        }

        self.overshoot = consumed.saturating_sub(budget);

        if let Some(rdram) = cpu.bus.ram(crate::bus::RegionId::Rdram) {
            Arc::make_mut(framebuffer).scan_out(rdram, &cpu.bus.devices.vi);
        }

        self.frame += 1;

        FrameResult {
            frame: self.frame,
            cycles: consumed,
            fault,
            faults,
            interrupts,
            state: cpu.state(),
            framebuffer: Arc::clone(framebuffer),
        }
    }
}
