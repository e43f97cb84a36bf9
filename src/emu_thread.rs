//! # Emulator Thread
//!
//! This module runs the console on a dedicated thread, communicating with
//! the caller via lock-free SPSC channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────┐              ┌─────────────────────────────┐
//! │    Emulator Thread      │              │       Caller Thread         │
//! │                         │              │                             │
//! │  ┌─────────────────┐    │   Commands   │    ┌─────────────────────┐  │
//! │  │      N64        │    │ ◄─────────── │    │     EmuHandle       │  │
//! │  │  (owned here)   │    │   (SPSC)     │    │                     │  │
//! │  └────────┬────────┘    │              │    │  - send commands    │  │
//! │           │             │   Events     │    │  - poll events      │  │
//! │           ▼             │ ───────────► │    │  - read state       │  │
//! │  loop {                 │   (SPSC)     │    └─────────────────────┘  │
//! │    process commands     │              │                             │
//! │    if running:          │              │                             │
//! │      n64.run_frame()    │              │                             │
//! │      send events        │              │                             │
//! │  }                      │              │                             │
//! └─────────────────────────┘              └─────────────────────────────┘
//! ```
//!
//! Commands are only looked at between frames, so the caller never sees the
//! core in the middle of an instruction and input changes land on a frame
//! boundary.
//!
//! Events are never dropped. When the event ring is full the emulator thread
//! waits for the caller to poll, so a caller that stops polling also stops
//! the emulation.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use emu::N64;
use emu::cpu::r4300::CpuState;
use emu::render::framebuffer::Framebuffer;

/// Channel buffer sizes
const COMMAND_BUFFER_SIZE: usize = 64;
const EVENT_BUFFER_SIZE: usize = 64;

/// Commands sent from the caller to the emulator thread.
#[derive(Debug, Clone)]
pub enum EmuCommand {
    /// Run continuously until paused.
    Run,
    /// Pause execution.
    Pause,
    /// Run N frames then pause.
    RunFrames(u32),
    /// Host button mask, applied at the next frame boundary.
    SetInput(u16),
    /// Power cycle the console.
    Reset,
    /// Request a full state snapshot.
    RequestState,
    /// Request save state data.
    RequestSaveState,
    /// Load a save state.
    LoadState(Vec<u8>),
    /// Shutdown the emulator thread.
    Shutdown,
}

/// Events sent from the emulator thread to the caller.
#[derive(Debug, Clone)]
pub enum EmuEvent {
    /// State snapshot for display.
    State(EmuState),
    /// A new frame is ready.
    Frame(Arc<Framebuffer>),
    /// Emulator paused.
    Paused { reason: PauseReason },
    /// Save state data.
    SaveStateData(Vec<u8>),
    /// Outcome of a `LoadState` command.
    StateLoaded(Result<(), String>),
}

/// Snapshot of emulator state for display.
#[derive(Debug, Clone)]
pub struct EmuState {
    pub pc: u64,
    /// Cycles executed since reset.
    pub cycles: u64,
    /// Frames completed since reset.
    pub frame: u64,
    /// Faults raised during the last frame.
    pub faults: u32,
    pub cpu_state: CpuState,
    /// Whether the emulator thread is currently running frames.
    pub is_running: bool,
    /// Cartridge image name.
    pub image_name: String,
}

/// Reason why the emulator paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseReason {
    /// Caller requested pause.
    User,
    /// Completed the requested frame count.
    FramesDone,
    /// The core stopped running.
    Halted,
}

/// The emulator thread that owns and runs the console.
struct EmuThread {
    n64: N64,
    cmd_rx: rtrb::Consumer<EmuCommand>,
    event_tx: rtrb::Producer<EmuEvent>,

    // State
    running: bool,
    frames_remaining: u32,
    last_faults: u32,
}

impl EmuThread {
    const fn new(
        n64: N64,
        cmd_rx: rtrb::Consumer<EmuCommand>,
        event_tx: rtrb::Producer<EmuEvent>,
    ) -> Self {
        Self {
            n64,
            cmd_rx,
            event_tx,
            running: false,
            frames_remaining: 0,
            last_faults: 0,
        }
    }

    fn run(mut self) {
        loop {
            if self.process_commands() {
                return; // shutdown
            }

            if self.running || self.frames_remaining > 0 {
                self.execute_frame();
            } else {
                // sleep briefly to avoid busy-waiting
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Process all pending commands. Returns true if should shutdown.
    fn process_commands(&mut self) -> bool {
        while let Ok(cmd) = self.cmd_rx.pop() {
            match cmd {
                EmuCommand::Run => {
                    self.n64.start();
                    self.running = true;
                    self.frames_remaining = 0;
                }
                EmuCommand::Pause => {
                    self.pause(PauseReason::User);
                }
                EmuCommand::RunFrames(count) => {
                    self.n64.start();
                    self.running = false;
                    self.frames_remaining = count;
                    if count == 0 {
                        self.pause(PauseReason::FramesDone);
                    }
                }
                EmuCommand::SetInput(mask) => {
                    self.n64.set_input_state(mask);
                }
                EmuCommand::Reset => {
                    self.n64.reset();
                    self.send_state();
                }
                EmuCommand::RequestState => {
                    self.send_state();
                }
                EmuCommand::RequestSaveState => match self.n64.save_state() {
                    Ok(data) => self.send_event(EmuEvent::SaveStateData(data)),
                    Err(e) => tracing::warn!("save state failed: {e}"),
                },
                EmuCommand::LoadState(data) => {
                    let result = self.n64.load_state(&data).map_err(|e| e.to_string());
                    match &result {
                        Ok(()) => self.send_event(EmuEvent::Frame(self.n64.framebuffer())),
                        Err(e) => tracing::warn!("load state failed: {e}"),
                    }
                    self.send_event(EmuEvent::StateLoaded(result));
                    self.send_state();
                }
                EmuCommand::Shutdown => {
                    return true;
                }
            }
        }
        false
    }

    /// Runs one frame and publishes it.
    fn execute_frame(&mut self) {
        let result = self.n64.run_frame();
        self.last_faults = result.faults;

        if let Some(fault) = result.fault {
            tracing::debug!("frame {}: {} faults, first {fault:?}", result.frame, result.faults);
        }

        self.send_event(EmuEvent::Frame(result.framebuffer));
        self.send_state();

        if result.state != CpuState::Running {
            self.pause(PauseReason::Halted);
            return;
        }

        if self.frames_remaining > 0 {
            self.frames_remaining -= 1;
            if self.frames_remaining == 0 {
                self.pause(PauseReason::FramesDone);
            }
        }
    }

    fn pause(&mut self, reason: PauseReason) {
        self.running = false;
        self.frames_remaining = 0;
        self.send_event(EmuEvent::Paused { reason });
        self.send_state();
    }

    /// Send current state to the caller.
    fn send_state(&mut self) {
        let state = EmuState {
            pc: self.n64.cpu.pc,
            cycles: self.n64.cpu.cycles,
            frame: self.n64.frame(),
            faults: self.last_faults,
            cpu_state: self.n64.state(),
            is_running: self.running || self.frames_remaining > 0,
            image_name: self
                .n64
                .header()
                .map(|header| header.image_name().to_owned())
                .unwrap_or_default(),
        };
        self.send_event(EmuEvent::State(state));
    }

    /// Send an event to the caller, waiting while the ring is full.
    ///
    /// Gives up only when the caller is gone.
    fn send_event(&mut self, mut event: EmuEvent) {
        loop {
            match self.event_tx.push(event) {
                Ok(()) => return,
                Err(rtrb::PushError::Full(rejected)) => {
                    if self.event_tx.is_abandoned() {
                        return;
                    }
                    event = rejected;
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

/// Handle for the caller to communicate with the emulator thread.
pub struct EmuHandle {
    cmd_tx: rtrb::Producer<EmuCommand>,
    event_rx: rtrb::Consumer<EmuEvent>,
    thread_handle: Option<JoinHandle<()>>,

    /// Latest state snapshot from the emulator.
    pub state: Option<EmuState>,
    /// Latest frame from the emulator.
    pub frame: Option<Arc<Framebuffer>>,
    /// Latest save state received.
    pub save_state: Option<Vec<u8>>,
    /// Reason of the last pause, cleared by the next command.
    pub paused: Option<PauseReason>,
    /// Outcome of the last `LoadState`, cleared when a new one is sent.
    pub load_result: Option<Result<(), String>>,
}

impl EmuHandle {
    /// Send a command to the emulator thread.
    pub fn send(&mut self, cmd: EmuCommand) {
        if matches!(cmd, EmuCommand::Run | EmuCommand::RunFrames(_)) {
            self.paused = None;
        }
        if matches!(cmd, EmuCommand::RequestSaveState) {
            self.save_state = None;
        }
        if matches!(cmd, EmuCommand::LoadState(_)) {
            self.load_result = None;
        }
        if self.cmd_tx.push(cmd).is_err() {
            tracing::warn!("command queue full, command dropped");
        }
    }

    /// Poll for events and update cached state.
    pub fn poll(&mut self) {
        while let Ok(event) = self.event_rx.pop() {
            match event {
                EmuEvent::State(state) => {
                    self.state = Some(state);
                }
                EmuEvent::Frame(frame) => {
                    self.frame = Some(frame);
                }
                EmuEvent::Paused { reason } => {
                    self.paused = Some(reason);
                }
                EmuEvent::SaveStateData(data) => {
                    tracing::info!("received save state data: {} bytes", data.len());
                    self.save_state = Some(data);
                }
                EmuEvent::StateLoaded(result) => {
                    self.load_result = Some(result);
                }
            }
        }
    }

    /// Polls until `done` holds or the emulator thread is gone.
    pub fn wait_until(&mut self, done: impl Fn(&Self) -> bool) -> bool {
        loop {
            self.poll();
            if done(self) {
                return true;
            }
            if self.thread_handle.as_ref().is_none_or(JoinHandle::is_finished) {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for EmuHandle {
    fn drop(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };

        let mut shutdown_sent = false;
        while !handle.is_finished() {
            if !shutdown_sent {
                shutdown_sent = self.cmd_tx.push(EmuCommand::Shutdown).is_ok();
            }
            // Drain so an emulator thread waiting on a full ring can move on.
            while self.event_rx.pop().is_ok() {}
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
    }
}

/// Spawn the emulator thread and return a handle for communication.
///
/// The console is moved to the new thread.
pub fn spawn(n64: N64) -> EmuHandle {
    // Create command channel (caller → emulator)
    let (cmd_tx, cmd_rx) = rtrb::RingBuffer::new(COMMAND_BUFFER_SIZE);

    // Create event channel (emulator → caller)
    let (event_tx, event_rx) = rtrb::RingBuffer::new(EVENT_BUFFER_SIZE);

    let thread_handle = thread::spawn(move || {
        let emu_thread = EmuThread::new(n64, cmd_rx, event_tx);
        emu_thread.run();
    });

    EmuHandle {
        cmd_tx,
        event_rx,
        thread_handle: Some(thread_handle),
        state: None,
        frame: None,
        save_state: None,
        paused: None,
        load_result: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use emu::EmuConfig;

    fn console() -> N64 {
        let config = EmuConfig {
            cpu_clock_hz: 262 * 50 * 60,
            rdram_size: 0x10_0000,
            rom_window_size: 0x10_0000,
            ..EmuConfig::default()
        };
        let mut n64 = N64::new(config).unwrap();
        // beq zero, zero, -4 at the reset vector, nop in the delay slot.
        let mut image = vec![0; 0x1000];
        image[0x40..0x44].copy_from_slice(&[0x10, 0x00, 0xFF, 0xFF]);
        n64.load_image(&image).unwrap();
        n64.reset();
        n64
    }

    #[test]
    fn run_frames_then_pause() {
        let mut handle = spawn(console());

        handle.send(EmuCommand::RunFrames(3));
        assert!(handle.wait_until(|h| {
            h.paused.is_some() && h.state.as_ref().is_some_and(|s| !s.is_running)
        }));

        assert_eq!(handle.paused, Some(PauseReason::FramesDone));
        assert!(handle.frame.is_some());
        let state = handle.state.clone().unwrap();
        assert_eq!(state.frame, 3);
        assert_eq!(state.cpu_state, CpuState::Running);
        assert!(!state.is_running);
    }

    #[test]
    fn save_state_round_trip() {
        let mut handle = spawn(console());

        handle.send(EmuCommand::RunFrames(1));
        assert!(handle.wait_until(|h| h.paused.is_some()));
        handle.send(EmuCommand::RequestSaveState);
        assert!(handle.wait_until(|h| h.save_state.is_some()));
        let saved = handle.save_state.clone().unwrap();

        handle.send(EmuCommand::RunFrames(2));
        assert!(handle.wait_until(|h| h.paused.is_some()));
        handle.send(EmuCommand::LoadState(saved));
        assert!(handle.wait_until(|h| h.load_result.is_some()));
        assert_eq!(handle.load_result, Some(Ok(())));
        assert!(handle.wait_until(|h| h.state.as_ref().is_some_and(|s| s.frame == 1)));
    }

    #[test]
    fn corrupt_state_is_reported() {
        let mut handle = spawn(console());

        handle.send(EmuCommand::LoadState(b"{ not a snapshot".to_vec()));
        assert!(handle.wait_until(|h| h.load_result.is_some()));

        assert!(matches!(handle.load_result, Some(Err(_))));
        handle.send(EmuCommand::RequestState);
        assert!(handle.wait_until(|h| h.state.is_some()));
        assert_eq!(handle.state.as_ref().map(|s| s.frame), Some(0));
    }

    #[test]
    fn events_survive_a_caller_that_polls_late() {
        let mut handle = spawn(console());

        // Far more events than the ring holds before the first poll.
        handle.send(EmuCommand::RunFrames(200));
        thread::sleep(Duration::from_millis(200));

        assert!(handle.wait_until(|h| {
            h.paused.is_some() && h.state.as_ref().is_some_and(|s| !s.is_running)
        }));
        assert_eq!(handle.paused, Some(PauseReason::FramesDone));
        assert_eq!(handle.state.as_ref().map(|s| s.frame), Some(200));
    }

    #[test]
    fn drop_with_a_full_event_ring_shuts_down() {
        let mut handle = spawn(console());

        handle.send(EmuCommand::Run);
        thread::sleep(Duration::from_millis(50));

        drop(handle);
    }
}
