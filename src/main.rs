//! emu64 - headless Nintendo 64 runner

mod emu_thread;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use emu::render::{FRAMEBUFFER_HEIGHT, FRAMEBUFFER_WIDTH};
use emu::{EmuConfig, N64};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use emu_thread::{EmuCommand, PauseReason};

/// Runs a cartridge image for a number of frames without a display.
#[derive(Parser, Debug)]
#[command(name = "emu64", version)]
#[command(about = "Headless Nintendo 64 emulator runner", long_about = None)]
struct Args {
    /// Path to the ROM image (.z64, .v64 or .n64)
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u32,

    /// JSON machine configuration; missing fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the last frame to this PNG file
    #[arg(short, long)]
    screenshot: Option<PathBuf>,

    /// Host button mask held for the whole run (e.g. 0x0001 for A)
    #[arg(short, long, value_parser = parse_mask, default_value = "0")]
    input: u16,

    /// Restore this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state after the run
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_mask(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid button mask {value:?}: {e}"))
}

/// `RUST_LOG` filtering, `info` by default. The returned guard flushes the
/// log file when dropped.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(None)
    }
}

fn load_config(path: Option<&Path>) -> Result<EmuConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(EmuConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EmuConfig::default()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_screenshot(path: &Path, rgba: Vec<u8>) -> Result<(), Box<dyn Error>> {
    let (width, height) = (FRAMEBUFFER_WIDTH as u32, FRAMEBUFFER_HEIGHT as u32);
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or("framebuffer size does not match the screenshot size")?;
    image.save(path)?;
    tracing::info!("screenshot written to {}", path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let _guard = init_logging(args.log_file.as_deref())?;

    let config = load_config(args.config.as_deref())?;
    let rom = fs::read(&args.rom)?;

    let mut n64 = N64::new(config)?;
    n64.load_image(&rom)?;
    n64.reset();
    n64.set_input_state(args.input);

    if let Some(header) = n64.header() {
        tracing::info!(
            "{} [{}{}] v{}",
            header.image_name(),
            char::from(header.cartridge_id()[0]),
            char::from(header.cartridge_id()[1]),
            header.version()
        );
    }

    let mut handle = emu_thread::spawn(n64);

    if let Some(path) = &args.load_state {
        handle.send(EmuCommand::LoadState(fs::read(path)?));
        if !handle.wait_until(|h| h.load_result.is_some()) {
            return Err("emulator thread exited before loading the state".into());
        }
        if let Some(Err(e)) = &handle.load_result {
            return Err(format!("cannot load {}: {e}", path.display()).into());
        }
    }

    handle.send(EmuCommand::RunFrames(args.frames));
    let finished = handle.wait_until(|h| {
        h.paused.is_some() && h.state.as_ref().is_some_and(|s| !s.is_running)
    });
    if !finished {
        return Err("emulator thread exited unexpectedly".into());
    }

    if handle.paused == Some(PauseReason::Halted) {
        tracing::warn!("the core halted before the requested frame count");
    }

    if let Some(state) = &handle.state {
        println!(
            "frame {} | pc 0x{:016X} | {} cycles | {:?} | {} faults in the last frame",
            state.frame, state.pc, state.cycles, state.cpu_state, state.faults
        );
    }

    if let Some(path) = &args.screenshot {
        let rgba = handle
            .frame
            .as_ref()
            .map(|frame| frame.to_rgba_bytes())
            .ok_or("no frame was produced")?;
        write_screenshot(path, rgba)?;
    }

    if let Some(path) = &args.save_state {
        handle.send(EmuCommand::RequestSaveState);
        if !handle.wait_until(|h| h.save_state.is_some()) {
            return Err("emulator thread exited before saving".into());
        }
        if let Some(data) = &handle.save_state {
            fs::write(path, data)?;
            tracing::info!("save state written to {}", path.display());
        }
    }

    Ok(())
}
