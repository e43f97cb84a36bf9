#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
mod bitwise;

#[allow(clippy::missing_panics_doc)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::unreadable_literal)]
pub mod bus;
pub mod config;
pub mod cpu;
pub mod n64;
pub mod render;

#[allow(clippy::similar_names)]
pub mod rom;
pub mod scheduler;
pub mod snapshot;

pub use config::EmuConfig;
pub use n64::N64;
