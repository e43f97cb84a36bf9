/// This module contains the data structures used to present the VI output.
pub mod color;
pub mod framebuffer;

/// Host framebuffer width
pub const FRAMEBUFFER_WIDTH: usize = 320;

/// Host framebuffer height
pub const FRAMEBUFFER_HEIGHT: usize = 240;
