use crate::cpu::hardware::video_interface::{PixelType, VideoInterface};

use super::color::{Color, colors};
use super::{FRAMEBUFFER_HEIGHT, FRAMEBUFFER_WIDTH};

/// Host-visible picture, one 0xRRGGBBAA word per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pixels: Vec<u32>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self {
            pixels: vec![u32::from(colors::BLACK); FRAMEBUFFER_WIDTH * FRAMEBUFFER_HEIGHT],
        }
    }
}

impl Framebuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        self[(x, y)] = color.into();
    }

    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Pixels as RGBA bytes, row-major.
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|pixel| pixel.to_be_bytes()).collect()
    }

    pub fn clear(&mut self) {
        self.pixels.fill(u32::from(colors::BLACK));
    }

    /// Scans the VI framebuffer out of RDRAM.
    ///
    /// Pixels outside RDRAM read as black; a blank or reserved pixel type
    /// clears the whole picture.
    pub fn scan_out(&mut self, rdram: &[u8], vi: &VideoInterface) {
        let bytes_per_pixel = match vi.pixel_type() {
            PixelType::Rgba5551 => 2,
            PixelType::Rgba8888 => 4,
            PixelType::Blank | PixelType::Reserved => {
                self.clear();
                return;
            }
        };

        let origin = vi.origin() as usize;
        let stride = match vi.width() as usize {
            0 => FRAMEBUFFER_WIDTH,
            width => width,
        };

        for y in 0..FRAMEBUFFER_HEIGHT {
            for x in 0..FRAMEBUFFER_WIDTH {
                let start = origin + (y * stride + x) * bytes_per_pixel;
                let color = rdram
                    .get(start..start + bytes_per_pixel)
                    .map_or(colors::BLACK, |bytes| match *bytes {
                        [hi, lo] => Color::from([hi, lo]),
                        [r, g, b, a] => Color { red: r, green: g, blue: b, alpha: a },
                        _ => colors::BLACK,
                    });
                self.set_pixel(x, y, color);
            }
        }
    }
}

impl std::ops::Index<(usize, usize)> for Framebuffer {
    type Output = u32;

    fn index(&self, (x, y): (usize, usize)) -> &u32 {
        assert!(x < FRAMEBUFFER_WIDTH && y < FRAMEBUFFER_HEIGHT);
        &self.pixels[y * FRAMEBUFFER_WIDTH + x]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Framebuffer {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        assert!(x < FRAMEBUFFER_WIDTH && y < FRAMEBUFFER_HEIGHT);
        &mut self.pixels[y * FRAMEBUFFER_WIDTH + x]
    }
}
