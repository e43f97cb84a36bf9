//! # Cartridge images
//!
//! Dumps come in three byte orders. The first word of the header tells them
//! apart and every image is normalized to the console's big-endian order
//! before it reaches the bus:
//!
//! | Extension | First word    | Order                  |
//! |-----------|---------------|------------------------|
//! | `.z64`    | `80 37 12 40` | big-endian (native)    |
//! | `.v64`    | `37 80 40 12` | 16-bit byte swapped    |
//! | `.n64`    | `40 12 37 80` | 32-bit little-endian   |

use thiserror::Error;

/// Header size; shorter images are accepted but carry no header.
pub const ROM_HEADER_LENGTH: usize = 0x40;

/// Boot code the PIF copies into SP DMEM.
pub const BOOT_CODE_LENGTH: usize = 0x1000;

const Z64_MAGIC: [u8; 4] = [0x80, 0x37, 0x12, 0x40];
const V64_MAGIC: [u8; 4] = [0x37, 0x80, 0x40, 0x12];
const N64_MAGIC: [u8; 4] = [0x40, 0x12, 0x37, 0x80];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("the image is empty")]
    Empty,
    #[error("the image is {size} bytes, the cartridge window holds {max}")]
    TooLarge { size: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    ByteSwapped,
    LittleEndian,
}

impl ByteOrder {
    /// Detects the dump format; unknown images are taken as big-endian.
    #[must_use]
    pub fn detect(image: &[u8]) -> Self {
        match image.get(0..4) {
            Some(magic) if magic == V64_MAGIC => Self::ByteSwapped,
            Some(magic) if magic == N64_MAGIC => Self::LittleEndian,
            Some(magic) if magic != Z64_MAGIC => {
                tracing::debug!("unknown image signature {magic:02X?}, loading as-is");
                Self::BigEndian
            }
            _ => Self::BigEndian,
        }
    }
}

/// Rewrites `image` in place into big-endian order.
///
/// A trailing partial word or half-word is left untouched.
pub fn normalize(image: &mut [u8]) -> ByteOrder {
    let order = ByteOrder::detect(image);

    match order {
        ByteOrder::BigEndian => {}
        ByteOrder::ByteSwapped => image.chunks_exact_mut(2).for_each(|half| half.swap(0, 1)),
        ByteOrder::LittleEndian => image.chunks_exact_mut(4).for_each(<[u8]>::reverse),
    }

    order
}

/// Contains the information of the cartridge header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    clock_rate: u32,
    entry_point: u32,
    release: u32,
    crc1: u32,
    crc2: u32,
    image_name: String,
    media_format: u8,
    cartridge_id: [u8; 2],
    country_code: u8,
    version: u8,
}

impl RomHeader {
    /// Parses a normalized image; `None` when it is shorter than the header.
    #[must_use]
    pub fn parse(image: &[u8]) -> Option<Self> {
        let header = image.get(..ROM_HEADER_LENGTH)?;
        let word = |offset: usize| {
            u32::from_be_bytes([
                header[offset],
                header[offset + 1],
                header[offset + 2],
                header[offset + 3],
            ])
        };

        Some(Self {
            clock_rate: word(0x04),
            entry_point: word(0x08),
            release: word(0x0C),
            crc1: word(0x10),
            crc2: word(0x14),
            image_name: into_ascii_str(&header[0x20..0x34]),
            media_format: header[0x3B],
            cartridge_id: [header[0x3C], header[0x3D]],
            country_code: header[0x3E],
            version: header[0x3F],
        })
    }

    /// Clock rate override, 0 for the default.
    #[must_use]
    pub const fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Address the boot code jumps to once the game is loaded.
    #[must_use]
    pub const fn entry_point(&self) -> u32 {
        self.entry_point
    }

    /// libultra release the game was built against.
    #[must_use]
    pub const fn release(&self) -> u32 {
        self.release
    }

    #[must_use]
    pub const fn crc1(&self) -> u32 {
        self.crc1
    }

    #[must_use]
    pub const fn crc2(&self) -> u32 {
        self.crc2
    }

    #[must_use]
    pub fn image_name(&self) -> &str {
        self.image_name.as_str()
    }

    /// `N` for cartridges, `D` for 64DD disks.
    #[must_use]
    pub const fn media_format(&self) -> u8 {
        self.media_format
    }

    #[must_use]
    pub const fn cartridge_id(&self) -> [u8; 2] {
        self.cartridge_id
    }

    /// Region letter, e.g. `E` (USA), `J` (Japan), `P` (Europe).
    #[must_use]
    pub const fn country_code(&self) -> u8 {
        self.country_code
    }

    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }
}

/// Image names are space padded ASCII; anything else is dropped.
fn into_ascii_str(data: &[u8]) -> String {
    data.iter()
        .filter(|byte| byte.is_ascii() && !byte.is_ascii_control())
        .map(|&byte| char::from(byte))
        .collect::<String>()
        .trim_end()
        .to_owned()
}
