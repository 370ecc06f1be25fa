//! Module for memory devices: main RAM, the boot ROM and video memory.
//!
//! All three are byte-addressable arrays with little-endian 16- and 32-bit
//! accessors. The boot ROM is read-only; writes to it are rejected at the
//! bus. Video memory is organized as 1024x512 16-bit pixels and is normally
//! accessed one halfword at a time by the GPU.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Size of main RAM, in bytes
pub const RAM_SIZE: usize = 2 * 1024 * 1024;

/// Size of the boot ROM image, in bytes. Images of any other size are
/// rejected at load time.
pub const BIOS_SIZE: usize = 512 * 1024;

/// Size of the scratchpad (the data cache repurposed as fast RAM), in bytes
pub const SCRATCHPAD_SIZE: usize = 1024;

/// Width of video memory, in 16-bit pixels
pub const VRAM_WIDTH: usize = 1024;

/// Height of video memory, in lines
pub const VRAM_HEIGHT: usize = 512;

#[derive(Debug, Error)]
pub enum BiosError {
    #[error("could not read boot ROM image: {0}")]
    Io(#[from] std::io::Error),
    #[error("boot ROM image is {0} bytes, expected {BIOS_SIZE}")]
    WrongSize(usize),
}

/// A read-write byte array. Used for both main RAM and the scratchpad.
pub struct Ram {
    buf: Vec<u8>,
}

impl Ram {
    pub fn new(size: usize) -> Ram {
        Ram {
            buf: vec![0u8; size],
        }
    }

    pub fn load8(&self, offset: u32) -> u8 {
        self.buf[offset as usize]
    }

    pub fn load16(&self, offset: u32) -> u16 {
        let offset = offset as usize;
        u16::from_le_bytes([self.buf[offset], self.buf[offset + 1]])
    }

    pub fn load32(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        u32::from_le_bytes([
            self.buf[offset],
            self.buf[offset + 1],
            self.buf[offset + 2],
            self.buf[offset + 3],
        ])
    }

    pub fn store8(&mut self, offset: u32, value: u8) {
        self.buf[offset as usize] = value;
    }

    pub fn store16(&mut self, offset: u32, value: u16) {
        let offset = offset as usize;
        self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn store32(&mut self, offset: u32, value: u32) {
        let offset = offset as usize;
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// The boot ROM. Read-only once constructed.
#[derive(Debug)]
pub struct Bios {
    data: Vec<u8>,
}

impl Bios {
    /// Build a boot ROM from an in-memory image. The image must be exactly
    /// `BIOS_SIZE` bytes.
    pub fn new(data: Vec<u8>) -> Result<Bios, BiosError> {
        if data.len() != BIOS_SIZE {
            return Err(BiosError::WrongSize(data.len()));
        }
        Ok(Bios { data })
    }

    pub fn new_from_file(path: &Path) -> Result<Bios, BiosError> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Bios::new(data)
    }

    pub fn load8(&self, offset: u32) -> u8 {
        self.data[offset as usize]
    }

    pub fn load16(&self, offset: u32) -> u16 {
        let offset = offset as usize;
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    pub fn load32(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }
}

/// Video memory: a 1024x512 grid of 16-bit pixels
pub struct Vram {
    data: Vec<u16>,
}

impl Vram {
    pub fn new() -> Vram {
        Vram {
            data: vec![0u16; VRAM_WIDTH * VRAM_HEIGHT],
        }
    }

    /// Reset every pixel to 0. Used by the GPU full-reset command.
    pub fn clear(&mut self) {
        for pixel in self.data.iter_mut() {
            *pixel = 0;
        }
    }

    /// Read the pixel at (x, y). Coordinates wrap around the buffer the way
    /// the hardware address generator does.
    pub fn load16(&self, x: u16, y: u16) -> u16 {
        let x = x as usize % VRAM_WIDTH;
        let y = y as usize % VRAM_HEIGHT;
        self.data[y * VRAM_WIDTH + x]
    }

    pub fn store16(&mut self, x: u16, y: u16, value: u16) {
        let x = x as usize % VRAM_WIDTH;
        let y = y as usize % VRAM_HEIGHT;
        self.data[y * VRAM_WIDTH + x] = value;
    }
}

impl Default for Vram {
    fn default() -> Vram {
        Vram::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_is_little_endian() {
        let mut ram = Ram::new(16);
        ram.store32(0, 0x1234_5678);
        assert_eq!(ram.load8(0), 0x78, "low byte first");
        assert_eq!(ram.load8(3), 0x12, "high byte last");
        assert_eq!(ram.load16(0), 0x5678);
        assert_eq!(ram.load16(2), 0x1234);
    }

    #[test]
    fn ram_store_load_identity() {
        let mut ram = Ram::new(16);
        ram.store8(5, 0xAB);
        assert_eq!(ram.load8(5), 0xAB);
        ram.store16(6, 0xCDEF);
        assert_eq!(ram.load16(6), 0xCDEF);
        ram.store32(8, 0xDEAD_BEEF);
        assert_eq!(ram.load32(8), 0xDEAD_BEEF);
    }

    #[test]
    fn bios_rejects_wrong_size() {
        let err = Bios::new(vec![0u8; 1234]).unwrap_err();
        match err {
            BiosError::WrongSize(size) => assert_eq!(size, 1234),
            _ => panic!("expected a size error"),
        }
    }

    #[test]
    fn vram_wraps_coordinates() {
        let mut vram = Vram::new();
        vram.store16(0, 0, 0x7FFF);
        assert_eq!(vram.load16(1024, 512), 0x7FFF, "coordinates wrap");
    }
}
