//! "Naked" PlayStation executables.
//!
//! Homebrew and test programs ship as PS-X EXE files: a 2 KiB header
//! followed by the program text. The machine can side-load one of these
//! instead of booting a disc: the boot ROM runs its usual initialization
//! and, at the point where it would hand control to the shell, the
//! executable is injected into RAM and jumped to directly.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Magic bytes at the start of the header
const MAGIC: &[u8; 8] = b"PS-X EXE";

/// Offset of the program text within the file
const TEXT_OFFSET: usize = 0x800;

/// Offset of the region name inside the license string
const REGION_OFFSET: usize = 0x4C + 37;

#[derive(Debug, Error)]
pub enum ExeError {
    #[error("could not read executable: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a PlayStation executable")]
    UnknownFormat,
    #[error("executable text is {0} bytes, larger than RAM")]
    TooBig(u32),
}

/// Console region an executable declares in its license string
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Region {
    Japan,
    Europe,
    NorthAmerica,
}

/// A parsed PS-X EXE image
pub struct Exe {
    /// Execution starts here
    pub entry: u32,
    /// Initial global-pointer register value
    pub initial_gp: u32,
    /// Initial stack pointer, base plus offset fields combined
    pub initial_sp: u32,
    /// RAM address the text is copied to
    pub base: u32,
    /// Region to zero before the copy
    pub memfill_base: u32,
    pub memfill_len: u32,
    /// Declared region, if the license string carries one
    pub region: Option<Region>,
    /// Program text
    pub text: Vec<u8>,
}

impl Exe {
    pub fn parse(data: &[u8]) -> Result<Exe, ExeError> {
        if data.len() < TEXT_OFFSET || &data[0..8] != MAGIC {
            return Err(ExeError::UnknownFormat);
        }

        let word = |offset: usize| {
            u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ])
        };

        let entry = word(0x10);
        let initial_gp = word(0x14);
        let base = word(0x18);
        let text_len = word(0x1C);
        let memfill_base = word(0x28);
        let memfill_len = word(0x2C);
        let initial_sp = word(0x30).wrapping_add(word(0x34));

        // the console only has 2MB of RAM, anything bigger is broken
        if text_len > 2 * 1024 * 1024 {
            return Err(ExeError::TooBig(text_len));
        }

        let text_end = TEXT_OFFSET + text_len as usize;
        if data.len() < text_end {
            return Err(ExeError::UnknownFormat);
        }
        let text = data[TEXT_OFFSET..text_end].to_vec();

        let region = match data.get(REGION_OFFSET..REGION_OFFSET + 5) {
            Some(b"Japan") => Some(Region::Japan),
            Some(b"Europ") => Some(Region::Europe),
            Some(b"North") => Some(Region::NorthAmerica),
            _ => None,
        };

        log::info!(
            "loaded PS-X EXE: base 0x{:08X}, entry 0x{:08X}, {} bytes of text",
            base,
            entry,
            text_len
        );

        Ok(Exe {
            entry,
            initial_gp,
            initial_sp,
            base,
            memfill_base,
            memfill_len,
            region,
            text,
        })
    }

    pub fn new_from_file(path: &Path) -> Result<Exe, ExeError> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Exe::parse(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(entry: u32, base: u32, text: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; TEXT_OFFSET + text.len()];
        data[0..8].copy_from_slice(MAGIC);
        data[0x10..0x14].copy_from_slice(&entry.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&0x8000_F000u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&base.to_le_bytes());
        data[0x1C..0x20].copy_from_slice(&(text.len() as u32).to_le_bytes());
        data[0x30..0x34].copy_from_slice(&0x801F_F000u32.to_le_bytes());
        data[0x34..0x38].copy_from_slice(&0x100u32.to_le_bytes());
        data[REGION_OFFSET..REGION_OFFSET + 5].copy_from_slice(b"North");
        data[TEXT_OFFSET..].copy_from_slice(text);
        data
    }

    #[test]
    fn parses_a_valid_header() {
        let text = [1, 2, 3, 4];
        let exe = Exe::parse(&header(0x8001_0000, 0x8001_0000, &text)).unwrap();

        assert_eq!(exe.entry, 0x8001_0000);
        assert_eq!(exe.initial_gp, 0x8000_F000);
        assert_eq!(exe.initial_sp, 0x801F_F100, "sp adds base and offset");
        assert_eq!(exe.text, text);
        assert_eq!(exe.region, Some(Region::NorthAmerica));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = header(0, 0, &[]);
        data[0] = b'X';
        assert!(matches!(Exe::parse(&data), Err(ExeError::UnknownFormat)));
    }

    #[test]
    fn rejects_oversized_text() {
        let mut data = header(0, 0, &[]);
        data[0x1C..0x20].copy_from_slice(&0x0040_0000u32.to_le_bytes());
        assert!(matches!(Exe::parse(&data), Err(ExeError::TooBig(_))));
    }
}
