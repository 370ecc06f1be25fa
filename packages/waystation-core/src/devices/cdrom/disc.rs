//! Disc images.
//!
//! Two container formats are accepted: a raw sector stream (2352 bytes per
//! sector, the format most dumping tools produce) and a plain ISO (2048
//! bytes per sector, data only). Both are identified by the ISO-9660
//! primary volume descriptor at sector 16. Reads always hand back a full
//! raw sector; ISO payloads are framed into a synthetic one so the drive
//! logic never cares which container backs the image.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// Size of a raw sector on disc
pub const RAW_SECTOR_SIZE: usize = 2352;

/// Size of the data payload of a Mode 2 Form 1 sector
pub const ISO_SECTOR_SIZE: usize = 2048;

/// Offset of the data payload within a raw sector (sync pattern, address,
/// mode byte and subheader come first)
pub const PAYLOAD_OFFSET: usize = 24;

/// Sector number of the ISO-9660 primary volume descriptor
const PVD_SECTOR: u64 = 16;

/// Sectors per second on the disc, which offsets every logical block
/// address by two seconds of lead-in
const LEAD_IN_SECTORS: u32 = 150;

#[derive(Debug, Error)]
pub enum DiscError {
    #[error("could not read disc image: {0}")]
    Io(#[from] std::io::Error),
    #[error("disc image has no ISO-9660 volume descriptor at sector 16")]
    UnrecognizedImage,
}

/// How the backing file frames its sectors
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SectorFormat {
    /// 2352-byte raw sectors
    Raw,
    /// 2048-byte data-only sectors
    Iso,
}

/// A file or directory record from an ISO-9660 directory extent
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub lba: u32,
    pub size: u32,
    pub is_directory: bool,
}

pub struct Disc {
    file: File,
    format: SectorFormat,
    volume_id: String,
    root: DirEntry,
}

impl Disc {
    /// Open a disc image, probing the container format via the primary
    /// volume descriptor.
    pub fn open(path: &Path) -> Result<Disc, DiscError> {
        let mut file = File::open(path)?;

        let (format, payload) = probe(&mut file)?;
        let volume_id = dstring(&payload[40..72]);
        let root = parse_dir_entry(&payload[156..190])
            .ok_or(DiscError::UnrecognizedImage)?;

        log::info!(
            "disc image opened: volume '{}', {} sectors per frame",
            volume_id,
            match format {
                SectorFormat::Raw => RAW_SECTOR_SIZE,
                SectorFormat::Iso => ISO_SECTOR_SIZE,
            }
        );

        Ok(Disc {
            file,
            format,
            volume_id,
            root,
        })
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    pub fn format(&self) -> SectorFormat {
        self.format
    }

    /// Read the raw sector at the given logical block address. For ISO
    /// images the payload is wrapped in a synthetic raw frame with the
    /// payload at `PAYLOAD_OFFSET`.
    pub fn read_sector(&mut self, lba: u32) -> Result<Vec<u8>, DiscError> {
        match self.format {
            SectorFormat::Raw => {
                let mut sector = vec![0u8; RAW_SECTOR_SIZE];
                self.file
                    .seek(SeekFrom::Start(u64::from(lba) * RAW_SECTOR_SIZE as u64))?;
                self.file.read_exact(&mut sector)?;
                Ok(sector)
            }
            SectorFormat::Iso => {
                let mut payload = vec![0u8; ISO_SECTOR_SIZE];
                self.file
                    .seek(SeekFrom::Start(u64::from(lba) * ISO_SECTOR_SIZE as u64))?;
                self.file.read_exact(&mut payload)?;
                Ok(frame_sector(lba, &payload))
            }
        }
    }

    /// Parse the records of the root directory extent
    pub fn root_entries(&mut self) -> Result<Vec<DirEntry>, DiscError> {
        let root = self.root.clone();
        let mut entries = Vec::new();

        let sectors = (root.size as usize + ISO_SECTOR_SIZE - 1) / ISO_SECTOR_SIZE;
        for i in 0..sectors {
            let sector = self.read_sector(root.lba + i as u32)?;
            let payload = &sector[PAYLOAD_OFFSET..PAYLOAD_OFFSET + ISO_SECTOR_SIZE];

            let mut offset = 0;
            while offset < payload.len() {
                let len = payload[offset] as usize;
                if len == 0 || offset + len > payload.len() {
                    // records never straddle a sector boundary; a zero
                    // length means the rest of this sector is padding
                    break;
                }
                if let Some(entry) = parse_dir_entry(&payload[offset..offset + len]) {
                    // the first two records are the . and .. pseudo-entries
                    if !entry.name.is_empty() {
                        entries.push(entry);
                    }
                }
                offset += len;
            }
        }

        Ok(entries)
    }
}

/// Locate the primary volume descriptor under both framings and return
/// the matching format along with the descriptor payload.
fn probe(file: &mut File) -> Result<(SectorFormat, Vec<u8>), DiscError> {
    let candidates = [
        (SectorFormat::Raw, PVD_SECTOR * RAW_SECTOR_SIZE as u64 + PAYLOAD_OFFSET as u64),
        (SectorFormat::Iso, PVD_SECTOR * ISO_SECTOR_SIZE as u64),
    ];

    for (format, offset) in candidates {
        let mut payload = vec![0u8; ISO_SECTOR_SIZE];
        if file.seek(SeekFrom::Start(offset)).is_err() {
            continue;
        }
        if file.read_exact(&mut payload).is_err() {
            continue;
        }
        // descriptor type 1, identifier "CD001"
        if payload[0] == 1 && &payload[1..6] == b"CD001" {
            return Ok((format, payload));
        }
    }

    Err(DiscError::UnrecognizedImage)
}

/// Wrap an ISO payload in a raw sector frame: sync pattern, BCD address,
/// mode byte, empty subheader, payload.
fn frame_sector(lba: u32, payload: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; RAW_SECTOR_SIZE];

    // 12-byte sync pattern: 00 FF*10 00
    for byte in raw[1..11].iter_mut() {
        *byte = 0xFF;
    }

    let absolute = lba + LEAD_IN_SECTORS;
    raw[12] = to_bcd((absolute / (60 * 75)) as u8);
    raw[13] = to_bcd(((absolute / 75) % 60) as u8);
    raw[14] = to_bcd((absolute % 75) as u8);
    raw[15] = 2;

    raw[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    raw
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Decode a space-padded ISO-9660 identifier field
fn dstring(field: &[u8]) -> String {
    String::from_utf8_lossy(field).trim_end().to_string()
}

/// Parse one directory record. Returns None for records too short to be
/// valid.
fn parse_dir_entry(record: &[u8]) -> Option<DirEntry> {
    if record.len() < 34 {
        return None;
    }

    let lba = u32::from_le_bytes([record[2], record[3], record[4], record[5]]);
    let size = u32::from_le_bytes([record[10], record[11], record[12], record[13]]);
    let flags = record[25];

    let name_len = record[32] as usize;
    if record.len() < 33 + name_len {
        return None;
    }
    let raw_name = &record[33..33 + name_len];

    // identifiers 0x00 and 0x01 are the . and .. pseudo-entries
    let name = if raw_name == [0] || raw_name == [1] {
        String::new()
    } else {
        // strip the ";1" version suffix
        let text = String::from_utf8_lossy(raw_name);
        text.split(';').next().unwrap_or("").to_string()
    };

    Some(DirEntry {
        name,
        lba,
        size,
        is_directory: flags & 0x02 != 0,
    })
}
