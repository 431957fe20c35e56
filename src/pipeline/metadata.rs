//! M4A metadata extraction.
//!
//! Minimal walk of the ISO base-media box structure: validates the `ftyp`
//! brand, then reads creation time and duration from `moov`/`mvhd`
//! (version 0). Used to enrich log lines; failures here never block the
//! pipeline.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid M4A format")]
    InvalidFormat,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata extracted from an audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub creation_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
}

/// Seconds between the Mac epoch (1904-01-01) and the Unix epoch.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

const ACCEPTED_BRANDS: [&[u8; 4]; 4] = [b"M4A ", b"mp41", b"mp42", b"isom"];

/// Extract metadata from an M4A file on disk.
pub fn extract_m4a(path: &Path) -> Result<AudioMetadata, MetadataError> {
    let file = std::fs::File::open(path)?;
    parse_m4a(std::io::BufReader::new(file))
}

fn parse_m4a<R: Read + Seek>(mut r: R) -> Result<AudioMetadata, MetadataError> {
    let mut meta = AudioMetadata {
        creation_time: None,
        duration: None,
    };
    let mut found_ftyp = false;
    let mut found_moov = false;

    loop {
        let (size, box_type) = match read_box_header(&mut r) {
            Ok(header) => header,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if size < 8 {
            return Err(MetadataError::InvalidFormat);
        }
        let payload = size - 8;

        match &box_type {
            b"ftyp" => {
                validate_ftyp(&mut r, payload)?;
                found_ftyp = true;
            }
            b"moov" => {
                parse_moov(&mut r, payload, &mut meta)?;
                found_moov = true;
            }
            _ => {
                r.seek(SeekFrom::Current(payload as i64))?;
            }
        }
    }

    if !found_ftyp || !found_moov {
        return Err(MetadataError::InvalidFormat);
    }

    Ok(meta)
}

fn read_box_header<R: Read>(r: &mut R) -> std::io::Result<(u32, [u8; 4])> {
    let mut header = [0u8; 8];
    r.read_exact(&mut header)?;

    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let box_type = [header[4], header[5], header[6], header[7]];
    Ok((size, box_type))
}

fn validate_ftyp<R: Read + Seek>(r: &mut R, payload: u32) -> Result<(), MetadataError> {
    if payload < 4 {
        return Err(MetadataError::InvalidFormat);
    }

    let mut brand = [0u8; 4];
    r.read_exact(&mut brand)?;

    if !ACCEPTED_BRANDS.iter().any(|b| **b == brand) {
        return Err(MetadataError::InvalidFormat);
    }

    r.seek(SeekFrom::Current((payload - 4) as i64))?;
    Ok(())
}

fn parse_moov<R: Read + Seek>(
    r: &mut R,
    payload: u32,
    meta: &mut AudioMetadata,
) -> Result<(), MetadataError> {
    let end = r.stream_position()? + payload as u64;

    while r.stream_position()? < end {
        let (size, box_type) = read_box_header(r)?;
        if size < 8 {
            return Err(MetadataError::InvalidFormat);
        }
        let inner = size - 8;

        match &box_type {
            b"mvhd" => parse_mvhd(r, inner, meta)?,
            _ => {
                r.seek(SeekFrom::Current(inner as i64))?;
            }
        }
    }

    Ok(())
}

fn parse_mvhd<R: Read + Seek>(
    r: &mut R,
    payload: u32,
    meta: &mut AudioMetadata,
) -> Result<(), MetadataError> {
    let mut version_flags = [0u8; 4];
    r.read_exact(&mut version_flags)?;

    if version_flags[0] != 0 {
        // Version 1 carries 64-bit times; not produced by the sync agents
        // this pipeline sees.
        r.seek(SeekFrom::Current((payload - 4) as i64))?;
        return Ok(());
    }

    let mut body = [0u8; 16];
    r.read_exact(&mut body)?;

    let creation = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    // Modification time at body[4..8] is unused.
    let timescale = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);
    let duration = u32::from_be_bytes([body[12], body[13], body[14], body[15]]);

    meta.creation_time = Utc
        .timestamp_opt(creation as i64 - MAC_EPOCH_OFFSET, 0)
        .single();
    if timescale > 0 {
        meta.duration = Some(Duration::from_secs_f64(duration as f64 / timescale as f64));
    }

    if payload > 20 {
        r.seek(SeekFrom::Current((payload - 20) as i64))?;
    }
    Ok(())
}
