// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal zip container encoder/decoder.
//!
//! Bundles use stored (uncompressed) entries: the payload is a handful of
//! small JSON/patch files and the container must stay trivially
//! verifiable. Writer and reader cover exactly the subset this crate
//! produces — local headers, a central directory, one end record, no
//! zip64, no encryption.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::io::{Cursor, Write};
use thiserror::Error;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_RECORD_SIG: u32 = 0x0605_4b50;
const VERSION: u16 = 20;

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("entry too large: {0}")]
    TooLarge(String),
    #[error("malformed zip: {0}")]
    Malformed(&'static str),
}

struct EntryRecord {
    name: String,
    crc: u32,
    size: u32,
    offset: u32,
}

/// Streaming-order zip writer with stored entries.
pub struct ZipWriter {
    buf: Vec<u8>,
    entries: Vec<EntryRecord>,
    dos_time: u16,
    dos_date: u16,
}

impl ZipWriter {
    pub fn new(modified: DateTime<Utc>) -> Self {
        Self {
            buf: Vec::new(),
            entries: Vec::new(),
            dos_time: dos_time(modified),
            dos_date: dos_date(modified),
        }
    }

    pub fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<(), ZipError> {
        let size =
            u32::try_from(bytes.len()).map_err(|_| ZipError::TooLarge(name.to_string()))?;
        let offset = u32::try_from(self.buf.len()).map_err(|_| ZipError::TooLarge(name.into()))?;
        let crc = crc32fast::hash(bytes);

        let out = &mut self.buf;
        out.write_u32::<LittleEndian>(LOCAL_HEADER_SIG)?;
        out.write_u16::<LittleEndian>(VERSION)?;
        out.write_u16::<LittleEndian>(0)?; // flags
        out.write_u16::<LittleEndian>(0)?; // method: stored
        out.write_u16::<LittleEndian>(self.dos_time)?;
        out.write_u16::<LittleEndian>(self.dos_date)?;
        out.write_u32::<LittleEndian>(crc)?;
        out.write_u32::<LittleEndian>(size)?; // compressed
        out.write_u32::<LittleEndian>(size)?; // uncompressed
        out.write_u16::<LittleEndian>(name.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?; // extra
        out.write_all(name.as_bytes())?;
        out.write_all(bytes)?;

        self.entries.push(EntryRecord { name: name.to_string(), crc, size, offset });
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ZipError> {
        let central_offset =
            u32::try_from(self.buf.len()).map_err(|_| ZipError::TooLarge("archive".into()))?;
        let out = &mut self.buf;
        for entry in &self.entries {
            out.write_u32::<LittleEndian>(CENTRAL_HEADER_SIG)?;
            out.write_u16::<LittleEndian>(VERSION)?; // made by
            out.write_u16::<LittleEndian>(VERSION)?; // needed
            out.write_u16::<LittleEndian>(0)?; // flags
            out.write_u16::<LittleEndian>(0)?; // method
            out.write_u16::<LittleEndian>(self.dos_time)?;
            out.write_u16::<LittleEndian>(self.dos_date)?;
            out.write_u32::<LittleEndian>(entry.crc)?;
            out.write_u32::<LittleEndian>(entry.size)?;
            out.write_u32::<LittleEndian>(entry.size)?;
            out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
            out.write_u16::<LittleEndian>(0)?; // extra
            out.write_u16::<LittleEndian>(0)?; // comment
            out.write_u16::<LittleEndian>(0)?; // disk
            out.write_u16::<LittleEndian>(0)?; // internal attrs
            out.write_u32::<LittleEndian>(0)?; // external attrs
            out.write_u32::<LittleEndian>(entry.offset)?;
            out.write_all(entry.name.as_bytes())?;
        }
        let central_size = self.buf.len() as u32 - central_offset;
        let count = self.entries.len() as u16;
        let out = &mut self.buf;
        out.write_u32::<LittleEndian>(END_RECORD_SIG)?;
        out.write_u16::<LittleEndian>(0)?; // disk
        out.write_u16::<LittleEndian>(0)?; // central dir disk
        out.write_u16::<LittleEndian>(count)?;
        out.write_u16::<LittleEndian>(count)?;
        out.write_u32::<LittleEndian>(central_size)?;
        out.write_u32::<LittleEndian>(central_offset)?;
        out.write_u16::<LittleEndian>(0)?; // comment length
        Ok(self.buf)
    }
}

/// Entry names in central-directory order.
pub fn entry_names(bytes: &[u8]) -> Result<Vec<String>, ZipError> {
    Ok(central_records(bytes)?.into_iter().map(|(name, _, _)| name).collect())
}

/// Contents of the named stored entry, if present.
pub fn read_entry(bytes: &[u8], name: &str) -> Result<Option<Vec<u8>>, ZipError> {
    for (entry_name, offset, size) in central_records(bytes)? {
        if entry_name != name {
            continue;
        }
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(u64::from(offset));
        if cursor.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIG {
            return Err(ZipError::Malformed("bad local header"));
        }
        cursor.set_position(u64::from(offset) + 26);
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let extra_len = cursor.read_u16::<LittleEndian>()?;
        let data_start = offset as usize + 30 + name_len as usize + extra_len as usize;
        let data_end = data_start + size as usize;
        let data = bytes
            .get(data_start..data_end)
            .ok_or(ZipError::Malformed("entry data out of bounds"))?;
        return Ok(Some(data.to_vec()));
    }
    Ok(None)
}

/// `(name, local_offset, size)` for each central-directory record.
fn central_records(bytes: &[u8]) -> Result<Vec<(String, u32, u32)>, ZipError> {
    let end_pos = find_end_record(bytes).ok_or(ZipError::Malformed("no end record"))?;
    let mut cursor = Cursor::new(bytes);
    cursor.set_position(end_pos as u64 + 10);
    let count = cursor.read_u16::<LittleEndian>()?;
    cursor.set_position(end_pos as u64 + 16);
    let central_offset = cursor.read_u32::<LittleEndian>()?;

    let mut records = Vec::with_capacity(count as usize);
    cursor.set_position(u64::from(central_offset));
    for _ in 0..count {
        if cursor.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIG {
            return Err(ZipError::Malformed("bad central header"));
        }
        cursor.set_position(cursor.position() + 16);
        let size = cursor.read_u32::<LittleEndian>()?;
        let _uncompressed = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let extra_len = cursor.read_u16::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;
        cursor.set_position(cursor.position() + 8);
        let offset = cursor.read_u32::<LittleEndian>()?;
        let name_start = cursor.position() as usize;
        let name_end = name_start + name_len as usize;
        let name_bytes = bytes
            .get(name_start..name_end)
            .ok_or(ZipError::Malformed("name out of bounds"))?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        records.push((name, offset, size));
        cursor.set_position((name_end + extra_len as usize + comment_len as usize) as u64);
    }
    Ok(records)
}

/// Scan backwards for the end-of-central-directory signature.
fn find_end_record(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 22 {
        return None;
    }
    let floor = bytes.len().saturating_sub(22 + u16::MAX as usize);
    (floor..=bytes.len() - 22)
        .rev()
        .find(|&i| bytes[i..i + 4] == END_RECORD_SIG.to_le_bytes())
}

fn dos_time(at: DateTime<Utc>) -> u16 {
    ((at.hour() as u16) << 11) | ((at.minute() as u16) << 5) | ((at.second() as u16) / 2)
}

fn dos_date(at: DateTime<Utc>) -> u16 {
    let year = at.year().clamp(1980, 2107) as u16 - 1980;
    (year << 9) | ((at.month() as u16) << 5) | (at.day() as u16)
}

#[cfg(test)]
#[path = "zip_tests.rs"]
mod tests;
