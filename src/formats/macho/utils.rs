//! Utility functions for Mach-O parsing

use crate::error::{MachoError, Result};
use crate::formats::macho::types::{Bitness, Endianness};

/// Trait for reading values with endianness support
pub trait EndianRead {
    fn read_u16(&self, offset: usize, endian: Endianness) -> Result<u16>;
    fn read_u32(&self, offset: usize, endian: Endianness) -> Result<u32>;
    fn read_u64(&self, offset: usize, endian: Endianness) -> Result<u64>;
}

fn take<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset.checked_add(N).filter(|&end| end <= data.len());
    match end {
        Some(end) => {
            let mut out = [0u8; N];
            out.copy_from_slice(&data[offset..end]);
            Ok(out)
        }
        None => Err(MachoError::OutOfBoundsOffset {
            offset: offset as u64,
            len: N as u64,
            size: data.len() as u64,
        }),
    }
}

impl EndianRead for [u8] {
    fn read_u16(&self, offset: usize, endian: Endianness) -> Result<u16> {
        let bytes = take::<2>(self, offset)?;
        Ok(match endian {
            Endianness::Little => u16::from_le_bytes(bytes),
            Endianness::Big => u16::from_be_bytes(bytes),
        })
    }

    fn read_u32(&self, offset: usize, endian: Endianness) -> Result<u32> {
        let bytes = take::<4>(self, offset)?;
        Ok(match endian {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        })
    }

    fn read_u64(&self, offset: usize, endian: Endianness) -> Result<u64> {
        let bytes = take::<8>(self, offset)?;
        Ok(match endian {
            Endianness::Little => u64::from_le_bytes(bytes),
            Endianness::Big => u64::from_be_bytes(bytes),
        })
    }
}

/// Read an address-sized word: 4 bytes on 32-bit, 8 on 64-bit
pub fn read_word(data: &[u8], offset: usize, bitness: Bitness, endian: Endianness) -> Result<u64> {
    match bitness {
        Bitness::Bits32 => data.read_u32(offset, endian).map(u64::from),
        Bitness::Bits64 => data.read_u64(offset, endian),
    }
}

/// Encode an integer into `width` bytes in the given byte order
pub fn encode_uint(value: u64, width: usize, endian: Endianness) -> Vec<u8> {
    match (width, endian) {
        (1, _) => vec![value as u8],
        (2, Endianness::Little) => (value as u16).to_le_bytes().to_vec(),
        (2, Endianness::Big) => (value as u16).to_be_bytes().to_vec(),
        (4, Endianness::Little) => (value as u32).to_le_bytes().to_vec(),
        (4, Endianness::Big) => (value as u32).to_be_bytes().to_vec(),
        (_, Endianness::Little) => value.to_le_bytes().to_vec(),
        (_, Endianness::Big) => value.to_be_bytes().to_vec(),
    }
}

/// Null-terminated string starting at `offset`.
///
/// Returns the string and whether a terminator was found before the end of `data`.
pub fn read_cstring(data: &[u8], offset: usize) -> Result<(String, bool)> {
    if offset >= data.len() {
        return Err(MachoError::OutOfBoundsOffset {
            offset: offset as u64,
            len: 1,
            size: data.len() as u64,
        });
    }
    let slice = &data[offset..];
    match memchr::memchr(0, slice) {
        Some(end) => Ok((String::from_utf8_lossy(&slice[..end]).into_owned(), true)),
        None => Ok((String::from_utf8_lossy(slice).into_owned(), false)),
    }
}

/// Decode a fixed 16-byte name field (segname/sectname), stopping at the first NUL
pub fn fixed_name(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encode a name into a NUL-padded 16-byte field; returns None when it does not fit
pub fn encode_fixed_name(name: &str) -> Option<[u8; 16]> {
    let raw = name.as_bytes();
    if raw.len() > 16 || raw.contains(&0) {
        return None;
    }
    let mut out = [0u8; 16];
    out[..raw.len()].copy_from_slice(raw);
    Some(out)
}

/// Check if a range is within bounds
pub fn check_bounds(offset: u64, size: u64, data_len: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= data_len => Ok(()),
        _ => Err(MachoError::OutOfBoundsOffset {
            offset,
            len: size,
            size: data_len,
        }),
    }
}
