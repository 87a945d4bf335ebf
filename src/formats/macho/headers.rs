//! Mach-O header parsing and serialization

use crate::error::{MachoError, Result};
use crate::formats::macho::types::*;
use crate::formats::macho::utils::EndianRead;

/// Bit-width and byte order implied by a header magic.
///
/// The magic is the first four bytes read little-endian, so a little-endian
/// 64-bit slice reads as `MH_MAGIC_64` and a big-endian one as `MH_CIGAM_64`.
pub fn classify_magic(magic: u32) -> Option<(Bitness, Endianness)> {
    match magic {
        MH_MAGIC => Some((Bitness::Bits32, Endianness::Little)),
        MH_MAGIC_64 => Some((Bitness::Bits64, Endianness::Little)),
        MH_CIGAM => Some((Bitness::Bits32, Endianness::Big)),
        MH_CIGAM_64 => Some((Bitness::Bits64, Endianness::Big)),
        _ => None,
    }
}

/// Parse the fixed header at the start of a slice
pub fn parse_header(data: &[u8]) -> Result<Header> {
    let magic = data
        .read_u32(0, Endianness::Little)
        .map_err(|_| MachoError::malformed(0, "slice shorter than a magic number"))?;

    let (bitness, endian) = classify_magic(magic)
        .ok_or_else(|| MachoError::malformed(0, format!("unrecognized magic {:#010x}", magic)))?;

    let header_size = bitness.header_size();
    if data.len() < header_size {
        return Err(MachoError::malformed(
            0,
            format!(
                "slice of {} bytes is shorter than the {}-byte header",
                data.len(),
                header_size
            ),
        ));
    }

    let reserved = match bitness {
        Bitness::Bits64 => Some(data.read_u32(28, endian)?),
        Bitness::Bits32 => None,
    };

    Ok(Header {
        magic,
        cpu_type: data.read_u32(4, endian)?,
        cpu_subtype: data.read_u32(8, endian)?,
        file_type: data.read_u32(12, endian)?,
        ncmds: data.read_u32(16, endian)?,
        sizeofcmds: data.read_u32(20, endian)?,
        flags: data.read_u32(24, endian)?,
        reserved,
        bitness,
        endianness: endian,
    })
}

/// Encode a header back to its on-disk bytes
pub fn serialize_header(header: &Header) -> Vec<u8> {
    let put = |v: u32| match header.endianness {
        Endianness::Little => v.to_le_bytes(),
        Endianness::Big => v.to_be_bytes(),
    };

    let mut out = Vec::with_capacity(header.size());
    out.extend_from_slice(&header.magic.to_le_bytes());
    out.extend_from_slice(&put(header.cpu_type));
    out.extend_from_slice(&put(header.cpu_subtype));
    out.extend_from_slice(&put(header.file_type));
    out.extend_from_slice(&put(header.ncmds));
    out.extend_from_slice(&put(header.sizeofcmds));
    out.extend_from_slice(&put(header.flags));
    if header.bitness == Bitness::Bits64 {
        out.extend_from_slice(&put(header.reserved.unwrap_or(0)));
    }
    out
}
