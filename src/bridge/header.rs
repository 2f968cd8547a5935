//! Synthesis of the single-entry container header that precedes the raw
//! payload on the engine's input.

use byteorder::{ByteOrder, LittleEndian};

use crate::zip::{
    EntryMetadata, GP_DATA_DESCRIPTOR, LFH_SIGNATURE, LFH_SIZE, ZIP64_EXTRA_TAG,
    ZIP64_SENTINEL_U32,
};

/// Placeholder file name written into every synthesized header
pub const PLACEHOLDER_NAME: u8 = b'A';

/// ZIP64 extension block: tag (2) + length (2) + two 64-bit sizes
pub const ZIP64_EXTRA_LEN: usize = 20;

const ZIP64_PAYLOAD_LEN: u16 = 16;

/// Build the local file header describing `meta`.
///
/// The data-descriptor flag is cleared because the sizes are written
/// directly. When either size does not fit in 32 bits both size fields
/// carry the sentinel and a ZIP64 block with the true sizes follows the
/// placeholder name.
pub fn synthesize_header(meta: &EntryMetadata) -> Vec<u8> {
    let zip64 = meta.needs_zip64();
    let extra_len = if zip64 { ZIP64_EXTRA_LEN } else { 0 };
    let mut header = vec![0u8; LFH_SIZE + 1 + extra_len];

    let (compressed, uncompressed) = if zip64 {
        (ZIP64_SENTINEL_U32, ZIP64_SENTINEL_U32)
    } else {
        (meta.compressed_size as u32, meta.uncompressed_size as u32)
    };

    header[0..4].copy_from_slice(LFH_SIGNATURE);
    LittleEndian::write_u16(&mut header[4..6], meta.version_needed);
    LittleEndian::write_u16(&mut header[6..8], meta.flags & !GP_DATA_DESCRIPTOR);
    LittleEndian::write_u16(&mut header[8..10], meta.compression_method);
    LittleEndian::write_u16(&mut header[10..12], meta.last_mod_time);
    LittleEndian::write_u16(&mut header[12..14], meta.last_mod_date);
    LittleEndian::write_u32(&mut header[14..18], meta.crc32);
    LittleEndian::write_u32(&mut header[18..22], compressed);
    LittleEndian::write_u32(&mut header[22..26], uncompressed);
    LittleEndian::write_u16(&mut header[26..28], 1);
    LittleEndian::write_u16(&mut header[28..30], extra_len as u16);
    header[30] = PLACEHOLDER_NAME;

    if zip64 {
        LittleEndian::write_u16(&mut header[31..33], ZIP64_EXTRA_TAG);
        LittleEndian::write_u16(&mut header[33..35], ZIP64_PAYLOAD_LEN);
        write_u64_words(&mut header[35..43], meta.uncompressed_size);
        write_u64_words(&mut header[43..51], meta.compressed_size);
    }

    header
}

/// Write a 64-bit value as its low then high 32-bit little-endian words.
fn write_u64_words(buf: &mut [u8], value: u64) {
    let low = (value & 0xFFFF_FFFF) as u32;
    let high = (value >> 32) as u32;
    LittleEndian::write_u32(&mut buf[0..4], low);
    LittleEndian::write_u32(&mut buf[4..8], high);
}
