//! Low-level ZIP archive parser.
//!
//! Reads the End of Central Directory (and its ZIP64 counterpart when the
//! classic record is saturated), then the Central Directory, from any source
//! implementing [`ReadAt`]. Local File Headers are only touched to locate the
//! start of an entry's payload.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser, generic over the data source.
///
/// Typically used through [`ZipArchive`](super::ZipArchive).
pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Locate and parse the End of Central Directory record.
    ///
    /// Returns the record together with its absolute offset. The tail of the
    /// file is tried first (no comment); otherwise the last 64 KiB + 22 bytes
    /// are scanned backwards for a signature whose comment length matches the
    /// bytes that follow it.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let record = EndOfCentralDirectory::SIZE as u64;
        if self.size < record {
            bail!("Not a valid ZIP file: {} bytes is too small", self.size);
        }

        let tail_offset = self.size - record;
        let mut tail = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_exact_at(tail_offset, &mut tail).await?;
        if &tail[0..4] == EndOfCentralDirectory::SIGNATURE && tail[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&tail)?, tail_offset));
        }

        let window = (MAX_COMMENT_SIZE + record).min(self.size);
        let window_start = self.size - window;
        let mut buf = vec![0u8; window as usize];
        self.read_exact_at(window_start, &mut buf).await?;

        let last = buf.len() - EndOfCentralDirectory::SIZE;
        for i in (0..=last).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, window_start + i as u64));
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory via the locator that sits
    /// immediately before the classic record.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .context("ZIP64 End of Central Directory Locator is missing")?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_exact_at(locator_offset, &mut locator_buf).await?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries recorded in the Central Directory.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size {
            bail!(
                "Central Directory ({} bytes at {}) extends past end of archive",
                cd_size,
                cd_offset
            );
        }

        // One read for the whole directory keeps remote sources to a single request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut cursor = Cursor::new(cd_data.as_slice());
        let mut entries = Vec::with_capacity(total_entries.min(u16::MAX as u64) as usize);
        for index in 0..total_entries {
            let entry = parse_cdfh(&mut cursor)
                .with_context(|| format!("Central Directory entry #{}", index))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Offset of the first payload byte of `entry`.
    ///
    /// The local header's name and extra lengths can differ from the central
    /// directory copy, so they are read from the local header itself.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = [0u8; LFH_SIZE];
        self.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let mut cursor = Cursor::new(&lfh_buf[26..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;
        if data_offset.saturating_add(entry.compressed_size) > self.size {
            bail!("Data of {} extends past end of archive", entry.file_name);
        }

        Ok(data_offset)
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .reader
                .read_at(offset + filled as u64, &mut buf[filled..])
                .await?;
            if n == 0 {
                bail!(
                    "Unexpected end of archive reading {} bytes at offset {}",
                    buf.len(),
                    offset
                );
            }
            filled += n;
        }
        Ok(())
    }
}

/// Parse one Central Directory File Header at the cursor position.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let lfh_offset = cursor.read_u32::<LittleEndian>()?;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();
    let is_directory = file_name.ends_with('/');

    let mut extra = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra)?;
    let wide = resolve_zip64(&extra, uncompressed_size, compressed_size, lfh_offset)?;

    cursor.set_position(cursor.position() + file_comment_length as u64);

    Ok(ZipFileEntry {
        file_name,
        version_needed,
        flags,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size: wide.compressed_size,
        uncompressed_size: wide.uncompressed_size,
        crc32,
        lfh_offset: wide.lfh_offset,
        last_mod_time,
        last_mod_date,
        is_directory,
    })
}

struct WideFields {
    uncompressed_size: u64,
    compressed_size: u64,
    lfh_offset: u64,
}

/// Widen the saturated 32-bit fields from the ZIP64 extra block.
///
/// The block only carries the fields whose 32-bit counterpart is
/// `0xFFFFFFFF`, in the fixed order uncompressed, compressed, offset.
fn resolve_zip64(
    extra: &[u8],
    uncompressed_size: u32,
    compressed_size: u32,
    lfh_offset: u32,
) -> Result<WideFields> {
    let mut wide = WideFields {
        uncompressed_size: uncompressed_size as u64,
        compressed_size: compressed_size as u64,
        lfh_offset: lfh_offset as u64,
    };

    let mut cursor = Cursor::new(extra);
    while cursor.position() + 4 <= extra.len() as u64 {
        let tag = cursor.read_u16::<LittleEndian>()?;
        let len = cursor.read_u16::<LittleEndian>()? as u64;
        let end = cursor.position() + len;
        if end > extra.len() as u64 {
            bail!("Extra field 0x{:04x} overruns its block", tag);
        }

        if tag == ZIP64_EXTRA_TAG {
            if uncompressed_size == ZIP64_SENTINEL_U32 && cursor.position() + 8 <= end {
                wide.uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == ZIP64_SENTINEL_U32 && cursor.position() + 8 <= end {
                wide.compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == ZIP64_SENTINEL_U32 && cursor.position() + 8 <= end {
                wide.lfh_offset = cursor.read_u64::<LittleEndian>()?;
            }
        }
        cursor.set_position(end);
    }

    Ok(wide)
}
