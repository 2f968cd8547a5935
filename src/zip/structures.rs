use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Deflate64,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    /// Short human-readable name, as shown in verbose listings
    pub fn name(&self) -> String {
        match self {
            CompressionMethod::Stored => "Stored".to_string(),
            CompressionMethod::Deflate => "Defl:N".to_string(),
            CompressionMethod::Deflate64 => "Defl64".to_string(),
            CompressionMethod::Unknown(v) => format!("Unk:{:03}", v),
        }
    }
}

/// General purpose flag: CRC-32 and sizes follow the data in a data descriptor
pub const GP_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Extra field tag of the ZIP64 extended information block
pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// Value stored in 32-bit size/offset fields when the real value lives in ZIP64 records
pub const ZIP64_SENTINEL_U32: u32 = 0xFFFF_FFFF;

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Whether any field is saturated and the ZIP64 records must be consulted
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == ZIP64_SENTINEL_U32
            || self.cd_offset == ZIP64_SENTINEL_U32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory Locator");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Snapshot of the fields needed to re-frame this entry's payload.
    ///
    /// The returned value is an independent copy: callers that need to
    /// present the entry differently (for example with another method code)
    /// adjust the copy instead of the shared entry.
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            compression_method: self.compression_method.as_u16(),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            last_mod_time: self.last_mod_time,
            last_mod_date: self.last_mod_date,
            version_needed: self.version_needed,
            flags: self.flags,
        }
    }
}

/// Immutable per-entry metadata consumed by the decompression bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub compression_method: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub version_needed: u16,
    pub flags: u16,
}

impl EntryMetadata {
    /// Whether either size needs the ZIP64 extension block
    pub fn needs_zip64(&self) -> bool {
        const FOUR_GIB: u64 = 1 << 32;
        self.compressed_size >= FOUR_GIB || self.uncompressed_size >= FOUR_GIB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ZipFileEntry {
        ZipFileEntry {
            file_name: "movie.mov".to_string(),
            version_needed: 21,
            flags: GP_DATA_DESCRIPTOR,
            compression_method: CompressionMethod::Deflate64,
            compressed_size: 120,
            uncompressed_size: 220,
            crc32: 0xDEADBEEF,
            lfh_offset: 0,
            // 2021-06-15 13:45:30
            last_mod_time: (13 << 11) | (45 << 5) | 15,
            last_mod_date: (41 << 9) | (6 << 5) | 15,
            is_directory: false,
        }
    }

    #[test]
    fn compression_method_codes() {
        for code in [0u16, 8, 9, 12, 14, 93] {
            assert_eq!(CompressionMethod::from_u16(code).as_u16(), code);
        }
        assert_eq!(CompressionMethod::from_u16(9), CompressionMethod::Deflate64);
        assert_eq!(CompressionMethod::from_u16(12), CompressionMethod::Unknown(12));
    }

    #[test]
    fn dos_timestamp_decoding() {
        let e = entry();
        assert_eq!(e.mod_date(), (2021, 6, 15));
        assert_eq!(e.mod_time(), (13, 45, 30));
    }

    #[test]
    fn metadata_is_a_detached_copy() {
        let mut e = entry();
        let meta = e.metadata();
        e.crc32 = 0;
        e.compression_method = CompressionMethod::Stored;

        assert_eq!(meta.crc32, 0xDEADBEEF);
        assert_eq!(meta.compression_method, 9);
        assert_eq!(meta.flags, GP_DATA_DESCRIPTOR);
        assert!(!meta.needs_zip64());
    }

    #[test]
    fn zip64_threshold() {
        let mut meta = entry().metadata();
        meta.uncompressed_size = (1 << 32) - 1;
        assert!(!meta.needs_zip64());
        meta.compressed_size = 1 << 32;
        assert!(meta.needs_zip64());
    }

    #[test]
    fn eocd_rejects_bad_signature() {
        let mut data = vec![0u8; EndOfCentralDirectory::SIZE];
        data[0..4].copy_from_slice(b"PK\x01\x02");
        assert!(EndOfCentralDirectory::from_bytes(&data).is_err());

        data[0..4].copy_from_slice(EndOfCentralDirectory::SIGNATURE);
        data[8..10].copy_from_slice(&0xFFFFu16.to_le_bytes());
        let eocd = EndOfCentralDirectory::from_bytes(&data).unwrap();
        assert!(eocd.is_zip64());
    }
}
