//! On-flash structures.
//!
//! All fields are little-endian and packed.
//!
//! ```text
//! Anchor (16 bytes)
//! +------+-----+-----+-------+---------------+-----------+
//! | DCDR | maj | min | rsvd  | anchor_offset | root_base |
//! +------+-----+-----+-------+---------------+-----------+
//!   0..4   4     5     6..8     8..12          12..16
//!
//! Directory header (8 bytes), followed by (name, pointer) pairs
//! +------+---------+------+
//! | DDIR | size[3] | rsvd |
//! +------+---------+------+
//!
//! Pointer record, (size + 1) * 8 bytes
//! +------+------+--------------------
//! | type | size | variant payload ...
//! +------+------+--------------------
//! ```

use crate::{DcDirError, DcDirResult};

pub const ANCHOR_SIGNATURE: &[u8; 4] = b"DCDR";
pub const DIRECTORY_SIGNATURE: &[u8; 4] = b"DDIR";
pub const SUPPORTED_MAJOR_VERSION: u8 = 1;

pub const ANCHOR_SIZE: usize = 16;
pub const DIRECTORY_HEADER_SIZE: usize = 8;
pub const NAME_FIELD_WIDTH: usize = 8;

/// Directories and records are sized in units of this many bytes.
pub const SIZE_UNIT: usize = 8;

pub const VARIANT_OFFSET24_LENGTH24: u8 = 0x1;
pub const VARIANT_BASE32_OFFSET32_LENGTH32: u8 = 0x2;

const TYPE_DIRECTORY_BIT: u8 = 0x1;

fn u24(bytes: &[u8]) -> u32 {
    u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
}

fn u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn put_u24(out: &mut [u8], value: u32) {
    out.copy_from_slice(&value.to_le_bytes()[..3]);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Anchor {
    pub signature: [u8; 4],
    pub major_version: u8,
    pub minor_version: u8,
    pub anchor_offset: u32,
    pub root_base: u32,
}

impl Anchor {
    pub fn new(anchor_offset: u32, root_base: u32) -> Self {
        Self {
            signature: *ANCHOR_SIGNATURE,
            major_version: SUPPORTED_MAJOR_VERSION,
            minor_version: 0,
            anchor_offset,
            root_base,
        }
    }

    pub fn from_bytes(data: &[u8; ANCHOR_SIZE]) -> Self {
        Self {
            signature: [data[0], data[1], data[2], data[3]],
            major_version: data[4],
            minor_version: data[5],
            anchor_offset: u32_le(&data[8..12]),
            root_base: u32_le(&data[12..16]),
        }
    }

    pub fn to_bytes(&self) -> [u8; ANCHOR_SIZE] {
        let mut out = [0u8; ANCHOR_SIZE];
        out[0..4].copy_from_slice(&self.signature);
        out[4] = self.major_version;
        out[5] = self.minor_version;
        out[8..12].copy_from_slice(&self.anchor_offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.root_base.to_le_bytes());
        out
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DirectoryHeader {
    pub signature: [u8; 4],
    /// Total size of the directory in [`SIZE_UNIT`]s, minus one. 24 bits.
    pub size: u32,
}

impl DirectoryHeader {
    /// Header for a directory whose body is `body_len` bytes long.
    /// `body_len` is rounded up to a whole unit.
    pub fn for_body(body_len: usize) -> Self {
        let units = (DIRECTORY_HEADER_SIZE + body_len).div_ceil(SIZE_UNIT);
        Self {
            signature: *DIRECTORY_SIGNATURE,
            size: (units as u32).saturating_sub(1) & 0x00FF_FFFF,
        }
    }

    pub fn from_bytes(data: &[u8; DIRECTORY_HEADER_SIZE]) -> Self {
        Self {
            signature: [data[0], data[1], data[2], data[3]],
            size: u24(&data[4..7]),
        }
    }

    pub fn to_bytes(&self) -> [u8; DIRECTORY_HEADER_SIZE] {
        let mut out = [0u8; DIRECTORY_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.signature);
        put_u24(&mut out[4..7], self.size);
        out
    }

    /// Length of the pointer area following the header.
    pub fn body_len(&self) -> DcDirResult<usize> {
        ((self.size as usize) + 1)
            .checked_mul(SIZE_UNIT)
            .and_then(|total| total.checked_sub(DIRECTORY_HEADER_SIZE))
            .ok_or(DcDirError::MalformedHeader)
    }
}

/// Geometry of a pointer record, by encoding variant.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Pointer {
    /// Offset and length relative to the parent, 24 bits each.
    Offset24Length24 { offset: u32, length_minus_one: u32 },
    /// Like [`Pointer::Offset24Length24`] with 32-bit fields, plus a new
    /// relocation base for everything below it.
    Base32Offset32Length32 {
        base: u32,
        offset: u32,
        length_minus_one: u32,
    },
    /// A variant this reader does not know. Lookups can still step over
    /// it, but it cannot be resolved.
    Unknown { variant: u8 },
}

/// A pointer record, copied out of the directory it was found in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PointerRecord {
    pub directory: bool,
    /// Record length in units, minus one.
    pub size: u8,
    pub pointer: Pointer,
}

impl PointerRecord {
    pub fn new(directory: bool, pointer: Pointer) -> Self {
        let size = match pointer {
            Pointer::Base32Offset32Length32 { .. } => 1,
            _ => 0,
        };
        Self {
            directory,
            size,
            pointer,
        }
    }

    /// Encoded length of a record whose size field is `size`.
    pub fn encoded_len(size: u8) -> usize {
        (usize::from(size) + 1) * SIZE_UNIT
    }

    pub fn variant(&self) -> u8 {
        match self.pointer {
            Pointer::Offset24Length24 { .. } => VARIANT_OFFSET24_LENGTH24,
            Pointer::Base32Offset32Length32 { .. } => VARIANT_BASE32_OFFSET32_LENGTH32,
            Pointer::Unknown { variant } => variant,
        }
    }

    /// Decode a complete record. `data` must be exactly
    /// [`encoded_len`](Self::encoded_len) bytes.
    pub fn from_bytes(data: &[u8]) -> DcDirResult<Self> {
        if data.len() < SIZE_UNIT {
            return Err(DcDirError::Truncated { at: data.len() });
        }

        let kind = data[0];
        let directory = kind & TYPE_DIRECTORY_BIT != 0;
        let variant = kind >> 1;
        let size = data[1];

        let pointer = match variant {
            VARIANT_OFFSET24_LENGTH24 => Pointer::Offset24Length24 {
                offset: u24(&data[2..5]),
                length_minus_one: u24(&data[5..8]),
            },
            VARIANT_BASE32_OFFSET32_LENGTH32 => {
                if data.len() < 16 {
                    return Err(DcDirError::RecordTooShort {
                        variant,
                        len: data.len(),
                    });
                }
                Pointer::Base32Offset32Length32 {
                    base: u32_le(&data[4..8]),
                    offset: u32_le(&data[8..12]),
                    length_minus_one: u32_le(&data[12..16]),
                }
            }
            variant => Pointer::Unknown { variant },
        };

        Ok(Self {
            directory,
            size,
            pointer,
        })
    }

    /// Append the encoded record to `out`. Unknown variants are written
    /// as a bare header padded to the record length.
    pub fn write_to(&self, out: &mut alloc::vec::Vec<u8>) {
        let start = out.len();
        out.resize(start + Self::encoded_len(self.size), 0);
        let record = &mut out[start..];
        record[0] = (self.variant() << 1) | u8::from(self.directory);
        record[1] = self.size;
        match self.pointer {
            Pointer::Offset24Length24 {
                offset,
                length_minus_one,
            } => {
                put_u24(&mut record[2..5], offset);
                put_u24(&mut record[5..8], length_minus_one);
            }
            Pointer::Base32Offset32Length32 {
                base,
                offset,
                length_minus_one,
            } => {
                record[4..8].copy_from_slice(&base.to_le_bytes());
                record[8..12].copy_from_slice(&offset.to_le_bytes());
                record[12..16].copy_from_slice(&length_minus_one.to_le_bytes());
            }
            Pointer::Unknown { .. } => {}
        }
    }
}

/// Pad or cut a name to the on-flash field width.
pub fn name_field(name: &str) -> [u8; NAME_FIELD_WIDTH] {
    let mut field = [0u8; NAME_FIELD_WIDTH];
    let len = name.len().min(NAME_FIELD_WIDTH);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn test_anchor_layout() {
        let bytes = Anchor::new(0x1000, 0x2000).to_bytes();
        assert_eq!(&bytes[0..4], b"DCDR");
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[8..12], &[0x00, 0x10, 0x00, 0x00]);
        assert_eq!(&bytes[12..16], &[0x00, 0x20, 0x00, 0x00]);
        assert_eq!(Anchor::from_bytes(&bytes), Anchor::new(0x1000, 0x2000));
    }

    #[test]
    fn test_directory_header_size() {
        let header = DirectoryHeader::for_body(40);
        assert_eq!(header.size, 5);
        assert_eq!(header.body_len(), Ok(40));

        let bytes = header.to_bytes();
        assert_eq!(&bytes[4..7], &[5, 0, 0]);
        assert_eq!(DirectoryHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_empty_directory_has_empty_body() {
        let header = DirectoryHeader::for_body(0);
        assert_eq!(header.size, 0);
        assert_eq!(header.body_len(), Ok(0));
    }

    #[test]
    fn test_decode_offset24_record() {
        let data = [0x02, 0x00, 0x50, 0x00, 0x00, 0xFF, 0x01, 0x00];
        let record = PointerRecord::from_bytes(&data).unwrap();
        assert!(!record.directory);
        assert_eq!(
            record.pointer,
            Pointer::Offset24Length24 {
                offset: 0x50,
                length_minus_one: 0x1FF
            }
        );
    }

    #[test]
    fn test_decode_base32_record() {
        let record = PointerRecord::new(
            true,
            Pointer::Base32Offset32Length32 {
                base: 0x2000,
                offset: 0x100,
                length_minus_one: 0xFFF,
            },
        );
        let mut out = Vec::new();
        record.write_to(&mut out);
        assert_eq!(out.len(), 16);
        assert_eq!(out[0], 0x05);
        assert_eq!(PointerRecord::from_bytes(&out), Ok(record));
    }

    #[test]
    fn test_base32_record_with_short_size() {
        // Claims variant 2 but only one unit long.
        let data = [0x05, 0x00, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            PointerRecord::from_bytes(&data),
            Err(DcDirError::RecordTooShort { variant: 2, len: 8 })
        );
    }

    #[test]
    fn test_unknown_variant_decodes() {
        let data = [0x07, 0x00, 0, 0, 0, 0, 0, 0];
        let record = PointerRecord::from_bytes(&data).unwrap();
        assert!(record.directory);
        assert_eq!(record.pointer, Pointer::Unknown { variant: 3 });
    }

    #[test]
    fn test_name_field() {
        assert_eq!(&name_field("FW"), b"FW\0\0\0\0\0\0");
        assert_eq!(&name_field("VBLOCK_A_TOO_LONG"), b"VBLOCK_A");
    }
}
