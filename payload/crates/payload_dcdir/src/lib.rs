//! Reader for the DcDir flash directory format.
//!
//! A DcDir image starts with an [`Anchor`] at a well-known offset. The
//! anchor is immediately followed by the root directory. Each directory
//! is a header plus a packed list of `(name, pointer record)` pairs; a
//! record either points at a region of raw bytes or at a nested
//! directory.
//!
//! Lookups are linear scans over one directory. All scratch memory used
//! while scanning is released before a lookup returns, and everything
//! handed back to the caller is a copy.

#![no_std]
extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use log::error;
use payload_storage::StorageOps;

pub use error::*;
pub use layout::*;

mod error;
mod layout;

/// A directory node.
///
/// Pointers inside the node are resolved relative to `offset - base`,
/// the position the directory would have had without relocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DcDir {
    pub offset: u32,
    pub base: u32,
}

/// A resolved byte range on storage.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    pub offset: u32,
    pub size: u32,
}

/// One entry of a directory, as returned by [`DcDir::entries`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    pub name: [u8; NAME_FIELD_WIDTH],
    pub record: PointerRecord,
}

impl Entry {
    /// The name with trailing NUL padding removed.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_WIDTH);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl DcDir {
    /// Open the root directory through the anchor at `anchor_offset`.
    pub fn open_root<S: StorageOps + ?Sized>(
        storage: &mut S,
        anchor_offset: u32,
    ) -> DcDirResult<Self> {
        let mut raw = [0u8; ANCHOR_SIZE];
        storage.read(&mut raw, anchor_offset)?;
        let anchor = Anchor::from_bytes(&raw);

        if &anchor.signature != ANCHOR_SIGNATURE {
            error!("DcDir anchor signature mismatch.");
            return Err(DcDirError::AnchorSignature);
        }

        if anchor.major_version != SUPPORTED_MAJOR_VERSION {
            error!("Incompatible DcDir version {}.", anchor.major_version);
            return Err(DcDirError::Version(anchor.major_version));
        }

        if anchor.anchor_offset != anchor_offset {
            error!(
                "DcDir anchor offset mismatch. Expected {anchor_offset:#x}, found {:#x}.",
                anchor.anchor_offset
            );
            return Err(DcDirError::AnchorOffset {
                expected: anchor_offset,
                found: anchor.anchor_offset,
            });
        }

        Ok(Self {
            offset: anchor_offset.wrapping_add(ANCHOR_SIZE as u32),
            base: anchor.root_base,
        })
    }

    /// The offset pointers in this directory are relative to.
    pub fn unrelocated_offset(&self) -> u32 {
        self.offset.wrapping_sub(self.base)
    }

    /// Look up `name` and return a copy of its pointer record.
    ///
    /// Names are compared over the shorter of the name and the 8 byte
    /// name field, so a name longer than the field matches on its first
    /// 8 bytes.
    pub fn find<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        name: &str,
    ) -> DcDirResult<PointerRecord> {
        if name.is_empty() {
            return Err(DcDirError::InvalidName);
        }
        let key = &name.as_bytes()[..name.len().min(NAME_FIELD_WIDTH)];

        let body = self.read_body(storage, name)?;
        let mut found = Err(DcDirError::NotFound);
        for_each_pair(&body, |entry_name, record| {
            if entry_name[..key.len()] == *key {
                found = PointerRecord::from_bytes(record);
                false
            } else {
                true
            }
        })?;
        found
    }

    /// All entries of this directory in storage order.
    pub fn entries<S: StorageOps + ?Sized>(&self, storage: &mut S) -> DcDirResult<Vec<Entry>> {
        let body = self.read_body(storage, "")?;
        let mut entries = Vec::new();
        let mut failure = None;
        for_each_pair(&body, |entry_name, record| {
            match PointerRecord::from_bytes(record) {
                Ok(record) => {
                    let mut name = [0u8; NAME_FIELD_WIDTH];
                    name.copy_from_slice(entry_name);
                    entries.push(Entry { name, record });
                    true
                }
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(entries),
        }
    }

    /// Open the sub-directory `name`.
    pub fn open_dir<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        name: &str,
    ) -> DcDirResult<DcDir> {
        self.open_dir_raw(storage, name).map(|(dir, _)| dir)
    }

    /// Open the sub-directory `name` and also return the byte range it
    /// occupies.
    pub fn open_dir_raw<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        name: &str,
    ) -> DcDirResult<(DcDir, Region)> {
        let record = self.find(storage, name)?;
        if !record.directory {
            error!("DcDir region is not a directory.");
            return Err(DcDirError::NotDirectory);
        }

        let parent = self.unrelocated_offset();
        let (dir, size) = match record.pointer {
            Pointer::Offset24Length24 {
                offset,
                length_minus_one,
            } => (
                DcDir {
                    offset: parent.wrapping_add(offset),
                    base: 0,
                },
                length_minus_one.wrapping_add(1),
            ),
            Pointer::Base32Offset32Length32 {
                base,
                offset,
                length_minus_one,
            } => (
                DcDir {
                    offset: parent.wrapping_add(offset).wrapping_add(base),
                    base,
                },
                length_minus_one.wrapping_add(1),
            ),
            Pointer::Unknown { variant } => {
                error!("Unrecognized dcdir pointer type {variant}.");
                return Err(DcDirError::UnknownVariant(variant));
            }
        };

        Ok((
            dir,
            Region {
                offset: dir.offset,
                size,
            },
        ))
    }

    /// Resolve the region `name`. Unlike [`open_dir`](Self::open_dir) a
    /// region never introduces a relocation base.
    pub fn open_region<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        name: &str,
    ) -> DcDirResult<Region> {
        let record = self.find(storage, name)?;
        if record.directory {
            error!("DcDir region is a directory.");
            return Err(DcDirError::IsDirectory);
        }

        let parent = self.unrelocated_offset();
        match record.pointer {
            Pointer::Offset24Length24 {
                offset,
                length_minus_one,
            } => Ok(Region {
                offset: parent.wrapping_add(offset),
                size: length_minus_one.wrapping_add(1),
            }),
            Pointer::Base32Offset32Length32 {
                offset,
                length_minus_one,
                ..
            } => Ok(Region {
                offset: parent.wrapping_add(offset),
                size: length_minus_one.wrapping_add(1),
            }),
            Pointer::Unknown { variant } => {
                error!("Unrecognized dcdir pointer type {variant}.");
                Err(DcDirError::UnknownVariant(variant))
            }
        }
    }

    /// Follow a `/` separated list of directory names.
    pub fn open_dir_path<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        path: &str,
    ) -> DcDirResult<DcDir> {
        path.split('/')
            .filter(|component| !component.is_empty())
            .try_fold(*self, |dir, name| dir.open_dir(&mut *storage, name))
    }

    /// Resolve a region given as `dir/dir/region`.
    pub fn open_region_path<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        path: &str,
    ) -> DcDirResult<Region> {
        let (dirs, name) = path.rsplit_once('/').unwrap_or(("", path));
        self.open_dir_path(storage, dirs)?
            .open_region(storage, name)
    }

    /// Validate the header and read the pointer area into scratch memory.
    fn read_body<S: StorageOps + ?Sized>(
        &self,
        storage: &mut S,
        name: &str,
    ) -> DcDirResult<Vec<u8>> {
        let mut raw = [0u8; DIRECTORY_HEADER_SIZE];
        storage.read(&mut raw, self.offset)?;
        let header = DirectoryHeader::from_bytes(&raw);

        if &header.signature != DIRECTORY_SIGNATURE {
            error!("DcDir directory signature mismatch.");
            return Err(DcDirError::DirectorySignature);
        }

        let len = header.body_len().inspect_err(|_| {
            error!("Malformed DcDir directory found when looking up {name}.");
        })?;

        let mut body = Vec::new();
        body.try_reserve_exact(len)
            .map_err(|_| DcDirError::OutOfMemory(len))?;
        body.resize(len, 0);
        storage.read(&mut body, self.offset.wrapping_add(DIRECTORY_HEADER_SIZE as u32))?;
        Ok(body)
    }
}

/// Walk the `(name, record)` pairs of a directory body. `visit` returns
/// `false` to stop early. A pair that does not fit into the body is an
/// error, the walk never reads past its end.
fn for_each_pair<F>(body: &[u8], mut visit: F) -> DcDirResult<()>
where
    F: FnMut(&[u8], &[u8]) -> bool,
{
    let mut cursor = 0;
    while cursor < body.len() {
        let record_start = cursor + NAME_FIELD_WIDTH;
        let name = body
            .get(cursor..record_start)
            .ok_or(DcDirError::Truncated { at: cursor })?;
        let size = *body
            .get(record_start + 1)
            .ok_or(DcDirError::Truncated { at: record_start })?;
        let record_end = record_start + PointerRecord::encoded_len(size);
        let record = body.get(record_start..record_end).ok_or_else(|| {
            error!("DcDir pointer record at {record_start:#x} runs past the directory.");
            DcDirError::Truncated { at: record_start }
        })?;

        if !visit(name, record) {
            return Ok(());
        }
        cursor = record_end;
    }
    Ok(())
}
