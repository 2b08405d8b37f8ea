use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ElfError;

/// An owned, immutable byte image of an object file.
///
/// All downstream reads go through [`FileMap::read_at`], which checks the
/// requested range against the image with overflow-safe arithmetic. The
/// backing storage is released exactly once, when the map is dropped.
#[derive(Debug)]
pub struct FileMap {
    path: PathBuf,
    data: Vec<u8>,
}

impl FileMap {
    /// Reads the file at `path` into a read-only image.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElfError> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;
        log::info!("mapped {} ({} bytes)", path.display(), data.len());
        Ok(Self { path, data })
    }

    /// Wraps an in-memory buffer, mainly for tests and embedded callers.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            path: PathBuf::new(),
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole image.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Borrows `n` bytes starting at `offset`, failing with `OutOfBounds`
    /// when the range does not lie within the image.
    pub fn read_at(&self, offset: u64, n: u64) -> Result<&[u8], ElfError> {
        match offset.checked_add(n) {
            Some(end) if end <= self.len() => Ok(&self.data[offset as usize..end as usize]),
            _ => Err(ElfError::OutOfBounds { offset, len: n }),
        }
    }
}
