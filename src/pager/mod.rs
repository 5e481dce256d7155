//! Fixed-size block I/O over a seekable byte medium.
//!
//! The page store turns page identifiers into byte offsets and reads or
//! writes whole pages; there is no caching and no partial-page I/O. Every
//! persistent structure in the engine (metadata, freelist, collection
//! headers, tree nodes) occupies exactly one page.

pub mod freelist;
pub mod meta;

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{EngineError, Result};

/// Identifier of one fixed-size page of the backing medium.
///
/// Page ids double as the engine's only pointer type: node-to-child and
/// node-to-parent relationships are page ids, not in-memory references.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page id of the metadata page. Also serves as the "no parent" sentinel on
/// tree nodes, since no node can ever live on the metadata page.
pub const META_PAGE_ID: PageId = PageId(0);

/// A structure that serializes into exactly one page.
///
/// `encode` receives a zero-filled buffer of the engine's page size;
/// `decode` must bounds-check every offset and length against the buffer
/// and fail with [`EngineError::CorruptPage`] rather than reading out of
/// bounds.
pub trait PageCodec: Sized {
    fn encode(&self, buf: &mut [u8]) -> Result<()>;
    fn decode(buf: &[u8]) -> Result<Self>;
}

/// One in-memory page buffer, the unit of all I/O.
#[derive(Debug)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

/// Fixed-size block I/O over any seekable medium.
#[derive(Debug)]
pub struct PageStore<D> {
    medium: D,
    page_size: usize,
}

impl<D: Read + Write + Seek> PageStore<D> {
    pub fn new(medium: D, page_size: usize) -> Self {
        Self { medium, page_size }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns a zero-filled page buffer addressed at `id`.
    pub fn allocate_buf(&self, id: PageId) -> Page {
        Page {
            id,
            data: vec![0; self.page_size],
        }
    }

    /// Reads the whole page at `id`. A short read or seek failure surfaces
    /// as an I/O error.
    pub fn read_page(&mut self, id: PageId) -> Result<Page> {
        let mut page = self.allocate_buf(id);
        self.medium.seek(SeekFrom::Start(self.offset_of(id)?))?;
        self.medium.read_exact(&mut page.data)?;
        Ok(page)
    }

    /// Writes the whole page at its id.
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        if page.data.len() != self.page_size {
            return Err(EngineError::InvalidArgument(format!(
                "page buffer is {} bytes, expected {}",
                page.data.len(),
                self.page_size
            )));
        }
        self.medium.seek(SeekFrom::Start(self.offset_of(page.id)?))?;
        self.medium.write_all(&page.data)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.medium.flush()?;
        Ok(())
    }

    fn offset_of(&self, id: PageId) -> Result<u64> {
        id.0.checked_mul(self.page_size as u64).ok_or_else(|| {
            EngineError::InvalidArgument(format!("page id {id} overflows the medium"))
        })
    }
}

pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    buf.get(offset)
        .copied()
        .ok_or_else(|| EngineError::CorruptPage(format!("u8 read at {offset} outside page")))
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let end = offset
        .checked_add(2)
        .ok_or_else(|| EngineError::CorruptPage("u16 read offset overflow".into()))?;
    let slice = buf
        .get(offset..end)
        .ok_or_else(|| EngineError::CorruptPage(format!("u16 read at {offset} outside page")))?;
    let bytes: [u8; 2] = slice
        .try_into()
        .map_err(|_| EngineError::CorruptPage("failed to read u16 from page".into()))?;
    Ok(u16::from_le_bytes(bytes))
}

pub(crate) fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let end = offset
        .checked_add(8)
        .ok_or_else(|| EngineError::CorruptPage("u64 read offset overflow".into()))?;
    let slice = buf
        .get(offset..end)
        .ok_or_else(|| EngineError::CorruptPage(format!("u64 read at {offset} outside page")))?;
    let bytes: [u8; 8] = slice
        .try_into()
        .map_err(|_| EngineError::CorruptPage("failed to read u64 from page".into()))?;
    Ok(u64::from_le_bytes(bytes))
}

pub(crate) fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<()> {
    let slot = buf.get_mut(offset..offset + 2).ok_or_else(|| {
        EngineError::InvalidArgument(format!("u16 write at {offset} outside page"))
    })?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

pub(crate) fn write_u64(buf: &mut [u8], offset: usize, value: u64) -> Result<()> {
    let slot = buf.get_mut(offset..offset + 8).ok_or_else(|| {
        EngineError::InvalidArgument(format!("u64 write at {offset} outside page"))
    })?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}
