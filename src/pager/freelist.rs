//! Page allocator tracking which page ids are in use vs. reusable.
//!
//! Released ids are handed out again (most recently released first) before
//! the high-water mark grows. The allocator does not detect use-after-
//! release; callers must release only pages they have just superseded.

use crate::error::{EngineError, Result};
use crate::pager::{read_u64, write_u64, PageCodec, PageId};

/// Byte cost of the `allocated` and `count` fields.
const FREELIST_HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Freelist {
    /// Monotonic high-water page id. Page 0 is reserved for metadata and is
    /// never handed out.
    allocated: u64,
    /// Reusable ids, popped last-in-first-out.
    released: Vec<PageId>,
}

impl Freelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a page id, reusing a released one before growing the
    /// high-water mark.
    pub fn allocate(&mut self) -> PageId {
        if let Some(id) = self.released.pop() {
            return id;
        }
        self.allocated += 1;
        PageId(self.allocated)
    }

    /// Marks `id` as reusable. The page must no longer be referenced by any
    /// live node, collection header, or metadata.
    pub fn release(&mut self, id: PageId) {
        self.released.push(id);
    }

    pub fn high_water(&self) -> u64 {
        self.allocated
    }

    pub fn released(&self) -> &[PageId] {
        &self.released
    }
}

impl PageCodec for Freelist {
    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        let needed = FREELIST_HEADER_SIZE + self.released.len() * 8;
        if needed > buf.len() {
            return Err(EngineError::InvalidArgument(format!(
                "freelist with {} released pages does not fit in one page",
                self.released.len()
            )));
        }
        write_u64(buf, 0, self.allocated)?;
        write_u64(buf, 8, self.released.len() as u64)?;
        for (i, id) in self.released.iter().enumerate() {
            write_u64(buf, FREELIST_HEADER_SIZE + i * 8, id.0)?;
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let allocated = read_u64(buf, 0)?;
        let count = read_u64(buf, 8)?;
        let end = count
            .checked_mul(8)
            .and_then(|len| len.checked_add(FREELIST_HEADER_SIZE as u64))
            .ok_or_else(|| EngineError::CorruptPage("freelist count overflow".into()))?;
        if end > buf.len() as u64 {
            return Err(EngineError::CorruptPage(format!(
                "freelist count {count} reads past the page boundary"
            )));
        }
        let count = count as usize;
        let mut released = Vec::with_capacity(count);
        for i in 0..count {
            released.push(PageId(read_u64(buf, FREELIST_HEADER_SIZE + i * 8)?));
        }
        Ok(Self {
            allocated,
            released,
        })
    }
}
