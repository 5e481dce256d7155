//! Metadata page codec.
//!
//! The metadata page lives at page 0 and records where the freelist is
//! stored, plus the page size the file was created with so that a reopen
//! with a different page size can be rejected instead of silently
//! misreading every page offset.

use crate::error::{EngineError, Result};
use crate::pager::{read_u64, write_u64, PageCodec, PageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Page id where the freelist is persisted.
    pub freelist: PageId,
    /// Page size the backing file was created with.
    pub page_size: u64,
}

impl PageCodec for Meta {
    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        write_u64(buf, 0, self.freelist.0)?;
        write_u64(buf, 8, self.page_size)?;
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let freelist = PageId(read_u64(buf, 0)?);
        let page_size = read_u64(buf, 8)?;
        if freelist.0 == 0 {
            return Err(EngineError::CorruptPage(
                "metadata points the freelist at the metadata page".into(),
            ));
        }
        if page_size == 0 {
            return Err(EngineError::CorruptPage(
                "metadata records a zero page size".into(),
            ));
        }
        Ok(Self {
            freelist,
            page_size,
        })
    }
}
