//! The engine (data access layer).
//!
//! An [`Engine`] owns the page store, the freelist, and the metadata page
//! for its whole lifetime. It exposes generic (de)serialize-to-page
//! primitives used by collections and tree nodes; it keeps no directory of
//! collections and performs no internal locking. Callers must serialize
//! mutating operations (the `&mut` receivers make this natural in-process;
//! the advisory file lock keeps other processes out).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use crate::config::Options;
use crate::error::{EngineError, Result};
use crate::pager::freelist::Freelist;
use crate::pager::meta::Meta;
use crate::pager::{PageCodec, PageId, PageStore, META_PAGE_ID};

/// Disk-backed storage engine over a seekable byte medium.
///
/// Durability note: the freelist and metadata are persisted on [`sync`] and
/// [`close`], and page writes are not ordered or journaled. A crash in the
/// middle of a split or rebalance can leave unreferenced pages or an
/// inconsistent freelist behind; crash recovery is outside this engine's
/// contract.
///
/// [`sync`]: Engine::sync
/// [`close`]: Engine::close
#[derive(Debug)]
pub struct Engine<D> {
    store: PageStore<D>,
    freelist: Freelist,
    meta: Meta,
    options: Options,
}

impl Engine<File> {
    /// Creates a fresh engine backed by the file at `path`, truncating any
    /// existing content. Takes an exclusive advisory lock on the file.
    pub fn create_file<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.try_lock_exclusive()?;
        Self::create(file, options)
    }

    /// Opens an existing engine file. Takes an exclusive advisory lock on
    /// the file.
    pub fn open_file<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        file.try_lock_exclusive()?;
        Self::open(file, options)
    }
}

impl<D: Read + Write + Seek> Engine<D> {
    /// Initializes a fresh metadata page and freelist on `medium` and
    /// returns a ready engine.
    pub fn create(medium: D, options: Options) -> Result<Self> {
        if options.page_size < 64 {
            return Err(EngineError::InvalidArgument(format!(
                "page size {} is too small to hold the engine structures",
                options.page_size
            )));
        }
        // Node payload offsets are u16, page-relative.
        if options.page_size > 1 << 16 {
            return Err(EngineError::InvalidArgument(format!(
                "page size {} exceeds the 64 KiB node offset range",
                options.page_size
            )));
        }
        if !(options.split_fill > 0.0 && options.split_fill <= 1.0) {
            return Err(EngineError::InvalidArgument(format!(
                "split fill {} is outside (0, 1]",
                options.split_fill
            )));
        }
        if options.min_items == 0 {
            return Err(EngineError::InvalidArgument(
                "minimum fill must be at least one item".into(),
            ));
        }
        if let Some(max_items) = options.max_items {
            if max_items < 2 {
                return Err(EngineError::InvalidArgument(format!(
                    "item cap {max_items} leaves a split without a median"
                )));
            }
        }
        let store = PageStore::new(medium, options.page_size);
        let mut freelist = Freelist::new();
        let freelist_page = freelist.allocate();
        let meta = Meta {
            freelist: freelist_page,
            page_size: options.page_size as u64,
        };
        let mut engine = Self {
            store,
            freelist,
            meta,
            options,
        };
        engine.sync()?;
        debug!(page_size = engine.options.page_size, "engine created");
        Ok(engine)
    }

    /// Loads the metadata page, then the freelist it points at. Fails if
    /// the medium was created with a different page size.
    pub fn open(medium: D, options: Options) -> Result<Self> {
        let mut store = PageStore::new(medium, options.page_size);
        let meta_page = store.read_page(META_PAGE_ID)?;
        let meta = Meta::decode(&meta_page.data)?;
        if meta.page_size != options.page_size as u64 {
            return Err(EngineError::InvalidArgument(format!(
                "medium was created with page size {}, opened with {}",
                meta.page_size, options.page_size
            )));
        }
        let freelist_page = store.read_page(meta.freelist)?;
        let freelist = Freelist::decode(&freelist_page.data)?;
        debug!(
            freelist_page = %meta.freelist,
            high_water = freelist.high_water(),
            "engine opened"
        );
        Ok(Self {
            store,
            freelist,
            meta,
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn page_size(&self) -> usize {
        self.options.page_size
    }

    /// Hands out a page id from the freelist.
    pub fn allocate_page(&mut self) -> PageId {
        self.freelist.allocate()
    }

    /// Returns a superseded page id to the freelist.
    pub fn release_page(&mut self, id: PageId) {
        self.freelist.release(id);
    }

    /// Serializes `value` into a zero-filled page buffer and writes it at
    /// `id`.
    pub fn put_page<T: PageCodec>(&mut self, id: PageId, value: &T) -> Result<()> {
        let mut page = self.store.allocate_buf(id);
        value.encode(&mut page.data)?;
        self.store.write_page(&page)
    }

    /// Reads the page at `id` and deserializes it as a `T`.
    pub fn get_page<T: PageCodec>(&mut self, id: PageId) -> Result<T> {
        let page = self.store.read_page(id)?;
        T::decode(&page.data)
    }

    /// Persists the freelist and metadata pages and flushes the medium.
    pub fn sync(&mut self) -> Result<()> {
        let mut page = self.store.allocate_buf(self.meta.freelist);
        self.freelist.encode(&mut page.data)?;
        self.store.write_page(&page)?;

        let mut page = self.store.allocate_buf(META_PAGE_ID);
        self.meta.encode(&mut page.data)?;
        self.store.write_page(&page)?;

        self.store.flush()
    }

    /// Flushes the freelist and metadata pages and releases the medium.
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}
