//! Tenebra: a disk-backed B-tree key/value storage engine.
//!
//! The engine stores arbitrary byte-string keys and values in named
//! collections sharing one page store. Everything persistent lives in
//! fixed-size pages: a metadata page, a freelist page, one page per
//! collection header, and one page per tree node.
//!
//! # Example
//!
//! ```rust
//! use tenebra::{Collection, Engine, Options};
//!
//! fn main() -> tenebra::Result<()> {
//!     let mut engine = Engine::create_file("people.db", Options::default())?;
//!     let id = engine.allocate_page();
//!     let mut people = Collection::create(&mut engine, id, "people")?;
//!     people.insert(b"ada", b"lovelace")?;
//!     assert_eq!(people.find(b"ada")?, b"lovelace");
//!     engine.close()
//! }
//! ```
//!
//! The engine performs no internal locking: callers serialize mutating
//! operations, which the `&mut` receivers enforce in-process and an
//! exclusive advisory file lock enforces across processes. There is no
//! journaling or crash recovery; the freelist and metadata are persisted on
//! [`Engine::sync`] and [`Engine::close`].

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pager;
pub mod tree;

pub use config::Options;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use logging::init_logging;
pub use pager::{PageCodec, PageId};
pub use tree::{Collection, Item, Node};
