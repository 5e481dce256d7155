pub mod collection;
pub mod node;

pub use collection::Collection;
pub use node::{Item, Node};
