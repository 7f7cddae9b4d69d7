// Model Layer
pub mod file_entry;
pub mod node;

pub use file_entry::{FileEntry, FileType};
pub use node::{ExpandContext, NodeKind, VirtualNode};
