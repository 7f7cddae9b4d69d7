// Core Layer
pub mod config;
pub mod walker;

pub use config::WalkerConfig;
pub use walker::{ExpandTask, TreeWalker};
