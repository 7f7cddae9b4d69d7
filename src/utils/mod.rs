// Utilities
pub mod error;

pub use error::{Result, VtreeError};
