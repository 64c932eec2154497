pub mod selection;
pub mod value;

// Re-export types for convenience.
pub use crate::types::selection::Selection;
pub use crate::types::value::Value;
