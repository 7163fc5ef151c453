//! Core data model.

pub mod generation;
pub mod message;
pub mod tool_result;
pub mod usage;

pub use generation::*;
pub use message::*;
pub use tool_result::*;
pub use usage::*;
