//! The middle end: the IR model, the textual IR reader, and the IR-level
//! optimization passes.

pub mod ir;
pub mod licm;
pub mod read;

pub use ir::*;
pub use read::parse_module;
