//! The x86 back end of the `vc` compiler as a library. See `src/bin` for
//! the driver binary using this library.

pub mod back;
pub mod common;
pub mod error;
pub mod middle;
