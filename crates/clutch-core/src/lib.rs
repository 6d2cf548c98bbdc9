//! Bit-level reading, demo file framing, and message dispatch primitives
//! for the clutch demo parser. Has no dependency on any other `clutch-*`
//! crate; every later crate in the workspace builds on this one.

pub mod bitreader;
pub mod demofile;
pub mod error;
pub mod framer;
pub mod opcodes;
pub mod wire;

pub use bitreader::BitReader;
pub use error::{DemoError, DemoResult, Severity};
