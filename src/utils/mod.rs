//! Process-level helpers shared by the binaries.

pub mod log;
