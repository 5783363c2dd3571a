//! Serialization primitives shared by the module format.

pub mod encoding;
