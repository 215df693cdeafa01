//! Domain layer
//!
//! Port traits at both edges of the driver: the command executor it calls
//! and the share driver interface its host calls, plus the share, snapshot
//! and access rule records that cross the host boundary.

pub mod ports;

pub use ports::*;
