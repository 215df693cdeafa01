//! Volume Pool Module
//!
//! Selection, binding and reclaiming of backend volumes.

pub mod locks;
pub mod pattern;
pub mod registry;

pub use locks::{VolumeGuard, VolumeLocks};
pub use pattern::VolumePattern;
pub use registry::{candidates, PoolVolume, Reservation, UsedVolume, VolumePoolRegistry};
