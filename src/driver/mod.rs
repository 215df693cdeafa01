//! Share Driver Module

pub mod manager;

pub use manager::VolumeLifecycleManager;
