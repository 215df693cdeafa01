//! Backend Module
//!
//! Everything that talks to the clustered filesystem: addresses, the typed
//! command front-end, output decoders, the process executor and the
//! per-server version gate.

pub mod address;
pub mod cli;
pub mod executor;
pub mod output;
pub mod version;

pub use address::{ServerAddress, VolumeAddress};
pub use cli::GlusterCli;
pub use executor::{ProcessExecutor, ProcessExecutorConfig};
pub use output::OpStatus;
pub use version::{Feature, FeatureGates, VersionGate, VersionTuple};
