//! I/O layer: prober execution, manifests, cache, configuration.

pub mod cache;
pub mod config;
pub mod init;
pub mod module_map;
pub mod prober;
pub mod process;
