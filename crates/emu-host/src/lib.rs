//! Host adapter.
//!
//! A frontend drives one [`Host`] per loaded game: it loads content into a
//! [`MachineDefinition`](emu_core::MachineDefinition), runs the machine a
//! frame at a time, and reads back timing, geometry and system RAM.

mod config;
mod error;
mod host;

pub use config::HostConfig;
pub use error::HostError;
pub use host::{AvInfo, Host, MemoryId, SystemInfo};
