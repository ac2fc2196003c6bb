//! Machine definitions: the static description a host loads content into.

use serde::{Deserialize, Serialize};

use crate::error::InitError;
use crate::machine::Machine;

/// Broadcast timing a machine targets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStandard {
    #[default]
    Ntsc,
    Pal,
}

/// A machine type a host can run.
///
/// `init` builds a fresh [`Machine`] for one piece of content. Whatever it
/// returns owns every buffer it uses; a failed `init` leaves nothing behind.
pub trait MachineDefinition {
    /// Short machine name, e.g. `"nes"`.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Content file extensions this machine accepts, without dots.
    fn extensions(&self) -> &[&str];

    fn standard(&self) -> VideoStandard {
        VideoStandard::Ntsc
    }

    fn init(&self, content: &[u8]) -> Result<Machine, InitError>;
}
