//! Host adapter: the surface a frontend plugin calls into.
//!
//! The adapter owns at most one running [`Machine`]. Construction failures
//! are reported upward and leave the host unloaded; a partially built
//! machine never runs.

use std::path::Path;

use emu_core::{Machine, MachineDefinition, Ticks, VideoStandard};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::HostConfig;
use crate::error::HostError;

/// Static description of the emulated system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: &'static str,
    pub description: String,
    /// Accepted content extensions, `|`-separated.
    pub valid_extensions: String,
    /// Content is handed over as bytes; the machine never opens files.
    pub need_fullpath: bool,
}

/// Timing and geometry of the loaded machine, as reported by its devices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvInfo {
    pub base_width: u32,
    pub base_height: u32,
    pub aspect_ratio: f32,
    pub fps: f64,
    pub sample_rate: f64,
}

/// Memory blocks exposed to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryId {
    /// The machine's primary work RAM.
    SystemRam,
}

pub struct Host<D: MachineDefinition> {
    definition: D,
    config: HostConfig,
    machine: Option<Machine>,
}

impl<D: MachineDefinition> Host<D> {
    /// Create an unloaded host. Fails if the configuration names a
    /// different machine than `definition`.
    pub fn new(definition: D, config: HostConfig) -> Result<Self, HostError> {
        if !config.machine.is_empty() && config.machine != definition.name() {
            return Err(HostError::Config(format!(
                "configured for '{}' but the definition is '{}'",
                config.machine,
                definition.name()
            )));
        }
        Ok(Self {
            definition,
            config,
            machine: None,
        })
    }

    #[must_use]
    pub fn definition(&self) -> &D {
        &self.definition
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    #[must_use]
    pub fn system_info(&self) -> SystemInfo {
        SystemInfo {
            library_name: self.definition.name().to_string(),
            library_version: env!("CARGO_PKG_VERSION"),
            description: self.definition.description().to_string(),
            valid_extensions: self.definition.extensions().join("|"),
            need_fullpath: false,
        }
    }

    /// Geometry and timing of the loaded machine. Zero where no device
    /// produces that kind of output.
    pub fn av_info(&self) -> Result<AvInfo, HostError> {
        let machine = self.machine.as_ref().ok_or(HostError::NotLoaded)?;
        let video = machine.video();
        let audio = machine.audio();
        Ok(AvInfo {
            base_width: video.map_or(0, |v| v.width),
            base_height: video.map_or(0, |v| v.height),
            aspect_ratio: video.map_or(0.0, |v| v.aspect_ratio),
            fps: video.map_or(0.0, |v| v.fps),
            sample_rate: audio.map_or(0.0, |a| a.sample_rate),
        })
    }

    #[must_use]
    pub fn region(&self) -> VideoStandard {
        self.definition.standard()
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), HostError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = data.len(), "content read");
        self.load_bytes(&data)
    }

    /// Build a machine for `data`, replacing any loaded one. On failure the
    /// host is left unloaded.
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<(), HostError> {
        self.unload();
        match self.definition.init(data) {
            Ok(machine) => {
                debug!(machine = machine.name(), "content loaded");
                self.machine = Some(machine);
                Ok(())
            }
            Err(err) => {
                error!(machine = self.definition.name(), %err, "machine init failed");
                Err(err.into())
            }
        }
    }

    pub fn unload(&mut self) {
        if let Some(machine) = self.machine.take() {
            machine.deinit();
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.machine.is_some()
    }

    pub fn reset(&mut self) -> Result<(), HostError> {
        self.machine_mut().ok_or(HostError::NotLoaded)?.reset();
        Ok(())
    }

    /// Run until the machine completes a frame. Returns `false` if the
    /// configured step limit ran out first.
    pub fn run(&mut self) -> Result<bool, HostError> {
        let limit = Ticks(self.config.frame_step_limit);
        let machine = self.machine.as_mut().ok_or(HostError::NotLoaded)?;
        let completed = machine.run_frame(limit);
        if !completed {
            warn!(
                machine = machine.name(),
                limit = limit.get(),
                "no frame within step limit"
            );
        }
        Ok(completed)
    }

    #[must_use]
    pub fn memory(&self, id: MemoryId) -> Option<&[u8]> {
        let machine = self.machine.as_ref()?;
        match id {
            MemoryId::SystemRam => machine.primary_ram(),
        }
    }

    pub fn memory_mut(&mut self, id: MemoryId) -> Option<&mut [u8]> {
        let machine = self.machine.as_mut()?;
        match id {
            MemoryId::SystemRam => machine.primary_ram_mut(),
        }
    }

    #[must_use]
    pub fn memory_size(&self, id: MemoryId) -> usize {
        self.memory(id).map_or(0, <[u8]>::len)
    }

    /// Save states are not implemented; the state is always empty.
    #[must_use]
    pub fn serialize_size(&self) -> usize {
        0
    }

    pub fn serialize(&self, _buf: &mut [u8]) -> Result<(), HostError> {
        Err(HostError::Unsupported("save states"))
    }

    pub fn unserialize(&mut self, _data: &[u8]) -> Result<(), HostError> {
        Err(HostError::Unsupported("save states"))
    }

    #[must_use]
    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    pub fn machine_mut(&mut self) -> Option<&mut Machine> {
        self.machine.as_mut()
    }
}
