//! Host configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Frontend-provided settings. Every field is optional in JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Where BIOS and other system files live.
    pub system_dir: PathBuf,
    /// Where battery saves are written.
    pub save_dir: PathBuf,
    /// Machine definition name the frontend expects, e.g. `"nes"`. Empty
    /// accepts any.
    pub machine: String,
    /// Master ticks `run` may spend waiting for a frame before giving up.
    pub frame_step_limit: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            system_dir: PathBuf::from("system"),
            save_dir: PathBuf::from("saves"),
            machine: String::new(),
            // Over twenty NTSC NES frames
            frame_step_limit: 8_000_000,
        }
    }
}

impl HostConfig {
    pub fn from_json(json: &str) -> Result<Self, HostError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| HostError::Config(err.to_string()))?;
        if config.frame_step_limit == 0 {
            return Err(HostError::Config(
                "frame_step_limit must be non-zero".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = HostConfig::from_json(r#"{ "machine": "nes" }"#).unwrap();
        assert_eq!(config.machine, "nes");
        assert_eq!(config.save_dir, PathBuf::from("saves"));
        assert_eq!(config.frame_step_limit, 8_000_000);
    }

    #[test]
    fn full_config() {
        let json = r#"{
            "system_dir": "/opt/bios",
            "save_dir": "/var/saves",
            "machine": "nes",
            "frame_step_limit": 400000
        }"#;
        let config = HostConfig::from_json(json).unwrap();
        assert_eq!(config.system_dir, PathBuf::from("/opt/bios"));
        assert_eq!(config.frame_step_limit, 400_000);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(
            HostConfig::from_json("{ machine: }"),
            Err(HostError::Config(_))
        ));
        assert!(matches!(
            HostConfig::from_json(r#"{ "frame_step_limit": 0 }"#),
            Err(HostError::Config(_))
        ));
    }
}
