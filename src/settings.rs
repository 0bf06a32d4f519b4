use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

/// 1 MiB SAMS card.
pub const DEFAULT_AMS_SIZE: usize = 1024 * 1024;

/// Feature flags consulted when the memory is built. The same flags can be
/// flipped later through the setters on `Memory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enable_32k_ram: bool,
    pub enable_ams: bool,
    pub enable_gram: bool,
    /// AMS backing store size in bytes.
    pub ams_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_32k_ram: true,
            enable_ams: false,
            enable_gram: false,
            ams_size: DEFAULT_AMS_SIZE,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json(r#"{ "enable_ams": true }"#).unwrap();
        assert!(settings.enable_ams);
        assert!(settings.enable_32k_ram);
        assert!(!settings.enable_gram);
        assert_eq!(settings.ams_size, DEFAULT_AMS_SIZE);
    }

    #[test]
    fn test_invalid_json() {
        assert!(Settings::from_json("{ enable_ams }").is_err());
    }
}
