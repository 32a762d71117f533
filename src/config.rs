//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! [samples]
//! music = "https://example.com/music.mp3"
//! kick = "file:///home/me/kick.wav"
//!
//! [sync]
//! time_constant = 0.015
//!
//! [render]
//! sample_rate = 44100
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::builtin::{MUSIC_EXAMPLE, SPEECH_EXAMPLE};
use crate::error::ConfigError;
use crate::loader::SampleSources;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample key → URL or path.
    pub samples: BTreeMap<String, String>,
    pub sync: SyncConfig,
    pub render: RenderConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Time constant, in seconds, of the smoothed approach used for live
    /// edits of continuous parameters.
    pub time_constant: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            samples: BTreeMap::from([
                ("music".to_owned(), MUSIC_EXAMPLE.to_owned()),
                ("speech".to_owned(), SPEECH_EXAMPLE.to_owned()),
            ]),
            sync: SyncConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { time_constant: 0.015 }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { sample_rate: 48_000 }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn sample_sources(&self) -> SampleSources {
        SampleSources::from_iter(self.samples.clone())
    }
}
