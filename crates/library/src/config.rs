use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use common::Kind;
use metadata::DEFAULT_WINDOW_BYTES;
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_MAX_DEPTH: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub version: u32,
    /// Bytes read from the start of each FLAC file. Pictures that end past
    /// this window are not seen.
    pub prefix_window_bytes: usize,
    pub max_depth: usize,
    pub follow_links: bool,
    /// Kinds dropped from every file right after extraction.
    pub excluded_kinds: Vec<Kind>,
    pub flac_extensions: Vec<String>,
    pub lofty_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            prefix_window_bytes: DEFAULT_WINDOW_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
            follow_links: false,
            excluded_kinds: Vec::new(),
            flac_extensions: vec!["flac".to_string()],
            lofty_extensions: vec!["mp3".to_string(), "m4a".to_string()],
            image_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

impl ScanConfig {
    fn normalize(&mut self) {
        let defaults = ScanConfig::default();
        if self.version < CONFIG_VERSION {
            self.version = CONFIG_VERSION;
        }
        if self.prefix_window_bytes == 0 {
            self.prefix_window_bytes = defaults.prefix_window_bytes;
        }
        if self.max_depth == 0 {
            self.max_depth = defaults.max_depth;
        }
        for list in [
            &mut self.flac_extensions,
            &mut self.lofty_extensions,
            &mut self.image_extensions,
        ] {
            for ext in list.iter_mut() {
                *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            }
            list.retain(|ext| !ext.is_empty());
        }
        if self.flac_extensions.is_empty() {
            self.flac_extensions = defaults.flac_extensions;
        }
        if self.lofty_extensions.is_empty() {
            self.lofty_extensions = defaults.lofty_extensions;
        }
        if self.image_extensions.is_empty() {
            self.image_extensions = defaults.image_extensions;
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("ALBUM_SCAN_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("album_scan.yaml"))
            .unwrap_or_else(|| PathBuf::from("album_scan.yaml")),
        Err(_) => PathBuf::from("album_scan.yaml"),
    }
}

/// Loads the config at `path`, or writes the defaults there. The flag is
/// true when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ScanConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ScanConfig = serde_yaml::from_str(&contents)?;
        config.normalize();
        return Ok((config, false));
    }

    let config = ScanConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ScanConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}
