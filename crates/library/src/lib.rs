use std::path::{Path, PathBuf};

use common::{Album, Image, ImageSlot};
use serde::{Deserialize, Serialize};

mod assemble;
mod config;
mod disc;
mod normalize;
mod scan;

pub use assemble::{assemble, Cover, Covers};
pub use config::{
    config_path_from_env, load_or_create_config, save_config, ConfigError, ScanConfig,
    CONFIG_VERSION,
};
pub use normalize::{normalize, CompositionRuns, FileTags, Normalized, RunKey};

/// Tags and covers gathered from one album directory.
#[derive(Clone, Debug)]
pub struct DirectoryScan {
    root: PathBuf,
    files: Vec<FileTags>,
    covers: Covers,
    failures: Vec<ScanFailure>,
}

/// An audio file whose tags could not be read. It is left out of the album.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub file_relpath: String,
    pub error: String,
}

impl DirectoryScan {
    /// Walks `root` and extracts every supported audio and image file.
    pub fn open(root: impl AsRef<Path>, config: &ScanConfig) -> Result<Self, LibraryError> {
        scan::scan_directory(root.as_ref(), config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extracted files in walk order, with cover images already moved to
    /// `covers`.
    pub fn files(&self) -> &[FileTags] {
        &self.files
    }

    pub fn covers(&self) -> &Covers {
        &self.covers
    }

    pub fn failures(&self) -> &[ScanFailure] {
        &self.failures
    }

    pub fn normalized(&self) -> Normalized {
        normalize(&self.files)
    }

    /// Builds the album tree. `None` when no file carries an album title.
    pub fn album(&self) -> Option<Album> {
        assemble(&self.normalized(), &self.covers)
    }

    /// Cover bytes for `slot` with their upload name (`front.jpg`, ...).
    pub fn cover(&self, slot: ImageSlot) -> Option<(String, &Image)> {
        let cover = self.covers.get(slot)?;
        Some((slot.file_name(cover.reference.format()), &cover.image))
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    NotADirectory(PathBuf),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::NotADirectory(path) => write!(f, "not a directory: {:?}", path),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}
