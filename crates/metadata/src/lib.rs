use std::path::{Path, PathBuf};

use common::{CanonicalItem, Image, ImageSlot, ItemMap, Kind};
use lofty::error::LoftyError;

pub mod flac;
mod tags;

pub use flac::{FlacExtractor, ParsedMetadata, StreamInfo, DEFAULT_WINDOW_BYTES};
pub use tags::LoftyExtractor;

/// A reader that turns one audio file into canonical items.
///
/// Implementations differ in how they decode the file but share this
/// observable contract: after a successful `extract`, `items` holds at most
/// one item per kind, and embedded front/back pictures are available through
/// `image`.
pub trait TagExtractor {
    fn path(&self) -> &Path;

    /// Path relative to the scanned directory, with `/` separators.
    fn relpath(&self) -> &str;

    fn extract(&mut self) -> Result<(), MetadataError>;

    fn items(&self) -> &ItemMap;

    fn item(&self, kind: Kind) -> Option<&CanonicalItem> {
        self.items().get(&kind)
    }

    fn remove_item(&mut self, kind: Kind) -> Option<CanonicalItem>;

    /// Embedded picture for `slot` with its upload name (`front.jpg`, ...).
    fn image(&self, slot: ImageSlot) -> Option<(String, &Image)> {
        let image = self.item(slot.kind())?.as_image()?;
        Some((slot.file_name(image.format), image))
    }
}

#[derive(Debug)]
pub enum MetadataError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Lofty(LoftyError),
}

impl MetadataError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MetadataError::Io {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            MetadataError::Lofty(err) => write!(f, "tag read error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetadataError::Io { source, .. } => Some(source),
            MetadataError::Lofty(err) => Some(err),
        }
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Numerator of a "part of total" value such as `3/12`.
pub(crate) fn parse_number(text: &str) -> Option<u64> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

/// First run of up to four digits, so `1998-03-01` yields 1998.
pub(crate) fn parse_year(text: &str) -> Option<u64> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}
