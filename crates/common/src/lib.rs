use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

mod album;

pub use album::{Album, AlbumEntry, Composition, CoverRef, Single, TagFields};

/// Format-independent metadata kinds every tag reader maps into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Album,
    Title,
    Composition,
    Artist,
    Composer,
    Conductor,
    Lyricist,
    Genre,
    Publisher,
    Copyright,
    EncodedBy,
    EncoderSettings,
    RecordingYear,
    Track,
    Disk,
    Duration,
    FrontCover,
    BackCover,
}

impl Kind {
    pub const ALL: [Kind; 18] = [
        Kind::Album,
        Kind::Title,
        Kind::Composition,
        Kind::Artist,
        Kind::Composer,
        Kind::Conductor,
        Kind::Lyricist,
        Kind::Genre,
        Kind::Publisher,
        Kind::Copyright,
        Kind::EncodedBy,
        Kind::EncoderSettings,
        Kind::RecordingYear,
        Kind::Track,
        Kind::Disk,
        Kind::Duration,
        Kind::FrontCover,
        Kind::BackCover,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Album => "album",
            Kind::Title => "title",
            Kind::Composition => "composition",
            Kind::Artist => "artist",
            Kind::Composer => "composer",
            Kind::Conductor => "conductor",
            Kind::Lyricist => "lyricist",
            Kind::Genre => "genre",
            Kind::Publisher => "publisher",
            Kind::Copyright => "copyright",
            Kind::EncodedBy => "encoded_by",
            Kind::EncoderSettings => "encoder_settings",
            Kind::RecordingYear => "recording_year",
            Kind::Track => "track",
            Kind::Disk => "disk",
            Kind::Duration => "duration",
            Kind::FrontCover => "front_cover",
            Kind::BackCover => "back_cover",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, Kind::FrontCover | Kind::BackCover)
    }

    /// Kinds that identify a single track never move to album scope.
    pub fn is_hoistable(self) -> bool {
        !self.is_image() && !matches!(self, Kind::Title | Kind::Track | Kind::Duration)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Png,
}

impl ImageFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageFormat::Jpg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpg),
            "png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSlot {
    Front,
    Back,
}

impl ImageSlot {
    pub fn kind(self) -> Kind {
        match self {
            ImageSlot::Front => Kind::FrontCover,
            ImageSlot::Back => Kind::BackCover,
        }
    }

    pub fn from_picture_type(code: u32) -> Option<Self> {
        match code {
            3 => Some(ImageSlot::Front),
            4 => Some(ImageSlot::Back),
            _ => None,
        }
    }

    /// Upload name for an image in this slot, e.g. `front.jpg`.
    pub fn file_name(self, format: ImageFormat) -> String {
        let stem = match self {
            ImageSlot::Front => "front",
            ImageSlot::Back => "back",
        };
        format!("{}.{}", stem, format.extension())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemValue {
    Text(String),
    Integer(u64),
    Image(Image),
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub kind: Kind,
    pub value: ItemValue,
}

impl CanonicalItem {
    pub fn text(kind: Kind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: ItemValue::Text(value.into()),
        }
    }

    pub fn integer(kind: Kind, value: u64) -> Self {
        Self {
            kind,
            value: ItemValue::Integer(value),
        }
    }

    pub fn image(slot: ImageSlot, image: Image) -> Self {
        Self {
            kind: slot.kind(),
            value: ItemValue::Image(image),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            ItemValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<u64> {
        match self.value {
            ItemValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match &self.value {
            ItemValue::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Per-file items, one per kind.
pub type ItemMap = BTreeMap<Kind, CanonicalItem>;

/// Inserts `item`, replacing any earlier item of the same kind.
pub fn put_item(items: &mut ItemMap, item: CanonicalItem) {
    items.insert(item.kind, item);
}

pub fn text_of(items: &ItemMap, kind: Kind) -> Option<&str> {
    items.get(&kind).and_then(CanonicalItem::as_text)
}

pub fn integer_of(items: &ItemMap, kind: Kind) -> Option<u64> {
    items.get(&kind).and_then(CanonicalItem::as_integer)
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stable_id_is_deterministic() {
        let first = stable_id("Bach/Goldberg/01.flac");
        let second = stable_id("Bach/Goldberg/01.flac");
        assert_eq!(first, second);
        assert_ne!(first, stable_id("Bach/Goldberg/02.flac"));
    }

    #[test]
    fn relpath_uses_forward_slashes() {
        let root = PathBuf::from("/music");
        let path = root.join("CD1").join("01.flac");
        assert_eq!(relpath_from(&root, &path).as_deref(), Some("CD1/01.flac"));
        assert_eq!(relpath_from(&root, Path::new("/elsewhere/01.flac")), None);
    }

    #[test]
    fn later_item_of_same_kind_replaces_earlier() {
        let mut items = ItemMap::new();
        put_item(&mut items, CanonicalItem::text(Kind::Title, "First"));
        put_item(&mut items, CanonicalItem::text(Kind::Title, "Second"));
        assert_eq!(items.len(), 1);
        assert_eq!(text_of(&items, Kind::Title), Some("Second"));
    }

    #[test]
    fn items_compare_structurally() {
        assert_eq!(
            CanonicalItem::integer(Kind::Track, 7),
            CanonicalItem::integer(Kind::Track, 7)
        );
        assert_ne!(
            CanonicalItem::integer(Kind::Track, 7),
            CanonicalItem::integer(Kind::Disk, 7)
        );
        assert_ne!(
            CanonicalItem::integer(Kind::Track, 7),
            CanonicalItem::text(Kind::Track, "7")
        );
    }

    #[test]
    fn hoistable_kinds_exclude_track_identity_and_images() {
        let hoistable: Vec<Kind> = Kind::ALL.into_iter().filter(|k| k.is_hoistable()).collect();
        assert!(hoistable.contains(&Kind::Album));
        assert!(hoistable.contains(&Kind::Artist));
        assert!(hoistable.contains(&Kind::Disk));
        assert!(!hoistable.contains(&Kind::Title));
        assert!(!hoistable.contains(&Kind::Track));
        assert!(!hoistable.contains(&Kind::Duration));
        assert!(!hoistable.contains(&Kind::FrontCover));
    }

    #[test]
    fn image_formats_resolve_from_mime_and_extension() {
        assert_eq!(ImageFormat::from_mime("image/jpeg"), Some(ImageFormat::Jpg));
        assert_eq!(ImageFormat::from_mime("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime("image/gif"), None);
        assert_eq!(ImageFormat::from_extension("JPEG"), Some(ImageFormat::Jpg));
        assert_eq!(ImageSlot::Back.file_name(ImageFormat::Png), "back.png");
        assert_eq!(ImageSlot::from_picture_type(5), None);
    }
}
