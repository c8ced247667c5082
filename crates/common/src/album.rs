use serde::{Deserialize, Serialize};

use crate::{CanonicalItem, ImageFormat, ItemMap, ItemValue, Kind};

/// Descriptive tags shared by albums and singles. Album-scope values live on
/// the album; a single only carries what differs between files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conductor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyricist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder_settings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_year: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<u64>,
}

impl TagFields {
    /// Collects every descriptive item in `items`. Title, track, duration
    /// and images are carried elsewhere and ignored here.
    pub fn from_items(items: &ItemMap) -> Self {
        let mut fields = TagFields::default();
        for item in items.values() {
            fields.apply(item);
        }
        fields
    }

    fn apply(&mut self, item: &CanonicalItem) {
        let text = || item.as_text().map(|v| v.to_string());
        match item.kind {
            Kind::Album => self.album = text(),
            Kind::Composition => self.composition = text(),
            Kind::Artist => self.artist = text(),
            Kind::Composer => self.composer = text(),
            Kind::Conductor => self.conductor = text(),
            Kind::Lyricist => self.lyricist = text(),
            Kind::Genre => self.genre = text(),
            Kind::Publisher => self.publisher = text(),
            Kind::Copyright => self.copyright = text(),
            Kind::EncodedBy => self.encoded_by = text(),
            Kind::EncoderSettings => self.encoder_settings = text(),
            Kind::RecordingYear => self.recording_year = item.as_integer(),
            Kind::Disk => self.disk = item.as_integer(),
            Kind::Title | Kind::Track | Kind::Duration | Kind::FrontCover | Kind::BackCover => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverRef {
    Embedded {
        file_relpath: String,
        format: ImageFormat,
    },
    File {
        relpath: String,
        format: ImageFormat,
    },
}

impl CoverRef {
    pub fn format(&self) -> ImageFormat {
        match self {
            CoverRef::Embedded { format, .. } | CoverRef::File { format, .. } => *format,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Single {
    pub id: String,
    pub file_relpath: String,
    pub title: String,
    pub track: Option<u64>,
    /// Playback length in whole seconds, rounded down.
    pub duration: u64,
    #[serde(flatten)]
    pub tags: TagFields,
}

impl Single {
    pub fn disk(&self) -> Option<u64> {
        self.tags.disk
    }

    pub fn duration_of(items: &ItemMap) -> u64 {
        match items.get(&Kind::Duration).map(|item| &item.value) {
            Some(ItemValue::Integer(seconds)) => *seconds,
            _ => 0,
        }
    }
}

/// A multi-movement work. Start position and duration always follow the
/// movements and are never set directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    title: String,
    start_disk: Option<u64>,
    start_track: Option<u64>,
    duration: u64,
    movements: Vec<Single>,
}

impl Composition {
    pub fn new(title: impl Into<String>, first: Single) -> Self {
        let mut composition = Self {
            title: title.into(),
            start_disk: None,
            start_track: None,
            duration: 0,
            movements: vec![first],
        };
        composition.recompute();
        composition
    }

    pub fn push(&mut self, movement: Single) {
        self.movements.push(movement);
        self.recompute();
    }

    fn recompute(&mut self) {
        let first = self.movements.first();
        self.start_disk = first.and_then(Single::disk);
        self.start_track = first.and_then(|m| m.track);
        self.duration = self.movements.iter().map(|m| m.duration).sum();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start_disk(&self) -> Option<u64> {
        self.start_disk
    }

    pub fn start_track(&self) -> Option<u64> {
        self.start_track
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn movements(&self) -> &[Single] {
        &self.movements
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AlbumEntry {
    Composition(Composition),
    Single(Single),
}

impl AlbumEntry {
    pub fn duration(&self) -> u64 {
        match self {
            AlbumEntry::Composition(composition) => composition.duration(),
            AlbumEntry::Single(single) => single.duration,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub title: String,
    #[serde(flatten)]
    pub tags: TagFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_cover: Option<CoverRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_cover: Option<CoverRef>,
    duration: u64,
    contents: Vec<AlbumEntry>,
}

impl Album {
    pub fn new(title: impl Into<String>, tags: TagFields) -> Self {
        Self {
            title: title.into(),
            tags,
            front_cover: None,
            back_cover: None,
            duration: 0,
            contents: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: AlbumEntry) {
        self.duration += entry.duration();
        self.contents.push(entry);
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn contents(&self) -> &[AlbumEntry] {
        &self.contents
    }

    /// Every single in play order, movements included.
    pub fn tracks(&self) -> impl Iterator<Item = &Single> {
        self.contents.iter().flat_map(|entry| match entry {
            AlbumEntry::Composition(composition) => composition.movements().iter(),
            AlbumEntry::Single(single) => std::slice::from_ref(single).iter(),
        })
    }
}
