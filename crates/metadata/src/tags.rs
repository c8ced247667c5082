use std::path::{Path, PathBuf};

use common::{put_item, CanonicalItem, Image, ImageFormat, ImageSlot, ItemMap, Kind};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::tag::Tag;
use tracing::debug;

use crate::{parse_number, parse_year, MetadataError, TagExtractor};

const TEXT_KEYS: &[(ItemKey, Kind)] = &[
    (ItemKey::TrackTitle, Kind::Title),
    (ItemKey::AlbumTitle, Kind::Album),
    (ItemKey::TrackArtist, Kind::Artist),
    (ItemKey::Work, Kind::Composition),
    (ItemKey::Composer, Kind::Composer),
    (ItemKey::Conductor, Kind::Conductor),
    (ItemKey::Lyricist, Kind::Lyricist),
    (ItemKey::Genre, Kind::Genre),
    (ItemKey::Publisher, Kind::Publisher),
    (ItemKey::CopyrightMessage, Kind::Copyright),
    (ItemKey::EncodedBy, Kind::EncodedBy),
    (ItemKey::EncoderSettings, Kind::EncoderSettings),
];

/// Extractor for formats decoded by lofty (ID3v2 in MP3, MP4 atoms, ...).
pub struct LoftyExtractor {
    path: PathBuf,
    relpath: String,
    items: ItemMap,
}

impl LoftyExtractor {
    pub fn new(path: impl Into<PathBuf>, relpath: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            relpath: relpath.into(),
            items: ItemMap::new(),
        }
    }
}

impl TagExtractor for LoftyExtractor {
    fn path(&self) -> &Path {
        &self.path
    }

    fn relpath(&self) -> &str {
        &self.relpath
    }

    fn extract(&mut self) -> Result<(), MetadataError> {
        let tagged_file = lofty::read_from_path(&self.path)?;
        let mut items = ItemMap::new();

        let seconds = tagged_file.properties().duration().as_secs();
        if seconds > 0 {
            put_item(&mut items, CanonicalItem::integer(Kind::Duration, seconds));
        }

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            map_tag(tag, &mut items);
        } else {
            debug!("no tag in {:?}", self.path);
        }

        self.items = items;
        Ok(())
    }

    fn items(&self) -> &ItemMap {
        &self.items
    }

    fn remove_item(&mut self, kind: Kind) -> Option<CanonicalItem> {
        self.items.remove(&kind)
    }
}

fn map_tag(tag: &Tag, items: &mut ItemMap) {
    for (key, kind) in TEXT_KEYS {
        if let Some(value) = tag.get_string(key) {
            put_item(items, CanonicalItem::text(*kind, value));
        }
    }

    let year = tag
        .get_string(&ItemKey::Year)
        .or_else(|| tag.get_string(&ItemKey::RecordingDate))
        .and_then(parse_year);
    if let Some(year) = year {
        put_item(items, CanonicalItem::integer(Kind::RecordingYear, year));
    }
    if let Some(track) = tag.get_string(&ItemKey::TrackNumber).and_then(parse_number) {
        put_item(items, CanonicalItem::integer(Kind::Track, track));
    }
    if let Some(disk) = tag.get_string(&ItemKey::DiscNumber).and_then(parse_number) {
        put_item(items, CanonicalItem::integer(Kind::Disk, disk));
    }

    for picture in tag.pictures() {
        let Some((slot, image)) = map_picture(picture) else {
            continue;
        };
        if !items.contains_key(&slot.kind()) {
            put_item(items, CanonicalItem::image(slot, image));
        }
    }
}

fn map_picture(picture: &Picture) -> Option<(ImageSlot, Image)> {
    let slot = match picture.pic_type() {
        PictureType::CoverFront => ImageSlot::Front,
        PictureType::CoverBack => ImageSlot::Back,
        other => {
            debug!("ignoring picture of type {:?}", other);
            return None;
        }
    };
    let format = match picture.mime_type() {
        Some(MimeType::Jpeg) => ImageFormat::Jpg,
        Some(MimeType::Png) => ImageFormat::Png,
        other => {
            debug!("ignoring picture with mime type {:?}", other);
            return None;
        }
    };
    Some((
        slot,
        Image {
            format,
            data: picture.data().to_vec(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{integer_of, text_of};
    use lofty::tag::TagType;
    use std::io::Write;

    #[test]
    fn maps_tag_items_to_canonical_kinds() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.insert_text(ItemKey::TrackTitle, "Allegro".to_string());
        tag.insert_text(ItemKey::AlbumTitle, "Brandenburg Concertos".to_string());
        tag.insert_text(ItemKey::Composer, "J. S. Bach".to_string());
        tag.insert_text(ItemKey::RecordingDate, "1982-05-01".to_string());
        tag.insert_text(ItemKey::TrackNumber, "4/18".to_string());
        tag.insert_text(ItemKey::DiscNumber, "2/2".to_string());

        let mut items = ItemMap::new();
        map_tag(&tag, &mut items);
        assert_eq!(text_of(&items, Kind::Title), Some("Allegro"));
        assert_eq!(text_of(&items, Kind::Album), Some("Brandenburg Concertos"));
        assert_eq!(text_of(&items, Kind::Composer), Some("J. S. Bach"));
        assert_eq!(integer_of(&items, Kind::RecordingYear), Some(1982));
        assert_eq!(integer_of(&items, Kind::Track), Some(4));
        assert_eq!(integer_of(&items, Kind::Disk), Some(2));
    }

    #[test]
    fn keeps_only_front_and_back_jpg_or_png() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.push_picture(Picture::new_unchecked(
            PictureType::Artist,
            Some(MimeType::Jpeg),
            None,
            vec![1],
        ));
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Gif),
            None,
            vec![2],
        ));
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Png),
            None,
            vec![3],
        ));
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverBack,
            Some(MimeType::Jpeg),
            None,
            vec![4],
        ));

        let mut items = ItemMap::new();
        map_tag(&tag, &mut items);
        let front = items[&Kind::FrontCover].as_image().unwrap();
        assert_eq!(front.format, ImageFormat::Png);
        assert_eq!(front.data, vec![3]);
        let back = items[&Kind::BackCover].as_image().unwrap();
        assert_eq!(back.format, ImageFormat::Jpg);
    }

    #[test]
    fn non_audio_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "This is just some text, not music.").unwrap();
        let mut extractor = LoftyExtractor::new(file.path(), "text.mp3");
        assert!(extractor.extract().is_err());
        assert!(extractor.items().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut extractor = LoftyExtractor::new("does/not/exist.mp3", "exist.mp3");
        assert!(extractor.extract().is_err());
    }
}
