use common::{
    stable_id, Album, AlbumEntry, CanonicalItem, Composition, CoverRef, Image, ImageSlot, Kind,
    Single, TagFields,
};
use tracing::{debug, warn};

use crate::normalize::{FileTags, Normalized};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cover {
    pub reference: CoverRef,
    pub image: Image,
}

/// Front and back album art. Each slot keeps the first cover offered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Covers {
    front: Option<Cover>,
    back: Option<Cover>,
}

impl Covers {
    pub fn get(&self, slot: ImageSlot) -> Option<&Cover> {
        match slot {
            ImageSlot::Front => self.front.as_ref(),
            ImageSlot::Back => self.back.as_ref(),
        }
    }

    /// Returns false when the slot was already taken.
    pub fn offer(&mut self, slot: ImageSlot, cover: Cover) -> bool {
        let target = match slot {
            ImageSlot::Front => &mut self.front,
            ImageSlot::Back => &mut self.back,
        };
        if target.is_some() {
            return false;
        }
        *target = Some(cover);
        true
    }
}

/// Builds the album tree. Yields nothing when no album title is known.
pub fn assemble(normalized: &Normalized, covers: &Covers) -> Option<Album> {
    let Some(title) = normalized.album_title() else {
        warn!("no album title in directory; nothing to assemble");
        return None;
    };

    let mut tags = TagFields::from_items(&normalized.album_scope);
    tags.album = None;
    let mut album = Album::new(title, tags);
    album.front_cover = covers.get(ImageSlot::Front).map(|c| c.reference.clone());
    album.back_cover = covers.get(ImageSlot::Back).map(|c| c.reference.clone());

    // `normalized.files` is already in (disk, album, track) order.
    let mut open: Option<Composition> = None;
    let mut remaining = 0usize;
    for (position, file) in normalized.files.iter().enumerate() {
        if let Some(run_len) = normalized.runs.starting_at(position) {
            if let Some(done) = open.take() {
                album.push(AlbumEntry::Composition(done));
            }
            remaining = run_len;
        }
        let in_run = remaining > 0;
        if in_run {
            remaining -= 1;
        }

        let track = file.items.get(&Kind::Track).and_then(CanonicalItem::as_integer);
        let track_title = file.items.get(&Kind::Title).and_then(CanonicalItem::as_text);
        if track.is_none() && track_title.is_none() {
            debug!("skipping {} without track number or title", file.relpath);
            continue;
        }
        let mut single = build_single(file, track, track_title);

        if in_run {
            single.tags.composition = None;
            match open.as_mut() {
                Some(composition) => composition.push(single),
                None => {
                    let name = normalized
                        .resolve(file, Kind::Composition)
                        .and_then(CanonicalItem::as_text)
                        .unwrap_or(title)
                        .to_string();
                    open = Some(Composition::new(name, single));
                }
            }
            continue;
        }

        if let Some(done) = open.take() {
            album.push(AlbumEntry::Composition(done));
        }
        album.push(AlbumEntry::Single(single));
    }
    if let Some(done) = open.take() {
        album.push(AlbumEntry::Composition(done));
    }

    Some(album)
}

fn build_single(file: &FileTags, track: Option<u64>, title: Option<&str>) -> Single {
    let title = title
        .map(|t| t.to_string())
        .unwrap_or_else(|| file_stem(&file.relpath));
    Single {
        id: stable_id(&file.relpath),
        file_relpath: file.relpath.clone(),
        title,
        track,
        duration: Single::duration_of(&file.items),
        tags: TagFields::from_items(&file.items),
    }
}

fn file_stem(relpath: &str) -> String {
    let name = relpath.rsplit('/').next().unwrap_or(relpath);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}
