//! Metadata block reader for FLAC files.
//!
//! Only a bounded prefix of the file is read. After the `fLaC` marker the
//! stream is a sequence of blocks, each with a 4-byte header:
//!
//! | Bits | Field |
//! |-----:|-------|
//! | 1    | last block flag |
//! | 7    | block type |
//! | 24   | payload length, big-endian |
//!
//! Block headers, STREAMINFO and PICTURE use big-endian integers while the
//! VORBIS_COMMENT lengths are little-endian.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use common::{put_item, CanonicalItem, Image, ImageFormat, ImageSlot, ItemMap, Kind};
use tracing::{debug, warn};

use crate::{parse_number, parse_year, MetadataError, TagExtractor};

pub const DEFAULT_WINDOW_BYTES: usize = 8192;

const SYNC_MARKER: &[u8; 4] = b"fLaC";
const BLOCK_HEADER_LEN: usize = 4;
// Sample rate, channels, bit depth and total samples sit in bytes 10..18.
const STREAM_INFO_PACKED: std::ops::Range<usize> = 10..18;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    Comments,
    CueSheet,
    Picture,
    Unknown(u8),
}

impl From<u8> for BlockType {
    fn from(code: u8) -> Self {
        match code {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::Comments,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            other => BlockType::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: BlockType,
    pub length: usize,
}

impl BlockHeader {
    fn parse(bytes: [u8; BLOCK_HEADER_LEN]) -> Self {
        let length = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]);
        Self {
            is_last: bytes[0] & 0x80 != 0,
            block_type: BlockType::from(bytes[0] & 0x7f),
            length: length as usize,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
}

impl StreamInfo {
    fn parse(payload: &[u8]) -> Option<Self> {
        let packed: [u8; 8] = payload.get(STREAM_INFO_PACKED)?.try_into().ok()?;
        let bits = u64::from_be_bytes(packed);
        Some(Self {
            sample_rate: ((bits >> 44) & 0xf_ffff) as u32,
            channels: ((bits >> 41) & 0x7) as u8 + 1,
            bits_per_sample: ((bits >> 36) & 0x1f) as u8 + 1,
            total_samples: bits & 0xf_ffff_ffff,
        })
    }

    /// Whole seconds, rounded down. `None` when the sample rate is zero.
    pub fn duration_secs(&self) -> Option<u64> {
        if self.sample_rate == 0 {
            return None;
        }
        Some(self.total_samples / u64::from(self.sample_rate))
    }
}

#[derive(Debug, Default)]
pub struct ParsedMetadata {
    pub items: ItemMap,
    pub stream_info: Option<StreamInfo>,
    pub found_marker: bool,
    pub blocks: usize,
    /// Parsing ran out of window before a last-block flag was seen.
    pub truncated: bool,
}

/// Walks the metadata blocks in `data`. Never fails: a missing marker yields
/// an empty result and a block running past the end of `data` ends the walk
/// with everything collected so far.
pub fn parse_metadata(data: &[u8]) -> ParsedMetadata {
    let mut parsed = ParsedMetadata::default();
    let Some(marker) = find_marker(data) else {
        debug!("no fLaC marker in window");
        return parsed;
    };
    parsed.found_marker = true;

    let mut offset = marker + SYNC_MARKER.len();
    loop {
        let Some(header) = data
            .get(offset..offset + BLOCK_HEADER_LEN)
            .and_then(|bytes| <[u8; BLOCK_HEADER_LEN]>::try_from(bytes).ok())
            .map(BlockHeader::parse)
        else {
            parsed.truncated = true;
            break;
        };
        let start = offset + BLOCK_HEADER_LEN;
        let Some(payload) = data.get(start..start + header.length) else {
            debug!(
                "block {:?} of {} bytes exceeds the read window; stopping",
                header.block_type, header.length
            );
            parsed.truncated = true;
            break;
        };
        parsed.blocks += 1;

        match header.block_type {
            BlockType::StreamInfo => read_stream_info(payload, &mut parsed),
            BlockType::Comments => read_comments(payload, &mut parsed.items),
            BlockType::Picture => {
                if let Some((slot, image)) = read_picture(payload) {
                    if parsed.items.contains_key(&slot.kind()) {
                        debug!("dropping repeated {:?} picture", slot);
                    } else {
                        put_item(&mut parsed.items, CanonicalItem::image(slot, image));
                    }
                }
            }
            BlockType::Padding
            | BlockType::Application
            | BlockType::SeekTable
            | BlockType::CueSheet => {}
            BlockType::Unknown(code) => debug!("skipping unknown block type {}", code),
        }

        offset = start + header.length;
        if header.is_last {
            break;
        }
    }
    parsed
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(SYNC_MARKER.len())
        .position(|window| window == SYNC_MARKER)
}

fn read_stream_info(payload: &[u8], parsed: &mut ParsedMetadata) {
    let Some(info) = StreamInfo::parse(payload) else {
        debug!("stream info block too short ({} bytes)", payload.len());
        return;
    };
    match info.duration_secs() {
        Some(seconds) => put_item(
            &mut parsed.items,
            CanonicalItem::integer(Kind::Duration, seconds),
        ),
        None => warn!("stream info declares a zero sample rate; no duration"),
    }
    parsed.stream_info = Some(info);
}

fn read_comments(payload: &[u8], items: &mut ItemMap) {
    let mut cursor = Cursor::new(payload);
    let Some(vendor) = cursor.read_string_le() else {
        return;
    };
    debug!("comment vendor: {}", vendor);
    let Some(count) = cursor.read_u32_le() else {
        return;
    };
    for _ in 0..count {
        let Some(comment) = cursor.read_string_le() else {
            debug!("comment list ends early");
            return;
        };
        apply_comment(&comment, items);
    }
}

fn apply_comment(comment: &str, items: &mut ItemMap) {
    let Some((key, value)) = comment.split_once('=') else {
        debug!("comment without '=': {}", comment);
        return;
    };
    let item = match key.to_ascii_uppercase().as_str() {
        "TITLE" => CanonicalItem::text(Kind::Title, value),
        "ARTIST" => CanonicalItem::text(Kind::Artist, value),
        "ALBUM" => CanonicalItem::text(Kind::Album, value),
        "WORK" => CanonicalItem::text(Kind::Composition, value),
        "COMPOSER" => CanonicalItem::text(Kind::Composer, value),
        "CONDUCTOR" => CanonicalItem::text(Kind::Conductor, value),
        "LYRICIST" => CanonicalItem::text(Kind::Lyricist, value),
        "GENRE" => CanonicalItem::text(Kind::Genre, value),
        "ORGANIZATION" | "PUBLISHER" => CanonicalItem::text(Kind::Publisher, value),
        "COPYRIGHT" => CanonicalItem::text(Kind::Copyright, value),
        "ENCODED-BY" | "ENCODEDBY" => CanonicalItem::text(Kind::EncodedBy, value),
        "ENCODER" => CanonicalItem::text(Kind::EncoderSettings, value),
        "DATE" => CanonicalItem::integer(Kind::RecordingYear, parse_year(value).unwrap_or(0)),
        "TRACKNUMBER" | "DISCNUMBER" => {
            let kind = if key.eq_ignore_ascii_case("TRACKNUMBER") {
                Kind::Track
            } else {
                Kind::Disk
            };
            match parse_number(value) {
                Some(number) => CanonicalItem::integer(kind, number),
                None => {
                    debug!("ignoring non-numeric {}: {}", key, value);
                    return;
                }
            }
        }
        _ => {
            debug!("ignoring comment key {}", key);
            return;
        }
    };
    put_item(items, item);
}

fn read_picture(payload: &[u8]) -> Option<(ImageSlot, Image)> {
    let mut cursor = Cursor::new(payload);
    let code = cursor.read_u32_be()?;
    let Some(slot) = ImageSlot::from_picture_type(code) else {
        debug!("ignoring picture of type {}", code);
        return None;
    };
    let mime_len = cursor.read_u32_be()? as usize;
    let mime = String::from_utf8_lossy(cursor.take(mime_len)?);
    let Some(format) = ImageFormat::from_mime(&mime) else {
        debug!("ignoring picture with mime type {}", mime);
        return None;
    };
    let description_len = cursor.read_u32_be()? as usize;
    cursor.take(description_len)?;
    // width, height, color depth, indexed color count
    cursor.take(16)?;
    let data_len = cursor.read_u32_be()? as usize;
    let data = cursor.take(data_len)?.to_vec();
    Some((slot, Image { format, data }))
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u32_be(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u32_le(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_string_le(&mut self) -> Option<String> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.take(len)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Reads at most `window` bytes from the start of `path`.
pub fn read_prefix(path: &Path, window: usize) -> Result<Vec<u8>, MetadataError> {
    let file = File::open(path).map_err(|err| MetadataError::io(path, err))?;
    let mut data = Vec::with_capacity(window.min(DEFAULT_WINDOW_BYTES * 8));
    file.take(window as u64)
        .read_to_end(&mut data)
        .map_err(|err| MetadataError::io(path, err))?;
    Ok(data)
}

pub struct FlacExtractor {
    path: PathBuf,
    relpath: String,
    window: usize,
    items: ItemMap,
    stream_info: Option<StreamInfo>,
}

impl FlacExtractor {
    pub fn new(path: impl Into<PathBuf>, relpath: impl Into<String>, window: usize) -> Self {
        Self {
            path: path.into(),
            relpath: relpath.into(),
            window,
            items: ItemMap::new(),
            stream_info: None,
        }
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }
}

impl TagExtractor for FlacExtractor {
    fn path(&self) -> &Path {
        &self.path
    }

    fn relpath(&self) -> &str {
        &self.relpath
    }

    fn extract(&mut self) -> Result<(), MetadataError> {
        let data = read_prefix(&self.path, self.window)?;
        let parsed = parse_metadata(&data);
        if parsed.truncated {
            debug!("metadata of {:?} truncated at {} bytes", self.path, data.len());
        }
        self.items = parsed.items;
        self.stream_info = parsed.stream_info;
        Ok(())
    }

    fn items(&self) -> &ItemMap {
        &self.items
    }

    fn remove_item(&mut self, kind: Kind) -> Option<common::CanonicalItem> {
        self.items.remove(&kind)
    }
}
