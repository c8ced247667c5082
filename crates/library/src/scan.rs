use std::fs;
use std::path::{Path, PathBuf};

use common::{put_item, relpath_from, CanonicalItem, CoverRef, Image, ImageFormat, ImageSlot, Kind};
use metadata::{FlacExtractor, LoftyExtractor, TagExtractor};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::assemble::{Cover, Covers};
use crate::config::ScanConfig;
use crate::disc::disk_from_path;
use crate::normalize::FileTags;
use crate::{DirectoryScan, LibraryError, ScanFailure};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    Flac,
    Lofty,
    Image(ImageFormat),
}

pub(crate) fn route(path: &Path, config: &ScanConfig) -> Option<Route> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    let listed = |list: &[String]| list.iter().any(|candidate| *candidate == ext);
    if listed(&config.flac_extensions) {
        Some(Route::Flac)
    } else if listed(&config.lofty_extensions) {
        Some(Route::Lofty)
    } else if listed(&config.image_extensions) {
        ImageFormat::from_extension(&ext).map(Route::Image)
    } else {
        None
    }
}

pub(crate) fn scan_directory(root: &Path, config: &ScanConfig) -> Result<DirectoryScan, LibraryError> {
    if !fs::metadata(root)?.is_dir() {
        return Err(LibraryError::NotADirectory(root.to_path_buf()));
    }

    let mut scan = DirectoryScan {
        root: root.to_path_buf(),
        files: Vec::new(),
        covers: Covers::default(),
        failures: Vec::new(),
    };

    for (path, route) in collect_files(root, config) {
        let relpath = match relpath_from(root, &path) {
            Some(rel) => rel,
            None => continue,
        };
        match route {
            Route::Image(format) => read_image_file(&mut scan, &path, relpath, format),
            Route::Flac => {
                let extractor = FlacExtractor::new(&path, relpath, config.prefix_window_bytes);
                read_audio_file(&mut scan, Box::new(extractor), config);
            }
            Route::Lofty => {
                let extractor = LoftyExtractor::new(&path, relpath);
                read_audio_file(&mut scan, Box::new(extractor), config);
            }
        }
    }

    info!(
        "Scanned {:?}: {} audio files, {} failures",
        root,
        scan.files.len(),
        scan.failures.len()
    );
    Ok(scan)
}

fn collect_files(root: &Path, config: &ScanConfig) -> Vec<(PathBuf, Route)> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(config.follow_links)
        .min_depth(1)
        .max_depth(config.max_depth)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(route) = route(entry.path(), config) {
            files.push((entry.path().to_path_buf(), route));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

fn read_audio_file(scan: &mut DirectoryScan, mut extractor: Box<dyn TagExtractor>, config: &ScanConfig) {
    if let Err(err) = extractor.extract() {
        warn!("Failed to read tags for {:?}: {}", extractor.path(), err);
        scan.failures.push(ScanFailure {
            file_relpath: extractor.relpath().to_string(),
            error: err.to_string(),
        });
        return;
    }

    for kind in &config.excluded_kinds {
        extractor.remove_item(*kind);
    }

    for slot in [ImageSlot::Front, ImageSlot::Back] {
        if let Some((name, image)) = extractor.image(slot) {
            let cover = Cover {
                reference: CoverRef::Embedded {
                    file_relpath: extractor.relpath().to_string(),
                    format: image.format,
                },
                image: image.clone(),
            };
            if scan.covers.offer(slot, cover) {
                debug!("{} taken from {}", name, extractor.relpath());
            }
        }
        extractor.remove_item(slot.kind());
    }

    let mut items = extractor.items().clone();
    if !items.contains_key(&Kind::Disk) {
        if let Some(disk) = disk_from_path(extractor.path(), &scan.root) {
            put_item(&mut items, CanonicalItem::integer(Kind::Disk, disk));
        }
    }
    scan.files.push(FileTags::new(extractor.relpath(), items));
}

fn read_image_file(scan: &mut DirectoryScan, path: &Path, relpath: String, format: ImageFormat) {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            warn!("Failed to read image {:?}: {}", path, err);
            scan.failures.push(ScanFailure {
                file_relpath: relpath,
                error: err.to_string(),
            });
            return;
        }
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let slots: &[ImageSlot] = if stem.contains("back") {
        &[ImageSlot::Back]
    } else {
        &[ImageSlot::Front, ImageSlot::Back]
    };

    let image = Image { format, data };
    for slot in slots {
        let cover = Cover {
            reference: CoverRef::File {
                relpath: relpath.clone(),
                format,
            },
            image: image.clone(),
        };
        if scan.covers.offer(*slot, cover) {
            debug!("{:?} cover taken from {}", slot, relpath);
            return;
        }
    }
    debug!("ignoring extra image {}", relpath);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AlbumEntry;
    use std::fs;

    fn block(block_type: u8, last: bool, payload: &[u8]) -> Vec<u8> {
        let flag = if last { 0x80 } else { 0 };
        let mut out = vec![flag | block_type];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(payload);
        out
    }

    fn flac_file(total_samples: u64, comments: &[&str], picture: Option<u32>) -> Vec<u8> {
        let mut info = vec![0u8; 34];
        let packed = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | total_samples;
        info[10..18].copy_from_slice(&packed.to_be_bytes());

        let vendor = b"test";
        let mut list = (vendor.len() as u32).to_le_bytes().to_vec();
        list.extend_from_slice(vendor);
        list.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            list.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            list.extend_from_slice(comment.as_bytes());
        }

        let mut out = b"fLaC".to_vec();
        out.extend(block(0, false, &info));
        match picture {
            Some(code) => {
                out.extend(block(4, false, &list));
                let mime = b"image/png";
                let mut pic = code.to_be_bytes().to_vec();
                pic.extend_from_slice(&(mime.len() as u32).to_be_bytes());
                pic.extend_from_slice(mime);
                pic.extend_from_slice(&0u32.to_be_bytes());
                pic.extend_from_slice(&[0u8; 16]);
                pic.extend_from_slice(&3u32.to_be_bytes());
                pic.extend_from_slice(&[7, 8, 9]);
                out.extend(block(6, true, &pic));
            }
            None => out.extend(block(4, true, &list)),
        }
        out.extend_from_slice(&[0xff, 0xf8, 0x00, 0x00]);
        out
    }

    #[test]
    fn routes_by_extension() {
        let config = ScanConfig::default();
        assert_eq!(route(Path::new("a/01.FLAC"), &config), Some(Route::Flac));
        assert_eq!(route(Path::new("a/01.mp3"), &config), Some(Route::Lofty));
        assert_eq!(route(Path::new("a/01.m4a"), &config), Some(Route::Lofty));
        assert_eq!(
            route(Path::new("a/cover.jpeg"), &config),
            Some(Route::Image(ImageFormat::Jpg))
        );
        assert_eq!(route(Path::new("a/notes.txt"), &config), None);
        assert_eq!(route(Path::new("a/README"), &config), None);
    }

    #[test]
    fn scans_directory_into_album() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (name, track, work) in [
            ("01.flac", "1", Some("Quartet No. 14")),
            ("02.flac", "2", Some("Quartet No. 14")),
            ("03.flac", "3", None),
        ] {
            let title = format!("TITLE=Part {}", track);
            let number = format!("TRACKNUMBER={}", track);
            let mut comments = vec!["ALBUM=Late Quartets", "ARTIST=Takács", title.as_str(), number.as_str()];
            let work_comment = work.map(|w| format!("WORK={}", w));
            if let Some(work_comment) = &work_comment {
                comments.push(work_comment.as_str());
            }
            fs::write(root.join(name), flac_file(44_100 * 60, &comments, None)).unwrap();
        }
        fs::write(root.join("notes.txt"), "liner notes").unwrap();

        let scan = scan_directory(root, &ScanConfig::default()).unwrap();
        assert_eq!(scan.files().len(), 3);
        assert!(scan.failures().is_empty());

        let album = scan.album().unwrap();
        assert_eq!(album.title, "Late Quartets");
        assert_eq!(album.tags.artist.as_deref(), Some("Takács"));
        assert_eq!(album.duration(), 180);
        assert_eq!(album.contents().len(), 2);
        match &album.contents()[0] {
            AlbumEntry::Composition(work) => {
                assert_eq!(work.title(), "Quartet No. 14");
                assert_eq!(work.movements().len(), 2);
            }
            other => panic!("unexpected entry {:?}", other),
        }
        assert_eq!(scan.album(), Some(album));
    }

    #[test]
    fn covers_fill_first_come_first_served() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("01.flac"),
            flac_file(44_100, &["ALBUM=A", "TRACKNUMBER=1"], Some(3)),
        )
        .unwrap();
        fs::write(root.join("back.png"), [1u8, 2]).unwrap();
        fs::write(root.join("folder.jpg"), [3u8, 4]).unwrap();
        fs::write(root.join("scan.jpg"), [5u8]).unwrap();

        let scan = scan_directory(root, &ScanConfig::default()).unwrap();
        let (name, image) = scan.cover(ImageSlot::Front).unwrap();
        assert_eq!(name, "front.png");
        assert_eq!(image.data, vec![7, 8, 9]);
        let (name, image) = scan.cover(ImageSlot::Back).unwrap();
        assert_eq!(name, "back.png");
        assert_eq!(image.data, vec![1, 2]);

        let album = scan.album().unwrap();
        assert_eq!(
            album.front_cover,
            Some(CoverRef::Embedded {
                file_relpath: "01.flac".to_string(),
                format: ImageFormat::Png,
            })
        );
        assert!(scan.files()[0].items.get(&Kind::FrontCover).is_none());
    }

    #[test]
    fn image_files_fill_front_then_back() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("01.flac"), flac_file(44_100, &["ALBUM=A", "TRACKNUMBER=1"], None)).unwrap();
        fs::write(root.join("a.jpg"), [1u8]).unwrap();
        fs::write(root.join("b.jpg"), [2u8]).unwrap();

        let scan = scan_directory(root, &ScanConfig::default()).unwrap();
        assert_eq!(scan.cover(ImageSlot::Front).unwrap().1.data, vec![1]);
        assert_eq!(scan.cover(ImageSlot::Back).unwrap().1.data, vec![2]);
    }

    #[test]
    fn unreadable_file_is_recorded_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("01.flac"), flac_file(44_100, &["ALBUM=A", "TRACKNUMBER=1"], None)).unwrap();
        fs::write(root.join("02.m4a"), "not really an m4a").unwrap();

        let scan = scan_directory(root, &ScanConfig::default()).unwrap();
        assert_eq!(scan.files().len(), 1);
        assert_eq!(scan.failures().len(), 1);
        assert_eq!(scan.failures()[0].file_relpath, "02.m4a");
        assert_eq!(scan.album().unwrap().tracks().count(), 1);
    }

    #[test]
    fn excluded_kinds_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("01.flac"),
            flac_file(44_100, &["ALBUM=A", "TRACKNUMBER=1", "GENRE=Jazz"], None),
        )
        .unwrap();
        let config = ScanConfig {
            excluded_kinds: vec![Kind::Genre],
            ..ScanConfig::default()
        };
        let scan = scan_directory(root, &config).unwrap();
        assert!(!scan.files()[0].items.contains_key(&Kind::Genre));
        assert_eq!(scan.album().unwrap().tags.genre, None);
    }

    #[test]
    fn disk_is_taken_from_disc_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for disc in ["CD1", "CD2"] {
            fs::create_dir(root.join(disc)).unwrap();
            fs::write(
                root.join(disc).join("01.flac"),
                flac_file(44_100, &["ALBUM=Opera", "TRACKNUMBER=1"], None),
            )
            .unwrap();
        }

        let scan = scan_directory(root, &ScanConfig::default()).unwrap();
        let album = scan.album().unwrap();
        let disks: Vec<_> = album.tracks().map(|t| t.disk()).collect();
        assert_eq!(disks, vec![Some(1), Some(2)]);
    }

    #[test]
    fn walk_order_follows_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["b.jpg", "a.flac", "c.mp3", "a.png"] {
            fs::write(root.join(name), [0u8]).unwrap();
        }
        let names: Vec<String> = collect_files(root, &ScanConfig::default())
            .into_iter()
            .map(|(path, _)| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.flac", "a.png", "b.jpg", "c.mp3"]);
    }

    #[test]
    fn rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_directory(&dir.path().join("nope"), &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, LibraryError::Io(_)));
    }

    #[test]
    fn rejects_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.flac");
        fs::write(&path, flac_file(44_100, &["ALBUM=A"], None)).unwrap();
        let err = scan_directory(&path, &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, LibraryError::NotADirectory(_)));
    }
}
