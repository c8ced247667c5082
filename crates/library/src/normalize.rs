//! Directory-wide normalization of per-file items.
//!
//! Files are ordered by `(disk, album, track)`. Pass A finds runs of
//! consecutive files sharing album and composition; pass B moves values every
//! file agrees on to album scope.

use std::collections::{BTreeMap, BTreeSet};

use common::{integer_of, put_item, text_of, CanonicalItem, ItemMap, Kind};
use tracing::{debug, warn};

/// Items of one successfully extracted audio file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTags {
    pub relpath: String,
    pub items: ItemMap,
}

impl FileTags {
    pub fn new(relpath: impl Into<String>, items: ItemMap) -> Self {
        Self {
            relpath: relpath.into(),
            items,
        }
    }
}

/// Where a composition run starts.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunKey {
    pub album: String,
    pub disk: Option<u64>,
    pub track: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Run {
    key: RunKey,
    /// Index of the first file in `Normalized::files`.
    start: usize,
    len: usize,
}

/// Composition runs in file order. Only runs of two or more files are kept.
///
/// Files without track numbers share a `RunKey`, so runs are also indexed
/// by the position of their first file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositionRuns {
    runs: Vec<Run>,
}

impl CompositionRuns {
    /// Length of the first run starting at `key`.
    pub fn get(&self, key: &RunKey) -> Option<usize> {
        self.runs.iter().find(|run| run.key == *key).map(|run| run.len)
    }

    /// Length of the run whose first file sits at `position`.
    pub fn starting_at(&self, position: usize) -> Option<usize> {
        self.runs
            .binary_search_by_key(&position, |run| run.start)
            .ok()
            .map(|index| self.runs[index].len)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RunKey, usize)> {
        self.runs.iter().map(|run| (&run.key, run.len))
    }

    fn close(&mut self, state: RunState) {
        if let RunState::Open { key, start, len, .. } = state {
            if len >= 2 {
                debug!(
                    "composition run of {} at disk {:?} track {:?}",
                    len, key.disk, key.track
                );
                self.runs.push(Run { key, start, len });
            }
        }
    }
}

enum RunState<'a> {
    Idle,
    Open {
        album: &'a str,
        composition: &'a str,
        key: RunKey,
        start: usize,
        len: usize,
    },
}

impl<'a> RunState<'a> {
    fn begin(position: usize, file: &'a FileTags) -> Self {
        let composition = text_of(&file.items, Kind::Composition).unwrap_or("");
        if composition.is_empty() {
            return RunState::Idle;
        }
        let album = text_of(&file.items, Kind::Album).unwrap_or("");
        RunState::Open {
            album,
            composition,
            key: RunKey {
                album: album.to_string(),
                disk: integer_of(&file.items, Kind::Disk),
                track: integer_of(&file.items, Kind::Track),
            },
            start: position,
            len: 1,
        }
    }

    fn extends_with(&self, file: &FileTags) -> bool {
        match self {
            RunState::Idle => false,
            RunState::Open {
                album, composition, ..
            } => {
                text_of(&file.items, Kind::Album).unwrap_or("") == *album
                    && text_of(&file.items, Kind::Composition).unwrap_or("") == *composition
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalized {
    /// Agreed values, plus the fallback album title for mixed directories.
    pub album_scope: ItemMap,
    /// Kinds every file agreed on and which were removed from `files`.
    pub hoisted: BTreeSet<Kind>,
    /// Per-file items in `(disk, album, track)` order, hoisted kinds removed.
    pub files: Vec<FileTags>,
    pub runs: CompositionRuns,
}

impl Normalized {
    pub fn album_title(&self) -> Option<&str> {
        text_of(&self.album_scope, Kind::Album)
    }

    /// The file's own item, or the album-scope one when `kind` was hoisted.
    pub fn resolve<'a>(&'a self, file: &'a FileTags, kind: Kind) -> Option<&'a CanonicalItem> {
        file.items.get(&kind).or_else(|| {
            if self.hoisted.contains(&kind) {
                self.album_scope.get(&kind)
            } else {
                None
            }
        })
    }

    pub fn sort_key(&self, file: &FileTags) -> (Option<u64>, String, Option<u64>) {
        order_key(
            self.resolve(file, Kind::Disk).and_then(CanonicalItem::as_integer),
            self.resolve(file, Kind::Album).and_then(CanonicalItem::as_text),
            self.resolve(file, Kind::Track).and_then(CanonicalItem::as_integer),
        )
    }

    pub fn run_key(&self, file: &FileTags) -> RunKey {
        let (disk, album, track) = self.sort_key(file);
        RunKey { album, disk, track }
    }
}

fn order_key(
    disk: Option<u64>,
    album: Option<&str>,
    track: Option<u64>,
) -> (Option<u64>, String, Option<u64>) {
    (disk, album.unwrap_or("").to_string(), track)
}

/// Runs both passes over a copy of `files`; the input is left untouched so
/// the result can be recomputed at will.
pub fn normalize(files: &[FileTags]) -> Normalized {
    let mut files = files.to_vec();
    files.sort_by_cached_key(|file| {
        order_key(
            integer_of(&file.items, Kind::Disk),
            text_of(&file.items, Kind::Album),
            integer_of(&file.items, Kind::Track),
        )
    });

    let runs = detect_runs(&files);
    let (album_scope, hoisted) = hoist(&mut files);

    Normalized {
        album_scope,
        hoisted,
        files,
        runs,
    }
}

fn detect_runs(files: &[FileTags]) -> CompositionRuns {
    let mut runs = CompositionRuns::default();
    let mut state = RunState::Idle;
    for (position, file) in files.iter().enumerate() {
        if state.extends_with(file) {
            if let RunState::Open { len, .. } = &mut state {
                *len += 1;
            }
            continue;
        }
        runs.close(std::mem::replace(&mut state, RunState::begin(position, file)));
    }
    runs.close(state);
    runs
}

fn hoist(files: &mut [FileTags]) -> (ItemMap, BTreeSet<Kind>) {
    let mut album_scope = ItemMap::new();
    let mut hoisted = BTreeSet::new();
    let Some(first) = files.first() else {
        return (album_scope, hoisted);
    };
    let first = first.items.clone();

    for kind in Kind::ALL.into_iter().filter(|kind| kind.is_hoistable()) {
        let candidate = first.get(&kind);
        if files.iter().all(|file| file.items.get(&kind) == candidate) {
            for file in files.iter_mut() {
                file.items.remove(&kind);
            }
            if let Some(item) = candidate {
                put_item(&mut album_scope, item.clone());
            }
            hoisted.insert(kind);
        } else if kind == Kind::Album {
            let fallback = files
                .iter()
                .find_map(|file| file.items.get(&Kind::Album))
                .cloned();
            warn!(
                "files disagree on album title; using {:?}",
                fallback.as_ref().and_then(CanonicalItem::as_text)
            );
            if let Some(item) = fallback {
                put_item(&mut album_scope, item);
            }
        }
    }
    (album_scope, hoisted)
}
