use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::library::{Track, TrackData, TrackFormat, TrackLibrary};

mod lofty;
mod moosicbox_audiotags;

pub const UNKNOWN: &str = "unknown";

/// Tag-reader output, format-agnostic.
#[derive(Debug, Clone, Default)]
pub struct ScannedMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: Option<u32>,
    pub track_num: Option<u32>,
    pub duration: Duration,
}

trait FormatScanner: Send + Sync {
    fn scan(&self, path: &Utf8Path) -> color_eyre::Result<Option<ScannedMetadata>>;
}

fn scanners() -> Vec<Box<dyn FormatScanner>> {
    vec![Box::new(lofty::Scanner), Box::new(moosicbox_audiotags::Scanner)]
}

fn read_tags(path: &Utf8Path) -> Option<ScannedMetadata> {
    for scanner in scanners() {
        match scanner.scan(path) {
            Ok(Some(meta)) => return Some(meta),
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path, "tag scanner failed: {e:#}");
                continue;
            }
        }
    }
    None
}

fn hash_file(path: &Utf8Path) -> io::Result<String> {
    let mut file = File::open(path.as_std_path())?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        write!(hex, "{byte:02x}").expect("writing to a String never fails");
    }
    Ok(hex)
}

fn scan_one_file(path: Utf8PathBuf) -> Result<TrackData, String> {
    let format = path
        .extension()
        .and_then(TrackFormat::from_extension)
        .ok_or_else(|| "unrecognized extension".to_string())?;
    let checksum = hash_file(&path).map_err(|e| format!("failed to hash file: {e}"))?;
    let meta = read_tags(&path).unwrap_or_default();
    Ok(TrackData {
        id: 0,
        title: non_empty_or_unknown(meta.title),
        artist: non_empty_or_unknown(meta.artist),
        album: non_empty_or_unknown(meta.album),
        genre: non_empty_or_unknown(meta.genre),
        year: meta.year,
        track_num: meta.track_num,
        duration: meta.duration,
        file_path: path,
        format,
        checksum,
    })
}

fn non_empty_or_unknown(s: String) -> String {
    if s.is_empty() {
        UNKNOWN.to_string()
    } else {
        s
    }
}

/// Result of walking the music directory: discovered tracks plus
/// per-file failures, both sorted/keyed by path for determinism.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub tracks: Vec<TrackData>,
    pub errors: HashMap<Utf8PathBuf, String>,
}

/// Walks `music_dir` recursively, filtering by the accepted extensions,
/// hashing and tag-reading every match off the async runtime.
/// Individual file failures are collected, not propagated — scanning
/// always completes.
pub async fn scan_dir(music_dir: Utf8PathBuf) -> ScanOutcome {
    spawn_blocking(move || scan_dir_blocking(&music_dir))
        .await
        .expect("scanning should never panic")
}

fn scan_dir_blocking(music_dir: &Utf8Path) -> ScanOutcome {
    let mut paths: Vec<Utf8PathBuf> = walkdir::WalkDir::new(music_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .filter(|path| {
            path.extension()
                .map(TrackFormat::from_extension)
                .is_some_and(|f| f.is_some())
        })
        .collect();
    paths.sort();

    let mut outcome = ScanOutcome::default();
    for path in paths {
        match scan_one_file(path.clone()) {
            Ok(track) => outcome.tracks.push(track),
            Err(reason) => {
                warn!(path = %path, "scan error: {reason}");
                outcome.errors.insert(path, reason);
            }
        }
    }
    outcome
}

/// Applies every discovered track via `add_or_update`.
pub async fn scan_into_library(music_dir: Utf8PathBuf, library: Arc<TrackLibrary>) -> ScanOutcome {
    let outcome = scan_dir(music_dir).await;
    for track in &outcome.tracks {
        if let Err(e) = library.add_or_update(track.clone()) {
            warn!("failed to add scanned track to library: {e}");
        }
    }
    outcome
}

/// Result of a reconcile pass: tracks removed because their file is
/// gone, and tracks newly discovered on disk.
pub struct ReconcileOutcome {
    pub removed: Vec<Arc<Track>>,
    pub added: Vec<Arc<Track>>,
    pub scan_errors: HashMap<Utf8PathBuf, String>,
}

/// Removes library entries whose files are gone, then adds newly
/// discovered files. Cascading the removal into playlists is the
/// caller's responsibility — the library itself has no playlist
/// visibility.
pub async fn reconcile(music_dir: Utf8PathBuf, library: Arc<TrackLibrary>) -> ReconcileOutcome {
    let removed = library.remove_stale();
    let outcome = scan_dir(music_dir).await;
    let mut added = Vec::new();
    for track in &outcome.tracks {
        let (canonical, was_added) = match library.add(track.clone()) {
            Ok(result) => result,
            Err(e) => {
                warn!("failed to add reconciled track: {e}");
                continue;
            }
        };
        if was_added {
            added.push(canonical);
        } else {
            // file may have moved; keep path/format current either way.
            let _ = library.add_or_update(track.clone());
        }
    }
    ReconcileOutcome { removed, added, scan_errors: outcome.errors }
}
