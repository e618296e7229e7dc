use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::tag::TimeTag;
use crate::library::{Track, TrackLibrary};

static NEXT_PLAYLIST_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_id() -> u64 {
    NEXT_PLAYLIST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Bumps the playlist id counter past `id`, mirroring
/// `TrackLibrary::bump_above` — used when loading persisted playlists so
/// freshly-created playlists never collide with imported ids.
pub fn bump_id_counter_above(id: u64) {
    NEXT_PLAYLIST_ID.fetch_max(id + 1, Ordering::SeqCst);
}

/// An ordered sequence of track references plus a playback cursor.
///
/// Playlists hold references, not copies: they store `Arc<Track>`
/// pointers into a `TrackLibrary`, so an editorial edit is visible
/// through every playlist that contains the track.
pub struct Playlist {
    pub id: u64,
    pub name: String,
    pub tag: TimeTag,
    tracks: Vec<Arc<Track>>,
    next_index: usize,
    current_checksum: Option<String>,
    library: Option<Arc<TrackLibrary>>,
}

/// Reference-only on-disk shape of a playlist: tracks by checksum
/// rather than embedded, so the library stays the single copy of
/// editorial metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: u64,
    pub name: String,
    pub tag: TimeTag,
    #[serde(rename = "trackChecksums")]
    pub track_checksums: Vec<String>,
    #[serde(rename = "currentTrackChecksum")]
    pub current_track_checksum: Option<String>,
}

impl Playlist {
    pub fn new(name: impl Into<String>, tag: TimeTag) -> Self {
        Playlist {
            id: allocate_id(),
            name: name.into(),
            tag,
            tracks: Vec::new(),
            next_index: 0,
            current_checksum: None,
            library: None,
        }
    }

    /// Builds a playlist from a persisted id, preserving that id rather
    /// than allocating a fresh one (used by the store on load).
    pub fn from_ref(r: PlaylistRef, tracks: Vec<Arc<Track>>, library: Option<Arc<TrackLibrary>>) -> Self {
        bump_id_counter_above(r.id);
        let mut playlist = Playlist {
            id: r.id,
            name: r.name,
            tag: r.tag,
            tracks,
            next_index: 0,
            current_checksum: r.current_track_checksum,
            library,
        };
        playlist.rederive_cursor();
        playlist
    }

    pub fn to_ref(&self) -> PlaylistRef {
        PlaylistRef {
            id: self.id,
            name: self.name.clone(),
            tag: self.tag,
            track_checksums: self.tracks.iter().map(|t| t.checksum.clone()).collect(),
            current_track_checksum: self.current_checksum.clone(),
        }
    }

    pub fn attach_library(&mut self, library: Arc<TrackLibrary>) {
        self.library = Some(library);
    }

    pub fn count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn contains_track(&self, checksum: &str) -> bool {
        self.tracks.iter().any(|t| t.checksum == checksum)
    }

    /// Re-derives the cursor after any structural mutation: keeps
    /// pointing at whatever follows the currently-playing track if it's
    /// still present, otherwise clamps to the new length.
    fn rederive_cursor(&mut self) {
        let len = self.tracks.len();
        if len == 0 {
            self.next_index = 0;
            self.current_checksum = None;
            return;
        }
        let Some(current) = self.current_checksum.clone() else {
            self.next_index = self.next_index.min(len - 1);
            return;
        };
        if let Some(pos) = self.tracks.iter().position(|t| t.checksum == current) {
            self.next_index = (pos + 1) % len;
        } else {
            self.next_index = self.next_index.min(len - 1);
        }
    }

    /// Canonicalizes an incoming track through the associated library,
    /// if one is attached, so a playlist never holds a stale pointer
    /// alongside the library's own copy of the same track.
    fn canonicalize(&self, track: Arc<Track>) -> Arc<Track> {
        match &self.library {
            Some(lib) => lib.get(&track.checksum).unwrap_or(track),
            None => track,
        }
    }

    pub fn add_track(&mut self, track: Arc<Track>) {
        let track = self.canonicalize(track);
        self.tracks.push(track);
        self.rederive_cursor();
    }

    pub fn add_tracks(&mut self, tracks: impl IntoIterator<Item = Arc<Track>>) {
        for track in tracks {
            let track = self.canonicalize(track);
            self.tracks.push(track);
        }
        self.rederive_cursor();
    }

    /// Inserts at `index`; out-of-range appends.
    pub fn add_track_at(&mut self, index: usize, track: Arc<Track>) {
        let track = self.canonicalize(track);
        if index >= self.tracks.len() {
            self.tracks.push(track);
        } else {
            self.tracks.insert(index, track);
        }
        self.rederive_cursor();
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Arc<Track>> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(index);
        self.rederive_cursor();
        Some(removed)
    }

    pub fn remove_track_by_id(&mut self, id: u64) -> Option<Arc<Track>> {
        let index = self.tracks.iter().position(|t| t.id == id)?;
        self.remove_track(index)
    }

    /// Removes the first matching occurrence only. Duplicates are
    /// allowed in a playlist, so a single-track removal keeps the rest.
    pub fn remove_track_by_checksum(&mut self, checksum: &str) -> Option<Arc<Track>> {
        let index = self.tracks.iter().position(|t| t.checksum == checksum)?;
        self.remove_track(index)
    }

    /// Removes every matching occurrence — used when a track is deleted
    /// from the library and the removal must cascade into every
    /// playlist that references it.
    pub fn remove_tracks_by_checksum(&mut self, checksum: &str) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|t| t.checksum != checksum);
        let removed = before - self.tracks.len();
        if removed > 0 {
            self.rederive_cursor();
        }
        removed
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return false;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        self.rederive_cursor();
        true
    }

    /// Fisher-Yates shuffle. Reorders tracks without adding or removing
    /// any, so the currently-playing track is still in the set after.
    pub fn shuffle(&mut self) {
        self.tracks.shuffle(&mut rand::thread_rng());
        self.rederive_cursor();
    }

    pub fn clear_tracks(&mut self) {
        self.tracks.clear();
        self.next_index = 0;
        self.current_checksum = None;
    }

    /// Returns the next track and advances the cursor.
    pub fn next(&mut self) -> Option<Arc<Track>> {
        if self.tracks.is_empty() {
            return None;
        }
        let track = Arc::clone(&self.tracks[self.next_index]);
        self.current_checksum = Some(track.checksum.clone());
        self.next_index = (self.next_index + 1) % self.tracks.len();
        Some(track)
    }

    /// The currently-playing track, if any.
    pub fn current(&self) -> Option<Arc<Track>> {
        let checksum = self.current_checksum.as_ref()?;
        self.tracks.iter().find(|t| &t.checksum == checksum).cloned()
    }

    /// The track `Next()` would return without advancing the cursor.
    pub fn peek(&self) -> Option<Arc<Track>> {
        self.tracks.get(self.next_index).cloned()
    }

    /// Up to `n` upcoming tracks starting at the next-to-play position,
    /// wrapping around the playlist.
    pub fn peek_queue(&self, n: usize) -> Vec<Arc<Track>> {
        if self.tracks.is_empty() {
            return Vec::new();
        }
        (0..n.min(self.tracks.len()))
            .map(|offset| {
                let index = (self.next_index + offset) % self.tracks.len();
                Arc::clone(&self.tracks[index])
            })
            .collect()
    }

    /// Sets the cursor to `index`, modulo the playlist length.
    pub fn seek_to(&mut self, index: usize) {
        if self.tracks.is_empty() {
            self.next_index = 0;
            return;
        }
        self.next_index = index % self.tracks.len();
    }

    /// Moves the cursor back so the next `next()` returns the track that
    /// preceded the one currently playing. Jumps to the last track when
    /// there is no current track.
    pub fn seek_prev(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let len = self.tracks.len();
        let current_pos = self
            .current_checksum
            .as_ref()
            .and_then(|c| self.tracks.iter().position(|t| &t.checksum == c));
        self.next_index = match current_pos {
            Some(pos) => (pos + len - 1) % len,
            None => len - 1,
        };
    }

    /// Shares track pointers with a fresh name and a fresh id.
    pub fn clone_as(&self, new_name: impl Into<String>) -> Playlist {
        Playlist {
            id: allocate_id(),
            name: new_name.into(),
            tag: self.tag,
            tracks: self.tracks.clone(),
            next_index: self.next_index,
            current_checksum: self.current_checksum.clone(),
            library: self.library.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::library::{TrackData, TrackFormat};

    fn track(lib: &TrackLibrary, checksum: &str) -> Arc<Track> {
        lib.add(TrackData {
            id: 0,
            title: checksum.into(),
            artist: "a".into(),
            album: "al".into(),
            genre: "g".into(),
            year: None,
            track_num: None,
            duration: Duration::from_secs(1),
            file_path: Utf8PathBuf::from(format!("/{checksum}.mp3")),
            format: TrackFormat::Mp3,
            checksum: checksum.into(),
        })
        .unwrap()
        .0
    }

    #[test]
    fn scenario_s2_deterministic_next() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "t1");
        let t2 = track(&lib, "t2");
        let t3 = track(&lib, "t3");
        let mut playlist = Playlist::new("default", TimeTag::Morning);
        playlist.add_tracks([t1.clone(), t2.clone(), t3.clone()]);

        assert_eq!(playlist.next().unwrap().checksum, "t1");
        assert_eq!(playlist.next().unwrap().checksum, "t2");
        let third = playlist.next().unwrap();
        assert_eq!(third.checksum, "t3");
        assert_eq!(playlist.current().unwrap().checksum, "t3");
        assert_eq!(playlist.peek().unwrap().checksum, "t1");
        assert_eq!(playlist.next().unwrap().checksum, "t1");
    }

    #[test]
    fn scenario_s3_remove_currently_playing() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "t1");
        let t2 = track(&lib, "t2");
        let t3 = track(&lib, "t3");
        let mut playlist = Playlist::new("default", TimeTag::Morning);
        playlist.add_tracks([t1, t2, t3.clone()]);
        playlist.next(); // current = t1
        playlist.next(); // current = t2, next_index = 2 (t3)

        playlist.remove_track_by_checksum("t2");

        assert_eq!(playlist.count(), 2);
        assert_eq!(playlist.next().unwrap().checksum, "t3");
        assert_eq!(playlist.tracks()[0].checksum, "t1");
        let _ = t3;
    }

    #[test]
    fn removing_currently_playing_track_wraps_cursor() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "t1");
        let t2 = track(&lib, "t2");
        let mut playlist = Playlist::new("p", TimeTag::Night);
        playlist.add_tracks([t1, t2]);
        playlist.next();
        playlist.next(); // current = t2, next_index wraps to 0

        playlist.remove_track_by_checksum("t2");
        assert_eq!(playlist.count(), 1);
        assert!(playlist.peek().is_some());
    }

    #[test]
    fn empty_playlist_has_no_next_and_clears_cursor() {
        let mut playlist = Playlist::new("p", TimeTag::Night);
        assert!(playlist.next().is_none());
        assert!(playlist.current().is_none());
    }

    #[test]
    fn remove_tracks_by_checksum_removes_all_matches() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "dup");
        let t2 = track(&lib, "dup");
        let t3 = track(&lib, "unique");
        let mut playlist = Playlist::new("p", TimeTag::Night);
        playlist.add_tracks([t1, t2, t3]);

        let removed = playlist.remove_tracks_by_checksum("dup");
        assert_eq!(removed, 2);
        assert_eq!(playlist.count(), 1);
        assert!(!playlist.contains_track("dup"));
    }

    #[test]
    fn remove_track_by_checksum_removes_only_first_match() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "dup");
        let t2 = track(&lib, "dup");
        let mut playlist = Playlist::new("p", TimeTag::Night);
        playlist.add_tracks([t1, t2]);

        playlist.remove_track_by_checksum("dup");
        assert_eq!(playlist.count(), 1);
        assert!(playlist.contains_track("dup"));
    }

    #[test]
    fn seek_prev_jumps_to_preceding_track() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "t1");
        let t2 = track(&lib, "t2");
        let t3 = track(&lib, "t3");
        let mut playlist = Playlist::new("p", TimeTag::Night);
        playlist.add_tracks([t1, t2, t3]);
        playlist.next(); // current t1
        playlist.next(); // current t2

        playlist.seek_prev();
        assert_eq!(playlist.next().unwrap().checksum, "t1");
    }

    #[test]
    fn seek_prev_with_no_current_jumps_to_last() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "t1");
        let t2 = track(&lib, "t2");
        let mut playlist = Playlist::new("p", TimeTag::Night);
        playlist.add_tracks([t1, t2]);

        playlist.seek_prev();
        assert_eq!(playlist.next().unwrap().checksum, "t2");
    }

    #[test]
    fn clone_as_shares_track_pointers_with_fresh_id() {
        let lib = TrackLibrary::new();
        let t1 = track(&lib, "t1");
        let mut playlist = Playlist::new("p", TimeTag::Night);
        playlist.add_track(t1);
        let clone = playlist.clone_as("p2");

        assert_ne!(playlist.id, clone.id);
        assert!(Arc::ptr_eq(&playlist.tracks()[0], &clone.tracks()[0]));
    }
}
