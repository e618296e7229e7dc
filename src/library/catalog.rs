use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use camino::Utf8PathBuf;
use tracing::warn;

use super::track::{MetadataUpdate, Track, TrackData};
use crate::error::{CoreError, CoreResult};

/// Content-addressed catalog of audio files.
///
/// The single source of truth for tracks. Keyed by checksum with a
/// secondary id index; the two indices are always kept consistent
/// because both live behind one lock.
pub struct TrackLibrary {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct Inner {
    by_checksum: HashMap<String, Arc<Track>>,
    by_id: HashMap<u64, Arc<Track>>,
}

impl Default for TrackLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLibrary {
    pub fn new() -> Self {
        TrackLibrary {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a track, assigning a fresh id. On checksum collision returns
    /// the existing canonical pointer with `added = false`.
    pub fn add(&self, data: TrackData) -> CoreResult<(Arc<Track>, bool)> {
        if data.checksum.is_empty() {
            return Err(CoreError::Validation("track checksum must not be empty".into()));
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.by_checksum.get(&data.checksum) {
            return Ok((Arc::clone(existing), false));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let track = Arc::new(Track::new_unassigned(TrackData { id, ..data }));
        inner.by_checksum.insert(track.checksum.clone(), Arc::clone(&track));
        inner.by_id.insert(id, Arc::clone(&track));
        Ok((track, true))
    }

    /// Like `add`, but on collision updates the file path/format of the
    /// existing entry in place, preserving editorial metadata.
    pub fn add_or_update(&self, data: TrackData) -> CoreResult<Arc<Track>> {
        if data.checksum.is_empty() {
            return Err(CoreError::Validation("track checksum must not be empty".into()));
        }
        let existing = {
            let inner = self.inner.read().unwrap();
            inner.by_checksum.get(&data.checksum).cloned()
        };
        if let Some(existing) = existing {
            existing.relocate(data.file_path, data.format);
            return Ok(existing);
        }
        let (track, _) = self.add(data)?;
        Ok(track)
    }

    /// Inserts a track with a pre-assigned id (used when loading
    /// persisted data) and bumps the id counter past it so future
    /// `add`s never collide.
    pub fn import(&self, data: TrackData) -> CoreResult<Arc<Track>> {
        if data.checksum.is_empty() {
            return Err(CoreError::Validation("track checksum must not be empty".into()));
        }
        let id = data.id;
        let track = Arc::new(Track::new_unassigned(data));
        let mut inner = self.inner.write().unwrap();
        inner.by_checksum.insert(track.checksum.clone(), Arc::clone(&track));
        inner.by_id.insert(id, Arc::clone(&track));
        self.bump_above(id);
        Ok(track)
    }

    /// Advances the id counter so it is guaranteed to be above `id`.
    pub fn bump_above(&self, id: u64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }

    pub fn get(&self, checksum: &str) -> Option<Arc<Track>> {
        self.inner.read().unwrap().by_checksum.get(checksum).cloned()
    }

    pub fn get_by_id(&self, id: u64) -> Option<Arc<Track>> {
        self.inner.read().unwrap().by_id.get(&id).cloned()
    }

    pub fn get_by_file_path(&self, path: &Utf8PathBuf) -> Option<Arc<Track>> {
        self.inner
            .read()
            .unwrap()
            .by_id
            .values()
            .find(|t| &t.file_path() == path)
            .cloned()
    }

    pub fn update(&self, id: u64, update: MetadataUpdate) -> CoreResult<()> {
        let track = self
            .get_by_id(id)
            .ok_or_else(|| CoreError::NotFound(format!("no track with id {id}")))?;
        track.apply_update(update);
        Ok(())
    }

    pub fn remove(&self, checksum: &str) -> Option<Arc<Track>> {
        let mut inner = self.inner.write().unwrap();
        let track = inner.by_checksum.remove(checksum)?;
        inner.by_id.remove(&track.id);
        Some(track)
    }

    pub fn remove_by_id(&self, id: u64) -> Option<Arc<Track>> {
        let mut inner = self.inner.write().unwrap();
        let track = inner.by_id.remove(&id)?;
        inner.by_checksum.remove(&track.checksum);
        Some(track)
    }

    /// Drops entries whose backing file no longer exists, returning the
    /// removed tracks so callers can cascade the removal into playlists.
    pub fn remove_stale(&self) -> Vec<Arc<Track>> {
        let stale: Vec<Arc<Track>> = {
            let inner = self.inner.read().unwrap();
            inner
                .by_id
                .values()
                .filter(|t| !t.exists_on_disk())
                .cloned()
                .collect()
        };
        let mut inner = self.inner.write().unwrap();
        for track in &stale {
            inner.by_checksum.remove(&track.checksum);
            inner.by_id.remove(&track.id);
        }
        stale
    }

    /// Deterministic, id-ordered listing.
    pub fn list(&self) -> Vec<Arc<Track>> {
        let inner = self.inner.read().unwrap();
        let mut tracks: Vec<_> = inner.by_id.values().cloned().collect();
        tracks.sort_by_key(|t| t.id);
        tracks
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive substring search, iterated in id order for
    /// deterministic results.
    pub fn search(&self, query: &str) -> Vec<Arc<Track>> {
        self.list().into_iter().filter(|t| t.matches(query)).collect()
    }

    /// Resolves a list of checksums to tracks, used when loading
    /// playlists from disk. Missing checksums are dropped with a
    /// warning.
    pub fn resolve(&self, checksums: &[String]) -> Vec<Arc<Track>> {
        checksums
            .iter()
            .filter_map(|c| {
                let found = self.get(c);
                if found.is_none() {
                    warn!(checksum = %c, "dropping unresolved track checksum while loading playlist");
                }
                found
            })
            .collect()
    }
}
