use std::sync::Arc;

use camino::Utf8PathBuf;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use crate::broadcaster::{Broadcaster, CurrentTrackInfo};
use crate::error::{CoreError, CoreResult};
use crate::library::{Track, TrackData, TrackLibrary};
use crate::playlist::{MasterPlaylist, Playlist, TimeTag};
use crate::scan::{self, ReconcileOutcome};
use crate::scheduler::SchedulerHandle;
use crate::store::Store;

/// How a caller identifies the track to add to a playlist.
#[derive(Debug, Clone)]
pub enum TrackLocator {
    Id(u64),
    Checksum(String),
    Path(Utf8PathBuf),
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub current_track: Option<CurrentTrackInfo>,
    pub active_tag: TimeTag,
    pub subscriber_count: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub active_tag: TimeTag,
    pub timezone: String,
}

/// The administrative command surface the HTTP layer forwards requests
/// to. Every mutating command here triggers a persistence save after
/// succeeding.
pub struct Admin {
    library: Arc<TrackLibrary>,
    master: Arc<RwLock<MasterPlaylist>>,
    store: Store,
    music_dir: Utf8PathBuf,
    broadcaster: Arc<Broadcaster>,
    scheduler: SchedulerHandle,
}

impl Admin {
    pub fn new(
        library: Arc<TrackLibrary>,
        master: Arc<RwLock<MasterPlaylist>>,
        store: Store,
        music_dir: Utf8PathBuf,
        broadcaster: Arc<Broadcaster>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Admin { library, master, store, music_dir, broadcaster, scheduler }
    }

    pub fn library(&self) -> &Arc<TrackLibrary> {
        &self.library
    }

    pub fn master(&self) -> &Arc<RwLock<MasterPlaylist>> {
        &self.master
    }

    async fn save(&self) {
        let master = self.master.read().await;
        if let Err(e) = self.store.save(&self.library, &master).await {
            warn!("persistence save failed: {e}");
        }
    }

    /// Resolves a path-based track locator against the configured music
    /// directory, rejecting anything outside it.
    fn validate_music_path(&self, path: &Utf8PathBuf) -> CoreResult<()> {
        let canonical_dir = self.music_dir.as_str().trim_end_matches('/');
        let candidate = path.as_str();
        if candidate == canonical_dir || candidate.starts_with(&format!("{canonical_dir}/")) {
            Ok(())
        } else {
            Err(CoreError::OutsideMusicDir { path: path.clone() })
        }
    }

    fn resolve_locator(&self, locator: TrackLocator) -> CoreResult<Arc<Track>> {
        match locator {
            TrackLocator::Id(id) => self
                .library
                .get_by_id(id)
                .ok_or_else(|| CoreError::NotFound(format!("no track with id {id}"))),
            TrackLocator::Checksum(checksum) => self
                .library
                .get(&checksum)
                .ok_or_else(|| CoreError::NotFound(format!("no track with checksum {checksum}"))),
            TrackLocator::Path(path) => {
                self.validate_music_path(&path)?;
                self.library
                    .get_by_file_path(&path)
                    .ok_or_else(|| CoreError::NotFound(format!("no track at path {path}")))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn assign(&self, playlist_id: u64, tag: TimeTag) -> CoreResult<()> {
        self.master.write().await.assign(playlist_id, tag)?;
        self.save().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_playlist(&self, name: String, tag: TimeTag) -> CoreResult<u64> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("playlist name must not be empty".into()));
        }
        let id = self.master.write().await.create_playlist(name, tag);
        self.save().await;
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn update_playlist(&self, playlist_id: u64, name: String) -> CoreResult<()> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("playlist name must not be empty".into()));
        }
        let mut master = self.master.write().await;
        let playlist = master
            .find_playlist_mut(playlist_id)
            .ok_or_else(|| CoreError::NotFound(format!("no playlist with id {playlist_id}")))?;
        playlist.name = name;
        drop(master);
        self.save().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_playlist(&self, playlist_id: u64) -> CoreResult<()> {
        self.master.write().await.delete_playlist(playlist_id)?;
        self.save().await;
        Ok(())
    }

    #[instrument(skip(self, locator))]
    pub async fn add_track_to_playlist(&self, playlist_id: u64, locator: TrackLocator) -> CoreResult<()> {
        let track = self.resolve_locator(locator)?;
        let mut master = self.master.write().await;
        let playlist = master
            .find_playlist_mut(playlist_id)
            .ok_or_else(|| CoreError::NotFound(format!("no playlist with id {playlist_id}")))?;
        playlist.add_track(track);
        drop(master);
        self.save().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_track(&self, playlist_id: u64, index: usize) -> CoreResult<()> {
        let mut master = self.master.write().await;
        let playlist = master
            .find_playlist_mut(playlist_id)
            .ok_or_else(|| CoreError::NotFound(format!("no playlist with id {playlist_id}")))?;
        playlist
            .remove_track(index)
            .ok_or_else(|| CoreError::NotFound(format!("no track at index {index}")))?;
        drop(master);
        self.save().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn move_track(&self, playlist_id: u64, from: usize, to: usize) -> CoreResult<()> {
        let mut master = self.master.write().await;
        let playlist = master
            .find_playlist_mut(playlist_id)
            .ok_or_else(|| CoreError::NotFound(format!("no playlist with id {playlist_id}")))?;
        if !playlist.move_track(from, to) {
            return Err(CoreError::Validation(format!("invalid move {from} -> {to}")));
        }
        drop(master);
        self.save().await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn shuffle(&self, playlist_id: u64) -> CoreResult<()> {
        let mut master = self.master.write().await;
        let playlist = master
            .find_playlist_mut(playlist_id)
            .ok_or_else(|| CoreError::NotFound(format!("no playlist with id {playlist_id}")))?;
        playlist.shuffle();
        drop(master);
        self.save().await;
        Ok(())
    }

    /// Scans the music directory, prunes gone files, and appends newly
    /// discovered orphans to the active playlist.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let outcome = scan::reconcile(self.music_dir.clone(), Arc::clone(&self.library)).await;

        let mut master = self.master.write().await;
        for removed in &outcome.removed {
            for playlist in all_playlists_mut(&mut master) {
                playlist.remove_tracks_by_checksum(&removed.checksum);
            }
        }
        if !outcome.added.is_empty() {
            let tag = master.active_tag();
            let index = master.active_playlist_index();
            if let Some(playlist) = master.slot_mut(tag).get_mut(index) {
                playlist.add_tracks(outcome.added.iter().cloned());
            }
        }
        drop(master);
        self.save().await;
        outcome
    }

    pub fn skip_next(&self) {
        self.broadcaster.skip();
    }

    #[instrument(skip(self))]
    pub async fn skip_prev(&self) {
        self.master.write().await.seek_prev();
        self.broadcaster.skip();
    }

    #[instrument(skip(self))]
    pub async fn set_timezone(&self, name: &str) -> CoreResult<()> {
        self.master.write().await.set_timezone(name)?;
        self.scheduler.force_check();
        self.save().await;
        Ok(())
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        let master = self.master.read().await;
        StatusSnapshot {
            current_track: self.broadcaster.current_track(),
            active_tag: master.active_tag(),
            subscriber_count: self.broadcaster.subscriber_count(),
        }
    }

    pub async fn get_queue(&self, n: usize) -> Vec<TrackData> {
        self.master.read().await.peek_queue(n).iter().map(|t| t.to_data()).collect()
    }

    pub async fn scheduler_status(&self) -> SchedulerStatus {
        let master = self.master.read().await;
        SchedulerStatus {
            active_tag: master.active_tag(),
            timezone: master.timezone_name().to_string(),
        }
    }
}

fn all_playlists_mut(master: &mut MasterPlaylist) -> Vec<&mut Playlist> {
    TimeTag::FALLBACK_ORDER
        .into_iter()
        .flat_map(|tag| master.slot_mut(tag).iter_mut())
        .collect()
}

/// First-run bootstrap: if the master has no playlists at all yet,
/// create one under the current active tag holding every library track
/// in path-sorted order.
pub fn bootstrap_default_playlist(library: &TrackLibrary, master: &mut MasterPlaylist) {
    if master.playlists().next().is_some() {
        return;
    }
    let mut tracks = library.list();
    tracks.sort_by(|a, b| a.file_path().cmp(&b.file_path()));
    if tracks.is_empty() {
        return;
    }
    let tag = master.active_tag();
    let mut playlist = Playlist::new("default", tag);
    playlist.add_tracks(tracks);
    master.add_playlist(playlist);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Encoder, EncoderConfig};
    use crate::library::TrackFormat;
    use crate::scheduler::Scheduler;
    use std::time::Duration;

    fn track_data(checksum: &str, path: &str) -> TrackData {
        TrackData {
            id: 0,
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            genre: "g".into(),
            year: None,
            track_num: None,
            duration: Duration::from_secs(1),
            file_path: Utf8PathBuf::from(path),
            format: TrackFormat::Mp3,
            checksum: checksum.into(),
        }
    }

    async fn test_admin(music_dir: Utf8PathBuf, library: Arc<TrackLibrary>) -> (Admin, tempfile::TempDir) {
        let store_dir = tempfile::tempdir().unwrap();
        let store_path = Utf8PathBuf::from_path_buf(store_dir.path().join("state.json")).unwrap();
        let master = Arc::new(RwLock::new(MasterPlaylist::new(Arc::clone(&library))));
        let encoder = Encoder::new(EncoderConfig::default());
        let broadcaster = Broadcaster::new(Arc::clone(&master), encoder, 10);
        let (_scheduler, handle) = Scheduler::new(Arc::clone(&master), Duration::from_secs(3600), |_| {});
        let admin = Admin::new(library, master, Store::new(store_path), music_dir, broadcaster, handle);
        (admin, store_dir)
    }

    /// Rejects a sibling directory that merely shares a string prefix
    /// with the configured music directory.
    #[tokio::test]
    async fn validate_music_path_rejects_sibling_directory_sharing_a_prefix() {
        let lib = Arc::new(TrackLibrary::new());
        let (admin, _store_dir) = test_admin(Utf8PathBuf::from("/music"), lib).await;

        assert!(admin.validate_music_path(&Utf8PathBuf::from("/music/song.mp3")).is_ok());
        assert!(admin.validate_music_path(&Utf8PathBuf::from("/music2/song.mp3")).is_err());
    }

    #[tokio::test]
    async fn reconcile_cascades_removed_tracks_and_appends_orphans_to_the_active_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let stale_path = Utf8PathBuf::from_path_buf(dir.path().join("gone.mp3")).unwrap();
        let fresh_path = Utf8PathBuf::from_path_buf(dir.path().join("fresh.mp3")).unwrap();
        std::fs::write(fresh_path.as_std_path(), b"fresh bytes").unwrap();

        let library = Arc::new(TrackLibrary::new());
        let (stale_track, _) = library.add(track_data("stale", stale_path.as_str())).unwrap();
        let music_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let (admin, _store_dir) = test_admin(music_dir, Arc::clone(&library)).await;

        let tag = admin.master().read().await.active_tag();
        let playlist_id = admin.create_playlist("set".to_string(), tag).await.unwrap();
        admin.add_track_to_playlist(playlist_id, TrackLocator::Id(stale_track.id)).await.unwrap();

        let outcome = admin.reconcile().await;
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.added.len(), 1);

        let master = admin.master().read().await;
        let playlist = master.find_playlist(playlist_id).unwrap();
        assert_eq!(playlist.count(), 1);
        assert_eq!(playlist.tracks()[0].file_path(), fresh_path);
    }
}
