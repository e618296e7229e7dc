use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::library::{TrackData, TrackLibrary};
use crate::playlist::{MasterPlaylist, Playlist, PlaylistRef, TimeTag};

const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Serialize)]
struct StoreFileV2<'a> {
    version: u32,
    timezone: &'a str,
    library: Vec<TrackData>,
    playlists: HashMap<TimeTag, Vec<PlaylistRef>>,
}

#[derive(Debug, Deserialize)]
struct StoreFileV2Owned {
    #[allow(dead_code)]
    version: u32,
    timezone: String,
    library: Vec<TrackData>,
    playlists: HashMap<TimeTag, Vec<PlaylistRef>>,
}

/// Legacy (v1) on-disk shape: each playlist embeds full track objects
/// instead of referencing the library by checksum. Loaded and migrated
/// to the current format transparently.
#[derive(Debug, Deserialize)]
struct PlaylistV1 {
    id: u64,
    name: String,
    tag: TimeTag,
    tracks: Vec<TrackData>,
    #[serde(rename = "currentTrackChecksum")]
    current_track_checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreFileV1 {
    #[serde(default)]
    timezone: String,
    playlists: HashMap<TimeTag, Vec<PlaylistV1>>,
}

/// Self-contained single-playlist export format: embeds Track objects
/// directly so a playlist can move between installations.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistExport {
    pub name: String,
    pub tag: TimeTag,
    pub tracks: Vec<TrackData>,
}

/// Atomic JSON-snapshot persistence for the master state.
pub struct Store {
    path: Utf8PathBuf,
}

impl Store {
    pub fn new(path: Utf8PathBuf) -> Self {
        Store { path }
    }

    /// Serializes to a temp file in the same directory, fsyncs it, then
    /// renames over the destination — rename is the single atomic
    /// commit point, so a crash mid-write never leaves a truncated file
    /// at the real path.
    pub async fn save(&self, library: &TrackLibrary, master: &MasterPlaylist) -> CoreResult<()> {
        let snapshot = StoreFileV2 {
            version: CURRENT_VERSION,
            timezone: master.timezone_name(),
            library: library.list().iter().map(|t| t.to_data()).collect(),
            playlists: master.playlist_refs_by_tag(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CoreError::Io(io::Error::other(e)))?;

        let tmp_path = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, &json).await?;
        let file = tokio::fs::File::open(&tmp_path).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Loads the master state, migrating a v1 file transparently. A
    /// missing file is the first-run case and yields an empty master,
    /// not an error.
    pub async fn load(&self) -> CoreResult<(Arc<TrackLibrary>, MasterPlaylist)> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let library = Arc::new(TrackLibrary::new());
                return Ok((Arc::clone(&library), MasterPlaylist::new(library)));
            }
            Err(e) => return Err(CoreError::Io(e)),
        };

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| CoreError::Io(io::Error::other(e)))?;
        let version = value.get("version").and_then(Value::as_u64).unwrap_or(1);

        if version == 1 {
            info!("migrating v1 store to v2 on load");
            let file: StoreFileV1 =
                serde_json::from_value(value).map_err(|e| CoreError::Io(io::Error::other(e)))?;
            self.load_v1(file)
        } else {
            let file: StoreFileV2Owned =
                serde_json::from_value(value).map_err(|e| CoreError::Io(io::Error::other(e)))?;
            self.load_v2(file)
        }
    }

    fn load_v2(&self, file: StoreFileV2Owned) -> CoreResult<(Arc<TrackLibrary>, MasterPlaylist)> {
        let library = Arc::new(TrackLibrary::new());
        for track in file.library {
            library.import(track)?;
        }

        let mut master = MasterPlaylist::new(Arc::clone(&library));
        master.set_timezone(&file.timezone).unwrap_or_else(|e| {
            warn!("stored timezone {:?} is invalid, falling back to UTC: {e}", file.timezone);
        });

        for (tag, refs) in file.playlists {
            for playlist_ref in refs {
                let tracks = library.resolve(&playlist_ref.track_checksums);
                let mut playlist_ref = playlist_ref;
                playlist_ref.tag = tag;
                let playlist = Playlist::from_ref(playlist_ref, tracks, Some(Arc::clone(&library)));
                master.add_playlist(playlist);
            }
        }

        let _ = master.resolve_active_tag();
        Ok((library, master))
    }

    fn load_v1(&self, file: StoreFileV1) -> CoreResult<(Arc<TrackLibrary>, MasterPlaylist)> {
        let library = Arc::new(TrackLibrary::new());

        for playlists in file.playlists.values() {
            for playlist in playlists {
                for track in &playlist.tracks {
                    library.add(track.clone())?;
                }
            }
        }

        let mut master = MasterPlaylist::new(Arc::clone(&library));
        master.set_timezone(&file.timezone).unwrap_or_else(|e| {
            warn!("stored timezone {:?} is invalid, falling back to UTC: {e}", file.timezone);
        });

        for (tag, playlists) in file.playlists {
            for playlist in playlists {
                let checksums: Vec<String> =
                    playlist.tracks.iter().map(|t| t.checksum.clone()).collect();
                let playlist_ref = PlaylistRef {
                    id: playlist.id,
                    name: playlist.name,
                    tag,
                    track_checksums: checksums.clone(),
                    current_track_checksum: playlist.current_track_checksum,
                };
                let tracks = library.resolve(&checksums);
                let playlist = Playlist::from_ref(playlist_ref, tracks, Some(Arc::clone(&library)));
                master.add_playlist(playlist);
            }
        }

        let _ = master.resolve_active_tag();
        Ok((library, master))
    }

    /// Exports a single playlist to a self-contained document embedding
    /// full track objects.
    pub fn export_playlist(playlist: &Playlist) -> PlaylistExport {
        PlaylistExport {
            name: playlist.name.clone(),
            tag: playlist.tag,
            tracks: playlist.tracks().iter().map(|t| t.to_data()).collect(),
        }
    }

    /// Imports a playlist export, merging its tracks into `library` via
    /// `add_or_update` and assigning the playlist a fresh id.
    pub fn import_playlist(export: PlaylistExport, library: &Arc<TrackLibrary>) -> CoreResult<Playlist> {
        let mut playlist = Playlist::new(export.name, export.tag);
        playlist.attach_library(Arc::clone(library));
        for track in export.tracks {
            let canonical = library.add_or_update(track)?;
            playlist.add_track(canonical);
        }
        Ok(playlist)
    }
}
