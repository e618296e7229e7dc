use std::collections::HashMap;
use std::sync::Arc;

use jiff::Timestamp;
use jiff::tz::TimeZone;
use tracing::{info, instrument};

use super::playlist::{Playlist, PlaylistRef};
use super::tag::TimeTag;
use crate::error::{CoreError, CoreResult};
use crate::library::{Track, TrackLibrary};

/// Four named playlist slots plus the scheduling cursor into them.
pub struct MasterPlaylist {
    library: Arc<TrackLibrary>,
    slots: HashMap<TimeTag, Vec<Playlist>>,
    active_tag: TimeTag,
    active_playlist_index: usize,
    timezone_name: String,
    timezone: TimeZone,
}

/// Fired by `resolve_active_tag` when the active tag changes.
#[derive(Debug, Clone)]
pub struct TagTransition {
    pub previous_tag: TimeTag,
    pub new_tag: TimeTag,
    pub resolved_active_playlist: Option<String>,
    pub timestamp: Timestamp,
}

impl MasterPlaylist {
    pub fn new(library: Arc<TrackLibrary>) -> Self {
        let active_tag = Self::tag_for_now(&TimeZone::UTC);
        let mut slots = HashMap::new();
        for tag in TimeTag::FALLBACK_ORDER {
            slots.insert(tag, Vec::new());
        }
        MasterPlaylist {
            library,
            slots,
            active_tag,
            active_playlist_index: 0,
            timezone_name: String::new(),
            timezone: TimeZone::UTC,
        }
    }

    pub fn library(&self) -> &Arc<TrackLibrary> {
        &self.library
    }

    pub fn timezone_name(&self) -> &str {
        &self.timezone_name
    }

    /// Empty ⇒ UTC; invalid IANA names are rejected.
    #[instrument(skip(self))]
    pub fn set_timezone(&mut self, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            self.timezone_name = String::new();
            self.timezone = TimeZone::UTC;
            return Ok(());
        }
        let tz = TimeZone::get(name)
            .map_err(|_| CoreError::InvalidTimezone(name.to_string()))?;
        self.timezone_name = name.to_string();
        self.timezone = tz;
        Ok(())
    }

    fn tag_for_now(tz: &TimeZone) -> TimeTag {
        let zoned = Timestamp::now().to_zoned(tz.clone());
        TimeTag::for_hour(zoned.hour() as u8)
    }

    pub fn active_tag(&self) -> TimeTag {
        self.active_tag
    }

    pub fn active_playlist_index(&self) -> usize {
        self.active_playlist_index
    }

    pub fn slot(&self, tag: TimeTag) -> &[Playlist] {
        self.slots.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn slot_mut(&mut self, tag: TimeTag) -> &mut Vec<Playlist> {
        self.slots.entry(tag).or_default()
    }

    /// Adds a playlist under its declared tag.
    pub fn add_playlist(&mut self, mut playlist: Playlist) {
        playlist.attach_library(Arc::clone(&self.library));
        self.slots.entry(playlist.tag).or_default().push(playlist);
    }

    pub fn create_playlist(&mut self, name: impl Into<String>, tag: TimeTag) -> u64 {
        let playlist = Playlist::new(name, tag);
        let id = playlist.id;
        self.add_playlist(playlist);
        id
    }

    pub fn find_playlist(&self, id: u64) -> Option<&Playlist> {
        self.slots.values().flatten().find(|p| p.id == id)
    }

    pub fn find_playlist_mut(&mut self, id: u64) -> Option<&mut Playlist> {
        self.slots.values_mut().flatten().find(|p| p.id == id)
    }

    pub fn delete_playlist(&mut self, id: u64) -> CoreResult<()> {
        for playlists in self.slots.values_mut() {
            if let Some(pos) = playlists.iter().position(|p| p.id == id) {
                playlists.remove(pos);
                return Ok(());
            }
        }
        Err(CoreError::NotFound(format!("no playlist with id {id}")))
    }

    /// Reassigns a playlist to a new tag, removing it from the old slot
    /// first so a playlist never appears in two slots at once.
    pub fn assign(&mut self, id: u64, new_tag: TimeTag) -> CoreResult<()> {
        let mut playlist = None;
        for playlists in self.slots.values_mut() {
            if let Some(pos) = playlists.iter().position(|p| p.id == id) {
                playlist = Some(playlists.remove(pos));
                break;
            }
        }
        let mut playlist = playlist.ok_or_else(|| CoreError::NotFound(format!("no playlist with id {id}")))?;
        playlist.tag = new_tag;
        self.slots.entry(new_tag).or_default().push(playlist);
        Ok(())
    }

    /// Recomputes the active tag from wall-clock time in the configured
    /// timezone. Returns `Some(transition)` if the tag changed.
    #[instrument(skip(self))]
    pub fn resolve_active_tag(&mut self) -> Option<TagTransition> {
        let new_tag = Self::tag_for_now(&self.timezone);
        if new_tag == self.active_tag {
            return None;
        }
        let previous_tag = self.active_tag;
        self.active_tag = new_tag;
        self.active_playlist_index = 0;
        let resolved_active_playlist = self.active_playlist().map(|p| p.name.clone());
        info!(?previous_tag, ?new_tag, "time tag transition");
        Some(TagTransition {
            previous_tag,
            new_tag,
            resolved_active_playlist,
            timestamp: Timestamp::now(),
        })
    }

    /// The tag whose slot should currently supply tracks: the active
    /// tag's slot if non-empty, else the first non-empty slot in fixed
    /// fallback order.
    fn effective_tag(&self) -> Option<TimeTag> {
        if !self.slot(self.active_tag).is_empty() {
            return Some(self.active_tag);
        }
        TimeTag::FALLBACK_ORDER
            .into_iter()
            .find(|tag| !self.slot(*tag).is_empty())
    }

    pub fn active_playlist(&self) -> Option<&Playlist> {
        let tag = self.effective_tag()?;
        let slot = self.slot(tag);
        slot.get(self.active_playlist_index.min(slot.len().saturating_sub(1)))
    }

    fn active_playlist_mut(&mut self) -> Option<&mut Playlist> {
        let tag = self.effective_tag()?;
        let len = self.slots.get(&tag)?.len();
        if len == 0 {
            return None;
        }
        self.active_playlist_index = self.active_playlist_index.min(len - 1);
        self.slots.get_mut(&tag)?.get_mut(self.active_playlist_index)
    }

    /// Returns the next track to broadcast, advancing through playlists
    /// in the active slot if one is exhausted.
    pub fn next(&mut self) -> CoreResult<Arc<Track>> {
        let Some(tag) = self.effective_tag() else {
            return Err(CoreError::NotFound("no tracks available".into()));
        };
        let slot_len = self.slots.get(&tag).map(Vec::len).unwrap_or(0);
        for _ in 0..slot_len.max(1) {
            if let Some(playlist) = self.active_playlist_mut() {
                if let Some(track) = playlist.next() {
                    return Ok(track);
                }
            }
            self.active_playlist_index = (self.active_playlist_index + 1) % slot_len.max(1);
        }
        Err(CoreError::NotFound("no tracks available".into()))
    }

    pub fn peek_queue(&self, n: usize) -> Vec<Arc<Track>> {
        self.active_playlist().map(|p| p.peek_queue(n)).unwrap_or_default()
    }

    /// Moves the active playlist's cursor back one track.
    pub fn seek_prev(&mut self) {
        if let Some(playlist) = self.active_playlist_mut() {
            playlist.seek_prev();
        }
    }

    pub fn playlists(&self) -> impl Iterator<Item = &Playlist> {
        self.slots.values().flatten()
    }

    /// Serializable snapshot of every playlist, grouped by tag.
    pub fn playlist_refs_by_tag(&self) -> HashMap<TimeTag, Vec<PlaylistRef>> {
        self.slots
            .iter()
            .map(|(tag, playlists)| (*tag, playlists.iter().map(Playlist::to_ref).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{TrackData, TrackFormat};
    use camino::Utf8PathBuf;
    use std::time::Duration;

    fn track_data(checksum: &str) -> TrackData {
        TrackData {
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
        }
    }

    #[test]
    fn falls_back_to_first_non_empty_slot_in_fixed_order() {
        let lib = Arc::new(TrackLibrary::new());
        let (t1, _) = lib.add(track_data("t1")).unwrap();
        let mut master = MasterPlaylist::new(Arc::clone(&lib));
        master.active_tag = TimeTag::Morning; // empty slot

        let mut evening = Playlist::new("evening-set", TimeTag::Evening);
        evening.add_track(t1);
        master.add_playlist(evening);

        let next = master.next().unwrap();
        assert_eq!(next.checksum, "t1");
    }

    #[test]
    fn empty_master_errors_with_no_tracks_available() {
        let lib = Arc::new(TrackLibrary::new());
        let mut master = MasterPlaylist::new(lib);
        assert!(master.next().is_err());
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let lib = Arc::new(TrackLibrary::new());
        let mut master = MasterPlaylist::new(lib);
        assert!(master.set_timezone("Not/AZone").is_err());
        assert!(master.set_timezone("").is_ok());
        assert_eq!(master.timezone_name(), "");
    }

    /// S5 — time transition: resolving against a stale belief fires a
    /// transition event and resets the active playlist index.
    #[test]
    fn resolve_active_tag_resets_playlist_index_on_transition() {
        let lib = Arc::new(TrackLibrary::new());
        let mut master = MasterPlaylist::new(lib);
        let actual_tag = master.active_tag();
        let stale_tag = if actual_tag == TimeTag::Morning { TimeTag::Night } else { TimeTag::Morning };
        master.active_tag = stale_tag;
        master.active_playlist_index = 3;

        let transition = master.resolve_active_tag().expect("stale tag should produce a transition");
        assert_eq!(transition.previous_tag, stale_tag);
        assert_eq!(transition.new_tag, actual_tag);
        assert_eq!(master.active_playlist_index(), 0);
    }

    #[test]
    fn assign_moves_playlist_between_slots() {
        let lib = Arc::new(TrackLibrary::new());
        let mut master = MasterPlaylist::new(lib);
        let id = master.create_playlist("p", TimeTag::Morning);
        master.assign(id, TimeTag::Night).unwrap();

        assert!(master.slot(TimeTag::Morning).is_empty());
        assert_eq!(master.slot(TimeTag::Night).len(), 1);
    }
}
