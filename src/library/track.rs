use std::sync::RwLock;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One of the five audio formats the scanner and encoder understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TrackFormat {
    Mp3,
    Ogg,
    Flac,
    Aac,
    Wav,
}

impl TrackFormat {
    /// Accepted extensions, case-insensitive.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "ogg" => Some(Self::Ogg),
            "flac" => Some(Self::Flac),
            "aac" => Some(Self::Aac),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }
}

/// Editorial metadata a caller may partially update.
///
/// `None` fields are left untouched by `TrackLibrary::update`.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<Option<u32>>,
    pub track_num: Option<Option<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackMutable {
    file_path: Utf8PathBuf,
    format: TrackFormat,
    title: String,
    artist: String,
    album: String,
    genre: String,
    year: Option<u32>,
    track_num: Option<u32>,
    #[serde(with = "duration_secs")]
    duration: Duration,
}

/// An audio file, content-addressed by its SHA-256 checksum.
///
/// `id` and `checksum` are immutable for the lifetime of the object;
/// every other field lives behind a lock so an edit through one
/// `Arc<Track>` is visible through every other reference to the same
/// track (library, playlists, in-flight broadcast state).
#[derive(Debug)]
pub struct Track {
    pub id: u64,
    pub checksum: String,
    mutable: RwLock<TrackMutable>,
}

/// Plain-data snapshot of a track, used for serialization and for
/// building a fresh `Track` before it has a library-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackData {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: Option<u32>,
    #[serde(rename = "trackNum")]
    pub track_num: Option<u32>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    #[serde(rename = "filePath")]
    pub file_path: Utf8PathBuf,
    pub format: TrackFormat,
    pub checksum: String,
}

impl Track {
    /// Build a track with id 0 — callers must assign a real id via the
    /// library before this is considered canonical.
    pub fn new_unassigned(data: TrackData) -> Self {
        Track {
            id: data.id,
            checksum: data.checksum,
            mutable: RwLock::new(TrackMutable {
                file_path: data.file_path,
                format: data.format,
                title: data.title,
                artist: data.artist,
                album: data.album,
                genre: data.genre,
                year: data.year,
                track_num: data.track_num,
                duration: data.duration,
            }),
        }
    }

    fn with_id(mut data: TrackData, id: u64) -> Self {
        data.id = id;
        Self::new_unassigned(data)
    }

    pub(crate) fn reassign_id(self, id: u64) -> Self {
        Self::with_id(self.to_data(), id)
    }

    pub fn to_data(&self) -> TrackData {
        let m = self.mutable.read().unwrap();
        TrackData {
            id: self.id,
            title: m.title.clone(),
            artist: m.artist.clone(),
            album: m.album.clone(),
            genre: m.genre.clone(),
            year: m.year,
            track_num: m.track_num,
            duration: m.duration,
            file_path: m.file_path.clone(),
            format: m.format,
            checksum: self.checksum.clone(),
        }
    }

    pub fn file_path(&self) -> Utf8PathBuf {
        self.mutable.read().unwrap().file_path.clone()
    }

    pub fn format(&self) -> TrackFormat {
        self.mutable.read().unwrap().format
    }

    pub fn title(&self) -> String {
        self.mutable.read().unwrap().title.clone()
    }

    pub fn artist(&self) -> String {
        self.mutable.read().unwrap().artist.clone()
    }

    pub fn album(&self) -> String {
        self.mutable.read().unwrap().album.clone()
    }

    pub fn genre(&self) -> String {
        self.mutable.read().unwrap().genre.clone()
    }

    pub fn duration(&self) -> Duration {
        self.mutable.read().unwrap().duration
    }

    /// Applies only the fields the update set, leaving the rest
    /// untouched, matching the partial-metadata semantics of
    /// `TrackLibrary::update`.
    pub fn apply_update(&self, update: MetadataUpdate) {
        let mut m = self.mutable.write().unwrap();
        if let Some(title) = update.title {
            m.title = title;
        }
        if let Some(artist) = update.artist {
            m.artist = artist;
        }
        if let Some(album) = update.album {
            m.album = album;
        }
        if let Some(genre) = update.genre {
            m.genre = genre;
        }
        if let Some(year) = update.year {
            m.year = year;
        }
        if let Some(track_num) = update.track_num {
            m.track_num = track_num;
        }
    }

    /// Updates the file path and format only, preserving editorial
    /// metadata — used by `add_or_update` when a known file has moved.
    pub fn relocate(&self, file_path: Utf8PathBuf, format: TrackFormat) {
        let mut m = self.mutable.write().unwrap();
        m.file_path = file_path;
        m.format = format;
    }

    /// Substring match over title/artist/album/genre, case-insensitive.
    pub fn matches(&self, query: &str) -> bool {
        let m = self.mutable.read().unwrap();
        let q = query.to_lowercase();
        m.title.to_lowercase().contains(&q)
            || m.artist.to_lowercase().contains(&q)
            || m.album.to_lowercase().contains(&q)
            || m.genre.to_lowercase().contains(&q)
    }

    pub fn exists_on_disk(&self) -> bool {
        self.file_path().as_std_path().is_file()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
