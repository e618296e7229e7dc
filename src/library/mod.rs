mod catalog;
mod track;

pub use catalog::TrackLibrary;
pub use track::{MetadataUpdate, Track, TrackData, TrackFormat};
