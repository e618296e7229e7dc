mod master;
mod playlist;
mod tag;

pub use master::{MasterPlaylist, TagTransition};
pub use playlist::{bump_id_counter_above, Playlist, PlaylistRef};
pub use tag::TimeTag;
