use camino::Utf8Path;
use color_eyre::{Result, Section, eyre::Context};
use moosicbox_audiotags::{Error, Tag};

use super::ScannedMetadata;

/// Fallback scanner for formats lofty declines to tag; tried after
/// lofty in `scanners()`.
pub struct Scanner;

impl super::FormatScanner for Scanner {
    fn scan(&self, path: &Utf8Path) -> Result<Option<ScannedMetadata>> {
        let tag = match Tag::new().read_from_path(path.as_std_path()) {
            Ok(tag) => tag,
            Err(
                Error::UnknownFileExtension(_)
                | Error::UnsupportedFormat(_)
                | Error::UnsupportedMimeType(_),
            ) => return Ok(None),
            Err(other) => {
                return Err(other)
                    .wrap_err("could not parse metadata")
                    .with_note(|| format!("path: {path}"));
            }
        };

        Ok(Some(ScannedMetadata {
            title: tag.title().unwrap_or_default().to_string(),
            artist: tag.artist().unwrap_or_default().to_string(),
            album: tag.album().map(|a| a.title.to_string()).unwrap_or_default(),
            genre: tag.genre().unwrap_or_default().to_string(),
            year: tag.year().map(|y| y as u32),
            track_num: tag.track().0.map(|n| n as u32),
            duration: tag
                .duration()
                .map(std::time::Duration::from_secs_f64)
                .unwrap_or_default(),
        }))
    }
}
