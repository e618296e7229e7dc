use camino::Utf8Path;
use color_eyre::{Result, Section, eyre::Context};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;

use super::ScannedMetadata;

pub struct Scanner;

impl super::FormatScanner for Scanner {
    fn scan(&self, path: &Utf8Path) -> Result<Option<ScannedMetadata>> {
        let tagged_file = Probe::open(path.as_std_path())
            .wrap_err("could not open file for probing")
            .with_note(|| format!("path: {path}"))?
            .read()
            .wrap_err("could not read tagged file")
            .with_note(|| format!("path: {path}"))?;

        let Some(tag) = tagged_file.primary_tag() else {
            return Ok(None);
        };

        Ok(Some(ScannedMetadata {
            title: tag.title().unwrap_or_default().to_string(),
            artist: tag.artist().unwrap_or_default().to_string(),
            album: tag.album().unwrap_or_default().to_string(),
            genre: tag.genre().unwrap_or_default().to_string(),
            year: tag.year(),
            track_num: tag.track(),
            duration: tagged_file.properties().duration(),
        }))
    }
}
