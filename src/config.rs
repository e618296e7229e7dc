use camino::Utf8PathBuf;
use color_eyre::Result;
use color_eyre::eyre::Context;
use etcetera::BaseStrategy;
use serde::{Deserialize, Serialize};

/// Station-wide settings, loaded from a TOML file with every field
/// defaulted so a missing file (or a partially-filled one) still
/// produces a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_music_dir")]
    pub music_dir: Utf8PathBuf,
    #[serde(default = "default_store_path")]
    pub store_path: Utf8PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_station_name")]
    pub station_name: String,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_scheduler_period_secs")]
    pub scheduler_period_secs: u64,
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    #[serde(default = "default_subscription_queue_capacity")]
    pub subscription_queue_capacity: usize,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

fn default_music_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("./music")
}

fn default_store_path() -> Utf8PathBuf {
    etcetera::choose_base_strategy()
        .ok()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("aircast").join("state.json")).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("./aircast-state.json"))
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_station_name() -> String {
    "aircast".to_string()
}

fn default_bitrate_kbps() -> u32 {
    128
}

fn default_channels() -> u8 {
    2
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_scheduler_period_secs() -> u64 {
    60
}

fn default_max_subscribers() -> usize {
    200
}

fn default_subscription_queue_capacity() -> usize {
    512
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            music_dir: default_music_dir(),
            store_path: default_store_path(),
            bind_addr: default_bind_addr(),
            station_name: default_station_name(),
            bitrate_kbps: default_bitrate_kbps(),
            channels: default_channels(),
            sample_rate: default_sample_rate(),
            scheduler_period_secs: default_scheduler_period_secs(),
            max_subscribers: default_max_subscribers(),
            subscription_queue_capacity: default_subscription_queue_capacity(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

impl Config {
    /// Loads from `path` if it exists; a missing config file is not an
    /// error, it just means every field falls back to its default.
    pub async fn load(path: &Utf8PathBuf) -> Result<Config> {
        match tokio::fs::read_to_string(path.as_std_path()).await {
            Ok(contents) => {
                toml::from_str(&contents).wrap_err_with(|| format!("could not parse config at {path}"))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e).wrap_err_with(|| format!("could not read config at {path}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_fills_in_every_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bitrate_kbps, 128);
        assert_eq!(config.channels, 2);
        assert_eq!(config.station_name, "aircast");
    }

    #[test]
    fn partial_document_only_overrides_named_fields() {
        let config: Config = toml::from_str(r#"station_name = "Night Owl Radio""#).unwrap();
        assert_eq!(config.station_name, "Night Owl Radio");
        assert_eq!(config.bitrate_kbps, 128);
    }
}
