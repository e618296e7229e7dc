use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aircast", about = "Internet radio broadcast engine")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "aircast.toml")]
    pub config: Utf8PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the music directory, then broadcast continuously until
    /// interrupted.
    Run(RunArgs),
    /// Scan the music directory and persist the catalog, without
    /// starting the broadcast loop.
    Scan(ScanArgs),
}

#[derive(clap::Args)]
pub struct RunArgs {
    #[arg(long)]
    pub music_dir: Option<Utf8PathBuf>,
    #[arg(long)]
    pub store_path: Option<Utf8PathBuf>,
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(clap::Args)]
pub struct ScanArgs {
    #[arg(long)]
    pub music_dir: Option<Utf8PathBuf>,
    #[arg(long)]
    pub store_path: Option<Utf8PathBuf>,
}
