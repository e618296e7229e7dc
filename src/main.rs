use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use aircast::admin::Admin;
use aircast::broadcaster::Broadcaster;
use aircast::config::Config;
use aircast::encoder::{Encoder, EncoderConfig};
use aircast::http;
use aircast::scan::reconcile;
use aircast::scheduler::Scheduler;
use aircast::store::Store;

use crate::cli::{Cli, Commands};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().unwrap();
    setup_tracing();

    let options = Cli::parse();
    let mut config = Config::load(&options.config).await.wrap_err("could not load config")?;

    match options.command {
        Commands::Scan(args) => {
            if let Some(music_dir) = args.music_dir {
                config.music_dir = music_dir;
            }
            if let Some(store_path) = args.store_path {
                config.store_path = store_path;
            }
            run_scan(config).await
        }
        Commands::Run(args) => {
            if let Some(music_dir) = args.music_dir {
                config.music_dir = music_dir;
            }
            if let Some(store_path) = args.store_path {
                config.store_path = store_path;
            }
            if let Some(port) = args.port {
                config.bind_addr = format!("0.0.0.0:{port}");
            }
            run_station(config).await
        }
    }
}

async fn run_scan(config: Config) -> Result<()> {
    let store = Store::new(config.store_path.clone());
    let (library, master) = store.load().await?;

    let outcome = reconcile(config.music_dir.clone(), Arc::clone(&library)).await;
    info!(
        removed = outcome.removed.len(),
        added = outcome.added.len(),
        errors = outcome.scan_errors.len(),
        "scan complete"
    );
    for (path, reason) in &outcome.scan_errors {
        tracing::warn!(%path, %reason, "failed to scan file");
    }

    store.save(&library, &master).await?;
    Ok(())
}

async fn run_station(config: Config) -> Result<()> {
    let store = Store::new(config.store_path.clone());
    let (library, master) = store.load().await?;
    let master = Arc::new(RwLock::new(master));

    info!(music_dir = %config.music_dir, "scanning music directory before going live");
    let outcome = reconcile(config.music_dir.clone(), Arc::clone(&library)).await;
    info!(added = outcome.added.len(), removed = outcome.removed.len(), "initial scan complete");

    {
        let mut guard = master.write().await;
        aircast::admin::bootstrap_default_playlist(&library, &mut guard);
    }

    let encoder = Encoder::new(EncoderConfig {
        ffmpeg_path: config.ffmpeg_path.clone(),
        bitrate_kbps: config.bitrate_kbps,
        channels: config.channels,
        sample_rate: config.sample_rate,
    });
    let broadcaster = Broadcaster::with_queue_capacity(
        Arc::clone(&master),
        encoder,
        config.max_subscribers,
        config.subscription_queue_capacity,
    );

    let shutdown = CancellationToken::new();
    let (scheduler, scheduler_handle) = Scheduler::new(
        Arc::clone(&master),
        Duration::from_secs(config.scheduler_period_secs),
        |transition| {
            info!(previous_tag = ?transition.previous_tag, new_tag = ?transition.new_tag, "active time slot changed");
        },
    );

    let admin = Arc::new(Admin::new(
        Arc::clone(&library),
        Arc::clone(&master),
        Store::new(config.store_path.clone()),
        config.music_dir.clone(),
        Arc::clone(&broadcaster),
        scheduler_handle,
    ));

    let app = http::router(http::AppState {
        admin: Arc::clone(&admin),
        broadcaster: Arc::clone(&broadcaster),
        station_name: config.station_name.clone(),
        bitrate_kbps: config.bitrate_kbps,
    });
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .wrap_err_with(|| format!("could not bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, station = %config.station_name, "aircast is live");

    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));
    let broadcaster_task = tokio::spawn(Arc::clone(&broadcaster).run(shutdown.clone()));
    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await.wrap_err("failed to listen for ctrl-c")?;
    info!("shutdown requested, saving state");
    shutdown.cancel();

    {
        use futures_concurrency::prelude::*;
        let _ = (scheduler_task, broadcaster_task, http_task).join().await;
    }

    let master = master.read().await;
    store.save(&library, &master).await?;
    Ok(())
}

pub fn setup_tracing() {
    use tracing_subscriber::filter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = filter::EnvFilter::builder().from_env().unwrap();
    let fmt = fmt::layer().pretty().with_line_number(true);

    let _ignore_err = tracing_subscriber::registry().with(fmt).with(filter).try_init();
}
