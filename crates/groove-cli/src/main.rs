mod console;
mod core;
mod http;
mod mpv;

use std::sync::Arc;

use clap::Parser;
use groove_core::config::Config;
use groove_core::context::SessionContext;
use groove_core::device::{DeviceEvent, NullDevice, PlaybackDevice};
use groove_core::persist::{JsonFileStore, Persistence};
use groove_core::platform;
use groove_core::protocol::{Command, Notice};
use groove_core::search::{ItunesClient, SearchFetcher};
use tokio::sync::{broadcast, mpsc};

#[derive(Parser, Debug)]
#[command(name = "groovewave", about = "Search, preview and collect music from the terminal")]
struct Args {
    /// Do not start mpv; playback is silent.
    #[arg(long)]
    no_audio: bool,
    /// Do not start the HTTP control API.
    #[arg(long)]
    no_http: bool,
    /// Keep favorites, playlists and history in memory only.
    #[arg(long)]
    ephemeral: bool,
    /// First search instead of the configured start-up term.
    #[arg(long)]
    term: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("groovewave.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; otherwise keep HTTP client internals quiet.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,groove_core=debug,groove_cli=debug,hyper_util=warn,reqwest=warn".to_string()
    });
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("groovewave log: {}", log_path.display());
    tracing::info!("groovewave starting…");

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("config unreadable, using defaults: {}", e);
        Config::default()
    });

    let persistence = if args.ephemeral {
        Persistence::in_memory()
    } else {
        Persistence::new(Arc::new(JsonFileStore::new(config.paths.store_dir.clone())))
    };
    let ctx = SessionContext::load(persistence);

    // ── channels ─────────────────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<core::AppEvent>(1024);
    let (notice_tx, notice_rx) = broadcast::channel::<Notice>(1024);
    let (device_tx, mut device_rx) = mpsc::channel::<DeviceEvent>(256);

    // ── playback device ──────────────────────────────────────────────────────
    let use_mpv = config.player.use_mpv && !args.no_audio;
    let mpv_device = if use_mpv && platform::find_mpv_binary().is_some() {
        Some(Arc::new(mpv::MpvDevice::new(device_tx)))
    } else {
        if use_mpv {
            eprintln!("mpv not found; playback will be silent (set MPV_PATH)");
        }
        None
    };
    let device: Arc<dyn PlaybackDevice> = match &mpv_device {
        Some(d) => d.clone() as Arc<dyn PlaybackDevice>,
        None => Arc::new(NullDevice),
    };

    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(evt) = device_rx.recv().await {
            if forward_tx.send(core::AppEvent::Device(evt)).await.is_err() {
                break;
            }
        }
    });

    // ── core ─────────────────────────────────────────────────────────────────
    let service = Arc::new(ItunesClient::new(&config.search)?);
    let app_core = core::AppCore::new(
        ctx,
        device,
        service,
        SearchFetcher::from_config(&config.search),
        config.paths.downloads_dir.clone(),
        event_tx.clone(),
        notice_tx.clone(),
    )?;
    let snapshot = app_core.snapshot_handle();

    if config.http.enabled && !args.no_http {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            snapshot.clone(),
            event_tx.clone(),
        );
    }

    let first = match args.term {
        Some(term) => Command::Search { term },
        None => Command::Genre {
            name: config.search.initial_term.clone(),
        },
    };
    event_tx.send(core::AppEvent::Command(first)).await?;

    tokio::spawn(console::run_output(snapshot.clone(), notice_rx));
    tokio::spawn(console::run_input(snapshot, event_tx));

    println!("groovewave: type help for commands");
    app_core.run(event_rx).await?;

    if let Some(d) = mpv_device {
        d.shutdown().await;
    }
    tracing::info!("groovewave exiting");
    Ok(())
}
