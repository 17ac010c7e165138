/// AppCore: single-owner event loop for all mutable state.
///
/// Console input, the HTTP API, finished fetches, the playback device and
/// timers all send `AppEvent`s here. AppCore owns the `SessionContext` and
/// the current view exclusively; nobody else touches them.
///
/// After every event a fresh `Snapshot` is written to the shared handle and
/// a `Notice::State` goes out on the broadcast channel.
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use groove_core::context::{ActiveView, SessionContext};
use groove_core::device::{DeviceEvent, PlaybackDevice};
use groove_core::discover::{self, FetchRequest, SearchUpdate};
use groove_core::protocol::{Command, Notice, Snapshot};
use groove_core::search::{FetchError, FetchPage, SearchFetcher, SearchService};
use groove_core::session::PlayOutcome;
use groove_core::song::{RepeatMode, Song, TrackId};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Longest sleep timer accepted, one day.
const MAX_SLEEP_MINUTES: u64 = 24 * 60;

#[derive(Debug)]
pub enum AppEvent {
    Command(Command),
    SearchFinished {
        request: FetchRequest,
        result: Result<FetchPage, FetchError>,
    },
    Device(DeviceEvent),
    SleepExpired {
        generation: u64,
    },
    DownloadFinished {
        title: String,
        result: Result<PathBuf, String>,
    },
    Shutdown,
}

pub struct AppCore {
    ctx: SessionContext,
    view: ActiveView,
    device: Arc<dyn PlaybackDevice>,
    service: Arc<dyn SearchService>,
    fetcher: SearchFetcher,
    http: reqwest::Client,
    downloads_dir: PathBuf,
    event_tx: mpsc::Sender<AppEvent>,
    notice_tx: broadcast::Sender<Notice>,
    snapshot: Arc<RwLock<Snapshot>>,
    rev: u64,
    position: Option<f64>,
    duration: Option<f64>,
    /// Bumped whenever the sleep timer is set or cancelled; older timers are ignored.
    sleep_generation: u64,
    sleep_deadline: Option<DateTime<Utc>>,
}

impl AppCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: SessionContext,
        device: Arc<dyn PlaybackDevice>,
        service: Arc<dyn SearchService>,
        fetcher: SearchFetcher,
        downloads_dir: PathBuf,
        event_tx: mpsc::Sender<AppEvent>,
        notice_tx: broadcast::Sender<Notice>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("groovewave/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let snapshot = Arc::new(RwLock::new(Snapshot::capture(&ctx, &ActiveView::Discover)));
        Ok(Self {
            ctx,
            view: ActiveView::Discover,
            device,
            service,
            fetcher,
            http,
            downloads_dir,
            event_tx,
            notice_tx,
            snapshot,
            rev: 0,
            position: None,
            duration: None,
            sleep_generation: 0,
            sleep_deadline: None,
        })
    }

    /// Shared read-only view for the HTTP server and console.
    pub fn snapshot_handle(&self) -> Arc<RwLock<Snapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Returns when `Shutdown` arrives or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<AppEvent>) -> anyhow::Result<()> {
        info!("[core] starting event loop");
        self.publish().await;
        while let Some(evt) = event_rx.recv().await {
            if !self.handle(evt).await {
                info!("[core] shutdown requested");
                break;
            }
        }
        if let Err(e) = self.device.stop().await {
            debug!("[core] device stop on exit: {}", e);
        }
        Ok(())
    }

    /// Process one event. `false` means stop the loop.
    pub async fn handle(&mut self, evt: AppEvent) -> bool {
        match evt {
            AppEvent::Shutdown => return false,
            AppEvent::Command(cmd) => {
                info!("[core] command {:?}", cmd);
                if let Err(e) = self.handle_command(cmd).await {
                    error!("[core] command error: {}", e);
                    self.notify(Notice::Error {
                        message: e.to_string(),
                    });
                }
            }
            AppEvent::SearchFinished { request, result } => {
                let update = self.ctx.discover.apply(&request, result);
                self.report_search(update);
            }
            AppEvent::Device(evt) => self.handle_device_event(evt).await,
            AppEvent::SleepExpired { generation } => {
                if generation != self.sleep_generation || self.sleep_deadline.is_none() {
                    debug!("[core] ignoring stale sleep timer {}", generation);
                    return true;
                }
                info!("[core] sleep timer fired, pausing");
                self.sleep_deadline = None;
                if self.ctx.playback.is_playing() {
                    self.ctx.playback.set_playing(false);
                    log_device("pause", self.device.set_paused(true).await);
                }
                self.notify(Notice::Info {
                    message: "Sleep timer ended, playback paused".into(),
                });
            }
            AppEvent::DownloadFinished { title, result } => match result {
                Ok(path) => self.notify(Notice::Info {
                    message: format!("Downloaded \"{}\" to {}", title, path.display()),
                }),
                Err(e) => {
                    warn!("[core] download of {:?} failed: {}", title, e);
                    self.notify(Notice::Error {
                        message: format!("Download failed for \"{}\": {}", title, e),
                    });
                }
            },
        }
        self.publish().await;
        true
    }

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::Search { term } => {
                if self.start_search(&term) {
                    self.ctx.history.record(&term);
                }
            }
            Command::Genre { name } => {
                self.start_search(&name);
            }
            Command::Surprise => {
                let term = discover::surprise_term(&mut rand::thread_rng());
                self.start_search(term);
            }
            Command::LoadMore => {
                if let Some(req) = self.ctx.discover.begin_load_more() {
                    self.spawn_fetch(req);
                }
            }
            Command::Retry => {
                if let Some(req) = self.ctx.discover.retry() {
                    self.spawn_fetch(req);
                }
            }
            Command::Play { track_id } => {
                let song = self.resolve(Some(track_id))?;
                match self.ctx.playback.play(&song) {
                    PlayOutcome::Started(song) => self.load_song(&song).await,
                    PlayOutcome::Toggled { playing } => {
                        log_device("pause", self.device.set_paused(!playing).await)
                    }
                }
            }
            Command::TogglePause => {
                if let Some(playing) = self.ctx.playback.toggle_playing() {
                    log_device("pause", self.device.set_paused(!playing).await);
                }
            }
            Command::Next => {
                let list = self.ctx.active_list(&self.view).to_vec();
                if let Some(song) = self.ctx.playback.next(&list) {
                    self.load_song(&song).await;
                }
            }
            Command::Prev => {
                let list = self.ctx.active_list(&self.view).to_vec();
                if let Some(song) = self.ctx.playback.previous(&list) {
                    self.load_song(&song).await;
                }
            }
            Command::ToggleShuffle => {
                let on = self.ctx.playback.toggle_shuffle();
                info!("[core] shuffle {}", if on { "on" } else { "off" });
            }
            Command::CycleRepeat => {
                let mode = self.ctx.playback.cycle_repeat();
                log_device(
                    "loop",
                    self.device.set_looping(mode == RepeatMode::One).await,
                );
            }
            Command::SeekTo { seconds } => {
                if self.ctx.playback.current().is_some() {
                    log_device("seek", self.device.seek_to(seconds).await);
                }
            }
            Command::SeekRelative { seconds } => {
                if self.ctx.playback.current().is_some() {
                    log_device("seek", self.device.seek_relative(seconds).await);
                }
            }
            Command::Volume { value } => {
                self.ctx.set_volume(value);
                let volume = self.ctx.effective_volume();
                log_device("volume", self.device.set_volume(volume).await);
            }
            Command::ToggleMute => {
                self.ctx.toggle_mute();
                let volume = self.ctx.effective_volume();
                log_device("volume", self.device.set_volume(volume).await);
            }
            Command::ToggleFavorite { track_id } => {
                let song = self.resolve(Some(track_id))?;
                let now = self.ctx.library.toggle_favorite(&song);
                self.notify(Notice::Info {
                    message: if now {
                        format!("Added \"{}\" to favorites", song.track_name)
                    } else {
                        format!("Removed \"{}\" from favorites", song.track_name)
                    },
                });
            }
            Command::StageForPlaylist { track_id } => {
                let song = self.resolve(Some(track_id))?;
                self.ctx.stage_for_playlist(song);
            }
            Command::CreatePlaylist { name } => match self.ctx.create_playlist(&name) {
                Some(p) => self.notify(Notice::Info {
                    message: format!("Created playlist \"{}\" ({} songs)", p.name, p.songs.len()),
                }),
                None => anyhow::bail!("Playlist name cannot be empty"),
            },
            Command::AddToPlaylist {
                playlist_id,
                track_id,
            } => {
                let song = self.resolve(Some(track_id))?;
                self.ctx.clear_pending_add();
                if self.ctx.library.add_song_to_playlist(&playlist_id, &song) {
                    self.notify(Notice::Info {
                        message: format!("Added \"{}\" to playlist", song.track_name),
                    });
                }
            }
            Command::RemoveFromPlaylist {
                playlist_id,
                track_id,
            } => {
                self.ctx
                    .library
                    .remove_song_from_playlist(&playlist_id, track_id);
            }
            Command::DeletePlaylist { playlist_id } => {
                if let Some(p) = self.ctx.library.delete_playlist(&playlist_id) {
                    self.notify(Notice::Info {
                        message: format!("Deleted playlist \"{}\"", p.name),
                    });
                }
                if self.view == ActiveView::Playlist(playlist_id) {
                    self.view = ActiveView::Discover;
                }
            }
            Command::SetView { view } => {
                if let ActiveView::Playlist(id) = &view {
                    if self.ctx.library.playlist(id).is_none() {
                        anyhow::bail!("No playlist with id {}", id);
                    }
                }
                self.view = view;
            }
            Command::SleepTimer { minutes } => self.arm_sleep_timer(minutes),
            Command::Share { track_id } => {
                let song = self.resolve(track_id)?;
                let text = song.share_text();
                let message = match copy_to_clipboard(&text) {
                    Ok(()) => format!("Copied to clipboard: {}", text),
                    Err(e) => {
                        debug!("[core] clipboard unavailable: {}", e);
                        text
                    }
                };
                self.notify(Notice::Info { message });
            }
            Command::Download { track_id } => {
                let song = self.resolve(track_id)?;
                self.spawn_download(song);
            }
            Command::ClearSearchHistory => self.ctx.history.clear(),
            Command::GetState => {}
        }
        Ok(())
    }

    async fn handle_device_event(&mut self, evt: DeviceEvent) {
        match evt {
            DeviceEvent::Ended => {
                let list = self.ctx.active_list(&self.view).to_vec();
                if let Some(song) = self.ctx.playback.on_track_ended(&list) {
                    self.load_song(&song).await;
                }
            }
            DeviceEvent::Timeline { position, duration } => {
                self.position = position;
                self.duration = duration;
            }
            DeviceEvent::Failed { message } => {
                warn!("[core] playback failed: {}", message);
                self.notify(Notice::Error {
                    message: format!("Playback failed: {}", message),
                });
            }
        }
    }

    /// Returns `false` when the controller refused the search.
    fn start_search(&mut self, term: &str) -> bool {
        let Some(req) = self.ctx.discover.begin_search(term) else {
            return false;
        };
        self.view = ActiveView::Discover;
        self.spawn_fetch(req);
        true
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let service = Arc::clone(&self.service);
        let fetcher = self.fetcher.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = request.run(&fetcher, service.as_ref()).await;
            let _ = tx.send(AppEvent::SearchFinished { request, result }).await;
        });
    }

    fn report_search(&self, update: SearchUpdate) {
        let notice = match update {
            SearchUpdate::Replaced { term, count } => Notice::Info {
                message: format!("{} songs for \"{}\"", count, term),
            },
            SearchUpdate::Appended { count } => Notice::Info {
                message: format!("{} more songs", count),
            },
            SearchUpdate::NoResults { term } => Notice::Info {
                message: format!("No songs found for \"{}\"", term),
            },
            SearchUpdate::Failed { term, message } => Notice::Error {
                message: format!(
                    "Something went wrong while fetching \"{}\": {} (use retry)",
                    term, message
                ),
            },
            SearchUpdate::Exhausted | SearchUpdate::Stale => return,
        };
        self.notify(notice);
    }

    /// Song for a command: by id, or the current song when `None`.
    fn resolve(&self, track_id: Option<TrackId>) -> anyhow::Result<Song> {
        match track_id {
            Some(id) => self
                .ctx
                .find_song(&self.view, id)
                .ok_or_else(|| anyhow::anyhow!("Unknown track {}", id)),
            None => self
                .ctx
                .playback
                .current()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Nothing is playing")),
        }
    }

    async fn load_song(&mut self, song: &Song) {
        info!("[core] playing {} ({})", song.display(), song.track_id);
        self.position = None;
        self.duration = None;
        if let Err(e) = self
            .device
            .load(&song.preview_url, self.ctx.effective_volume())
            .await
        {
            warn!("[core] device refused {}: {}", song.preview_url, e);
            self.notify(Notice::Error {
                message: format!("Could not play \"{}\"", song.track_name),
            });
            return;
        }
        let looping = self.ctx.playback.repeat() == RepeatMode::One;
        log_device("loop", self.device.set_looping(looping).await);
    }

    fn arm_sleep_timer(&mut self, minutes: Option<u64>) {
        if let Some(m) = minutes.filter(|m| *m > MAX_SLEEP_MINUTES) {
            warn!("[core] sleep timer of {} min rejected", m);
            self.notify(Notice::Error {
                message: format!("Sleep timer is limited to {} min", MAX_SLEEP_MINUTES),
            });
            return;
        }
        self.sleep_generation += 1;
        let Some(minutes) = minutes.filter(|m| *m > 0) else {
            self.sleep_deadline = None;
            self.notify(Notice::Info {
                message: "Sleep timer off".into(),
            });
            return;
        };

        let generation = self.sleep_generation;
        let duration = std::time::Duration::from_secs(minutes * 60);
        self.sleep_deadline = chrono::Duration::from_std(duration)
            .ok()
            .map(|d| Utc::now() + d);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(AppEvent::SleepExpired { generation }).await;
        });
        self.notify(Notice::Info {
            message: format!("Sleep timer set for {} min", minutes),
        });
    }

    fn spawn_download(&self, song: Song) {
        let client = self.http.clone();
        let dir = self.downloads_dir.clone();
        let tx = self.event_tx.clone();
        info!("[core] downloading preview of {}", song.display());
        tokio::spawn(async move {
            let result = download_preview(&client, &song, dir)
                .await
                .map_err(|e| e.to_string());
            let _ = tx
                .send(AppEvent::DownloadFinished {
                    title: song.track_name.clone(),
                    result,
                })
                .await;
        });
    }

    async fn publish(&mut self) {
        self.rev += 1;
        let mut snap = Snapshot::capture(&self.ctx, &self.view);
        snap.rev = self.rev;
        snap.position_secs = self.position;
        snap.duration_secs = self.duration;
        snap.sleep_deadline = self.sleep_deadline;
        *self.snapshot.write().await = snap;
        let _ = self.notice_tx.send(Notice::State { rev: self.rev });
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notice_tx.send(notice);
    }
}

fn log_device(op: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!("[core] device {} failed: {}", op, e);
    }
}

fn copy_to_clipboard(text: &str) -> anyhow::Result<()> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text.to_string())?;
    Ok(())
}

async fn download_preview(
    client: &reqwest::Client,
    song: &Song,
    dir: PathBuf,
) -> anyhow::Result<PathBuf> {
    let bytes = client
        .get(&song.preview_url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(song.download_file_name());
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}
