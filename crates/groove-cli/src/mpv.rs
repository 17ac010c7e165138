/// mpv IPC device with separated reader/writer tasks.
///
/// ```text
///   MpvDevice::ensure_handle()
///         │
///         ├── writer_task    ← MpvRequest via mpsc, serialised → socket
///         ├── reader_task    ← JSON lines from socket
///         │                        ├── response (request_id) → matched oneshot
///         │                        └── event / property-change → MpvEvent channel
///         └── forward_events ← MpvEvent → DeviceEvent for the app core
/// ```
///
/// mpv is spawned lazily on the first `load`, and respawned if it died.
use async_trait::async_trait;
use groove_core::device::{DeviceEvent, PlaybackDevice};
use groove_core::platform;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

pub const OBS_TIME_POS: u64 = 1;
pub const OBS_DURATION: u64 = 2;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String,
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// Unsolicited mpv message (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// Map to what the app core cares about. `None` for everything else.
    pub fn to_device_event(&self, timeline: &mut (Option<f64>, Option<f64>)) -> Option<DeviceEvent> {
        if let Some((id, data)) = self.as_property_change() {
            let val = if data.is_null() { None } else { data.as_f64() };
            match id {
                OBS_TIME_POS => timeline.0 = val,
                OBS_DURATION => timeline.1 = val,
                _ => return None,
            }
            return Some(DeviceEvent::Timeline {
                position: timeline.0,
                duration: timeline.1,
            });
        }

        if self.event_name()? != "end-file" {
            return None;
        }
        let reason = self
            .raw
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        match reason {
            "eof" => Some(DeviceEvent::Ended),
            "error" => Some(DeviceEvent::Failed {
                message: self
                    .raw
                    .get("file_error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("playback error")
                    .to_string(),
            }),
            // stop / redirect / quit: we caused it
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn observe_timeline(&self) {
        for (id, name) in [(OBS_TIME_POS, "time-pos"), (OBS_DURATION, "duration")] {
            if let Err(e) = self.send(json!(["observe_property", id, name])).await {
                warn!("[mpv] observe_property {} failed: {}", name, e);
            }
        }
    }
}

/// Owns the mpv child process and the live IPC handle.
struct MpvProcess {
    socket_name: String,
    process: Option<tokio::process::Child>,
    handle: Option<MpvHandle>,
}

impl MpvProcess {
    fn alive(&mut self) -> bool {
        match self.process.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                warn!("[mpv] process exited: {}", status);
                false
            }
            Some(Err(e)) => {
                warn!("[mpv] liveness check failed: {}", e);
                false
            }
            None => false,
        }
    }

    #[cfg(unix)]
    async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        let binary = platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;

        let child = tokio::process::Command::new(&binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(format!("--volume={}", volume_pct(volume)))
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .spawn()?;
        info!("[mpv] spawned {:?} pid {:?}", binary, child.id());
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("[mpv] connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let binary = platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        let child = tokio::process::Command::new(&binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(format!("--volume={}", volume_pct(volume)))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("[mpv] connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn volume_pct(volume: f32) -> i64 {
    (volume * 100.0).clamp(0.0, 100.0).round() as i64
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);
    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));
    MpvHandle { tx: cmd_tx }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("[mpv] reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("[mpv] reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    }
                } else if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("[mpv] reader: read error: {}", e);
                fail_all(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn fail_all(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("[mpv] writer: req={} {}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("[mpv] writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("[mpv] writer: task exiting");
}

/// Translate raw mpv events into `DeviceEvent`s for the app core.
async fn forward_events(mut rx: mpsc::Receiver<MpvEvent>, device_tx: mpsc::Sender<DeviceEvent>) {
    let mut timeline = (None, None);
    while let Some(evt) = rx.recv().await {
        if evt.event_name() == Some("start-file") {
            timeline = (None, None);
        }
        if let Some(out) = evt.to_device_event(&mut timeline) {
            if device_tx.send(out).await.is_err() {
                break;
            }
        }
    }
}

pub struct MpvDevice {
    inner: Mutex<MpvProcess>,
    device_tx: mpsc::Sender<DeviceEvent>,
}

impl MpvDevice {
    pub fn new(device_tx: mpsc::Sender<DeviceEvent>) -> Self {
        Self {
            inner: Mutex::new(MpvProcess {
                socket_name: platform::mpv_socket_name(),
                process: None,
                handle: None,
            }),
            device_tx,
        }
    }

    async fn ensure_handle(&self, volume: f32) -> anyhow::Result<MpvHandle> {
        let mut inner = self.inner.lock().await;
        if inner.handle.is_some() && !inner.alive() {
            warn!("[mpv] process died, dropping handle");
            inner.handle = None;
        }
        if let Some(h) = &inner.handle {
            return Ok(h.clone());
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = inner.spawn_and_connect(volume, event_tx).await?;
        tokio::spawn(forward_events(event_rx, self.device_tx.clone()));
        handle.observe_timeline().await;
        inner.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Handle only if mpv is already running; control calls never spawn it.
    async fn live_handle(&self) -> Option<MpvHandle> {
        self.inner.lock().await.handle.clone()
    }

    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(h) = inner.handle.take() {
            let _ = h.send(json!(["quit"])).await;
        }
        if let Some(mut p) = inner.process.take() {
            let _ = p.kill().await;
        }
    }
}

#[async_trait]
impl PlaybackDevice for MpvDevice {
    async fn load(&self, url: &str, volume: f32) -> anyhow::Result<()> {
        let handle = self.ensure_handle(volume).await?;
        debug!("[mpv] loadfile {}", url);
        handle.send(json!(["loadfile", url])).await?;
        handle
            .send(json!(["set_property", "volume", volume_pct(volume)]))
            .await?;
        handle.send(json!(["set_property", "pause", false])).await?;
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
        if let Some(h) = self.live_handle().await {
            h.send(json!(["set_property", "pause", paused])).await?;
        }
        Ok(())
    }

    async fn seek_to(&self, seconds: f64) -> anyhow::Result<()> {
        if let Some(h) = self.live_handle().await {
            h.send(json!(["set_property", "time-pos", seconds.max(0.0)]))
                .await?;
        }
        Ok(())
    }

    async fn seek_relative(&self, seconds: f64) -> anyhow::Result<()> {
        if let Some(h) = self.live_handle().await {
            h.send(json!(["seek", seconds, "relative"])).await?;
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        if let Some(h) = self.live_handle().await {
            h.send(json!(["set_property", "volume", volume_pct(volume)]))
                .await?;
        }
        Ok(())
    }

    async fn set_looping(&self, looping: bool) -> anyhow::Result<()> {
        if let Some(h) = self.live_handle().await {
            let value = if looping { "inf" } else { "no" };
            h.send(json!(["set_property", "loop-file", value])).await?;
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(h) = self.live_handle().await {
            h.send(json!(["stop"])).await?;
        }
        Ok(())
    }
}
