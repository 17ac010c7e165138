//! Audio output contract.
//!
//! A device plays one preview at a time. It reports back asynchronously
//! through `DeviceEvent`s; the application reacts to `Ended` with
//! `PlaybackSession::on_track_ended`.

use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The current track played to its natural end.
    Ended,
    Timeline {
        position: Option<f64>,
        duration: Option<f64>,
    },
    /// The device could not play what it was given.
    Failed { message: String },
}

#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Replace whatever is loaded and start playing `url`.
    async fn load(&self, url: &str, volume: f32) -> anyhow::Result<()>;
    async fn set_paused(&self, paused: bool) -> anyhow::Result<()>;
    async fn seek_to(&self, seconds: f64) -> anyhow::Result<()>;
    async fn seek_relative(&self, seconds: f64) -> anyhow::Result<()>;
    async fn set_volume(&self, volume: f32) -> anyhow::Result<()>;
    /// Loop the current track natively (repeat-one).
    async fn set_looping(&self, looping: bool) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Silent device. Every call succeeds and is logged.
#[derive(Debug, Default, Clone)]
pub struct NullDevice;

#[async_trait]
impl PlaybackDevice for NullDevice {
    async fn load(&self, url: &str, volume: f32) -> anyhow::Result<()> {
        debug!("[device:null] load {} at volume {:.2}", url, volume);
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
        debug!("[device:null] paused={}", paused);
        Ok(())
    }

    async fn seek_to(&self, seconds: f64) -> anyhow::Result<()> {
        debug!("[device:null] seek to {:.1}s", seconds);
        Ok(())
    }

    async fn seek_relative(&self, seconds: f64) -> anyhow::Result<()> {
        debug!("[device:null] seek by {:+.1}s", seconds);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        debug!("[device:null] volume {:.2}", volume);
        Ok(())
    }

    async fn set_looping(&self, looping: bool) -> anyhow::Result<()> {
        debug!("[device:null] looping={}", looping);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        debug!("[device:null] stop");
        Ok(())
    }
}
