//! The uniform contract every playback backend implements.

use crate::native::NativeAdapter;
use crate::vimeo::VimeoAdapter;
use crate::youtube::YouTubeAdapter;
use async_trait::async_trait;
use lectern_channel::MessagePort;
use lectern_core::{BackendKind, Clock, MediaSource, PlaybackConfig, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle notifications a backend reports upward, already stripped of
/// provider dialect.
///
/// Only the native backend emits `TimeUpdate`; provider positions are polled
/// by the facade instead.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// The backend finished loading and knows the media duration.
    Loaded { duration: f64 },
    /// Playback started or resumed.
    Play,
    /// Playback paused.
    Pause,
    /// The media ran to its end.
    Ended,
    /// New playback position, in seconds.
    TimeUpdate { seconds: f64 },
    /// The backend failed; the session will not recover on its own.
    Error { message: String },
}

/// One playback backend: the native player or a provider embed.
///
/// Adapters assume the facade's discipline: `load` is called once, control
/// and query methods only after the adapter has reported [`AdapterEvent::Loaded`].
/// Volume is normalized `0..1` at this boundary; adapters translate to their
/// backend-native scale.
#[async_trait]
pub trait PlayerAdapter: Send + Sync + std::fmt::Debug {
    /// Which backend this adapter drives.
    fn backend(&self) -> BackendKind;

    /// Whether the backend pushes its own time updates. When false, the
    /// facade polls `current_time` while playing.
    fn drives_time_updates(&self) -> bool;

    /// Begin loading the media. Readiness arrives asynchronously as
    /// [`AdapterEvent::Loaded`].
    async fn load(&self, source: &MediaSource) -> Result<()>;

    /// Start or resume playback. Returns whether playback actually started;
    /// for provider embeds this reports command dispatch, with confirmation
    /// following as [`AdapterEvent::Play`].
    async fn play(&self) -> Result<bool>;

    /// Pause playback.
    async fn pause(&self) -> Result<()>;

    /// Move the playhead. The facade has already clamped `seconds` to the
    /// known duration.
    async fn seek(&self, seconds: f64) -> Result<()>;

    /// Set volume, normalized `0..1`.
    async fn set_volume(&self, volume: f64) -> Result<()>;

    /// Current playhead position in seconds.
    async fn current_time(&self) -> Result<f64>;

    /// Media duration in seconds.
    async fn duration(&self) -> Result<f64>;

    /// Whether the backend is currently playing.
    async fn is_playing(&self) -> Result<bool>;

    /// Release the backend. After this no further events are emitted.
    async fn shutdown(&self);
}

/// Opens the embedding environment's side of a provider iframe and hands
/// back the frame's message port.
///
/// The returned port is already scoped to the embed for `media_id`; provider
/// adapters only speak their dialect over it.
#[async_trait]
pub trait EmbedConnector: Send + Sync + std::fmt::Debug {
    /// Create the embed for one media id and return its port.
    async fn open_embed(&self, backend: BackendKind, media_id: &str) -> Result<Box<dyn MessagePort>>;
}

/// Build the adapter for a media source, keyed on its backend kind.
pub async fn build_adapter(
    source: &MediaSource,
    connector: &dyn EmbedConnector,
    clock: Arc<dyn Clock>,
    config: &PlaybackConfig,
    events: mpsc::UnboundedSender<AdapterEvent>,
) -> Result<Arc<dyn PlayerAdapter>> {
    let adapter: Arc<dyn PlayerAdapter> = match source.backend {
        BackendKind::Native => Arc::new(NativeAdapter::new(
            clock,
            config.native_tick_interval,
            events,
        )),
        BackendKind::YouTube => {
            let port = connector.open_embed(source.backend, &source.media_id).await?;
            Arc::new(YouTubeAdapter::connect(Arc::from(port), events))
        }
        BackendKind::Vimeo => {
            let port = connector.open_embed(source.backend, &source.media_id).await?;
            Arc::new(VimeoAdapter::connect(
                Arc::from(port),
                events,
                config.provider_query_timeout,
            ))
        }
    };
    tracing::debug!(backend = %source.backend.as_str(), media_id = %source.media_id, "adapter built");
    Ok(adapter)
}
