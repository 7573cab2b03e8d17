//! Request routing from embedded content onto the host.
//!
//! One handler per message kind, each a thin translation layer: decode the
//! typed arguments, call the capability / facade / engine method that does
//! the work, encode the typed reply. Handlers never hold locks across the
//! calls they make, and every error they return travels back to the calling
//! frame as a structured error response.

use std::sync::Arc;

use lectern_channel::CorrelationChannel;
use lectern_core::payload::{
    empty, from_payload, to_payload, AttemptsPayload, ChatMessageArgs, CurrentTimePayload,
    DurationPayload, EmitEventArgs, InstanceDataArgs, InstanceHistoryPayload, OverlayArgs,
    PlayingPayload, ProgressArgs, PublicProfilePayload, SeekArgs, SnackArgs, StartedPayload,
    StateQueryArgs, StateUpdateArgs, StateValuePayload, UserProgressPayload, VolumeArgs,
};
use lectern_core::MessageKind;
use lectern_playback::PlaybackService;
use lectern_progression::ProgressionEngine;

use crate::capability::{ChatSurface, ProgressStore};
use crate::state::SessionState;

/// Everything a content-originated request can reach on the host side.
pub(crate) struct HandlerContext {
    pub playback: Arc<PlaybackService>,
    pub engine: Arc<ProgressionEngine>,
    pub store: Arc<dyn ProgressStore>,
    pub chat: Arc<dyn ChatSurface>,
    pub state: SessionState,
}

/// Register a handler for every request kind content may send.
///
/// `subscribe` and `unsubscribe` are deliberately absent: the channel
/// grants and revokes subscriptions itself before user handlers are
/// consulted, so a handler registered here would never run for them.
pub(crate) fn register_handlers(channel: &Arc<CorrelationChannel>, ctx: &HandlerContext) {
    register_state(channel, ctx);
    register_events(channel);
    register_surface(channel, ctx);
    register_persistence(channel, ctx);
    register_media(channel, ctx);
    register_progression(channel, ctx);
}

fn register_state(channel: &Arc<CorrelationChannel>, ctx: &HandlerContext) {
    let state = ctx.state.clone();
    channel.on(MessageKind::UpdateState, move |payload| {
        let state = state.clone();
        async move {
            let args: StateUpdateArgs = from_payload(&payload)?;
            state.put(args.key, args.value);
            Ok(empty())
        }
    });

    let state = ctx.state.clone();
    channel.on(MessageKind::GetState, move |payload| {
        let state = state.clone();
        async move {
            let args: StateQueryArgs = from_payload(&payload)?;
            to_payload(&StateValuePayload {
                value: state.get(&args.key),
            })
        }
    });
}

fn register_events(channel: &Arc<CorrelationChannel>) {
    // Re-broadcast content events to every subscriber of the named topic.
    // The full payload is forwarded, so sibling frames see exactly what the
    // emitter sent, `event` field included.
    let weak = Arc::downgrade(channel);
    channel.on(MessageKind::EmitEvent, move |payload| {
        let weak = weak.clone();
        async move {
            let args: EmitEventArgs = from_payload(&payload)?;
            if let Some(channel) = weak.upgrade() {
                let delivered = channel.push_to_subscribers(&args.event, payload).await?;
                tracing::trace!(topic = %args.event, delivered, "content event re-broadcast");
            }
            Ok(empty())
        }
    });
}

fn register_surface(channel: &Arc<CorrelationChannel>, ctx: &HandlerContext) {
    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::MinimizeChatUi, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.set_chat_minimized(true).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::ShowChatUi, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.set_chat_minimized(false).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::ActivateFullscreen, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.set_fullscreen(true).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::DeactivateFullscreen, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.set_fullscreen(false).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::PostToChat, move |payload| {
        let chat = Arc::clone(&chat);
        async move {
            let args: ChatMessageArgs = from_payload(&payload)?;
            chat.post_to_chat(&args.message).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::ShowScript, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.show_script().await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::ShowSnack, move |payload| {
        let chat = Arc::clone(&chat);
        async move {
            let args: SnackArgs = from_payload(&payload)?;
            chat.show_snack(&args.text).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::HideSnack, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.hide_snack().await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::ShowOverlayHtml, move |payload| {
        let chat = Arc::clone(&chat);
        async move {
            let args: OverlayArgs = from_payload(&payload)?;
            chat.show_overlay_html(&args.html).await?;
            Ok(empty())
        }
    });

    let chat = Arc::clone(&ctx.chat);
    channel.on(MessageKind::HideOverlayHtml, move |_payload| {
        let chat = Arc::clone(&chat);
        async move {
            chat.hide_overlay_html().await?;
            Ok(empty())
        }
    });
}

fn register_persistence(channel: &Arc<CorrelationChannel>, ctx: &HandlerContext) {
    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::SaveInstanceData, move |payload| {
        let store = Arc::clone(&store);
        async move {
            let args: InstanceDataArgs = from_payload(&payload)?;
            store.save_instance_data(args.data).await?;
            Ok(empty())
        }
    });

    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::GetInstanceDataHistory, move |_payload| {
        let store = Arc::clone(&store);
        async move {
            let history = store.instance_data_history().await?;
            to_payload(&InstanceHistoryPayload { history })
        }
    });

    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::SaveUserProgress, move |payload| {
        let store = Arc::clone(&store);
        async move {
            let args: ProgressArgs = from_payload(&payload)?;
            store.save_user_progress(args.progress).await?;
            Ok(empty())
        }
    });

    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::GetUserProgress, move |_payload| {
        let store = Arc::clone(&store);
        async move {
            // `None` means nothing saved yet; it is a normal reply, not an
            // error, and serializes as an absent field.
            let progress = store.user_progress().await?;
            to_payload(&UserProgressPayload { progress })
        }
    });

    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::MarkCompleted, move |_payload| {
        let store = Arc::clone(&store);
        async move {
            store.mark_completed().await?;
            Ok(empty())
        }
    });

    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::IncrementAttempts, move |_payload| {
        let store = Arc::clone(&store);
        async move {
            let attempts = store.increment_attempts().await?;
            to_payload(&AttemptsPayload { attempts })
        }
    });

    let store = Arc::clone(&ctx.store);
    channel.on(MessageKind::GetUserPublicProfile, move |_payload| {
        let store = Arc::clone(&store);
        async move {
            let profile = store.public_profile().await?;
            to_payload(&PublicProfilePayload { profile })
        }
    });
}

fn register_media(channel: &Arc<CorrelationChannel>, ctx: &HandlerContext) {
    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::PlayMedia, move |_payload| {
        let playback = Arc::clone(&playback);
        async move {
            let started = playback.play().await?;
            to_payload(&StartedPayload { started })
        }
    });

    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::PauseMedia, move |_payload| {
        let playback = Arc::clone(&playback);
        async move {
            playback.pause().await?;
            Ok(empty())
        }
    });

    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::SeekMedia, move |payload| {
        let playback = Arc::clone(&playback);
        async move {
            let args: SeekArgs = from_payload(&payload)?;
            playback.seek(args.seconds).await?;
            Ok(empty())
        }
    });

    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::SetMediaVolume, move |payload| {
        let playback = Arc::clone(&playback);
        async move {
            let args: VolumeArgs = from_payload(&payload)?;
            playback.set_volume(args.volume).await?;
            Ok(empty())
        }
    });

    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::GetMediaCurrentTime, move |_payload| {
        let playback = Arc::clone(&playback);
        async move {
            let current_time = playback.current_time().await?;
            to_payload(&CurrentTimePayload { current_time })
        }
    });

    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::GetMediaDuration, move |_payload| {
        let playback = Arc::clone(&playback);
        async move {
            let duration = playback.duration().await?;
            to_payload(&DurationPayload { duration })
        }
    });

    let playback = Arc::clone(&ctx.playback);
    channel.on(MessageKind::IsMediaPlaying, move |_payload| {
        let playback = Arc::clone(&playback);
        async move {
            let playing = playback.is_playing().await?;
            to_payload(&PlayingPayload { playing })
        }
    });
}

fn register_progression(channel: &Arc<CorrelationChannel>, ctx: &HandlerContext) {
    // An interaction declaring itself finished counts as content completion,
    // same as a video reaching its end.
    let engine = Arc::clone(&ctx.engine);
    channel.on(MessageKind::CompleteInteraction, move |_payload| {
        let engine = Arc::clone(&engine);
        async move {
            tracing::debug!("embedded interaction reported completion");
            engine.content_finished();
            Ok(empty())
        }
    });
}
