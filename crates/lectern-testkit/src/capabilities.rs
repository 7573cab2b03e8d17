//! In-memory capability fakes for the lesson runtime.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use lectern_core::Result;
use lectern_host::{ChatSurface, ProgressStore};

/// Progress store that keeps everything in memory.
///
/// All operations succeed; tests assert on the stored values afterwards.
#[derive(Debug)]
pub struct MemoryProgressStore {
    instance_data: Mutex<Vec<Value>>,
    progress: Mutex<Option<Value>>,
    completed: AtomicBool,
    attempts: AtomicU32,
    profile: Value,
}

impl MemoryProgressStore {
    /// Empty store with a placeholder learner profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store answering `get-user-public-profile` with the given value.
    pub fn with_profile(profile: Value) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    /// Every instance-data blob saved so far, oldest first.
    pub fn saved_instance_data(&self) -> Vec<Value> {
        lock(&self.instance_data).clone()
    }

    /// The last saved progress value, if any.
    pub fn saved_progress(&self) -> Option<Value> {
        lock(&self.progress).clone()
    }

    /// Whether `mark-completed` has been called.
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Current attempt count.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self {
            instance_data: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            completed: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            profile: json!({ "displayName": "Test Learner" }),
        }
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn save_instance_data(&self, data: Value) -> Result<()> {
        lock(&self.instance_data).push(data);
        Ok(())
    }

    async fn instance_data_history(&self) -> Result<Vec<Value>> {
        Ok(lock(&self.instance_data).clone())
    }

    async fn save_user_progress(&self, progress: Value) -> Result<()> {
        *lock(&self.progress) = Some(progress);
        Ok(())
    }

    async fn user_progress(&self) -> Result<Option<Value>> {
        Ok(lock(&self.progress).clone())
    }

    async fn mark_completed(&self) -> Result<()> {
        self.completed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn increment_attempts(&self) -> Result<u32> {
        Ok(self.attempts.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn public_profile(&self) -> Result<Value> {
        Ok(self.profile.clone())
    }
}

/// One call recorded by [`RecordingChat`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// `post-to-chat` with the message text.
    Message(String),
    /// `show-script`.
    ScriptShown,
    /// `show-snack` with the notification text.
    Snack(String),
    /// `hide-snack`.
    SnackHidden,
    /// Chat column collapsed (`true`) or restored (`false`).
    Minimized(bool),
    /// Fullscreen entered (`true`) or left (`false`).
    Fullscreen(bool),
    /// `show-overlay-html` with the markup.
    Overlay(String),
    /// `hide-overlay-html`.
    OverlayHidden,
}

/// Chat surface that records every call and succeeds.
#[derive(Debug, Default)]
pub struct RecordingChat {
    actions: Mutex<Vec<ChatAction>>,
}

impl RecordingChat {
    /// New recorder with no actions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in arrival order.
    pub fn actions(&self) -> Vec<ChatAction> {
        lock(&self.actions).clone()
    }

    fn record(&self, action: ChatAction) {
        lock(&self.actions).push(action);
    }
}

#[async_trait]
impl ChatSurface for RecordingChat {
    async fn post_to_chat(&self, message: &str) -> Result<()> {
        self.record(ChatAction::Message(message.to_owned()));
        Ok(())
    }

    async fn show_script(&self) -> Result<()> {
        self.record(ChatAction::ScriptShown);
        Ok(())
    }

    async fn show_snack(&self, text: &str) -> Result<()> {
        self.record(ChatAction::Snack(text.to_owned()));
        Ok(())
    }

    async fn hide_snack(&self) -> Result<()> {
        self.record(ChatAction::SnackHidden);
        Ok(())
    }

    async fn set_chat_minimized(&self, minimized: bool) -> Result<()> {
        self.record(ChatAction::Minimized(minimized));
        Ok(())
    }

    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        self.record(ChatAction::Fullscreen(fullscreen));
        Ok(())
    }

    async fn show_overlay_html(&self, html: &str) -> Result<()> {
        self.record(ChatAction::Overlay(html.to_owned()));
        Ok(())
    }

    async fn hide_overlay_html(&self) -> Result<()> {
        self.record(ChatAction::OverlayHidden);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_accumulates_history_and_attempts() {
        let store = MemoryProgressStore::new();
        store.save_instance_data(json!({"answer": 1})).await.unwrap();
        store.save_instance_data(json!({"answer": 2})).await.unwrap();
        assert_eq!(store.instance_data_history().await.unwrap().len(), 2);

        assert_eq!(store.user_progress().await.unwrap(), None);
        store.save_user_progress(json!(0.5)).await.unwrap();
        assert_eq!(store.user_progress().await.unwrap(), Some(json!(0.5)));

        assert_eq!(store.increment_attempts().await.unwrap(), 1);
        assert_eq!(store.increment_attempts().await.unwrap(), 2);
        assert!(!store.completed());
        store.mark_completed().await.unwrap();
        assert!(store.completed());
    }

    #[tokio::test]
    async fn chat_records_in_arrival_order() {
        let chat = RecordingChat::new();
        chat.post_to_chat("hello").await.unwrap();
        chat.set_chat_minimized(true).await.unwrap();
        chat.show_snack("well done").await.unwrap();
        assert_eq!(
            chat.actions(),
            vec![
                ChatAction::Message("hello".into()),
                ChatAction::Minimized(true),
                ChatAction::Snack("well done".into()),
            ]
        );
    }
}
