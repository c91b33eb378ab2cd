//! Scene chat reducer.
//!
//! Folds `chat_chunk` / `chat_complete` / `analysis` frames into the cached
//! message list and relationship analysis of one scene + character pair.

use storyforge_shared::{Analysis, ChatEvent, Message};

use super::cache::{keys, QueryCache, QueryKey};

/// Append streamed assistant text.
///
/// Extends the trailing assistant message in place, otherwise starts a new
/// assistant message. Empty chunks change nothing; returns whether anything did.
pub fn apply_chunk(messages: &mut Vec<Message>, content: &str, thread_id: &str) -> bool {
    if content.is_empty() {
        return false;
    }
    match messages.last_mut() {
        Some(last) if last.is_assistant() => last.content.push_str(content),
        _ => messages.push(Message::assistant(content, thread_id)),
    }
    true
}

/// Cache-backed chat state for one scene and character
#[derive(Debug, Clone)]
pub struct SceneChatState {
    cache: QueryCache,
    scene_id: String,
    character_id: String,
}

impl SceneChatState {
    pub fn new(cache: QueryCache, scene_id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            cache,
            scene_id: scene_id.into(),
            character_id: character_id.into(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn character_id(&self) -> &str {
        &self.character_id
    }

    pub fn messages_key(&self) -> QueryKey {
        keys::scene_messages(&self.scene_id, &self.character_id)
    }

    pub fn analysis_key(&self) -> QueryKey {
        keys::thread_analysis(&self.scene_id)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.cache.get(&self.messages_key()).unwrap_or_default()
    }

    pub fn analysis(&self) -> Analysis {
        self.cache.get(&self.analysis_key()).unwrap_or_default()
    }

    /// Seed the history, e.g. from the latest-scene payload
    pub fn seed_messages(&self, messages: &[Message]) {
        self.cache.set(self.messages_key(), messages);
    }

    /// Fold one inbound text frame. Malformed or unknown frames are logged
    /// and leave the cache untouched.
    pub fn handle_frame(&self, text: &str) {
        let event = match ChatEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(scene_id = %self.scene_id, error = %e, "Dropping malformed chat frame");
                return;
            }
        };

        match event {
            ChatEvent::ChatChunk { content } => {
                let Some(content) = content.filter(|c| !c.is_empty()) else {
                    tracing::debug!("Ignoring empty chat chunk");
                    return;
                };
                let thread_id = self.scene_id.clone();
                self.cache
                    .update(self.messages_key(), |old: Option<Vec<Message>>| {
                        let mut messages = old.unwrap_or_default();
                        apply_chunk(&mut messages, &content, &thread_id);
                        messages
                    });
            }
            // Turn boundary only
            ChatEvent::ChatComplete => {
                tracing::debug!(scene_id = %self.scene_id, "Chat turn complete");
            }
            ChatEvent::Analysis { analysis } => match analysis {
                Some(analysis) => self.cache.set(self.analysis_key(), &analysis),
                None => tracing::warn!("Analysis frame without analysis payload"),
            },
            ChatEvent::Unknown => {
                tracing::warn!(scene_id = %self.scene_id, frame = %text, "Unknown chat event type");
            }
        }
    }

    /// Optimistically append a user message; returns the full history to send.
    pub fn push_user_message(&self, content: &str) -> Vec<Message> {
        let message = Message::user(content, self.scene_id.clone());
        self.cache
            .update(self.messages_key(), |old: Option<Vec<Message>>| {
                let mut messages = old.unwrap_or_default();
                messages.push(message);
                messages
            })
    }
}
