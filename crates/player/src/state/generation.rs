//! Story and scene generation progress.
//!
//! `GenerationState` is a forward-only state machine folded from generation
//! events; `GenerationTracker` keeps it in the shared cache so views observe
//! it like any other query.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use storyforge_shared::{
    CompletionPayload, CreatedStory, GeneratedCharacter, GenerationEvent, Location, WorldCreated,
};

use super::cache::{QueryCache, QueryKey};

pub const READY_MESSAGE: &str = "Ready to generate story";
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred during generation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Connecting,
    Generating,
    Complete,
    Error,
}

impl GenerationStatus {
    /// Complete and Error only leave through `reset`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Generating => 2,
            Self::Complete => 3,
            Self::Error => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationState {
    pub status: GenerationStatus,
    pub status_message: String,
    pub last_location: Option<Location>,
    pub characters: Vec<GeneratedCharacter>,
    /// Action type -> description of what the generator is doing
    pub actions: BTreeMap<String, String>,
    /// Final payload of SCENE_COMPLETE / INITIALIZATION_COMPLETE
    pub result: Option<CompletionPayload>,
    pub description: Option<String>,
    pub world: Option<WorldCreated>,
    pub story: Option<CreatedStory>,
    pub player_character: Option<GeneratedCharacter>,
    pub error: Option<String>,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            status: GenerationStatus::Idle,
            status_message: READY_MESSAGE.to_string(),
            last_location: None,
            characters: Vec::new(),
            actions: BTreeMap::new(),
            result: None,
            description: None,
            world: None,
            story: None,
            player_character: None,
            error: None,
        }
    }
}

impl GenerationState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The socket opened: idle moves to connecting, later states stay put.
    pub fn connection_opened(&mut self) {
        self.advance(GenerationStatus::Connecting);
    }

    pub fn can_begin(&self) -> bool {
        !self.status.is_terminal()
    }

    /// A start request was sent. Refused once complete or failed.
    pub fn begin(&mut self, message: &str) -> bool {
        if !self.advance(GenerationStatus::Generating) {
            return false;
        }
        self.status_message = message.to_string();
        self.error = None;
        true
    }

    /// Fold one event.
    pub fn apply(&mut self, event: GenerationEvent) {
        match event {
            GenerationEvent::Error(payload) => {
                let message = if payload.message.is_empty() {
                    UNKNOWN_ERROR_MESSAGE.to_string()
                } else {
                    payload.message
                };
                self.status = GenerationStatus::Error;
                self.error = Some(message);
            }
            GenerationEvent::AuthSuccess(_) => {
                tracing::debug!("Socket authenticated");
            }
            GenerationEvent::Unknown(kind) => {
                tracing::warn!(kind = %kind, "Received unknown generation event type");
            }
            _ if self.status.is_terminal() => {
                tracing::debug!(
                    kind = event.kind(),
                    status = ?self.status,
                    "Ignoring progress after generation finished"
                );
            }
            GenerationEvent::SceneStart => {
                self.advance(GenerationStatus::Generating);
            }
            GenerationEvent::StatusUpdate(update) => {
                if self.advance(GenerationStatus::Generating) {
                    self.status_message = update.message;
                }
            }
            GenerationEvent::ActionChanged(changed) => {
                if self.advance(GenerationStatus::Generating) {
                    self.actions = changed.actions;
                }
            }
            GenerationEvent::LocationAdded(location) => {
                if self.advance(GenerationStatus::Generating) {
                    self.last_location = Some(location);
                }
            }
            GenerationEvent::CharacterAdded(character) => {
                if self.advance(GenerationStatus::Generating) {
                    self.characters.push(character);
                }
            }
            GenerationEvent::WorldCreated(world) => self.world = Some(world),
            GenerationEvent::StoryCreated(story) => self.story = Some(story),
            GenerationEvent::CharacterCreated(character) => self.player_character = Some(character),
            GenerationEvent::SceneComplete(payload)
            | GenerationEvent::InitializationComplete(payload) => self.complete(payload),
        }
    }

    fn complete(&mut self, payload: CompletionPayload) {
        self.status = GenerationStatus::Complete;
        if let Some(message) = &payload.message {
            self.status_message = message.clone();
        }
        if let Some(location) = &payload.location {
            self.last_location = Some(location.clone());
        }
        if let Some(characters) = &payload.characters {
            self.characters = characters.clone();
        }
        self.description = payload.description.clone();
        self.actions.clear();
        self.result = Some(payload);
    }

    /// Move to `target` unless that would go backwards or leave a terminal
    /// state. Returns whether the state is now `target`.
    fn advance(&mut self, target: GenerationStatus) -> bool {
        if self.status.is_terminal() || target.rank() < self.status.rank() {
            return false;
        }
        self.status = target;
        true
    }
}

/// Generation state stored in the shared cache under one key
#[derive(Debug, Clone)]
pub struct GenerationTracker {
    cache: QueryCache,
    key: QueryKey,
}

impl GenerationTracker {
    pub fn new(cache: QueryCache, key: QueryKey) -> Self {
        Self { cache, key }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> GenerationState {
        self.cache.get(&self.key).unwrap_or_default()
    }

    /// Parse and fold one frame; unparseable frames are logged and dropped.
    pub fn handle_frame(&self, text: &str) {
        match GenerationEvent::parse(text) {
            Ok(event) => self.modify(|state| state.apply(event)),
            Err(e) => tracing::warn!(key = %self.key, error = %e, "Dropping malformed generation frame"),
        }
    }

    pub fn connection_opened(&self) {
        self.modify(GenerationState::connection_opened);
    }

    pub fn can_begin(&self) -> bool {
        self.state().can_begin()
    }

    pub fn begin(&self, message: &str) -> bool {
        let mut began = false;
        self.modify(|state| began = state.begin(message));
        began
    }

    /// Undo a `begin` whose request never reached the socket. A terminal
    /// state folded in the meantime is kept.
    pub fn restore(&self, previous: GenerationState) {
        self.modify(|state| {
            if !state.status.is_terminal() {
                *state = previous;
            }
        });
    }

    pub fn reset(&self) {
        self.cache.set(self.key.clone(), &GenerationState::default());
    }

    fn modify(&self, f: impl FnOnce(&mut GenerationState)) {
        self.cache
            .update(self.key.clone(), |old: Option<GenerationState>| {
                let mut state = old.unwrap_or_default();
                f(&mut state);
                state
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cache::keys;
    use storyforge_shared::{ActionChanged, ErrorPayload, StatusUpdate};

    fn character(name: &str) -> GeneratedCharacter {
        GeneratedCharacter {
            name: name.to_string(),
            ..GeneratedCharacter::default()
        }
    }

    fn location(name: &str) -> Location {
        Location {
            name: name.to_string(),
            ..Location::default()
        }
    }

    fn generating() -> GenerationState {
        let mut state = GenerationState::default();
        state.apply(GenerationEvent::SceneStart);
        state
    }

    #[test]
    fn progress_events_move_to_generating() {
        let mut state = GenerationState::default();
        state.connection_opened();
        assert_eq!(state.status, GenerationStatus::Connecting);

        state.apply(GenerationEvent::StatusUpdate(StatusUpdate {
            status: None,
            message: "Creating world...".into(),
        }));
        assert_eq!(state.status, GenerationStatus::Generating);
        assert_eq!(state.status_message, "Creating world...");

        state.apply(GenerationEvent::LocationAdded(location("Dock")));
        state.apply(GenerationEvent::CharacterAdded(character("Mara")));
        state.apply(GenerationEvent::ActionChanged(ActionChanged {
            story_id: None,
            actions: BTreeMap::from([("image".to_string(), "Painting the dock".to_string())]),
        }));
        assert_eq!(state.last_location, Some(location("Dock")));
        assert_eq!(state.characters, vec![character("Mara")]);
        assert_eq!(state.actions.len(), 1);

        // Never back to connecting
        state.connection_opened();
        assert_eq!(state.status, GenerationStatus::Generating);
    }

    #[test]
    fn scene_complete_supersedes_incremental_characters() {
        let mut state = generating();
        state.apply(GenerationEvent::CharacterAdded(character("Mara")));
        state.apply(GenerationEvent::CharacterAdded(character("Jun")));

        let payload = CompletionPayload {
            description: Some("Fog over the harbour".into()),
            location: Some(location("Harbour")),
            characters: Some(vec![character("Jun"), character("Oskar")]),
            ..CompletionPayload::default()
        };
        state.apply(GenerationEvent::SceneComplete(payload.clone()));

        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.characters, vec![character("Jun"), character("Oskar")]);
        assert_eq!(state.last_location, Some(location("Harbour")));
        assert_eq!(state.description.as_deref(), Some("Fog over the harbour"));
        assert!(state.actions.is_empty());
        assert_eq!(state.result, Some(payload));
    }

    #[test]
    fn completion_without_cast_keeps_accumulated_values() {
        let mut state = generating();
        state.apply(GenerationEvent::LocationAdded(location("Dock")));
        state.apply(GenerationEvent::CharacterAdded(character("Mara")));
        state.apply(GenerationEvent::InitializationComplete(CompletionPayload {
            message: Some("Story ready".into()),
            ..CompletionPayload::default()
        }));

        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.status_message, "Story ready");
        assert_eq!(state.characters, vec![character("Mara")]);
        assert_eq!(state.last_location, Some(location("Dock")));
    }

    #[test]
    fn complete_ignores_further_progress() {
        let mut state = generating();
        state.apply(GenerationEvent::SceneComplete(CompletionPayload::default()));
        state.apply(GenerationEvent::CharacterAdded(character("Late")));
        state.apply(GenerationEvent::SceneStart);

        assert_eq!(state.status, GenerationStatus::Complete);
        assert!(state.characters.is_empty());
        assert!(!state.begin("again"));
    }

    #[test]
    fn error_wins_from_any_state_and_reset_clears_everything() {
        for mut state in [
            GenerationState::default(),
            {
                let mut s = GenerationState::default();
                s.connection_opened();
                s
            },
            generating(),
        ] {
            state.apply(GenerationEvent::CharacterAdded(character("Mara")));
            state.apply(GenerationEvent::Error(ErrorPayload {
                message: "LLM timeout".into(),
            }));
            assert_eq!(state.status, GenerationStatus::Error);
            assert_eq!(state.error.as_deref(), Some("LLM timeout"));

            state.reset();
            assert_eq!(state, GenerationState::default());
            assert_eq!(state.status_message, READY_MESSAGE);
        }
    }

    #[test]
    fn error_without_message_uses_default_text() {
        let mut state = generating();
        state.apply(GenerationEvent::Error(ErrorPayload::default()));
        assert_eq!(state.error.as_deref(), Some(UNKNOWN_ERROR_MESSAGE));
    }

    #[test]
    fn created_entities_are_stored_without_status_change() {
        let mut state = GenerationState::default();
        state.apply(GenerationEvent::WorldCreated(WorldCreated {
            description: "A drowned city".into(),
            rules: vec![],
        }));
        state.apply(GenerationEvent::CharacterCreated(character("Player")));
        state.apply(GenerationEvent::AuthSuccess(ErrorPayload::default()));

        assert_eq!(state.status, GenerationStatus::Idle);
        assert_eq!(state.world.as_ref().map(|w| w.description.as_str()), Some("A drowned city"));
        assert_eq!(state.player_character, Some(character("Player")));
    }

    #[test]
    fn tracker_folds_frames_into_cache() {
        let cache = QueryCache::new();
        let tracker = GenerationTracker::new(cache.clone(), keys::scene_generation("st1"));

        tracker.connection_opened();
        assert!(tracker.begin("Starting scene generation..."));
        tracker.handle_frame(r#"{"type":"CHARACTER_ADDED","payload":{"name":"Mara"}}"#);
        tracker.handle_frame("garbage");
        tracker.handle_frame(r#"{"type":"LOCATION_ADDED","payload":"not an object"}"#);
        tracker.handle_frame(r#"{"type":"SOMETHING_NEW","payload":{}}"#);

        let state: GenerationState = cache.get(&keys::scene_generation("st1")).unwrap();
        assert_eq!(state.status, GenerationStatus::Generating);
        assert_eq!(state.status_message, "Starting scene generation...");
        assert_eq!(state.characters, vec![character("Mara")]);
        assert_eq!(state.last_location, None);

        tracker.handle_frame(r#"{"type":"ERROR","payload":{"message":"boom"}}"#);
        assert!(!tracker.can_begin());
        tracker.reset();
        assert_eq!(tracker.state(), GenerationState::default());
    }

    #[test]
    fn tracker_keeps_character_frames_with_null_lists() {
        let tracker = GenerationTracker::new(QueryCache::new(), keys::scene_generation("st1"));
        tracker.begin("Starting scene generation...");
        tracker.handle_frame(
            r#"{"type":"CHARACTER_ADDED","payload":{"name":"Mara","personalityTraits":null,"goals":null,"relationships":null}}"#,
        );
        tracker.handle_frame(
            r#"{"type":"SCENE_COMPLETE","payload":{"storyId":"st1","characters":[{"name":"Mara","personalityTraits":null}],"location":{"name":"Dock","rules":null}}}"#,
        );

        let state = tracker.state();
        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.characters, vec![character("Mara")]);
        assert_eq!(state.last_location, Some(location("Dock")));
    }

    #[test]
    fn restore_undoes_begin_but_keeps_terminal_states() {
        let tracker = GenerationTracker::new(QueryCache::new(), keys::scene_generation("st1"));
        tracker.connection_opened();
        let previous = tracker.state();
        assert!(tracker.begin("Starting scene generation..."));
        tracker.restore(previous.clone());
        assert_eq!(tracker.state(), previous);

        assert!(tracker.begin("Starting scene generation..."));
        tracker.handle_frame(r#"{"type":"ERROR","payload":{"message":"boom"}}"#);
        tracker.restore(previous);
        assert_eq!(tracker.state().status, GenerationStatus::Error);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(GenerationStatus::Generating).unwrap(),
            serde_json::json!("generating")
        );
    }
}
