//! Shared value types carried inside WebSocket payloads.
//!
//! Field names follow the backend's camelCase JSON. Most fields default when
//! absent so that partially populated generation snapshots still parse.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::nullable::null_as_default;

// =============================================================================
// Scene chat
// =============================================================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of a scene's chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
    /// Conversation thread this message belongs to (the scene id)
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
}

impl Message {
    pub fn user(content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            thread_id: thread_id.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            thread_id: thread_id.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }
}

/// An action the player may take next, as suggested by the game master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableAction {
    pub name: String,
}

/// Relationship analysis pushed alongside chat turns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationship_level: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub available_actions: Vec<AvailableAction>,
}

// =============================================================================
// Story / scene generation
// =============================================================================

/// World settings chosen by the player before story generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub theme: String,
    pub genre: String,
    pub year: i32,
    pub setting: String,
}

/// Player-supplied description of their character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCharacterDraft {
    pub name: String,
    pub age: u32,
    pub appearance: String,
    pub background: String,
}

/// Payload of `INITIALIZE_GAME`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryGenerationRequest {
    pub world: WorldSettings,
    pub player_character: PlayerCharacterDraft,
}

/// A location discovered during generation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRelationship {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: i32,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub backstory: String,
}

/// A character created by the generator (NPC or the player character)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCharacter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub personality_traits: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub backstory: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goals: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationships: Vec<CharacterRelationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// "player" or "npc"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Payload of `STATUS_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Machine-readable phase, e.g. `GENERATING_WORLD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

/// Payload of `WORLD_CREATED`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldCreated {
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<String>,
}

/// Payload of `STORY_CREATED`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreatedStory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<String>,
}

/// Payload of `ACTION_CHANGED`: the full set of in-flight generator actions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    /// Action type -> human-readable status
    #[serde(default, deserialize_with = "null_as_default")]
    pub actions: BTreeMap<String, String>,
}

/// Final snapshot carried by `SCENE_COMPLETE` and `INITIALIZATION_COMPLETE`
///
/// Every field is optional: story initialization only reports a message,
/// while scene completion may carry the authoritative location and cast.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<GeneratedCharacter>>,
}

/// Payload of `ERROR` (and `AUTH_SUCCESS`, which only carries a message)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}
