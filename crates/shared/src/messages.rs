//! WebSocket message types for backend-Player communication
//!
//! Outbound frames are serialized from [`ClientMessage`] (typed control frames)
//! or [`ChatRequest`] (scene chat turns). Inbound frames are parsed per channel:
//! [`ChatEvent`] for scene chat and [`GenerationEvent`] for story and scene
//! generation.
//!
//! ## Versioning Policy
//!
//! - Unknown inbound `type` tags deserialize to `Unknown` for forward compatibility
//! - Renaming a tag is a breaking change on both sides

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{
    ActionChanged, Analysis, CompletionPayload, CreatedStory, ErrorPayload, GeneratedCharacter,
    Location, Message, StatusUpdate, StoryGenerationRequest, WorldCreated,
};

// =============================================================================
// Client Messages (Player -> backend)
// =============================================================================

/// Serializes as `{}`; used for commands whose payload carries no fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// Typed control frames sent by the Player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum ClientMessage {
    /// First frame after open when credentials are configured; header name -> value
    Authenticate(BTreeMap<String, String>),
    /// Kick off world, story and player-character generation
    InitializeGame(StoryGenerationRequest),
    /// Ask the backend to generate the next scene of a story
    StartSceneGeneration(EmptyPayload),
}

/// A scene chat turn: the full history including the new user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub scene_id: String,
    pub character_id: String,
    pub messages: Vec<Message>,
}

// =============================================================================
// Errors
// =============================================================================

/// Failure to interpret an inbound frame
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Scene chat events (backend -> Player)
// =============================================================================

/// Events pushed on a scene chat channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Streamed token(s) of the assistant's reply
    ChatChunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// End of a streamed turn
    ChatComplete,
    /// Updated relationship analysis
    Analysis {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        analysis: Option<Analysis>,
    },
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// =============================================================================
// Generation events (backend -> Player)
// =============================================================================

/// Wire tags for generation events
pub mod generation_tags {
    pub const STATUS_UPDATE: &str = "STATUS_UPDATE";
    pub const WORLD_CREATED: &str = "WORLD_CREATED";
    pub const STORY_CREATED: &str = "STORY_CREATED";
    pub const CHARACTER_CREATED: &str = "CHARACTER_CREATED";
    pub const INITIALIZATION_COMPLETE: &str = "INITIALIZATION_COMPLETE";
    pub const LOCATION_ADDED: &str = "LOCATION_ADDED";
    pub const CHARACTER_ADDED: &str = "CHARACTER_ADDED";
    pub const SCENE_COMPLETE: &str = "SCENE_COMPLETE";
    pub const ERROR: &str = "ERROR";
    pub const AUTH_SUCCESS: &str = "AUTH_SUCCESS";
    pub const SCENE_START: &str = "SCENE_START";
    pub const ACTION_CHANGED: &str = "ACTION_CHANGED";
}

/// Events pushed on the story-generation and scene-generation channels
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    StatusUpdate(StatusUpdate),
    WorldCreated(WorldCreated),
    StoryCreated(CreatedStory),
    CharacterCreated(GeneratedCharacter),
    InitializationComplete(CompletionPayload),
    LocationAdded(Location),
    CharacterAdded(GeneratedCharacter),
    SceneComplete(CompletionPayload),
    Error(ErrorPayload),
    AuthSuccess(ErrorPayload),
    SceneStart,
    ActionChanged(ActionChanged),
    /// Tag not understood by this client; carries the tag for logging
    Unknown(String),
}

/// `{"type": ..., "payload": ...}` before the payload is interpreted
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn payload<T: DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Like [`payload`], but a missing/null payload yields the default value
fn payload_or_default<T: DeserializeOwned + Default>(
    kind: &str,
    value: serde_json::Value,
) -> Result<T, ProtocolError> {
    if value.is_null() {
        Ok(T::default())
    } else {
        payload(kind, value)
    }
}

impl GenerationEvent {
    /// Parse one text frame. Unknown tags are not an error.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        use generation_tags::*;

        let RawFrame { kind, payload: body } = serde_json::from_str(text)?;
        let event = match kind.as_str() {
            STATUS_UPDATE => Self::StatusUpdate(payload_or_default(&kind, body)?),
            WORLD_CREATED => Self::WorldCreated(payload(&kind, body)?),
            STORY_CREATED => Self::StoryCreated(payload(&kind, body)?),
            CHARACTER_CREATED => Self::CharacterCreated(payload(&kind, body)?),
            INITIALIZATION_COMPLETE => Self::InitializationComplete(payload_or_default(&kind, body)?),
            LOCATION_ADDED => Self::LocationAdded(payload(&kind, body)?),
            CHARACTER_ADDED => Self::CharacterAdded(payload(&kind, body)?),
            SCENE_COMPLETE => Self::SceneComplete(payload_or_default(&kind, body)?),
            ERROR => Self::Error(payload_or_default(&kind, body)?),
            AUTH_SUCCESS => Self::AuthSuccess(payload_or_default(&kind, body)?),
            SCENE_START => Self::SceneStart,
            ACTION_CHANGED => Self::ActionChanged(payload_or_default(&kind, body)?),
            _ => Self::Unknown(kind),
        };
        Ok(event)
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &str {
        use generation_tags::*;

        match self {
            Self::StatusUpdate(_) => STATUS_UPDATE,
            Self::WorldCreated(_) => WORLD_CREATED,
            Self::StoryCreated(_) => STORY_CREATED,
            Self::CharacterCreated(_) => CHARACTER_CREATED,
            Self::InitializationComplete(_) => INITIALIZATION_COMPLETE,
            Self::LocationAdded(_) => LOCATION_ADDED,
            Self::CharacterAdded(_) => CHARACTER_ADDED,
            Self::SceneComplete(_) => SCENE_COMPLETE,
            Self::Error(_) => ERROR,
            Self::AuthSuccess(_) => AUTH_SUCCESS,
            Self::SceneStart => SCENE_START,
            Self::ActionChanged(_) => ACTION_CHANGED,
            Self::Unknown(kind) => kind.as_str(),
        }
    }
}
