//! REST DTOs for the story backend.
//!
//! The REST surface uses snake_case JSON (unlike the camelCase WebSocket
//! payloads), so these types are kept apart from [`crate::types`].

use serde::{Deserialize, Serialize};

use crate::nullable::null_as_default;
use crate::types::Message;

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCredentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

/// Returned by login and registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserDto,
}

/// Generic `{ "message": ... }` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// Stories and chapters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryPlayerCharacter {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryDto {
    pub uuid: String,
    pub title: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brief_description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<String>,
    #[serde(default)]
    pub player_character: Option<StoryPlayerCharacter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStoryRequest {
    pub title: String,
    pub description: String,
    pub rules: String,
    pub uuid: String,
}

/// Echo of a created story; `rules` comes back as the submitted string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStoryResponse {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub story_id: i64,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt: String,
}

/// Chapter body for creation (the backend assigns the id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChapter {
    pub story_id: i64,
    pub title: String,
    pub description: String,
    pub prompt: String,
}

// =============================================================================
// Scenes, characters and locations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDto {
    pub uuid: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, rename = "imageUrl", alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDto {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avatar: String,
    #[serde(
        default,
        rename = "relationshipLevel",
        alias = "relationship_level",
        deserialize_with = "null_as_default"
    )]
    pub relationship_level: f64,
    #[serde(
        default,
        rename = "threadId",
        alias = "thread_id",
        deserialize_with = "null_as_default"
    )]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub health: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDto {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt: String,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub chapter_id: Option<i64>,
}

/// The scene a story is currently at, with its cast and chat so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestScene {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub location: Option<LocationDto>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<CharacterDto>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_scene_accepts_camel_case_character_fields() {
        let scene: LatestScene = serde_json::from_str(
            r#"{
                "id": 7,
                "description": "Rain on neon",
                "characters": [{"id": "1", "name": "Officer", "relationshipLevel": 2, "threadId": "t1"}],
                "messages": [{"role": "assistant", "content": "Halt.", "threadId": "t1"}]
            }"#,
        )
        .expect("parse");
        assert_eq!(scene.characters[0].thread_id, "t1");
        assert_eq!(scene.characters[0].relationship_level, 2.0);
        assert_eq!(scene.messages.len(), 1);
        assert!(scene.location.is_none());
    }

    #[test]
    fn latest_scene_accepts_backend_nulls() {
        let scene: LatestScene = serde_json::from_str(
            r#"{
                "id": 8,
                "uuid": null,
                "description": null,
                "location": {"uuid": "l1", "name": "Dock", "description": null, "imageUrl": null, "rules": null},
                "characters": [{"id": "1", "name": "Officer", "avatar": null, "relationshipLevel": null, "threadId": null, "health": null}],
                "messages": null
            }"#,
        )
        .expect("parse");
        assert_eq!(scene.description, "");
        assert!(scene.messages.is_empty());
        assert_eq!(scene.characters[0].thread_id, "");
        assert_eq!(scene.characters[0].relationship_level, 0.0);
        let location = scene.location.expect("location");
        assert!(location.rules.is_empty());
        assert!(location.image_url.is_none());
    }
}
