//! Application services
//!
//! Each service owns either a WebSocket `Connection` (chat and generation)
//! or the REST client, and writes what it receives into the shared
//! `QueryCache`.

pub mod generation_service;
pub mod query_service;
pub mod scene_chat_service;

pub use generation_service::{
    SceneGenerationService, StoryGenerationService, SCENE_START_MESSAGE, STORY_START_MESSAGE,
};
pub use query_service::QueryService;
pub use scene_chat_service::SceneChatService;
