//! Storyforge Player client crate.
//!
//! Reconnecting WebSocket channels for scene chat and story/scene generation,
//! the reducers that fold their frames into a shared query cache, and the
//! REST client for stories, chapters and scenes.

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod state;

// Re-export commonly used entrypoints
pub use application::{QueryService, SceneChatService, SceneGenerationService, StoryGenerationService};
pub use config::ClientConfig;
pub use infrastructure::websocket::{create_connection, Connection, TungsteniteConnector};
pub use state::QueryCache;
