//! Application layer: use cases composed from the realtime connection, the
//! REST client and the cache reducers.

pub mod services;

pub use services::{QueryService, SceneChatService, SceneGenerationService, StoryGenerationService};
