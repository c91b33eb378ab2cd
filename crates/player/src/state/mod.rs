//! Client-side state: the shared query cache and the reducers that fold
//! server events into it.

pub mod cache;
pub mod chat;
pub mod generation;

pub use cache::{keys, QueryCache, QueryKey};
pub use chat::{apply_chunk, SceneChatState};
pub use generation::{GenerationState, GenerationStatus, GenerationTracker};
