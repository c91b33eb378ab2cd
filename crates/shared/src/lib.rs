//! Storyforge Protocol - Shared types for backend and Player communication
//!
//! This crate contains all types exchanged between the story backend and the Player:
//! - WebSocket message types (outbound `ClientMessage`, inbound `ChatEvent` / `GenerationEvent`)
//! - Close-code vocabulary used by the reconnect policy
//! - REST DTOs for stories, chapters, scenes and auth
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, and thiserror
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Forward compatible** - Unknown inbound event types parse to an `Unknown` variant

pub mod close_code;
pub mod dto;
pub mod messages;
mod nullable;
pub mod types;

// =============================================================================
// WebSocket Message Types
// =============================================================================
pub use messages::{
    ChatEvent, ChatRequest, ClientMessage, EmptyPayload, GenerationEvent, ProtocolError,
};

// =============================================================================
// Shared Types
// =============================================================================
pub use types::{
    ActionChanged, Analysis, AvailableAction, CharacterRelationship, ChatRole, CompletionPayload,
    CreatedStory, ErrorPayload, GeneratedCharacter, Location, Message, PlayerCharacterDraft,
    StatusUpdate, StoryGenerationRequest, WorldCreated, WorldSettings,
};

// =============================================================================
// REST DTOs
// =============================================================================
pub use dto::{
    Chapter, CharacterDto, CreateStoryRequest, CreateStoryResponse, ForgotPasswordRequest,
    LatestScene, LocationDto, LoginCredentials, LoginResponse, MessageResponse, MessagesResponse,
    NewChapter, RegisterCredentials, SceneDto, StoryDto, StoryPlayerCharacter, UserDto,
};
