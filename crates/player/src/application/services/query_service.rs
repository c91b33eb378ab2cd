//! Query Service - REST loads and mutations backed by the query cache
//!
//! Loaders fetch from the backend and store the result under the same keys
//! the WebSocket reducers write to, so a streamed chat reply extends the
//! history that was loaded over HTTP. Mutations drop the keys they make stale.

use storyforge_shared::{
    Analysis, Chapter, CreateStoryRequest, CreateStoryResponse, LatestScene, Message, NewChapter,
    StoryDto,
};

use crate::infrastructure::http_client::{ApiClient, ApiError};
use crate::state::{keys, QueryCache};

pub struct QueryService {
    api: ApiClient,
    cache: QueryCache,
}

impl QueryService {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn stories(&self) -> Result<Vec<StoryDto>, ApiError> {
        let stories = self.api.list_stories().await?;
        self.cache.set(keys::stories(), &stories);
        Ok(stories)
    }

    pub async fn chapters(&self, story_id: &str) -> Result<Vec<Chapter>, ApiError> {
        let chapters = self.api.list_chapters(story_id).await?;
        self.cache.set(keys::chapters(story_id), &chapters);
        Ok(chapters)
    }

    /// Load the story's current scene and seed each character's chat
    /// history from the messages that came with it.
    pub async fn latest_scene(&self, story_id: &str) -> Result<LatestScene, ApiError> {
        let scene = self.api.latest_scene(story_id).await?;
        self.cache.set(keys::latest_scene(story_id), &scene);

        let scene_id = scene.id.to_string();
        for character in &scene.characters {
            let history: Vec<&Message> = scene
                .messages
                .iter()
                .filter(|m| m.thread_id == character.thread_id)
                .collect();
            if !history.is_empty() {
                self.cache
                    .set(keys::scene_messages(&scene_id, &character.id), &history);
            }
        }
        Ok(scene)
    }

    pub async fn scene_messages(
        &self,
        scene_id: &str,
        character_id: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let messages = self.api.scene_messages(scene_id).await?;
        self.cache
            .set(keys::scene_messages(scene_id, character_id), &messages);
        Ok(messages)
    }

    pub async fn thread_analysis(&self, scene_id: &str) -> Result<Analysis, ApiError> {
        let analysis = self.api.thread_analysis(scene_id).await?;
        self.cache.set(keys::thread_analysis(scene_id), &analysis);
        Ok(analysis)
    }

    pub async fn create_story(
        &self,
        request: &CreateStoryRequest,
    ) -> Result<CreateStoryResponse, ApiError> {
        let created = self.api.create_story(request).await?;
        self.cache.remove(&keys::stories());
        Ok(created)
    }

    pub async fn create_chapter(
        &self,
        story_id: &str,
        chapter: &NewChapter,
    ) -> Result<Chapter, ApiError> {
        let created = self.api.create_chapter(story_id, chapter).await?;
        self.cache.invalidate_prefix(&keys::chapters(story_id));
        Ok(created)
    }

    pub async fn update_chapter(&self, story_id: &str, chapter: &Chapter) -> Result<Chapter, ApiError> {
        let updated = self.api.update_chapter(story_id, chapter).await?;
        self.cache.invalidate_prefix(&keys::chapters(story_id));
        Ok(updated)
    }

    pub async fn delete_chapter(&self, story_id: &str, chapter_id: i64) -> Result<(), ApiError> {
        self.api.delete_chapter(story_id, chapter_id).await?;
        self.cache.invalidate_prefix(&keys::chapters(story_id));
        Ok(())
    }

    /// Mark the scene finished; the story's latest scene must be reloaded.
    pub async fn complete_scene(&self, story_id: &str, scene_id: &str) -> Result<(), ApiError> {
        self.api.complete_scene(story_id, scene_id).await?;
        self.cache.remove(&keys::latest_scene(story_id));
        tracing::info!(story_id, scene_id, "Scene completed");
        Ok(())
    }
}
