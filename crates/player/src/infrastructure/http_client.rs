//! REST client for the story backend.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use storyforge_shared::{
    Analysis, Chapter, CharacterDto, CreateStoryRequest, CreateStoryResponse,
    ForgotPasswordRequest, LatestScene, LocationDto, LoginCredentials, LoginResponse, Message,
    MessageResponse, MessagesResponse, NewChapter, RegisterCredentials, SceneDto, StoryDto,
};

use super::storage::CredentialStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("HTTP Error {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

/// JSON client attaching the stored bearer token to every request
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialStore>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    // -------------------------------------------------------------------------
    // Auth
    // -------------------------------------------------------------------------

    /// Log in and store the returned token
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = self
            .json(self.client.post(self.url("/auth/login")).json(credentials))
            .await?;
        self.credentials.set_token(&response.token);
        Ok(response)
    }

    /// Register and store the returned token
    pub async fn register(
        &self,
        credentials: &RegisterCredentials,
    ) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = self
            .json(self.client.post(self.url("/auth/register")).json(credentials))
            .await?;
        self.credentials.set_token(&response.token);
        Ok(response)
    }

    pub async fn forgot_password(
        &self,
        request: &ForgotPasswordRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.json(self.client.post(self.url("/auth/forgot-password")).json(request))
            .await
    }

    pub fn logout(&self) {
        self.credentials.remove_token();
    }

    // -------------------------------------------------------------------------
    // Stories and chapters
    // -------------------------------------------------------------------------

    pub async fn list_stories(&self) -> Result<Vec<StoryDto>, ApiError> {
        self.json(self.client.get(self.url("/stories"))).await
    }

    pub async fn create_story(
        &self,
        request: &CreateStoryRequest,
    ) -> Result<CreateStoryResponse, ApiError> {
        self.json(self.client.post(self.url("/stories")).json(request))
            .await
    }

    pub async fn list_chapters(&self, story_id: &str) -> Result<Vec<Chapter>, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/stories/{story_id}/chapters"))),
        )
        .await
    }

    pub async fn get_chapter(&self, story_id: &str, chapter_id: i64) -> Result<Chapter, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/stories/{story_id}/chapters/{chapter_id}"))),
        )
        .await
    }

    pub async fn create_chapter(
        &self,
        story_id: &str,
        chapter: &NewChapter,
    ) -> Result<Chapter, ApiError> {
        self.json(
            self.client
                .post(self.url(&format!("/api/stories/{story_id}/chapters")))
                .json(chapter),
        )
        .await
    }

    pub async fn update_chapter(&self, story_id: &str, chapter: &Chapter) -> Result<Chapter, ApiError> {
        self.json(
            self.client
                .put(self.url(&format!("/api/stories/{story_id}/chapters/{}", chapter.id)))
                .json(chapter),
        )
        .await
    }

    pub async fn delete_chapter(&self, story_id: &str, chapter_id: i64) -> Result<(), ApiError> {
        self.execute(
            self.client
                .delete(self.url(&format!("/api/stories/{story_id}/chapters/{chapter_id}"))),
        )
        .await
        .map(drop)
    }

    // -------------------------------------------------------------------------
    // Scenes
    // -------------------------------------------------------------------------

    pub async fn get_scene(&self, scene_id: &str) -> Result<SceneDto, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/scenes/{scene_id}")))
                .query(&[("resource_id", scene_id)]),
        )
        .await
    }

    pub async fn list_scenes(&self, chapter_id: &str) -> Result<Vec<SceneDto>, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/chapters/{chapter_id}/scenes")))
                .query(&[("resource_id", chapter_id)]),
        )
        .await
    }

    pub async fn latest_scene(&self, story_id: &str) -> Result<LatestScene, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/stories/{story_id}/latest-scene"))),
        )
        .await
    }

    pub async fn complete_scene(&self, story_id: &str, scene_id: &str) -> Result<(), ApiError> {
        self.execute(
            self.client
                .patch(self.url(&format!("/stories/{story_id}/scenes/{scene_id}/complete"))),
        )
        .await
        .map(drop)
    }

    pub async fn scene_messages(&self, scene_id: &str) -> Result<Vec<Message>, ApiError> {
        let response: MessagesResponse = self
            .json(
                self.client
                    .get(self.url(&format!("/api/scenes/{scene_id}/messages"))),
            )
            .await?;
        Ok(response.messages)
    }

    pub async fn thread_analysis(&self, thread_id: &str) -> Result<Analysis, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/game-master/threads/{thread_id}/analysis"))),
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Characters and locations
    // -------------------------------------------------------------------------

    pub async fn get_character(&self, character_id: &str) -> Result<CharacterDto, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/characters/{character_id}"))),
        )
        .await
    }

    pub async fn get_location(&self, location_id: &str) -> Result<LocationDto, ApiError> {
        self.json(
            self.client
                .get(self.url(&format!("/api/locations/{location_id}"))),
        )
        .await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.execute(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match self.credentials.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "API request failed");
            ApiError::RequestFailed(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %response.url(), "Unauthorized, clearing stored token");
            self.credentials.remove_token();
        }

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::{InMemoryCredentialStore, MockCredentialStore};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, store: &InMemoryCredentialStore) -> ApiClient {
        ApiClient::new(&server.uri(), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "username": "ada", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "abc",
                "user": { "id": "1", "username": "ada", "email": "ada@example.com" }
            })))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::new();
        let response = client(&server, &store)
            .login(&LoginCredentials {
                username: "ada".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();

        assert_eq!(response.user.username, "ada");
        assert_eq!(store.token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_bearer_token_is_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scenes/s1/messages"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "role": "user", "content": "hi", "threadId": "s1" }]
            })))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::with_token("abc");
        let messages = client(&server, &store).scene_messages("s1").await.unwrap();
        assert_eq!(messages, vec![Message::user("hi", "s1")]);
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stories"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::with_token("expired");
        let err = client(&server, &store).list_stories().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(store.token(), None);
    }

    #[tokio::test]
    async fn test_server_error_keeps_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stories/st1/latest-scene"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::with_token("abc");
        let err = client(&server, &store).latest_scene("st1").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert_eq!(store.token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_scene_lookup_sends_resource_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scenes/42"))
            .and(query_param("resource_id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42, "prompt": "dusk" })))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::new();
        let scene = client(&server, &store).get_scene("42").await.unwrap();
        assert_eq!(scene.id, 42);
        assert_eq!(scene.prompt, "dusk");
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/game-master/threads/t1/analysis"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::new();
        let err = client(&server, &store).thread_analysis("t1").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_scene_uses_patch_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/stories/st1/scenes/sc1/complete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = MockCredentialStore::new();
        store.expect_token().return_const(None);
        store.expect_remove_token().never();
        let client = ApiClient::new(&server.uri(), Arc::new(store));
        client.complete_scene("st1", "sc1").await.unwrap();
    }
}
