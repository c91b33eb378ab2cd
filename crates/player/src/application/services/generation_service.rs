//! Story and scene generation over WebSocket channels
//!
//! Both services own their `Connection` and feed every frame into a
//! [`GenerationTracker`]. `generating` is entered before the start request is
//! written, so progress frames racing the write land on top of it; a failed
//! write rolls the tracker back.

use std::collections::BTreeMap;

use storyforge_shared::{ClientMessage, EmptyPayload, StoryGenerationRequest};

use crate::infrastructure::messaging::ConnectionStateObserver;
use crate::infrastructure::websocket::{Connection, ConnectionHandlers};
use crate::state::{GenerationState, GenerationTracker};

pub const STORY_START_MESSAGE: &str = "Sending story details...";
pub const SCENE_START_MESSAGE: &str = "Starting scene generation...";

/// Shared plumbing of both generation channels
struct GenerationChannel {
    connection: Connection,
    tracker: GenerationTracker,
}

impl GenerationChannel {
    fn new(connection: Connection, tracker: GenerationTracker, label: &'static str) -> Self {
        let on_message = tracker.clone();
        let on_open = tracker.clone();
        connection.set_handlers(
            ConnectionHandlers::new()
                .on_message(move |text| on_message.handle_frame(text))
                .on_open(move || {
                    tracing::info!(channel = label, "Generation channel connected");
                    on_open.connection_opened();
                })
                .on_close(move |code| {
                    tracing::debug!(channel = label, code, "Generation channel disconnected");
                })
                .on_reconnect_scheduled(move |attempt, delay| {
                    tracing::info!(
                        channel = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Generation channel reconnecting"
                    );
                }),
        );
        Self {
            connection,
            tracker,
        }
    }

    fn connect_to(&self, url: String, enabled: bool, credentials: BTreeMap<String, String>) {
        self.connection.set_credentials(credentials);
        self.connection.configure(Some(url), enabled);
    }

    fn dispatch(&self, message: &ClientMessage, status_message: &str) -> bool {
        if !self.connection.is_transport_open() {
            tracing::info!("No open WebSocket, reconnecting before generation can start");
            self.connection.reconnect();
            return false;
        }
        if !self.tracker.can_begin() {
            tracing::warn!(status = ?self.tracker.state().status, "Generation already finished, reset first");
            return false;
        }
        let previous = self.tracker.state();
        if !self.tracker.begin(status_message) {
            return false;
        }
        if !self.connection.send(message) {
            self.tracker.restore(previous);
            return false;
        }
        true
    }
}

/// World, story and player-character generation (`INITIALIZE_GAME`)
pub struct StoryGenerationService {
    channel: GenerationChannel,
}

impl StoryGenerationService {
    pub fn new(connection: Connection, tracker: GenerationTracker) -> Self {
        Self {
            channel: GenerationChannel::new(connection, tracker, "story"),
        }
    }

    pub fn connect_to(&self, url: String, credentials: BTreeMap<String, String>) {
        self.channel.connect_to(url, true, credentials);
    }

    /// Send the story details. False when not connected (a reconnect is
    /// triggered) or when the previous run has not been reset.
    pub fn generate_story(&self, request: StoryGenerationRequest) -> bool {
        self.channel
            .dispatch(&ClientMessage::InitializeGame(request), STORY_START_MESSAGE)
    }

    pub fn reset(&self) {
        self.channel.tracker.reset();
    }

    pub fn state(&self) -> GenerationState {
        self.channel.tracker.state()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.connection.is_connected()
    }

    pub fn reconnect(&self) {
        self.channel.connection.reconnect();
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.channel.connection.observer()
    }
}

/// Next-scene generation for one story (`START_SCENE_GENERATION`)
pub struct SceneGenerationService {
    channel: GenerationChannel,
}

impl SceneGenerationService {
    pub fn new(connection: Connection, tracker: GenerationTracker) -> Self {
        Self {
            channel: GenerationChannel::new(connection, tracker, "scene"),
        }
    }

    pub fn connect_to(&self, url: String, enabled: bool, credentials: BTreeMap<String, String>) {
        self.channel.connect_to(url, enabled, credentials);
    }

    pub fn start(&self) -> bool {
        self.channel.dispatch(
            &ClientMessage::StartSceneGeneration(EmptyPayload {}),
            SCENE_START_MESSAGE,
        )
    }

    pub fn reset(&self) {
        self.channel.tracker.reset();
    }

    pub fn state(&self) -> GenerationState {
        self.channel.tracker.state()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.connection.is_connected()
    }

    pub fn reconnect(&self) {
        self.channel.connection.reconnect();
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.channel.connection.observer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::messaging::ConnectionState;
    use crate::infrastructure::testing::InMemoryConnector;
    use crate::infrastructure::websocket::{
        create_connection, Connector, EventSink, ReconnectConfig, Transport, TransportError,
        TransportEvent,
    };
    use crate::state::{keys, GenerationStatus, QueryCache};
    use std::sync::Arc;
    use std::time::Duration;
    use storyforge_shared::{PlayerCharacterDraft, WorldSettings};

    /// Opens immediately; answers the start request with a status frame and
    /// stalls the writer so the frame is folded before `send` returns.
    struct EagerServer;

    struct EagerTransport {
        sink: EventSink,
    }

    impl Transport for EagerTransport {
        fn ready_state(&self) -> ConnectionState {
            ConnectionState::Open
        }

        fn send_text(&self, text: String) -> Result<(), TransportError> {
            if text.contains("START_SCENE_GENERATION") {
                self.sink.emit(TransportEvent::Message(
                    r#"{"type":"STATUS_UPDATE","payload":{"message":"Creating location..."}}"#.into(),
                ));
                std::thread::sleep(Duration::from_millis(100));
            }
            Ok(())
        }

        fn close(&self, _code: u16, _reason: &str) {}
    }

    impl Connector for EagerServer {
        fn open(&self, _url: &str, sink: EventSink) -> Result<Arc<dyn Transport>, TransportError> {
            sink.emit(TransportEvent::Opened);
            Ok(Arc::new(EagerTransport { sink }))
        }
    }

    const SCENE_URL: &str = "ws://localhost:8000/api/game/ws/stories/st1/scene";
    const STORY_URL: &str = "ws://localhost:8000/ws/game";

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn scene_service(connector: &InMemoryConnector, cache: &QueryCache) -> SceneGenerationService {
        let connection = create_connection(Arc::new(connector.clone()), ReconnectConfig::default());
        SceneGenerationService::new(
            connection,
            GenerationTracker::new(cache.clone(), keys::scene_generation("st1")),
        )
    }

    fn story_request() -> StoryGenerationRequest {
        StoryGenerationRequest {
            world: WorldSettings {
                theme: "mystery".into(),
                genre: "noir".into(),
                year: 1947,
                setting: "Harbour town".into(),
            },
            player_character: PlayerCharacterDraft {
                name: "Vera".into(),
                age: 34,
                appearance: "Grey coat".into(),
                background: "Ex-detective".into(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_connection_reconnects_and_keeps_state() {
        let connector = InMemoryConnector::new();
        let cache = QueryCache::new();
        let service = scene_service(&connector, &cache);
        service.connect_to(SCENE_URL.into(), true, BTreeMap::new());
        settle().await;
        connector.drop_with(0, 1000);
        settle().await;

        assert!(!service.start());
        assert_eq!(service.state().status, GenerationStatus::Idle);

        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sends_request_and_tracks_progress() {
        let connector = InMemoryConnector::new();
        let cache = QueryCache::new();
        let service = scene_service(&connector, &cache);
        service.connect_to(SCENE_URL.into(), true, BTreeMap::new());
        settle().await;
        connector.accept(0);
        settle().await;
        assert_eq!(service.state().status, GenerationStatus::Connecting);

        assert!(service.start());
        assert_eq!(
            connector.transport(0).unwrap().sent(),
            vec![r#"{"type":"START_SCENE_GENERATION","payload":{}}"#]
        );
        let state = service.state();
        assert_eq!(state.status, GenerationStatus::Generating);
        assert_eq!(state.status_message, SCENE_START_MESSAGE);

        connector.push(0, r#"{"type":"CHARACTER_ADDED","payload":{"name":"Mara"}}"#);
        connector.push(
            0,
            r#"{"type":"SCENE_COMPLETE","payload":{"description":"Dawn","characters":[{"name":"Jun"}]}}"#,
        );
        settle().await;

        let state = service.state();
        assert_eq!(state.status, GenerationStatus::Complete);
        assert_eq!(state.characters.len(), 1);
        assert_eq!(state.characters[0].name, "Jun");
        assert!(!service.start());

        service.reset();
        assert_eq!(service.state(), GenerationState::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_progress_folded_during_send_is_kept() {
        let cache = QueryCache::new();
        let connection = create_connection(Arc::new(EagerServer), ReconnectConfig::default());
        let service = SceneGenerationService::new(
            connection,
            GenerationTracker::new(cache, keys::scene_generation("st1")),
        );
        service.connect_to(SCENE_URL.into(), true, BTreeMap::new());
        tokio::time::timeout(Duration::from_secs(5), async {
            while !service.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection did not open");

        assert!(service.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = service.state();
        assert_eq!(state.status, GenerationStatus::Generating);
        assert_eq!(state.status_message, "Creating location...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_rolls_back_generating() {
        let connector = InMemoryConnector::new();
        let cache = QueryCache::new();
        let service = scene_service(&connector, &cache);
        service.connect_to(SCENE_URL.into(), true, BTreeMap::new());
        settle().await;
        connector.accept(0);
        settle().await;
        connector.transport(0).unwrap().fail_sends();

        assert!(!service.start());
        let state = service.state();
        assert_eq!(state.status, GenerationStatus::Connecting);
        assert_eq!(state.status_message, crate::state::generation::READY_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_story_sends_initialize_game() {
        let connector = InMemoryConnector::new();
        let cache = QueryCache::new();
        let connection = create_connection(Arc::new(connector.clone()), ReconnectConfig::default());
        let service = StoryGenerationService::new(
            connection,
            GenerationTracker::new(cache.clone(), keys::story_generation()),
        );
        service.connect_to(
            STORY_URL.into(),
            BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
        );
        settle().await;
        connector.accept(0);
        settle().await;

        assert!(service.generate_story(story_request()));
        let sent = connector.transport(0).unwrap().sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("AUTHENTICATE"));
        let frame: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(frame["type"], "INITIALIZE_GAME");
        assert_eq!(frame["payload"]["playerCharacter"]["name"], "Vera");
        assert_eq!(service.state().status_message, STORY_START_MESSAGE);

        connector.push(0, r#"{"type":"ERROR","payload":{"message":"quota exceeded"}}"#);
        settle().await;
        let state = service.state();
        assert_eq!(state.status, GenerationStatus::Error);
        assert_eq!(state.error.as_deref(), Some("quota exceeded"));
    }
}
