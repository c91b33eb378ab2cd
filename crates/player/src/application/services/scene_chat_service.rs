//! Scene chat over a dedicated WebSocket channel
//!
//! Owns one `Connection` per scene + character pair and installs the chat
//! reducer as its message handler. Sending is optimistic: the user message is
//! cached before the frame goes out.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use storyforge_shared::{Analysis, ChatRequest, Message};

use crate::infrastructure::messaging::ConnectionStateObserver;
use crate::infrastructure::websocket::{Connection, ConnectionHandlers};
use crate::state::SceneChatState;

type ConnectionListener = Box<dyn FnMut(bool) + Send>;

pub struct SceneChatService {
    connection: Connection,
    chat: SceneChatState,
}

impl SceneChatService {
    pub fn new(connection: Connection, chat: SceneChatState) -> Self {
        Self::with_listener(connection, chat, None)
    }

    /// Like [`SceneChatService::new`], also reporting connect/disconnect.
    pub fn with_listener(
        connection: Connection,
        chat: SceneChatState,
        listener: Option<ConnectionListener>,
    ) -> Self {
        let reducer = chat.clone();
        let scene_id = chat.scene_id().to_string();
        let listener = Arc::new(Mutex::new(listener));
        let open_listener = Arc::clone(&listener);

        connection.set_handlers(
            ConnectionHandlers::new()
                .on_message(move |text| reducer.handle_frame(text))
                .on_open(move || {
                    tracing::info!(scene_id = %scene_id, "Scene chat connected");
                    notify(&open_listener, true);
                })
                .on_close(move |code| {
                    tracing::debug!(code, "Scene chat disconnected");
                    notify(&listener, false);
                }),
        );

        Self { connection, chat }
    }

    /// Point the channel at `url`; stays disabled without a scene id.
    pub fn connect_to(&self, url: String, credentials: BTreeMap<String, String>) {
        self.connection.set_credentials(credentials);
        let enabled = !self.chat.scene_id().is_empty();
        self.connection.configure(Some(url), enabled);
    }

    /// Append the user's message and send the full history.
    ///
    /// Returns false, without touching the cache, when there is no scene or
    /// no transport at all.
    pub fn send_message(&self, content: &str) -> bool {
        if self.chat.scene_id().is_empty() || !self.connection.has_transport() {
            tracing::warn!("Cannot send chat message, no scene connection");
            return false;
        }

        let messages = self.chat.push_user_message(content);
        let request = ChatRequest {
            scene_id: self.chat.scene_id().to_string(),
            character_id: self.chat.character_id().to_string(),
            messages,
        };
        self.connection.send(&request)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.chat.messages()
    }

    pub fn analysis(&self) -> Analysis {
        self.chat.analysis()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn reconnect(&self) {
        self.connection.reconnect();
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.connection.observer()
    }

    pub fn chat(&self) -> &SceneChatState {
        &self.chat
    }
}

fn notify(listener: &Mutex<Option<ConnectionListener>>, connected: bool) {
    let mut listener = listener.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(listener) = listener.as_mut() {
        listener(connected);
    }
}
