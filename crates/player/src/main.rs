//! Storyforge Player - terminal composition root.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storyforge_player::config::{self, env_keys, ClientConfig};
use storyforge_player::infrastructure::http_client::ApiClient;
use storyforge_player::infrastructure::storage::{auth_headers, InMemoryCredentialStore};
use storyforge_player::infrastructure::websocket::{create_connection, Connection, TungsteniteConnector};
use storyforge_player::infrastructure::ConnectionStateObserver;
use storyforge_player::state::{keys, GenerationState, GenerationTracker, QueryCache, SceneChatState};
use storyforge_player::{QueryService, SceneChatService, SceneGenerationService, StoryGenerationService};
use storyforge_shared::{LoginCredentials, PlayerCharacterDraft, StoryGenerationRequest, WorldSettings};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Storyforge - play generated stories from the terminal
#[derive(Parser, Debug)]
#[command(name = "storyforge", version, about = "Terminal client for the Storyforge story backend")]
struct Cli {
    /// REST base URL (overrides STORYFORGE_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// WebSocket base URL (overrides STORYFORGE_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Environment lookup with command-line flags taking precedence
    fn lookup(&self, key: &str) -> Option<String> {
        let flag = match key {
            env_keys::BACKEND_URL => self.backend_url.clone(),
            env_keys::WS_URL => self.ws_url.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and print the bearer token
    Login(LoginArgs),
    /// List stories
    Stories,
    /// Chat with a character in a scene (one message per line)
    Chat(ChatArgs),
    /// Generate the next scene of a story
    Scene(SceneArgs),
    /// Generate a new world, story and player character
    Story(StoryArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(short, long)]
    username: String,
    #[arg(short, long, env = "STORYFORGE_PASSWORD")]
    password: String,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long)]
    scene: String,
    #[arg(long)]
    character: String,
}

#[derive(Args, Debug)]
struct SceneArgs {
    #[arg(long)]
    story: String,
}

#[derive(Args, Debug)]
struct StoryArgs {
    #[arg(long)]
    theme: String,
    #[arg(long)]
    genre: String,
    #[arg(long)]
    year: i32,
    #[arg(long)]
    setting: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    age: u32,
    #[arg(long, default_value = "")]
    appearance: String,
    #[arg(long, default_value = "")]
    background: String,
}

/// Everything the subcommands share
struct App {
    config: ClientConfig,
    cache: QueryCache,
    credentials: Arc<InMemoryCredentialStore>,
}

impl App {
    fn new(config: ClientConfig) -> Self {
        let credentials = match &config.auth_token {
            Some(token) => InMemoryCredentialStore::with_token(token.clone()),
            None => InMemoryCredentialStore::new(),
        };
        Self {
            config,
            cache: QueryCache::new(),
            credentials: Arc::new(credentials),
        }
    }

    fn queries(&self) -> QueryService {
        let api = ApiClient::new(self.config.backend_url.as_str(), self.credentials.clone());
        QueryService::new(api, self.cache.clone())
    }

    fn connection(&self) -> Connection {
        create_connection(Arc::new(TungsteniteConnector), self.config.reconnect)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyforge_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    config::load_dotenv();
    let cli = Cli::parse();
    let config =
        ClientConfig::from_lookup(|key| cli.lookup(key)).context("invalid client configuration")?;
    tracing::info!(backend = %config.backend_url, ws = %config.ws_url, "Starting Storyforge Player");

    let app = App::new(config);
    match cli.command {
        Commands::Login(args) => login(&app, args).await,
        Commands::Stories => stories(&app).await,
        Commands::Chat(args) => chat(&app, args).await,
        Commands::Scene(args) => scene(&app, args).await,
        Commands::Story(args) => story(&app, args).await,
    }
}

async fn login(app: &App, args: LoginArgs) -> Result<()> {
    let response = app
        .queries()
        .api()
        .login(&LoginCredentials {
            username: args.username,
            password: args.password,
        })
        .await
        .context("login failed")?;
    eprintln!("Logged in as {}", response.user.username);
    println!("{}", response.token);
    Ok(())
}

async fn stories(app: &App) -> Result<()> {
    let stories = app.queries().stories().await.context("failed to list stories")?;
    for story in stories {
        println!("{}  {}", story.uuid, story.title);
    }
    Ok(())
}

async fn chat(app: &App, args: ChatArgs) -> Result<()> {
    let chat = SceneChatState::new(app.cache.clone(), &args.scene, &args.character);
    match app.queries().scene_messages(&args.scene, &args.character).await {
        Ok(history) => {
            for message in &history {
                println!("{:?}: {}", message.role, message.content);
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not load chat history"),
    }

    let service = SceneChatService::new(app.connection(), chat.clone());
    service.connect_to(
        app.config.scene_chat_url(&args.scene, &args.character),
        auth_headers(app.credentials.as_ref()),
    );
    wait_until_open(&service.observer()).await?;

    let printer = tokio::spawn(print_replies(chat));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !service.send_message(line) {
            eprintln!("Not connected, reconnecting...");
            service.reconnect();
        }
    }
    printer.abort();
    Ok(())
}

/// Stream the growing assistant reply to stdout as chunks arrive.
async fn print_replies(chat: SceneChatState) {
    let key = chat.messages_key();
    let mut changes = chat.cache().subscribe();
    let mut seen = chat.messages().len();
    let mut printed = 0;

    loop {
        match changes.recv().await {
            Ok(changed) if changed == key => {}
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Cache notifications lagged");
            }
            Err(RecvError::Closed) => return,
        }

        let messages = chat.messages();
        let Some(last) = messages.last() else { continue };
        if !last.is_assistant() {
            seen = messages.len();
            printed = 0;
            continue;
        }
        if messages.len() != seen {
            seen = messages.len();
            printed = 0;
            println!();
        }
        if let Some(fresh) = last.content.get(printed..) {
            print!("{fresh}");
            if let Err(e) = std::io::stdout().flush() {
                tracing::debug!(error = %e, "Failed to flush stdout");
            }
            printed = last.content.len();
        }
    }
}

async fn scene(app: &App, args: SceneArgs) -> Result<()> {
    let tracker = GenerationTracker::new(app.cache.clone(), keys::scene_generation(&args.story));
    let service = SceneGenerationService::new(app.connection(), tracker.clone());
    service.connect_to(
        app.config.scene_generation_url(&args.story),
        true,
        auth_headers(app.credentials.as_ref()),
    );
    wait_until_open(&service.observer()).await?;

    if !service.start() {
        bail!("scene generation could not be started");
    }
    let state = follow_generation(&app.cache, &tracker).await;
    report(&state)?;

    if state.error.is_none() {
        if let Ok(scene) = app.queries().latest_scene(&args.story).await {
            println!("Scene {}: {}", scene.id, scene.description);
        }
    }
    Ok(())
}

async fn story(app: &App, args: StoryArgs) -> Result<()> {
    let tracker = GenerationTracker::new(app.cache.clone(), keys::story_generation());
    let service = StoryGenerationService::new(app.connection(), tracker.clone());
    service.connect_to(
        app.config.story_generation_url(),
        auth_headers(app.credentials.as_ref()),
    );
    wait_until_open(&service.observer()).await?;

    let request = StoryGenerationRequest {
        world: WorldSettings {
            theme: args.theme,
            genre: args.genre,
            year: args.year,
            setting: args.setting,
        },
        player_character: PlayerCharacterDraft {
            name: args.name,
            age: args.age,
            appearance: args.appearance,
            background: args.background,
        },
    };
    if !service.generate_story(request) {
        bail!("story generation could not be started");
    }
    let state = follow_generation(&app.cache, &tracker).await;
    report(&state)?;

    if let Some(story) = &state.story {
        println!("Story: {}", story.title);
    }
    Ok(())
}

/// Print status changes until the generation finishes or fails.
async fn follow_generation(cache: &QueryCache, tracker: &GenerationTracker) -> GenerationState {
    let mut changes = cache.subscribe();
    let mut last_message = String::new();
    loop {
        let state = tracker.state();
        if state.status_message != last_message {
            eprintln!("{}", state.status_message);
            last_message = state.status_message.clone();
        }
        if state.status.is_terminal() {
            return state;
        }
        match changes.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return tracker.state(),
        }
    }
}

fn report(state: &GenerationState) -> Result<()> {
    if let Some(error) = &state.error {
        bail!("generation failed: {error}");
    }
    if let Some(location) = &state.last_location {
        println!("Location: {}", location.name);
    }
    for character in &state.characters {
        println!("Character: {}", character.name);
    }
    Ok(())
}

async fn wait_until_open(observer: &ConnectionStateObserver) -> Result<()> {
    let wait = async {
        while !observer.is_connected() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(CONNECT_TIMEOUT, wait)
        .await
        .context("timed out waiting for the WebSocket to open")
}
