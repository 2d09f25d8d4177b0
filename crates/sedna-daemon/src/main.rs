mod core;
mod http;
mod mpv;
mod socket;

use sedna_core::api::build_client;
use sedna_core::config::Config;
use sedna_core::player::PlayerAdapter;
use sedna_core::protocol::Severity;
use sedna_core::store::{FileStore, SessionStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    /// Transient user-facing message.
    Notice { message: String, severity: Severity },
    /// Forwarded WARN log line.
    Log(String),
    /// Forwarded ERROR log line.
    Error(String),
}

/// A custom tracing layer that forwards log messages to the broadcast channel
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Only WARN and ERROR reach clients
        let level = *event.metadata().level();
        if !matches!(level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = String::new();
        let now = chrono::Local::now();
        message.push_str(&format!("{} ", now.format("%H:%M:%S")));
        message.push_str(&format!("[{}] ", level));

        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is fine
        let msg = if level == tracing::Level::ERROR {
            BroadcastMessage::Error(message)
        } else {
            BroadcastMessage::Log(message)
        };
        let _ = self.sender.send(msg);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup broadcast channel first so we can use it for logging
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let config = Config::load()?;

    // Setup file logging + broadcast layer
    let log_path = config.daemon.log_file.clone();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let broadcast_layer = BroadcastLayer::new(broadcast_tx.clone());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(broadcast_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sedna_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);
    info!("Config loaded from: {:?}", Config::config_path());

    let client = build_client(&config.api)?;
    let catalog = core::load_catalog(&config, &client).await?;

    // Session memory lives only as long as this process
    let store = Arc::new(FileStore::new(config.session.store_file.clone()));
    if let Err(e) = store.clear() {
        warn!("Failed to clear stale session store: {}", e);
    }

    let player: Arc<dyn PlayerAdapter> = Arc::new(mpv::MpvPlayer::new(config.player.default_volume));

    // All external inputs funnel into RadioCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);

    let radio_core = core::RadioCore::new(
        config.clone(),
        catalog,
        player,
        store.clone() as Arc<dyn SessionStore>,
        client,
        broadcast_tx.clone(),
        event_tx.clone(),
    );

    let state_manager = radio_core.state_manager();
    let shutdown = CancellationToken::new();

    // Client list for socket server shutdown detection
    let clients = Arc::new(tokio::sync::RwLock::new(Vec::<socket::ClientHandle>::new()));

    let _socket_handle = socket::start_server(
        config.http.bind_address.clone(),
        sedna_core::platform::DAEMON_TCP_PORT,
        state_manager.clone(),
        clients.clone(),
        event_tx.clone(),
        broadcast_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager.clone(),
            event_tx.clone(),
            shutdown.clone(),
        );
    }

    // Ctrl-C ends the session
    let signal_tx = event_tx.clone();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Ctrl-C received");
                let _ = signal_tx.send(core::DaemonEvent::Shutdown).await;
            }
            _ = signal_token.cancelled() => {}
        }
    });

    info!("Daemon initialised, running event loop");
    let result = radio_core.run(event_rx).await;

    shutdown.cancel();
    if let Err(e) = store.clear() {
        warn!("Failed to clear session store: {}", e);
    }
    info!("Daemon stopped");
    result
}
