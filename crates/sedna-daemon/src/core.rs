/// RadioCore: single-owner event loop for all mutable session state.
///
/// Every input (socket and HTTP commands, player notifications, completed
/// network requests, heartbeat ticks) arrives as a `DaemonEvent` on one mpsc
/// channel.  RadioCore owns the `SessionState` exclusively; after each event
/// that changes it, a fresh snapshot is published through the
/// `StateManager` and `BroadcastMessage::StateUpdated` goes out to listeners.
///
/// Network calls never block the loop.  They run in spawned tasks that post
/// their result back as an event carrying the `Ticket` they were issued.
/// Results whose ticket is no longer current are dropped.
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sedna_core::api::artwork::fetch_artwork;
use sedna_core::api::daily_fact::{cache_key, fetch_daily_fact, DailyFact};
use sedna_core::api::recommend::{RecommendClient, Recommendation};
use sedna_core::catalog::{
    fetch_catalog_list, load_catalog_from_list, load_catalog_from_toml, Catalog,
};
use sedna_core::channels::ChannelFilter;
use sedna_core::config::Config;
use sedna_core::generation::{Generation, Ticket};
use sedna_core::mood::{Mood, MoodMemory};
use sedna_core::player::{PlayerAdapter, PlayerEvent};
use sedna_core::protocol::{Command, Severity};
use sedna_core::session::{PlayDecision, SessionState};
use sedna_core::state::StateManager;
use sedna_core::store::SessionStore;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::BroadcastMessage;

const DAILY_FACT_UNAVAILABLE: &str = "Unable to load today's fact. Please try again later.";

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the RadioCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from a socket client or the HTTP API.
    ClientCommand(Command),
    /// Notification from the player.
    Player(PlayerEvent),
    RecommendationReady {
        ticket: Ticket,
        mood: Mood,
        result: sedna_core::Result<Recommendation>,
    },
    ArtworkReady {
        ticket: Ticket,
        track: String,
        artwork: Option<String>,
    },
    DailyFactReady {
        ticket: Ticket,
        key: String,
        result: Result<DailyFact, String>,
    },
    DailyFactArtworkReady {
        ticket: Ticket,
        artwork: Option<String>,
    },
    /// Housekeeping: hourly daily-fact refresh.
    HeartbeatTick,
    /// Shutdown requested.
    Shutdown,
}

// ── RadioCore ─────────────────────────────────────────────────────────────────

pub struct RadioCore {
    config: Config,
    session: SessionState,
    state_manager: Arc<StateManager>,
    player: Arc<dyn PlayerAdapter>,
    memory: MoodMemory,
    recommender: RecommendClient,
    client: reqwest::Client,
    mood_requests: Generation,
    artwork_requests: Generation,
    fact_requests: Generation,
    fact_artwork_requests: Generation,
    /// Cache key of the last daily-fact load that was started.
    fact_key: Option<String>,
    rng: StdRng,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl RadioCore {
    pub fn new(
        config: Config,
        catalog: Catalog,
        player: Arc<dyn PlayerAdapter>,
        store: Arc<dyn SessionStore>,
        client: reqwest::Client,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        let filter = ChannelFilter::new(catalog, config.channels.clone());
        filter.validate_counts();
        let session = SessionState::new(filter);
        let state_manager = Arc::new(StateManager::new(&session));
        let recommender = RecommendClient::new(client.clone(), config.api.recommend_url.clone());

        Self {
            config,
            session,
            state_manager,
            player,
            memory: MoodMemory::new(store),
            recommender,
            client,
            mood_requests: Generation::new(),
            artwork_requests: Generation::new(),
            fact_requests: Generation::new(),
            fact_artwork_requests: Generation::new(),
            fact_key: None,
            rng: StdRng::from_entropy(),
            event_tx,
            broadcast_tx,
        }
    }

    /// Replace the random source (tests).
    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Borrow the state manager (for the socket and HTTP servers).
    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("RadioCore: starting event loop");

        let heartbeat_tx = self.event_tx.clone();
        let period = tokio::time::Duration::from_secs(self.config.daemon.heartbeat_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if heartbeat_tx.send(DaemonEvent::HeartbeatTick).await.is_err() {
                    break;
                }
            }
        });

        let mut player_rx = self.player.subscribe();
        let player_tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                match player_rx.recv().await {
                    Ok(evt) => {
                        if player_tx.send(DaemonEvent::Player(evt)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("RadioCore: dropped {} player events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.start_daily_fact_load();
        if self.config.player.autoplay {
            self.handle_command(Command::TogglePause).await;
        }

        while let Some(evt) = event_rx.recv().await {
            if !self.handle_event(evt).await {
                break;
            }
        }

        info!("RadioCore: stopping player");
        self.player.shutdown().await;
        Ok(())
    }

    /// Apply one event.  Returns false when the loop should stop.
    pub async fn handle_event(&mut self, evt: DaemonEvent) -> bool {
        match evt {
            DaemonEvent::Shutdown => {
                info!("RadioCore: shutdown requested");
                return false;
            }
            DaemonEvent::ClientCommand(cmd) => {
                info!("RadioCore: command {:?}", cmd);
                self.handle_command(cmd).await;
            }
            DaemonEvent::Player(evt) => self.handle_player_event(evt).await,
            DaemonEvent::RecommendationReady {
                ticket,
                mood,
                result,
            } => self.on_recommendation(ticket, mood, result).await,
            DaemonEvent::ArtworkReady {
                ticket,
                track,
                artwork,
            } => {
                if !self.artwork_requests.is_current(ticket) {
                    debug!("RadioCore: stale artwork for {}", track);
                    return true;
                }
                if let Some(artwork) = artwork {
                    self.session.set_track_artwork(&track, artwork);
                    self.publish().await;
                }
            }
            DaemonEvent::DailyFactReady {
                ticket,
                key,
                result,
            } => self.on_daily_fact(ticket, key, result).await,
            DaemonEvent::DailyFactArtworkReady { ticket, artwork } => {
                if self.fact_artwork_requests.is_current(ticket) {
                    self.session.set_daily_fact_artwork(artwork);
                    self.publish().await;
                }
            }
            DaemonEvent::HeartbeatTick => {
                let key = cache_key(Utc::now());
                if self.fact_key.as_deref() != Some(key.as_str()) {
                    debug!("RadioCore: daily fact key changed to {}", key);
                    self.start_daily_fact_load();
                }
            }
        }
        true
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        let result = match cmd {
            Command::TogglePause => self.toggle_pause().await,
            Command::Next => {
                let picked = self.session.next_track(&mut self.rng);
                self.play_pick(picked).await
            }
            Command::Previous => {
                let picked = self.session.previous_track();
                self.play_pick(picked).await
            }
            Command::Random => {
                let picked = self.session.random_track(&mut self.rng);
                self.play_pick(picked).await
            }
            Command::SelectChannel { channel } => {
                let picked = self.session.toggle_channel(channel, &mut self.rng);
                self.play_pick(picked).await
            }
            Command::PlayUrl { url } => {
                let url = self.session.play_url(&url);
                self.play_pick(Ok(url)).await
            }
            Command::Mood { mood } => {
                self.start_mood(mood).await;
                Ok(())
            }
            Command::MoodNext => {
                match self.session.current_mood() {
                    Some(mood) => self.start_mood(mood).await,
                    None => self.notice("Select a mood first", Severity::Info),
                }
                Ok(())
            }
            Command::DailyFactToggle => self.toggle_daily_fact().await,
            Command::GetState => Ok(()),
            Command::ValidateChannels => {
                let counts = self.session.filter().validate_counts();
                let severity = if counts.valid {
                    Severity::Info
                } else {
                    Severity::Warning
                };
                self.notice(
                    format!(
                        "Channels cover {} of {} episodes",
                        counts.sum, counts.total
                    ),
                    severity,
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("RadioCore: player error: {:#}", e);
            self.notice("Playback failed", Severity::Error);
        }
        self.publish().await;
    }

    /// Load a selection outcome, or surface its error as a notice.
    async fn play_pick(&mut self, picked: sedna_core::Result<String>) -> anyhow::Result<()> {
        match picked {
            Ok(url) => {
                self.mood_requests.cancel();
                self.load(&url).await
            }
            Err(e) => {
                warn!("RadioCore: {}", e);
                self.notice(e.notice(), Severity::Warning);
                Ok(())
            }
        }
    }

    async fn load(&mut self, url: &str) -> anyhow::Result<()> {
        self.player.load(url, true).await?;
        self.start_artwork_lookup(url.to_string());
        Ok(())
    }

    async fn toggle_pause(&mut self) -> anyhow::Result<()> {
        if self.session.current_track().is_some() {
            match self.player.is_paused().await {
                Ok(paused) => self.session.sync_paused(paused),
                Err(e) => debug!("RadioCore: is_paused failed: {}", e),
            }
        }
        let decision = self.session.toggle_play_pause(&mut self.rng);
        match decision {
            Ok(decision) => {
                if matches!(decision, PlayDecision::Start(_)) {
                    self.mood_requests.cancel();
                }
                self.apply_decision(decision).await
            }
            Err(e) => {
                self.notice(e.notice(), Severity::Warning);
                Ok(())
            }
        }
    }

    async fn toggle_daily_fact(&mut self) -> anyhow::Result<()> {
        match self.session.toggle_daily_fact() {
            Some(decision) => self.apply_decision(decision).await,
            None => {
                self.notice(DAILY_FACT_UNAVAILABLE, Severity::Warning);
                self.start_daily_fact_load();
                Ok(())
            }
        }
    }

    async fn apply_decision(&mut self, decision: PlayDecision) -> anyhow::Result<()> {
        match decision {
            PlayDecision::Start(url) => self.load(&url).await,
            PlayDecision::Resume => self.player.play().await,
            PlayDecision::Pause => self.player.pause().await,
        }
    }

    // ── mood ──────────────────────────────────────────────────────────────────

    async fn start_mood(&mut self, mood: Mood) {
        if self.session.is_playing() {
            if let Err(e) = self.player.pause().await {
                debug!("RadioCore: pause before mood request failed: {}", e);
            }
        }
        self.session.begin_mood(mood);

        let ticket = self.mood_requests.issue();
        let exclude = self.memory.excluded_for(mood);
        let recommender = self.recommender.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = recommender.recommend(mood, &exclude).await;
            let _ = tx
                .send(DaemonEvent::RecommendationReady {
                    ticket,
                    mood,
                    result,
                })
                .await;
        });
    }

    async fn on_recommendation(
        &mut self,
        ticket: Ticket,
        mood: Mood,
        result: sedna_core::Result<Recommendation>,
    ) {
        if !self.mood_requests.is_current(ticket) {
            debug!(
                "RadioCore: discarding stale recommendation #{} for {}",
                ticket.value(),
                mood
            );
            return;
        }

        match result {
            Ok(rec) => {
                self.memory.apply_recommendation(mood, &rec);
                let url = self.session.apply_mood(&rec);
                if let Err(e) = self.load(&url).await {
                    error!("RadioCore: failed to load mood episode: {:#}", e);
                    self.notice("Playback failed", Severity::Error);
                }
            }
            Err(e) => {
                warn!("RadioCore: mood {} failed: {}", mood, e);
                self.session.mood_failed(&e);
                self.notice(e.notice(), Severity::Error);
            }
        }
        self.publish().await;
    }

    // ── artwork / daily fact ──────────────────────────────────────────────────

    fn start_artwork_lookup(&self, track: String) {
        let ticket = self.artwork_requests.issue();
        let client = self.client.clone();
        let oembed_url = self.config.api.oembed_url.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let artwork = lookup_artwork(&client, &oembed_url, &track).await;
            let _ = tx
                .send(DaemonEvent::ArtworkReady {
                    ticket,
                    track,
                    artwork,
                })
                .await;
        });
    }

    fn start_daily_fact_load(&mut self) {
        let now = Utc::now();
        let key = cache_key(now);
        self.fact_key = Some(key.clone());

        let ticket = self.fact_requests.issue();
        let client = self.client.clone();
        let source = self.config.api.daily_fact_source.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = fetch_daily_fact(&client, &source, now)
                .await
                .map_err(|e| format!("{:#}", e));
            let _ = tx
                .send(DaemonEvent::DailyFactReady {
                    ticket,
                    key,
                    result,
                })
                .await;
        });
    }

    async fn on_daily_fact(&mut self, ticket: Ticket, key: String, result: Result<DailyFact, String>) {
        if !self.fact_requests.is_current(ticket) {
            debug!("RadioCore: discarding stale daily fact {}", key);
            return;
        }

        match result {
            Ok(fact) => {
                info!(
                    "RadioCore: daily fact {} loaded: {:?}",
                    key,
                    fact.fact_text.as_deref().map(|t| t.chars().take(50).collect::<String>())
                );
                let track = fact
                    .episode
                    .as_ref()
                    .and_then(|e| e.soundcloud_url.clone());
                self.session.set_daily_fact(fact);
                if let Some(track) = track {
                    let ticket = self.fact_artwork_requests.issue();
                    let client = self.client.clone();
                    let oembed_url = self.config.api.oembed_url.clone();
                    let tx = self.event_tx.clone();
                    tokio::spawn(async move {
                        let artwork = lookup_artwork(&client, &oembed_url, &track).await;
                        let _ = tx
                            .send(DaemonEvent::DailyFactArtworkReady { ticket, artwork })
                            .await;
                    });
                }
            }
            Err(e) => {
                warn!("RadioCore: failed to load daily match: {}", e);
                self.session.daily_fact_failed(DAILY_FACT_UNAVAILABLE);
                self.notice(DAILY_FACT_UNAVAILABLE, Severity::Warning);
            }
        }
        self.publish().await;
    }

    // ── player ────────────────────────────────────────────────────────────────

    async fn handle_player_event(&mut self, evt: PlayerEvent) {
        let refresh = self.session.on_player_event(&evt);
        if refresh {
            match self.player.current_sound().await {
                Ok(Some(sound)) => self.session.set_sound_info(sound),
                Ok(None) => {}
                Err(e) => debug!("RadioCore: current_sound failed: {}", e),
            }
        }
        self.publish().await;
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn publish(&self) {
        self.state_manager.publish(&self.session).await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    fn notice(&self, message: impl Into<String>, severity: Severity) {
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice {
            message: message.into(),
            severity,
        });
    }
}

async fn lookup_artwork(client: &reqwest::Client, oembed_url: &str, track: &str) -> Option<String> {
    match fetch_artwork(client, oembed_url, track).await {
        Ok(artwork) => artwork,
        Err(e) => {
            warn!("RadioCore: artwork lookup for {} failed: {:#}", track, e);
            None
        }
    }
}

// ── catalog loader ────────────────────────────────────────────────────────────

pub async fn load_catalog(config: &Config, client: &reqwest::Client) -> anyhow::Result<Catalog> {
    use std::path::PathBuf;

    // 1. Configured episodes.toml
    let toml_path = &config.catalog.episodes_toml;
    if toml_path.exists() {
        match load_catalog_from_toml(toml_path) {
            Ok(c) => {
                info!(
                    "Loaded {} episodes from TOML: {}",
                    c.len(),
                    toml_path.display()
                );
                return Ok(c);
            }
            Err(e) => warn!("Failed to parse episodes TOML: {}", e),
        }
    }

    // 2. episodes.toml next to the binary
    if let Some(exe_toml) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("episodes.toml")))
    {
        if exe_toml.exists() {
            match load_catalog_from_toml(&exe_toml) {
                Ok(c) => {
                    info!(
                        "Loaded {} episodes from exe dir: {}",
                        c.len(),
                        exe_toml.display()
                    );
                    return Ok(c);
                }
                Err(e) => warn!("Failed to parse exe-dir episodes.toml: {}", e),
            }
        }
    }

    // 3. episodes.toml in working directory
    let local_toml = PathBuf::from("episodes.toml");
    if local_toml.exists() {
        match load_catalog_from_toml(&local_toml) {
            Ok(c) => {
                info!("Loaded {} episodes from local episodes.toml", c.len());
                return Ok(c);
            }
            Err(e) => warn!("Failed to parse local episodes.toml: {}", e),
        }
    }

    // 4. Plain / m3u list, URL or file
    if let Some(source) = &config.catalog.list_source {
        info!("Loading episodes from list: {}", source);
        if source.starts_with("http://") || source.starts_with("https://") {
            match fetch_catalog_list(client, source).await {
                Ok(c) => {
                    info!("Loaded {} episodes from URL", c.len());
                    return Ok(c);
                }
                Err(e) => warn!("Failed to fetch episode list: {}", e),
            }
        } else {
            match load_catalog_from_list(std::path::Path::new(source)) {
                Ok(c) => {
                    info!("Loaded {} episodes from list file", c.len());
                    return Ok(c);
                }
                Err(e) => warn!("Failed to read episode list: {}", e),
            }
        }
    }

    info!("No episode source available, starting with empty catalog");
    Ok(Catalog::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sedna_core::api::recommend::RecommendedEpisode;
    use sedna_core::channels::default_channels;
    use sedna_core::player::SoundInfo;
    use sedna_core::protocol::PlaybackSource;
    use sedna_core::store::MemoryStore;
    use sedna_core::SednaError;
    use std::sync::Mutex;

    /// Records calls; never produces events on its own.
    struct FakePlayer {
        calls: Mutex<Vec<String>>,
        paused: Mutex<bool>,
        events: broadcast::Sender<PlayerEvent>,
    }

    impl FakePlayer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                paused: Mutex::new(true),
                events: broadcast::channel(8).0,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl PlayerAdapter for FakePlayer {
        async fn load(&self, url: &str, autoplay: bool) -> anyhow::Result<()> {
            self.record(format!("load {} {}", url, autoplay));
            *self.paused.lock().unwrap() = !autoplay;
            Ok(())
        }
        async fn play(&self) -> anyhow::Result<()> {
            self.record("play".into());
            *self.paused.lock().unwrap() = false;
            Ok(())
        }
        async fn pause(&self) -> anyhow::Result<()> {
            self.record("pause".into());
            *self.paused.lock().unwrap() = true;
            Ok(())
        }
        async fn is_paused(&self) -> anyhow::Result<bool> {
            Ok(*self.paused.lock().unwrap())
        }
        async fn current_sound(&self) -> anyhow::Result<Option<SoundInfo>> {
            Ok(Some(SoundInfo {
                title: Some("From player".into()),
                artwork_url: None,
                permalink_url: None,
            }))
        }
        fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
            self.events.subscribe()
        }
    }

    struct Harness {
        core: RadioCore,
        player: Arc<FakePlayer>,
        store: Arc<MemoryStore>,
        event_rx: mpsc::Receiver<DaemonEvent>,
        broadcast_rx: broadcast::Receiver<BroadcastMessage>,
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        // Nothing listens here; lookups fail fast and are logged.
        config.api.oembed_url = "http://127.0.0.1:9/oembed".into();
        config.api.recommend_url = "http://127.0.0.1:9/api/recommend".into();
        let catalog = Catalog::from_urls([
            "https://soundcloud.com/sednafm/sets/morning-drops/morning-drops-1",
            "https://soundcloud.com/sednafm/sedna-fm-episode-1",
            "https://soundcloud.com/sednafm/sedna-fm-episode-2",
        ]);
        config.channels = default_channels();
        let player = Arc::new(FakePlayer::new());
        let store = Arc::new(MemoryStore::new());
        let (broadcast_tx, broadcast_rx) = broadcast::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let core = RadioCore::new(
            config,
            catalog,
            player.clone(),
            store.clone(),
            reqwest::Client::new(),
            broadcast_tx,
            event_tx,
        )
        .with_rng(StdRng::seed_from_u64(5));
        Harness {
            core,
            player,
            store,
            event_rx,
            broadcast_rx,
        }
    }

    fn notices(rx: &mut broadcast::Receiver<BroadcastMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let BroadcastMessage::Notice { message, .. } = msg {
                out.push(message);
            }
        }
        out
    }

    fn recommendation(id: u64) -> Recommendation {
        Recommendation {
            episode: RecommendedEpisode {
                id,
                title: format!("Mood {}", id),
                description: String::new(),
                soundcloud_url: format!("https://soundcloud.com/sednafm/mood-{}", id),
            },
            reason: "fits".into(),
            memory_reset: false,
        }
    }

    #[tokio::test]
    async fn test_toggle_pause_starts_random_episode() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::TogglePause))
            .await;
        let calls = h.player.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("load https://soundcloud.com/sednafm/"));

        h.core.handle_event(DaemonEvent::Player(PlayerEvent::Play)).await;
        let state = h.core.state_manager().get_state().await;
        assert!(state.is_playing);
        assert_eq!(state.now_playing.title.as_deref(), Some("From player"));

        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::TogglePause))
            .await;
        assert_eq!(h.player.calls().last().map(String::as_str), Some("pause"));
    }

    #[tokio::test]
    async fn test_toggle_pause_asks_the_player() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::TogglePause))
            .await;
        // No Play notification yet, but the player is already running.
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::TogglePause))
            .await;
        assert_eq!(h.player.calls().last().map(String::as_str), Some("pause"));

        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::TogglePause))
            .await;
        assert_eq!(h.player.calls().last().map(String::as_str), Some("play"));
    }

    #[tokio::test]
    async fn test_radio_command_supersedes_pending_mood() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Mood { mood: Mood::Calm }))
            .await;
        let ticket = loop {
            match h.event_rx.recv().await {
                Some(DaemonEvent::RecommendationReady { ticket, .. }) => break ticket,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        };
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Next))
            .await;
        let radio_track = h.core.state_manager().get_state().await.current_track;
        assert!(!h.core.state_manager().get_state().await.mood.loading);

        h.core
            .handle_event(DaemonEvent::RecommendationReady {
                ticket,
                mood: Mood::Calm,
                result: Ok(recommendation(1)),
            })
            .await;
        assert_eq!(h.player.calls().len(), 1);
        assert!(h.core.memory.excluded_for(Mood::Calm).is_empty());
        let state = h.core.state_manager().get_state().await;
        assert_eq!(state.current_track, radio_track);
        assert_eq!(state.source, PlaybackSource::Radio);
    }

    #[tokio::test]
    async fn test_previous_without_history_is_a_notice() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Previous))
            .await;
        assert!(h.player.calls().is_empty());
        assert_eq!(notices(&mut h.broadcast_rx), vec!["No previous track"]);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_a_notice() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::SelectChannel {
                channel: 42,
            }))
            .await;
        assert!(h.player.calls().is_empty());
        assert_eq!(
            notices(&mut h.broadcast_rx),
            vec!["Channel 42 does not exist"]
        );
    }

    #[tokio::test]
    async fn test_channel_select_and_next() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::SelectChannel {
                channel: 1,
            }))
            .await;
        let state = h.core.state_manager().get_state().await;
        assert_eq!(state.active_channel, Some(1));
        assert_eq!(
            state.current_track.as_deref(),
            Some("https://soundcloud.com/sednafm/sets/morning-drops/morning-drops-1")
        );

        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Next))
            .await;
        let state = h.core.state_manager().get_state().await;
        // single-episode channel: exhausted pool falls back to its only track
        assert_eq!(
            state.current_track.as_deref(),
            Some("https://soundcloud.com/sednafm/sets/morning-drops/morning-drops-1")
        );
        assert_eq!(state.history_len, 2);
    }

    #[tokio::test]
    async fn test_stale_recommendation_is_dropped() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Mood { mood: Mood::Calm }))
            .await;
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Mood { mood: Mood::Sad }))
            .await;

        // Both requests fail against the closed port; drain and re-inject the
        // first result with a forged success to prove only the newest ticket
        // is honoured.
        let mut tickets = Vec::new();
        while tickets.len() < 2 {
            match h.event_rx.recv().await {
                Some(DaemonEvent::RecommendationReady { ticket, mood, .. }) => {
                    tickets.push((ticket, mood))
                }
                Some(_) => {}
                None => break,
            }
        }
        let (old_ticket, old_mood) = tickets
            .iter()
            .copied()
            .find(|(_, m)| *m == Mood::Calm)
            .unwrap();
        h.core
            .handle_event(DaemonEvent::RecommendationReady {
                ticket: old_ticket,
                mood: old_mood,
                result: Ok(recommendation(1)),
            })
            .await;
        assert!(h.player.calls().is_empty());
        assert!(h.core.memory.excluded_for(Mood::Calm).is_empty());

        let (new_ticket, _) = tickets
            .iter()
            .copied()
            .find(|(_, m)| *m == Mood::Sad)
            .unwrap();
        h.core
            .handle_event(DaemonEvent::RecommendationReady {
                ticket: new_ticket,
                mood: Mood::Sad,
                result: Ok(recommendation(2)),
            })
            .await;
        assert_eq!(
            h.player.calls(),
            vec!["load https://soundcloud.com/sednafm/mood-2 true"]
        );
        assert_eq!(h.core.memory.excluded_for(Mood::Sad), vec![2]);
        assert!(h.store.get(sedna_core::mood::MOOD_MEMORY_KEY).unwrap().is_some());
        let state = h.core.state_manager().get_state().await;
        assert_eq!(state.source, PlaybackSource::Mood);
    }

    #[tokio::test]
    async fn test_failed_recommendation_sets_error() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::Mood {
                mood: Mood::Happy,
            }))
            .await;
        let ticket = loop {
            match h.event_rx.recv().await {
                Some(DaemonEvent::RecommendationReady { ticket, .. }) => break ticket,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        };
        h.core
            .handle_event(DaemonEvent::RecommendationReady {
                ticket,
                mood: Mood::Happy,
                result: Err(SednaError::RecommendationFailed("API error: 500".into())),
            })
            .await;
        let state = h.core.state_manager().get_state().await;
        assert!(!state.mood.loading);
        assert!(state.mood.error.is_some());
    }

    #[tokio::test]
    async fn test_mood_next_without_mood_is_a_notice() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::MoodNext))
            .await;
        assert_eq!(notices(&mut h.broadcast_rx), vec!["Select a mood first"]);
    }

    #[tokio::test]
    async fn test_daily_fact_toggle_without_fact() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::DailyFactToggle))
            .await;
        assert!(h.player.calls().is_empty());
        assert_eq!(notices(&mut h.broadcast_rx), vec![DAILY_FACT_UNAVAILABLE]);
    }

    #[tokio::test]
    async fn test_stale_artwork_is_dropped() {
        let mut h = harness();
        h.core
            .handle_event(DaemonEvent::ClientCommand(Command::PlayUrl {
                url: "https://soundcloud.com/sednafm/a".into(),
            }))
            .await;
        let first = h.core.artwork_requests.issue();
        let _second = h.core.artwork_requests.issue();
        h.core
            .handle_event(DaemonEvent::ArtworkReady {
                ticket: first,
                track: "https://soundcloud.com/sednafm/a".into(),
                artwork: Some("https://img/a.jpg".into()),
            })
            .await;
        let state = h.core.state_manager().get_state().await;
        assert_eq!(state.now_playing.artwork_url, None);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let mut h = harness();
        assert!(!h.core.handle_event(DaemonEvent::Shutdown).await);
    }
}
