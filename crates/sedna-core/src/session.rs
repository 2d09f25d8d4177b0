//! The station's session state.
//!
//! One `SessionState` owns the active channel, play history, the loaded track
//! and what the player last reported about it.  It is a plain synchronous
//! state machine; the caller drives the player with the decisions it returns.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::api::artwork::upgrade_artwork_url;
use crate::api::daily_fact::DailyFact;
use crate::api::recommend::Recommendation;
use crate::channels::{ChannelFilter, ChannelId};
use crate::error::{Result, SednaError};
use crate::history::PlaybackHistory;
use crate::mood::Mood;
use crate::player::{PlayerEvent, SoundInfo};
use crate::protocol::{
    ChannelSummary, DailyFactStatus, MoodStatus, NowPlaying, PlaybackSource, SessionSnapshot,
};
use crate::selector::{select_next, select_previous};

/// What to do with the player after a play/pause toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayDecision {
    /// Nothing loaded yet: load this URL and start it.
    Start(String),
    Resume,
    Pause,
}

pub struct SessionState {
    filter: ChannelFilter,
    summaries: Vec<ChannelSummary>,
    active_channel: Option<ChannelId>,
    history: PlaybackHistory,
    current_track: Option<String>,
    source: PlaybackSource,
    is_playing: bool,
    now_playing: NowPlaying,
    progress: Option<f64>,
    mood: MoodStatus,
    daily_fact: DailyFactStatus,
}

impl SessionState {
    pub fn new(filter: ChannelFilter) -> Self {
        let summaries = filter
            .channels()
            .iter()
            .map(|c| ChannelSummary::new(c, filter.episode_count(c.id)))
            .collect();
        Self {
            filter,
            summaries,
            active_channel: None,
            history: PlaybackHistory::new(),
            current_track: None,
            source: PlaybackSource::Radio,
            is_playing: false,
            now_playing: NowPlaying::default(),
            progress: None,
            mood: MoodStatus::default(),
            daily_fact: DailyFactStatus::default(),
        }
    }

    pub fn filter(&self) -> &ChannelFilter {
        &self.filter
    }

    pub fn active_channel(&self) -> Option<ChannelId> {
        self.active_channel
    }

    pub fn history(&self) -> &PlaybackHistory {
        &self.history
    }

    pub fn current_track(&self) -> Option<&str> {
        self.current_track.as_deref()
    }

    pub fn source(&self) -> PlaybackSource {
        self.source
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current_mood(&self) -> Option<Mood> {
        self.mood.mood
    }

    pub fn daily_fact(&self) -> Option<&DailyFact> {
        self.daily_fact.fact.as_ref()
    }

    // ── radio ───────────────────────────────────────────────────────────────

    /// History-aware pick from the active channel's pool.
    pub fn next_track<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<String> {
        let pool = self.active_pool()?;
        let url = select_next(&mut self.history, &pool, rng).ok_or(SednaError::EmptyCatalog)?;
        self.load_radio(url.clone());
        Ok(url)
    }

    /// Step back in history.  Leaves everything untouched on `NoPrevious`.
    pub fn previous_track(&mut self) -> Result<String> {
        let url = select_previous(&mut self.history)?;
        self.load_radio(url.clone());
        Ok(url)
    }

    /// Uniform pick from the active pool, ignoring what was already played.
    pub fn random_track<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<String> {
        let pool = self.active_pool()?;
        let url = pool.choose(rng).cloned().ok_or(SednaError::EmptyCatalog)?;
        self.history.push(url.clone());
        self.load_radio(url.clone());
        Ok(url)
    }

    /// Channel button.  Selecting the active channel clears it and picks from
    /// the whole catalog; selecting another one makes it active.  Either way
    /// the pick is plain uniform random, not the no-repeat selection `next`
    /// uses.
    pub fn toggle_channel<R: Rng + ?Sized>(&mut self, id: ChannelId, rng: &mut R) -> Result<String> {
        let next = if self.active_channel == Some(id) {
            None
        } else {
            Some(id)
        };
        let pool = self.pool_for(next)?;
        let url = pool.choose(rng).cloned().ok_or(SednaError::EmptyCatalog)?;
        match next {
            Some(id) => info!("session: channel {} selected", id),
            None => info!("session: channel {} deselected", id),
        }
        self.active_channel = next;
        self.history.push(url.clone());
        self.load_radio(url.clone());
        Ok(url)
    }

    /// Load an explicit URL as a radio track.
    pub fn play_url(&mut self, url: &str) -> String {
        self.history.push(url.to_string());
        self.load_radio(url.to_string());
        url.to_string()
    }

    pub fn toggle_play_pause<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<PlayDecision> {
        if self.current_track.is_none() {
            return self.random_track(rng).map(PlayDecision::Start);
        }
        Ok(if self.is_playing {
            PlayDecision::Pause
        } else {
            PlayDecision::Resume
        })
    }

    /// Align the playing flag with what the player reports.
    pub fn sync_paused(&mut self, paused: bool) {
        self.is_playing = !paused;
    }

    fn active_pool(&self) -> Result<Vec<String>> {
        self.pool_for(self.active_channel)
    }

    fn pool_for(&self, channel: Option<ChannelId>) -> Result<Vec<String>> {
        let pool = self.filter.pool(channel)?;
        if pool.is_empty() {
            return Err(SednaError::EmptyCatalog);
        }
        Ok(pool)
    }

    /// Radio load.  The catalog title stands in until the player reports
    /// one; a mood request still in flight is abandoned.
    fn load_radio(&mut self, url: String) {
        let title = self.filter.catalog().title_for(&url).map(str::to_string);
        self.load(url, PlaybackSource::Radio);
        self.now_playing.title = title;
        self.mood.loading = false;
    }

    fn load(&mut self, url: String, source: PlaybackSource) {
        debug!("session: loading {:?} from {:?}", url, source);
        self.now_playing = NowPlaying {
            title: None,
            artwork_url: None,
            link: Some(url.clone()),
        };
        self.current_track = Some(url);
        self.source = source;
        self.is_playing = false;
        self.progress = None;
    }

    // ── mood ────────────────────────────────────────────────────────────────

    /// Mark a recommendation for `mood` as in flight.
    pub fn begin_mood(&mut self, mood: Mood) {
        self.mood = MoodStatus {
            mood: Some(mood),
            loading: true,
            ..MoodStatus::default()
        };
    }

    /// Load the recommended episode.  Returns the URL to play.
    pub fn apply_mood(&mut self, rec: &Recommendation) -> String {
        let url = rec.episode.soundcloud_url.clone();
        self.mood.loading = false;
        self.mood.error = None;
        self.mood.episode_title = Some(rec.episode.title.clone());
        self.mood.episode_description = Some(rec.episode.description.clone());
        self.mood.reason = Some(rec.reason.clone());
        self.load(url.clone(), PlaybackSource::Mood);
        self.now_playing.title = Some(rec.episode.title.clone());
        url
    }

    pub fn mood_failed(&mut self, error: &SednaError) {
        self.mood.loading = false;
        self.mood.episode_title = None;
        self.mood.episode_description = None;
        self.mood.reason = None;
        self.mood.error = Some(error.notice());
    }

    // ── daily fact ──────────────────────────────────────────────────────────

    pub fn set_daily_fact(&mut self, fact: DailyFact) {
        self.daily_fact = DailyFactStatus {
            fact: Some(fact),
            artwork_url: None,
            error: None,
        };
    }

    pub fn daily_fact_failed(&mut self, message: impl Into<String>) {
        self.daily_fact.error = Some(message.into());
    }

    pub fn set_daily_fact_artwork(&mut self, url: Option<String>) {
        self.daily_fact.artwork_url = url.clone();
        if self.source == PlaybackSource::DailyFact && url.is_some() {
            self.now_playing.artwork_url = url;
        }
    }

    /// Play button of the daily fact.  Loads the fact's episode when it is
    /// not the loaded track, otherwise toggles it.
    pub fn toggle_daily_fact(&mut self) -> Option<PlayDecision> {
        let url = self
            .daily_fact
            .fact
            .as_ref()
            .and_then(|f| f.episode.as_ref())
            .and_then(|e| e.soundcloud_url.clone())?;

        let loaded = self.source == PlaybackSource::DailyFact
            && self.current_track.as_deref() == Some(url.as_str());
        if loaded {
            return Some(if self.is_playing {
                PlayDecision::Pause
            } else {
                PlayDecision::Resume
            });
        }

        let title = self
            .daily_fact
            .fact
            .as_ref()
            .and_then(|f| f.episode.as_ref())
            .map(|e| e.title.clone());
        let artwork = self.daily_fact.artwork_url.clone();
        self.load(url.clone(), PlaybackSource::DailyFact);
        self.now_playing.title = title;
        self.now_playing.artwork_url = artwork;
        Some(PlayDecision::Start(url))
    }

    // ── player feedback ─────────────────────────────────────────────────────

    /// Apply a player notification.  Returns true when the caller should
    /// refresh title and artwork from the player.
    pub fn on_player_event(&mut self, event: &PlayerEvent) -> bool {
        match event {
            PlayerEvent::Play => {
                self.is_playing = true;
                true
            }
            PlayerEvent::Pause | PlayerEvent::Finish => {
                self.is_playing = false;
                false
            }
            PlayerEvent::Ready | PlayerEvent::LoadProgress => true,
            PlayerEvent::PlayProgress { relative_position } => {
                self.progress = Some(relative_position.clamp(0.0, 1.0));
                false
            }
        }
    }

    /// Title and artwork as reported by the player.  Fields the player does
    /// not know keep their current value.
    pub fn set_sound_info(&mut self, sound: SoundInfo) {
        if let Some(title) = sound.title.filter(|t| !t.trim().is_empty()) {
            self.now_playing.title = Some(title);
        }
        if let Some(artwork) = sound.artwork_url {
            self.now_playing.artwork_url = Some(upgrade_artwork_url(&artwork));
        }
        if let Some(link) = sound.permalink_url {
            self.now_playing.link = Some(link);
        }
    }

    /// Artwork resolved out of band for the track `url`.  Ignored when a
    /// different track is loaded by now.
    pub fn set_track_artwork(&mut self, url: &str, artwork: String) {
        if self.current_track.as_deref() == Some(url) {
            self.now_playing.artwork_url = Some(artwork);
        }
    }

    pub fn snapshot(&self, rev: u64) -> SessionSnapshot {
        SessionSnapshot {
            rev,
            channels: self.summaries.clone(),
            active_channel: self.active_channel,
            current_track: self.current_track.clone(),
            source: self.source,
            is_playing: self.is_playing,
            now_playing: self.now_playing.clone(),
            progress: self.progress,
            catalog_size: self.filter.catalog().len(),
            played_count: self.history.played().len(),
            history_len: self.history.stack().len(),
            history_index: self.history.index(),
            mood: self.mood.clone(),
            daily_fact: self.daily_fact.clone(),
        }
    }
}
