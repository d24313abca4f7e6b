//! # Playback Orchestrator
//!
//! Sequential/shuffle/loop track selection layered over a single-stream
//! [`MediaPlayer`].
//!
//! ## Overview
//!
//! The orchestrator owns the [`PlaybackSession`] and the player session that
//! is currently loaded. Collaborators learn about changes only through
//! [`PlaybackEvent`]s on the event bus and, when configured, the platform
//! [`MediaSessionMirror`].
//!
//! ```text
//!  play ──► Preparing ──(Prepared)──► Playing ◄──► Paused
//!              ▲                         │
//!              └──── next / previous ────┘
//!                    end-of-track policy
//! ```
//!
//! Player signals (`Prepared`, `Completed`, `Error`) are delivered through
//! [`PlaybackOrchestrator::on_player_signal`]. Signals for a player session
//! that is no longer current are dropped.
//!
//! ## End of track
//!
//! - shuffling with more than one track: shuffle to another track
//! - looping: restart the same track from zero
//! - otherwise: pause and keep the current index
//!
//! A backend error follows the same policy after emitting an `Error` event
//! and a paused status. Consecutive failures stop once every track in the
//! session has failed.
//!
//! ## Concurrency
//!
//! All session mutation happens under one async mutex, so transport calls
//! never interleave. The progress poller is a separate task that only reads
//! from the player and is cancelled through a [`CancellationToken`].

use crate::buttons::{ButtonAction, Decoded, MediaButton, MediaButtonDecoder};
use crate::config::OrchestratorConfig;
use crate::error::{PlaybackError, Result};
use crate::resolver::{resolve_source, LocalTrackResolver};
use crate::session::PlaybackSession;
use bridge_traits::{
    MediaPlayer, MediaSessionMirror, MediaSource, PlaybackMetadata, PlaybackSessionId,
    PlaybackState, PlayerSignal,
};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Artist shown by the platform media session for every track.
pub const SESSION_ARTIST: &str = "Radio Stream";

struct Inner {
    state: PlaybackState,
    session: Option<PlaybackSession>,
    /// Player session of the loaded track and the source it was loaded from.
    loaded: Option<(PlaybackSessionId, MediaSource)>,
    poller: Option<CancellationToken>,
    consecutive_failures: usize,
    rng: Box<dyn RngCore + Send + Sync>,
    torn_down: bool,
}

pub struct PlaybackOrchestrator {
    player: Arc<dyn MediaPlayer>,
    media_session: Option<Arc<dyn MediaSessionMirror>>,
    resolver: Option<Arc<dyn LocalTrackResolver>>,
    event_bus: EventBus,
    config: OrchestratorConfig,
    inner: Mutex<Inner>,
    buttons: parking_lot::Mutex<MediaButtonDecoder>,
}

impl fmt::Debug for PlaybackOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackOrchestrator")
            .field("media_session", &self.media_session.is_some())
            .field("resolver", &self.resolver.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PlaybackOrchestrator {
    pub fn new(player: Arc<dyn MediaPlayer>, event_bus: EventBus, config: OrchestratorConfig) -> Self {
        let buttons = MediaButtonDecoder::new(config.double_tap_window);

        Self {
            player,
            media_session: None,
            resolver: None,
            event_bus,
            config,
            inner: Mutex::new(Inner {
                state: PlaybackState::Idle,
                session: None,
                loaded: None,
                poller: None,
                consecutive_failures: 0,
                rng: Box::new(StdRng::from_entropy()),
                torn_down: false,
            }),
            buttons: parking_lot::Mutex::new(buttons),
        }
    }

    pub fn with_media_session(mut self, mirror: Arc<dyn MediaSessionMirror>) -> Self {
        self.media_session = Some(mirror);
        self
    }

    /// Consult `resolver` for offline copies when `prefer_local_playback` is on.
    pub fn with_local_resolver(mut self, resolver: Arc<dyn LocalTrackResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replace the random source used by the shuffle rule.
    pub fn with_rng(mut self, rng: impl RngCore + Send + Sync + 'static) -> Self {
        self.inner.get_mut().rng = Box::new(rng);
        self
    }

    // ========================================================================
    // Transport operations
    // ========================================================================

    /// Start a new session at `start_index`.
    ///
    /// Returns once the track is being prepared; `Playing` follows the
    /// player's `Prepared` signal.
    ///
    /// # Errors
    /// - `InvalidTrackList` for an empty list, mismatched titles or an
    ///   out-of-range start index
    /// - `TornDown` after [`teardown`](Self::teardown)
    #[instrument(skip(self, track_urls, track_titles), fields(tracks = track_urls.len()))]
    pub async fn play(
        &self,
        track_urls: Vec<String>,
        track_titles: Option<Vec<String>>,
        start_index: usize,
        shuffle: bool,
        looping: bool,
    ) -> Result<()> {
        let session = PlaybackSession::new(track_urls, track_titles, start_index, shuffle, looping)?;

        let mut inner = self.inner.lock().await;
        ensure_alive(&inner)?;

        let was_playing = inner.session.as_ref().is_some_and(|s| s.is_playing);
        inner.session = Some(session);
        if was_playing {
            self.emit_status(false);
        }
        inner.consecutive_failures = 0;

        self.start_current(&mut inner).await;
        Ok(())
    }

    /// Start a session at the position of `url` in `all_urls`, or at 0 when
    /// `url` is not in the list.
    pub async fn play_url(
        &self,
        url: &str,
        all_urls: Vec<String>,
        titles: Option<Vec<String>>,
        shuffle: bool,
        looping: bool,
    ) -> Result<()> {
        let start_index = all_urls.iter().position(|u| u == url).unwrap_or(0);
        self.play(all_urls, titles, start_index, shuffle, looping).await
    }

    /// Pause a playing track. No-op in any other state.
    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        ensure_alive(&inner)?;

        if inner.state != PlaybackState::Playing {
            return Ok(());
        }
        let Some((id, _)) = inner.loaded.clone() else {
            return Ok(());
        };

        self.player.pause(id).await?;
        self.stop_poller(&mut inner);
        inner.state = PlaybackState::Paused;
        self.set_playing(&mut inner, false);
        self.mirror_state(&inner).await;
        Ok(())
    }

    /// Resume a paused track. No-op in any other state.
    ///
    /// If the paused track has no loaded player session (it failed), it is
    /// prepared again.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        ensure_alive(&inner)?;

        if inner.state != PlaybackState::Paused {
            return Ok(());
        }

        match inner.loaded.clone() {
            Some((id, _)) => {
                self.player.start(id).await?;
                inner.state = PlaybackState::Playing;
                self.set_playing(&mut inner, true);
                self.start_poller(&mut inner);
                self.mirror_state(&inner).await;
            }
            None => {
                inner.consecutive_failures = 0;
                self.start_current(&mut inner).await;
            }
        }
        Ok(())
    }

    /// Pause when playing, resume otherwise.
    pub async fn toggle(&self) -> Result<()> {
        let playing = self.inner.lock().await.state == PlaybackState::Playing;
        if playing {
            self.pause().await
        } else {
            self.resume().await
        }
    }

    /// Move forward one track, or shuffle when shuffling.
    #[instrument(skip(self))]
    pub async fn next(&self) -> Result<()> {
        self.navigate(true).await
    }

    /// Move back one track, or shuffle when shuffling.
    #[instrument(skip(self))]
    pub async fn previous(&self) -> Result<()> {
        self.navigate(false).await
    }

    /// Seek within the loaded track.
    ///
    /// The position is clamped to `[0, duration]`; when the backend reports no
    /// duration only the lower bound applies.
    ///
    /// # Returns
    /// The position actually requested from the player.
    #[instrument(skip(self))]
    pub async fn seek(&self, position_ms: i64) -> Result<Duration> {
        let inner = self.inner.lock().await;
        ensure_alive(&inner)?;

        let Some((id, _)) = inner.loaded.clone() else {
            return Err(PlaybackError::NoActiveTrack);
        };

        let mut position = Duration::from_millis(position_ms.max(0) as u64);
        match self.player.duration(id).await {
            Ok(Some(duration)) => position = position.min(duration),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Duration unavailable, seeking unclamped"),
        }

        self.player.seek(id, position).await?;
        Ok(position)
    }

    pub async fn set_shuffle(&self, shuffle: bool) {
        if let Some(session) = self.inner.lock().await.session.as_mut() {
            session.is_shuffling = shuffle;
        }
    }

    pub async fn set_loop(&self, looping: bool) {
        if let Some(session) = self.inner.lock().await.session.as_mut() {
            session.is_looping = looping;
        }
    }

    /// Re-emit the current status and, when a track is active, its
    /// track-changed event.
    pub async fn request_status(&self) {
        let inner = self.inner.lock().await;

        let playing = inner.state == PlaybackState::Playing;
        self.emit_status(playing);

        if let Some(session) = inner.session.as_ref() {
            if inner.state != PlaybackState::Idle {
                self.emit_track_changed(session);
            }
        }
    }

    /// Release the player session and stop progress reporting.
    ///
    /// Safe to call more than once. Every later operation fails with
    /// `TornDown` and player signals are ignored.
    #[instrument(skip(self))]
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        if inner.torn_down {
            return;
        }

        self.stop_poller(&mut inner);
        self.release_loaded(&mut inner).await;

        if inner.session.as_ref().is_some_and(|s| s.is_playing) {
            self.emit_status(false);
        }

        inner.session = None;
        inner.state = PlaybackState::Stopped;
        inner.torn_down = true;
        info!("Playback orchestrator torn down");
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub async fn state(&self) -> PlaybackState {
        self.inner.lock().await.state
    }

    pub async fn current_index(&self) -> Option<usize> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.current_index())
    }

    /// Snapshot of the active session.
    pub async fn session(&self) -> Option<PlaybackSession> {
        self.inner.lock().await.session.clone()
    }

    // ========================================================================
    // Player signals
    // ========================================================================

    /// Apply a readiness/completion/error signal from the player.
    #[instrument(skip(self))]
    pub async fn on_player_signal(&self, signal: PlayerSignal) {
        let mut inner = self.inner.lock().await;

        if inner.torn_down {
            return;
        }
        if inner.loaded.as_ref().map(|(id, _)| *id) != Some(signal.session()) {
            debug!("Ignoring signal for stale player session");
            return;
        }

        match signal {
            PlayerSignal::Prepared { session } => self.on_prepared(&mut inner, session).await,
            PlayerSignal::Completed { .. } => self.on_completed(&mut inner).await,
            PlayerSignal::Error { message, .. } => {
                if self.fail_and_select(&mut inner, &message).await {
                    self.start_current(&mut inner).await;
                }
            }
        }
    }

    // ========================================================================
    // Media buttons
    // ========================================================================

    /// Apply a hardware media button.
    ///
    /// A single play/pause press toggles after the double-tap window unless a
    /// second press turns it into "next" first.
    pub async fn handle_media_button(self: &Arc<Self>, button: MediaButton) -> Result<()> {
        let decoded = self.buttons.lock().press(button, Instant::now());

        match decoded {
            Decoded::Now(action) => self.apply_button(action).await,
            Decoded::Deferred { tap } => {
                let window = self.buttons.lock().window();
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    if orchestrator.buttons.lock().confirm(tap) {
                        if let Err(e) = orchestrator.apply_button(ButtonAction::Toggle).await {
                            warn!(error = %e, "Media button toggle failed");
                        }
                    }
                });
                Ok(())
            }
        }
    }

    async fn apply_button(&self, action: ButtonAction) -> Result<()> {
        debug!(?action, "Media button");
        match action {
            ButtonAction::Toggle => self.toggle().await,
            ButtonAction::Next => self.next().await,
            ButtonAction::Previous => self.previous().await,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn navigate(&self, forward: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        ensure_alive(&inner)?;

        let max_draws = self.config.shuffle_max_draws;
        let Inner { session, rng, .. } = &mut *inner;
        let Some(session) = session.as_mut() else {
            return Err(PlaybackError::NoActiveTrack);
        };

        let index = if forward {
            session.forward(rng.as_mut(), max_draws)
        } else {
            session.backward(rng.as_mut(), max_draws)
        };
        session.select(index);

        inner.consecutive_failures = 0;
        self.start_current(&mut inner).await;
        Ok(())
    }

    /// Load the current track, following the failure policy until a track
    /// prepares or the policy stops.
    async fn start_current(&self, inner: &mut Inner) {
        loop {
            match self.prepare_current(inner).await {
                Ok(()) => return,
                Err(message) => {
                    if !self.fail_and_select(inner, &message).await {
                        return;
                    }
                }
            }
        }
    }

    async fn prepare_current(&self, inner: &mut Inner) -> std::result::Result<(), String> {
        self.stop_poller(inner);
        self.release_loaded(inner).await;

        let Some(url) = inner.session.as_ref().map(|s| s.current_url().to_string()) else {
            return Ok(());
        };

        let resolver = if self.config.prefer_local_playback {
            self.resolver.as_deref()
        } else {
            None
        };
        let source = resolve_source(resolver, &url).await;

        inner.state = PlaybackState::Preparing;
        self.set_playing(inner, false);

        debug!(%url, remote = source.is_remote(), "Preparing track");
        match self.player.prepare(source.clone()).await {
            Ok(id) => {
                inner.loaded = Some((id, source));
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn on_prepared(&self, inner: &mut Inner, id: PlaybackSessionId) {
        if inner.state != PlaybackState::Preparing {
            return;
        }

        if let Err(e) = self.player.start(id).await {
            if self.fail_and_select(inner, &e.to_string()).await {
                self.start_current(inner).await;
            }
            return;
        }

        inner.consecutive_failures = 0;
        inner.state = PlaybackState::Playing;
        self.set_playing(inner, true);

        if let Some(session) = inner.session.as_ref() {
            info!(url = %session.current_url(), index = session.current_index(), "Track started");
            self.emit_track_changed(session);
        }

        self.mirror_metadata(inner, id).await;
        self.mirror_state(inner).await;
        self.start_poller(inner);
    }

    async fn on_completed(&self, inner: &mut Inner) {
        self.stop_poller(inner);

        let Some(session) = inner.session.as_ref() else {
            return;
        };
        let (shuffling, looping, len) = (session.is_shuffling, session.is_looping, session.len());

        if shuffling && len > 1 {
            self.select_shuffled(inner);
            self.start_current(inner).await;
        } else if looping {
            self.restart_loaded(inner).await;
        } else {
            inner.state = PlaybackState::Paused;
            self.set_playing(inner, false);
            self.mirror_state(inner).await;
        }
    }

    /// Restart the loaded track from zero without announcing a track change.
    async fn restart_loaded(&self, inner: &mut Inner) {
        let Some((id, _)) = inner.loaded.clone() else {
            return;
        };

        let restarted = match self.player.seek(id, Duration::ZERO).await {
            Ok(()) => self.player.start(id).await,
            Err(e) => Err(e),
        };

        match restarted {
            Ok(()) => {
                inner.state = PlaybackState::Playing;
                if let Some(session) = inner.session.as_mut() {
                    session.is_playing = true;
                }
                self.emit_status(true);
                self.mirror_state(inner).await;
                self.start_poller(inner);
            }
            Err(e) => {
                if self.fail_and_select(inner, &e.to_string()).await {
                    self.start_current(inner).await;
                }
            }
        }
    }

    /// Report a failed track and pick what to load next.
    ///
    /// Returns `true` when the caller should prepare the (possibly new)
    /// current track.
    async fn fail_and_select(&self, inner: &mut Inner, message: &str) -> bool {
        let url = inner.session.as_ref().map(|s| s.current_url().to_string());
        warn!(url = ?url, %message, "Playback failed");

        self.event_bus
            .emit(CoreEvent::Playback(PlaybackEvent::Error {
                url,
                message: message.to_string(),
            }))
            .ok();

        self.stop_poller(inner);
        self.release_loaded(inner).await;
        inner.state = PlaybackState::Paused;
        if let Some(session) = inner.session.as_mut() {
            session.is_playing = false;
        }
        self.emit_status(false);
        self.mirror_state(inner).await;

        inner.consecutive_failures += 1;
        let Some(session) = inner.session.as_ref() else {
            return false;
        };
        if inner.consecutive_failures >= session.len() {
            warn!(failures = inner.consecutive_failures, "Every track failed, stopping");
            return false;
        }

        if session.is_shuffling && session.len() > 1 {
            self.select_shuffled(inner);
            true
        } else {
            session.is_looping
        }
    }

    fn select_shuffled(&self, inner: &mut Inner) {
        let max_draws = self.config.shuffle_max_draws;
        let Inner { session, rng, .. } = inner;
        if let Some(session) = session.as_mut() {
            let index = session.shuffle_index(rng.as_mut(), max_draws);
            session.select(index);
        }
    }

    async fn release_loaded(&self, inner: &mut Inner) {
        if let Some((id, _)) = inner.loaded.take() {
            if let Err(e) = self.player.release(id).await {
                warn!(error = %e, "Failed to release player session");
            }
        }
    }

    fn start_poller(&self, inner: &mut Inner) {
        self.stop_poller(inner);

        let Some((id, _)) = inner.loaded.clone() else {
            return;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let player = Arc::clone(&self.player);
        let event_bus = self.event_bus.clone();
        let interval = self.config.progress_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let position = match player.position(id).await {
                            Ok(position) => position,
                            Err(e) => {
                                debug!(error = %e, "Position unavailable");
                                continue;
                            }
                        };
                        let duration = player.duration(id).await.ok().flatten().unwrap_or_default();

                        event_bus
                            .emit(CoreEvent::Playback(PlaybackEvent::Progress {
                                position_ms: position.as_millis() as u64,
                                duration_ms: duration.as_millis() as u64,
                            }))
                            .ok();
                    }
                }
            }
        });

        inner.poller = Some(token);
    }

    fn stop_poller(&self, inner: &mut Inner) {
        if let Some(token) = inner.poller.take() {
            token.cancel();
        }
    }

    fn set_playing(&self, inner: &mut Inner, playing: bool) {
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if session.is_playing != playing {
            session.is_playing = playing;
            self.emit_status(playing);
        }
    }

    fn emit_status(&self, is_playing: bool) {
        self.event_bus
            .emit(CoreEvent::Playback(PlaybackEvent::StatusChanged { is_playing }))
            .ok();
    }

    fn emit_track_changed(&self, session: &PlaybackSession) {
        self.event_bus
            .emit(CoreEvent::Playback(PlaybackEvent::TrackChanged {
                url: session.current_url().to_string(),
                title: session.current_title().to_string(),
                index: session.current_index(),
            }))
            .ok();
    }

    async fn mirror_metadata(&self, inner: &Inner, id: PlaybackSessionId) {
        let Some(mirror) = self.media_session.as_ref() else {
            return;
        };
        let (Some(session), Some((_, source))) = (inner.session.as_ref(), inner.loaded.as_ref()) else {
            return;
        };

        let metadata = PlaybackMetadata {
            title: Some(session.current_title().to_string()),
            artist: Some(SESSION_ARTIST.to_string()),
            uri: Some(source.uri()),
            duration: self.player.duration(id).await.ok().flatten(),
        };

        if let Err(e) = mirror.update_metadata(metadata).await {
            warn!(error = %e, "Media session metadata update failed");
        }
    }

    async fn mirror_state(&self, inner: &Inner) {
        let Some(mirror) = self.media_session.as_ref() else {
            return;
        };

        let position = match inner.loaded.as_ref() {
            Some((id, _)) => self.player.position(*id).await.unwrap_or_default(),
            None => Duration::ZERO,
        };

        if let Err(e) = mirror.update_state(inner.state, position).await {
            warn!(error = %e, "Media session state update failed");
        }
    }
}

impl Drop for PlaybackOrchestrator {
    fn drop(&mut self) {
        if let Some(token) = self.inner.get_mut().poller.take() {
            token.cancel();
        }
    }
}

fn ensure_alive(inner: &Inner) -> Result<()> {
    if inner.torn_down {
        Err(PlaybackError::TornDown)
    } else {
        Ok(())
    }
}
