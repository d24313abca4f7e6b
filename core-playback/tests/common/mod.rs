#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    MediaPlayer, MediaSessionMirror, MediaSource, PlaybackMetadata, PlaybackSessionId,
    PlaybackState, PlayerSignal, PlayerSignalStream,
};
use core_playback::{OrchestratorConfig, PlaybackOrchestrator};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use rand::RngCore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

// ============================================================================
// Fake MediaPlayer
// ============================================================================

#[derive(Default)]
pub struct PlayerLog {
    pub prepared: Vec<(PlaybackSessionId, MediaSource)>,
    pub started: Vec<PlaybackSessionId>,
    pub paused: Vec<PlaybackSessionId>,
    pub seeks: Vec<Duration>,
    pub released: Vec<PlaybackSessionId>,
}

/// Player whose readiness and completion are driven by the test.
#[derive(Default)]
pub struct FakePlayer {
    pub log: Mutex<PlayerLog>,
    duration: Mutex<Option<Duration>>,
    position: Mutex<Duration>,
    unreachable: Mutex<HashSet<String>>,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(self, duration: Option<Duration>) -> Self {
        *self.duration.lock().unwrap() = duration;
        self
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock().unwrap() = position;
    }

    /// Make `prepare` fail immediately for `url`.
    pub fn unreachable(self, url: &str) -> Self {
        self.unreachable.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn last_session(&self) -> PlaybackSessionId {
        self.log.lock().unwrap().prepared.last().expect("nothing prepared").0
    }

    pub fn last_source(&self) -> MediaSource {
        self.log.lock().unwrap().prepared.last().expect("nothing prepared").1.clone()
    }

    pub fn prepared_urls(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .prepared
            .iter()
            .map(|(_, source)| source.uri())
            .collect()
    }
}

#[async_trait]
impl MediaPlayer for FakePlayer {
    async fn prepare(&self, source: MediaSource) -> BridgeResult<PlaybackSessionId> {
        if self.unreachable.lock().unwrap().contains(&source.uri()) {
            return Err(BridgeError::OperationFailed("stream unreachable".to_string()));
        }
        let session = PlaybackSessionId::new();
        self.log.lock().unwrap().prepared.push((session, source));
        Ok(session)
    }

    async fn start(&self, session: PlaybackSessionId) -> BridgeResult<()> {
        self.log.lock().unwrap().started.push(session);
        Ok(())
    }

    async fn pause(&self, session: PlaybackSessionId) -> BridgeResult<()> {
        self.log.lock().unwrap().paused.push(session);
        Ok(())
    }

    async fn seek(&self, _session: PlaybackSessionId, position: Duration) -> BridgeResult<()> {
        self.log.lock().unwrap().seeks.push(position);
        Ok(())
    }

    async fn position(&self, _session: PlaybackSessionId) -> BridgeResult<Duration> {
        Ok(*self.position.lock().unwrap())
    }

    async fn duration(&self, _session: PlaybackSessionId) -> BridgeResult<Option<Duration>> {
        Ok(*self.duration.lock().unwrap())
    }

    async fn release(&self, session: PlaybackSessionId) -> BridgeResult<()> {
        self.log.lock().unwrap().released.push(session);
        Ok(())
    }

    fn subscribe_signals(&self) -> BridgeResult<Box<dyn PlayerSignalStream>> {
        Err(BridgeError::NotAvailable("signals are driven by the test".to_string()))
    }
}

// ============================================================================
// Recording media session
// ============================================================================

#[derive(Default)]
pub struct RecordingMirror {
    pub metadata: Mutex<Vec<PlaybackMetadata>>,
    pub states: Mutex<Vec<PlaybackState>>,
}

#[async_trait]
impl MediaSessionMirror for RecordingMirror {
    async fn update_metadata(&self, metadata: PlaybackMetadata) -> BridgeResult<()> {
        self.metadata.lock().unwrap().push(metadata);
        Ok(())
    }

    async fn update_state(&self, state: PlaybackState, _position: Duration) -> BridgeResult<()> {
        self.states.lock().unwrap().push(state);
        Ok(())
    }
}

// ============================================================================
// Scripted randomness
// ============================================================================

/// Random source that makes `gen_range(0..len)` return the given indices in turn.
pub struct ScriptedRng {
    values: Vec<u64>,
    next: usize,
}

impl ScriptedRng {
    pub fn picking(indices: &[usize], len: usize) -> Self {
        let values = indices
            .iter()
            .map(|&i| (((i as u128) << 64).div_ceil(len as u128)) as u64)
            .collect();
        Self { values, next: 0 }
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        dest.fill(0);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub player: Arc<FakePlayer>,
    pub events: Receiver<CoreEvent>,
    pub orchestrator: Arc<PlaybackOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakePlayer::new(), |o| o)
    }

    pub fn build(
        player: FakePlayer,
        configure: impl FnOnce(PlaybackOrchestrator) -> PlaybackOrchestrator,
    ) -> Self {
        Self::with_config(player, OrchestratorConfig::default(), configure)
    }

    pub fn with_config(
        player: FakePlayer,
        config: OrchestratorConfig,
        configure: impl FnOnce(PlaybackOrchestrator) -> PlaybackOrchestrator,
    ) -> Self {
        let player = Arc::new(player);
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let orchestrator = configure(PlaybackOrchestrator::new(player.clone(), bus, config));

        Self {
            player,
            events,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Deliver `Prepared` for the most recently prepared player session.
    pub async fn prepared(&self) {
        self.orchestrator
            .on_player_signal(PlayerSignal::Prepared {
                session: self.player.last_session(),
            })
            .await;
    }

    pub async fn completed(&self) {
        self.orchestrator
            .on_player_signal(PlayerSignal::Completed {
                session: self.player.last_session(),
            })
            .await;
    }

    pub async fn errored(&self, message: &str) {
        self.orchestrator
            .on_player_signal(PlayerSignal::Error {
                session: self.player.last_session(),
                message: message.to_string(),
            })
            .await;
    }

    /// Playback events received so far, progress reports excluded.
    pub fn drain(&mut self) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                CoreEvent::Playback(PlaybackEvent::Progress { .. }) => {}
                CoreEvent::Playback(e) => out.push(e),
                _ => {}
            }
        }
        out
    }

    pub fn drain_progress(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, CoreEvent::Playback(PlaybackEvent::Progress { .. })) {
                count += 1;
            }
        }
        count
    }
}

pub fn tracks(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://radio.example.com/{}.mp3", (b'a' + i as u8) as char))
        .collect()
}

pub fn status(is_playing: bool) -> PlaybackEvent {
    PlaybackEvent::StatusChanged { is_playing }
}
