//! # Media Button Decoding
//!
//! Turns raw headset/remote button presses into playback actions.
//!
//! Play/pause is ambiguous until the double-tap window has passed: a second
//! press inside the window means "next", otherwise the first press toggles.
//! The decoder therefore hands out a *deferred* tap that the caller confirms
//! once the window has elapsed.

use std::time::Duration;
use tokio::time::Instant;

/// Physical buttons the platform forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaButton {
    PlayPause,
    HeadsetHook,
    Next,
    Previous,
}

/// Action to apply to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Toggle,
    Next,
    Previous,
}

/// Outcome of a single press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// Apply now.
    Now(ButtonAction),
    /// Toggle once the window has passed, if [`MediaButtonDecoder::confirm`]
    /// still accepts this tap.
    Deferred { tap: u64 },
}

#[derive(Debug)]
pub struct MediaButtonDecoder {
    window: Duration,
    last_tap: Option<Instant>,
    pending: Option<u64>,
    taps: u64,
}

impl MediaButtonDecoder {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_tap: None,
            pending: None,
            taps: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn press(&mut self, button: MediaButton, at: Instant) -> Decoded {
        match button {
            MediaButton::Next => Decoded::Now(ButtonAction::Next),
            MediaButton::Previous => Decoded::Now(ButtonAction::Previous),
            MediaButton::PlayPause | MediaButton::HeadsetHook => {
                let double_tap = self
                    .last_tap
                    .is_some_and(|last| at.saturating_duration_since(last) < self.window);
                self.last_tap = Some(at);

                if double_tap {
                    self.pending = None;
                    Decoded::Now(ButtonAction::Next)
                } else {
                    self.taps += 1;
                    self.pending = Some(self.taps);
                    Decoded::Deferred { tap: self.taps }
                }
            }
        }
    }

    /// True exactly once for a deferred tap that no later press superseded.
    pub fn confirm(&mut self, tap: u64) -> bool {
        if self.pending == Some(tap) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn test_single_tap_toggles_after_window() {
        let mut decoder = MediaButtonDecoder::new(WINDOW);
        let start = Instant::now();

        let Decoded::Deferred { tap } = decoder.press(MediaButton::PlayPause, start) else {
            panic!("single tap should be deferred");
        };
        assert!(decoder.confirm(tap));
        assert!(!decoder.confirm(tap));
    }

    #[test]
    fn test_double_tap_is_next() {
        let mut decoder = MediaButtonDecoder::new(WINDOW);
        let start = Instant::now();

        let Decoded::Deferred { tap } = decoder.press(MediaButton::HeadsetHook, start) else {
            panic!("first tap should be deferred");
        };
        assert_eq!(
            decoder.press(MediaButton::PlayPause, start + Duration::from_millis(120)),
            Decoded::Now(ButtonAction::Next)
        );
        assert!(!decoder.confirm(tap));
    }

    #[test]
    fn test_slow_taps_are_separate_toggles() {
        let mut decoder = MediaButtonDecoder::new(WINDOW);
        let start = Instant::now();

        assert!(matches!(
            decoder.press(MediaButton::PlayPause, start),
            Decoded::Deferred { tap: 1 }
        ));
        assert!(matches!(
            decoder.press(MediaButton::PlayPause, start + Duration::from_millis(450)),
            Decoded::Deferred { tap: 2 }
        ));
        assert!(!decoder.confirm(1));
        assert!(decoder.confirm(2));
    }

    #[test]
    fn test_skip_buttons_pass_through() {
        let mut decoder = MediaButtonDecoder::new(WINDOW);
        let now = Instant::now();
        assert_eq!(
            decoder.press(MediaButton::Next, now),
            Decoded::Now(ButtonAction::Next)
        );
        assert_eq!(
            decoder.press(MediaButton::Previous, now),
            Decoded::Now(ButtonAction::Previous)
        );
    }
}
