//! # Playback Session
//!
//! The ordered track list being played and the navigation rules over it.
//!
//! A session always holds at least one track, and `current_index` always
//! points into the list. Titles are positionally paired with urls.

use crate::error::{PlaybackError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Title used when the caller provides none.
pub const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSession {
    track_urls: Vec<String>,
    track_titles: Vec<String>,
    current_index: usize,
    pub is_shuffling: bool,
    pub is_looping: bool,
    pub is_playing: bool,
}

impl PlaybackSession {
    /// Build a session positioned at `start_index`.
    ///
    /// # Errors
    /// `InvalidTrackList` if `track_urls` is empty, if `track_titles` is given
    /// with a different length, or if `start_index` is out of range.
    pub fn new(
        track_urls: Vec<String>,
        track_titles: Option<Vec<String>>,
        start_index: usize,
        shuffle: bool,
        looping: bool,
    ) -> Result<Self> {
        if track_urls.is_empty() {
            return Err(PlaybackError::InvalidTrackList(
                "track list is empty".to_string(),
            ));
        }

        let track_titles = match track_titles {
            Some(titles) if titles.len() != track_urls.len() => {
                return Err(PlaybackError::InvalidTrackList(format!(
                    "{} titles for {} tracks",
                    titles.len(),
                    track_urls.len()
                )));
            }
            Some(titles) => titles,
            None => vec![UNKNOWN_TITLE.to_string(); track_urls.len()],
        };

        if start_index >= track_urls.len() {
            return Err(PlaybackError::InvalidTrackList(format!(
                "start index {} out of range for {} tracks",
                start_index,
                track_urls.len()
            )));
        }

        Ok(Self {
            track_urls,
            track_titles,
            current_index: start_index,
            is_shuffling: shuffle,
            is_looping: looping,
            is_playing: false,
        })
    }

    pub fn len(&self) -> usize {
        self.track_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_urls.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_url(&self) -> &str {
        &self.track_urls[self.current_index]
    }

    pub fn current_title(&self) -> &str {
        &self.track_titles[self.current_index]
    }

    pub fn track_urls(&self) -> &[String] {
        &self.track_urls
    }

    /// Move to `index`. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.len() {
            self.current_index = index;
        }
    }

    /// Index after the current one, wrapping to the start.
    pub fn next_index(&self) -> usize {
        (self.current_index + 1) % self.len()
    }

    /// Index before the current one, wrapping to the end.
    pub fn previous_index(&self) -> usize {
        (self.current_index + self.len() - 1) % self.len()
    }

    /// Pick a random index, redrawing up to `max_draws` times to avoid the
    /// current track. The last draw is accepted even if it repeats.
    ///
    /// A single-track session always yields 0.
    pub fn shuffle_index<R: Rng + ?Sized>(&self, rng: &mut R, max_draws: u32) -> usize {
        if self.len() == 1 {
            return 0;
        }

        let mut index = rng.gen_range(0..self.len());
        let mut draws = 1;
        while index == self.current_index && draws < max_draws {
            index = rng.gen_range(0..self.len());
            draws += 1;
        }
        index
    }

    /// Index navigated to by "next": the shuffle rule when shuffling,
    /// otherwise the following track.
    pub fn forward<R: Rng + ?Sized>(&self, rng: &mut R, max_draws: u32) -> usize {
        if self.is_shuffling {
            self.shuffle_index(rng, max_draws)
        } else {
            self.next_index()
        }
    }

    /// Index navigated to by "previous". Shuffling ignores direction.
    pub fn backward<R: Rng + ?Sized>(&self, rng: &mut R, max_draws: u32) -> usize {
        if self.is_shuffling {
            self.shuffle_index(rng, max_draws)
        } else {
            self.previous_index()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    // Yields values that map onto chosen indices under `gen_range(0..n)`.
    struct Picks {
        values: Vec<u64>,
        next: usize,
        drawn: usize,
    }

    impl Picks {
        fn new(indices: &[usize], n: usize) -> Self {
            let values = indices
                .iter()
                .map(|&i| (((i as u128) << 64).div_ceil(n as u128)) as u64)
                .collect();
            Self {
                values,
                next: 0,
                drawn: 0,
            }
        }
    }

    impl RngCore for Picks {
        fn next_u32(&mut self) -> u32 {
            (self.next_u64() >> 32) as u32
        }

        fn next_u64(&mut self) -> u64 {
            let value = self.values[self.next % self.values.len()];
            self.next += 1;
            self.drawn += 1;
            value
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn tracks(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://radio.example.com/{i}.mp3")).collect()
    }

    #[test]
    fn test_titles_default_to_unknown() {
        let session = PlaybackSession::new(tracks(2), None, 1, false, false).unwrap();
        assert_eq!(session.current_title(), "Unknown");
        assert_eq!(session.current_url(), "https://radio.example.com/1.mp3");
        assert!(!session.is_playing);
    }

    #[test]
    fn test_invalid_track_lists() {
        assert!(matches!(
            PlaybackSession::new(Vec::new(), None, 0, false, false),
            Err(PlaybackError::InvalidTrackList(_))
        ));
        assert!(matches!(
            PlaybackSession::new(tracks(3), Some(vec!["a".to_string()]), 0, false, false),
            Err(PlaybackError::InvalidTrackList(_))
        ));
        assert!(matches!(
            PlaybackSession::new(tracks(3), None, 3, false, false),
            Err(PlaybackError::InvalidTrackList(_))
        ));
    }

    #[test]
    fn test_sequential_navigation_wraps() {
        let mut session = PlaybackSession::new(tracks(3), None, 0, false, false).unwrap();

        let mut visited = Vec::new();
        for _ in 0..3 {
            session.select(session.next_index());
            visited.push(session.current_index());
        }
        assert_eq!(visited, vec![1, 2, 0]);

        assert_eq!(session.previous_index(), 2);
    }

    #[test]
    fn test_select_ignores_out_of_range() {
        let mut session = PlaybackSession::new(tracks(2), None, 0, false, false).unwrap();
        session.select(5);
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn test_shuffle_redraws_current_track() {
        let session = PlaybackSession::new(tracks(2), None, 0, true, false).unwrap();
        let mut rng = Picks::new(&[0, 0, 0, 1], 2);

        assert_eq!(session.shuffle_index(&mut rng, 10), 1);
        assert_eq!(rng.drawn, 4);
    }

    #[test]
    fn test_shuffle_accepts_repeat_after_max_draws() {
        let session = PlaybackSession::new(tracks(2), None, 0, true, false).unwrap();
        let mut rng = Picks::new(&[0], 2);

        assert_eq!(session.shuffle_index(&mut rng, 10), 0);
        assert_eq!(rng.drawn, 10);
    }

    #[test]
    fn test_shuffle_single_track_replays_it() {
        let session = PlaybackSession::new(tracks(1), None, 0, true, false).unwrap();
        let mut rng = Picks::new(&[0], 1);

        assert_eq!(session.shuffle_index(&mut rng, 10), 0);
        assert_eq!(rng.drawn, 0);
    }

    #[test]
    fn test_shuffle_ignores_direction() {
        let session = PlaybackSession::new(tracks(3), None, 1, true, false).unwrap();

        assert_eq!(session.forward(&mut Picks::new(&[2], 3), 10), 2);
        assert_eq!(session.backward(&mut Picks::new(&[2], 3), 10), 2);
    }

    #[test]
    fn test_two_track_shuffle_leaves_current_track() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut session = PlaybackSession::new(tracks(2), None, 0, true, false).unwrap();

        for _ in 0..20 {
            let before = session.current_index();
            session.select(session.forward(&mut rng, 64));
            assert_ne!(session.current_index(), before);
        }
    }
}
