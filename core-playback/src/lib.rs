//! # Playback Orchestration Module
//!
//! Drives a host media player through an ordered track list.
//!
//! ## Overview
//!
//! This module handles:
//! - Sequential, shuffle and loop track selection (`PlaybackSession`)
//! - The play/pause/seek/next/previous state machine (`PlaybackOrchestrator`)
//! - Periodic progress reporting while a track plays
//! - Headset button gestures, including double-tap to skip
//! - Preferring offline copies over streams when the registry has one

pub mod buttons;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod session;

pub use buttons::{ButtonAction, MediaButton, MediaButtonDecoder};
pub use config::OrchestratorConfig;
pub use error::{PlaybackError, Result};
pub use orchestrator::PlaybackOrchestrator;
pub use resolver::LocalTrackResolver;
pub use session::PlaybackSession;
