//! Playdeck Core - Playlist playback sessions
//!
//! This crate scans a music directory into a track catalog and plays it
//! through a `PlaybackSession`: one loaded sound at a time, automatic
//! advance at end of track, and background rescans that keep the current
//! track when it survives.

pub mod command;
pub mod decoder;
pub mod engine;
pub mod output;
pub mod refresh;
pub mod scanner;
pub mod session;
pub mod signal;
pub mod sound;
pub mod stream;
pub mod track;

#[cfg( test )]
mod mock;

pub use command::{ Command, CommandError };
pub use engine::{ AudioEngine, EngineError, Sound };
pub use refresh::RefreshPhase;
pub use scanner::{ CatalogScanner, ScanConfig, DEFAULT_EXTENSIONS, DEFAULT_MUSIC_DIR };
pub use session::{ PlaybackSession, PlaybackStatus, SessionConfig, SessionError, SessionSnapshot };
pub use signal::EndOfTrackSignal;
pub use stream::StreamingEngine;
pub use track::TrackRef;
