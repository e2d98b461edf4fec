//! Playback session
//!
//! `PlaybackSession` owns the catalog, the current index, the playback
//! status, the volume and the one loaded sound. It lives on the control
//! thread and is driven once per frame:
//!
//! 1. `tick` drains the end-of-track signal, then any finished refresh,
//!    then repairs an out-of-range index;
//! 2. the driver applies user commands (`toggle_play_pause`, `next`,
//!    `set_volume`, `request_refresh`);
//! 3. the driver renders `snapshot`.
//!
//! Nothing here blocks. A sound exists exactly when the status is Playing
//! or Paused, and a new sound is only loaded after the previous one has
//! been released.

use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::engine::{ AudioEngine, EngineError, Sound };
use crate::refresh::{ Capture, CompletedScan, RefreshCoordinator, RefreshPhase };
use crate::scanner::{ CatalogScanner, ScanConfig };
use crate::signal::EndOfTrackSignal;
use crate::sound::ActiveSound;
use crate::track::TrackRef;


/// Errors from a transition that tried to load or start a sound.
///
/// By the time one is returned the session is already Stopped with no
/// sound loaded, and the track is still in the catalog.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( "Failed to load {track}: {source}" )]
    Load {
        track: TrackRef,
        #[source]
        source: EngineError,
    },

    #[error( "Failed to start {track}: {source}" )]
    Start {
        track: TrackRef,
        #[source]
        source: EngineError,
    },
}


/// Playback status.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}


/// Settings the session is built from.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionConfig {
    pub scan: ScanConfig,
    /// Initial volume, 0.0 to 1.0.
    pub volume: f32,
}


impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            volume: 1.0,
        }
    }
}


/// Everything the presentation layer needs to draw one frame.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionSnapshot {
    /// Display names, in catalog order.
    pub tracks: Vec<String>,
    pub current_index: usize,
    pub status: PlaybackStatus,
    pub volume: f32,
    pub is_loading: bool,
    pub music_dir: PathBuf,
    pub extensions: Vec<String>,
}


impl SessionSnapshot {
    /// Display name of the track at the current index.
    pub fn current_name( &self ) -> Option<&str> {
        self.tracks.get( self.current_index ).map( String::as_str )
    }
}


/// The playback state machine.
pub struct PlaybackSession<E: AudioEngine> {
    engine: E,
    catalog: Vec<TrackRef>,
    index: usize,
    status: PlaybackStatus,
    volume: f32,
    active: Option<ActiveSound<E::Sound>>,
    refresh: RefreshCoordinator,
    ended: EndOfTrackSignal,
}


impl<E: AudioEngine> PlaybackSession<E> {
    /// Creates a session over the local music directory and starts the
    /// first catalog scan.
    pub fn new( engine: E, config: SessionConfig ) -> Self {
        Self::with_scanner( engine, CatalogScanner::new( config.scan ), config.volume )
    }


    /// Creates a session with a custom scanner and starts the first catalog scan.
    pub fn with_scanner( engine: E, scanner: CatalogScanner, volume: f32 ) -> Self {
        let mut session = Self {
            engine,
            catalog: Vec::new(),
            index: 0,
            status: PlaybackStatus::Stopped,
            volume: clamp_volume( volume ).unwrap_or( 1.0 ),
            active: None,
            refresh: RefreshCoordinator::new( scanner ),
            ended: EndOfTrackSignal::new(),
        };
        session.request_refresh();
        session
    }


    /// Runs the once-per-frame housekeeping: end of track first, then a
    /// finished refresh, then the index check.
    ///
    /// Returns the first load failure hit along the way; the rest of the
    /// tick still runs.
    pub fn tick( &mut self ) -> Result<(), SessionError> {
        let ended = self.drain_end_of_track();
        let refreshed = self.drain_refresh();
        self.clamp_index();
        ended.and( refreshed )
    }


    fn drain_end_of_track( &mut self ) -> Result<(), SessionError> {
        if !self.ended.take() {
            return Ok(());
        }

        if self.status != PlaybackStatus::Playing {
            tracing::debug!( "Discarding end-of-track signal while {:?}", self.status );
            return Ok(());
        }

        if let Some( track ) = self.catalog.get( self.index ) {
            tracing::info!( "Track {} ended, playing next.", track.display_name() );
        }
        self.advance()
    }


    fn drain_refresh( &mut self ) -> Result<(), SessionError> {
        match self.refresh.poll() {
            Some( done ) => self.apply_scan( done ),
            None => Ok(()),
        }
    }


    /// Replaces the catalog and re-locates the previously current track by
    /// identity. Old indices mean nothing against the new list.
    fn apply_scan( &mut self, done: CompletedScan ) -> Result<(), SessionError> {
        let CompletedScan { tracks, capture } = done;

        self.release_active();
        self.catalog = tracks;
        self.index = 0;

        tracing::info!( "Catalog refreshed: {} tracks", self.catalog.len() );

        let Some( previous ) = capture.track else {
            return Ok(());
        };

        match self.catalog.iter().position( |t| *t == previous ) {
            Some( position ) => {
                self.index = position;
                if capture.was_playing {
                    tracing::info!( "Resuming {} at index {}", previous.display_name(), position );
                    return self.load_and_start( position );
                }
                Ok(())
            }
            None => {
                tracing::info!( "{} is no longer in the catalog", previous.display_name() );
                Ok(())
            }
        }
    }


    /// Resets an index that points past the catalog, releasing a sound
    /// that is no longer bound to the new position.
    fn clamp_index( &mut self ) {
        let len = self.catalog.len();
        if len > 0 && self.index < len {
            return;
        }
        if len == 0 && self.index == 0 && self.active.is_none() {
            return;
        }

        tracing::debug!( "Current index {} out of range for {} tracks, resetting to 0", self.index, len );
        let still_bound = match ( &self.active, self.catalog.first() ) {
            ( Some( active ), Some( first ) ) => active.is_bound_to( 0, first ),
            _ => false,
        };
        if !still_bound {
            self.release_active();
        }
        self.index = 0;
    }


    /// Toggles between playing and paused. From Stopped, or when the loaded
    /// sound is not the current track, loads the current track and plays it.
    ///
    /// Does nothing while the catalog is empty or a refresh is running.
    pub fn toggle_play_pause( &mut self ) -> Result<(), SessionError> {
        if self.catalog.is_empty() || self.is_loading() {
            return Ok(());
        }
        self.clamp_index();

        let current = self.catalog[ self.index ].clone();
        match self.status {
            PlaybackStatus::Playing => {
                if let Some( active ) = self.active.as_mut() {
                    if let Err( e ) = active.stop() {
                        tracing::warn!( "Failed to stop {}: {}", current, e );
                    }
                }
                self.status = PlaybackStatus::Paused;
                tracing::info!( "Paused: {}", current.display_name() );
                Ok(())
            }
            PlaybackStatus::Paused if self.bound_to_current() => self.resume( current ),
            PlaybackStatus::Paused | PlaybackStatus::Stopped => self.load_and_start( self.index ),
        }
    }


    fn resume( &mut self, current: TrackRef ) -> Result<(), SessionError> {
        let started = match self.active.as_mut() {
            Some( active ) => active.start(),
            None => return self.load_and_start( self.index ),
        };

        match started {
            Ok(()) => {
                self.status = PlaybackStatus::Playing;
                tracing::info!( "Resumed: {}", current.display_name() );
                Ok(())
            }
            Err( source ) => {
                tracing::error!( "Failed to resume {}: {}", current, source );
                self.release_active();
                Err( SessionError::Start { track: current, source } )
            }
        }
    }


    /// Skips to the next track, wrapping at the end of the catalog.
    ///
    /// Does nothing while the catalog is empty or a refresh is running.
    pub fn next( &mut self ) -> Result<(), SessionError> {
        if self.catalog.is_empty() || self.is_loading() {
            return Ok(());
        }
        self.advance()
    }


    /// Moves to `(index + 1) mod len` and plays it. With an empty catalog
    /// the session just stops.
    fn advance( &mut self ) -> Result<(), SessionError> {
        self.release_active();

        if self.catalog.is_empty() {
            self.index = 0;
            return Ok(());
        }

        self.index = ( self.index + 1 ) % self.catalog.len();
        tracing::info!(
            "Next track selected (index {}): {}",
            self.index,
            self.catalog[ self.index ].display_name()
        );
        self.load_and_start( self.index )
    }


    /// Releases any loaded sound, then loads, binds and starts the track
    /// at `index`. On failure the session is left Stopped with nothing loaded.
    fn load_and_start( &mut self, index: usize ) -> Result<(), SessionError> {
        self.release_active();
        // Anything still pending came from the sound just released
        self.ended.take();

        let Some( track ) = self.catalog.get( index ).cloned() else {
            return Ok(());
        };

        let mut sound = match self.engine.load_streaming( track.path() ) {
            Ok( sound ) => sound,
            Err( source ) => {
                tracing::error!( "Failed to init sound from file {}: {}", track, source );
                return Err( SessionError::Load { track, source } );
            }
        };

        sound.set_volume( self.volume );
        let ended = self.ended.clone();
        sound.on_end( Box::new( move || ended.raise() ) );

        if let Err( source ) = sound.start() {
            tracing::error!( "Failed to start {}: {}", track, source );
            return Err( SessionError::Start { track, source } );
        }

        tracing::info!( "Playing: {}", track.display_name() );
        self.active = Some( ActiveSound::bind( sound, index, track ) );
        self.status = PlaybackStatus::Playing;
        Ok(())
    }


    /// Drops the loaded sound, if any, and stops.
    fn release_active( &mut self ) {
        if let Some( active ) = self.active.take() {
            active.release();
        }
        self.status = PlaybackStatus::Stopped;
    }


    fn bound_to_current( &self ) -> bool {
        match ( &self.active, self.catalog.get( self.index ) ) {
            ( Some( active ), Some( current ) ) => active.is_bound_to( self.index, current ),
            _ => false,
        }
    }


    /// Sets the volume, clamped to 0.0..=1.0. Applies at once to a loaded
    /// sound, otherwise to the next one loaded. NaN is ignored.
    pub fn set_volume( &mut self, volume: f32 ) {
        let Some( volume ) = clamp_volume( volume ) else {
            return;
        };

        self.volume = volume;
        if let Some( active ) = self.active.as_mut() {
            active.set_volume( volume );
        }
        tracing::debug!( "Volume changed to: {}", volume );
    }


    /// Rescans the music directory in the background.
    ///
    /// Playback stops until the scan is applied; if the track that was
    /// current is still present it becomes current again, and resumes if it
    /// was playing. Ignored while a scan is already running.
    pub fn request_refresh( &mut self ) {
        if self.refresh.is_busy() {
            tracing::debug!( "Refresh already in progress, ignoring request" );
            return;
        }

        let capture = Capture {
            track: self.catalog.get( self.index ).cloned(),
            was_playing: self.status == PlaybackStatus::Playing,
        };
        self.release_active();

        tracing::info!( "Refreshing catalog from {:?}", self.refresh.scanner().dir() );
        self.refresh.begin( capture );
    }


    /// Tracks in catalog order.
    pub fn catalog( &self ) -> &[TrackRef] {
        &self.catalog
    }


    pub fn current_index( &self ) -> usize {
        self.index
    }


    /// Track at the current index, if the catalog is not empty.
    pub fn current_track( &self ) -> Option<&TrackRef> {
        self.catalog.get( self.index )
    }


    /// Track the loaded sound is bound to.
    pub fn loaded_track( &self ) -> Option<&TrackRef> {
        self.active.as_ref().map( |a| a.track() )
    }


    pub fn status( &self ) -> PlaybackStatus {
        self.status
    }


    pub fn volume( &self ) -> f32 {
        self.volume
    }


    /// Returns true while a refresh has not yet been applied.
    pub fn is_loading( &self ) -> bool {
        self.refresh.is_busy()
    }


    pub fn refresh_phase( &self ) -> RefreshPhase {
        self.refresh.phase()
    }


    /// Directory the catalog is scanned from.
    pub fn music_dir( &self ) -> &Path {
        self.refresh.scanner().dir()
    }


    /// Captures the observable state for rendering.
    pub fn snapshot( &self ) -> SessionSnapshot {
        SessionSnapshot {
            tracks: self.catalog.iter().map( |t| t.display_name() ).collect(),
            current_index: self.index,
            status: self.status,
            volume: self.volume,
            is_loading: self.is_loading(),
            music_dir: self.music_dir().to_path_buf(),
            extensions: self.refresh.scanner().extensions().to_vec(),
        }
    }
}


impl<E: AudioEngine> Drop for PlaybackSession<E> {
    fn drop( &mut self ) {
        self.release_active();
    }
}


fn clamp_volume( volume: f32 ) -> Option<f32> {
    if volume.is_nan() {
        None
    } else {
        Some( volume.clamp( 0.0, 1.0 ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::mock::{ wait_for, MemoryFileSystem, MockEngine };


    struct Harness {
        session: PlaybackSession<MockEngine>,
        engine: MockEngine,
        fs: Arc<MemoryFileSystem>,
    }


    impl Harness {
        fn new( files: &[&str] ) -> Self {
            let fs = Arc::new( MemoryFileSystem::new( files.iter().copied() ) );
            let engine = MockEngine::new();
            let config = ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() };
            let scanner = CatalogScanner::with_filesystem( config, fs.clone() );
            let session = PlaybackSession::with_scanner( engine.clone(), scanner, 1.0 );

            let mut harness = Self { session, engine, fs };
            harness.settle().unwrap();
            harness
        }


        /// Ticks until the pending refresh has been applied, returning the
        /// result of the tick that applied it.
        fn settle( &mut self ) -> Result<(), SessionError> {
            let session = &mut self.session;
            wait_for( || {
                let result = session.tick();
                ( !session.is_loading() ).then_some( result )
            })
        }


        fn refresh_with( &mut self, files: &[&str] ) -> Result<(), SessionError> {
            self.fs.set_files( files.iter().copied() );
            self.session.request_refresh();
            self.settle()
        }


        fn current( &self ) -> String {
            self.session.current_track().map( |t| t.to_string() ).unwrap_or_default()
        }


        fn assert_consistent( &self ) {
            let stopped = self.session.status() == PlaybackStatus::Stopped;
            assert_eq!( stopped, self.engine.live_sounds() == 0, "status {:?}", self.session.status() );
            assert_eq!( stopped, self.session.loaded_track().is_none() );
            assert!( self.engine.max_live_sounds() <= 1 );
        }
    }


    #[test]
    fn test_initial_scan_populates_catalog() {
        let h = Harness::new( &[ "m/a.mp3", "m/b.wav" ] );
        assert_eq!( h.session.catalog().len(), 2 );
        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        h.assert_consistent();
    }


    #[test]
    fn test_toggle_plays_current_track() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.toggle_play_pause().unwrap();

        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/a.mp3" ) ) );
        assert!( h.engine.live_playing() );
        h.assert_consistent();
    }


    #[test]
    fn test_pause_and_resume_in_place() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.session.toggle_play_pause().unwrap();

        assert_eq!( h.session.status(), PlaybackStatus::Paused );
        assert!( !h.engine.live_playing() );
        assert_eq!( h.engine.live_sounds(), 1 );
        h.assert_consistent();

        h.session.toggle_play_pause().unwrap();
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        assert!( h.engine.live_playing() );
        assert_eq!( h.engine.loads().len(), 1 );
    }


    #[test]
    fn test_next_wraps_around() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3", "m/c.mp3" ] );
        h.session.toggle_play_pause().unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            h.session.next().unwrap();
            seen.push( h.session.current_index() );
            h.assert_consistent();
        }

        assert_eq!( seen, vec![ 1, 2, 0, 1 ] );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/b.mp3" ) ) );
    }


    #[test]
    fn test_next_from_stopped_starts_playing() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.next().unwrap();

        assert_eq!( h.session.current_index(), 1 );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        h.assert_consistent();
    }


    #[test]
    fn test_next_on_single_track_reloads_it() {
        let mut h = Harness::new( &[ "m/only.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.session.next().unwrap();

        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.engine.loads(), vec![ PathBuf::from( "m/only.mp3" ); 2 ] );
        assert_eq!( h.engine.live_sounds(), 1 );
        h.assert_consistent();
    }


    #[test]
    fn test_never_more_than_one_sound() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3", "m/c.mp3" ] );

        h.session.toggle_play_pause().unwrap();
        h.session.next().unwrap();
        h.session.toggle_play_pause().unwrap();
        h.session.next().unwrap();
        h.engine.finish_live();
        h.session.tick().unwrap();
        h.session.toggle_play_pause().unwrap();
        h.session.toggle_play_pause().unwrap();
        h.refresh_with( &[ "m/c.mp3", "m/a.mp3" ] ).unwrap();
        h.session.next().unwrap();

        assert_eq!( h.engine.max_live_sounds(), 1 );
        h.assert_consistent();
    }


    #[test]
    fn test_track_end_advances() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.toggle_play_pause().unwrap();

        h.engine.finish_live();
        h.session.tick().unwrap();

        assert_eq!( h.session.current_index(), 1 );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/b.mp3" ) ) );
        h.assert_consistent();
    }


    #[test]
    fn test_track_end_while_paused_is_discarded() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.session.toggle_play_pause().unwrap();

        h.engine.finish_live();
        h.session.tick().unwrap();

        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.session.status(), PlaybackStatus::Paused );
        assert_eq!( h.engine.loads().len(), 1 );
        h.session.tick().unwrap();
        assert_eq!( h.session.current_index(), 0 );
    }


    #[test]
    fn test_resuming_finished_sound_advances() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.session.toggle_play_pause().unwrap();
        h.engine.finish_live();
        h.session.tick().unwrap();

        // Resume starts a sound with nothing left, which reports its end again
        h.session.toggle_play_pause().unwrap();
        h.session.tick().unwrap();

        assert_eq!( h.session.current_index(), 1 );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/b.mp3" ) ) );
        h.assert_consistent();
    }


    #[test]
    fn test_track_end_while_stopped_is_discarded() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.engine.finish_live();

        // Refresh stops playback before the signal is drained
        h.fs.hold();
        h.session.request_refresh();
        h.session.tick().unwrap();
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        assert_eq!( h.engine.loads().len(), 1 );

        h.fs.release();
        h.settle().unwrap();
        // Resumed on the same track rather than advanced
        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/a.mp3" ) ) );
    }


    #[test]
    fn test_manual_next_wins_over_pending_track_end() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3", "m/c.mp3" ] );
        h.session.toggle_play_pause().unwrap();

        // The end arrives after this tick's drain, then the user presses Next
        h.engine.finish_live();
        h.session.next().unwrap();
        h.session.tick().unwrap();

        assert_eq!( h.session.current_index(), 1 );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/b.mp3" ) ) );
    }


    #[test]
    fn test_volume_is_latent_until_load() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        h.session.set_volume( 0.3 );
        assert_eq!( h.engine.live_sounds(), 0 );

        h.session.toggle_play_pause().unwrap();
        assert_eq!( h.engine.live_volume(), Some( 0.3 ) );
    }


    #[test]
    fn test_volume_applies_to_loaded_sound() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.session.set_volume( 0.6 );

        assert_eq!( h.engine.live_volume(), Some( 0.6 ) );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
    }


    #[test]
    fn test_volume_is_clamped() {
        let mut h = Harness::new( &[] );
        h.session.set_volume( 1.7 );
        assert_eq!( h.session.volume(), 1.0 );
        h.session.set_volume( -0.2 );
        assert_eq!( h.session.volume(), 0.0 );
        h.session.set_volume( f32::NAN );
        assert_eq!( h.session.volume(), 0.0 );
    }


    #[test]
    fn test_empty_catalog_commands_are_noops() {
        let mut h = Harness::new( &[] );
        h.session.toggle_play_pause().unwrap();
        h.session.next().unwrap();

        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        assert_eq!( h.session.current_index(), 0 );
        assert!( h.engine.loads().is_empty() );
    }


    #[test]
    fn test_load_failure_falls_back_to_stopped() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/bad.mp3", "m/c.mp3" ] );
        h.engine.fail_on( "m/bad.mp3" );
        h.session.toggle_play_pause().unwrap();

        let err = h.session.next().unwrap_err();
        assert!( matches!( err, SessionError::Load { ref track, .. } if track.to_string() == "m/bad.mp3" ) );
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        assert_eq!( h.session.current_index(), 1 );
        assert_eq!( h.session.catalog().len(), 3 );
        h.assert_consistent();

        // The user can skip past it
        h.session.next().unwrap();
        assert_eq!( h.current(), "m/c.mp3" );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
    }


    #[test]
    fn test_refresh_resumes_moved_track() {
        let mut h = Harness::new( &[ "m/x.mp3", "m/y.mp3", "m/z.mp3" ] );
        h.session.next().unwrap();
        assert_eq!( h.current(), "m/y.mp3" );

        h.refresh_with( &[ "m/y.mp3", "m/z.mp3" ] ).unwrap();

        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.current(), "m/y.mp3" );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        assert_eq!( h.engine.live_path(), Some( PathBuf::from( "m/y.mp3" ) ) );
        h.assert_consistent();
    }


    #[test]
    fn test_refresh_with_removed_track_stops() {
        let mut h = Harness::new( &[ "m/x.mp3", "m/y.mp3", "m/z.mp3" ] );
        h.session.next().unwrap();

        h.refresh_with( &[ "m/x.mp3", "m/z.mp3" ] ).unwrap();

        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.current(), "m/x.mp3" );
        h.assert_consistent();
    }


    #[test]
    fn test_refresh_keeps_paused_track_without_playing() {
        let mut h = Harness::new( &[ "m/x.mp3", "m/y.mp3" ] );
        h.session.next().unwrap();
        h.session.toggle_play_pause().unwrap();

        h.refresh_with( &[ "m/w.mp3", "m/x.mp3", "m/y.mp3" ] ).unwrap();

        assert_eq!( h.session.current_index(), 2 );
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        h.assert_consistent();
    }


    #[test]
    fn test_refresh_to_empty_catalog_stops() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.next().unwrap();

        h.refresh_with( &[] ).unwrap();

        assert!( h.session.catalog().is_empty() );
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        assert_eq!( h.session.current_index(), 0 );
        h.assert_consistent();
    }


    #[test]
    fn test_refresh_resume_failure_is_reported() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        h.engine.fail_on( "m/a.mp3" );

        let result = h.refresh_with( &[ "m/a.mp3" ] );

        assert!( matches!( result, Err( SessionError::Load { .. } ) ) );
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        h.assert_consistent();
    }


    #[test]
    fn test_second_refresh_while_scanning_is_dropped() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        let listings = h.fs.listings();

        h.fs.hold();
        h.session.request_refresh();
        wait_for( || ( h.fs.listings() == listings + 1 ).then_some( () ) );

        h.fs.set_files( [ "m/b.mp3" ] );
        h.session.request_refresh();
        h.session.tick().unwrap();
        assert!( h.session.is_loading() );
        assert_eq!( h.session.refresh_phase(), RefreshPhase::Scanning );
        assert_eq!( h.current(), "m/a.mp3" );

        h.fs.release();
        h.settle().unwrap();
        assert_eq!( h.fs.listings(), listings + 1 );
        assert_eq!( h.current(), "m/b.mp3" );
    }


    #[test]
    fn test_playback_commands_ignored_while_loading() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        h.fs.hold();
        h.session.request_refresh();

        h.session.toggle_play_pause().unwrap();
        h.session.next().unwrap();
        h.session.set_volume( 0.4 );

        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        assert!( h.engine.loads().is_empty() );
        assert_eq!( h.session.volume(), 0.4 );

        h.fs.release();
        h.settle().unwrap();
    }


    #[test]
    fn test_out_of_range_index_is_clamped() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.next().unwrap();
        assert_eq!( h.session.current_index(), 1 );

        h.session.index = 9;
        h.session.tick().unwrap();

        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.session.status(), PlaybackStatus::Stopped );
        h.assert_consistent();
    }


    #[test]
    fn test_clamp_keeps_sound_bound_to_first_track() {
        let mut h = Harness::new( &[ "m/a.mp3", "m/b.mp3" ] );
        h.session.toggle_play_pause().unwrap();

        h.session.index = 5;
        h.session.tick().unwrap();

        assert_eq!( h.session.current_index(), 0 );
        assert_eq!( h.session.status(), PlaybackStatus::Playing );
        h.assert_consistent();
    }


    #[test]
    fn test_snapshot_reflects_state() {
        let mut h = Harness::new( &[ "m/one.mp3", "m/two.wav" ] );
        h.session.next().unwrap();
        h.session.set_volume( 0.5 );

        let snap = h.session.snapshot();
        assert_eq!( snap.tracks, vec![ "one.mp3".to_string(), "two.wav".to_string() ] );
        assert_eq!( snap.current_index, 1 );
        assert_eq!( snap.current_name(), Some( "two.wav" ) );
        assert_eq!( snap.status, PlaybackStatus::Playing );
        assert_eq!( snap.volume, 0.5 );
        assert!( !snap.is_loading );
        assert_eq!( snap.music_dir, PathBuf::from( "m" ) );
        assert_eq!( snap.extensions, vec![ "mp3".to_string(), "wav".to_string() ] );
    }


    #[test]
    fn test_drop_releases_sound() {
        let mut h = Harness::new( &[ "m/a.mp3" ] );
        h.session.toggle_play_pause().unwrap();
        let engine = h.engine.clone();

        drop( h );
        assert_eq!( engine.live_sounds(), 0 );
    }
}
