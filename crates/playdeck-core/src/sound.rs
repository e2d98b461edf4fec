//! The sound currently bound to the session

use crate::engine::{ EngineError, Sound };
use crate::track::TrackRef;


/// A loaded engine sound together with the catalog entry it was loaded for.
///
/// The index is the catalog position at the time of binding. It is only
/// meaningful against the catalog that produced it.
pub struct ActiveSound<S: Sound> {
    sound: S,
    index: usize,
    track: TrackRef,
}


impl<S: Sound> ActiveSound<S> {
    /// Binds a freshly loaded sound to catalog entry `index`.
    pub fn bind( sound: S, index: usize, track: TrackRef ) -> Self {
        Self { sound, index, track }
    }


    pub fn index( &self ) -> usize {
        self.index
    }


    pub fn track( &self ) -> &TrackRef {
        &self.track
    }


    /// Returns true if this sound was loaded for `track` at `index`.
    pub fn is_bound_to( &self, index: usize, track: &TrackRef ) -> bool {
        self.index == index && self.track == *track
    }


    pub fn start( &mut self ) -> Result<(), EngineError> {
        self.sound.start()
    }


    pub fn stop( &mut self ) -> Result<(), EngineError> {
        self.sound.stop()
    }


    pub fn set_volume( &mut self, volume: f32 ) {
        self.sound.set_volume( volume );
    }


    pub fn is_playing( &self ) -> bool {
        self.sound.is_playing()
    }


    /// Stops output and frees the engine resource.
    pub fn release( mut self ) {
        if let Err( e ) = self.sound.stop() {
            tracing::debug!( "Stopping {} before release failed: {}", self.track, e );
        }
        tracing::debug!( "Released sound for {}", self.track );
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::engine::AudioEngine;
    use crate::mock::MockEngine;


    #[test]
    fn test_binding_matches_index_and_track() {
        let mut engine = MockEngine::new();
        let track = TrackRef::from( "m/a.mp3" );
        let sound = engine.load_streaming( track.path() ).unwrap();
        let active = ActiveSound::bind( sound, 2, track.clone() );

        assert_eq!( active.index(), 2 );
        assert!( active.is_bound_to( 2, &track ) );
        assert!( !active.is_bound_to( 1, &track ) );
        assert!( !active.is_bound_to( 2, &TrackRef::from( "m/b.mp3" ) ) );
    }


    #[test]
    fn test_release_frees_engine_resource() {
        let mut engine = MockEngine::new();
        let track = TrackRef::from( "m/a.mp3" );
        let sound = engine.load_streaming( track.path() ).unwrap();
        let mut active = ActiveSound::bind( sound, 0, track );
        active.start().unwrap();
        assert!( active.is_playing() );
        assert_eq!( engine.live_sounds(), 1 );

        active.release();
        assert_eq!( engine.live_sounds(), 0 );
    }
}
