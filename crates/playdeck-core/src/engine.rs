//! Audio engine capability
//!
//! The session drives playback through these traits only. `StreamingEngine`
//! in `stream` is the real implementation; tests use a scripted one.

use std::path::Path;

use thiserror::Error;


/// Errors reported by an audio engine.
#[derive( Debug, Error )]
pub enum EngineError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to load file: {0}" )]
    Load( String ),

    #[error( "Audio output error: {0}" )]
    Output( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),
}


/// Callback run by the engine, on its own thread, when a sound reaches its end.
pub type EndCallback = Box<dyn Fn() + Send + Sync + 'static>;


/// A source of playable sounds.
pub trait AudioEngine {
    type Sound: Sound;

    /// Opens `path` for streaming playback. The sound starts silent; call
    /// `Sound::start` to hear it.
    fn load_streaming( &mut self, path: &Path ) -> Result<Self::Sound, EngineError>;
}


/// One loaded, streaming sound. Dropping it releases the native resource.
pub trait Sound {
    /// Starts or resumes output from the current position.
    fn start( &mut self ) -> Result<(), EngineError>;

    /// Stops output, keeping the position.
    fn stop( &mut self ) -> Result<(), EngineError>;

    /// Sets the gain, 0.0 to 1.0.
    fn set_volume( &mut self, volume: f32 );

    /// Returns true while output is running and the end has not been reached.
    fn is_playing( &self ) -> bool;

    /// Registers the end-of-track callback. Only the first registration is kept.
    fn on_end( &mut self, callback: EndCallback );
}
