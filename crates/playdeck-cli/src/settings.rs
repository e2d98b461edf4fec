//! Application settings management
//!
//! Persistent settings live in `<config_dir>/playdeck/settings.json`.
//! Missing keys fall back to their defaults, and command-line flags win
//! over anything on disk.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };

use playdeck_core::{ ScanConfig, SessionConfig, DEFAULT_EXTENSIONS, DEFAULT_MUSIC_DIR };

use crate::cli::Args;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Directory scanned for tracks
    pub music_dir: PathBuf,

    /// Playable file extensions, compared case-insensitively
    pub extensions: Vec<String>,

    /// Startup volume, 0.0 to 1.0
    pub volume: f32,

    /// Frame interval in milliseconds
    pub tick_ms: u64,

    /// Volume change per +/- key press
    pub volume_step: f32,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from( DEFAULT_MUSIC_DIR ),
            extensions: DEFAULT_EXTENSIONS.iter().map( |e| e.to_string() ).collect(),
            volume: 1.0,
            tick_ms: 16,
            volume_step: 0.05,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "playdeck" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Self::default(),
        }
    }


    fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let contents = match fs::read_to_string( path ) {
            Ok( contents ) => contents,
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                return Self::default();
            }
        };

        match serde_json::from_str::<Settings>( &contents ) {
            Ok( settings ) => settings.sanitized(),
            Err( e ) => {
                tracing::warn!( "Invalid settings file {:?}, using defaults: {}", path, e );
                Self::default()
            }
        }
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        if let Some( path ) = Self::settings_path() {
            self.save_to( &path );
        }
    }


    fn save_to( &self, path: &Path ) {
        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Applies command-line overrides.
    pub fn merge_args( mut self, args: &Args ) -> Self {
        if let Some( dir ) = &args.dir {
            self.music_dir = dir.clone();
        }
        if let Some( volume ) = args.volume {
            self.volume = f32::from( volume ) / 100.0;
        }
        self.sanitized()
    }


    fn sanitized( mut self ) -> Self {
        self.volume = if self.volume.is_nan() { 1.0 } else { self.volume.clamp( 0.0, 1.0 ) };
        self.volume_step = if self.volume_step.is_nan() { 0.05 } else { self.volume_step.clamp( 0.01, 1.0 ) };
        self.tick_ms = self.tick_ms.clamp( 1, 1000 );
        if self.extensions.is_empty() {
            self.extensions = Self::default().extensions;
        }
        self
    }


    /// Builds the core session configuration.
    pub fn session_config( &self ) -> SessionConfig {
        SessionConfig {
            scan: ScanConfig {
                dir: self.music_dir.clone(),
                extensions: self.extensions.clone(),
            },
            volume: self.volume,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{ Arc, Mutex };


    #[test]
    fn test_missing_keys_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "music_dir": "/srv/music", "volume": 0.5 }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.music_dir, PathBuf::from( "/srv/music" ) );
        assert_eq!( settings.volume, 0.5 );
        assert_eq!( settings.extensions, vec![ "mp3".to_string(), "wav".to_string() ] );
        assert_eq!( settings.tick_ms, 16 );
    }


    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }


    /// Log sink shared with the test body.
    #[derive( Clone, Default )]
    struct LogBuffer( Arc<Mutex<Vec<u8>>> );

    impl io::Write for LogBuffer {
        fn write( &mut self, buf: &[u8] ) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice( buf );
            Ok( buf.len() )
        }

        fn flush( &mut self ) -> io::Result<()> {
            Ok(())
        }
    }


    #[test]
    fn test_invalid_file_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "{ volume" ).unwrap();

        let logs = LogBuffer::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer( move || sink.clone() )
            .with_ansi( false )
            .finish();
        tracing::subscriber::with_default( subscriber, || Settings::load_from( &path ) );

        let output = String::from_utf8( logs.0.lock().unwrap().clone() ).unwrap();
        assert!( output.contains( "WARN" ), "{output}" );
        assert!( output.contains( "Invalid settings file" ), "{output}" );
    }


    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );
        let settings = Settings { volume: 0.25, tick_ms: 33, ..Settings::default() };

        settings.save_to( &path );
        assert_eq!( Settings::load_from( &path ), settings );
    }


    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "volume": 3.0, "tick_ms": 0, "extensions": [] }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.volume, 1.0 );
        assert_eq!( settings.tick_ms, 1 );
        assert_eq!( settings.extensions, Settings::default().extensions );
    }


    #[test]
    fn test_args_override_settings() {
        let args = Args {
            dir: Some( PathBuf::from( "/tmp/tracks" ) ),
            volume: Some( 30 ),
            ..Args::default()
        };
        let settings = Settings::default().merge_args( &args );

        let config = settings.session_config();
        assert_eq!( config.scan.dir, PathBuf::from( "/tmp/tracks" ) );
        assert!( ( config.volume - 0.3 ).abs() < f32::EPSILON );
    }
}
