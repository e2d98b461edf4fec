//! Log file setup
//!
//! The terminal belongs to the TUI, so log output goes to a file.

use std::fs::{ self, File, OpenOptions };
use std::path::{ Path, PathBuf };
use std::sync::Mutex;

use anyhow::{ Context, Result };
use tracing_subscriber::EnvFilter;


/// Default log file: `<data_local_dir>/playdeck/playdeck.log`, or the
/// working directory if there is no data directory.
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .map( |p| p.join( "playdeck" ) )
        .unwrap_or_else( || PathBuf::from( "." ) )
        .join( "playdeck.log" )
}


/// Builds the event filter. `RUST_LOG` wins over `fallback`.
fn filter( fallback: &str ) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else( |_| EnvFilter::try_new( fallback ) )
        .unwrap_or_else( |_| EnvFilter::new( "info" ) )
}


fn open_log( path: &Path ) -> Result<File> {
    if let Some( parent ) = path.parent() {
        fs::create_dir_all( parent )
            .with_context( || format!( "Failed to create log directory {:?}", parent ) )?;
    }
    OpenOptions::new()
        .create( true )
        .append( true )
        .open( path )
        .with_context( || format!( "Failed to open log file {:?}", path ) )
}


/// Installs the global subscriber writing to `path`.
pub fn init( path: &Path, level: &str ) -> Result<()> {
    let file = open_log( path )?;

    tracing_subscriber::fmt()
        .with_env_filter( filter( level ) )
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .with_target( true )
        .try_init()
        .map_err( |e| anyhow::anyhow!( "Failed to install log subscriber: {}", e ) )?;

    tracing::info!( "Logging to {:?}", path );
    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_open_log_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "a" ).join( "b" ).join( "playdeck.log" );

        open_log( &path ).unwrap();
        assert!( path.is_file() );
    }


    #[test]
    fn test_default_log_path_file_name() {
        assert_eq!( default_log_path().file_name().and_then( |n| n.to_str() ), Some( "playdeck.log" ) );
    }
}
