//! Catalog scanning
//!
//! Discovers playable files in the music directory. Scans run off the
//! control thread (see `refresh`); nothing here touches session state.

use std::fs;
use std::io;
use std::path::{ Path, PathBuf };
use std::sync::Arc;

use thiserror::Error;

use crate::track::TrackRef;


/// Directory scanned when nothing else is configured.
pub const DEFAULT_MUSIC_DIR: &str = "./music/";

/// Extensions accepted when nothing else is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[ "mp3", "wav" ];


/// Errors raised while listing a directory.
///
/// These never leave the scanner: they are logged and the scan carries on
/// with whatever it already has.
#[derive( Debug, Error )]
pub enum ScanError {
    #[error( "IO error: {0}" )]
    Io( #[from] io::Error ),

    #[error( "Access denied: {0}" )]
    AccessDenied( PathBuf ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),
}


/// One entry returned by a directory listing.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct FileEntry {
    pub path: PathBuf,
    pub is_file: bool,
}


impl FileEntry {
    /// Lower-cased extension of the entry, if it has one.
    pub fn extension( &self ) -> Option<String> {
        self.path
            .extension()
            .and_then( |e| e.to_str() )
            .map( |e| e.to_lowercase() )
    }
}


/// Filesystem operations the scanner needs.
pub trait FileSystem: Send + Sync {
    /// Makes sure `dir` exists, creating it if needed.
    ///
    /// Returns false if the directory is missing and could not be created.
    fn ensure_dir( &self, dir: &Path ) -> bool;

    /// Lists the direct children of `dir`, in the order the platform
    /// returns them. Individual entries may fail without failing the listing.
    fn list( &self, dir: &Path ) -> Result<Vec<Result<FileEntry, ScanError>>, ScanError>;
}


/// The local disk.
#[derive( Debug, Clone, Copy, Default )]
pub struct LocalFileSystem;


impl FileSystem for LocalFileSystem {
    fn ensure_dir( &self, dir: &Path ) -> bool {
        if dir.is_dir() {
            return true;
        }

        tracing::warn!( "Music directory {:?} does not exist. Creating it.", dir );
        match fs::create_dir_all( dir ) {
            Ok(()) => true,
            Err( e ) => {
                tracing::error!( "Failed to create music directory {:?}: {}", dir, e );
                false
            }
        }
    }


    fn list( &self, dir: &Path ) -> Result<Vec<Result<FileEntry, ScanError>>, ScanError> {
        let entries = match fs::read_dir( dir ) {
            Ok( e ) => e,
            Err( e ) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err( ScanError::AccessDenied( dir.to_path_buf() ) );
            }
            Err( e ) if e.kind() == io::ErrorKind::NotFound => {
                return Err( ScanError::NotFound( dir.to_path_buf() ) );
            }
            Err( e ) => return Err( ScanError::Io( e ) ),
        };

        Ok( entries
            .map( |entry| {
                let path = entry?.path();
                // is_file follows symlinks, so a link to a song counts
                let is_file = path.is_file();
                Ok( FileEntry { path, is_file } )
            })
            .collect() )
    }
}


/// Where and what to scan.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct ScanConfig {
    pub dir: PathBuf,
    /// Playable extensions, without the leading dot. Matched case-insensitively.
    pub extensions: Vec<String>,
}


impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from( DEFAULT_MUSIC_DIR ),
            extensions: DEFAULT_EXTENSIONS.iter().map( |e| e.to_string() ).collect(),
        }
    }
}


/// Stateless worker producing a fresh track list from one directory.
///
/// Cheap to clone, so a copy can be moved onto the scan thread.
#[derive( Clone )]
pub struct CatalogScanner {
    config: ScanConfig,
    fs: Arc<dyn FileSystem>,
}


impl CatalogScanner {
    /// Creates a scanner over the local disk.
    pub fn new( config: ScanConfig ) -> Self {
        Self::with_filesystem( config, Arc::new( LocalFileSystem ) )
    }


    /// Creates a scanner over an arbitrary filesystem.
    pub fn with_filesystem( mut config: ScanConfig, fs: Arc<dyn FileSystem> ) -> Self {
        for ext in config.extensions.iter_mut() {
            *ext = ext.trim_start_matches( '.' ).to_lowercase();
        }
        Self { config, fs }
    }


    /// Gets the scanned directory.
    pub fn dir( &self ) -> &Path {
        &self.config.dir
    }


    /// Gets the accepted extensions.
    pub fn extensions( &self ) -> &[String] {
        &self.config.extensions
    }


    /// Scans the directory and returns the playable tracks in discovery order.
    ///
    /// Never fails: a directory that cannot be created or read gives an
    /// empty list, and unreadable entries are skipped.
    pub fn scan( &self ) -> Vec<TrackRef> {
        let dir = &self.config.dir;
        let mut tracks = Vec::new();

        if !self.fs.ensure_dir( dir ) {
            return tracks;
        }

        tracing::info!( "Scanning: {:?}", dir );

        let entries = match self.fs.list( dir ) {
            Ok( entries ) => entries,
            Err( e ) => {
                tracing::error!( "Filesystem error while reading music directory: {}", e );
                return tracks;
            }
        };

        for entry in entries {
            match entry {
                Ok( entry ) if entry.is_file && self.is_playable( &entry ) => {
                    tracing::info!( "Found track: {}", entry.path.display() );
                    tracks.push( TrackRef::new( entry.path ) );
                }
                Ok( _ ) => {}
                Err( e ) => {
                    tracing::warn!( "Skipping unreadable entry in {:?}: {}", dir, e );
                }
            }
        }

        if tracks.is_empty() {
            tracing::warn!( "No audio files found in {:?}", dir );
        } else {
            tracing::info!( "Found {} tracks", tracks.len() );
        }

        tracks
    }


    fn is_playable( &self, entry: &FileEntry ) -> bool {
        entry.extension()
            .map( |e| self.config.extensions.iter().any( |x| *x == e ) )
            .unwrap_or( false )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::mock::MemoryFileSystem;


    fn scanner_for( dir: &Path ) -> CatalogScanner {
        CatalogScanner::new( ScanConfig {
            dir: dir.to_path_buf(),
            ..ScanConfig::default()
        })
    }


    #[test]
    fn test_filters_by_extension_case_insensitive() {
        let fs = Arc::new( MemoryFileSystem::new( [
            "m/a.mp3",
            "m/b.WAV",
            "m/c.flac",
            "m/readme",
            "m/d.Mp3",
        ]));
        let scanner = CatalogScanner::with_filesystem(
            ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() },
            fs,
        );

        let tracks = scanner.scan();
        let names: Vec<_> = tracks.iter().map( |t| t.to_string() ).collect();
        assert_eq!( names, vec![ "m/a.mp3", "m/b.WAV", "m/d.Mp3" ] );
    }


    #[test]
    fn test_keeps_discovery_order() {
        let fs = Arc::new( MemoryFileSystem::new( [ "m/z.mp3", "m/a.mp3", "m/k.wav" ] ) );
        let scanner = CatalogScanner::with_filesystem(
            ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() },
            fs,
        );

        let names: Vec<_> = scanner.scan().iter().map( |t| t.display_name() ).collect();
        assert_eq!( names, vec![ "z.mp3", "a.mp3", "k.wav" ] );
    }


    #[test]
    fn test_configured_extensions_are_normalised() {
        let fs = Arc::new( MemoryFileSystem::new( [ "m/a.mp3", "m/b.ogg" ] ) );
        let scanner = CatalogScanner::with_filesystem(
            ScanConfig { dir: PathBuf::from( "m" ), extensions: vec![ ".OGG".into() ] },
            fs,
        );

        assert_eq!( scanner.extensions(), &[ "ogg".to_string() ] );
        assert_eq!( scanner.scan(), vec![ TrackRef::from( "m/b.ogg" ) ] );
    }


    #[test]
    fn test_broken_entries_are_skipped() {
        let fs = Arc::new( MemoryFileSystem::new( [ "m/a.mp3", "m/b.mp3" ] ) );
        fs.fail_entry( "m/a.mp3" );
        let scanner = CatalogScanner::with_filesystem(
            ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() },
            fs,
        );

        assert_eq!( scanner.scan(), vec![ TrackRef::from( "m/b.mp3" ) ] );
    }


    #[test]
    fn test_uncreatable_directory_gives_empty_list() {
        let fs = Arc::new( MemoryFileSystem::new( [ "m/a.mp3" ] ) );
        fs.set_dir_missing( true );
        let scanner = CatalogScanner::with_filesystem(
            ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() },
            fs,
        );

        assert!( scanner.scan().is_empty() );
    }


    #[test]
    fn test_local_scan_skips_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write( tmp.path().join( "one.mp3" ), b"" ).unwrap();
        fs::write( tmp.path().join( "two.txt" ), b"" ).unwrap();
        fs::create_dir( tmp.path().join( "folder.mp3" ) ).unwrap();

        let tracks = scanner_for( tmp.path() ).scan();
        assert_eq!( tracks, vec![ TrackRef::new( tmp.path().join( "one.mp3" ) ) ] );
    }


    #[test]
    fn test_local_scan_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join( "music" );

        let tracks = scanner_for( &dir ).scan();
        assert!( tracks.is_empty() );
        assert!( dir.is_dir() );
    }


    #[test]
    fn test_local_scan_uncreatable_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join( "file" );
        fs::write( &blocker, b"" ).unwrap();

        // A directory cannot be created below a regular file
        let tracks = scanner_for( &blocker.join( "music" ) ).scan();
        assert!( tracks.is_empty() );
    }
}
