//! Background catalog refresh
//!
//! A refresh runs the scanner on its own thread and hands the result back
//! through a channel that the control loop polls once per tick. Only one
//! scan may be in flight; there is no cancellation and no timeout.

use std::mem;
use std::sync::mpsc::{ self, Receiver, TryRecvError };
use std::thread;

use crate::scanner::CatalogScanner;
use crate::track::TrackRef;


/// What the session was doing when the refresh was requested.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Capture {
    /// Track at the current index, if the catalog was not empty.
    pub track: Option<TrackRef>,
    pub was_playing: bool,
}


/// A finished scan waiting to be applied to the session.
#[derive( Debug )]
pub struct CompletedScan {
    pub tracks: Vec<TrackRef>,
    pub capture: Capture,
}


/// Where the coordinator is in its cycle.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum RefreshPhase {
    Idle,
    Scanning,
    PendingApply,
}


enum RefreshState {
    Idle,
    Scanning {
        result: Receiver<Vec<TrackRef>>,
        capture: Capture,
    },
    PendingApply( CompletedScan ),
}


/// Owns the in-flight scan and the capture taken when it started.
pub struct RefreshCoordinator {
    scanner: CatalogScanner,
    state: RefreshState,
}


impl RefreshCoordinator {
    pub fn new( scanner: CatalogScanner ) -> Self {
        Self {
            scanner,
            state: RefreshState::Idle,
        }
    }


    pub fn scanner( &self ) -> &CatalogScanner {
        &self.scanner
    }


    pub fn phase( &self ) -> RefreshPhase {
        match self.state {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::Scanning { .. } => RefreshPhase::Scanning,
            RefreshState::PendingApply( _ ) => RefreshPhase::PendingApply,
        }
    }


    /// Returns true from `begin` until the result has been handed out by `poll`.
    pub fn is_busy( &self ) -> bool {
        self.phase() != RefreshPhase::Idle
    }


    /// Starts a scan on a background thread.
    ///
    /// Returns false, and does nothing, if a scan is already in flight.
    pub fn begin( &mut self, capture: Capture ) -> bool {
        if self.is_busy() {
            return false;
        }

        let ( tx, rx ) = mpsc::channel();
        let scanner = self.scanner.clone();
        let spawned = thread::Builder::new()
            .name( "playdeck-scan".into() )
            .spawn( move || {
                let tracks = scanner.scan();
                // The receiver is gone if the session shut down mid-scan
                let _ = tx.send( tracks );
            });

        if let Err( e ) = spawned {
            // The sender went down with the closure, so the next poll
            // sees a disconnected channel and applies an empty catalog.
            tracing::error!( "Failed to start catalog scan: {}", e );
        }

        self.state = RefreshState::Scanning { result: rx, capture };
        true
    }


    /// Checks, without blocking, whether the scan has finished.
    ///
    /// Hands out the finished scan exactly once and returns to idle.
    pub fn poll( &mut self ) -> Option<CompletedScan> {
        if let RefreshState::Scanning { result, capture } = &mut self.state {
            let tracks = match result.try_recv() {
                Ok( tracks ) => tracks,
                Err( TryRecvError::Empty ) => return None,
                Err( TryRecvError::Disconnected ) => {
                    tracing::error!( "Catalog scan ended without a result" );
                    Vec::new()
                }
            };
            let capture = mem::take( capture );
            self.state = RefreshState::PendingApply( CompletedScan { tracks, capture } );
        }

        match mem::replace( &mut self.state, RefreshState::Idle ) {
            RefreshState::PendingApply( done ) => Some( done ),
            other => {
                self.state = other;
                None
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::path::{ Path, PathBuf };
    use std::sync::Arc;

    use crate::mock::{ wait_for, MemoryFileSystem };
    use crate::scanner::{ FileEntry, FileSystem, ScanConfig, ScanError };


    fn coordinator( fs: Arc<MemoryFileSystem> ) -> RefreshCoordinator {
        let config = ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() };
        RefreshCoordinator::new( CatalogScanner::with_filesystem( config, fs ) )
    }


    #[test]
    fn test_poll_when_idle() {
        let mut refresh = coordinator( Arc::new( MemoryFileSystem::new( [] ) ) );
        assert_eq!( refresh.phase(), RefreshPhase::Idle );
        assert!( refresh.poll().is_none() );
    }


    #[test]
    fn test_scan_result_is_handed_out_once() {
        let fs = Arc::new( MemoryFileSystem::new( [ "m/a.mp3", "m/b.mp3" ] ) );
        let mut refresh = coordinator( fs );
        let capture = Capture { track: Some( TrackRef::from( "m/b.mp3" ) ), was_playing: true };

        assert!( refresh.begin( capture.clone() ) );
        assert!( refresh.is_busy() );

        let done = wait_for( || refresh.poll() );
        assert_eq!( done.tracks, vec![ TrackRef::from( "m/a.mp3" ), TrackRef::from( "m/b.mp3" ) ] );
        assert_eq!( done.capture, capture );
        assert_eq!( refresh.phase(), RefreshPhase::Idle );
        assert!( refresh.poll().is_none() );
    }


    #[test]
    fn test_second_begin_is_ignored_while_scanning() {
        let fs = Arc::new( MemoryFileSystem::new( [ "m/a.mp3" ] ) );
        fs.hold();
        let mut refresh = coordinator( Arc::clone( &fs ) );

        assert!( refresh.begin( Capture::default() ) );
        wait_for( || ( fs.listings() == 1 ).then_some( () ) );

        let second = Capture { track: Some( TrackRef::from( "m/a.mp3" ) ), was_playing: true };
        assert!( !refresh.begin( second ) );
        assert!( refresh.poll().is_none() );
        assert_eq!( refresh.phase(), RefreshPhase::Scanning );

        fs.release();
        let done = wait_for( || refresh.poll() );
        assert_eq!( done.capture, Capture::default() );
        assert_eq!( fs.listings(), 1 );
    }


    struct PanickingFileSystem;

    impl FileSystem for PanickingFileSystem {
        fn ensure_dir( &self, _dir: &Path ) -> bool {
            true
        }

        fn list( &self, _dir: &Path ) -> Result<Vec<Result<FileEntry, ScanError>>, ScanError> {
            panic!( "listing blew up" );
        }
    }


    #[test]
    fn test_dead_scan_thread_yields_empty_catalog() {
        let config = ScanConfig { dir: PathBuf::from( "m" ), ..ScanConfig::default() };
        let scanner = CatalogScanner::with_filesystem( config, Arc::new( PanickingFileSystem ) );
        let mut refresh = RefreshCoordinator::new( scanner );

        refresh.begin( Capture::default() );
        let done = wait_for( || refresh.poll() );
        assert!( done.tracks.is_empty() );
    }
}
