//! Scripted engine and in-memory filesystem for tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::{ Path, PathBuf };
use std::rc::Rc;
use std::sync::{ Condvar, Mutex };
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::thread;
use std::time::{ Duration, Instant };

use crate::engine::{ AudioEngine, EndCallback, EngineError, Sound };
use crate::scanner::{ FileEntry, FileSystem, ScanError };


/// Calls `poll` until it yields a value. Panics after five seconds.
pub fn wait_for<T>( mut poll: impl FnMut() -> Option<T> ) -> T {
    let deadline = Instant::now() + Duration::from_secs( 5 );
    loop {
        if let Some( value ) = poll() {
            return value;
        }
        assert!( Instant::now() < deadline, "timed out waiting for condition" );
        thread::sleep( Duration::from_millis( 2 ) );
    }
}


struct SoundRecord {
    path: PathBuf,
    playing: bool,
    finished: bool,
    volume: Option<f32>,
    released: bool,
    callback: Option<EndCallback>,
}


#[derive( Default )]
struct EngineState {
    sounds: Vec<SoundRecord>,
    failing: HashSet<PathBuf>,
    live: usize,
    max_live: usize,
}


/// Engine that records what the session asks of it.
///
/// Clones share state, so a test can keep one while the session owns another.
#[derive( Clone, Default )]
pub struct MockEngine {
    state: Rc<RefCell<EngineState>>,
}


impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }


    /// Makes every future load of `path` fail.
    pub fn fail_on( &self, path: &str ) {
        self.state.borrow_mut().failing.insert( PathBuf::from( path ) );
    }


    /// Number of sounds loaded and not yet released.
    pub fn live_sounds( &self ) -> usize {
        self.state.borrow().live
    }


    /// Highest number of sounds ever alive at once.
    pub fn max_live_sounds( &self ) -> usize {
        self.state.borrow().max_live
    }


    /// Paths of every successful load, in order.
    pub fn loads( &self ) -> Vec<PathBuf> {
        self.state.borrow().sounds.iter().map( |s| s.path.clone() ).collect()
    }


    fn with_live<T>( &self, f: impl FnOnce( &mut SoundRecord ) -> T ) -> Option<T> {
        let mut state = self.state.borrow_mut();
        state.sounds.iter_mut().rev().find( |s| !s.released ).map( f )
    }


    /// Volume last applied to the live sound.
    pub fn live_volume( &self ) -> Option<f32> {
        self.with_live( |s| s.volume ).flatten()
    }


    /// Whether the live sound is producing output.
    pub fn live_playing( &self ) -> bool {
        self.with_live( |s| s.playing ).unwrap_or( false )
    }


    /// Path of the live sound.
    pub fn live_path( &self ) -> Option<PathBuf> {
        self.with_live( |s| s.path.clone() )
    }


    /// Plays the live sound to its end and runs its end callback, the way
    /// the audio thread would.
    pub fn finish_live( &self ) {
        self.with_live( |s| {
            s.playing = false;
            s.finished = true;
            s.fire_if_finished();
        });
    }
}


impl SoundRecord {
    fn fire_if_finished( &self ) {
        if let ( true, Some( callback ) ) = ( self.finished, self.callback.as_ref() ) {
            callback();
        }
    }
}


impl AudioEngine for MockEngine {
    type Sound = MockSound;

    fn load_streaming( &mut self, path: &Path ) -> Result<MockSound, EngineError> {
        let mut state = self.state.borrow_mut();
        if state.failing.contains( path ) {
            return Err( EngineError::Load( format!( "cannot decode {}", path.display() ) ) );
        }

        state.sounds.push( SoundRecord {
            path: path.to_path_buf(),
            playing: false,
            finished: false,
            volume: None,
            released: false,
            callback: None,
        });
        state.live += 1;
        state.max_live = state.max_live.max( state.live );

        Ok( MockSound {
            id: state.sounds.len() - 1,
            state: Rc::clone( &self.state ),
        })
    }
}


pub struct MockSound {
    id: usize,
    state: Rc<RefCell<EngineState>>,
}


impl MockSound {
    fn with<T>( &self, f: impl FnOnce( &mut SoundRecord ) -> T ) -> T {
        f( &mut self.state.borrow_mut().sounds[ self.id ] )
    }
}


impl Sound for MockSound {
    fn start( &mut self ) -> Result<(), EngineError> {
        // Like the stream engine, restarting a finished sound reports the end again
        self.with( |s| {
            s.playing = !s.finished;
            s.fire_if_finished();
        });
        Ok(())
    }


    fn stop( &mut self ) -> Result<(), EngineError> {
        self.with( |s| s.playing = false );
        Ok(())
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.with( |s| s.volume = Some( volume ) );
    }


    fn is_playing( &self ) -> bool {
        self.with( |s| s.playing )
    }


    fn on_end( &mut self, callback: EndCallback ) {
        self.with( |s| {
            if s.callback.is_none() {
                s.callback = Some( callback );
                s.fire_if_finished();
            }
        });
    }
}


impl Drop for MockSound {
    fn drop( &mut self ) {
        let mut state = self.state.borrow_mut();
        let record = &mut state.sounds[ self.id ];
        record.released = true;
        record.playing = false;
        record.callback = None;
        state.live -= 1;
    }
}


/// Flat in-memory directory. Every listed path is treated as a file in
/// the scanned directory.
#[derive( Default )]
pub struct MemoryFileSystem {
    files: Mutex<Vec<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
    dir_missing: AtomicBool,
    held: Mutex<bool>,
    released: Condvar,
    listings: AtomicUsize,
}


impl MemoryFileSystem {
    pub fn new<'a>( files: impl IntoIterator<Item = &'a str> ) -> Self {
        let fs = Self::default();
        fs.set_files( files );
        fs
    }


    /// Replaces the directory contents seen by later scans.
    pub fn set_files<'a>( &self, files: impl IntoIterator<Item = &'a str> ) {
        *self.files.lock().unwrap() = files.into_iter().map( PathBuf::from ).collect();
    }


    /// Makes the entry for `path` unreadable.
    pub fn fail_entry( &self, path: &str ) {
        self.failing.lock().unwrap().insert( PathBuf::from( path ) );
    }


    /// Simulates a directory that can neither be found nor created.
    pub fn set_dir_missing( &self, missing: bool ) {
        self.dir_missing.store( missing, Ordering::SeqCst );
    }


    /// Makes listings block until `release` is called.
    pub fn hold( &self ) {
        *self.held.lock().unwrap() = true;
    }


    pub fn release( &self ) {
        *self.held.lock().unwrap() = false;
        self.released.notify_all();
    }


    /// Number of listings started so far.
    pub fn listings( &self ) -> usize {
        self.listings.load( Ordering::SeqCst )
    }
}


impl FileSystem for MemoryFileSystem {
    fn ensure_dir( &self, _dir: &Path ) -> bool {
        !self.dir_missing.load( Ordering::SeqCst )
    }


    fn list( &self, _dir: &Path ) -> Result<Vec<Result<FileEntry, ScanError>>, ScanError> {
        self.listings.fetch_add( 1, Ordering::SeqCst );

        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.released.wait( held ).unwrap();
        }
        drop( held );

        let failing = self.failing.lock().unwrap();
        Ok( self.files
            .lock()
            .unwrap()
            .iter()
            .map( |path| {
                if failing.contains( path ) {
                    Err( ScanError::Io( io::Error::other( "unreadable entry" ) ) )
                } else {
                    Ok( FileEntry { path: path.clone(), is_file: true } )
                }
            })
            .collect() )
    }
}
