//! End-of-track signalling from the audio thread
//!
//! The engine reports "the current sound finished" from its own thread.
//! The only thing that thread does is raise a flag; the control loop takes
//! it once per tick and decides what to do.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };


/// Single pending "track ended" event shared with the audio thread.
///
/// Raising it twice before it is taken still yields one event. The flag
/// carries no payload: the session knows which track is current.
#[derive( Debug, Clone, Default )]
pub struct EndOfTrackSignal {
    ended: Arc<AtomicBool>,
}


impl EndOfTrackSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }


    /// Marks the current sound as finished. Safe to call from any thread.
    pub fn raise( &self ) {
        self.ended.store( true, Ordering::Release );
    }


    /// Reads and clears the flag in one step.
    pub fn take( &self ) -> bool {
        self.ended.swap( false, Ordering::AcqRel )
    }


    /// Returns true if an event is pending, without clearing it.
    pub fn is_raised( &self ) -> bool {
        self.ended.load( Ordering::Acquire )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::thread;


    #[test]
    fn test_take_clears() {
        let signal = EndOfTrackSignal::new();
        signal.raise();
        assert!( signal.take() );
        assert!( !signal.take() );
    }


    #[test]
    fn test_multiple_raises_collapse() {
        let signal = EndOfTrackSignal::new();
        signal.raise();
        signal.raise();
        assert!( signal.take() );
        assert!( !signal.is_raised() );
    }


    #[test]
    fn test_raise_from_other_thread() {
        let signal = EndOfTrackSignal::new();
        let remote = signal.clone();
        thread::spawn( move || remote.raise() ).join().unwrap();
        assert!( signal.take() );
    }
}
