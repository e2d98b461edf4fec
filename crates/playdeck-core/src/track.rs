//! Track identifiers
//!
//! A `TrackRef` names one playable file. It is produced by a catalog scan
//! and never changes afterwards.

use std::fmt;
use std::hash::{ Hash, Hasher };
use std::path::{ Path, PathBuf };


/// Identifier for one playable item, as discovered on disk.
///
/// Equality is an exact match on the path text: `./music/a.mp3` and
/// `music/a.mp3` are different tracks. This is what reconciliation after a
/// rescan relies on.
#[derive( Debug, Clone )]
pub struct TrackRef( PathBuf );


impl TrackRef {
    /// Creates a track reference from a path.
    pub fn new( path: impl Into<PathBuf> ) -> Self {
        Self( path.into() )
    }


    /// Gets the path of the track.
    pub fn path( &self ) -> &Path {
        &self.0
    }


    /// Returns the name shown to the user: the file name, or the whole
    /// path if it has none.
    pub fn display_name( &self ) -> String {
        self.0
            .file_name()
            .map( |n| n.to_string_lossy().into_owned() )
            .unwrap_or_else( || self.0.to_string_lossy().into_owned() )
    }
}


impl PartialEq for TrackRef {
    fn eq( &self, other: &Self ) -> bool {
        // PathBuf equality compares components, which would treat
        // "a//b.mp3" and "a/b.mp3" as the same track.
        self.0.as_os_str() == other.0.as_os_str()
    }
}

impl Eq for TrackRef {}

impl Hash for TrackRef {
    fn hash<H: Hasher>( &self, state: &mut H ) {
        self.0.as_os_str().hash( state );
    }
}


impl fmt::Display for TrackRef {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        write!( f, "{}", self.0.display() )
    }
}


impl From<&str> for TrackRef {
    fn from( s: &str ) -> Self {
        Self::new( s )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_equality_is_exact_text() {
        assert_eq!( TrackRef::from( "music/a.mp3" ), TrackRef::from( "music/a.mp3" ) );
        assert_ne!( TrackRef::from( "music//a.mp3" ), TrackRef::from( "music/a.mp3" ) );
        assert_ne!( TrackRef::from( "./music/a.mp3" ), TrackRef::from( "music/a.mp3" ) );
    }


    #[test]
    fn test_display_name_is_file_name() {
        assert_eq!( TrackRef::from( "./music/Song One.mp3" ).display_name(), "Song One.mp3" );
    }


    #[test]
    fn test_display_name_without_file_name() {
        assert_eq!( TrackRef::from( ".." ).display_name(), ".." );
    }
}
