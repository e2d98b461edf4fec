//! Command-line argument parsing for Playdeck.

use std::path::PathBuf;

use clap::Parser;


/// Playdeck - plays every track in a music directory from the terminal.
#[derive( Parser, Debug, Default )]
#[command( name = "playdeck" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Music directory to scan (defaults to the saved setting, then ./music/).
    #[arg( short, long )]
    pub dir: Option<PathBuf>,

    /// Initial volume in percent.
    #[arg( short, long, value_parser = clap::value_parser!( u8 ).range( 0..=100 ) )]
    pub volume: Option<u8>,

    /// Log file (defaults to playdeck.log in the local data directory).
    #[arg( long )]
    pub log_file: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "playdeck_core=trace". RUST_LOG takes precedence.
    #[arg( long, default_value = "info" )]
    pub log_level: String,

    /// Write the effective settings back to the settings file.
    #[arg( long )]
    pub save_settings: bool,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_overrides() {
        let args = Args::parse_from([ "playdeck", "--dir", "/srv/music", "-v", "40", "--save-settings" ]);
        assert_eq!( args.dir, Some( PathBuf::from( "/srv/music" ) ) );
        assert_eq!( args.volume, Some( 40 ) );
        assert!( args.save_settings );
        assert_eq!( args.log_level, "info" );
    }


    #[test]
    fn test_volume_out_of_range_is_rejected() {
        assert!( Args::try_parse_from([ "playdeck", "--volume", "150" ]).is_err() );
    }
}
