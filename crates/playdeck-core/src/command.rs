//! Command line parsing
//!
//! The TUI accepts typed commands after `/`. They map onto the same
//! session operations as the key bindings.

use thiserror::Error;


/// Errors that can occur while parsing a command.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed command.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Command {
    // Playback
    Toggle,
    Next,
    /// Volume in percent. `None` reports the current level.
    Volume { level: Option<u32> },

    // Catalog
    Refresh,

    // UI
    Help,
    Quit,
}


impl Command {
    /// Parses a command string (without the leading `/`).
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( str::trim ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            "play" | "pause" | "toggle" | "p" => Ok( Command::Toggle ),
            "next" | "n" => Ok( Command::Next ),
            "vol" | "volume" => {
                let level = args.map( parse_percent ).transpose()?;
                Ok( Command::Volume { level } )
            }
            "refresh" | "rescan" | "r" => Ok( Command::Refresh ),
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::MissingArgument( "command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a volume percentage, accepting an optional trailing `%`.
fn parse_percent( s: &str ) -> Result<u32, CommandError> {
    let digits = s.strip_suffix( '%' ).unwrap_or( s ).trim();
    let level: u32 = digits.parse()
        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid volume: '{}'. Use 0-100", s ) ) )?;
    if level > 100 {
        return Err( CommandError::InvalidArgument( format!( "Volume out of range: {}. Use 0-100", level ) ) );
    }
    Ok( level )
}


/// Returns help text listing keys and commands.
pub fn help_text() -> &'static str {
    r#"Keys:
  Space           Play / pause
  n, Right        Next track
  +, -            Volume up / down
  r               Rescan music directory
  /               Enter a command
  ?               Toggle this help
  q, Esc          Quit

Commands:
  /play, /pause   Play or pause          [Space]
  /next           Next track             [n]
  /vol [0-100]    Set volume             [+/-]
  /refresh        Rescan music directory [r]
  /help           Show this help         [?]
  /quit           Exit playdeck          [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_playback_aliases() {
        for input in [ "play", "pause", "toggle", "p", "  PLAY  " ] {
            assert_eq!( Command::parse( input ), Ok( Command::Toggle ), "{input}" );
        }
        assert_eq!( Command::parse( "n" ), Ok( Command::Next ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 40" ), Ok( Command::Volume { level: Some( 40 ) } ) );
        assert_eq!( Command::parse( "volume 75%" ), Ok( Command::Volume { level: Some( 75 ) } ) );
        assert_eq!( Command::parse( "vol" ), Ok( Command::Volume { level: None } ) );
    }


    #[test]
    fn test_parse_volume_rejects_bad_level() {
        assert!( matches!( Command::parse( "vol 101" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "vol loud" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "vol -5" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_refresh() {
        assert_eq!( Command::parse( "rescan" ), Ok( Command::Refresh ) );
        assert_eq!( Command::parse( "refresh" ), Ok( Command::Refresh ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "shuffle" );
        assert_eq!( result, Err( CommandError::Unknown( "shuffle".into() ) ) );
    }


    #[test]
    fn test_every_listed_command_parses() {
        let listed: Vec<&str> = help_text()
            .lines()
            .flat_map( |line| line.split_whitespace() )
            .filter_map( |word| word.strip_prefix( '/' ) )
            .map( |word| word.trim_end_matches( ',' ) )
            .filter( |word| !word.is_empty() )
            .collect();

        assert!( listed.len() >= 6 );
        for name in listed {
            assert!( Command::parse( name ).is_ok(), "/{name} is listed but does not parse" );
        }
    }


    #[test]
    fn test_parse_empty() {
        assert!( matches!( Command::parse( "   " ), Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
