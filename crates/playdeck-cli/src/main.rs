//! Playdeck CLI - Terminal UI music player

mod cli;
mod input;
mod logging;
mod settings;

use std::io::{ self, Stdout };
use std::time::{ Duration, Instant };

use anyhow::{ Context, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{ Block, Borders, List, ListItem, ListState, Paragraph, Wrap },
};

use cli::Args;
use input::{ CommandLine, InputMode };
use settings::Settings;

use playdeck_core::{
    command,
    Command, PlaybackSession, PlaybackStatus, SessionError, SessionSnapshot, StreamingEngine,
};


/// Application state.
struct App {
    session: PlaybackSession<StreamingEngine>,
    settings: Settings,
    should_quit: bool,
    show_help: bool,

    // Input state
    input_mode: InputMode,
    command_line: CommandLine,

    list_state: ListState,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,
}


impl App {
    /// Opens the audio device and starts the first catalog scan.
    fn new( settings: Settings ) -> Result<Self> {
        let engine = StreamingEngine::new().context( "Failed to initialize audio engine" )?;
        let session = PlaybackSession::new( engine, settings.session_config() );
        tracing::info!( "Playdeck started, music directory {:?}", session.music_dir() );

        Ok( Self {
            session,
            settings,
            should_quit: false,
            show_help: false,
            input_mode: InputMode::Normal,
            command_line: CommandLine::new(),
            list_state: ListState::default(),
            status_message: None,
            status_clear_at: None,
        })
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Shows a failed transition in the status bar. It is already logged.
    fn report( &mut self, result: Result<(), SessionError> ) {
        if let Err( e ) = result {
            self.set_status( e.to_string() );
        }
    }


    /// Advances the session and clears expired messages.
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        let result = self.session.tick();
        self.report( result );
    }


    fn handle_key( &mut self, code: KeyCode ) {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( code ),
            InputMode::Command => self.handle_command_key( code ),
        }
    }


    fn handle_normal_key( &mut self, code: KeyCode ) {
        if self.show_help && matches!( code, KeyCode::Esc | KeyCode::Char( '?' ) ) {
            self.show_help = false;
            return;
        }

        match code {
            KeyCode::Char( ' ' ) => {
                let result = self.session.toggle_play_pause();
                self.report( result );
            }
            KeyCode::Char( 'n' ) | KeyCode::Right => {
                let result = self.session.next();
                self.report( result );
            }
            KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => self.step_volume( self.settings.volume_step ),
            KeyCode::Char( '-' ) => self.step_volume( -self.settings.volume_step ),
            KeyCode::Char( 'r' ) => self.refresh(),
            KeyCode::Char( '?' ) => self.show_help = true,
            KeyCode::Char( '/' ) => {
                self.input_mode = InputMode::Command;
                self.command_line.take();
            }
            KeyCode::Char( 'q' ) | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }


    fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let input = self.command_line.take();
                self.input_mode = InputMode::Normal;
                self.execute_command( &input );
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.command_line.take();
            }
            KeyCode::Backspace => {
                if self.command_line.is_empty() {
                    self.input_mode = InputMode::Normal;
                } else {
                    self.command_line.backspace();
                }
            }
            KeyCode::Delete => self.command_line.delete(),
            KeyCode::Left => self.command_line.move_left(),
            KeyCode::Right => self.command_line.move_right(),
            KeyCode::Home => self.command_line.move_home(),
            KeyCode::End => self.command_line.move_end(),
            KeyCode::Char( c ) => self.command_line.insert( c ),
            _ => {}
        }
    }


    fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => self.run_command( cmd ),
            Err( e ) => self.set_status( e.to_string() ),
        }
    }


    fn run_command( &mut self, cmd: Command ) {
        match cmd {
            Command::Toggle => {
                let result = self.session.toggle_play_pause();
                self.report( result );
            }
            Command::Next => {
                let result = self.session.next();
                self.report( result );
            }
            Command::Volume { level: Some( level ) } => {
                self.session.set_volume( level as f32 / 100.0 );
                self.set_status( format!( "Volume: {}%", level ) );
            }
            Command::Volume { level: None } => {
                let pct = ( self.session.volume() * 100.0 ).round() as u32;
                self.set_status( format!( "Volume: {}%", pct ) );
            }
            Command::Refresh => self.refresh(),
            Command::Help => self.show_help = true,
            Command::Quit => self.should_quit = true,
        }
    }


    fn step_volume( &mut self, delta: f32 ) {
        self.session.set_volume( self.session.volume() + delta );
        let pct = ( self.session.volume() * 100.0 ).round() as u32;
        self.set_status( format!( "Volume: {}%", pct ) );
    }


    fn refresh( &mut self ) {
        if self.session.is_loading() {
            self.set_status( "Scan already in progress" );
            return;
        }
        self.session.request_refresh();
    }
}


type Term = Terminal<CrosstermBackend<Stdout>>;


fn main() -> Result<()> {
    let args = Args::parse();

    let log_path = args.log_file.clone().unwrap_or_else( logging::default_log_path );
    if let Err( e ) = logging::init( &log_path, &args.log_level ) {
        eprintln!( "warning: logging disabled: {:#}", e );
    }

    let settings = Settings::load().merge_args( &args );

    if args.save_settings {
        settings.save();
        tracing::info!( "Settings saved" );
    }

    let tick = Duration::from_millis( settings.tick_ms );
    let mut app = App::new( settings )?;

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let result = run( &mut terminal, &mut app, tick );

    tracing::info!( "Cleaning up resources." );
    drop( app );

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;
    terminal.show_cursor()?;

    tracing::info!( "Application terminated." );
    result
}


/// Frame loop: tick, then input, then draw.
fn run( terminal: &mut Term, app: &mut App, tick: Duration ) -> Result<()> {
    loop {
        app.tick();

        if event::poll( tick )? {
            if let Event::Key( key ) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key( key.code );
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }

        terminal.draw( |frame| draw_ui( frame, app ) )?;
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    let snapshot = app.session.snapshot();
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Track list
            Constraint::Length( 4 ),  // Now playing
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( area );

    let header = Paragraph::new( format!( "  PLAYDECK - {}", snapshot.music_dir.display() ) )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[0] );

    if app.show_help {
        draw_help( frame, chunks[1] );
    } else if snapshot.tracks.is_empty() {
        draw_empty( frame, &snapshot, chunks[1] );
    } else {
        draw_tracks( frame, &snapshot, &mut app.list_state, chunks[1] );
    }

    draw_now_playing( frame, &snapshot, chunks[2] );
    draw_status_bar( frame, app, chunks[3] );
}


fn scanning_line( snapshot: &SessionSnapshot ) -> String {
    format!( "Scanning {}…", snapshot.music_dir.display() )
}


fn draw_tracks( frame: &mut Frame, snapshot: &SessionSnapshot, state: &mut ListState, area: Rect ) {
    let items: Vec<ListItem> = snapshot.tracks
        .iter()
        .enumerate()
        .map( |( i, name )| {
            let marker = match snapshot.status {
                _ if i != snapshot.current_index => "  ",
                PlaybackStatus::Playing => "▶ ",
                PlaybackStatus::Paused => "⏸ ",
                PlaybackStatus::Stopped => "  ",
            };
            ListItem::new( format!( "{}{}", marker, name ) )
        })
        .collect();

    let title = if snapshot.is_loading {
        format!( " Tracks ({}) - {} ", snapshot.tracks.len(), scanning_line( snapshot ) )
    } else {
        format!( " Tracks ({}) ", snapshot.tracks.len() )
    };

    state.select( Some( snapshot.current_index ) );

    let list = List::new( items )
        .block( Block::default().title( title ).borders( Borders::ALL ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) )
        .highlight_symbol( ">> " );

    frame.render_stateful_widget( list, area, state );
}


fn draw_empty( frame: &mut Frame, snapshot: &SessionSnapshot, area: Rect ) {
    let lines = if snapshot.is_loading {
        vec![ Line::from( scanning_line( snapshot ) ) ]
    } else {
        let kinds = snapshot.extensions
            .iter()
            .map( |e| e.to_uppercase() )
            .collect::<Vec<_>>()
            .join( " or " );
        vec![
            Line::from( format!( "No tracks found in {}", snapshot.music_dir.display() ) ),
            Line::from( format!( "Please add {} files to that directory.", kinds ) ),
        ]
    };

    let message = Paragraph::new( lines )
        .style( Style::default().fg( Color::Gray ) )
        .block( Block::default().title( " Tracks " ).borders( Borders::ALL ) )
        .wrap( Wrap { trim: false } );
    frame.render_widget( message, area );
}


fn draw_help( frame: &mut Frame, area: Rect ) {
    let help = Paragraph::new( command::help_text() )
        .block( Block::default()
            .title( " Help (? or Esc to close) " )
            .borders( Borders::ALL )
        )
        .wrap( Wrap { trim: false } );

    frame.render_widget( help, area );
}


fn draw_now_playing( frame: &mut Frame, snapshot: &SessionSnapshot, area: Rect ) {
    let ( symbol, label ) = match snapshot.status {
        PlaybackStatus::Playing => ( "▶", "Playing" ),
        PlaybackStatus::Paused => ( "⏸", "Paused" ),
        PlaybackStatus::Stopped => ( "■", "Stopped" ),
    };
    let title = snapshot.current_name().unwrap_or( "No track" );

    let width = 20;
    let filled = ( snapshot.volume * width as f32 ).round() as usize;
    let bar = format!( "[{}{}]", "█".repeat( filled ), "░".repeat( width - filled.min( width ) ) );
    let vol_pct = ( snapshot.volume * 100.0 ).round() as u32;

    let lines = vec![
        Line::from( Span::styled( format!( " {} {}  {}", symbol, label, title ), Style::default().bold() ) ),
        Line::from( format!( " Vol {} {}%", bar, vol_pct ) ),
    ];

    let now_playing = Paragraph::new( lines )
        .block( Block::default().title( " Now Playing " ).borders( Borders::ALL ) );

    frame.render_widget( now_playing, area );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command => {
            ( format!( "/{}", app.command_line.text() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Normal => {
            if let Some( ref msg ) = app.status_message {
                ( msg.clone(), Style::default().fg( Color::Green ) )
            } else {
                let hint = " [Space]Play/Pause [n]Next [+/-]Volume [r]Rescan [/]Cmd [?]Help [q]Quit ";
                ( hint.to_string(), Style::default().fg( Color::DarkGray ) )
            }
        }
    };

    let status = Paragraph::new( text ).style( style );
    frame.render_widget( status, area );

    // Show cursor in command mode
    if app.input_mode == InputMode::Command {
        let cursor_x = area.x + 1 + app.command_line.cursor() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}
