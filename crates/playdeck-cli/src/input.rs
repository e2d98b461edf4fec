//! Keyboard input state for the TUI.


/// Whether keys drive playback or are typed into the command line.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    #[default]
    Normal,
    Command,
}


/// Text typed after `/`, edited at a cursor counted in characters.
#[derive( Debug, Default )]
pub struct CommandLine {
    chars: Vec<char>,
    cursor: usize,
}


impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn insert( &mut self, c: char ) {
        self.chars.insert( self.cursor, c );
        self.cursor += 1;
    }


    /// Removes the character left of the cursor.
    pub fn backspace( &mut self ) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove( self.cursor );
        }
    }


    /// Removes the character under the cursor.
    pub fn delete( &mut self ) {
        if self.cursor < self.chars.len() {
            self.chars.remove( self.cursor );
        }
    }


    /// Empties the line and returns what was typed.
    pub fn take( &mut self ) -> String {
        self.cursor = 0;
        self.chars.drain( .. ).collect()
    }


    pub fn text( &self ) -> String {
        self.chars.iter().collect()
    }


    pub fn cursor( &self ) -> usize {
        self.cursor
    }


    pub fn move_left( &mut self ) {
        self.cursor = self.cursor.saturating_sub( 1 );
    }


    pub fn move_right( &mut self ) {
        self.cursor = ( self.cursor + 1 ).min( self.chars.len() );
    }


    pub fn move_home( &mut self ) {
        self.cursor = 0;
    }


    pub fn move_end( &mut self ) {
        self.cursor = self.chars.len();
    }


    pub fn is_empty( &self ) -> bool {
        self.chars.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( text: &str ) -> CommandLine {
        let mut line = CommandLine::new();
        text.chars().for_each( |c| line.insert( c ) );
        line
    }


    #[test]
    fn test_backspace_removes_whole_character() {
        let mut line = typed( "vol é" );
        assert_eq!( line.cursor(), 5 );

        line.backspace();
        assert_eq!( line.text(), "vol " );
        assert_eq!( line.cursor(), 4 );
    }


    #[test]
    fn test_edit_in_the_middle() {
        let mut line = typed( "nxt" );
        line.move_home();
        line.move_right();
        line.insert( 'e' );
        assert_eq!( line.text(), "next" );

        line.move_end();
        line.move_left();
        line.delete();
        assert_eq!( line.text(), "nex" );
    }


    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut line = typed( "q" );
        line.move_right();
        line.move_right();
        assert_eq!( line.cursor(), 1 );
        line.move_home();
        line.move_left();
        line.backspace();
        assert_eq!( line.cursor(), 0 );
        assert_eq!( line.text(), "q" );
    }


    #[test]
    fn test_take_empties_line() {
        let mut line = typed( "quit" );
        assert_eq!( line.take(), "quit" );
        assert!( line.is_empty() );
        assert_eq!( line.cursor(), 0 );
    }
}
