//! Shell command parsing.
//!
//! Each input line of the `cadence` shell is parsed into a [`Command`].
//! Arguments are whitespace separated; double quotes group words so that
//! playlist names and paths may contain spaces.

use std::path::PathBuf;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed shell command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    /// Resume or start the queue, or play song `index` (1-based) of the library
    Play { index: Option<usize> },
    Pause,
    Stop,
    Next,
    Prev,
    VolumeUp,
    VolumeDown,
    Volume { level: u32 },
    Repeat,

    // Queue commands
    Queue,
    Insert { path: PathBuf },
    Remove { path: PathBuf },

    // Library and playlist commands
    Songs,
    Playlist( PlaylistCommand ),
    /// Toggle a track in Favorites; the current track when no path is given
    Favorite { path: Option<PathBuf> },

    Status,
    Help,
    Quit,
}


/// `pl` subcommands.
#[derive( Debug, Clone, PartialEq )]
pub enum PlaylistCommand {
    List,
    Show { name: String },
    Create { name: String },
    Delete { name: String },
    Rename { old: String, new: String },
    Add { name: String, path: PathBuf },
    Remove { name: String, path: PathBuf },
    /// Play playlist `name` from track `index` (1-based)
    Play { name: String, index: Option<usize> },
}


impl Command {
    /// Parses one input line.
    ///
    /// @param input - The command line to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let args = split_args( input )?;
        let mut args = args.into_iter();
        let cmd = args.next().unwrap_or_default().to_lowercase();
        let rest: Vec<String> = args.collect();

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => {
                let index = rest.first().map( |s| parse_index( s ) ).transpose()?;
                Ok( Command::Play { index } )
            }
            "pause" | "pa" => Ok( Command::Pause ),
            "stop" | "st" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "vol+" | "+" => Ok( Command::VolumeUp ),
            "vol-" | "-" => Ok( Command::VolumeDown ),
            "vol" | "volume" => {
                let level = required( &rest, 0, "volume level" )?;
                let level: u32 = level.parse()
                    .ok()
                    .filter( |l| *l <= 100 )
                    .ok_or_else( || CommandError::InvalidArgument(
                        format!( "Volume must be 0-100, got '{}'", level )
                    ))?;
                Ok( Command::Volume { level } )
            }
            "repeat" | "rep" => Ok( Command::Repeat ),

            // Queue commands
            "queue" | "q" => Ok( Command::Queue ),
            "insert" | "ins" => {
                let path = required( &rest, 0, "path" )?;
                Ok( Command::Insert { path: PathBuf::from( path ) } )
            }
            "remove" | "rm" => {
                let path = required( &rest, 0, "path" )?;
                Ok( Command::Remove { path: PathBuf::from( path ) } )
            }

            // Library and playlist commands
            "songs" | "ls" => Ok( Command::Songs ),
            "pl" | "playlist" => Ok( Command::Playlist( PlaylistCommand::parse( &rest )? ) ),
            "fav" | "favorite" => Ok( Command::Favorite { path: rest.first().map( PathBuf::from ) } ),

            "status" | "s" => Ok( Command::Status ),
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


impl PlaylistCommand {
    fn parse( args: &[String] ) -> Result<Self, CommandError> {
        let sub = args.first().map( |s| s.to_lowercase() ).unwrap_or_default();
        let name = || required( args, 1, "playlist name" ).map( str::to_string );

        match sub.as_str() {
            "" | "list" | "ls" => Ok( PlaylistCommand::List ),
            "show" => Ok( PlaylistCommand::Show { name: name()? } ),
            "create" | "new" => Ok( PlaylistCommand::Create { name: name()? } ),
            "delete" | "del" => Ok( PlaylistCommand::Delete { name: name()? } ),
            "rename" | "mv" => {
                let new = required( args, 2, "new name" )?.to_string();
                Ok( PlaylistCommand::Rename { old: name()?, new } )
            }
            "add" => {
                let path = PathBuf::from( required( args, 2, "path" )? );
                Ok( PlaylistCommand::Add { name: name()?, path } )
            }
            "rm" | "remove" => {
                let path = PathBuf::from( required( args, 2, "path" )? );
                Ok( PlaylistCommand::Remove { name: name()?, path } )
            }
            "play" => {
                let index = args.get( 2 ).map( |s| parse_index( s ) ).transpose()?;
                Ok( PlaylistCommand::Play { name: name()?, index } )
            }
            other => Err( CommandError::Unknown( format!( "pl {}", other ) ) ),
        }
    }
}


fn required<'a>( args: &'a [String], at: usize, what: &str ) -> Result<&'a str, CommandError> {
    args.get( at )
        .map( String::as_str )
        .ok_or_else( || CommandError::MissingArgument( what.into() ) )
}


/// Parses a 1-based index.
fn parse_index( s: &str ) -> Result<usize, CommandError> {
    s.parse::<usize>()
        .ok()
        .filter( |i| *i > 0 )
        .ok_or_else( || CommandError::InvalidArgument( format!( "Invalid index: {}", s ) ) )
}


/// Splits a line on whitespace, keeping double-quoted runs together.
fn split_args( input: &str ) -> Result<Vec<String>, CommandError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.trim().chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push( std::mem::take( &mut current ) );
                    has_token = false;
                }
            }
            c => {
                current.push( c );
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err( CommandError::InvalidArgument( "Unterminated quote".into() ) );
    }
    if has_token {
        args.push( current );
    }

    Ok( args )
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback Commands:
  play [n]                Resume/start queue, or play library song n
  pause                   Pause playback
  stop                    Stop playback
  next                    Next track
  prev                    Previous track
  vol+ / vol-             Volume up / down
  vol <0-100>             Set volume
  repeat                  Cycle repeat mode (all -> one -> shuffle)

Queue Commands:
  queue                   Show queue
  insert <path>           Play track next
  remove <path>           Remove track from queue

Library Commands:
  songs                   List library
  fav [path]              Toggle favorite (default: current track)
  pl [list]               List playlists
  pl show <name>          Show playlist tracks
  pl create <name>        Create empty playlist
  pl delete <name>        Delete playlist
  pl rename <old> <new>   Rename playlist
  pl add <name> <path>    Add track to playlist
  pl rm <name> <path>     Remove track from playlist
  pl play <name> [n]      Play playlist from track n

Other Commands:
  status                  Show playback status
  help                    Show this help
  quit                    Exit cadence

Quote names or paths containing spaces: pl add "Road Trip" "/music/a b.mp3""#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::Play { index: None } );
        assert_eq!( Command::parse( "p 3" ).unwrap(), Command::Play { index: Some( 3 ) } );
    }


    #[test]
    fn test_parse_play_zero_index() {
        let result = Command::parse( "play 0" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 40" ).unwrap(), Command::Volume { level: 40 } );
        assert_eq!( Command::parse( "vol+" ).unwrap(), Command::VolumeUp );
        assert_eq!( Command::parse( "-" ).unwrap(), Command::VolumeDown );
    }


    #[test]
    fn test_parse_volume_out_of_range() {
        let result = Command::parse( "vol 101" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_insert_quoted_path() {
        let cmd = Command::parse( r#"insert "/music/my song.mp3""# ).unwrap();
        assert_eq!( cmd, Command::Insert { path: PathBuf::from( "/music/my song.mp3" ) } );
    }


    #[test]
    fn test_parse_playlist_rename() {
        let cmd = Command::parse( r#"pl rename "Road Trip" Drive"# ).unwrap();
        assert_eq!( cmd, Command::Playlist( PlaylistCommand::Rename {
            old: "Road Trip".into(),
            new: "Drive".into(),
        }));
    }


    #[test]
    fn test_parse_playlist_list_default() {
        assert_eq!( Command::parse( "pl" ).unwrap(), Command::Playlist( PlaylistCommand::List ) );
    }


    #[test]
    fn test_parse_playlist_play() {
        let cmd = Command::parse( "pl play Mix 2" ).unwrap();
        assert_eq!( cmd, Command::Playlist( PlaylistCommand::Play { name: "Mix".into(), index: Some( 2 ) } ) );
    }


    #[test]
    fn test_parse_playlist_missing_path() {
        let result = Command::parse( "pl add Mix" );
        assert_eq!( result, Err( CommandError::MissingArgument( "path".into() ) ) );
    }


    #[test]
    fn test_parse_favorite() {
        assert_eq!( Command::parse( "fav" ).unwrap(), Command::Favorite { path: None } );
        assert_eq!(
            Command::parse( "fav a.mp3" ).unwrap(),
            Command::Favorite { path: Some( PathBuf::from( "a.mp3" ) ) },
        );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_empty() {
        assert!( matches!( Command::parse( "   " ), Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_unterminated_quote() {
        let result = Command::parse( r#"insert "/music/a"# );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_split_args_empty_quotes() {
        assert_eq!( split_args( r#"pl create """# ).unwrap(), vec![ "pl", "create", "" ] );
    }
}
