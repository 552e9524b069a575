//! Command-line argument parsing for Cadence.

use std::path::PathBuf;

use clap::Parser;


/// Cadence - A command-line music player.
#[derive( Parser, Debug )]
#[command( name = "cadence" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Media directory to scan for tracks.
    #[arg( short, long )]
    pub media_dir: Option<PathBuf>,

    /// Playlist file to use instead of the default.
    #[arg( short, long )]
    pub playlists: Option<PathBuf>,

    /// Settings file to use instead of the default.
    #[arg( short, long )]
    pub settings: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg( short, long, action = clap::ArgAction::Count )]
    pub verbose: u8,
}


impl Args {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_level( &self ) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([ "cadence", "--media-dir", "/music", "-vv" ]);
        assert_eq!( args.media_dir, Some( PathBuf::from( "/music" ) ) );
        assert_eq!( args.log_level(), "debug" );
        assert!( args.playlists.is_none() );
    }


    #[test]
    fn test_default_log_level() {
        let args = Args::parse_from([ "cadence" ]);
        assert_eq!( args.log_level(), "warn" );
    }
}
