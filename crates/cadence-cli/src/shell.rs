//! Line-oriented command shell.
//!
//! Executes parsed [`Command`]s against the engine and the playlist store
//! and writes plain-text results.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ anyhow, Result };

use cadence_core::{
    command,
    Catalog, Command, Engine, PlaybackState, PlaylistCommand, PlaylistStore,
};


/// Shell state.
pub struct Shell<W: Write> {
    engine: Engine,
    store: PlaylistStore,
    catalog: Arc<dyn Catalog>,
    /// Library listing shown by `songs`, numbered from 1
    songs: Vec<PathBuf>,
    out: W,
}


impl<W: Write> Shell<W> {
    pub fn new( engine: Engine, store: PlaylistStore, catalog: Arc<dyn Catalog>, out: W ) -> Self {
        Self {
            engine,
            store,
            catalog,
            songs: Vec::new(),
            out,
        }
    }


    /// Rescans the library and queues all of it.
    pub fn refresh_library( &mut self ) -> Result<usize> {
        let count = self.engine.reload_catalog()?;
        self.songs = self.engine.snapshot().tracks;
        tracing::info!( "Library holds {} tracks", count );
        Ok( count )
    }


    /// Runs one input line. Returns false once the shell should exit.
    pub fn execute( &mut self, input: &str ) -> bool {
        if input.trim().is_empty() {
            return true;
        }

        let result = Command::parse( input )
            .map_err( anyhow::Error::from )
            .and_then( |cmd| self.run_command( cmd ) );

        match result {
            Ok( keep_running ) => keep_running,
            Err( e ) => {
                let _ = writeln!( self.out, "Error: {}", e );
                true
            }
        }
    }


    fn run_command( &mut self, cmd: Command ) -> Result<bool> {
        match cmd {
            // Playback commands
            Command::Play { index: None } => {
                self.engine.start()?;
                self.print_now_playing()?;
            }
            Command::Play { index: Some( n ) } => {
                self.engine.play_selection( self.songs.clone(), n - 1 )?;
                self.print_now_playing()?;
            }
            Command::Pause => {
                self.engine.pause();
                writeln!( self.out, "Paused" )?;
            }
            Command::Stop => {
                self.engine.stop();
                writeln!( self.out, "Stopped" )?;
            }
            Command::Next => {
                self.engine.next_song()?;
                self.print_now_playing()?;
            }
            Command::Prev => {
                self.engine.prev_song()?;
                self.print_now_playing()?;
            }
            Command::VolumeUp => {
                let volume = self.engine.volume_up();
                self.print_volume( volume )?;
            }
            Command::VolumeDown => {
                let volume = self.engine.volume_down();
                self.print_volume( volume )?;
            }
            Command::Volume { level } => {
                let volume = self.engine.set_volume( level as f32 / 100.0 );
                self.print_volume( volume )?;
            }
            Command::Repeat => {
                let mode = self.engine.cycle_repeat_mode()?;
                writeln!( self.out, "Repeat mode: {}", mode.name() )?;
            }

            // Queue commands
            Command::Queue => {
                let snapshot = self.engine.snapshot();
                for ( i, track ) in snapshot.tracks.iter().enumerate() {
                    let marker = if i == snapshot.position { ">" } else { " " };
                    writeln!( self.out, "{} {:>3}. {}", marker, i + 1, track.display() )?;
                }
                if snapshot.tracks.is_empty() {
                    writeln!( self.out, "Queue is empty" )?;
                }
            }
            Command::Insert { path } => {
                if self.engine.insert_next( path.clone() )? {
                    writeln!( self.out, "Playing next: {}", path.display() )?;
                } else {
                    writeln!( self.out, "Already queued: {}", path.display() )?;
                }
            }
            Command::Remove { path } => {
                self.engine.remove_from_queue( &path )?;
                writeln!( self.out, "Removed from queue: {}", path.display() )?;
            }

            // Library and playlist commands
            Command::Songs => {
                // Listing leaves the play queue alone
                self.songs = self.catalog.enumerate()?;
                for ( i, track ) in self.songs.iter().enumerate() {
                    writeln!( self.out, "{:>4}. {}", i + 1, track.display() )?;
                }
            }
            Command::Playlist( sub ) => self.run_playlist_command( sub )?,
            Command::Favorite { path } => {
                let track = match path {
                    Some( p ) => p,
                    None => self.engine.current_track()
                        .ok_or_else( || anyhow!( "No current track" ) )?,
                };
                let added = self.store.toggle_favorite( track.clone() )?;
                let verb = if added { "Added to" } else { "Removed from" };
                writeln!( self.out, "{} Favorites: {}", verb, track.display() )?;
            }

            Command::Status => {
                let snapshot = self.engine.snapshot();
                let state = match snapshot.state {
                    PlaybackState::Stopped => "Stopped",
                    PlaybackState::Playing => "Playing",
                    PlaybackState::Paused => "Paused",
                };
                writeln!( self.out, "{} | repeat: {} | volume: {}%",
                    state,
                    snapshot.repeat_mode.name(),
                    ( snapshot.volume * 100.0 ).round() as i32,
                )?;
                if let Some( track ) = snapshot.current() {
                    writeln!( self.out, "Track {}/{}: {}", snapshot.position + 1, snapshot.tracks.len(), track.display() )?;
                }
            }
            Command::Help => {
                writeln!( self.out, "{}", command::help_text() )?;
            }
            Command::Quit => return Ok( false ),
        }

        Ok( true )
    }


    fn run_playlist_command( &mut self, cmd: PlaylistCommand ) -> Result<()> {
        match cmd {
            PlaylistCommand::List => {
                for name in self.store.list_names() {
                    writeln!( self.out, "{} ({})", name, self.store.get_tracks( &name ).len() )?;
                }
            }
            PlaylistCommand::Show { name } => {
                if !self.store.contains( &name ) {
                    return Err( anyhow!( "Playlist '{}' not found", name ) );
                }
                for ( i, track ) in self.store.get_tracks( &name ).iter().enumerate() {
                    writeln!( self.out, "{:>4}. {}", i + 1, track.display() )?;
                }
            }
            PlaylistCommand::Create { name } => {
                self.store.create( &name, Vec::new() )?;
                writeln!( self.out, "Created playlist '{}'", name )?;
            }
            PlaylistCommand::Delete { name } => {
                self.store.delete( &name )?;
                writeln!( self.out, "Deleted playlist '{}'", name )?;
            }
            PlaylistCommand::Rename { old, new } => {
                self.store.rename( &old, &new )?;
                writeln!( self.out, "Renamed '{}' to '{}'", old, new )?;
            }
            PlaylistCommand::Add { name, path } => {
                if self.store.add_track( &name, path.clone() )? {
                    writeln!( self.out, "Added {} to '{}'", path.display(), name )?;
                } else {
                    writeln!( self.out, "Already in '{}'", name )?;
                }
            }
            PlaylistCommand::Remove { name, path } => {
                if self.store.remove_track( &name, &path )? {
                    writeln!( self.out, "Removed {} from '{}'", path.display(), name )?;
                } else {
                    writeln!( self.out, "Not in '{}'", name )?;
                }
            }
            PlaylistCommand::Play { name, index } => {
                let tracks = self.store.get_tracks( &name ).to_vec();
                self.engine.play_selection( tracks, index.unwrap_or( 1 ) - 1 )?;
                self.print_now_playing()?;
            }
        }

        Ok(())
    }


    fn print_now_playing( &mut self ) -> Result<()> {
        let snapshot = self.engine.snapshot();
        match ( snapshot.state, snapshot.current() ) {
            ( PlaybackState::Stopped, _ ) | ( _, None ) => writeln!( self.out, "Stopped" )?,
            ( state, Some( track ) ) => {
                let verb = if state == PlaybackState::Paused { "Paused" } else { "Playing" };
                writeln!( self.out, "{}: {}", verb, track.display() )?;
            }
        }
        Ok(())
    }


    fn print_volume( &mut self, volume: f32 ) -> Result<()> {
        writeln!( self.out, "Volume: {}%", ( volume * 100.0 ).round() as i32 )?;
        Ok(())
    }


    #[cfg( test )]
    fn output( &self ) -> &W {
        &self.out
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::path::Path;

    use cadence_core::output::OutputError;
    use cadence_core::{ EngineConfig, Sink, SinkEvent, StaticCatalog };


    /// Sink that accepts everything and never finishes.
    struct SilentSink;


    impl Sink for SilentSink {
        fn load( &mut self, _track: &Path ) -> Result<(), OutputError> {
            Ok(())
        }

        fn play( &mut self ) -> Result<(), OutputError> {
            Ok(())
        }

        fn pause( &mut self ) {}

        fn resume( &mut self ) {}

        fn stop( &mut self ) {}

        fn set_volume( &mut self, _volume: f32 ) {}

        fn poll_event( &mut self ) -> Option<SinkEvent> {
            None
        }
    }


    fn shell() -> ( tempfile::TempDir, Shell<Vec<u8>> ) {
        let dir = tempfile::tempdir().unwrap();
        let catalog: Arc<dyn Catalog> = Arc::new( StaticCatalog::new( vec![
            PathBuf::from( "a.mp3" ),
            PathBuf::from( "b.mp3" ),
        ]));
        let engine = Engine::new( Box::new( SilentSink ), Arc::clone( &catalog ), EngineConfig::default() );
        let store = PlaylistStore::open( dir.path().join( "playlists.json" ) ).unwrap();

        let mut shell = Shell::new( engine, store, catalog, Vec::new() );
        shell.refresh_library().unwrap();
        ( dir, shell )
    }


    fn text( shell: &Shell<Vec<u8>> ) -> String {
        String::from_utf8_lossy( shell.output() ).into_owned()
    }


    #[test]
    fn test_play_library_song() {
        let ( _dir, mut shell ) = shell();
        assert!( shell.execute( "play 2" ) );
        assert!( text( &shell ).contains( "Playing: b.mp3" ) );
    }


    #[test]
    fn test_errors_do_not_exit() {
        let ( _dir, mut shell ) = shell();
        assert!( shell.execute( "bogus" ) );
        assert!( shell.execute( "play 9" ) );
        assert!( shell.execute( "pl rename Favorites X" ) );
        assert_eq!( text( &shell ).matches( "Error:" ).count(), 3 );
    }


    #[test]
    fn test_songs_keeps_queue_position() {
        let ( _dir, mut shell ) = shell();
        shell.execute( "play 2" );
        shell.execute( "songs" );
        shell.execute( "status" );

        let out = text( &shell );
        assert!( out.contains( "   2. b.mp3" ) );
        assert!( out.contains( "Track 2/2: b.mp3" ) );
    }


    #[test]
    fn test_quit() {
        let ( _dir, mut shell ) = shell();
        assert!( !shell.execute( "quit" ) );
    }


    #[test]
    fn test_favorite_current_track() {
        let ( _dir, mut shell ) = shell();
        shell.execute( "play" );
        shell.execute( "fav" );
        assert!( text( &shell ).contains( "Added to Favorites: a.mp3" ) );
    }


    #[test]
    fn test_playlist_round_trip() {
        let ( _dir, mut shell ) = shell();
        shell.execute( "pl create Mix" );
        shell.execute( "pl add Mix b.mp3" );
        shell.execute( "pl play Mix" );
        assert!( text( &shell ).contains( "Playing: b.mp3" ) );
    }
}
