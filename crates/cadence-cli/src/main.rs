//! Cadence CLI - Command-line music player

mod cli;
mod settings;
mod shell;

use std::io::{ self, BufRead, Write };
use std::sync::Arc;

use anyhow::{ Context, Result };
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cadence_core::{ Catalog, CpalSink, Engine, LibraryScanner, PlaylistStore };

use cli::Args;
use settings::Settings;
use shell::Shell;


fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else( |_| EnvFilter::new( args.log_level() ) );
    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( io::stderr )
        .init();

    let settings_path = args.settings.clone().or_else( Settings::default_path );
    let settings = settings_path.as_deref()
        .map( Settings::load_or_init )
        .unwrap_or_default();

    // Command-line flags override settings
    let scanner = match args.media_dir.clone().or( settings.media_dir.clone() ) {
        Some( dir ) => LibraryScanner::new( dir ),
        None => LibraryScanner::from_default_dir()?,
    };
    tracing::info!( "Media directory: {:?}", scanner.root() );

    let playlists_path = args.playlists.clone()
        .or( settings.playlists_file.clone() )
        .or_else( PlaylistStore::default_path )
        .context( "No playlist location; pass --playlists" )?;
    let store = PlaylistStore::open( playlists_path )?;

    let sink = CpalSink::new().context( "Failed to open audio output" )?;
    let catalog: Arc<dyn Catalog> = Arc::new( scanner );
    let engine = Engine::new( Box::new( sink ), Arc::clone( &catalog ), settings.engine_config() );

    let mut shell = Shell::new( engine, store, catalog, io::stdout() );
    match shell.refresh_library() {
        Ok( count ) => println!( "{} tracks in library. Type 'help' for commands.", count ),
        Err( e ) => eprintln!( "Failed to scan library: {}", e ),
    }

    let stdin = io::stdin();
    loop {
        print!( "> " );
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line( &mut line )? == 0 {
            break;
        }
        if !shell.execute( &line ) {
            break;
        }
    }

    Ok(())
}
