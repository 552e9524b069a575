//! Application settings management
//!
//! Persistent settings for the media directory, the playlist file, and the
//! engine tunables.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use cadence_core::EngineConfig;
use serde::{ Deserialize, Serialize };


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Directory scanned for tracks; the user's audio directory when unset
    pub media_dir: Option<PathBuf>,

    /// Playlist file; the user's data directory when unset
    pub playlists_file: Option<PathBuf>,

    /// Volume at start-up (0.0 to 1.0)
    pub initial_volume: f32,

    /// Completion watcher poll interval
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for a superseded watcher
    pub watcher_join_timeout_ms: u64,

    /// Stop playback when the playing track is removed from the queue
    pub stop_on_remove_current: bool,
}


impl Default for Settings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            media_dir: None,
            playlists_file: None,
            initial_volume: engine.initial_volume,
            poll_interval_ms: engine.poll_interval.as_millis() as u64,
            watcher_join_timeout_ms: engine.watcher_join_timeout.as_millis() as u64,
            stop_on_remove_current: engine.stop_on_remove_current,
        }
    }
}


impl Settings {
    /// Returns the default path to the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "cadence" ).join( "settings.json" ) )
    }


    /// Loads settings from `path`, or returns defaults if missing or invalid.
    pub fn load( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_else( |e| {
                    tracing::warn!( "Ignoring malformed settings {:?}: {}", path, e );
                    Self::default()
                })
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Loads settings from `path`, writing the defaults there on first run.
    pub fn load_or_init( path: &Path ) -> Self {
        if path.exists() {
            return Self::load( path );
        }

        let settings = Self::default();
        tracing::info!( "Writing default settings to {:?}", path );
        settings.save( path );
        settings
    }


    /// Saves settings to `path`.
    pub fn save( &self, path: &Path ) {
        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Builds the engine configuration.
    pub fn engine_config( &self ) -> EngineConfig {
        EngineConfig {
            initial_volume: self.initial_volume,
            poll_interval: Duration::from_millis( self.poll_interval_ms.max( 1 ) ),
            watcher_join_timeout: Duration::from_millis( self.watcher_join_timeout_ms ),
            stop_on_remove_current: self.stop_on_remove_current,
            ..EngineConfig::default()
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load( &dir.path().join( "settings.json" ) );
        assert_eq!( settings, Settings::default() );
        assert_eq!( settings.engine_config(), EngineConfig::default() );
    }


    #[test]
    fn test_first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "cadence" ).join( "settings.json" );

        assert_eq!( Settings::load_or_init( &path ), Settings::default() );
        assert!( path.exists() );

        fs::write( &path, r#"{ "stop_on_remove_current": true }"# ).unwrap();
        assert!( Settings::load_or_init( &path ).stop_on_remove_current );
    }


    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );
        let settings = Settings {
            media_dir: Some( PathBuf::from( "/music" ) ),
            stop_on_remove_current: true,
            ..Settings::default()
        };

        settings.save( &path );
        assert_eq!( Settings::load( &path ), settings );
    }


    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "poll_interval_ms": 10 }"# ).unwrap();

        let config = Settings::load( &path ).engine_config();
        assert_eq!( config.poll_interval, Duration::from_millis( 10 ) );
        assert_eq!( config.initial_volume, 0.5 );
    }


    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "{" ).unwrap();

        assert_eq!( Settings::load( &path ), Settings::default() );
    }
}
