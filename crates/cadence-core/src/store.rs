//! Playlist store
//!
//! Named track lists persisted as one JSON document. The whole document is
//! rewritten after every mutation. "Favorites" always exists and can be
//! neither deleted nor renamed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Name of the reserved playlist.
pub const FAVORITES: &str = "Favorites";


/// Returns true for names the mutation API may not delete or rename.
pub fn is_reserved( name: &str ) -> bool {
    name == FAVORITES
}


/// Errors that can occur with playlist operations.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "Playlist '{0}' is reserved" )]
    Reserved( String ),

    #[error( "Playlist '{0}' not found" )]
    NotFound( String ),

    #[error( "Playlist '{0}' already exists" )]
    AlreadyExists( String ),

    #[error( "Playlist name must not be blank" )]
    BlankName,

    #[error( "Failed to read {path:?}: {source}" )]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error( "Malformed playlist file {path:?}: {source}" )]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory change was applied but could not be saved.
    #[error( "Failed to save playlists to {path:?}: {source}" )]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}


/// Persisted name → tracks mapping.
#[derive( Debug )]
pub struct PlaylistStore {
    path: PathBuf,
    playlists: BTreeMap<String, Vec<PathBuf>>,
}


impl PlaylistStore {
    /// Opens the store at `path`. A missing file yields a store holding
    /// only an empty "Favorites".
    pub fn open( path: PathBuf ) -> Result<Self, StoreError> {
        let mut playlists: BTreeMap<String, Vec<PathBuf>> = match fs::read_to_string( &path ) {
            Ok( contents ) => serde_json::from_str( &contents )
                .map_err( |source| StoreError::Parse { path: path.clone(), source } )?,
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!( "No playlist file at {:?}, starting empty", path );
                BTreeMap::new()
            }
            Err( source ) => return Err( StoreError::Read { path, source } ),
        };

        playlists.entry( FAVORITES.to_string() ).or_default();
        tracing::debug!( "Loaded {} playlists from {:?}", playlists.len(), path );

        Ok( Self { path, playlists } )
    }


    /// Gets the default store location.
    /// Uses ~/.local/share/cadence/playlists.json on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "cadence" ).join( "playlists.json" ) )
    }


    /// Gets the backing file path.
    pub fn path( &self ) -> &Path {
        &self.path
    }


    /// Creates a playlist holding `tracks`.
    pub fn create( &mut self, name: &str, tracks: Vec<PathBuf> ) -> Result<(), StoreError> {
        let name = checked_name( name )?;
        if self.playlists.contains_key( name ) {
            return Err( StoreError::AlreadyExists( name.to_string() ) );
        }

        self.playlists.insert( name.to_string(), tracks );
        tracing::info!( "Created playlist '{}'", name );
        self.persist()
    }


    /// Deletes a playlist.
    pub fn delete( &mut self, name: &str ) -> Result<(), StoreError> {
        let name = normalized( name );
        Self::check_mutable( name )?;
        if self.playlists.remove( name ).is_none() {
            return Err( StoreError::NotFound( name.to_string() ) );
        }

        tracing::info!( "Deleted playlist '{}'", name );
        self.persist()
    }


    /// Renames playlist `old` to `new`.
    pub fn rename( &mut self, old: &str, new: &str ) -> Result<(), StoreError> {
        let old = normalized( old );
        Self::check_mutable( old )?;
        let new = checked_name( new )?;
        if !self.playlists.contains_key( old ) {
            return Err( StoreError::NotFound( old.to_string() ) );
        }
        if self.playlists.contains_key( new ) {
            return Err( StoreError::AlreadyExists( new.to_string() ) );
        }

        if let Some( tracks ) = self.playlists.remove( old ) {
            self.playlists.insert( new.to_string(), tracks );
        }
        tracing::info!( "Renamed playlist '{}' to '{}'", old, new );
        self.persist()
    }


    /// Appends `track` to a playlist, creating the playlist if needed.
    ///
    /// Returns false without saving when the track is already there.
    pub fn add_track( &mut self, name: &str, track: PathBuf ) -> Result<bool, StoreError> {
        let name = checked_name( name )?;
        let tracks = self.playlists.entry( name.to_string() ).or_default();
        if tracks.contains( &track ) {
            return Ok( false );
        }

        tracing::info!( "Added {:?} to '{}'", track, name );
        tracks.push( track );
        self.persist()?;
        Ok( true )
    }


    /// Removes `track` from a playlist.
    ///
    /// Returns false without saving when it was not there.
    pub fn remove_track( &mut self, name: &str, track: &Path ) -> Result<bool, StoreError> {
        let name = normalized( name );
        let Some( tracks ) = self.playlists.get_mut( name ) else {
            return Ok( false );
        };
        let Some( index ) = tracks.iter().position( |t| t == track ) else {
            return Ok( false );
        };

        tracks.remove( index );
        tracing::info!( "Removed {:?} from '{}'", track, name );
        self.persist()?;
        Ok( true )
    }


    /// Adds `track` to "Favorites", or removes it if already there.
    ///
    /// Returns whether the track is a favorite afterwards.
    pub fn toggle_favorite( &mut self, track: PathBuf ) -> Result<bool, StoreError> {
        if self.is_favorite( &track ) {
            self.remove_track( FAVORITES, &track )?;
            Ok( false )
        } else {
            self.add_track( FAVORITES, track )?;
            Ok( true )
        }
    }


    /// Returns true if `track` is in "Favorites".
    pub fn is_favorite( &self, track: &Path ) -> bool {
        self.get_tracks( FAVORITES ).iter().any( |t| t == track )
    }


    /// Lists playlist names, "Favorites" first and the rest by name.
    pub fn list_names( &self ) -> Vec<String> {
        let mut names = vec![ FAVORITES.to_string() ];
        names.extend( self.playlists.keys().filter( |n| !is_reserved( n ) ).cloned() );
        names
    }


    /// Gets the tracks of a playlist; empty for unknown names.
    pub fn get_tracks( &self, name: &str ) -> &[PathBuf] {
        self.playlists.get( normalized( name ) ).map( Vec::as_slice ).unwrap_or( &[] )
    }


    /// Returns true if a playlist called `name` exists.
    pub fn contains( &self, name: &str ) -> bool {
        self.playlists.contains_key( normalized( name ) )
    }


    fn check_mutable( name: &str ) -> Result<(), StoreError> {
        if is_reserved( name ) {
            tracing::warn!( "Rejected change to reserved playlist '{}'", name );
            return Err( StoreError::Reserved( name.to_string() ) );
        }
        Ok(())
    }


    /// Writes the whole mapping to disk.
    fn persist( &self ) -> Result<(), StoreError> {
        let to_error = |source: std::io::Error| StoreError::Persist { path: self.path.clone(), source };

        if let Some( parent ) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all( parent ).map_err( to_error )?;
            }
        }

        let json = serde_json::to_string_pretty( &self.playlists )
            .map_err( |e| to_error( e.into() ) )?;
        fs::write( &self.path, json ).map_err( to_error )
    }
}


/// Playlist names are compared without surrounding whitespace.
fn normalized( name: &str ) -> &str {
    name.trim()
}


fn checked_name( name: &str ) -> Result<&str, StoreError> {
    let name = normalized( name );
    if name.is_empty() {
        Err( StoreError::BlankName )
    } else {
        Ok( name )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn open_temp() -> ( tempfile::TempDir, PlaylistStore ) {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaylistStore::open( dir.path().join( "playlists.json" ) ).unwrap();
        ( dir, store )
    }


    fn reopen( store: &PlaylistStore ) -> PlaylistStore {
        PlaylistStore::open( store.path().to_path_buf() ).unwrap()
    }


    #[test]
    fn test_new_store_has_favorites() {
        let ( _dir, store ) = open_temp();
        assert_eq!( store.list_names(), vec![ FAVORITES.to_string() ] );
        assert!( store.get_tracks( FAVORITES ).is_empty() );
    }


    #[test]
    fn test_create_persists() {
        let ( _dir, mut store ) = open_temp();
        store.create( "Road Trip", vec![ PathBuf::from( "a.mp3" ) ] ).unwrap();

        let reopened = reopen( &store );
        assert_eq!( reopened.get_tracks( "Road Trip" ), &[ PathBuf::from( "a.mp3" ) ] );
        assert_eq!( reopened.list_names(), vec![ "Favorites".to_string(), "Road Trip".to_string() ] );
    }


    #[test]
    fn test_create_rejects_duplicates_and_blank() {
        let ( _dir, mut store ) = open_temp();
        store.create( "Mix", Vec::new() ).unwrap();

        assert!( matches!( store.create( "Mix", Vec::new() ), Err( StoreError::AlreadyExists( _ ) ) ) );
        assert!( matches!( store.create( FAVORITES, Vec::new() ), Err( StoreError::AlreadyExists( _ ) ) ) );
        assert!( matches!( store.create( "  ", Vec::new() ), Err( StoreError::BlankName ) ) );
    }


    #[test]
    fn test_rename_favorites_rejected() {
        let ( _dir, mut store ) = open_temp();
        store.add_track( FAVORITES, PathBuf::from( "a.mp3" ) ).unwrap();

        assert!( matches!( store.rename( FAVORITES, "X" ), Err( StoreError::Reserved( _ ) ) ) );
        assert_eq!( store.get_tracks( FAVORITES ), &[ PathBuf::from( "a.mp3" ) ] );
        assert!( store.list_names().contains( &FAVORITES.to_string() ) );
        assert!( !store.contains( "X" ) );
    }


    #[test]
    fn test_delete_favorites_rejected() {
        let ( _dir, mut store ) = open_temp();
        assert!( matches!( store.delete( FAVORITES ), Err( StoreError::Reserved( _ ) ) ) );
        assert!( store.contains( FAVORITES ) );
    }


    #[test]
    fn test_rename() {
        let ( _dir, mut store ) = open_temp();
        store.create( "Old", vec![ PathBuf::from( "a.mp3" ) ] ).unwrap();
        store.create( "Taken", Vec::new() ).unwrap();

        assert!( matches!( store.rename( "Old", "Taken" ), Err( StoreError::AlreadyExists( _ ) ) ) );
        assert!( matches!( store.rename( "Missing", "New" ), Err( StoreError::NotFound( _ ) ) ) );
        assert!( matches!( store.rename( "Old", FAVORITES ), Err( StoreError::AlreadyExists( _ ) ) ) );

        store.rename( "Old", "New" ).unwrap();
        let reopened = reopen( &store );
        assert!( !reopened.contains( "Old" ) );
        assert_eq!( reopened.get_tracks( "New" ), &[ PathBuf::from( "a.mp3" ) ] );
    }


    #[test]
    fn test_names_ignore_surrounding_whitespace() {
        let ( _dir, mut store ) = open_temp();
        store.create( " Mix ", Vec::new() ).unwrap();
        assert!( store.contains( "Mix" ) );
        assert!( store.add_track( "Mix ", PathBuf::from( "a.mp3" ) ).unwrap() );
        assert_eq!( store.get_tracks( " Mix" ), &[ PathBuf::from( "a.mp3" ) ] );
        assert!( store.remove_track( " Mix", Path::new( "a.mp3" ) ).unwrap() );

        store.rename( " Mix ", " Drive " ).unwrap();
        assert!( store.contains( "Drive" ) );
        assert!( matches!( store.rename( " Favorites ", "X" ), Err( StoreError::Reserved( _ ) ) ) );

        store.delete( " Drive " ).unwrap();
        assert!( !store.contains( "Drive" ) );
    }


    #[test]
    fn test_delete() {
        let ( _dir, mut store ) = open_temp();
        store.create( "Mix", Vec::new() ).unwrap();
        store.delete( "Mix" ).unwrap();

        assert!( !reopen( &store ).contains( "Mix" ) );
        assert!( matches!( store.delete( "Mix" ), Err( StoreError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_add_track_is_idempotent_and_creates_playlist() {
        let ( _dir, mut store ) = open_temp();

        assert!( store.add_track( "Workout", PathBuf::from( "a.mp3" ) ).unwrap() );
        assert!( !store.add_track( "Workout", PathBuf::from( "a.mp3" ) ).unwrap() );
        assert_eq!( reopen( &store ).get_tracks( "Workout" ), &[ PathBuf::from( "a.mp3" ) ] );
    }


    #[test]
    fn test_remove_track() {
        let ( _dir, mut store ) = open_temp();
        store.create( "Mix", vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "b.mp3" ) ] ).unwrap();

        assert!( store.remove_track( "Mix", Path::new( "a.mp3" ) ).unwrap() );
        assert!( !store.remove_track( "Mix", Path::new( "a.mp3" ) ).unwrap() );
        assert!( !store.remove_track( "Nope", Path::new( "a.mp3" ) ).unwrap() );
        assert_eq!( reopen( &store ).get_tracks( "Mix" ), &[ PathBuf::from( "b.mp3" ) ] );
    }


    #[test]
    fn test_get_tracks_unknown_is_empty() {
        let ( _dir, store ) = open_temp();
        assert!( store.get_tracks( "Nope" ).is_empty() );
    }


    #[test]
    fn test_toggle_favorite() {
        let ( _dir, mut store ) = open_temp();
        let track = PathBuf::from( "a.mp3" );

        assert!( store.toggle_favorite( track.clone() ).unwrap() );
        assert!( store.is_favorite( &track ) );
        assert!( !store.toggle_favorite( track.clone() ).unwrap() );
        assert!( !reopen( &store ).is_favorite( &track ) );
    }


    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "playlists.json" );
        fs::write( &path, "not json" ).unwrap();

        assert!( matches!( PlaylistStore::open( path ), Err( StoreError::Parse { .. } ) ) );
    }


    #[test]
    fn test_persist_failure_keeps_change_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail
        let path = dir.path().join( "playlists.json" );
        let mut store = PlaylistStore::open( path.clone() ).unwrap();
        fs::create_dir( &path ).unwrap();

        assert!( matches!( store.create( "Mix", Vec::new() ), Err( StoreError::Persist { .. } ) ) );
        assert!( store.contains( "Mix" ) );
    }
}
