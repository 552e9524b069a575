//! Track catalog
//!
//! Discovers playable audio files under a media directory. The queue
//! re-enumerates the catalog whenever the repeat mode asks for the full
//! library.

use std::path::{ Path, PathBuf };

use thiserror::Error;
use walkdir::WalkDir;


/// Audio file extensions the catalog recognizes.
const SUPPORTED_EXTENSIONS: &[&str] = &[ "mp3", "wav", "flac", "aac", "ogg" ];


/// Errors that can occur while enumerating the catalog.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "No media directory configured" )]
    NoMediaDir,
}


/// Source of the full list of playable tracks.
pub trait Catalog: Send + Sync {
    /// Returns every known track, in enumeration order.
    fn enumerate( &self ) -> Result<Vec<PathBuf>, LibraryError>;
}


/// Recursive file-system scanner rooted at a media directory.
#[derive( Debug, Clone )]
pub struct LibraryScanner {
    root: PathBuf,
}


impl LibraryScanner {
    /// Creates a scanner rooted at `root`.
    pub fn new( root: PathBuf ) -> Self {
        Self { root }
    }


    /// Creates a scanner rooted at the user's music directory.
    pub fn from_default_dir() -> Result<Self, LibraryError> {
        Self::default_media_dir()
            .map( Self::new )
            .ok_or( LibraryError::NoMediaDir )
    }


    /// The user's music directory, falling back to `~/Music`.
    pub fn default_media_dir() -> Option<PathBuf> {
        dirs::audio_dir().or_else( || dirs::home_dir().map( |h| h.join( "Music" ) ) )
    }


    /// Gets the root directory.
    pub fn root( &self ) -> &Path {
        &self.root
    }
}


impl Catalog for LibraryScanner {
    fn enumerate( &self ) -> Result<Vec<PathBuf>, LibraryError> {
        let mut tracks = Vec::new();

        tracing::info!( "Scanning: {:?}", self.root );
        if !self.root.is_dir() {
            return Err( LibraryError::NotFound( self.root.clone() ) );
        }

        // Directory links are not followed, so link cycles cannot recurse
        for entry in WalkDir::new( &self.root ).follow_links( false ) {
            let entry = match entry {
                Ok( entry ) => entry,
                Err( e ) => {
                    tracing::warn!( "Skipping unreadable entry: {}", e );
                    continue;
                }
            };

            if !entry.file_type().is_dir() && entry.path().is_file() && is_audio_file( entry.path() ) {
                tracks.push( entry.into_path() );
            }
        }

        tracing::info!( "Found {} tracks", tracks.len() );

        Ok( tracks )
    }
}


/// A fixed, in-memory catalog.
#[derive( Debug, Clone, Default )]
pub struct StaticCatalog {
    tracks: Vec<PathBuf>,
}


impl StaticCatalog {
    pub fn new( tracks: Vec<PathBuf> ) -> Self {
        Self { tracks }
    }
}


impl Catalog for StaticCatalog {
    fn enumerate( &self ) -> Result<Vec<PathBuf>, LibraryError> {
        Ok( self.tracks.clone() )
    }
}


/// Checks if a file has a supported audio extension (case-insensitive).
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs;


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "song.mp3" ) ) );
        assert!( is_audio_file( Path::new( "SONG.FLAC" ) ) );
        assert!( !is_audio_file( Path::new( "cover.jpg" ) ) );
        assert!( !is_audio_file( Path::new( "README" ) ) );
    }


    #[test]
    fn test_scan_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join( "album" );
        fs::create_dir( &nested ).unwrap();
        fs::write( dir.path().join( "a.mp3" ), b"" ).unwrap();
        fs::write( dir.path().join( "notes.txt" ), b"" ).unwrap();
        fs::write( nested.join( "b.ogg" ), b"" ).unwrap();
        fs::write( nested.join( "c.Wav" ), b"" ).unwrap();

        let scanner = LibraryScanner::new( dir.path().to_path_buf() );
        let mut tracks = scanner.enumerate().unwrap();
        tracks.sort();

        assert_eq!( tracks, vec![
            dir.path().join( "a.mp3" ),
            nested.join( "b.ogg" ),
            nested.join( "c.Wav" ),
        ]);
    }


    #[cfg( unix )]
    #[test]
    fn test_scan_does_not_follow_directory_links() {
        let dir = tempfile::tempdir().unwrap();
        fs::write( dir.path().join( "a.mp3" ), b"" ).unwrap();
        std::os::unix::fs::symlink( dir.path(), dir.path().join( "loop" ) ).unwrap();
        std::os::unix::fs::symlink( dir.path(), dir.path().join( "loop2" ) ).unwrap();

        let scanner = LibraryScanner::new( dir.path().to_path_buf() );
        assert_eq!( scanner.enumerate().unwrap(), vec![ dir.path().join( "a.mp3" ) ] );
    }


    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = LibraryScanner::new( dir.path().join( "missing" ) );
        assert!( matches!( scanner.enumerate(), Err( LibraryError::NotFound( _ ) ) ) );
    }
}
