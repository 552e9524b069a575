//! Play queue management
//!
//! Handles track ordering, the current position pointer, and the
//! repeat/shuffle mode cycle.

use std::path::{ Path, PathBuf };

use rand::seq::SliceRandom;
use thiserror::Error;

use crate::library::{ Catalog, LibraryError };


/// Errors reported by queue operations. None of them change queue state.
#[derive( Debug, Error )]
pub enum QueueError {
    #[error( "Position {position} out of range for queue of {len} tracks" )]
    PositionOutOfRange { position: usize, len: usize },

    #[error( "End of queue" )]
    EndOfQueue,

    #[error( "No previous track" )]
    NoPrevious,

    #[error( "Not in queue: {0}" )]
    NotQueued( PathBuf ),

    #[error( "Failed to enumerate catalog: {0}" )]
    Catalog( #[from] LibraryError ),
}


/// Repeat mode of the queue.
///
/// The mode shapes the queue contents when it is entered; it does not
/// change how `advance` behaves.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum RepeatMode {
    /// The whole catalog, in enumeration order.
    #[default]
    All,

    /// Only the track that was current when the mode was entered.
    One,

    /// The whole catalog, randomly permuted.
    Shuffle,
}


impl RepeatMode {
    /// Returns the mode entered by the next cycle step.
    pub fn next( self ) -> Self {
        match self {
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Shuffle,
            RepeatMode::Shuffle => RepeatMode::All,
        }
    }


    /// Whether entering this mode starts playback immediately.
    ///
    /// Only `Shuffle` does. The asymmetry is long-standing product
    /// behavior and is kept as-is.
    pub fn auto_starts( self ) -> bool {
        matches!( self, RepeatMode::Shuffle )
    }


    /// Whether entering this mode rebuilds the queue from the catalog.
    pub fn uses_catalog( self ) -> bool {
        !matches!( self, RepeatMode::One )
    }


    /// Returns the display name of the mode.
    pub fn name( &self ) -> &'static str {
        match self {
            RepeatMode::All => "repeat all",
            RepeatMode::One => "repeat one",
            RepeatMode::Shuffle => "shuffle",
        }
    }
}


/// Ordered play queue with a current position.
#[derive( Debug, Clone, Default )]
pub struct Queue {
    tracks: Vec<PathBuf>,
    position: usize,
    repeat: RepeatMode,
}


impl Queue {
    /// Creates a new empty queue in `RepeatMode::All`.
    pub fn new() -> Self {
        Self::default()
    }


    /// Replaces the queue contents. The position is left untouched.
    pub fn set_queue( &mut self, tracks: Vec<PathBuf> ) {
        self.tracks = tracks;
    }


    /// Moves the position pointer to `position`.
    pub fn set_position( &mut self, position: usize ) -> Result<(), QueueError> {
        self.check_bounds( position )?;
        self.position = position;
        Ok(())
    }


    /// Queues `track` to play right after `after`.
    ///
    /// Returns `Ok(false)` without touching the queue when the track is
    /// already queued anywhere.
    pub fn insert_next( &mut self, track: PathBuf, after: usize ) -> Result<bool, QueueError> {
        if let Err( e ) = self.check_bounds( after ) {
            tracing::warn!( "insert_next rejected: {}", e );
            return Err( e );
        }

        if self.contains( &track ) {
            tracing::debug!( "Already queued: {:?}", track );
            return Ok( false );
        }

        tracing::info!( "Queued next: {:?}", track );
        self.tracks.insert( after + 1, track );
        Ok( true )
    }


    /// Removes the first occurrence of `track`, returning its index.
    ///
    /// The position is an index and is not adjusted; when the current
    /// track is removed the position refers to the one that followed it.
    pub fn remove( &mut self, track: &Path ) -> Result<usize, QueueError> {
        match self.tracks.iter().position( |t| t == track ) {
            Some( index ) => {
                self.tracks.remove( index );
                tracing::info!( "Removed from queue: {:?}", track );
                Ok( index )
            }
            None => {
                tracing::info!( "Not in queue: {:?}", track );
                Err( QueueError::NotQueued( track.to_path_buf() ) )
            }
        }
    }


    /// Steps to the next track, returning the new position.
    pub fn advance( &mut self ) -> Result<usize, QueueError> {
        let next = self.position + 1;
        if next >= self.tracks.len() {
            return Err( QueueError::EndOfQueue );
        }
        self.position = next;
        Ok( next )
    }


    /// Steps to the previous track, returning the new position.
    pub fn retreat( &mut self ) -> Result<usize, QueueError> {
        if self.position == 0 {
            return Err( QueueError::NoPrevious );
        }
        self.position -= 1;
        Ok( self.position )
    }


    /// Enters the next repeat mode and reshapes the queue for it.
    ///
    /// The position is reset to 0. The caller decides whether to start
    /// playback, see [`RepeatMode::auto_starts`]. When the catalog cannot
    /// be read nothing changes.
    pub fn cycle_repeat_mode( &mut self, catalog: &dyn Catalog ) -> Result<RepeatMode, QueueError> {
        let mode = self.repeat.next();

        let tracks = match mode {
            RepeatMode::All => catalog.enumerate()?,
            RepeatMode::One => self.current().cloned().into_iter().collect(),
            RepeatMode::Shuffle => {
                let mut tracks = catalog.enumerate()?;
                tracks.shuffle( &mut rand::thread_rng() );
                tracks
            }
        };

        self.tracks = tracks;
        self.position = 0;
        self.repeat = mode;
        tracing::info!( "Repeat mode: {} ({} tracks)", mode.name(), self.tracks.len() );

        Ok( mode )
    }


    /// Gets the track at the current position.
    pub fn current( &self ) -> Option<&PathBuf> {
        self.tracks.get( self.position )
    }


    /// Gets the current position.
    pub fn position( &self ) -> usize {
        self.position
    }


    /// Gets the repeat mode.
    pub fn repeat_mode( &self ) -> RepeatMode {
        self.repeat
    }


    /// Gets all queued tracks.
    pub fn tracks( &self ) -> &[PathBuf] {
        &self.tracks
    }


    /// Returns true if `track` is queued anywhere.
    pub fn contains( &self, track: &Path ) -> bool {
        self.tracks.iter().any( |t| t == track )
    }


    /// Gets the number of queued tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if nothing is queued.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    fn check_bounds( &self, position: usize ) -> Result<(), QueueError> {
        if position < self.tracks.len() {
            Ok(())
        } else {
            Err( QueueError::PositionOutOfRange { position, len: self.tracks.len() } )
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::library::StaticCatalog;


    fn paths( names: &[&str] ) -> Vec<PathBuf> {
        names.iter().map( PathBuf::from ).collect()
    }


    fn abc() -> Queue {
        let mut queue = Queue::new();
        queue.set_queue( paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
        queue
    }


    #[test]
    fn test_advance_to_end_of_queue() {
        let mut queue = abc();

        assert_eq!( queue.advance().unwrap(), 1 );
        assert_eq!( queue.advance().unwrap(), 2 );
        assert!( matches!( queue.advance(), Err( QueueError::EndOfQueue ) ) );
        assert_eq!( queue.position(), 2 );
        assert_eq!( queue.current(), Some( &PathBuf::from( "c.mp3" ) ) );
    }


    #[test]
    fn test_advance_moves_by_one_or_reports_end() {
        for len in 1..6 {
            let names: Vec<String> = ( 0..len ).map( |i| format!( "{}.mp3", i ) ).collect();
            let mut queue = Queue::new();
            queue.set_queue( names.iter().map( PathBuf::from ).collect() );

            for _ in 0..len + 2 {
                let before = queue.position();
                let tracks_before = queue.tracks().to_vec();
                match queue.advance() {
                    Ok( pos ) => {
                        assert_eq!( pos, before + 1 );
                        assert!( pos < queue.len() );
                    }
                    Err( QueueError::EndOfQueue ) => {
                        assert_eq!( queue.position(), before );
                        assert_eq!( queue.tracks(), tracks_before.as_slice() );
                    }
                    Err( e ) => panic!( "unexpected error: {}", e ),
                }
            }
        }
    }


    #[test]
    fn test_retreat() {
        let mut queue = abc();
        assert!( matches!( queue.retreat(), Err( QueueError::NoPrevious ) ) );
        assert_eq!( queue.position(), 0 );

        queue.set_position( 2 ).unwrap();
        assert_eq!( queue.retreat().unwrap(), 1 );
    }


    #[test]
    fn test_set_position_out_of_range() {
        let mut queue = abc();
        assert!( matches!(
            queue.set_position( 3 ),
            Err( QueueError::PositionOutOfRange { position: 3, len: 3 } )
        ));
        assert_eq!( queue.position(), 0 );
    }


    #[test]
    fn test_insert_next_splices_after_position() {
        let mut queue = abc();
        assert!( queue.insert_next( PathBuf::from( "x.mp3" ), 0 ).unwrap() );
        assert_eq!( queue.tracks(), paths( &[ "a.mp3", "x.mp3", "b.mp3", "c.mp3" ] ).as_slice() );
    }


    #[test]
    fn test_insert_next_is_idempotent() {
        let mut queue = abc();
        queue.insert_next( PathBuf::from( "x.mp3" ), 1 ).unwrap();
        let once = queue.tracks().to_vec();

        assert!( !queue.insert_next( PathBuf::from( "x.mp3" ), 1 ).unwrap() );
        assert_eq!( queue.tracks(), once.as_slice() );
    }


    #[test]
    fn test_insert_next_existing_track_is_noop() {
        let mut queue = abc();
        assert!( !queue.insert_next( PathBuf::from( "c.mp3" ), 0 ).unwrap() );
        assert_eq!( queue.tracks(), paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ).as_slice() );
    }


    #[test]
    fn test_insert_next_out_of_range() {
        let mut queue = abc();
        assert!( queue.insert_next( PathBuf::from( "x.mp3" ), 3 ).is_err() );
        assert_eq!( queue.len(), 3 );

        let mut empty = Queue::new();
        assert!( empty.insert_next( PathBuf::from( "x.mp3" ), 0 ).is_err() );
        assert!( empty.is_empty() );
    }


    #[test]
    fn test_remove_current_keeps_index() {
        let mut queue = abc();
        queue.set_position( 1 ).unwrap();

        assert_eq!( queue.remove( Path::new( "b.mp3" ) ).unwrap(), 1 );
        assert_eq!( queue.position(), 1 );
        assert_eq!( queue.current(), Some( &PathBuf::from( "c.mp3" ) ) );
    }


    #[test]
    fn test_remove_first_occurrence_only() {
        let mut queue = Queue::new();
        queue.set_queue( paths( &[ "a.mp3", "b.mp3", "a.mp3" ] ) );
        queue.remove( Path::new( "a.mp3" ) ).unwrap();
        assert_eq!( queue.tracks(), paths( &[ "b.mp3", "a.mp3" ] ).as_slice() );
    }


    #[test]
    fn test_remove_absent_is_idempotent() {
        let mut queue = abc();
        let before = queue.tracks().to_vec();

        assert!( matches!( queue.remove( Path::new( "z.mp3" ) ), Err( QueueError::NotQueued( _ ) ) ) );
        assert_eq!( queue.tracks(), before.as_slice() );
        assert!( matches!( queue.remove( Path::new( "z.mp3" ) ), Err( QueueError::NotQueued( _ ) ) ) );
        assert_eq!( queue.tracks(), before.as_slice() );
    }


    #[test]
    fn test_cycle_repeat_mode_round_trip() {
        let catalog = StaticCatalog::new( paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
        let mut queue = abc();
        let start = queue.repeat_mode();

        let mut auto_starts = Vec::new();
        for _ in 0..3 {
            let mode = queue.cycle_repeat_mode( &catalog ).unwrap();
            auto_starts.push( mode.auto_starts() );
        }

        assert_eq!( queue.repeat_mode(), start );
        assert_eq!( auto_starts, vec![ false, true, false ] );
    }


    #[test]
    fn test_cycle_into_repeat_one_collapses_queue() {
        let catalog = StaticCatalog::new( paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
        let mut queue = abc();
        queue.set_position( 2 ).unwrap();

        assert_eq!( queue.cycle_repeat_mode( &catalog ).unwrap(), RepeatMode::One );
        assert_eq!( queue.tracks(), paths( &[ "c.mp3" ] ).as_slice() );
        assert_eq!( queue.position(), 0 );
    }


    #[test]
    fn test_cycle_into_repeat_one_from_empty_queue() {
        let catalog = StaticCatalog::new( paths( &[ "a.mp3" ] ) );
        let mut queue = Queue::new();

        assert_eq!( queue.cycle_repeat_mode( &catalog ).unwrap(), RepeatMode::One );
        assert!( queue.is_empty() );
    }


    #[test]
    fn test_cycle_into_shuffle_is_permutation_of_catalog() {
        let names: Vec<String> = ( 0..20 ).map( |i| format!( "{:02}.mp3", i ) ).collect();
        let catalog_tracks: Vec<PathBuf> = names.iter().map( PathBuf::from ).collect();
        let catalog = StaticCatalog::new( catalog_tracks.clone() );
        let mut queue = abc();
        queue.set_position( 1 ).unwrap();

        queue.cycle_repeat_mode( &catalog ).unwrap();
        assert_eq!( queue.cycle_repeat_mode( &catalog ).unwrap(), RepeatMode::Shuffle );
        assert_eq!( queue.position(), 0 );

        let mut shuffled = queue.tracks().to_vec();
        shuffled.sort();
        assert_eq!( shuffled, catalog_tracks );
    }


    #[test]
    fn test_cycle_into_repeat_all_reloads_catalog() {
        let catalog = StaticCatalog::new( paths( &[ "x.mp3", "y.mp3" ] ) );
        let mut queue = abc();
        queue.cycle_repeat_mode( &catalog ).unwrap();
        queue.cycle_repeat_mode( &catalog ).unwrap();

        assert_eq!( queue.cycle_repeat_mode( &catalog ).unwrap(), RepeatMode::All );
        assert_eq!( queue.tracks(), paths( &[ "x.mp3", "y.mp3" ] ).as_slice() );
        assert_eq!( queue.position(), 0 );
    }


    #[test]
    fn test_cycle_with_failing_catalog_changes_nothing() {
        struct Broken;
        impl Catalog for Broken {
            fn enumerate( &self ) -> Result<Vec<PathBuf>, LibraryError> {
                Err( LibraryError::NoMediaDir )
            }
        }

        let catalog = StaticCatalog::new( paths( &[ "a.mp3" ] ) );
        let mut queue = abc();
        queue.set_position( 1 ).unwrap();
        queue.cycle_repeat_mode( &catalog ).unwrap();
        queue.set_queue( paths( &[ "a.mp3", "b.mp3" ] ) );
        queue.set_position( 1 ).unwrap();

        assert!( matches!( queue.cycle_repeat_mode( &Broken ), Err( QueueError::Catalog( _ ) ) ) );
        assert_eq!( queue.repeat_mode(), RepeatMode::One );
        assert_eq!( queue.position(), 1 );
        assert_eq!( queue.len(), 2 );
    }
}
