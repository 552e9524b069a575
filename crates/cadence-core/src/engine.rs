//! Playback engine
//!
//! The Engine owns the play queue, the output sink and the completion
//! watcher. All of them sit behind one lock. Foreground calls are
//! serialized by a second lock so that two overlapping `start`s cannot
//! each spawn a watcher.

use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::Sender;
use std::thread;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::library::{ Catalog, StaticCatalog };
use crate::output::OutputError;
use crate::queue::{ Queue, QueueError, RepeatMode };
use crate::sink::{ Sink, SinkEvent };
use crate::watcher::Watcher;


/// Errors reported by engine operations.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "Nothing to play" )]
    NothingToPlay,

    #[error( transparent )]
    Queue( #[from] QueueError ),

    #[error( "Failed to play {track:?}: {source}" )]
    Output {
        track: PathBuf,
        #[source]
        source: OutputError,
    },
}


/// Current playback state.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}


/// Point-in-time copy of the engine state for display.
#[derive( Debug, Clone )]
pub struct EngineSnapshot {
    pub tracks: Vec<PathBuf>,
    pub position: usize,
    pub repeat_mode: RepeatMode,
    pub state: PlaybackState,
    pub volume: f32,
}


impl EngineSnapshot {
    /// Gets the track at the current position.
    pub fn current( &self ) -> Option<&PathBuf> {
        self.tracks.get( self.position )
    }
}


struct EngineState {
    queue: Queue,
    sink: Box<dyn Sink>,
    volume: f32,
    paused: bool,
    /// A stream is loaded (playing or paused)
    loaded: bool,
    watcher: Option<Watcher>,
    next_watcher_id: u64,
}


impl EngineState {
    fn playback_state( &self ) -> PlaybackState {
        match ( self.loaded, self.paused ) {
            ( false, _ ) => PlaybackState::Stopped,
            ( true, true ) => PlaybackState::Paused,
            ( true, false ) => PlaybackState::Playing,
        }
    }


    fn unload( &mut self ) {
        self.sink.stop();
        self.loaded = false;
        self.paused = false;
    }
}


struct Shared {
    state: Mutex<EngineState>,
    catalog: Arc<dyn Catalog>,
    config: EngineConfig,
}


impl Shared {
    fn lock( &self ) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Starts or resumes `queue[position]`. The watcher slot must be empty.
    fn start_locked( self: &Arc<Self>, state: &mut EngineState ) -> Result<(), PlayerError> {
        let Some( track ) = state.queue.current().cloned() else {
            tracing::info!( "Nothing to play at position {}", state.queue.position() );
            return Err( PlayerError::NothingToPlay );
        };

        if state.loaded && state.paused {
            state.sink.resume();
            state.paused = false;
            tracing::info!( "Resumed" );
        } else {
            let result = state.sink.load( &track ).and_then( |_| state.sink.play() );
            if let Err( source ) = result {
                tracing::error!( "Failed to play {:?}: {}", track, source );
                state.unload();
                return Err( PlayerError::Output { track, source } );
            }
            state.loaded = true;
            state.paused = false;
            tracing::info!( "Now playing: {:?}", track );
        }

        self.spawn_watcher( state );
        Ok(())
    }


    fn spawn_watcher( self: &Arc<Self>, state: &mut EngineState ) {
        debug_assert!( state.watcher.is_none() );

        let id = state.next_watcher_id;
        state.next_watcher_id += 1;

        let shared = Arc::clone( self );
        match Watcher::spawn( id, move |stop, done| shared.watch( id, stop, done ) ) {
            Ok( watcher ) => state.watcher = Some( watcher ),
            Err( e ) => tracing::error!( "Failed to spawn completion watcher: {}", e ),
        }
    }


    /// Watcher thread body.
    fn watch( self: Arc<Self>, id: u64, stop: Arc<AtomicBool>, _done: Sender<()> ) {
        loop {
            {
                let mut state = self.lock();
                if stop.load( Ordering::Acquire ) {
                    tracing::debug!( "Watcher {}: stop signal received", id );
                    return;
                }
                if let Some( SinkEvent::Finished ) = state.sink.poll_event() {
                    self.on_track_finished( id, &mut state );
                    return;
                }
            }
            thread::sleep( self.config.poll_interval );
        }
    }


    fn on_track_finished( self: &Arc<Self>, id: u64, state: &mut EngineState ) {
        tracing::info!( "Track finished" );

        // This watcher is ending; leave the slot free for its successor
        if state.watcher.as_ref().is_some_and( |w| w.id() == id ) {
            state.watcher = None;
        }
        state.paused = false;

        match state.queue.advance() {
            Ok( _ ) => {
                if let Err( e ) = self.start_locked( state ) {
                    tracing::warn!( "Could not start next track: {}", e );
                }
            }
            Err( e ) => {
                tracing::info!( "{}", e );
                state.unload();
            }
        }
    }
}


/// Core playback engine.
pub struct Engine {
    shared: Arc<Shared>,
    /// Serializes foreground operations
    control: Mutex<()>,
}


impl Engine {
    /// Creates an engine with an empty queue.
    pub fn new( mut sink: Box<dyn Sink>, catalog: Arc<dyn Catalog>, config: EngineConfig ) -> Self {
        let volume = config.initial_volume.clamp( 0.0, 1.0 );
        sink.set_volume( volume );

        let state = EngineState {
            queue: Queue::new(),
            sink,
            volume,
            paused: false,
            loaded: false,
            watcher: None,
            next_watcher_id: 0,
        };

        Self {
            shared: Arc::new( Shared {
                state: Mutex::new( state ),
                catalog,
                config,
            }),
            control: Mutex::new( () ),
        }
    }


    fn control( &self ) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else( PoisonError::into_inner )
    }


    fn lock( &self ) -> MutexGuard<'_, EngineState> {
        self.shared.lock()
    }


    /// Stops the active watcher and waits for it, without holding the
    /// state lock while waiting.
    fn retire_watcher( &self ) {
        let watcher = {
            let mut state = self.lock();
            let watcher = state.watcher.take();
            if let Some( ref w ) = watcher {
                w.signal();
            }
            watcher
        };

        if let Some( watcher ) = watcher {
            watcher.wait( self.shared.config.watcher_join_timeout );
        }
    }


    /// Puts a watcher back on a stream that is still loaded after an
    /// operation retired it and then failed.
    fn rewatch( &self, state: &mut EngineState ) {
        if state.loaded && state.watcher.is_none() {
            self.shared.spawn_watcher( state );
        }
    }


    /// Replaces the queue with the full catalog and moves to its start.
    ///
    /// Returns the number of tracks queued.
    pub fn reload_catalog( &self ) -> Result<usize, PlayerError> {
        let tracks = self.shared.catalog.enumerate().map_err( QueueError::from )?;
        let _guard = self.control();
        self.retire_watcher();

        let mut state = self.lock();
        let count = tracks.len();
        state.queue.set_queue( tracks );
        if count > 0 {
            state.queue.set_position( 0 )?;
        }
        self.rewatch( &mut state );
        Ok( count )
    }


    /// Replaces the queue contents. The position is left as-is.
    pub fn set_queue( &self, tracks: Vec<PathBuf> ) {
        let _guard = self.control();
        self.lock().queue.set_queue( tracks );
    }


    /// Starts playback of the current track, or resumes it when paused.
    pub fn start( &self ) -> Result<(), PlayerError> {
        let _guard = self.control();
        self.retire_watcher();

        let mut state = self.lock();
        let result = self.shared.start_locked( &mut state );
        if result.is_err() {
            self.rewatch( &mut state );
        }
        result
    }


    /// Replaces the queue with `tracks` and plays the one at `index`.
    pub fn play_selection( &self, tracks: Vec<PathBuf>, index: usize ) -> Result<(), PlayerError> {
        if index >= tracks.len() {
            return Err( QueueError::PositionOutOfRange { position: index, len: tracks.len() }.into() );
        }

        let _guard = self.control();
        self.retire_watcher();

        let mut state = self.lock();
        state.queue.set_queue( tracks );
        state.queue.set_position( index )?;
        // A selection always loads fresh, even over a paused stream
        state.paused = false;
        if state.loaded {
            state.unload();
        }
        self.shared.start_locked( &mut state )
    }


    /// Suspends playback. Does nothing when stopped.
    pub fn pause( &self ) {
        let _guard = self.control();
        let mut state = self.lock();

        if state.loaded && !state.paused {
            state.sink.pause();
            state.paused = true;
            tracing::info!( "Paused" );
        }
    }


    /// Stops playback and unloads the stream.
    pub fn stop( &self ) {
        let _guard = self.control();
        self.stop_inner();
    }


    fn stop_inner( &self ) {
        self.retire_watcher();
        let mut state = self.lock();
        if state.loaded {
            state.unload();
            tracing::info!( "Stopped" );
        }
    }


    /// Plays the next queued track.
    ///
    /// At the end of the queue nothing changes and `EndOfQueue` is reported.
    pub fn next_song( &self ) -> Result<(), PlayerError> {
        let _guard = self.control();
        self.retire_watcher();

        let mut state = self.lock();
        // At the boundary nothing changes, including a pause
        if let Err( e ) = state.queue.advance() {
            tracing::info!( "{}", e );
            self.rewatch( &mut state );
            return Err( e.into() );
        }
        state.paused = false;
        self.shared.start_locked( &mut state )
    }


    /// Plays the previous queued track.
    ///
    /// At the start of the queue nothing changes and `NoPrevious` is reported.
    pub fn prev_song( &self ) -> Result<(), PlayerError> {
        let _guard = self.control();
        self.retire_watcher();

        let mut state = self.lock();
        // At the boundary nothing changes, including a pause
        if let Err( e ) = state.queue.retreat() {
            tracing::info!( "{}", e );
            self.rewatch( &mut state );
            return Err( e.into() );
        }
        state.paused = false;
        self.shared.start_locked( &mut state )
    }


    /// Queues `track` right after the current position.
    ///
    /// Returns false when the track was already queued.
    pub fn insert_next( &self, track: PathBuf ) -> Result<bool, PlayerError> {
        let _guard = self.control();
        let mut state = self.lock();
        let position = state.queue.position();
        Ok( state.queue.insert_next( track, position )? )
    }


    /// Removes the first occurrence of `track` from the queue, returning
    /// the index it had.
    ///
    /// Removing the track that is playing only stops playback when
    /// `stop_on_remove_current` is configured.
    pub fn remove_from_queue( &self, track: &Path ) -> Result<usize, PlayerError> {
        let _guard = self.control();

        let ( index, stop ) = {
            let mut state = self.lock();
            let playing_index = state.loaded.then( || state.queue.position() );
            let index = state.queue.remove( track )?;
            ( index, self.shared.config.stop_on_remove_current && playing_index == Some( index ) )
        };

        if stop {
            tracing::info!( "Removed the playing track, stopping" );
            self.stop_inner();
        }
        Ok( index )
    }


    /// Enters the next repeat mode. Entering shuffle also starts playback
    /// from the top of the shuffled queue.
    pub fn cycle_repeat_mode( &self ) -> Result<RepeatMode, PlayerError> {
        let _guard = self.control();

        // Scan without the state lock so the watcher and readers keep running
        let entering = self.lock().queue.repeat_mode().next();
        let catalog = if entering.uses_catalog() {
            StaticCatalog::new( self.shared.catalog.enumerate().map_err( QueueError::from )? )
        } else {
            StaticCatalog::default()
        };

        self.retire_watcher();
        let mut state = self.lock();
        let mode = match state.queue.cycle_repeat_mode( &catalog ) {
            Ok( mode ) => mode,
            Err( e ) => {
                self.rewatch( &mut state );
                return Err( e.into() );
            }
        };

        if mode.auto_starts() {
            if state.loaded {
                state.unload();
            }
            if let Err( e ) = self.shared.start_locked( &mut state ) {
                tracing::warn!( "Shuffle could not start playback: {}", e );
            }
        } else {
            self.rewatch( &mut state );
        }

        Ok( mode )
    }


    /// Raises the volume by one step.
    pub fn volume_up( &self ) -> f32 {
        let step = self.shared.config.volume_step;
        self.adjust_volume( |v| v + step )
    }


    /// Lowers the volume by one step.
    pub fn volume_down( &self ) -> f32 {
        let step = self.shared.config.volume_step;
        self.adjust_volume( |v| v - step )
    }


    /// Sets the volume level (clamped to 0.0..=1.0).
    pub fn set_volume( &self, volume: f32 ) -> f32 {
        self.adjust_volume( |_| volume )
    }


    fn adjust_volume( &self, f: impl FnOnce( f32 ) -> f32 ) -> f32 {
        let _guard = self.control();
        let mut state = self.lock();

        // Round to hundredths so repeated steps land on exact levels
        let volume = ( ( f( state.volume ) * 100.0 ).round() / 100.0 ).clamp( 0.0, 1.0 );
        state.volume = volume;
        state.sink.set_volume( volume );
        tracing::info!( "Volume: {}%", ( volume * 100.0 ).round() as i32 );
        volume
    }


    /// Gets the current volume level.
    pub fn volume( &self ) -> f32 {
        self.lock().volume
    }


    /// Gets the current playback state.
    pub fn state( &self ) -> PlaybackState {
        self.lock().playback_state()
    }


    /// Gets the current queue position.
    pub fn position( &self ) -> usize {
        self.lock().queue.position()
    }


    /// Gets the current repeat mode.
    pub fn repeat_mode( &self ) -> RepeatMode {
        self.lock().queue.repeat_mode()
    }


    /// Gets the track at the current position.
    pub fn current_track( &self ) -> Option<PathBuf> {
        self.lock().queue.current().cloned()
    }


    /// Copies out everything a display needs.
    pub fn snapshot( &self ) -> EngineSnapshot {
        let state = self.lock();
        EngineSnapshot {
            tracks: state.queue.tracks().to_vec(),
            position: state.queue.position(),
            repeat_mode: state.queue.repeat_mode(),
            state: state.playback_state(),
            volume: state.volume,
        }
    }
}


impl Drop for Engine {
    fn drop( &mut self ) {
        self.stop_inner();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::{ Duration, Instant };


    #[derive( Default )]
    struct SinkLog {
        loads: Vec<PathBuf>,
        plays: usize,
        pauses: usize,
        resumes: usize,
        stops: usize,
        volume: f32,
        finished: bool,
        broken: HashSet<PathBuf>,
    }


    /// In-memory sink; tests end the loaded track with `finish`.
    #[derive( Clone, Default )]
    struct MockSink {
        log: Arc<Mutex<SinkLog>>,
    }


    impl MockSink {
        fn log( &self ) -> MutexGuard<'_, SinkLog> {
            self.log.lock().unwrap()
        }


        fn finish( &self ) {
            self.log().finished = true;
        }


        fn loads( &self ) -> usize {
            self.log().loads.len()
        }
    }


    impl Sink for MockSink {
        fn load( &mut self, track: &Path ) -> Result<(), OutputError> {
            let mut log = self.log();
            if log.broken.contains( track ) {
                return Err( OutputError::NothingLoaded );
            }
            log.finished = false;
            log.loads.push( track.to_path_buf() );
            Ok(())
        }

        fn play( &mut self ) -> Result<(), OutputError> {
            self.log().plays += 1;
            Ok(())
        }

        fn pause( &mut self ) {
            self.log().pauses += 1;
        }

        fn resume( &mut self ) {
            self.log().resumes += 1;
        }

        fn stop( &mut self ) {
            let mut log = self.log();
            log.stops += 1;
            log.finished = false;
        }

        fn set_volume( &mut self, volume: f32 ) {
            self.log().volume = volume;
        }

        fn poll_event( &mut self ) -> Option<SinkEvent> {
            let mut log = self.log();
            std::mem::take( &mut log.finished ).then_some( SinkEvent::Finished )
        }
    }


    fn paths( names: &[&str] ) -> Vec<PathBuf> {
        names.iter().map( PathBuf::from ).collect()
    }


    fn test_config() -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis( 2 ),
            ..EngineConfig::default()
        }
    }


    fn engine_with( config: EngineConfig ) -> ( Engine, MockSink ) {
        let sink = MockSink::default();
        let catalog = Arc::new( StaticCatalog::new( paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ) ) );
        let engine = Engine::new( Box::new( sink.clone() ), catalog, config );
        engine.reload_catalog().unwrap();
        ( engine, sink )
    }


    fn engine() -> ( Engine, MockSink ) {
        engine_with( test_config() )
    }


    fn wait_until( what: &str, mut cond: impl FnMut() -> bool ) {
        let deadline = Instant::now() + Duration::from_secs( 5 );
        while !cond() {
            assert!( Instant::now() < deadline, "timed out waiting for {}", what );
            thread::sleep( Duration::from_millis( 1 ) );
        }
    }


    /// Gives any live watcher several poll cycles to act.
    fn settle() {
        thread::sleep( Duration::from_millis( 30 ) );
    }


    #[test]
    fn test_start_on_empty_queue_reports_nothing_to_play() {
        let sink = MockSink::default();
        let engine = Engine::new(
            Box::new( sink.clone() ),
            Arc::new( StaticCatalog::default() ),
            test_config(),
        );

        assert!( matches!( engine.start(), Err( PlayerError::NothingToPlay ) ) );
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( sink.loads(), 0 );
    }


    #[test]
    fn test_start_loads_current_track() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();

        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( sink.log().loads, paths( &[ "a.mp3" ] ) );
        assert_eq!( sink.log().plays, 1 );
    }


    #[test]
    fn test_pause_then_start_resumes_without_reload() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();
        engine.pause();
        assert_eq!( engine.state(), PlaybackState::Paused );

        engine.start().unwrap();
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( sink.loads(), 1 );
        assert_eq!( sink.log().resumes, 1 );
    }


    #[test]
    fn test_pause_when_stopped_is_noop() {
        let ( engine, sink ) = engine();
        engine.pause();
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( sink.log().pauses, 0 );
    }


    #[test]
    fn test_completion_advances_and_plays_next() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();

        sink.finish();
        wait_until( "second load", || sink.loads() == 2 );

        assert_eq!( engine.position(), 1 );
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( sink.log().loads, paths( &[ "a.mp3", "b.mp3" ] ) );
    }


    #[test]
    fn test_completion_at_end_of_queue_stops() {
        let ( engine, sink ) = engine();
        engine.play_selection( paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ), 2 ).unwrap();

        sink.finish();
        wait_until( "stop", || engine.state() == PlaybackState::Stopped );

        assert_eq!( engine.position(), 2 );
        assert_eq!( sink.loads(), 1 );
    }


    #[test]
    fn test_rapid_starts_advance_once_per_completion() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();
        engine.start().unwrap();
        engine.start().unwrap();
        let loads_before = sink.loads();

        sink.finish();
        wait_until( "advance", || engine.position() == 1 );
        settle();

        assert_eq!( engine.position(), 1 );
        assert_eq!( sink.loads(), loads_before + 1 );

        sink.finish();
        wait_until( "second advance", || engine.position() == 2 );
        settle();
        assert_eq!( sink.loads(), loads_before + 2 );
    }


    #[test]
    fn test_concurrent_starts_advance_once_per_completion() {
        let ( engine, sink ) = engine();
        let engine = Arc::new( engine );

        let handles: Vec<_> = ( 0..4 )
            .map( |_| {
                let engine = Arc::clone( &engine );
                thread::spawn( move || {
                    for _ in 0..5 {
                        engine.start().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        sink.finish();
        wait_until( "advance", || engine.position() == 1 );
        settle();
        assert_eq!( engine.position(), 1 );
    }


    #[test]
    fn test_next_song_at_end_reports_and_keeps_playing() {
        let ( engine, sink ) = engine();
        engine.play_selection( paths( &[ "a.mp3", "b.mp3" ] ), 1 ).unwrap();

        assert!( matches!( engine.next_song(), Err( PlayerError::Queue( QueueError::EndOfQueue ) ) ) );
        assert_eq!( engine.position(), 1 );
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( sink.loads(), 1 );
    }


    #[test]
    fn test_next_and_prev_song() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();

        engine.next_song().unwrap();
        engine.next_song().unwrap();
        assert_eq!( engine.position(), 2 );

        engine.prev_song().unwrap();
        assert_eq!( engine.position(), 1 );
        assert_eq!( sink.log().loads, paths( &[ "a.mp3", "b.mp3", "c.mp3", "b.mp3" ] ) );
    }


    #[test]
    fn test_prev_song_at_start_keeps_watching() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();

        assert!( matches!( engine.prev_song(), Err( PlayerError::Queue( QueueError::NoPrevious ) ) ) );
        assert_eq!( engine.state(), PlaybackState::Playing );

        sink.finish();
        wait_until( "advance", || engine.position() == 1 );
    }


    #[test]
    fn test_next_song_while_paused_loads_fresh() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();
        engine.pause();

        engine.next_song().unwrap();
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( sink.loads(), 2 );
        assert_eq!( sink.log().resumes, 0 );
    }


    #[test]
    fn test_boundary_skip_keeps_pause() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();
        engine.pause();

        assert!( engine.prev_song().is_err() );
        assert_eq!( engine.state(), PlaybackState::Paused );
        assert_eq!( sink.loads(), 1 );

        engine.start().unwrap();
        assert_eq!( sink.log().resumes, 1 );
    }


    #[test]
    fn test_load_failure_reverts_to_stopped() {
        let ( engine, sink ) = engine();
        sink.log().broken.insert( PathBuf::from( "b.mp3" ) );
        engine.start().unwrap();

        assert!( matches!( engine.next_song(), Err( PlayerError::Output { .. } ) ) );
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( engine.position(), 1 );
    }


    #[test]
    fn test_stop_cancels_watcher() {
        let ( engine, sink ) = engine();
        engine.start().unwrap();
        engine.stop();
        assert_eq!( engine.state(), PlaybackState::Stopped );

        sink.finish();
        settle();
        assert_eq!( engine.position(), 0 );
        assert_eq!( sink.loads(), 1 );
    }


    #[test]
    fn test_cycle_repeat_mode_only_shuffle_autostarts() {
        let ( engine, sink ) = engine();

        assert_eq!( engine.cycle_repeat_mode().unwrap(), RepeatMode::One );
        assert_eq!( engine.state(), PlaybackState::Stopped );
        assert_eq!( engine.snapshot().tracks, paths( &[ "a.mp3" ] ) );

        assert_eq!( engine.cycle_repeat_mode().unwrap(), RepeatMode::Shuffle );
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( engine.position(), 0 );
        assert_eq!( sink.loads(), 1 );
        assert_eq!( engine.snapshot().tracks.len(), 3 );

        assert_eq!( engine.cycle_repeat_mode().unwrap(), RepeatMode::All );
        assert_eq!( sink.loads(), 1 );
        assert_eq!( engine.snapshot().tracks, paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
    }


    /// Catalog whose scan blocks until the test releases it.
    struct GatedCatalog {
        tracks: Vec<PathBuf>,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }


    impl Catalog for GatedCatalog {
        fn enumerate( &self ) -> Result<Vec<PathBuf>, crate::library::LibraryError> {
            let _ = self.entered.lock().unwrap().send( () );
            let _ = self.release.lock().unwrap().recv();
            Ok( self.tracks.clone() )
        }
    }


    #[test]
    fn test_catalog_scan_does_not_block_readers() {
        let ( entered_tx, entered_rx ) = mpsc::channel();
        let ( release_tx, release_rx ) = mpsc::channel();
        let catalog = Arc::new( GatedCatalog {
            tracks: paths( &[ "a.mp3", "b.mp3" ] ),
            entered: Mutex::new( entered_tx ),
            release: Mutex::new( release_rx ),
        });

        let sink = MockSink::default();
        let engine = Engine::new( Box::new( sink.clone() ), catalog, test_config() );
        engine.set_queue( paths( &[ "a.mp3" ] ) );
        engine.start().unwrap();
        // All -> One needs no scan
        engine.cycle_repeat_mode().unwrap();

        thread::scope( |scope| {
            let cycling = scope.spawn( || engine.cycle_repeat_mode() );
            entered_rx.recv_timeout( Duration::from_secs( 5 ) ).unwrap();

            // The scan is in progress; state reads and the watcher still work
            assert_eq!( engine.state(), PlaybackState::Playing );
            assert_eq!( engine.snapshot().tracks, paths( &[ "a.mp3" ] ) );
            sink.finish();
            wait_until( "completion handled", || engine.state() == PlaybackState::Stopped );

            release_tx.send( () ).unwrap();
            assert_eq!( cycling.join().unwrap().unwrap(), RepeatMode::Shuffle );
        });

        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( engine.snapshot().tracks.len(), 2 );
    }


    #[test]
    fn test_insert_next_after_current() {
        let ( engine, _sink ) = engine();
        engine.start().unwrap();

        assert!( engine.insert_next( PathBuf::from( "x.mp3" ) ).unwrap() );
        assert!( !engine.insert_next( PathBuf::from( "x.mp3" ) ).unwrap() );
        assert_eq!( engine.snapshot().tracks, paths( &[ "a.mp3", "x.mp3", "b.mp3", "c.mp3" ] ) );
    }


    #[test]
    fn test_remove_playing_track_keeps_playing_by_default() {
        let ( engine, _sink ) = engine();
        engine.start().unwrap();

        assert_eq!( engine.remove_from_queue( Path::new( "a.mp3" ) ).unwrap(), 0 );
        assert_eq!( engine.state(), PlaybackState::Playing );
        assert_eq!( engine.current_track(), Some( PathBuf::from( "b.mp3" ) ) );
    }


    #[test]
    fn test_remove_playing_track_stops_when_configured() {
        let ( engine, _sink ) = engine_with( EngineConfig {
            stop_on_remove_current: true,
            ..test_config()
        });
        engine.start().unwrap();

        engine.remove_from_queue( Path::new( "b.mp3" ) ).unwrap();
        assert_eq!( engine.state(), PlaybackState::Playing );

        engine.remove_from_queue( Path::new( "a.mp3" ) ).unwrap();
        assert_eq!( engine.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_volume_steps_and_clamps() {
        let ( engine, sink ) = engine();
        assert_eq!( engine.volume(), 0.5 );

        for _ in 0..10 {
            engine.volume_up();
        }
        assert_eq!( engine.volume(), 1.0 );
        assert_eq!( sink.log().volume, 1.0 );

        engine.volume_down();
        assert!( ( engine.volume() - 0.9 ).abs() < 1e-6 );

        for _ in 0..20 {
            engine.volume_down();
        }
        assert_eq!( engine.volume(), 0.0 );
        assert_eq!( engine.set_volume( 3.0 ), 1.0 );
    }


    #[test]
    fn test_play_selection_out_of_range() {
        let ( engine, sink ) = engine();
        assert!( engine.play_selection( paths( &[ "a.mp3" ] ), 1 ).is_err() );
        assert_eq!( engine.snapshot().tracks.len(), 3 );
        assert_eq!( sink.loads(), 0 );
    }
}
