//! Output subsystem contract
//!
//! The engine drives audio through a [`Sink`]: it loads one track at a
//! time, toggles playback, and polls for the natural end of the track.

use std::path::Path;

use crate::output::OutputError;


/// Events delivered by a sink through [`Sink::poll_event`].
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum SinkEvent {
    /// The loaded track played to its end. Never sent after an explicit
    /// `stop` or `load`.
    Finished,
}


/// An audio output that plays one track at a time.
pub trait Sink: Send {
    /// Loads `track`, replacing whatever was loaded. Playback does not
    /// begin until [`Sink::play`].
    fn load( &mut self, track: &Path ) -> Result<(), OutputError>;

    /// Begins playing the loaded track.
    fn play( &mut self ) -> Result<(), OutputError>;

    /// Suspends the loaded track.
    fn pause( &mut self );

    /// Continues a suspended track.
    fn resume( &mut self );

    /// Unloads the current track without emitting [`SinkEvent::Finished`].
    fn stop( &mut self );

    /// Sets the output volume (0.0 to 1.0).
    fn set_volume( &mut self, volume: f32 );

    /// Takes the next pending event, if any.
    fn poll_event( &mut self ) -> Option<SinkEvent>;
}
