//! Cadence Core - Music player engine
//!
//! This crate provides the playback queue, the playback engine with its
//! completion watcher, the playlist store, and the audio output built on
//! symphonia and cpal.

pub mod command;
pub mod config;
pub mod cpal_sink;
pub mod decoder;
pub mod engine;
pub mod library;
pub mod output;
pub mod queue;
pub mod sink;
pub mod store;
mod watcher;

pub use command::{ Command, CommandError, PlaylistCommand };
pub use config::EngineConfig;
pub use cpal_sink::CpalSink;
pub use engine::{ Engine, EngineSnapshot, PlaybackState, PlayerError };
pub use library::{ Catalog, LibraryError, LibraryScanner, StaticCatalog };
pub use queue::{ Queue, QueueError, RepeatMode };
pub use sink::{ Sink, SinkEvent };
pub use store::{ PlaylistStore, StoreError, FAVORITES };
