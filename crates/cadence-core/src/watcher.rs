//! Completion watcher handle
//!
//! The engine keeps at most one of these in its single watcher slot. The
//! thread body lives in the engine; this type only carries the stop flag
//! and the means to wait for the thread.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::{ self, Receiver, RecvTimeoutError, Sender };
use std::thread::{ self, JoinHandle };
use std::time::Duration;


pub( crate ) struct Watcher {
    id: u64,
    stop: Arc<AtomicBool>,
    /// Disconnects when the thread exits
    done: Receiver<()>,
    thread: JoinHandle<()>,
}


impl Watcher {
    /// Spawns `body` on a new watcher thread.
    ///
    /// `body` receives the stop flag and a sender it must hold for as long
    /// as it runs.
    pub( crate ) fn spawn<F>( id: u64, body: F ) -> std::io::Result<Self>
    where
        F: FnOnce( Arc<AtomicBool>, Sender<()> ) + Send + 'static,
    {
        let stop = Arc::new( AtomicBool::new( false ) );
        let ( done_tx, done ) = mpsc::channel();
        let thread_stop = Arc::clone( &stop );

        let thread = thread::Builder::new()
            .name( format!( "cadence-watcher-{}", id ) )
            .spawn( move || body( thread_stop, done_tx ) )?;

        tracing::debug!( "Watcher {}: spawned", id );

        Ok( Self { id, stop, done, thread } )
    }


    pub( crate ) fn id( &self ) -> u64 {
        self.id
    }


    /// Raises the stop flag. Must be called with the engine lock held so
    /// the watcher cannot act between its own check and this store.
    pub( crate ) fn signal( &self ) {
        self.stop.store( true, Ordering::Release );
    }


    /// Waits up to `timeout` for the thread to exit, then joins it.
    ///
    /// A watcher that does not exit in time is detached. Its stop flag is
    /// already raised, so it can no longer touch the queue.
    pub( crate ) fn wait( self, timeout: Duration ) {
        match self.done.recv_timeout( timeout ) {
            Err( RecvTimeoutError::Timeout ) => {
                tracing::warn!( "Watcher {}: did not stop within {:?}, detaching", self.id, timeout );
            }
            _ => {
                if self.thread.join().is_err() {
                    tracing::error!( "Watcher {}: panicked", self.id );
                }
                tracing::debug!( "Watcher {}: joined", self.id );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_wait_joins_after_signal() {
        let watcher = Watcher::spawn( 1, |stop, _done| {
            while !stop.load( Ordering::Acquire ) {
                thread::sleep( Duration::from_millis( 1 ) );
            }
        }).unwrap();

        watcher.signal();
        watcher.wait( Duration::from_secs( 5 ) );
    }


    #[test]
    fn test_wait_detaches_stuck_watcher() {
        let ( release_tx, release_rx ) = mpsc::channel::<()>();
        let watcher = Watcher::spawn( 2, move |_stop, _done| {
            let _ = release_rx.recv();
        }).unwrap();

        watcher.signal();
        let started = std::time::Instant::now();
        watcher.wait( Duration::from_millis( 20 ) );
        assert!( started.elapsed() < Duration::from_secs( 5 ) );

        drop( release_tx );
    }
}
