//! Device-backed [`Sink`]
//!
//! A dedicated audio thread owns the cpal stream (which is not `Send`) and
//! serves load/play/pause requests over a channel. Each loaded track gets
//! its own decode thread that feeds the stream's sample buffer and raises
//! the finished flag when the file plays out.

use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::{ self, Receiver, Sender };
use std::thread::{ self, JoinHandle };
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use crate::decoder::{ StreamInfo, TrackDecoder };
use crate::output::{ AudioOutput, OutputError, SampleBuffer };
use crate::sink::{ Sink, SinkEvent };


type Reply = Sender<Result<(), OutputError>>;


enum Request {
    Load { track: PathBuf, reply: Reply },
    Play { reply: Reply },
    Pause,
    Resume,
    Stop,
    Volume( f32 ),
}


/// Sink that plays through the default system output device.
pub struct CpalSink {
    requests: Option<Sender<Request>>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}


impl CpalSink {
    /// Spawns the audio thread. No device is opened until a track loads.
    pub fn new() -> Result<Self, OutputError> {
        let ( tx, rx ) = mpsc::channel();
        let finished = Arc::new( AtomicBool::new( false ) );
        let thread_finished = Arc::clone( &finished );

        // The cpal stream is not Send, so the thread state is built in place
        let thread = thread::Builder::new()
            .name( "cadence-audio".into() )
            .spawn( move || AudioThread::new( thread_finished ).run( rx ) )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok( Self {
            requests: Some( tx ),
            finished,
            thread: Some( thread ),
        })
    }


    fn send( &self, request: Request ) -> Result<(), OutputError> {
        self.requests
            .as_ref()
            .ok_or( OutputError::Disconnected )?
            .send( request )
            .map_err( |_| OutputError::Disconnected )
    }


    fn call( &self, make: impl FnOnce( Reply ) -> Request ) -> Result<(), OutputError> {
        let ( reply, response ) = mpsc::channel();
        self.send( make( reply ) )?;
        response.recv().map_err( |_| OutputError::Disconnected )?
    }


    fn notify( &self, request: Request ) {
        if let Err( e ) = self.send( request ) {
            tracing::warn!( "Audio request dropped: {}", e );
        }
    }
}


impl Sink for CpalSink {
    fn load( &mut self, track: &Path ) -> Result<(), OutputError> {
        let track = track.to_path_buf();
        self.call( |reply| Request::Load { track, reply } )
    }


    fn play( &mut self ) -> Result<(), OutputError> {
        self.call( |reply| Request::Play { reply } )
    }


    fn pause( &mut self ) {
        self.notify( Request::Pause );
    }


    fn resume( &mut self ) {
        self.notify( Request::Resume );
    }


    fn stop( &mut self ) {
        self.notify( Request::Stop );
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.notify( Request::Volume( volume ) );
    }


    fn poll_event( &mut self ) -> Option<SinkEvent> {
        self.finished
            .swap( false, Ordering::AcqRel )
            .then_some( SinkEvent::Finished )
    }
}


impl Drop for CpalSink {
    fn drop( &mut self ) {
        // Closing the channel ends the audio thread
        self.requests.take();
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


/// State owned by the audio thread.
struct AudioThread {
    active: Option<ActiveTrack>,
    volume: f32,
    finished: Arc<AtomicBool>,
}


impl AudioThread {
    fn new( finished: Arc<AtomicBool> ) -> Self {
        Self {
            active: None,
            volume: 1.0,
            finished,
        }
    }


    fn run( mut self, requests: Receiver<Request> ) {
        while let Ok( request ) = requests.recv() {
            match request {
                Request::Load { track, reply } => {
                    let _ = reply.send( self.load( &track ) );
                }
                Request::Play { reply } => {
                    let _ = reply.send( self.play() );
                }
                Request::Pause => {
                    if let Some( ref active ) = self.active {
                        active.sample_buffer.set_paused( true );
                    }
                }
                Request::Resume => {
                    if let Some( ref active ) = self.active {
                        active.sample_buffer.set_paused( false );
                    }
                }
                Request::Stop => self.unload(),
                Request::Volume( volume ) => {
                    self.volume = volume;
                    if let Some( ref active ) = self.active {
                        active.sample_buffer.set_volume( volume );
                    }
                }
            }
        }

        self.unload();
        tracing::debug!( "Audio thread: exiting" );
    }


    fn load( &mut self, track: &Path ) -> Result<(), OutputError> {
        self.unload();
        let active = ActiveTrack::open( track, self.volume, Arc::clone( &self.finished ) )?;
        self.active = Some( active );
        Ok(())
    }


    fn play( &mut self ) -> Result<(), OutputError> {
        let active = self.active.as_ref().ok_or( OutputError::NothingLoaded )?;
        active.output.play()?;
        active.sample_buffer.set_paused( false );
        Ok(())
    }


    fn unload( &mut self ) {
        if let Some( active ) = self.active.take() {
            active.shutdown();
        }
        // A track that was cut short never reports completion
        self.finished.store( false, Ordering::Release );
    }
}


/// A loaded track: its output stream and decode thread.
struct ActiveTrack {
    stop_flag: Arc<AtomicBool>,
    sample_buffer: Arc<SampleBuffer>,
    output: AudioOutput,
    decode_thread: Option<JoinHandle<()>>,
}


impl ActiveTrack {
    /// Opens `track` in the paused state.
    fn open( track: &Path, volume: f32, finished: Arc<AtomicBool> ) -> Result<Self, OutputError> {
        let decoder = TrackDecoder::open( track )?;
        let StreamInfo { sample_rate: source_rate, channels, .. } = decoder.info();

        let ( output, sample_buffer ) = AudioOutput::new( source_rate, channels as u16 )?;
        sample_buffer.set_volume( volume );
        sample_buffer.set_paused( true );

        let resampler = if source_rate != output.sample_rate() {
            tracing::debug!( "Resampling: {} Hz → {} Hz", source_rate, output.sample_rate() );
            Some( Resample::new( source_rate, output.sample_rate(), channels )? )
        } else {
            None
        };

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let feed = DecodeFeed {
            decoder,
            resampler,
            chunk: Vec::new(),
            sample_buffer: Arc::clone( &sample_buffer ),
            stop_flag: Arc::clone( &stop_flag ),
            finished,
        };

        let decode_thread = thread::Builder::new()
            .name( "cadence-decode".into() )
            .spawn( move || feed.run() )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        tracing::info!( "Loaded: {:?}", track );

        Ok( Self {
            stop_flag,
            sample_buffer,
            output,
            decode_thread: Some( decode_thread ),
        })
    }


    fn shutdown( mut self ) {
        self.stop_flag.store( true, Ordering::Release );
        self.sample_buffer.clear();
        if let Some( thread ) = self.decode_thread.take() {
            let _ = thread.join();
        }
        // Dropping the output stops the cpal stream
    }
}


/// Planar resampling stage between the decoder and the sample buffer.
struct Resample {
    resampler: FastFixedOut<f32>,
    pending: Vec<Vec<f32>>,
}


impl Resample {
    fn new( from: u32, to: u32, channels: usize ) -> Result<Self, OutputError> {
        let resampler = FastFixedOut::<f32>::new(
            to as f64 / from as f64,
            2.0,
            PolynomialDegree::Cubic,
            1024,
            channels,
        ).map_err( |e| OutputError::Resampler( e.to_string() ) )?;

        Ok( Self {
            resampler,
            pending: vec![ Vec::new(); channels ],
        })
    }


    /// Accepts interleaved samples and returns whatever full chunks could
    /// be resampled, interleaved.
    fn process( &mut self, samples: &[f32] ) -> Vec<f32> {
        let channels = self.pending.len();
        for frame in samples.chunks_exact( channels ) {
            for ( ch, sample ) in frame.iter().enumerate() {
                self.pending[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self.pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match self.resampler.process( &chunk, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Resamples the partial chunk left at end of file.
    fn flush( &mut self ) -> Vec<f32> {
        if self.pending[ 0 ].is_empty() {
            return Vec::new();
        }
        match self.resampler.process_partial( Some( &self.pending ), None ) {
            Ok( resampled ) => {
                self.pending.iter_mut().for_each( Vec::clear );
                interleave( &resampled )
            }
            Err( e ) => {
                tracing::error!( "Final resample error: {}", e );
                Vec::new()
            }
        }
    }
}


/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map_or( 0, Vec::len );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        out.extend( channels.iter().map( |ch| ch[ f ] ) );
    }
    out
}


/// Decode thread body for one track.
struct DecodeFeed {
    decoder: TrackDecoder,
    resampler: Option<Resample>,
    /// Reused decode output
    chunk: Vec<f32>,
    sample_buffer: Arc<SampleBuffer>,
    stop_flag: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}


impl DecodeFeed {
    fn stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Acquire )
    }


    fn run( mut self ) {
        // Keep about 50ms decoded ahead of the device
        let info = self.decoder.info();
        let target_buffer = ( info.sample_rate as usize * info.channels ) / 20;

        loop {
            if self.stopped() {
                tracing::debug!( "Decode loop: stop signal received" );
                return;
            }

            if self.sample_buffer.is_paused() {
                thread::sleep( Duration::from_millis( 10 ) );
                continue;
            }

            if self.sample_buffer.len() > target_buffer {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            self.chunk.clear();
            match self.decoder.next_chunk( &mut self.chunk ) {
                Ok( true ) => {
                    let chunk = std::mem::take( &mut self.chunk );
                    match self.resampler {
                        Some( ref mut resampler ) => {
                            let resampled = resampler.process( &chunk );
                            self.push_all( &resampled );
                        }
                        None => self.push_all( &chunk ),
                    }
                    self.chunk = chunk;
                }
                Ok( false ) => {
                    tracing::debug!( "Decode loop: reached end of file" );
                    break;
                }
                Err( e ) => {
                    // The rest of the file is unplayable; treat it as the end
                    tracing::error!( "Decode error: {}", e );
                    break;
                }
            }
        }

        if let Some( ref mut resampler ) = self.resampler {
            let tail = resampler.flush();
            self.push_all( &tail );
        }

        while !self.sample_buffer.is_empty() && !self.stopped() {
            thread::sleep( Duration::from_millis( 10 ) );
        }

        if !self.stopped() {
            self.finished.store( true, Ordering::Release );
        }
    }


    fn push_all( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.stopped() {
            let pushed = self.sample_buffer.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 3.0, 4.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 3.0, 2.0, 4.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_resample_passes_through_whole_chunks() {
        let mut resample = Resample::new( 44100, 48000, 2 ).unwrap();
        let input = vec![ 0.0_f32; 2 * 4096 ];

        let out = resample.process( &input );
        assert_eq!( out.len() % 2, 0 );
        assert!( !out.is_empty() );
    }
}
