//! Track decoding via Symphonia
//!
//! Turns a track file into interleaved f32 PCM for the decode feed.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format: {0}" )]
    UnsupportedFormat( #[source] SymphoniaError ),

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "No decoder for codec: {0}" )]
    NoCodec( #[source] SymphoniaError ),

    #[error( "Decode error: {0}" )]
    Decode( #[source] SymphoniaError ),
}


/// Stream parameters of an opened track.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: usize,
}


/// Decoder for a single track file.
pub struct TrackDecoder {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    scratch: Option<SampleBuffer<f32>>,
}


impl TrackDecoder {
    /// Probes `path` and prepares a decoder for its first audio track.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let source = MediaSourceStream::new(
            Box::new( File::open( path )? ),
            MediaSourceStreamOptions::default(),
        );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let reader = symphonia::default::get_probe()
            .format( &hint, source, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( DecoderError::UnsupportedFormat )?
            .format;

        let track = reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let params = &track.codec_params;
        let info = StreamInfo {
            sample_rate: params.sample_rate.unwrap_or( 44100 ),
            channels: params.channels.map( |c| c.count() ).unwrap_or( 2 ),
        };
        let track_id = track.id;

        let codec = symphonia::default::get_codecs()
            .make( params, &DecoderOptions::default() )
            .map_err( DecoderError::NoCodec )?;

        tracing::debug!( "Opened {:?}: {:?}", path, info );

        Ok( Self {
            reader,
            codec,
            track_id,
            info,
            scratch: None,
        })
    }


    /// Gets the stream parameters.
    pub fn info( &self ) -> StreamInfo {
        self.info
    }


    /// Appends the next packet's samples, interleaved, to `out`.
    ///
    /// Returns false at the end of the stream.
    pub fn next_chunk( &mut self, out: &mut Vec<f32> ) -> Result<bool, DecoderError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok( false ),
                Err( e ) => return Err( DecoderError::Decode( e ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.codec.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Skip corrupt packets
                Err( SymphoniaError::DecodeError( msg ) ) => {
                    tracing::debug!( "Skipping packet: {}", msg );
                    continue;
                }
                Err( e ) => return Err( DecoderError::Decode( e ) ),
            };

            let frames = decoded.capacity();
            if self.scratch.as_ref().is_some_and( |buf| buf.capacity() < frames ) {
                self.scratch = None;
            }
            let spec = *decoded.spec();
            let scratch = self.scratch
                .get_or_insert_with( || SampleBuffer::new( frames as u64, spec ) );
            scratch.copy_interleaved_ref( decoded );
            out.extend_from_slice( scratch.samples() );

            return Ok( true );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::io::Write;


    /// Writes a silent 16-bit PCM WAV file.
    fn write_wav( path: &Path, sample_rate: u32, channels: u16, frames: u32 ) {
        let data_len = frames * channels as u32 * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice( b"RIFF" );
        bytes.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
        bytes.extend_from_slice( b"WAVEfmt " );
        bytes.extend_from_slice( &16u32.to_le_bytes() );
        bytes.extend_from_slice( &1u16.to_le_bytes() );
        bytes.extend_from_slice( &channels.to_le_bytes() );
        bytes.extend_from_slice( &sample_rate.to_le_bytes() );
        bytes.extend_from_slice( &( sample_rate * channels as u32 * 2 ).to_le_bytes() );
        bytes.extend_from_slice( &( channels * 2 ).to_le_bytes() );
        bytes.extend_from_slice( &16u16.to_le_bytes() );
        bytes.extend_from_slice( b"data" );
        bytes.extend_from_slice( &data_len.to_le_bytes() );
        bytes.resize( bytes.len() + data_len as usize, 0 );

        File::create( path ).unwrap().write_all( &bytes ).unwrap();
    }


    #[test]
    fn test_decode_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "silence.wav" );
        write_wav( &path, 8000, 2, 400 );

        let mut decoder = TrackDecoder::open( &path ).unwrap();
        assert_eq!( decoder.info().sample_rate, 8000 );
        assert_eq!( decoder.info().channels, 2 );

        let mut samples = Vec::new();
        while decoder.next_chunk( &mut samples ).unwrap() {}
        assert_eq!( samples.len(), 800 );
        assert!( samples.iter().all( |s| *s == 0.0 ) );
    }


    #[test]
    fn test_open_missing_file() {
        let result = TrackDecoder::open( Path::new( "/nonexistent/track.mp3" ) );
        assert!( matches!( result, Err( DecoderError::FileOpen( _ ) ) ) );
    }


    #[test]
    fn test_open_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "notes.mp3" );
        std::fs::write( &path, b"definitely not audio" ).unwrap();

        assert!( TrackDecoder::open( &path ).is_err() );
    }
}
