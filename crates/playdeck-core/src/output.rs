//! Audio output via cpal
//!
//! Sends decoded PCM to the default output device.

use std::collections::VecDeque;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to control stream: {0}" )]
    PlayStream( String ),
}


/// Returns true if the default host has an output device.
pub fn has_output_device() -> bool {
    cpal::default_host().default_output_device().is_some()
}


/// Sample queue shared between a decode thread (producer) and the device
/// callback (consumer). Converts channel layouts and applies gain on the
/// way out.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// f32 bits
    volume: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl SampleBuffer {
    /// Creates a buffer holding at most `capacity` source samples.
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels as usize,
            output_channels: output_channels as usize,
        }
    }


    fn queue( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Queues as many samples as fit. Returns how many were taken.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.queue();
        let to_push = samples.len().min( self.capacity.saturating_sub( buf.len() ) );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` for the device. Writes silence while paused or when
    /// the queue runs dry. Returns the number of output samples carrying audio.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        if self.is_paused() {
            output.fill( 0.0 );
            return 0;
        }

        let written = {
            let mut buf = self.queue();
            remix( &mut buf, output, self.source_channels, self.output_channels )
        };
        output[ written.. ].fill( 0.0 );

        let volume = self.volume();
        if volume != 1.0 {
            for sample in output[ ..written ].iter_mut() {
                *sample *= volume;
            }
        }

        written
    }


    /// Returns the number of queued samples.
    pub fn len( &self ) -> usize {
        self.queue().len()
    }


    /// Returns true if nothing is queued.
    pub fn is_empty( &self ) -> bool {
        self.queue().is_empty()
    }


    /// Drops everything queued.
    pub fn clear( &self ) {
        self.queue().clear();
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the gain applied on output.
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// Moves whole frames from `buf` into `output`, converting from `src_ch` to
/// `out_ch` channels. Mono is duplicated, downmixing to mono averages, and
/// other layouts copy matching channels and repeat the last source channel.
fn remix( buf: &mut VecDeque<f32>, output: &mut [f32], src_ch: usize, out_ch: usize ) -> usize {
    if src_ch == 0 || out_ch == 0 {
        return 0;
    }

    if src_ch == out_ch {
        let n = output.len().min( buf.len() );
        for ( dst, src ) in output.iter_mut().zip( buf.drain( ..n ) ) {
            *dst = src;
        }
        return n;
    }

    let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
    for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
        if out_ch == 1 {
            out_frame[ 0 ] = buf.iter().take( src_ch ).sum::<f32>() / src_ch as f32;
        } else {
            for ( ch, dst ) in out_frame.iter_mut().enumerate() {
                *dst = buf[ ch.min( src_ch - 1 ) ];
            }
        }
        buf.drain( ..src_ch );
    }

    frames * out_ch
}


/// An open output stream on the default device.
///
/// Not Send: `cpal::Stream` must stay on the thread that built it.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Opens the default device for audio at `source_sample_rate` with
    /// `source_channels`, and returns the buffer the caller should fill.
    ///
    /// The stream is created stopped and its buffer paused.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();
        let rate_fits = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        // Prefer the file's own layout, then its rate with any layout, then the device default
        let config = if let Some( c ) = supported.iter()
            .find( |c| c.channels() == source_channels && rate_fits( *c ) )
            .or_else( || supported.iter().find( |c| rate_fits( *c ) ) )
        {
            c.clone().with_sample_rate( cpal::SampleRate( source_sample_rate ) ).config()
        } else {
            let default_config = device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::debug!(
                "Device cannot run at {} Hz, using {} Hz",
                source_sample_rate,
                default_config.sample_rate().0
            );
            default_config.config()
        };

        tracing::debug!( "Audio output config: {} Hz, {} channels", config.sample_rate.0, config.channels );

        // About half a second of source audio
        let capacity = ( source_sample_rate as usize ) * ( source_channels as usize ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new( capacity, source_channels, config.channels ) );
        sample_buffer.set_paused( true );
        let consumer = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    consumer.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
            },
            sample_buffer,
        ))
    }


    /// Starts the device stream.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Gets the rate the device actually runs at.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buf = SampleBuffer::new( 4, 2, 2 );
        assert_eq!( buf.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( buf.len(), 4 );
        assert_eq!( buf.push( &[ 0.1 ] ), 0 );
    }


    #[test]
    fn test_pop_same_layout_pads_silence() {
        let buf = SampleBuffer::new( 16, 2, 2 );
        buf.push( &[ 0.1, 0.2 ] );

        let mut out = [ 9.0; 4 ];
        assert_eq!( buf.pop( &mut out ), 2 );
        assert_eq!( out, [ 0.1, 0.2, 0.0, 0.0 ] );
        assert!( buf.is_empty() );
    }


    #[test]
    fn test_pop_mono_to_stereo() {
        let buf = SampleBuffer::new( 16, 1, 2 );
        buf.push( &[ 0.5, 0.25 ] );

        let mut out = [ 0.0; 4 ];
        assert_eq!( buf.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.5, 0.5, 0.25, 0.25 ] );
    }


    #[test]
    fn test_pop_stereo_to_mono() {
        let buf = SampleBuffer::new( 16, 2, 1 );
        buf.push( &[ 0.2, 0.4, 1.0, 0.0 ] );

        let mut out = [ 0.0; 2 ];
        assert_eq!( buf.pop( &mut out ), 2 );
        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert!( ( out[ 1 ] - 0.5 ).abs() < 1e-6 );
    }


    #[test]
    fn test_pop_stereo_to_quad_repeats_last_channel() {
        let buf = SampleBuffer::new( 16, 2, 4 );
        buf.push( &[ 0.1, 0.2 ] );

        let mut out = [ 0.0; 4 ];
        assert_eq!( buf.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.1, 0.2, 0.2, 0.2 ] );
    }


    #[test]
    fn test_pop_applies_volume() {
        let buf = SampleBuffer::new( 16, 1, 1 );
        buf.set_volume( 0.5 );
        buf.push( &[ 0.8 ] );

        let mut out = [ 0.0; 1 ];
        buf.pop( &mut out );
        assert!( ( out[ 0 ] - 0.4 ).abs() < 1e-6 );
    }


    #[test]
    fn test_paused_outputs_silence_and_keeps_queue() {
        let buf = SampleBuffer::new( 16, 1, 1 );
        buf.push( &[ 0.8, 0.8 ] );
        buf.set_paused( true );

        let mut out = [ 1.0; 2 ];
        assert_eq!( buf.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0, 0.0 ] );
        assert_eq!( buf.len(), 2 );
    }
}
