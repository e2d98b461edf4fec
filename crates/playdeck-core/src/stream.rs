//! Streaming audio engine
//!
//! Each sound owns a decoder thread that feeds a cpal output stream through
//! a `SampleBuffer`, resampling when the device cannot run at the file's
//! rate. When the file is exhausted and the buffer has drained, the thread
//! runs the sound's end callback.

use std::path::Path;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use crate::decoder::Decoder;
use crate::engine::{ AudioEngine, EndCallback, EngineError, Sound };
use crate::output::{ self, AudioOutput, SampleBuffer };


/// Converts planar samples to interleaved.
/// [[L0, L1, ...], [R0, R1, ...]] -> [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map( |c| c.len() ).unwrap_or( 0 );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


#[derive( Default )]
struct EndState {
    finished: bool,
    callback: Option<EndCallback>,
}


/// End-of-file state shared by a sound and its decode thread.
///
/// The callback runs whenever the sound is finished and has a callback,
/// whichever of the two happens last.
#[derive( Default )]
struct EndNotifier {
    state: Mutex<EndState>,
}


impl EndNotifier {
    fn lock( &self ) -> MutexGuard<'_, EndState> {
        self.state.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Stores the callback, running it at once if the end was already
    /// reached. Returns false if a callback is already registered.
    fn register( &self, callback: EndCallback ) -> bool {
        let mut state = self.lock();
        if state.callback.is_some() {
            return false;
        }
        if state.finished {
            callback();
        }
        state.callback = Some( callback );
        true
    }


    /// Called by the decode thread once the last sample has been played.
    fn finish( &self ) {
        let mut state = self.lock();
        state.finished = true;
        if let Some( callback ) = state.callback.as_ref() {
            callback();
        }
    }


    /// Reports the end again when a finished sound is restarted.
    fn replay( &self ) {
        let state = self.lock();
        if let ( true, Some( callback ) ) = ( state.finished, state.callback.as_ref() ) {
            callback();
        }
    }


    fn is_finished( &self ) -> bool {
        self.lock().finished
    }
}


/// Engine backed by symphonia decoding and the default cpal device.
#[derive( Debug )]
pub struct StreamingEngine {
    _private: (),
}


impl StreamingEngine {
    /// Checks that an output device exists.
    pub fn new() -> Result<Self, EngineError> {
        if !output::has_output_device() {
            return Err( EngineError::NoDevice );
        }
        Ok( Self { _private: () } )
    }
}


impl AudioEngine for StreamingEngine {
    type Sound = StreamSound;

    fn load_streaming( &mut self, path: &Path ) -> Result<StreamSound, EngineError> {
        StreamSound::open( path )
    }
}


/// One streaming sound. Dropping it stops the decoder thread and closes
/// the device stream.
pub struct StreamSound {
    // Kept alive for its Drop impl, which closes the device stream
    output: AudioOutput,
    sample_buffer: Arc<SampleBuffer>,
    stop_flag: Arc<AtomicBool>,
    end: Arc<EndNotifier>,
    thread: Option<thread::JoinHandle<()>>,
}


impl StreamSound {
    fn open( path: &Path ) -> Result<Self, EngineError> {
        let decoder = Decoder::open( path )
            .map_err( |e| EngineError::Load( e.to_string() ) )?;

        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();

        let ( output, sample_buffer ) = AudioOutput::new( source_rate, channels as u16 )
            .map_err( |e| EngineError::Output( e.to_string() ) )?;

        let target_rate = output.sample_rate();
        let resampler = if source_rate != target_rate {
            tracing::debug!( "Resampling: {} Hz -> {} Hz", source_rate, target_rate );
            let resampler = FastFixedOut::<f32>::new(
                target_rate as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                1024,
                channels,
            ).map_err( |e| EngineError::Output( format!( "Failed to create resampler: {}", e ) ) )?;
            Some( resampler )
        } else {
            None
        };

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let end = Arc::new( EndNotifier::default() );

        let worker = DecodeWorker {
            decoder,
            resampler,
            sample_buffer: Arc::clone( &sample_buffer ),
            stop_flag: Arc::clone( &stop_flag ),
            end: Arc::clone( &end ),
        };

        let thread = thread::Builder::new()
            .name( "playdeck-decode".into() )
            .spawn( move || worker.run() )
            .map_err( |e| EngineError::Output( format!( "Failed to spawn decode thread: {}", e ) ) )?;

        Ok( Self {
            output,
            sample_buffer,
            stop_flag,
            end,
            thread: Some( thread ),
        })
    }
}


impl Sound for StreamSound {
    fn start( &mut self ) -> Result<(), EngineError> {
        self.output.play().map_err( |e| EngineError::Output( e.to_string() ) )?;
        self.sample_buffer.set_paused( false );
        // A sound restarted after its end has nothing left to play
        self.end.replay();
        Ok(())
    }


    fn stop( &mut self ) -> Result<(), EngineError> {
        // The stream keeps running and plays silence, so resuming is instant
        self.sample_buffer.set_paused( true );
        Ok(())
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.sample_buffer.set_volume( volume );
    }


    fn is_playing( &self ) -> bool {
        !self.sample_buffer.is_paused() && !self.end.is_finished()
    }


    fn on_end( &mut self, callback: EndCallback ) {
        if !self.end.register( callback ) {
            tracing::warn!( "End callback already registered, ignoring" );
        }
    }
}


impl Drop for StreamSound {
    fn drop( &mut self ) {
        self.stop_flag.store( true, Ordering::Release );
        self.sample_buffer.clear();
        if let Some( thread ) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!( "Decode thread panicked" );
            }
        }
    }
}


/// State moved onto a sound's decoder thread.
struct DecodeWorker {
    decoder: Decoder,
    resampler: Option<FastFixedOut<f32>>,
    sample_buffer: Arc<SampleBuffer>,
    stop_flag: Arc<AtomicBool>,
    end: Arc<EndNotifier>,
}


impl DecodeWorker {
    fn stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Acquire )
    }


    fn run( mut self ) {
        let channels = self.decoder.channels();
        // Roughly 50ms of audio ahead of the device
        let target_buffer = ( self.decoder.sample_rate() as usize * channels ) / 20;
        let mut pending: Vec<Vec<f32>> = ( 0..channels ).map( |_| Vec::new() ).collect();

        loop {
            if self.stopped() {
                tracing::debug!( "Decode loop: stop signal received" );
                return;
            }

            if self.sample_buffer.len() > target_buffer {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    let samples = self.resample( samples, &mut pending );
                    self.push_all( &samples );
                }
                Ok( None ) => {
                    self.flush( &mut pending );
                    break;
                }
                Err( e ) => {
                    // Treat an unrecoverable decode error as the end of the track
                    tracing::error!( "Decode error: {}", e );
                    break;
                }
            }
        }

        while !self.sample_buffer.is_empty() && !self.stopped() {
            thread::sleep( Duration::from_millis( 10 ) );
        }
        if self.stopped() {
            return;
        }

        tracing::debug!( "Decode loop: reached end of file" );
        self.end.finish();
    }


    /// Passes samples through the resampler, if there is one. Input is
    /// buffered in `pending` until a full resampler chunk is available.
    fn resample( &mut self, samples: Vec<f32>, pending: &mut [Vec<f32>] ) -> Vec<f32> {
        let Some( resampler ) = self.resampler.as_mut() else {
            return samples;
        };

        let channels = pending.len();
        for frame in samples.chunks( channels ) {
            for ( ch, sample ) in frame.iter().enumerate() {
                pending[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while pending[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = pending.iter_mut().map( |ch| ch.drain( ..needed ).collect() ).collect();
            match resampler.process( &chunk, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Resamples whatever is left at end of file.
    fn flush( &mut self, pending: &mut [Vec<f32>] ) {
        let Some( resampler ) = self.resampler.as_mut() else {
            return;
        };
        if pending.first().map_or( true, |ch| ch.is_empty() ) {
            return;
        }

        match resampler.process_partial( Some( &*pending ), None ) {
            Ok( resampled ) => {
                let samples = interleave( &resampled );
                self.push_all( &samples );
            }
            Err( e ) => tracing::error!( "Final resample error: {}", e ),
        }
        for ch in pending.iter_mut() {
            ch.clear();
        }
    }


    /// Blocks until every sample is queued or the sound is released.
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
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 3.0, 4.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 3.0, 2.0, 4.0 ] );
    }


    #[test]
    fn test_interleave_empty() {
        assert!( interleave( &[] ).is_empty() );
        assert!( interleave( &[ Vec::new() ] ).is_empty() );
    }


    /// Writes a mono 8 kHz sawtooth of `frames` samples.
    fn write_wav( dir: &Path, frames: usize ) -> PathBuf {
        let path = dir.join( "short.wav" );
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create( &path, spec ).unwrap();
        for i in 0..frames {
            writer.write_sample( ( ( i % 64 ) as i16 - 32 ) * 256 ).unwrap();
        }
        writer.finalize().unwrap();
        path
    }


    struct Rig {
        worker: DecodeWorker,
        buffer: Arc<SampleBuffer>,
        stop: Arc<AtomicBool>,
        end: Arc<EndNotifier>,
    }


    fn rig( path: &Path ) -> Rig {
        let buffer = Arc::new( SampleBuffer::new( 4096, 1, 1 ) );
        let stop = Arc::new( AtomicBool::new( false ) );
        let end = Arc::new( EndNotifier::default() );
        let worker = DecodeWorker {
            decoder: Decoder::open( path ).unwrap(),
            resampler: None,
            sample_buffer: Arc::clone( &buffer ),
            stop_flag: Arc::clone( &stop ),
            end: Arc::clone( &end ),
        };
        Rig { worker, buffer, stop, end }
    }


    fn counting_callback() -> ( Arc<AtomicUsize>, EndCallback ) {
        let calls = Arc::new( AtomicUsize::new( 0 ) );
        let counter = Arc::clone( &calls );
        let callback: EndCallback = Box::new( move || {
            counter.fetch_add( 1, Ordering::SeqCst );
        });
        ( calls, callback )
    }


    /// Runs the worker to completion, consuming its output the way the
    /// device callback would.
    fn play_out( worker: DecodeWorker, buffer: &SampleBuffer ) {
        let handle = thread::spawn( move || worker.run() );
        let mut out = [ 0.0; 256 ];
        while !handle.is_finished() {
            buffer.pop( &mut out );
            thread::sleep( Duration::from_millis( 1 ) );
        }
        handle.join().unwrap();
    }


    #[test]
    fn test_end_callback_runs_once_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig( &write_wav( dir.path(), 2048 ) );
        let ( calls, callback ) = counting_callback();
        assert!( rig.end.register( callback ) );

        play_out( rig.worker, &rig.buffer );

        assert!( rig.end.is_finished() );
        assert!( rig.buffer.is_empty() );
        assert_eq!( calls.load( Ordering::SeqCst ), 1 );
    }


    #[test]
    fn test_callback_registered_after_end_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig( &write_wav( dir.path(), 64 ) );
        play_out( rig.worker, &rig.buffer );
        assert!( rig.end.is_finished() );

        let ( calls, callback ) = counting_callback();
        assert!( rig.end.register( callback ) );
        assert_eq!( calls.load( Ordering::SeqCst ), 1 );

        // Restarting a finished sound reports the end again
        rig.end.replay();
        assert_eq!( calls.load( Ordering::SeqCst ), 2 );
    }


    #[test]
    fn test_stopped_worker_does_not_report_end() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig( &write_wav( dir.path(), 2048 ) );
        let ( calls, callback ) = counting_callback();
        rig.end.register( callback );

        rig.stop.store( true, Ordering::Release );
        play_out( rig.worker, &rig.buffer );

        assert!( !rig.end.is_finished() );
        assert_eq!( calls.load( Ordering::SeqCst ), 0 );
    }


    #[test]
    fn test_second_registration_is_rejected() {
        let end = EndNotifier::default();
        let ( first, callback ) = counting_callback();
        let ( second, other ) = counting_callback();
        assert!( end.register( callback ) );
        assert!( !end.register( other ) );

        end.finish();
        assert_eq!( first.load( Ordering::SeqCst ), 1 );
        assert_eq!( second.load( Ordering::SeqCst ), 0 );
    }


    #[test]
    fn test_replay_before_end_does_nothing() {
        let end = EndNotifier::default();
        let ( calls, callback ) = counting_callback();
        end.register( callback );

        end.replay();
        assert_eq!( calls.load( Ordering::SeqCst ), 0 );
    }
}
