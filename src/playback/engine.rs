//! Cpal + symphonia decode engine
//!
//! The shipped [`AudioPipeline`] implementation. Decoding and rendering run
//! on a dedicated render thread: `cpal::Stream` is not `Send`, so the stream
//! is built, driven, and dropped entirely inside that thread while the
//! pipeline object itself only holds the thread handle and control flags.
//!
//! Data path: symphonia decodes packets into f32 interleaved samples, a
//! lock-free SPSC ring buffer carries them to the cpal output callback, and
//! the callback applies the shared master volume as it copies samples out.

use crate::error::{Error, Result};
use crate::playback::pipeline::{AudioPipeline, EngineFactory, SourceFormat};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, info, warn};

/// Ring buffer capacity in samples (~0.7s of stereo 44.1kHz audio).
const RING_CAPACITY: usize = 65536;

/// Producer-side backoff while the ring is full.
const PUSH_BACKOFF: Duration = Duration::from_millis(5);

/// Builds [`CpalPipeline`] instances bound to a named output device.
pub struct CpalEngineFactory {
    device_name: Option<String>,
}

impl CpalEngineFactory {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn resolve_device(device_name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| Error::EngineBuild("no default output device".into())),
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::EngineBuild(format!("cannot enumerate devices: {}", e)))?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| Error::EngineBuild(format!("output device '{}' not found", name)))
            }
        }
    }
}

impl EngineFactory for CpalEngineFactory {
    fn create(&self, volume: Arc<Mutex<f32>>) -> Result<Box<dyn AudioPipeline>> {
        // Fail pipeline construction up front when the device is gone rather
        // than discovering it on the render thread.
        Self::resolve_device(self.device_name.as_deref())?;

        Ok(Box::new(CpalPipeline {
            device_name: self.device_name.clone(),
            volume,
            source: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            render: None,
        }))
    }
}

/// Decoded source ready to render: demuxer, decoder, and stream parameters.
struct ProbedSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    file: PathBuf,
}

/// One playback of one file through cpal.
pub struct CpalPipeline {
    device_name: Option<String>,
    volume: Arc<Mutex<f32>>,
    source: Option<ProbedSource>,
    stop_flag: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    render: Option<std::thread::JoinHandle<()>>,
}

impl AudioPipeline for CpalPipeline {
    fn configure(&mut self, file: &Path) -> Result<()> {
        let format = SourceFormat::from_path(file).ok_or_else(|| {
            Error::EngineConfig(format!("unrecognized container: {}", file.display()))
        })?;

        let media = File::open(file)?;
        let mss = MediaSourceStream::new(Box::new(media), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(format.extension());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::EngineConfig(format!("probe failed: {}", e)))?;

        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::EngineConfig("no decodable track".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &Default::default())
            .map_err(|e| Error::EngineConfig(format!("decoder init failed: {}", e)))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::EngineConfig("track has no sample rate".into()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(2);
        let track_id = track.id;

        debug!(
            "configured {}: {} Hz, {} ch",
            file.display(),
            sample_rate,
            channels
        );

        self.source = Some(ProbedSource {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            file: file.to_path_buf(),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let source = self
            .source
            .take()
            .ok_or_else(|| Error::EngineConfig("start before configure".into()))?;

        self.stop_flag.store(false, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);

        let device_name = self.device_name.clone();
        let volume = Arc::clone(&self.volume);
        let stop_flag = Arc::clone(&self.stop_flag);
        let finished = Arc::clone(&self.finished);

        let render = std::thread::Builder::new()
            .name("audio_render".into())
            .spawn(move || {
                if let Err(e) = render_thread(source, device_name, volume, &stop_flag) {
                    error!("render thread failed: {}", e);
                }
                finished.store(true, Ordering::SeqCst);
            })
            .map_err(|e| Error::EngineBuild(format!("cannot spawn render thread: {}", e)))?;

        self.render = Some(render);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(render) = self.render.take() {
            if render.join().is_err() {
                error!("render thread panicked");
            }
        }
    }
}

impl Drop for CpalPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode the source and render it to the output device. Returns when the
/// source is exhausted and the ring has drained, or when `stop_flag` is set.
fn render_thread(
    mut source: ProbedSource,
    device_name: Option<String>,
    volume: Arc<Mutex<f32>>,
    stop_flag: &AtomicBool,
) -> Result<()> {
    let device = CpalEngineFactory::resolve_device(device_name.as_deref())?;
    let stream_config = device
        .default_output_config()
        .map_err(|e| Error::EngineBuild(format!("no default output config: {}", e)))?;
    let device_rate = stream_config.sample_rate().0;
    let device_channels = stream_config.channels() as usize;

    info!(
        "rendering {} ({} Hz, {} ch) to device at {} Hz, {} ch",
        source.file.display(),
        source.sample_rate,
        source.channels,
        device_rate,
        device_channels
    );

    let ring = HeapRb::<f32>::new(RING_CAPACITY);
    let (mut producer, mut consumer) = ring.split();

    let decode_done = Arc::new(AtomicBool::new(false));
    let playback_done = Arc::new(AtomicBool::new(false));

    let callback_volume = Arc::clone(&volume);
    let callback_decode_done = Arc::clone(&decode_done);
    let callback_playback_done = Arc::clone(&playback_done);

    let stream = device
        .build_output_stream(
            &stream_config.config(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let gain = *callback_volume.lock().unwrap();
                let mut filled = 0;
                for sample in data.iter_mut() {
                    match consumer.try_pop() {
                        Some(s) => {
                            *sample = s * gain;
                            filled += 1;
                        }
                        None => *sample = 0.0,
                    }
                }
                if filled == 0 && callback_decode_done.load(Ordering::SeqCst) {
                    callback_playback_done.store(true, Ordering::SeqCst);
                }
            },
            |e| error!("output stream error: {}", e),
            None,
        )
        .map_err(|e| Error::EngineBuild(format!("cannot build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| Error::EngineBuild(format!("cannot start output stream: {}", e)))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let source_channels = source.channels;

    // Nearest-sample rate adaptation: step through source frames at the
    // source/device rate ratio and emit the closest frame for each device
    // frame. Good enough for playback; no interpolation.
    let rate_step = source.sample_rate as f64 / device_rate as f64;
    let mut frame_pos: f64 = 0.0;

    'decode: loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let packet = match source.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                debug!("end of stream");
                break;
            }
            Err(e) => {
                warn!("demux error, ending playback: {}", e);
                break;
            }
        };

        if packet.track_id() != source.track_id {
            continue;
        }

        let decoded = match source.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Recoverable per symphonia's contract; skip the packet.
                warn!("decode error, skipping packet: {}", e);
                continue;
            }
            Err(e) => {
                warn!("decoder failed, ending playback: {}", e);
                break;
            }
        };

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);

        let frames: Vec<&[f32]> = buf.samples().chunks(source_channels).collect();
        while (frame_pos as usize) < frames.len() {
            let frame = frames[frame_pos as usize];
            // Map the source frame to the device layout: repeat mono into
            // every device channel, drop extra source channels.
            for ch in 0..device_channels {
                let sample = frame[ch.min(frame.len() - 1)];
                while producer.try_push(sample).is_err() {
                    if stop_flag.load(Ordering::SeqCst) {
                        break 'decode;
                    }
                    std::thread::sleep(PUSH_BACKOFF);
                }
            }
            frame_pos += rate_step;
        }
        frame_pos -= frames.len() as f64;
    }

    decode_done.store(true, Ordering::SeqCst);

    // Let the output callback drain what the decoder pushed.
    while !stop_flag.load(Ordering::SeqCst) && !playback_done.load(Ordering::SeqCst) {
        std::thread::sleep(PUSH_BACKOFF);
    }

    // Stream drops here, stopping the callback.
    Ok(())
}
