//! Native audio backend: symphonia decode + one mixed cpal output stream.
//!
//! Ambient loops are short, so each source is decoded fully into memory at
//! `open`, resampled to the device rate, and laid out in the device channel
//! count. Every playing voice is summed into a single output stream that
//! runs on its own thread for the lifetime of the backend.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::{self, extension_for_mime};
use super::{AudioBackend, Voice};
use crate::error::{ChillError, ChillResult};

/// Shared between the backend, its voices, and the output callback.
struct MixState {
    voices: Mutex<Vec<Arc<VoiceState>>>,
    device_rate: u32,
    out_channels: u16,
    stop_signal: AtomicBool,
    /// Set once the output thread has a live stream.
    running: AtomicBool,
    output: Mutex<Option<thread::JoinHandle<()>>>,
}

/// One decoded source and its playback controls.
struct VoiceState {
    /// Interleaved at the device rate and channel count.
    pcm: Vec<f32>,
    cursor: AtomicUsize,
    playing: AtomicBool,
    looping: AtomicBool,
    /// f32 bits.
    volume: AtomicU32,
}

impl VoiceState {
    fn new(pcm: Vec<f32>) -> Self {
        Self {
            pcm,
            cursor: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            volume: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }
}

/// Thread-safe native backend.
pub struct NativeBackend {
    state: Arc<MixState>,
}

impl NativeBackend {
    pub fn new() -> Self {
        let (device_rate, out_channels) = probe_device();
        Self {
            state: Arc::new(MixState {
                voices: Mutex::new(Vec::new()),
                device_rate,
                out_channels,
                stop_signal: AtomicBool::new(false),
                running: AtomicBool::new(false),
                output: Mutex::new(None),
            }),
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.state.stop_signal.store(true, Ordering::SeqCst);
        let handle = self.state.output.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl AudioBackend for NativeBackend {
    fn open(&self, source_url: &str) -> ChillResult<Box<dyn Voice>> {
        let src = source::resolve(source_url)?;
        let hint_ext = src.mime.as_deref().and_then(extension_for_mime);
        let (pcm, rate, channels) = decode_all(src.bytes, hint_ext)?;

        let mut resampler = LinearResampler::new(rate, self.state.device_rate, channels);
        let pcm = resampler.process(&pcm);
        let out_channels = self.state.out_channels;
        let pcm = if channels == out_channels {
            pcm
        } else {
            let frames = pcm.len() / channels.max(1) as usize;
            let mut adapted = vec![0.0f32; frames * out_channels as usize];
            adapt_channels(&pcm, channels, &mut adapted, out_channels);
            adapted
        };
        if pcm.is_empty() {
            return Err(ChillError::LoadFailure("source decoded to silence".into()));
        }

        Ok(Box::new(NativeVoice {
            voice: Arc::new(VoiceState::new(pcm)),
            mix: Arc::clone(&self.state),
        }))
    }
}

struct NativeVoice {
    voice: Arc<VoiceState>,
    mix: Arc<MixState>,
}

impl Voice for NativeVoice {
    fn set_looping(&mut self, looping: bool) {
        self.voice.looping.store(looping, Ordering::SeqCst);
    }

    fn set_volume(&mut self, volume: f32) {
        self.voice.volume.store(volume.to_bits(), Ordering::SeqCst);
    }

    fn rewind(&mut self) {
        self.voice.cursor.store(0, Ordering::SeqCst);
    }

    fn play(&mut self) -> ChillResult<()> {
        ensure_output(&self.mix)?;
        let mut voices = self.mix.voices.lock();
        if !voices.iter().any(|v| Arc::ptr_eq(v, &self.voice)) {
            voices.push(Arc::clone(&self.voice));
        }
        self.voice.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) {
        self.voice.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.voice.playing.load(Ordering::SeqCst)
    }
}

impl Drop for NativeVoice {
    fn drop(&mut self) {
        self.voice.playing.store(false, Ordering::SeqCst);
        self.mix.voices.lock().retain(|v| !Arc::ptr_eq(v, &self.voice));
    }
}

/// Start the output thread unless it is already running. Fails with
/// `PlaybackBlocked` when no usable device is available.
fn ensure_output(state: &Arc<MixState>) -> ChillResult<()> {
    let mut slot = state.output.lock();
    if state.running.load(Ordering::SeqCst) {
        return Ok(());
    }
    if state.stop_signal.load(Ordering::SeqCst) {
        return Err(ChillError::PlaybackBlocked {
            key: String::new(),
            reason: "backend shut down".into(),
        });
    }
    if let Some(old) = slot.take() {
        let _ = old.join();
    }

    let (ready_tx, ready_rx) = mpsc::channel();
    let thread_state = Arc::clone(state);
    *slot = Some(thread::spawn(move || {
        if let Err(e) = run_output(&thread_state, &ready_tx) {
            log::error!("chill: output error: {}", e);
            let _ = ready_tx.send(Err(e.to_string()));
        }
        thread_state.running.store(false, Ordering::SeqCst);
    }));

    let blocked = |reason: String| ChillError::PlaybackBlocked {
        key: String::new(),
        reason,
    };
    match ready_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(blocked(reason)),
        Err(_) => Err(blocked("output device did not start".into())),
    }
}

/// Decode a whole in-memory payload. Returns (interleaved samples, rate, channels).
fn decode_all(bytes: Vec<u8>, ext: Option<&str>) -> ChillResult<(Vec<f32>, u32, u16)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ChillError::LoadFailure(format!("unrecognised audio: {}", e)))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| ChillError::LoadFailure("no default track".into()))?;
    let track_id = track.id;
    let mut rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ChillError::LoadFailure(format!("no decoder: {}", e)))?;

    let mut pcm = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(ChillError::LoadFailure(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::debug!("chill: skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(ChillError::LoadFailure(e.to_string())),
        };
        let spec = *decoded.spec();
        rate = spec.rate;
        channels = spec.channels.count() as u16;
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        pcm.extend_from_slice(buf.samples());
    }
    Ok((pcm, rate, channels.max(1)))
}

/// Open the default device and keep a mixing stream alive until stopped.
fn run_output(
    state: &Arc<MixState>,
    ready: &mpsc::Sender<Result<(), String>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or("no output device")?;
    let default_cfg = device.default_output_config()?;
    if default_cfg.sample_format() != cpal::SampleFormat::F32 {
        return Err(format!(
            "device does not support f32 output (got {:?})",
            default_cfg.sample_format()
        )
        .into());
    }
    let config = cpal::StreamConfig {
        channels: state.out_channels,
        sample_rate: cpal::SampleRate(state.device_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cb_state = Arc::clone(state);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let voices = cb_state.voices.lock();
            mix_into(data, &voices);
        },
        move |err| {
            log::error!("chill: cpal error: {}", err);
        },
        None,
    )?;
    stream.play()?;

    state.running.store(true, Ordering::SeqCst);
    let _ = ready.send(Ok(()));
    while !state.stop_signal.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(25));
    }
    Ok(())
}

/// Sum every playing voice into `data`. Non-looping voices stop at their end.
fn mix_into(data: &mut [f32], voices: &[Arc<VoiceState>]) {
    data.fill(0.0);
    for voice in voices {
        if !voice.playing.load(Ordering::Relaxed) || voice.pcm.is_empty() {
            continue;
        }
        let volume = voice.volume();
        let len = voice.pcm.len();
        let mut cursor = voice.cursor.load(Ordering::Relaxed);
        for out in data.iter_mut() {
            if cursor >= len {
                if voice.looping.load(Ordering::Relaxed) {
                    cursor = 0;
                } else {
                    voice.playing.store(false, Ordering::Relaxed);
                    break;
                }
            }
            *out += voice.pcm[cursor] * volume;
            cursor += 1;
        }
        voice.cursor.store(cursor.min(len), Ordering::Relaxed);
    }
    for s in data.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }
}

/// Linear interpolation resampler, sufficient for ambient playback.
struct LinearResampler {
    ratio: f64,
    phase: f64,
    channels: usize,
}

impl LinearResampler {
    fn new(src_rate: u32, dst_rate: u32, channels: u16) -> Self {
        Self {
            ratio: dst_rate as f64 / src_rate.max(1) as f64,
            phase: 0.0,
            channels: channels.max(1) as usize,
        }
    }

    fn is_needed(&self) -> bool {
        (self.ratio - 1.0).abs() > 0.001
    }

    /// Resample interleaved samples.
    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if !self.is_needed() {
            return input.to_vec();
        }
        let ch = self.channels;
        let in_frames = input.len() / ch;
        if in_frames == 0 {
            return Vec::new();
        }
        let out_frames = ((in_frames as f64) * self.ratio).ceil() as usize;
        let mut output = Vec::with_capacity(out_frames * ch);

        for _ in 0..out_frames {
            let src_idx = self.phase as usize;
            if src_idx >= in_frames {
                break;
            }
            let frac = (self.phase - src_idx as f64) as f32;

            for c in 0..ch {
                let s0 = input[src_idx * ch + c];
                let s1 = if src_idx + 1 < in_frames {
                    input[(src_idx + 1) * ch + c]
                } else {
                    s0
                };
                output.push(s0 + (s1 - s0) * frac);
            }

            self.phase += 1.0 / self.ratio;
        }

        self.phase -= in_frames as f64;
        if self.phase < 0.0 {
            self.phase = 0.0;
        }

        output
    }
}

/// Adapt interleaved samples between channel counts: mono is duplicated,
/// down-mix to mono averages, anything else copies and zero-fills.
fn adapt_channels(src: &[f32], src_ch: u16, dst: &mut [f32], dst_ch: u16) {
    let src_ch = src_ch as usize;
    let dst_ch = dst_ch as usize;
    let frames = dst.len() / dst_ch;

    for f in 0..frames {
        let src_off = f * src_ch;
        let dst_off = f * dst_ch;

        if src_ch == 1 && dst_ch >= 2 {
            let s = if src_off < src.len() { src[src_off] } else { 0.0 };
            for c in 0..dst_ch {
                dst[dst_off + c] = s;
            }
        } else if src_ch >= 2 && dst_ch == 1 {
            let mut sum = 0.0f32;
            let n = src_ch.min(src.len().saturating_sub(src_off));
            for c in 0..n {
                sum += src[src_off + c];
            }
            dst[dst_off] = if n > 0 { sum / n as f32 } else { 0.0 };
        } else {
            let copy_ch = src_ch.min(dst_ch);
            for c in 0..copy_ch {
                dst[dst_off + c] = if src_off + c < src.len() { src[src_off + c] } else { 0.0 };
            }
            for c in copy_ch..dst_ch {
                dst[dst_off + c] = 0.0;
            }
        }
    }
}

/// Default device rate and channel count; CD-quality stereo without a device.
fn probe_device() -> (u32, u16) {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.default_output_config().ok())
        .map(|c| (c.sample_rate().0, c.channels().max(1)))
        .unwrap_or((44100, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(pcm: Vec<f32>, looping: bool) -> Arc<VoiceState> {
        let v = Arc::new(VoiceState::new(pcm));
        v.looping.store(looping, Ordering::SeqCst);
        v.playing.store(true, Ordering::SeqCst);
        v
    }

    #[test]
    fn mix_sums_voices_with_volume() {
        let a = voice(vec![0.5; 4], true);
        let b = voice(vec![0.25; 4], true);
        b.volume.store(0.5f32.to_bits(), Ordering::SeqCst);
        let mut out = [0.0f32; 4];
        mix_into(&mut out, &[a, b]);
        assert!(out.iter().all(|s| (s - 0.625).abs() < 1e-6));
    }

    #[test]
    fn looping_voice_wraps() {
        let a = voice(vec![0.1, 0.2], true);
        let mut out = [0.0f32; 5];
        mix_into(&mut out, &[Arc::clone(&a)]);
        assert_eq!(out, [0.1, 0.2, 0.1, 0.2, 0.1]);
        assert!(a.playing.load(Ordering::SeqCst));
    }

    #[test]
    fn one_shot_voice_stops_at_end() {
        let a = voice(vec![0.3, 0.3], false);
        let mut out = [0.0f32; 4];
        mix_into(&mut out, &[Arc::clone(&a)]);
        assert_eq!(out, [0.3, 0.3, 0.0, 0.0]);
        assert!(!a.playing.load(Ordering::SeqCst));
    }

    #[test]
    fn paused_voice_is_silent() {
        let a = voice(vec![0.9; 4], true);
        a.playing.store(false, Ordering::SeqCst);
        let mut out = [1.0f32; 4];
        mix_into(&mut out, &[a]);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn mix_clamps_to_unit_range() {
        let a = voice(vec![0.8; 2], true);
        let b = voice(vec![0.8; 2], true);
        let mut out = [0.0f32; 2];
        mix_into(&mut out, &[a, b]);
        assert_eq!(out, [1.0, 1.0]);
    }

    #[test]
    fn decodes_embedded_tick() {
        let (pcm, rate, channels) = decode_all(include_bytes!("../../assets/tick.wav").to_vec(), Some("wav")).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(channels, 1);
        assert!(!pcm.is_empty());
    }

    #[test]
    fn garbage_is_a_load_failure() {
        assert!(matches!(
            decode_all(b"definitely not audio".to_vec(), None),
            Err(ChillError::LoadFailure(_))
        ));
    }

    #[test]
    fn resampler_same_rate_passthrough() {
        let mut rs = LinearResampler::new(44100, 44100, 2);
        assert!(!rs.is_needed());
        let input = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(rs.process(&input), input);
    }

    #[test]
    fn resampler_upsample_produces_more() {
        let mut rs = LinearResampler::new(8000, 48000, 1);
        let input = vec![0.0, 1.0, 0.0, -1.0];
        assert!(rs.process(&input).len() > input.len());
    }

    #[test]
    fn adapt_mono_to_stereo() {
        let src = [1.0, 2.0, 3.0];
        let mut dst = [0.0f32; 6];
        adapt_channels(&src, 1, &mut dst, 2);
        assert_eq!(dst, [1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn adapt_stereo_to_mono() {
        let src = [1.0, 3.0, 2.0, 4.0];
        let mut dst = [0.0f32; 2];
        adapt_channels(&src, 2, &mut dst, 1);
        assert_eq!(dst, [2.0, 3.0]);
    }
}
