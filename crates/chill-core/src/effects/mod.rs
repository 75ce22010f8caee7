use crate::error::ChillResult;

/// Trait for audio output backends.
///
/// The mixer asks the backend for one [`Voice`] per track key and drives it
/// from there. Backends manage their own concurrency.
pub trait AudioBackend: Send + Sync {
    /// Open a playback handle on `source_url` (data URI, path, or URL).
    /// Fails when the source is missing, corrupt, or unsupported.
    fn open(&self, source_url: &str) -> ChillResult<Box<dyn Voice>>;
}

/// One live, independently controlled playback handle.
pub trait Voice: Send {
    fn set_looping(&mut self, looping: bool);
    /// `volume` is already clamped to [0, 1].
    fn set_volume(&mut self, volume: f32);
    /// Move the play position back to zero.
    fn rewind(&mut self);
    /// Begin or resume output. Fails when output is refused (no device,
    /// output stream error).
    fn play(&mut self) -> ChillResult<()>;
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
}

/// No-op audio backend for headless/WASM use.
///
/// Voices keep their flags so callers can still observe what would be
/// playing, but nothing reaches an output device.
pub struct NoopBackend;

impl AudioBackend for NoopBackend {
    fn open(&self, _: &str) -> ChillResult<Box<dyn Voice>> {
        Ok(Box::new(NoopVoice::default()))
    }
}

#[derive(Default)]
pub struct NoopVoice {
    playing: bool,
}

impl Voice for NoopVoice {
    fn set_looping(&mut self, _: bool) {}
    fn set_volume(&mut self, _: f32) {}
    fn rewind(&mut self) {}
    fn play(&mut self) -> ChillResult<()> {
        self.playing = true;
        Ok(())
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(feature = "native")]
pub mod audio;
pub mod http;
pub mod import;
pub mod source;
