//! Local device acquisition: the [`MediaProvider`] seam plus a cpal-backed
//! microphone provider and a deterministic test provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use duet_shared::types::CallKind;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("No camera available")]
    NoCamera,

    #[error("Media device error: {0}")]
    Device(String),

    #[error("Media stream error: {0}")]
    Stream(String),
}

/// What to acquire for a call. Audio is always requested; video only for
/// video calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn for_kind(kind: CallKind) -> Self {
        Self {
            audio: true,
            video: kind == CallKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Handle to one local device track.
///
/// `enabled` gates whether real samples flow (mute sends silence so the
/// peer stays in sync); `stop` is one-way and releases the device.
#[derive(Debug, Clone)]
pub struct Track {
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl Track {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        debug!(kind = ?self.kind, enabled, "track enable state changed");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        debug!(kind = ?self.kind, "track stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Shared flags for capture callbacks.
    pub(crate) fn flags(&self) -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        (self.enabled.clone(), self.stopped.clone())
    }
}

/// The set of local tracks acquired for one call.
#[derive(Debug, Default)]
pub struct LocalTracks {
    pub audio: Option<Track>,
    pub video: Option<Track>,
}

impl LocalTracks {
    /// Mute/unmute the local microphone. Reversible.
    pub fn set_audio_enabled(&self, enabled: bool) {
        if let Some(track) = &self.audio {
            track.set_enabled(enabled);
        }
    }

    /// Stop every track and release the devices. Irreversible.
    pub fn stop_all(&self) {
        if let Some(track) = &self.audio {
            track.stop();
        }
        if let Some(track) = &self.video {
            track.stop();
        }
    }
}

/// Acquires local device tracks for a call attempt.
///
/// Acquisition failure is fatal to the current call attempt only; the
/// caller fails the call gracefully and the session survives.
pub trait MediaProvider: Send + Sync {
    fn acquire(&self, constraints: MediaConstraints) -> Result<LocalTracks, DeviceError>;
}

// ---------------------------------------------------------------------------
// Cpal-backed provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_size_ms: 20,
        }
    }
}

impl AudioConfig {
    pub fn frame_size_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_size_ms as usize) / 1000
    }
}

/// Microphone acquisition through cpal.
///
/// Captured frames are pushed into the channel handed to [`CpalProvider::new`];
/// whatever feeds the peer transport consumes them. Camera capture is not
/// wired up here, so video constraints fail with [`DeviceError::NoCamera`].
pub struct CpalProvider {
    config: AudioConfig,
    frame_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
}

impl CpalProvider {
    pub fn new(config: AudioConfig, frame_tx: tokio::sync::mpsc::Sender<Vec<f32>>) -> Self {
        Self { config, frame_tx }
    }
}

impl MediaProvider for CpalProvider {
    fn acquire(&self, constraints: MediaConstraints) -> Result<LocalTracks, DeviceError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        if constraints.video {
            return Err(DeviceError::NoCamera);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(DeviceError::NoInputDevice)?;

        info!(device = ?device.name(), "using input device");

        let config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let track = Track::new(TrackKind::Audio);
        let (enabled, stopped) = track.flags();

        let frame_size = self.config.frame_size_samples();
        let mut buffer = Vec::with_capacity(frame_size);
        let frame_tx = self.frame_tx.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if stopped.load(Ordering::Relaxed) {
                        return;
                    }
                    if enabled.load(Ordering::Relaxed) {
                        buffer.extend_from_slice(data);
                    } else {
                        // Muted: send silence so playback stays in sync
                        buffer.extend(std::iter::repeat(0.0f32).take(data.len()));
                    }
                    while buffer.len() >= frame_size {
                        let frame: Vec<f32> = buffer.drain(..frame_size).collect();
                        if frame_tx.try_send(frame).is_err() {
                            warn!("audio frame channel full, dropping frame");
                        }
                    }
                },
                move |err| {
                    error!("audio input error: {err}");
                },
                None,
            )
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        // Keep stream alive (cleaned up via the stopped flag -- the
        // callback becomes a no-op)
        std::mem::forget(stream);

        debug!("audio capture started");

        Ok(LocalTracks {
            audio: Some(track),
            video: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Test provider
// ---------------------------------------------------------------------------

/// Deterministic provider for tests and the in-process demo: hands out
/// track handles without touching real hardware. Can be configured to
/// fail, for exercising device-denial paths.
pub struct StaticProvider {
    fail: bool,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaProvider for StaticProvider {
    fn acquire(&self, constraints: MediaConstraints) -> Result<LocalTracks, DeviceError> {
        if self.fail {
            return Err(DeviceError::NoInputDevice);
        }
        Ok(LocalTracks {
            audio: constraints.audio.then(|| Track::new(TrackKind::Audio)),
            video: constraints.video.then(|| Track::new(TrackKind::Video)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_follow_call_kind() {
        let voice = MediaConstraints::for_kind(CallKind::Voice);
        assert!(voice.audio && !voice.video);

        let video = MediaConstraints::for_kind(CallKind::Video);
        assert!(video.audio && video.video);
    }

    #[test]
    fn static_provider_matches_constraints() {
        let tracks = StaticProvider::new()
            .acquire(MediaConstraints::for_kind(CallKind::Video))
            .unwrap();
        assert!(tracks.audio.is_some());
        assert!(tracks.video.is_some());

        let tracks = StaticProvider::new()
            .acquire(MediaConstraints::for_kind(CallKind::Voice))
            .unwrap();
        assert!(tracks.video.is_none());
    }

    #[test]
    fn mute_is_reversible_but_stop_is_not() {
        let tracks = StaticProvider::new()
            .acquire(MediaConstraints::for_kind(CallKind::Voice))
            .unwrap();
        let audio = tracks.audio.as_ref().unwrap();

        tracks.set_audio_enabled(false);
        assert!(!audio.is_enabled());
        tracks.set_audio_enabled(true);
        assert!(audio.is_enabled());

        tracks.stop_all();
        assert!(audio.is_stopped());
    }

    #[test]
    fn failing_provider_denies_acquisition() {
        let err = StaticProvider::failing()
            .acquire(MediaConstraints::for_kind(CallKind::Voice))
            .unwrap_err();
        assert!(matches!(err, DeviceError::NoInputDevice));
    }
}
