//! Audio feedback.
//!
//! The session emits a [`SoundEvent`] after each state change. Playback goes
//! through [`AudioSink`], which cannot fail from the caller's point of view:
//! [`AudioManager`] maps events to tone sequences, checks the shared
//! [`AudioSettings`], and logs backend failures instead of returning them.

use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SoundEvent {
    Move,
    Capture,
    Check,
    Checkmate,
    Stalemate,
    Promotion,
    Selection,
    GameStart,
    Illegal,
}

pub trait AudioSink: Send + Sync {
    fn emit(&self, event: SoundEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudio;

impl AudioSink for SilentAudio {
    fn emit(&self, _event: SoundEvent) {}
}

/// Keeps every event in order. Used by tests and by hosts that forward
/// events elsewhere.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    events: Mutex<Vec<SoundEvent>>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SoundEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<SoundEvent> {
        self.events.lock().ok().and_then(|e| e.last().copied())
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AudioSink for RecordingAudio {
    fn emit(&self, event: SoundEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

/// One oscillator note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Hz
    pub frequency: f32,
    /// Seconds
    pub duration: f32,
    pub waveform: Waveform,
    /// Relative to the master volume.
    pub volume: f32,
    /// Start time relative to the event, in seconds.
    pub offset: f32,
}

fn tone(frequency: f32, duration: f32, waveform: Waveform, volume: f32, offset: f32) -> Tone {
    Tone {
        frequency,
        duration,
        waveform,
        volume,
        offset,
    }
}

fn chord(frequencies: &[f32], duration: f32, waveform: Waveform, volume: f32, offset: f32) -> Vec<Tone> {
    frequencies
        .iter()
        .map(|&f| tone(f, duration, waveform, volume, offset))
        .collect()
}

/// The tone sequence played for an event.
pub fn cue(event: SoundEvent) -> Vec<Tone> {
    use Waveform::*;

    match event {
        SoundEvent::Move => vec![tone(220.0, 0.15, Triangle, 0.4, 0.0)],
        SoundEvent::Capture => vec![
            tone(330.0, 0.08, Square, 0.6, 0.0),
            tone(220.0, 0.12, Triangle, 0.4, 0.05),
        ],
        SoundEvent::Check => vec![
            tone(523.0, 0.2, Sine, 0.7, 0.0),
            tone(440.0, 0.3, Sine, 0.5, 0.1),
        ],
        SoundEvent::Checkmate => {
            let mut tones = chord(&[262.0, 330.0, 392.0], 0.8, Sine, 0.3, 0.0);
            tones.extend(chord(&[196.0, 247.0, 294.0], 1.2, Sine, 0.3, 0.4));
            tones
        }
        SoundEvent::Stalemate => vec![
            tone(294.0, 0.4, Sine, 0.5, 0.0),
            tone(277.0, 0.6, Sine, 0.4, 0.2),
        ],
        SoundEvent::Promotion => [262.0, 330.0, 392.0, 523.0]
            .iter()
            .enumerate()
            .map(|(i, &f)| tone(f, 0.2, Triangle, 0.5, i as f32 * 0.1))
            .collect(),
        SoundEvent::Selection => vec![tone(880.0, 0.05, Sine, 0.2, 0.0)],
        SoundEvent::GameStart => chord(&[196.0, 247.0, 294.0, 370.0], 1.0, Sine, 0.3, 0.0),
        SoundEvent::Illegal => vec![
            tone(150.0, 0.1, Square, 0.3, 0.0),
            tone(120.0, 0.15, Square, 0.3, 0.08),
        ],
    }
}

/// Produces sound. Implementations live outside this crate.
pub trait ToneBackend: Send + Sync {
    fn play(&self, tone: &Tone) -> Result<(), AudioError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub volume: f32,
    pub enabled: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 0.6,
            enabled: true,
        }
    }
}

type Listener = Box<dyn Fn(&AudioSettings) + Send + Sync>;

/// Shared audio settings with change notification.
#[derive(Default)]
pub struct AudioSettingsHub {
    settings: RwLock<AudioSettings>,
    listeners: Mutex<Vec<Listener>>,
}

impl AudioSettingsHub {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings: RwLock::new(AudioSettings {
                volume: settings.volume.clamp(0.0, 1.0),
                ..settings
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> AudioSettings {
        self.settings.read().map(|s| *s).unwrap_or_default()
    }

    /// Register a listener called after every change.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&AudioSettings) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Set the master volume, clamped to [0, 1].
    pub fn set_volume(&self, volume: f32) {
        self.update(|s| s.volume = volume.clamp(0.0, 1.0));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update(|s| s.enabled = enabled);
    }

    fn update(&self, change: impl FnOnce(&mut AudioSettings)) {
        let snapshot = match self.settings.write() {
            Ok(mut settings) => {
                change(&mut settings);
                *settings
            }
            Err(_) => return,
        };
        debug!(volume = snapshot.volume, enabled = snapshot.enabled, "audio settings changed");

        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(&snapshot);
            }
        }
    }
}

/// Plays event cues on a backend according to the shared settings.
pub struct AudioManager<B> {
    backend: B,
    settings: Arc<AudioSettingsHub>,
}

impl<B: ToneBackend> AudioManager<B> {
    pub fn new(backend: B, settings: Arc<AudioSettingsHub>) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &Arc<AudioSettingsHub> {
        &self.settings
    }
}

impl<B: ToneBackend> AudioSink for AudioManager<B> {
    fn emit(&self, event: SoundEvent) {
        let settings = self.settings.current();
        if !settings.enabled || settings.volume <= 0.0 {
            return;
        }

        for t in cue(event) {
            let scaled = Tone {
                volume: t.volume * settings.volume,
                ..t
            };
            if let Err(e) = self.backend.play(&scaled) {
                debug!(?event, error = %e, "audio playback failed");
                return;
            }
        }
    }
}
