//! The robot middleware boundary.
//!
//! Every method here is a blocking call into the robot's middleware. Callers on
//! an async runtime must move them off the runtime threads.

use std::sync::Arc;

use bytes::Bytes;

use crate::errors::RobotError;
use crate::ids::SubscriptionId;

/// Callback invoked with the new value of a watched memory key.
pub type MemoryCallback = Box<dyn Fn(f32) + Send + Sync>;

/// Callback invoked with each microphone buffer.
pub type AudioSink = Box<dyn Fn(AudioBuffer) + Send + Sync>;

/// One microphone buffer as delivered by the audio device.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    pub channels: u32,
    pub samples_per_channel: u32,
    pub data: Bytes,
}

/// How an audio client wants to receive microphone data. Samples are
/// always delivered interleaved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioPreferences {
    pub sample_rate: u32,
    /// Channel selection code understood by the audio device (3 = front).
    pub channels: u32,
}

impl Default for AudioPreferences {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 3,
        }
    }
}

pub trait Memory: Send + Sync {
    fn subscribe(&self, key: &str, callback: MemoryCallback) -> Result<SubscriptionId, RobotError>;
    fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), RobotError>;
}

pub trait TextToSpeech: Send + Sync {
    fn set_language(&self, language: &str) -> Result<(), RobotError>;
    fn stop_all(&self) -> Result<(), RobotError>;
}

pub trait AnimatedSpeech: Send + Sync {
    fn say(&self, text: &str) -> Result<(), RobotError>;
}

pub trait Motion: Send + Sync {
    fn wake_up(&self) -> Result<(), RobotError>;
    fn rest(&self) -> Result<(), RobotError>;
    fn set_breath_enabled(&self, chain: &str, enabled: bool) -> Result<(), RobotError>;
    fn body_names(&self, chain: &str) -> Result<Vec<String>, RobotError>;
    fn angles(&self, chain: &str, use_sensors: bool) -> Result<Vec<f32>, RobotError>;
}

pub trait Posture: Send + Sync {
    fn set_max_try_number(&self, tries: u32) -> Result<(), RobotError>;
    /// Returns whether the posture was reached.
    fn go_to_posture(&self, posture: &str, speed: f32) -> Result<bool, RobotError>;
}

pub trait Leds: Send + Sync {
    fn fade_rgb(&self, group: &str, color: &str, duration: f32) -> Result<(), RobotError>;
}

pub trait BehaviorManager: Send + Sync {
    /// Runs the behavior to completion.
    fn run_behavior(&self, name: &str) -> Result<(), RobotError>;
    fn stop_behavior(&self, name: &str) -> Result<(), RobotError>;
}

pub trait PackageManager: Send + Sync {
    /// Raw package listing, one JSON object per installed package.
    fn packages(&self) -> Result<serde_json::Value, RobotError>;
}

pub trait BasicAwareness: Send + Sync {
    fn set_engagement_mode(&self, mode: &str) -> Result<(), RobotError>;
    fn set_tracking_mode(&self, mode: &str) -> Result<(), RobotError>;
    fn start_awareness(&self) -> Result<(), RobotError>;
    fn stop_awareness(&self) -> Result<(), RobotError>;
}

pub trait AudioDevice: Send + Sync {
    fn subscribe(
        &self,
        client: &str,
        preferences: AudioPreferences,
        sink: AudioSink,
    ) -> Result<(), RobotError>;
    fn unsubscribe(&self, client: &str) -> Result<(), RobotError>;
}

/// An open connection to the robot middleware, handing out service handles.
pub trait RobotLink: Send + Sync {
    fn memory(&self) -> Result<Arc<dyn Memory>, RobotError>;
    fn text_to_speech(&self) -> Result<Arc<dyn TextToSpeech>, RobotError>;
    fn animated_speech(&self) -> Result<Arc<dyn AnimatedSpeech>, RobotError>;
    fn motion(&self) -> Result<Arc<dyn Motion>, RobotError>;
    fn posture(&self) -> Result<Arc<dyn Posture>, RobotError>;
    fn leds(&self) -> Result<Arc<dyn Leds>, RobotError>;
    fn behavior_manager(&self) -> Result<Arc<dyn BehaviorManager>, RobotError>;
    fn package_manager(&self) -> Result<Arc<dyn PackageManager>, RobotError>;
    fn basic_awareness(&self) -> Result<Arc<dyn BasicAwareness>, RobotError>;
    fn audio_device(&self) -> Result<Arc<dyn AudioDevice>, RobotError>;
    fn close(&self);
}

/// Opens links to the robot middleware.
pub trait RobotConnector: Send + Sync {
    /// `url` is of the form `tcp://<address>:<port>`.
    fn connect(&self, url: &str) -> Result<Arc<dyn RobotLink>, RobotError>;
}
