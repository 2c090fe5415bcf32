//! Service handles bound once per connection.

use std::sync::Arc;

use nao_core::errors::RobotError;
use nao_core::services::{
    AnimatedSpeech, AudioDevice, BasicAwareness, BehaviorManager, Leds, Memory, Motion,
    PackageManager, Posture, RobotLink, TextToSpeech,
};
use tracing::{debug, warn};

pub const MEMORY: &str = "ALMemory";
pub const TEXT_TO_SPEECH: &str = "ALTextToSpeech";
pub const ANIMATED_SPEECH: &str = "ALAnimatedSpeech";
pub const MOTION: &str = "ALMotion";
pub const POSTURE: &str = "ALRobotPosture";
pub const LEDS: &str = "ALLeds";
pub const BEHAVIOR_MANAGER: &str = "ALBehaviorManager";
pub const PACKAGE_MANAGER: &str = "PackageManager";
pub const BASIC_AWARENESS: &str = "ALBasicAwareness";
pub const AUDIO_DEVICE: &str = "ALAudioDevice";

/// Every service the session uses. A service that failed to bind stays
/// `None` and its accessor reports [`RobotError::ServiceUnavailable`].
#[derive(Clone, Default)]
pub struct Services {
    memory: Option<Arc<dyn Memory>>,
    text_to_speech: Option<Arc<dyn TextToSpeech>>,
    animated_speech: Option<Arc<dyn AnimatedSpeech>>,
    motion: Option<Arc<dyn Motion>>,
    posture: Option<Arc<dyn Posture>>,
    leds: Option<Arc<dyn Leds>>,
    behavior_manager: Option<Arc<dyn BehaviorManager>>,
    package_manager: Option<Arc<dyn PackageManager>>,
    basic_awareness: Option<Arc<dyn BasicAwareness>>,
    audio_device: Option<Arc<dyn AudioDevice>>,
}

fn bind<T: ?Sized>(name: &'static str, result: Result<Arc<T>, RobotError>) -> Option<Arc<T>> {
    match result {
        Ok(service) => {
            debug!(service = name, "service bound");
            Some(service)
        }
        Err(e) => {
            warn!(service = name, error = %e, "failed to bind service");
            None
        }
    }
}

fn require<T: ?Sized>(name: &'static str, slot: &Option<Arc<T>>) -> Result<Arc<T>, RobotError> {
    slot.clone().ok_or(RobotError::ServiceUnavailable(name))
}

impl Services {
    /// Bind every service in one pass. Failures are logged and skipped.
    pub fn bind(link: &dyn RobotLink) -> Self {
        Self {
            memory: bind(MEMORY, link.memory()),
            text_to_speech: bind(TEXT_TO_SPEECH, link.text_to_speech()),
            animated_speech: bind(ANIMATED_SPEECH, link.animated_speech()),
            motion: bind(MOTION, link.motion()),
            posture: bind(POSTURE, link.posture()),
            leds: bind(LEDS, link.leds()),
            behavior_manager: bind(BEHAVIOR_MANAGER, link.behavior_manager()),
            package_manager: bind(PACKAGE_MANAGER, link.package_manager()),
            basic_awareness: bind(BASIC_AWARENESS, link.basic_awareness()),
            audio_device: bind(AUDIO_DEVICE, link.audio_device()),
        }
    }

    pub fn memory(&self) -> Result<Arc<dyn Memory>, RobotError> {
        require(MEMORY, &self.memory)
    }

    pub fn text_to_speech(&self) -> Result<Arc<dyn TextToSpeech>, RobotError> {
        require(TEXT_TO_SPEECH, &self.text_to_speech)
    }

    pub fn animated_speech(&self) -> Result<Arc<dyn AnimatedSpeech>, RobotError> {
        require(ANIMATED_SPEECH, &self.animated_speech)
    }

    pub fn motion(&self) -> Result<Arc<dyn Motion>, RobotError> {
        require(MOTION, &self.motion)
    }

    pub fn posture(&self) -> Result<Arc<dyn Posture>, RobotError> {
        require(POSTURE, &self.posture)
    }

    pub fn leds(&self) -> Result<Arc<dyn Leds>, RobotError> {
        require(LEDS, &self.leds)
    }

    pub fn behavior_manager(&self) -> Result<Arc<dyn BehaviorManager>, RobotError> {
        require(BEHAVIOR_MANAGER, &self.behavior_manager)
    }

    pub fn package_manager(&self) -> Result<Arc<dyn PackageManager>, RobotError> {
        require(PACKAGE_MANAGER, &self.package_manager)
    }

    pub fn basic_awareness(&self) -> Result<Arc<dyn BasicAwareness>, RobotError> {
        require(BASIC_AWARENESS, &self.basic_awareness)
    }

    pub fn audio_device(&self) -> Result<Arc<dyn AudioDevice>, RobotError> {
        require(AUDIO_DEVICE, &self.audio_device)
    }

    /// Number of services that bound successfully.
    pub fn bound_count(&self) -> usize {
        [
            self.memory.is_some(),
            self.text_to_speech.is_some(),
            self.animated_speech.is_some(),
            self.motion.is_some(),
            self.posture.is_some(),
            self.leds.is_some(),
            self.behavior_manager.is_some(),
            self.package_manager.is_some(),
            self.basic_awareness.is_some(),
            self.audio_device.is_some(),
        ]
        .into_iter()
        .filter(|bound| *bound)
        .count()
    }
}
