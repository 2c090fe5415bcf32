//! Scriptable in-process robot for tests and local runs without hardware.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nao_core::errors::RobotError;
use nao_core::ids::SubscriptionId;
use nao_core::services::{
    AnimatedSpeech, AudioBuffer, AudioDevice, AudioPreferences, AudioSink, BasicAwareness,
    BehaviorManager, Leds, Memory, MemoryCallback, Motion, PackageManager, Posture, RobotConnector,
    RobotLink, TextToSpeech,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::services;

/// How long a held behavior waits for a stop before giving up.
const HOLD_LIMIT: Duration = Duration::from_secs(10);

struct MemorySubscription {
    id: SubscriptionId,
    key: String,
    callback: MemoryCallback,
}

struct MockInner {
    calls: Mutex<Vec<String>>,
    unavailable: Mutex<HashSet<&'static str>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    posture_reached: AtomicBool,
    listing: Mutex<Result<Value, String>>,
    hold_behaviors: AtomicBool,
    running: Mutex<HashSet<String>>,
    memory_subscriptions: Mutex<Vec<MemorySubscription>>,
    audio_sink: Mutex<Option<AudioSink>>,
    joints: Vec<(String, f32)>,
    angle_reads: AtomicUsize,
    closed: AtomicBool,
}

/// A robot whose services record every call and can be told to fail.
///
/// Calls are recorded as `"<operation>[:arg]*"` strings, e.g.
/// `"fadeRGB:FaceLeds:cyan"` or `"goToPosture:Stand:0.8"`. Making an
/// operation fail or panic is keyed on the operation name alone.
#[derive(Clone)]
pub struct MockRobot {
    inner: Arc<MockInner>,
}

impl Default for MockRobot {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRobot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                calls: Mutex::new(Vec::new()),
                unavailable: Mutex::new(HashSet::new()),
                failing: Mutex::new(HashSet::new()),
                panicking: Mutex::new(HashSet::new()),
                posture_reached: AtomicBool::new(true),
                listing: Mutex::new(Ok(Self::sample_listing())),
                hold_behaviors: AtomicBool::new(false),
                running: Mutex::new(HashSet::new()),
                memory_subscriptions: Mutex::new(Vec::new()),
                audio_sink: Mutex::new(None),
                joints: vec![
                    ("HeadYaw".to_string(), 0.1),
                    ("HeadPitch".to_string(), -0.2),
                    ("LShoulderPitch".to_string(), 1.4),
                ],
                angle_reads: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Package listing with one dance, one happy reaction, the head-touched
    /// reaction and two body actions.
    pub fn sample_listing() -> Value {
        json!([
            {
                "uuid": "thriller-dance",
                "elems": {
                    "names": {"en_US": "The thriller dance", "fr_FR": "La danse thriller"},
                    "descriptions": {"en_US": "Nao dances on Michael Jackson's thriller."},
                    "contents": {"behaviors": [{"path": "."}]}
                }
            },
            {
                "uuid": "animations",
                "elems": {
                    "names": {},
                    "descriptions": {},
                    "contents": {"behaviors": [
                        {
                            "path": "Stand/Emotions/Positive/Happy_1",
                            "langToName": {"en_US": "Happy"},
                            "langToDesc": {"en_US": "Cheerful move"},
                            "langToTags": {"en_US": ["happy", "joy"]}
                        }
                    ]}
                }
            },
            {
                "uuid": "dialog_touch",
                "elems": {
                    "names": {},
                    "descriptions": {},
                    "contents": {"behaviors": [{"path": "animations/head_touched"}]}
                }
            },
            {
                "uuid": "dialog_move_arms",
                "elems": {
                    "names": {},
                    "descriptions": {},
                    "contents": {"behaviors": [
                        {"path": "animations/UpLArm"},
                        {"path": "animations/StretchBothArms"}
                    ]}
                }
            }
        ])
    }

    pub fn with_listing(self, listing: Value) -> Self {
        *self.inner.listing.lock() = Ok(listing);
        self
    }

    pub fn failing_listing(self, reason: &str) -> Self {
        *self.inner.listing.lock() = Err(reason.to_string());
        self
    }

    /// The link reports this service as unavailable.
    pub fn without_service(self, name: &'static str) -> Self {
        self.inner.unavailable.lock().insert(name);
        self
    }

    /// Calls to this operation return a remote error.
    pub fn fail_call(self, operation: &str) -> Self {
        self.inner.failing.lock().insert(operation.to_string());
        self
    }

    /// Calls to this operation panic.
    pub fn panic_on(self, operation: &str) -> Self {
        self.inner.panicking.lock().insert(operation.to_string());
        self
    }

    pub fn posture_reached(self, reached: bool) -> Self {
        self.inner.posture_reached.store(reached, Ordering::SeqCst);
        self
    }

    /// `runBehavior` blocks until the behavior is stopped.
    pub fn hold_behaviors(self) -> Self {
        self.inner.hold_behaviors.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, operation: &str, failing: bool) {
        let mut set = self.inner.failing.lock();
        if failing {
            set.insert(operation.to_string());
        } else {
            set.remove(operation);
        }
    }

    pub fn set_listing(&self, listing: Result<Value, String>) {
        *self.inner.listing.lock() = listing;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().clear();
    }

    /// Number of recorded calls whose operation matches.
    pub fn count(&self, operation: &str) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|c| operation_of(c) == operation)
            .count()
    }

    pub fn running_behaviors(&self) -> Vec<String> {
        let mut running: Vec<String> = self.inner.running.lock().iter().cloned().collect();
        running.sort();
        running
    }

    pub fn angle_reads(&self) -> usize {
        self.inner.angle_reads.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn memory_subscription_count(&self) -> usize {
        self.inner.memory_subscriptions.lock().len()
    }

    pub fn audio_subscribed(&self) -> bool {
        self.inner.audio_sink.lock().is_some()
    }

    /// Deliver a value change to every subscriber of `key`.
    pub fn fire_touch(&self, key: &str, value: f32) {
        for sub in self.inner.memory_subscriptions.lock().iter() {
            if sub.key == key {
                (sub.callback)(value);
            }
        }
    }

    /// Deliver a microphone buffer to the audio subscriber, if any.
    pub fn push_audio(&self, buffer: AudioBuffer) {
        if let Some(sink) = self.inner.audio_sink.lock().as_ref() {
            sink(buffer);
        }
    }

    pub fn motion_handle(&self) -> Arc<dyn Motion> {
        self.inner.clone()
    }

    fn service<T: ?Sized>(
        &self,
        name: &'static str,
        handle: Arc<T>,
    ) -> Result<Arc<T>, RobotError> {
        if self.inner.unavailable.lock().contains(name) {
            return Err(RobotError::ServiceUnavailable(name));
        }
        Ok(handle)
    }
}

fn operation_of(call: &str) -> &str {
    call.split(':').next().unwrap_or(call)
}

impl MockInner {
    fn record(&self, call: String) -> Result<(), RobotError> {
        let operation = operation_of(&call).to_string();
        self.calls.lock().push(call);
        self.check(&operation)
    }

    fn check(&self, operation: &str) -> Result<(), RobotError> {
        if self.panicking.lock().contains(operation) {
            panic!("{operation} panicked");
        }
        if self.failing.lock().contains(operation) {
            return Err(RobotError::remote(format!("{operation} failed")));
        }
        Ok(())
    }
}

impl Memory for MockInner {
    fn subscribe(&self, key: &str, callback: MemoryCallback) -> Result<SubscriptionId, RobotError> {
        self.record(format!("subscribe:{key}"))?;
        let id = SubscriptionId::new();
        self.memory_subscriptions.lock().push(MemorySubscription {
            id: id.clone(),
            key: key.to_string(),
            callback,
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), RobotError> {
        let mut subs = self.memory_subscriptions.lock();
        let key = subs
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.key.clone())
            .unwrap_or_default();
        subs.retain(|s| &s.id != id);
        drop(subs);
        self.record(format!("unsubscribe:{key}"))
    }
}

impl TextToSpeech for MockInner {
    fn set_language(&self, language: &str) -> Result<(), RobotError> {
        self.record(format!("setLanguage:{language}"))
    }

    fn stop_all(&self) -> Result<(), RobotError> {
        self.record("stopAll".into())
    }
}

impl AnimatedSpeech for MockInner {
    fn say(&self, text: &str) -> Result<(), RobotError> {
        self.record(format!("say:{text}"))
    }
}

impl Motion for MockInner {
    fn wake_up(&self) -> Result<(), RobotError> {
        self.record("wakeUp".into())
    }

    fn rest(&self) -> Result<(), RobotError> {
        self.record("rest".into())
    }

    fn set_breath_enabled(&self, chain: &str, enabled: bool) -> Result<(), RobotError> {
        self.record(format!("setBreathEnabled:{chain}:{enabled}"))
    }

    fn body_names(&self, _chain: &str) -> Result<Vec<String>, RobotError> {
        self.check("getBodyNames")?;
        Ok(self.joints.iter().map(|(name, _)| name.clone()).collect())
    }

    fn angles(&self, _chain: &str, _use_sensors: bool) -> Result<Vec<f32>, RobotError> {
        self.angle_reads.fetch_add(1, Ordering::SeqCst);
        self.check("getAngles")?;
        Ok(self.joints.iter().map(|(_, angle)| *angle).collect())
    }
}

impl Posture for MockInner {
    fn set_max_try_number(&self, tries: u32) -> Result<(), RobotError> {
        self.record(format!("setMaxTryNumber:{tries}"))
    }

    fn go_to_posture(&self, posture: &str, speed: f32) -> Result<bool, RobotError> {
        self.record(format!("goToPosture:{posture}:{speed}"))?;
        Ok(self.posture_reached.load(Ordering::SeqCst))
    }
}

impl Leds for MockInner {
    fn fade_rgb(&self, group: &str, color: &str, _duration: f32) -> Result<(), RobotError> {
        self.record(format!("fadeRGB:{group}:{color}"))
    }
}

impl BehaviorManager for MockInner {
    fn run_behavior(&self, name: &str) -> Result<(), RobotError> {
        self.record(format!("runBehavior:{name}"))?;
        self.running.lock().insert(name.to_string());

        if self.hold_behaviors.load(Ordering::SeqCst) {
            let started = Instant::now();
            while self.running.lock().contains(name) && started.elapsed() < HOLD_LIMIT {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        self.running.lock().remove(name);
        Ok(())
    }

    fn stop_behavior(&self, name: &str) -> Result<(), RobotError> {
        self.record(format!("stopBehavior:{name}"))?;
        self.running.lock().remove(name);
        Ok(())
    }
}

impl PackageManager for MockInner {
    fn packages(&self) -> Result<Value, RobotError> {
        self.check("getPackages")?;
        self.listing.lock().clone().map_err(RobotError::Remote)
    }
}

impl BasicAwareness for MockInner {
    fn set_engagement_mode(&self, mode: &str) -> Result<(), RobotError> {
        self.record(format!("setEngagementMode:{mode}"))
    }

    fn set_tracking_mode(&self, mode: &str) -> Result<(), RobotError> {
        self.record(format!("setTrackingMode:{mode}"))
    }

    fn start_awareness(&self) -> Result<(), RobotError> {
        self.record("startAwareness".into())
    }

    fn stop_awareness(&self) -> Result<(), RobotError> {
        self.record("stopAwareness".into())
    }
}

impl AudioDevice for MockInner {
    fn subscribe(
        &self,
        client: &str,
        preferences: AudioPreferences,
        sink: AudioSink,
    ) -> Result<(), RobotError> {
        self.record(format!(
            "subscribeAudio:{client}:{}:{}",
            preferences.sample_rate, preferences.channels
        ))?;
        *self.audio_sink.lock() = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self, client: &str) -> Result<(), RobotError> {
        *self.audio_sink.lock() = None;
        self.record(format!("unsubscribeAudio:{client}"))
    }
}

impl RobotLink for MockRobot {
    fn memory(&self) -> Result<Arc<dyn Memory>, RobotError> {
        self.service(services::MEMORY, self.inner.clone())
            .map(|s| s as Arc<dyn Memory>)
    }

    fn text_to_speech(&self) -> Result<Arc<dyn TextToSpeech>, RobotError> {
        self.service(services::TEXT_TO_SPEECH, self.inner.clone())
            .map(|s| s as Arc<dyn TextToSpeech>)
    }

    fn animated_speech(&self) -> Result<Arc<dyn AnimatedSpeech>, RobotError> {
        self.service(services::ANIMATED_SPEECH, self.inner.clone())
            .map(|s| s as Arc<dyn AnimatedSpeech>)
    }

    fn motion(&self) -> Result<Arc<dyn Motion>, RobotError> {
        self.service(services::MOTION, self.inner.clone())
            .map(|s| s as Arc<dyn Motion>)
    }

    fn posture(&self) -> Result<Arc<dyn Posture>, RobotError> {
        self.service(services::POSTURE, self.inner.clone())
            .map(|s| s as Arc<dyn Posture>)
    }

    fn leds(&self) -> Result<Arc<dyn Leds>, RobotError> {
        self.service(services::LEDS, self.inner.clone())
            .map(|s| s as Arc<dyn Leds>)
    }

    fn behavior_manager(&self) -> Result<Arc<dyn BehaviorManager>, RobotError> {
        self.service(services::BEHAVIOR_MANAGER, self.inner.clone())
            .map(|s| s as Arc<dyn BehaviorManager>)
    }

    fn package_manager(&self) -> Result<Arc<dyn PackageManager>, RobotError> {
        self.service(services::PACKAGE_MANAGER, self.inner.clone())
            .map(|s| s as Arc<dyn PackageManager>)
    }

    fn basic_awareness(&self) -> Result<Arc<dyn BasicAwareness>, RobotError> {
        self.service(services::BASIC_AWARENESS, self.inner.clone())
            .map(|s| s as Arc<dyn BasicAwareness>)
    }

    fn audio_device(&self) -> Result<Arc<dyn AudioDevice>, RobotError> {
        self.service(services::AUDIO_DEVICE, self.inner.clone())
            .map(|s| s as Arc<dyn AudioDevice>)
    }

    fn close(&self) {
        self.inner.calls.lock().push("close".into());
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out [`MockRobot`] links, optionally refusing the first attempts.
pub struct MockConnector {
    robot: MockRobot,
    failures_before_success: u32,
    attempts: AtomicU32,
    last_url: Mutex<Option<String>>,
}

impl MockConnector {
    pub fn new(robot: MockRobot) -> Self {
        Self {
            robot,
            failures_before_success: 0,
            attempts: AtomicU32::new(0),
            last_url: Mutex::new(None),
        }
    }

    /// Refuse the first `failures` connection attempts.
    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures_before_success = failures;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().clone()
    }
}

impl RobotConnector for MockConnector {
    fn connect(&self, url: &str) -> Result<Arc<dyn RobotLink>, RobotError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_url.lock() = Some(url.to_string());
        if attempt <= self.failures_before_success {
            return Err(RobotError::remote("connection refused"));
        }
        Ok(Arc::new(self.robot.clone()))
    }
}
