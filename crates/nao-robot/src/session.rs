//! The robot session: connection lifetime, bound services, event sources and
//! every robot action the dispatcher can invoke.
//!
//! Every middleware call is blocking and runs on the blocking pool. Event
//! sources (touch callbacks, the audio sink, the joint poller) only push
//! [`SessionEvent`]s into the channel handed to [`RobotSession::new`].

use std::sync::Arc;
use std::time::Duration;

use nao_core::behavior::BehaviorInfo;
use nao_core::errors::RobotError;
use nao_core::events::SessionEvent;
use nao_core::ids::SubscriptionId;
use nao_core::services::{AudioBuffer, AudioPreferences, RobotConnector, RobotLink};
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::inflight::{ActivityKind, InFlight};
use crate::poller::{JointPoller, BODY_CHAIN, DEFAULT_JOINTS_PERIOD};
use crate::services::Services;

pub const TOUCH_KEYS: [&str; 3] = [
    "FrontTactilTouched",
    "MiddleTactilTouched",
    "RearTactilTouched",
];
pub const AUDIO_CLIENT: &str = "NaoBridge";

const EYES_GROUP: &str = "FaceLeds";
const ENGAGED_EYES: &str = "cyan";
const IDLE_EYES: &str = "white";
const POSTURE_TRIES: u32 = 3;
const POSTURE_SPEED: f32 = 0.8;
const STAND: &str = "Stand";
const SIT: &str = "Sit";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Run without a robot, answering every action with success.
    pub fake_robot: bool,
    pub address: String,
    pub port: u16,
    pub forward_touch: bool,
    pub forward_joints: bool,
    pub forward_audio: bool,
    pub max_connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub joints_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fake_robot: false,
            address: String::new(),
            port: 9559,
            forward_touch: true,
            forward_joints: false,
            forward_audio: false,
            max_connect_attempts: 10,
            connect_retry_delay: Duration::from_millis(500),
            joints_period: DEFAULT_JOINTS_PERIOD,
        }
    }
}

impl SessionConfig {
    pub fn url(&self) -> String {
        format!("tcp://{}:{}", self.address, self.port)
    }

    /// Rejects a missing address or port.
    pub fn validate(&self) -> Result<(), RobotError> {
        if self.address.trim().is_empty() {
            return Err(RobotError::Config("robot address is required".into()));
        }
        if self.port == 0 {
            return Err(RobotError::Config("robot port is required".into()));
        }
        Ok(())
    }
}

/// Snapshot of the session used by the health endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub ready: bool,
    pub simulated: bool,
    pub connected: bool,
    pub running_dances: Vec<String>,
    pub running_reactions: Vec<String>,
    pub running_body_actions: Vec<String>,
    pub running_behaviors: Vec<String>,
}

struct ConnectedRobot {
    link: Arc<dyn RobotLink>,
    services: Services,
    subscriptions: Vec<SubscriptionId>,
    audio_subscribed: bool,
    poller: Mutex<Option<JointPoller>>,
}

enum LinkState {
    Disconnected,
    Simulated,
    Connected(Arc<ConnectedRobot>),
}

pub struct RobotSession {
    config: SessionConfig,
    connector: Option<Arc<dyn RobotConnector>>,
    events: UnboundedSender<SessionEvent>,
    state: RwLock<LinkState>,
    catalog: RwLock<Arc<Catalog>>,
    in_flight: Arc<InFlight>,
}

impl RobotSession {
    /// `connector` is `None` when no robot middleware is available; the
    /// session then always runs simulated.
    pub fn new(
        config: SessionConfig,
        connector: Option<Arc<dyn RobotConnector>>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            events,
            state: RwLock::new(LinkState::Disconnected),
            catalog: RwLock::new(Arc::new(Catalog::default())),
            in_flight: InFlight::new(),
        }
    }

    // ── Lifecycle ──

    pub async fn connect(&self) -> Result<(), RobotError> {
        if !matches!(*self.state.read(), LinkState::Disconnected) {
            debug!("session already connected");
            return Ok(());
        }

        let connector = match (&self.connector, self.config.fake_robot) {
            (Some(connector), false) => Arc::clone(connector),
            (None, false) => {
                warn!("robot middleware unavailable, running simulated");
                self.enter_simulated();
                return Ok(());
            }
            (_, true) => {
                info!("fake robot requested, running simulated");
                self.enter_simulated();
                return Ok(());
            }
        };

        self.config.validate()?;
        let url = self.config.url();
        let link = self.open_link(connector, &url).await?;

        let config = self.config.clone();
        let events = self.events.clone();
        let robot = tokio::task::spawn_blocking(move || attach(link, &config, events))
            .await
            .map_err(task_failure)?;

        if self.config.forward_joints {
            match robot.services.motion() {
                Ok(motion) => {
                    let poller =
                        JointPoller::spawn(motion, self.config.joints_period, self.events.clone());
                    *robot.poller.lock() = Some(poller);
                }
                Err(e) => warn!(error = %e, "joint forwarding disabled"),
            }
        }

        let robot = Arc::new(robot);
        *self.state.write() = LinkState::Connected(Arc::clone(&robot));
        info!(url = %url, services = robot.services.bound_count(), "connected to robot");

        if let Err(e) = self.rebuild_catalog(&robot).await {
            warn!(error = %e, "behavior catalog unavailable");
        }
        Ok(())
    }

    async fn open_link(
        &self,
        connector: Arc<dyn RobotConnector>,
        url: &str,
    ) -> Result<Arc<dyn RobotLink>, RobotError> {
        let attempts = self.config.max_connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let connector = Arc::clone(&connector);
            let target = url.to_string();
            let result = tokio::task::spawn_blocking(move || connector.connect(&target))
                .await
                .map_err(task_failure)
                .and_then(|r| r);

            match result {
                Ok(link) => return Ok(link),
                Err(e) => {
                    warn!(url, attempt, max_attempts = attempts, error = %e, "robot connection attempt failed");
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.connect_retry_delay).await;
            }
        }

        error!(url, attempts, "giving up on robot connection");
        Err(RobotError::ConnectFailed {
            url: url.to_string(),
            attempts,
            reason: last_error,
        })
    }

    fn enter_simulated(&self) {
        *self.catalog.write() = Arc::new(Catalog::fallback());
        *self.state.write() = LinkState::Simulated;
    }

    /// Release every event source and close the link. No-op unless connected.
    pub async fn disconnect(&self) {
        let robot = {
            let mut state = self.state.write();
            if !matches!(*state, LinkState::Connected(_)) {
                return;
            }
            match std::mem::replace(&mut *state, LinkState::Disconnected) {
                LinkState::Connected(robot) => robot,
                _ => return,
            }
        };

        let poller = robot.poller.lock().take();
        if let Some(poller) = poller {
            poller.stop().await;
        }

        if let Err(e) = tokio::task::spawn_blocking(move || detach(&robot)).await {
            warn!(error = %e, "robot teardown task failed");
        }
        info!("disconnected from robot");
    }

    pub fn is_ready(&self) -> bool {
        !matches!(*self.state.read(), LinkState::Disconnected)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(*self.state.read(), LinkState::Simulated)
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.read(), LinkState::Connected(_))
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            ready: self.is_ready(),
            simulated: self.is_simulated(),
            connected: self.is_connected(),
            running_dances: self.in_flight.running(ActivityKind::Dance),
            running_reactions: self.in_flight.running(ActivityKind::Reaction),
            running_body_actions: self.in_flight.running(ActivityKind::BodyAction),
            running_behaviors: self.in_flight.running(ActivityKind::Behavior),
        }
    }

    // ── Catalog ──

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().clone()
    }

    /// Rebuild the catalog from the robot's package listing. The current
    /// catalog stays in place if the listing cannot be retrieved or parsed.
    pub async fn refresh_catalog(&self) -> Result<(), RobotError> {
        match self.robot("refresh_catalog")? {
            Some(robot) => self.rebuild_catalog(&robot).await,
            None => Ok(()),
        }
    }

    async fn rebuild_catalog(&self, robot: &Arc<ConnectedRobot>) -> Result<(), RobotError> {
        let robot = Arc::clone(robot);
        let catalog = run_blocking("refresh_catalog", move || {
            let listing = robot.services.package_manager()?.packages()?;
            Catalog::from_listing(&listing)
        })
        .await?;

        info!(
            dances = catalog.dances().count(),
            body_actions = catalog.body_actions().count(),
            "behavior catalog built"
        );
        *self.catalog.write() = Arc::new(catalog);
        Ok(())
    }

    pub fn dance_behaviors(&self) -> Vec<BehaviorInfo> {
        self.catalog().dances().cloned().collect()
    }

    pub fn expressive_reaction_types(&self) -> Vec<String> {
        self.catalog().reaction_types().map(str::to_string).collect()
    }

    pub fn body_action_behaviors(&self) -> Vec<BehaviorInfo> {
        self.catalog().body_actions().cloned().collect()
    }

    // ── Client engagement ──

    /// Cyan eyes, wake up, breathing on. Every step is attempted; the first
    /// failure is returned.
    pub async fn engage(&self) -> Result<(), RobotError> {
        let results = [
            self.change_eyes_color(ENGAGED_EYES).await,
            self.wake_up().await,
            self.set_breathing_enabled(BODY_CHAIN, true).await,
        ];
        results.into_iter().collect()
    }

    /// White eyes, breathing off, rest. Every step is attempted; the first
    /// failure is returned.
    pub async fn disengage(&self) -> Result<(), RobotError> {
        let results = [
            self.change_eyes_color(IDLE_EYES).await,
            self.set_breathing_enabled(BODY_CHAIN, false).await,
            self.rest().await,
        ];
        results.into_iter().collect()
    }

    // ── Actions ──

    pub async fn set_tts_language(&self, language: &str) -> Result<(), RobotError> {
        let language = language.to_string();
        self.call("set_tts_language", move |r| {
            r.services.text_to_speech()?.set_language(&language)
        })
        .await
    }

    pub async fn say(&self, text: &str) -> Result<(), RobotError> {
        let text = text.to_string();
        self.call("say", move |r| r.services.animated_speech()?.say(&text))
            .await
    }

    pub async fn stop_say(&self) -> Result<(), RobotError> {
        self.call("stop_say", |r| r.services.text_to_speech()?.stop_all())
            .await
    }

    pub async fn wake_up(&self) -> Result<(), RobotError> {
        self.call("wake_up", |r| r.services.motion()?.wake_up()).await
    }

    pub async fn rest(&self) -> Result<(), RobotError> {
        self.call("rest", |r| r.services.motion()?.rest()).await
    }

    pub async fn stand_up(&self) -> Result<(), RobotError> {
        self.go_to_posture("stand_up", STAND).await
    }

    pub async fn sit_down(&self) -> Result<(), RobotError> {
        self.go_to_posture("sit_down", SIT).await
    }

    async fn go_to_posture(&self, action: &'static str, posture: &'static str) -> Result<(), RobotError> {
        self.call(action, move |r| {
            let service = r.services.posture()?;
            service.set_max_try_number(POSTURE_TRIES)?;
            if service.go_to_posture(posture, POSTURE_SPEED)? {
                Ok(())
            } else {
                Err(RobotError::PostureNotReached(posture.to_string()))
            }
        })
        .await
    }

    pub async fn change_eyes_color(&self, color: &str) -> Result<(), RobotError> {
        let color = color.to_string();
        self.call("change_eyes_color", move |r| {
            r.services.leds()?.fade_rgb(EYES_GROUP, &color, 0.0)
        })
        .await
    }

    pub async fn set_basic_awareness(
        &self,
        enabled: bool,
        engagement_mode: &str,
        tracking_mode: &str,
    ) -> Result<(), RobotError> {
        let engagement_mode = engagement_mode.to_string();
        let tracking_mode = tracking_mode.to_string();
        self.call("set_basic_awareness", move |r| {
            let awareness = r.services.basic_awareness()?;
            awareness.set_engagement_mode(&engagement_mode)?;
            awareness.set_tracking_mode(&tracking_mode)?;
            if enabled {
                awareness.start_awareness()
            } else {
                awareness.stop_awareness()
            }
        })
        .await
    }

    pub async fn set_breathing_enabled(&self, chain: &str, enabled: bool) -> Result<(), RobotError> {
        let chain = chain.to_string();
        self.call("set_breathing_enabled", move |r| {
            r.services.motion()?.set_breath_enabled(&chain, enabled)
        })
        .await
    }

    /// Run a named behavior to completion, tracked so it can be stopped.
    pub async fn run_behavior(&self, name: &str) -> Result<(), RobotError> {
        self.run_tracked("run_behavior", ActivityKind::Behavior, name, name)
            .await
    }

    /// Stop a behavior previously started through [`Self::run_behavior`].
    pub async fn stop_behavior(&self, name: &str) -> Result<(), RobotError> {
        if !self.stoppable("stop_behavior", ActivityKind::Behavior, name)? {
            return Ok(());
        }
        self.stop_named("stop_behavior", name).await
    }

    // ── Named behaviors ──

    pub async fn dance(&self, dance_id: &str) -> Result<(), RobotError> {
        let behavior = self.dance_behavior(dance_id)?;
        self.run_tracked("dance", ActivityKind::Dance, dance_id, &behavior)
            .await
    }

    pub async fn stop_dance(&self, dance_id: &str) -> Result<(), RobotError> {
        let behavior = self.dance_behavior(dance_id)?;
        if !self.stoppable("stop_dance", ActivityKind::Dance, dance_id)? {
            return Ok(());
        }
        self.stop_named("stop_dance", &behavior).await
    }

    pub async fn expressive_reaction(&self, reaction_type: &str) -> Result<(), RobotError> {
        let catalog = self.catalog();
        let candidates = catalog.reactions(reaction_type).ok_or_else(|| {
            error!(reaction_type, "reaction type not found");
            RobotError::UnknownReactionType(reaction_type.to_string())
        })?;

        if self.robot("expressive_reaction")?.is_none() {
            return Ok(());
        }

        let behavior = candidates
            .choose(&mut rand::thread_rng())
            .map(|b| b.behavior_name.clone())
            .ok_or_else(|| {
                error!(reaction_type, "no behaviors registered for reaction type");
                RobotError::NoReactionBehaviors(reaction_type.to_string())
            })?;

        debug!(reaction_type, behavior = %behavior, "chose reaction behavior");
        self.run_tracked("expressive_reaction", ActivityKind::Reaction, reaction_type, &behavior)
            .await
    }

    pub async fn stop_expressive_reaction(&self, reaction_type: &str) -> Result<(), RobotError> {
        if self.catalog().reactions(reaction_type).is_none() {
            error!(reaction_type, "reaction type not found");
            return Err(RobotError::UnknownReactionType(reaction_type.to_string()));
        }
        if self.robot("stop_expressive_reaction")?.is_none() {
            return Ok(());
        }
        let behavior = self
            .in_flight
            .behavior_for(ActivityKind::Reaction, reaction_type)
            .ok_or_else(|| not_running(ActivityKind::Reaction, reaction_type))?;
        self.stop_named("stop_expressive_reaction", &behavior).await
    }

    pub async fn body_action(&self, body_action_id: &str) -> Result<(), RobotError> {
        let behavior = self.body_action_behavior(body_action_id)?;
        self.run_tracked("body_action", ActivityKind::BodyAction, body_action_id, &behavior)
            .await
    }

    pub async fn stop_body_action(&self, body_action_id: &str) -> Result<(), RobotError> {
        let behavior = self.body_action_behavior(body_action_id)?;
        if !self.stoppable("stop_body_action", ActivityKind::BodyAction, body_action_id)? {
            return Ok(());
        }
        self.stop_named("stop_body_action", &behavior).await
    }

    fn dance_behavior(&self, dance_id: &str) -> Result<String, RobotError> {
        self.catalog()
            .dance(dance_id)
            .map(|d| d.behavior_name.clone())
            .ok_or_else(|| {
                error!(dance_id, "dance not found");
                RobotError::UnknownDance(dance_id.to_string())
            })
    }

    fn body_action_behavior(&self, body_action_id: &str) -> Result<String, RobotError> {
        self.catalog()
            .body_action(body_action_id)
            .map(|b| b.behavior_name.clone())
            .ok_or_else(|| {
                error!(body_action_id, "body action not found");
                RobotError::UnknownBodyAction(body_action_id.to_string())
            })
    }

    /// `Ok(false)` when simulated, so the stop succeeds without a robot.
    /// Otherwise the activity must be running.
    fn stoppable(&self, action: &'static str, kind: ActivityKind, id: &str) -> Result<bool, RobotError> {
        if self.robot(action)?.is_none() {
            return Ok(false);
        }
        if self.in_flight.is_running(kind, id) {
            Ok(true)
        } else {
            Err(not_running(kind, id))
        }
    }

    async fn run_tracked(
        &self,
        action: &'static str,
        kind: ActivityKind,
        id: &str,
        behavior: &str,
    ) -> Result<(), RobotError> {
        let Some(robot) = self.robot(action)? else {
            return Ok(());
        };
        let _guard = self.in_flight.track(kind, id, behavior);
        let behavior = behavior.to_string();
        info!(action, kind = kind.as_str(), id, behavior = %behavior, "starting behavior");
        run_blocking(action, move || {
            robot.services.behavior_manager()?.run_behavior(&behavior)
        })
        .await
    }

    async fn stop_named(&self, action: &'static str, behavior: &str) -> Result<(), RobotError> {
        let behavior = behavior.to_string();
        self.call(action, move |r| {
            r.services.behavior_manager()?.stop_behavior(&behavior)
        })
        .await
    }

    // ── Plumbing ──

    /// `Ok(None)` when simulated, `Err(NotConnected)` when disconnected.
    fn robot(&self, action: &'static str) -> Result<Option<Arc<ConnectedRobot>>, RobotError> {
        match &*self.state.read() {
            LinkState::Connected(robot) => Ok(Some(Arc::clone(robot))),
            LinkState::Simulated => {
                debug!(action, "simulated robot, skipping call");
                Ok(None)
            }
            LinkState::Disconnected => {
                error!(action, "robot is not connected");
                Err(RobotError::NotConnected)
            }
        }
    }

    async fn call<F>(&self, action: &'static str, f: F) -> Result<(), RobotError>
    where
        F: FnOnce(&ConnectedRobot) -> Result<(), RobotError> + Send + 'static,
    {
        match self.robot(action)? {
            Some(robot) => run_blocking(action, move || f(&robot)).await,
            None => Ok(()),
        }
    }
}

fn not_running(kind: ActivityKind, id: &str) -> RobotError {
    error!(kind = kind.as_str(), id, "not running");
    RobotError::NotRunning {
        kind: kind.as_str(),
        id: id.to_string(),
    }
}

async fn run_blocking<T, F>(action: &'static str, f: F) -> Result<T, RobotError>
where
    F: FnOnce() -> Result<T, RobotError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(task_failure)
        .and_then(|r| r);
    if let Err(e) = &result {
        error!(action, error = %e, error_kind = e.error_kind(), "robot call failed");
    }
    result
}

fn task_failure(err: JoinError) -> RobotError {
    if !err.is_panic() {
        return RobotError::TaskFailed(err.to_string());
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string());
    RobotError::TaskFailed(message)
}

/// Bind services and subscribe event sources on a fresh link.
fn attach(
    link: Arc<dyn RobotLink>,
    config: &SessionConfig,
    events: UnboundedSender<SessionEvent>,
) -> ConnectedRobot {
    let services = Services::bind(link.as_ref());
    let mut subscriptions = Vec::new();

    if config.forward_touch {
        match services.memory() {
            Ok(memory) => {
                for key in TOUCH_KEYS {
                    let tx = events.clone();
                    let part = key.to_string();
                    let callback = Box::new(move |value: f32| {
                        let _ = tx.send(SessionEvent::Touch {
                            part: part.clone(),
                            touched: value as i32 == 1,
                        });
                    });
                    match memory.subscribe(key, callback) {
                        Ok(id) => subscriptions.push(id),
                        Err(e) => warn!(key, error = %e, "failed to subscribe to touch key"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "touch forwarding disabled"),
        }
    }

    let mut audio_subscribed = false;
    if config.forward_audio {
        let preferences = AudioPreferences::default();
        let rate = preferences.sample_rate;
        let tx = events.clone();
        let sink = Box::new(move |buffer: AudioBuffer| {
            let _ = tx.send(SessionEvent::Audio {
                rate,
                channels: buffer.channels,
                samples_per_channel: buffer.samples_per_channel,
                data: buffer.data,
            });
        });
        match services
            .audio_device()
            .and_then(|audio| audio.subscribe(AUDIO_CLIENT, preferences, sink))
        {
            Ok(()) => audio_subscribed = true,
            Err(e) => warn!(error = %e, "audio forwarding disabled"),
        }
    }

    ConnectedRobot {
        link,
        services,
        subscriptions,
        audio_subscribed,
        poller: Mutex::new(None),
    }
}

fn detach(robot: &ConnectedRobot) {
    if let Ok(memory) = robot.services.memory() {
        for id in &robot.subscriptions {
            if let Err(e) = memory.unsubscribe(id) {
                warn!(subscription = %id, error = %e, "failed to unsubscribe");
            }
        }
    }
    if robot.audio_subscribed {
        if let Err(e) = robot
            .services
            .audio_device()
            .and_then(|audio| audio.unsubscribe(AUDIO_CLIENT))
        {
            warn!(error = %e, "failed to unsubscribe audio");
        }
    }
    robot.link.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockRobot};
    use crate::services::LEDS;
    use bytes::Bytes;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn test_config() -> SessionConfig {
        SessionConfig {
            address: "127.0.0.1".into(),
            connect_retry_delay: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn session_with(
        config: SessionConfig,
        connector: Option<Arc<dyn RobotConnector>>,
    ) -> (Arc<RobotSession>, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RobotSession::new(config, connector, tx)), rx)
    }

    async fn connected(robot: &MockRobot) -> (Arc<RobotSession>, UnboundedReceiver<SessionEvent>) {
        let connector: Arc<dyn RobotConnector> = Arc::new(MockConnector::new(robot.clone()));
        let (session, rx) = session_with(test_config(), Some(connector));
        session.connect().await.expect("connect");
        robot.clear_calls();
        (session, rx)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn fake_robot_runs_simulated_with_fallback_catalog() {
        let robot = MockRobot::new();
        let connector: Arc<dyn RobotConnector> = Arc::new(MockConnector::new(robot.clone()));
        let config = SessionConfig {
            fake_robot: true,
            ..SessionConfig::default()
        };
        let (session, _rx) = session_with(config, Some(connector));

        session.connect().await.unwrap();
        assert!(session.is_ready());
        assert!(session.is_simulated());
        assert_eq!(session.dance_behaviors().len(), 4);

        session.say("hello").await.unwrap();
        session.stand_up().await.unwrap();
        session.dance("eagle-dance").await.unwrap();
        assert!(robot.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_connector_runs_simulated() {
        let (session, _rx) = session_with(SessionConfig::default(), None);
        session.connect().await.unwrap();
        assert!(session.is_simulated());
        assert_eq!(session.body_action_behaviors().len(), 6);
    }

    #[tokio::test]
    async fn missing_address_is_a_config_error() {
        let connector: Arc<dyn RobotConnector> = Arc::new(MockConnector::new(MockRobot::new()));
        let (session, _rx) = session_with(SessionConfig::default(), Some(connector));
        let err = session.connect().await.unwrap_err();
        assert_eq!(err.error_kind(), "config");
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn retries_until_connected() {
        let connector = Arc::new(MockConnector::new(MockRobot::new()).failing_first(2));
        let (session, _rx) = session_with(test_config(), Some(connector.clone()));
        session.connect().await.unwrap();
        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.last_url().as_deref(), Some("tcp://127.0.0.1:9559"));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let connector = Arc::new(MockConnector::new(MockRobot::new()).failing_first(100));
        let config = SessionConfig {
            max_connect_attempts: 3,
            ..test_config()
        };
        let (session, _rx) = session_with(config, Some(connector.clone()));
        match session.connect().await {
            Err(RobotError::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(connector.attempts(), 3);
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn connect_builds_catalog_and_forwards_touch() {
        let robot = MockRobot::new();
        let (session, mut rx) = connected(&robot).await;

        assert!(session.catalog().dance("thriller-dance").is_some());
        assert_eq!(session.catalog().reactions("Happy").unwrap().len(), 1);
        assert_eq!(robot.memory_subscription_count(), 3);

        robot.fire_touch("MiddleTactilTouched", 1.0);
        robot.fire_touch("MiddleTactilTouched", 0.0);
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Touch { part: "MiddleTactilTouched".into(), touched: true })
        );
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Touch { part: "MiddleTactilTouched".into(), touched: false })
        );
    }

    #[tokio::test]
    async fn audio_forwarding_pushes_buffers() {
        let robot = MockRobot::new();
        let connector: Arc<dyn RobotConnector> = Arc::new(MockConnector::new(robot.clone()));
        let config = SessionConfig {
            forward_audio: true,
            ..test_config()
        };
        let (session, mut rx) = session_with(config, Some(connector));
        session.connect().await.unwrap();
        assert!(robot.calls().contains(&"subscribeAudio:NaoBridge:16000:3".to_string()));

        robot.push_audio(AudioBuffer {
            channels: 1,
            samples_per_channel: 2,
            data: Bytes::from_static(&[1, 2, 3, 4]),
        });
        match rx.recv().await {
            Some(SessionEvent::Audio { rate, channels, samples_per_channel, data }) => {
                assert_eq!((rate, channels, samples_per_channel), (16_000, 1, 2));
                assert_eq!(data.as_ref(), &[1, 2, 3, 4]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn joint_forwarding_polls_motion() {
        let robot = MockRobot::new();
        let connector: Arc<dyn RobotConnector> = Arc::new(MockConnector::new(robot.clone()));
        let config = SessionConfig {
            forward_joints: true,
            forward_touch: false,
            joints_period: Duration::from_millis(20),
            ..test_config()
        };
        let (session, mut rx) = session_with(config, Some(connector));
        session.connect().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "joints");

        session.disconnect().await;
        let reads = robot.angle_reads();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(robot.angle_reads(), reads);
    }

    #[tokio::test]
    async fn disconnected_actions_fail() {
        let connector: Arc<dyn RobotConnector> = Arc::new(MockConnector::new(MockRobot::new()));
        let (session, _rx) = session_with(test_config(), Some(connector));
        assert_eq!(session.say("hi").await, Err(RobotError::NotConnected));
        assert_eq!(session.wake_up().await, Err(RobotError::NotConnected));
    }

    #[tokio::test]
    async fn posture_calls_and_refusal() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;
        session.stand_up().await.unwrap();
        assert_eq!(robot.calls(), vec!["setMaxTryNumber:3", "goToPosture:Stand:0.8"]);

        let robot = MockRobot::new().posture_reached(false);
        let (session, _rx) = connected(&robot).await;
        assert_eq!(
            session.sit_down().await,
            Err(RobotError::PostureNotReached("Sit".into()))
        );
    }

    #[tokio::test]
    async fn action_failures_are_returned() {
        let robot = MockRobot::new().fail_call("say");
        let (session, _rx) = connected(&robot).await;
        assert_eq!(session.say("hi").await, Err(RobotError::remote("say failed")));
        session.stop_say().await.unwrap();
        assert_eq!(robot.calls(), vec!["say:hi", "stopAll"]);
    }

    #[tokio::test]
    async fn panicking_call_becomes_task_failure() {
        let robot = MockRobot::new().panic_on("wakeUp");
        let (session, _rx) = connected(&robot).await;
        match session.wake_up().await {
            Err(RobotError::TaskFailed(message)) => assert!(message.contains("wakeUp")),
            other => panic!("unexpected result: {other:?}"),
        }
        session.rest().await.unwrap();
    }

    #[tokio::test]
    async fn unavailable_service_is_reported() {
        let robot = MockRobot::new().without_service(LEDS);
        let (session, _rx) = connected(&robot).await;
        assert_eq!(
            session.change_eyes_color("red").await,
            Err(RobotError::ServiceUnavailable(LEDS))
        );
    }

    #[tokio::test]
    async fn awareness_sets_modes_then_toggles() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;
        session
            .set_basic_awareness(true, "Unengaged", "Head")
            .await
            .unwrap();
        session
            .set_basic_awareness(false, "FullyEngaged", "BodyRotation")
            .await
            .unwrap();
        assert_eq!(
            robot.calls(),
            vec![
                "setEngagementMode:Unengaged",
                "setTrackingMode:Head",
                "startAwareness",
                "setEngagementMode:FullyEngaged",
                "setTrackingMode:BodyRotation",
                "stopAwareness",
            ]
        );
    }

    #[tokio::test]
    async fn engage_and_disengage_sequences() {
        let robot = MockRobot::new().fail_call("fadeRGB");
        let (session, _rx) = connected(&robot).await;

        assert!(session.engage().await.is_err());
        assert!(session.disengage().await.is_err());
        assert_eq!(
            robot.calls(),
            vec![
                "fadeRGB:FaceLeds:cyan",
                "wakeUp",
                "setBreathEnabled:Body:true",
                "fadeRGB:FaceLeds:white",
                "setBreathEnabled:Body:false",
                "rest",
            ]
        );
    }

    #[tokio::test]
    async fn stop_dance_requires_running_dance() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;

        assert_eq!(
            session.stop_dance("thriller-dance").await,
            Err(RobotError::NotRunning { kind: "dance", id: "thriller-dance".into() })
        );
        assert_eq!(
            session.stop_dance("moonwalk").await,
            Err(RobotError::UnknownDance("moonwalk".into()))
        );
        assert!(robot.calls().is_empty());
    }

    #[tokio::test]
    async fn dance_can_be_stopped_while_running() {
        let robot = MockRobot::new().hold_behaviors();
        let (session, _rx) = connected(&robot).await;

        let dancer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.dance("thriller-dance").await })
        };
        wait_until(|| !robot.running_behaviors().is_empty()).await;
        assert_eq!(session.status().running_dances, vec!["thriller-dance"]);

        session.stop_dance("thriller-dance").await.unwrap();
        dancer.await.unwrap().unwrap();
        assert!(session.status().running_dances.is_empty());
        assert!(matches!(
            session.stop_dance("thriller-dance").await,
            Err(RobotError::NotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn reaction_stops_the_chosen_behavior() {
        let robot = MockRobot::new().hold_behaviors();
        let (session, _rx) = connected(&robot).await;

        let reactor = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.expressive_reaction("Happy").await })
        };
        wait_until(|| !robot.running_behaviors().is_empty()).await;

        session.stop_expressive_reaction("Happy").await.unwrap();
        reactor.await.unwrap().unwrap();
        assert!(robot
            .calls()
            .contains(&"stopBehavior:animations/Stand/Emotions/Positive/Happy_1".to_string()));
    }

    #[tokio::test]
    async fn reaction_errors() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;

        assert_eq!(
            session.expressive_reaction("Sad").await,
            Err(RobotError::NoReactionBehaviors("Sad".into()))
        );
        assert_eq!(
            session.expressive_reaction("Angry").await,
            Err(RobotError::UnknownReactionType("Angry".into()))
        );
        assert!(matches!(
            session.stop_expressive_reaction("Happy").await,
            Err(RobotError::NotRunning { kind: "reaction", .. })
        ));
    }

    #[tokio::test]
    async fn simulated_reaction_without_behaviors_succeeds() {
        let (session, _rx) = session_with(SessionConfig::default(), None);
        session.connect().await.unwrap();
        session.expressive_reaction("Sad").await.unwrap();
    }

    #[tokio::test]
    async fn simulated_stops_succeed_after_catalog_lookup() {
        let (session, _rx) = session_with(SessionConfig::default(), None);
        session.connect().await.unwrap();

        session.dance("eagle-dance").await.unwrap();
        session.stop_dance("eagle-dance").await.unwrap();
        session.stop_body_action("UpLArm").await.unwrap();
        session.stop_expressive_reaction("Happy").await.unwrap();
        session.stop_behavior("custom/behavior").await.unwrap();
        assert_eq!(
            session.stop_dance("moonwalk").await,
            Err(RobotError::UnknownDance("moonwalk".into()))
        );
    }

    #[tokio::test]
    async fn stops_fail_when_disconnected() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;
        session.disconnect().await;
        assert_eq!(session.stop_dance("thriller-dance").await, Err(RobotError::NotConnected));
    }

    #[tokio::test]
    async fn body_action_runs_catalog_behavior() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;

        session.body_action("UpLArm").await.unwrap();
        assert_eq!(robot.calls(), vec!["runBehavior:dialog_move_arms/animations/UpLArm"]);
        assert_eq!(
            session.body_action("UpRArm").await,
            Err(RobotError::UnknownBodyAction("UpRArm".into()))
        );
        assert!(session.stop_body_action("UpLArm").await.is_err());
    }

    #[tokio::test]
    async fn failed_run_releases_tracking() {
        let robot = MockRobot::new().fail_call("runBehavior");
        let (session, _rx) = connected(&robot).await;
        assert!(session.run_behavior("custom/behavior").await.is_err());
        assert!(session.status().running_behaviors.is_empty());
        assert!(session.stop_behavior("custom/behavior").await.is_err());
    }

    #[tokio::test]
    async fn refresh_keeps_catalog_on_failure() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;

        robot.set_listing(Err("package manager busy".into()));
        assert!(session.refresh_catalog().await.is_err());
        assert!(session.catalog().dance("thriller-dance").is_some());

        robot.set_listing(Ok(serde_json::json!([])));
        session.refresh_catalog().await.unwrap();
        assert!(session.catalog().dance("thriller-dance").is_none());
    }

    #[tokio::test]
    async fn disconnect_releases_everything_once() {
        let robot = MockRobot::new();
        let (session, _rx) = connected(&robot).await;

        session.disconnect().await;
        assert!(robot.is_closed());
        assert_eq!(robot.memory_subscription_count(), 0);
        assert!(!session.is_ready());
        assert_eq!(robot.count("close"), 1);

        session.disconnect().await;
        assert_eq!(robot.count("close"), 1);
        assert_eq!(session.say("hi").await, Err(RobotError::NotConnected));
    }
}
