use std::sync::Arc;
use std::time::Duration;

use nao_core::errors::RobotError;
use nao_core::events::SessionEvent;
use nao_core::services::Motion;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const BODY_CHAIN: &str = "Body";
pub const DEFAULT_JOINTS_PERIOD: Duration = Duration::from_millis(200);

/// Periodically samples joint names and angles and emits them as
/// [`SessionEvent::Joints`].
pub struct JointPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl JointPoller {
    pub fn spawn(
        motion: Arc<dyn Motion>,
        period: Duration,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(motion, period, events, cancel.clone()));
        Self { cancel, handle }
    }

    /// Cancel the poller and wait for the task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "joint poller task ended abnormally");
        }
    }
}

async fn run(
    motion: Arc<dyn Motion>,
    period: Duration,
    events: UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(period_ms = period.as_millis() as u64, "joint poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let motion = Arc::clone(&motion);
        let sample = tokio::task::spawn_blocking(move || -> Result<_, RobotError> {
            let names = motion.body_names(BODY_CHAIN)?;
            let angles = motion.angles(BODY_CHAIN, false)?;
            Ok((names, angles))
        })
        .await;

        match sample {
            Ok(Ok((names, angles))) => {
                if events.send(SessionEvent::Joints { names, angles }).is_err() {
                    debug!("event channel closed, stopping joint poller");
                    break;
                }
            }
            Ok(Err(e)) => warn!(error = %e, "failed to read joint angles"),
            Err(e) => warn!(error = %e, "joint sampling task failed"),
        }
    }
    debug!("joint poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRobot;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emits_joint_samples_until_stopped() {
        let robot = MockRobot::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = JointPoller::spawn(robot.motion_handle(), Duration::from_millis(20), tx);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for joints")
            .expect("channel closed");
        match first {
            SessionEvent::Joints { names, angles } => {
                assert_eq!(names.len(), angles.len());
                assert!(!names.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        poller.stop().await;
        let reads = robot.angle_reads();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(robot.angle_reads(), reads, "poller kept sampling after stop");
    }

    #[tokio::test]
    async fn read_failures_do_not_stop_polling() {
        let robot = MockRobot::new().fail_call("getAngles");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = JointPoller::spawn(robot.motion_handle(), Duration::from_millis(10), tx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(robot.angle_reads() >= 2);
        assert!(rx.try_recv().is_err());
        poller.stop().await;
    }

    #[tokio::test]
    async fn stops_when_channel_closes() {
        let robot = MockRobot::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let poller = JointPoller::spawn(robot.motion_handle(), Duration::from_millis(10), tx);
        tokio::time::timeout(Duration::from_secs(2), poller.stop())
            .await
            .expect("poller did not stop");
    }
}
