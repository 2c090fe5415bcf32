//! Owns the single client slot and the hand-off between clients.
//!
//! Slot transitions (activate, release, shutdown) are serialized by an async
//! mutex so the engage/disengage sequences of two clients never interleave.
//! The slot itself sits behind a `parking_lot` lock that is never held across
//! an await.

use std::sync::Arc;
use std::time::Duration;

use nao_core::ids::ClientId;
use nao_robot::RobotSession;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::client::ActiveClient;
use crate::protocol::Outbound;

pub struct Dispatcher {
    session: Arc<RobotSession>,
    slot: RwLock<Option<Arc<ActiveClient>>>,
    transitions: Mutex<()>,
    max_send_queue: usize,
    drain_timeout: Duration,
}

impl Dispatcher {
    pub fn new(session: Arc<RobotSession>, max_send_queue: usize, drain_timeout: Duration) -> Self {
        Self {
            session,
            slot: RwLock::new(None),
            transitions: Mutex::new(()),
            max_send_queue,
            drain_timeout,
        }
    }

    pub fn session(&self) -> &Arc<RobotSession> {
        &self.session
    }

    /// Make a new connection the active client, preempting the current one.
    ///
    /// The previous client is drained, the robot disengaged and the old
    /// socket's teardown awaited (bounded by the drain timeout) before the
    /// new client is installed, engaged and sent its `NaoState`.
    pub async fn activate(&self) -> (Arc<ActiveClient>, mpsc::Receiver<String>) {
        let _transition = self.transitions.lock().await;

        let previous = self.slot.write().take();
        if let Some(previous) = previous {
            info!(client_id = %previous.id, "received connection from another client, disconnecting previous one");
            self.drain(&previous).await;
        }

        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let client = Arc::new(ActiveClient::new(ClientId::new(), tx));
        *self.slot.write() = Some(Arc::clone(&client));
        info!(client_id = %client.id, "client connected");

        if self.session.is_ready() {
            info!("init robot state after connection");
            if let Err(e) = self.session.engage().await {
                warn!(error = %e, "engage sequence incomplete");
            }
        }

        let state = Outbound::NaoState {
            connected: self.session.is_ready(),
            fake_robot: self.session.is_simulated(),
        };
        if let Some(json) = state.to_json() {
            client.send(json);
        }
        (client, rx)
    }

    /// The client's own connection ended. No-op if it is no longer active.
    pub async fn release(&self, id: &ClientId) {
        let _transition = self.transitions.lock().await;

        let client = {
            let mut slot = self.slot.write();
            match slot.as_ref() {
                Some(current) if &current.id == id => slot.take(),
                _ => None,
            }
        };
        let Some(client) = client else {
            debug!(client_id = %id, "release ignored for inactive client");
            return;
        };

        client.begin_draining();
        self.disengage_robot().await;
        info!(client_id = %id, "client disconnected");
    }

    /// Drain the active client, if any, and leave the slot idle.
    pub async fn shutdown(&self) {
        let _transition = self.transitions.lock().await;
        let client = self.slot.write().take();
        if let Some(client) = client {
            info!(client_id = %client.id, "closing active client before shutdown");
            self.drain(&client).await;
        }
    }

    async fn drain(&self, client: &ActiveClient) {
        client.begin_draining();
        self.disengage_robot().await;
        client.preempt();
        if tokio::time::timeout(self.drain_timeout, client.closed())
            .await
            .is_err()
        {
            warn!(client_id = %client.id, timeout_ms = self.drain_timeout.as_millis() as u64, "client did not close in time");
        }
    }

    async fn disengage_robot(&self) {
        if self.session.is_ready() {
            info!("reset robot state after disconnection");
            if let Err(e) = self.session.disengage().await {
                warn!(error = %e, "disengage sequence incomplete");
            }
        }
    }

    pub fn active_client(&self) -> Option<Arc<ActiveClient>> {
        self.slot.read().clone()
    }

    /// Whether `id` is the active, non-draining client.
    pub fn is_active(&self, id: &ClientId) -> bool {
        self.slot
            .read()
            .as_ref()
            .is_some_and(|c| &c.id == id && !c.is_draining())
    }

    /// Send to `id` only if it is still the active client.
    pub fn send_to(&self, id: &ClientId, message: String) -> bool {
        let client = self.slot.read().clone();
        match client {
            Some(client) if &client.id == id => client.send(message),
            _ => false,
        }
    }

    /// Send to whichever client is active. Dropped when there is none.
    pub fn send_event(&self, message: String) -> bool {
        let client = self.slot.read().clone();
        client.is_some_and(|c| c.send(message))
    }
}
