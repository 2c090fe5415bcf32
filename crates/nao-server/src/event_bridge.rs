use std::sync::Arc;

use nao_core::events::SessionEvent;
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::protocol::Outbound;

/// Consumes session events and forwards them to the active client.
pub struct EventBridge {
    dispatcher: Arc<Dispatcher>,
}

impl EventBridge {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Start the bridge. Spawns a task that drains the event channel until
    /// every producer has gone away. Events with no active client are dropped.
    pub fn start(&self, mut rx: mpsc::UnboundedReceiver<SessionEvent>) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let SessionEvent::Touch { part, touched } = &event {
                    tracing::info!(part = %part, touched, "touch detected");
                }
                if let Some(json) = Outbound::from_event(event).to_json() {
                    dispatcher.send_event(json);
                }
            }
            tracing::info!("event bridge channel closed");
        })
    }
}

/// Create an event bridge wired to the session's event channel.
pub fn create_bridge(
    dispatcher: Arc<Dispatcher>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
) -> tokio::task::JoinHandle<()> {
    let bridge = EventBridge::new(dispatcher);
    bridge.start(rx)
}
