use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use nao_core::ids::ClientId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);
/// How long a preempted connection may take to flush its close frame.
pub const PREEMPT_GRACE: Duration = Duration::from_secs(1);

/// The one connected WebSocket client.
pub struct ActiveClient {
    pub id: ClientId,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<String>,
    draining: AtomicBool,
    last_pong: AtomicU64,
    preempt: CancellationToken,
    closed: CancellationToken,
}

impl ActiveClient {
    pub fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            tx,
            draining: AtomicBool::new(false),
            last_pong: AtomicU64::new(now_secs()),
            preempt: CancellationToken::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a message for the writer. Dropped once the client is draining,
    /// or when its queue is full or closed.
    pub fn send(&self, message: String) -> bool {
        if self.is_draining() {
            return false;
        }
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %self.id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stop all further outbound traffic to this client.
    pub fn begin_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Ask the connection to send a close frame and shut down.
    pub fn preempt(&self) {
        self.preempt.cancel();
    }

    pub fn is_preempted(&self) -> bool {
        self.preempt.is_cancelled()
    }

    /// Called once the socket has been torn down.
    pub fn mark_closed(&self) {
        self.closed.cancel();
    }

    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Drive a WebSocket connection: split into reader/writer, heartbeat, and
/// a close frame when the client is preempted. Returns once either side ends.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client: Arc<ActiveClient>,
    rx: mpsc::Receiver<String>,
    on_message: mpsc::Sender<(ClientId, String)>,
) {
    let (ws_tx, ws_rx) = socket.split();
    drive_connection(ws_tx, ws_rx, client, rx, on_message).await;
}

/// Reader and writer tasks over any frame sink/stream pair. A preempted
/// connection is torn down after [`PREEMPT_GRACE`] even if the writer is
/// stuck sending to a peer that stopped reading.
async fn drive_connection<W, R, E>(
    mut ws_tx: W,
    mut ws_rx: R,
    client: Arc<ActiveClient>,
    mut rx: mpsc::Receiver<String>,
    on_message: mpsc::Sender<(ClientId, String)>,
) where
    W: Sink<WsMessage> + Unpin + Send + 'static,
    W::Error: Send,
    R: Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    // Writer task: forward queued messages + periodic ping + close on preempt
    let writer_client = Arc::clone(&client);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                biased;
                _ = writer_client.preempt.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    tracing::debug!(client_id = %writer_client.id, "sent close to preempted client");
                    break;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_client.is_alive() {
                        tracing::warn!(client_id = %writer_client.id, "client stopped answering pings, closing");
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_client.id, "sent ping");
                }
            }
        }
    });

    // Reader task: forward text frames to the processor, track pongs
    let reader_client = Arc::clone(&client);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message
                        .send((reader_client.id.clone(), text.to_string()))
                        .await;
                }
                WsMessage::Pong(_) => reader_client.record_pong(),
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pings
                _ => {}
            }
        }
    });

    let preempt_expired = async {
        client.preempt.cancelled().await;
        tokio::time::sleep(PREEMPT_GRACE).await;
    };

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
        _ = preempt_expired => {
            tracing::warn!(client_id = %client.id, "preempted client did not close, dropping connection");
            writer.abort();
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};

    use futures::stream;

    fn client(queue: usize) -> (ActiveClient, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(queue);
        (ActiveClient::new(ClientId::new(), tx), rx)
    }

    #[test]
    fn send_queues_message() {
        let (client, mut rx) = client(4);
        assert!(client.send("hello".into()));
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn draining_client_gets_nothing() {
        let (client, mut rx) = client(4);
        client.begin_draining();
        assert!(!client.send("late".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops() {
        let (client, _rx) = client(1);
        assert!(client.send("a".into()));
        assert!(!client.send("b".into()));
    }

    #[test]
    fn closed_queue_drops() {
        let (client, rx) = client(1);
        drop(rx);
        assert!(!client.send("a".into()));
    }

    #[test]
    fn pong_tracking() {
        let (client, _rx) = client(1);
        assert!(client.is_alive());
        client.last_pong.store(0, Ordering::Relaxed);
        assert!(!client.is_alive());
        client.record_pong();
        assert!(client.is_alive());
    }

    #[tokio::test]
    async fn closed_resolves_after_mark() {
        let (client, _rx) = client(1);
        let client = Arc::new(client);
        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.closed().await })
        };
        assert!(!client.is_preempted());
        client.preempt();
        assert!(client.is_preempted());
        client.mark_closed();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    /// A peer that never accepts another frame.
    struct StalledSink;

    impl Sink<WsMessage> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: WsMessage) -> Result<(), Infallible> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn preempted_connection_with_stalled_writer_is_torn_down() {
        let (client, rx) = client(4);
        let client = Arc::new(client);
        assert!(client.send("stuck behind a slow peer".into()));
        let (on_message, _inbound) = mpsc::channel(4);

        let connection = tokio::spawn(drive_connection(
            StalledSink,
            stream::pending::<Result<WsMessage, Infallible>>(),
            Arc::clone(&client),
            rx,
            on_message,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!connection.is_finished());

        client.preempt();
        tokio::time::timeout(PREEMPT_GRACE + Duration::from_secs(2), connection)
            .await
            .unwrap()
            .unwrap();
    }
}
