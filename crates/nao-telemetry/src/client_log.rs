use std::fmt::Write as _;
use std::sync::Arc;

use nao_core::events::{LogLevel, SessionEvent};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Shared slot for the channel log lines are mirrored into.
/// Empty until the server is up; lines logged before that are not mirrored.
#[derive(Clone, Default)]
pub struct LogForwarder {
    tx: Arc<RwLock<Option<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl LogForwarder {
    pub fn attach(&self, tx: mpsc::UnboundedSender<SessionEvent>) {
        *self.tx.write() = Some(tx);
    }

    pub fn is_attached(&self) -> bool {
        self.tx.read().is_some()
    }

    /// Returns false when nothing is attached or the receiver is gone.
    pub fn forward(&self, message: String, level: LogLevel) -> bool {
        match self.tx.read().as_ref() {
            Some(tx) => tx.send(SessionEvent::Log { message, level }).is_ok(),
            None => false,
        }
    }
}

/// tracing Layer that mirrors selected events to the connected client.
pub struct ClientLogLayer {
    forwarder: LogForwarder,
    min_level: Level,
    targets: Vec<String>,
    excluded: Vec<String>,
}

impl ClientLogLayer {
    pub fn new(forwarder: LogForwarder, min_level: Level, targets: Vec<String>) -> Self {
        Self {
            forwarder,
            min_level,
            targets,
            excluded: Vec::new(),
        }
    }

    /// Never mirror events from these target prefixes. Events about the
    /// client's own send path must be excluded, or a full queue feeds itself.
    pub fn excluding(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded;
        self
    }

    fn wants(&self, level: &Level, target: &str) -> bool {
        // More verbose levels compare greater.
        *level <= self.min_level
            && self.targets.iter().any(|t| target.starts_with(t.as_str()))
            && !self.excluded.iter().any(|t| target.starts_with(t.as_str()))
    }
}

fn client_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warning,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

/// Visitor that flattens an event into a single line.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn into_line(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), &format_args!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), &value);
        }
    }
}

impl<S: Subscriber> Layer<S> for ClientLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.wants(metadata.level(), metadata.target()) || !self.forwarder.is_attached() {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.forwarder
            .forward(visitor.into_line(), client_level(metadata.level()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn layer_with_channel() -> (ClientLogLayer, mpsc::UnboundedReceiver<SessionEvent>) {
        let forwarder = LogForwarder::default();
        let (tx, rx) = mpsc::unbounded_channel();
        forwarder.attach(tx);
        let layer = ClientLogLayer::new(forwarder, Level::INFO, vec!["nao_server".into()]);
        (layer, rx)
    }

    #[test]
    fn mirrors_matching_target() {
        let (layer, mut rx) = layer_with_channel();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "nao_server::dispatcher", command = "Say", "applying command");
        });

        match rx.try_recv().unwrap() {
            SessionEvent::Log { message, level } => {
                assert_eq!(level, LogLevel::Info);
                assert_eq!(message, "applying command command=Say");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ignores_other_targets_and_verbose_levels() {
        let (layer, mut rx) = layer_with_channel();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "nao_robot::session", "robot side");
            tracing::debug!(target: "nao_server::dispatcher", "too verbose");
        });

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn maps_warn_to_warning() {
        let (layer, mut rx) = layer_with_channel();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "nao_server", "careful");
            tracing::error!(target: "nao_server", "broken");
        });

        let levels: Vec<LogLevel> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                SessionEvent::Log { level, .. } => level,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(levels, vec![LogLevel::Warning, LogLevel::Error]);
    }

    #[test]
    fn excluded_targets_are_never_mirrored() {
        let forwarder = LogForwarder::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        forwarder.attach(tx);
        let layer = ClientLogLayer::new(forwarder, Level::INFO, vec!["nao_server".into()])
            .excluding(vec!["nao_server::client".into()]);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "nao_server::client", "send queue full, dropping message");
            tracing::warn!(target: "nao_server::dispatcher", "client did not close in time");
        });

        match rx.try_recv().unwrap() {
            SessionEvent::Log { message, .. } => {
                assert_eq!(message, "client did not close in time");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unattached_forwarder_drops_lines() {
        let forwarder = LogForwarder::default();
        assert!(!forwarder.forward("nobody listening".into(), LogLevel::Info));

        let (tx, mut rx) = mpsc::unbounded_channel();
        forwarder.attach(tx);
        assert!(forwarder.forward("hello".into(), LogLevel::Info));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Log { message: "hello".into(), level: LogLevel::Info }
        );
        drop(rx);
        assert!(!forwarder.forward("gone".into(), LogLevel::Info));
    }
}
