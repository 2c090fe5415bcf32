mod client_log;

pub use client_log::{ClientLogLayer, LogForwarder};

use nao_core::events::SessionEvent;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "nao_robot" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Least severe level mirrored to the connected client.
    pub client_log_level: Level,
    /// Target prefixes whose events are mirrored to the connected client.
    pub client_log_targets: Vec<String>,
    /// Target prefixes never mirrored, even when they match a target above.
    pub client_log_excluded: Vec<String>,
    /// Write log lines to stderr. Required when stdout carries a protocol.
    pub stderr: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            client_log_level: Level::INFO,
            client_log_targets: vec!["nao_server".into(), "nao_bridge".into()],
            client_log_excluded: vec!["nao_server::client".into()],
            stderr: false,
        }
    }
}

impl TelemetryConfig {
    /// The layer that mirrors log lines to the connected client.
    pub fn client_layer(&self, forwarder: LogForwarder) -> ClientLogLayer {
        ClientLogLayer::new(forwarder, self.client_log_level, self.client_log_targets.clone())
            .excluding(self.client_log_excluded.clone())
    }
}

/// Handle on the installed subscriber.
pub struct TelemetryGuard {
    forwarder: LogForwarder,
}

impl TelemetryGuard {
    /// Start mirroring log lines into the session event channel.
    pub fn forward_client_logs(&self, tx: mpsc::UnboundedSender<SessionEvent>) {
        self.forwarder.attach(tx);
    }
}

/// Build the filter directive string from config.
fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter_str
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config)));

    let writer = || {
        if config.stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::stdout)
        }
    };
    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer())
    });
    let plain_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(writer())
    });

    let forwarder = LogForwarder::default();
    let client_layer = config.client_layer(forwarder.clone());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .with(client_layer)
        .init();

    TelemetryGuard { forwarder }
}
