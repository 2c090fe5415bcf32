use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use nao_robot::{RobotSession, SessionConfig};
use nao_server::ServerConfig;
use nao_telemetry::{init_telemetry, TelemetryConfig};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Serve one WebSocket client.
    #[default]
    Websocket,
    /// Serve MCP tools over stdin/stdout.
    Mcp,
}

/// Bridge a NAO robot to a single WebSocket client or an MCP host.
#[derive(Debug, Parser)]
#[command(name = "nao-bridge", version)]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Websocket)]
    mode: Mode,

    /// Run without a robot; every action succeeds.
    #[arg(long)]
    fake_robot: bool,

    /// Robot address, required unless --fake-robot is given.
    #[arg(long, default_value = "")]
    ip: String,

    /// Robot service port.
    #[arg(long, default_value_t = 9559)]
    port: u16,

    /// Port the WebSocket server listens on.
    #[arg(long, default_value_t = 8002)]
    websocket_port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Forward joint angles to the client.
    #[arg(long)]
    with_joints_data: bool,

    /// Forward microphone buffers to the client.
    #[arg(long)]
    with_audio_data: bool,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let websocket = self.mode == Mode::Websocket;
        SessionConfig {
            fake_robot: self.fake_robot,
            address: self.ip.clone(),
            port: self.port,
            forward_touch: websocket,
            forward_joints: websocket && self.with_joints_data,
            forward_audio: websocket && self.with_audio_data,
            ..SessionConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries the MCP protocol, so logs go to stderr there.
    let telemetry = init_telemetry(TelemetryConfig {
        log_level: args.log_level,
        json: args.log_json,
        stderr: args.mode == Mode::Mcp,
        ..TelemetryConfig::default()
    });

    tracing::info!(
        mode = ?args.mode,
        fake_robot = args.fake_robot,
        ip = %args.ip,
        port = args.port,
        "starting nao bridge"
    );

    let session_config = args.session_config();
    if !session_config.fake_robot {
        session_config
            .validate()
            .context("invalid robot configuration")?;
        // No robot transport is linked into this build, so the session runs simulated.
        tracing::warn!("no robot connector available, falling back to simulated robot");
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    if args.mode == Mode::Websocket {
        telemetry.forward_client_logs(event_tx.clone());
    }

    let session = Arc::new(RobotSession::new(session_config, None, event_tx));
    session
        .connect()
        .await
        .context("failed to connect to the robot")?;

    match args.mode {
        Mode::Mcp => {
            drop(event_rx);
            let served = nao_mcp::serve_stdio(Arc::clone(&session))
                .await
                .context("mcp server failed");
            session.disconnect().await;
            served?;
        }
        Mode::Websocket => {
            let server_config = ServerConfig {
                bind: args.bind,
                port: args.websocket_port,
                ..ServerConfig::default()
            };
            let handle = nao_server::start(server_config, Arc::clone(&session), event_rx)
                .await
                .context("failed to start websocket server")?;
            tracing::info!(port = handle.port, "nao bridge ready");

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl+c")?;

            tracing::info!("shutting down");
            handle.shutdown().await;
            session.disconnect().await;
        }
    }
    Ok(())
}
