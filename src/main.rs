use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use webbridge_bridge::Bridge;
use webbridge_settings::{load_settings, load_settings_from_path};
use webbridge_telemetry::{init_telemetry, TelemetryConfig};

mod host;

use host::{Host, LineSink, ModuleKind};

/// Stdio transport for the bridge: inbound envelopes arrive as JSON lines on
/// stdin, outbound scripts leave as lines on stdout. Logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "webbridge", version)]
struct Cli {
    /// Settings file (defaults to ~/.webbridge/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Modules to register. Repeat for more than one.
    #[arg(long = "module", value_enum, default_values_t = [ModuleKind::Todo])]
    modules: Vec<ModuleKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("loading settings")?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if cli.json_logs {
        settings.logging.json = true;
    }

    let _telemetry = init_telemetry(&TelemetryConfig::from_names(
        &settings.logging.level,
        &settings.logging.modules,
        settings.logging.json,
    ));

    let bridge = Bridge::from_settings(&settings).context("building bridge")?;
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    bridge.attach_sink(Arc::new(LineSink::new(tx)));

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(script) = rx.recv().await {
            stdout.write_all(script.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let host = Host::new(bridge, &cli.modules)?;
    tracing::info!(
        handler = host.bridge().message_handler_name(),
        "reading envelopes from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    host.handle_line(&line);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    let stats = host.bridge().stats_snapshot();
    tracing::info!(
        delivered = stats.delivered,
        dropped = stats.dropped(),
        sent = stats.sent,
        send_failures = stats.send_failures,
        "shutting down"
    );

    // Closing the sink ends the writer once it has flushed what is queued.
    host.bridge().detach_sink();
    drop(host);
    writer.await.context("stdout writer panicked")??;
    Ok(())
}
