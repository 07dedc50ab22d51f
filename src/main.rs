// SPDX-License-Identifier: AGPL-3.0-or-later

mod bgp;
mod config;
mod error;
mod policy;
mod rib;
mod version;
mod xmpp;

use std::io;
use std::sync::Arc;

use bgp::Bgp;
use clap::Parser;
use config::{ConfigIngest, ConfigKind};
use daemonize::Daemonize;
use policy::Policy;
use rib::Rib;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub enum LoggingOutput {
    Stdout,
    Syslog,
    File(String),
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Arg {
    #[arg(short, long, help = "Run as daemon in background")]
    daemon: bool,

    #[arg(short, long, help = "Log to this file instead of stdout/syslog")]
    log_file: Option<String>,
}

fn tracing_set(arg: &Arg) {
    if let Some(path) = &arg.log_file {
        setup_tracing(LoggingOutput::File(path.clone())).unwrap_or_else(|e| {
            eprintln!("failed to set up file logging: {e}, discarding logs");
            tracing_subscriber::fmt()
                .with_max_level(Level::INFO)
                .with_writer(std::io::sink)
                .init();
        });
    } else if arg.daemon {
        setup_tracing(LoggingOutput::Syslog).unwrap_or_else(|e| {
            eprintln!("failed to set up syslog logging: {e}, falling back to file");
            setup_tracing(LoggingOutput::File("control-node.log".to_string())).unwrap_or_else(
                |e| {
                    eprintln!("failed to set up file logging: {e}, discarding logs");
                    tracing_subscriber::fmt()
                        .with_max_level(Level::INFO)
                        .with_writer(std::io::sink)
                        .init();
                },
            );
        });
    } else {
        setup_tracing(LoggingOutput::Stdout).unwrap_or_else(|e| {
            eprintln!("failed to set up stdout logging: {e}");
            tracing_subscriber::fmt().with_max_level(Level::INFO).init();
        });
    }
}

pub fn setup_tracing(output: LoggingOutput) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match output {
        LoggingOutput::Stdout => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
        LoggingOutput::Syslog => {
            #[cfg(unix)]
            {
                use std::sync::Mutex;
                use syslog::{Facility, Formatter3164};

                struct SyslogWriter {
                    logger: Mutex<syslog::Logger<syslog::LoggerBackend, Formatter3164>>,
                }

                impl SyslogWriter {
                    fn new() -> anyhow::Result<Self> {
                        let formatter = Formatter3164 {
                            facility: Facility::LOG_DAEMON,
                            hostname: None,
                            process: "control-node".to_string(),
                            pid: std::process::id(),
                        };
                        let logger = syslog::unix(formatter)
                            .map_err(|e| anyhow::anyhow!("failed to connect to syslog: {e}"))?;
                        Ok(SyslogWriter {
                            logger: Mutex::new(logger),
                        })
                    }
                }

                impl io::Write for SyslogWriter {
                    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                        if let Ok(mut logger) = self.logger.lock() {
                            let msg_cow = String::from_utf8_lossy(buf);
                            let _ = logger.info(msg_cow.trim());
                        }
                        Ok(buf.len())
                    }

                    fn flush(&mut self) -> io::Result<()> {
                        Ok(())
                    }
                }

                let syslog_writer = SyslogWriter::new()?;
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(syslog_writer))
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false);

                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            #[cfg(not(unix))]
            {
                return Err(anyhow::anyhow!("syslog is only supported on unix systems"));
            }
        }
        LoggingOutput::File(path) => {
            let log_path = std::path::Path::new(&path);
            let log_dir = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(log_dir)
                .map_err(|e| anyhow::anyhow!("failed to create log directory {}: {e}", log_dir.display()))?;
            let log_filename = log_path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log filename: {path}"))?;

            let writer = rolling::never(log_dir, log_filename);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false);

            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
    Ok(())
}

fn daemonize() -> anyhow::Result<()> {
    let daemonize = Daemonize::new()
        .pid_file("/var/run/control-node.pid")
        .chown_pid_file(true)
        .working_directory("/")
        .umask(0o027);

    daemonize
        .start()
        .map_err(|e| anyhow::anyhow!("failed to daemonize: {e}"))
}

/// Wires the three route-processing tasks (policy, rib, bgp) together and
/// registers each with the config kinds it owns. The config source itself
/// -- whatever feeds `ConfigRequest`s into `ingest.dispatch` -- lives
/// outside this core; nothing here opens a listener or reads a file.
fn start(policy: &Policy, rib: &Rib, bgp: &Bgp) -> ConfigIngest {
    ConfigIngest::new()
        .register(ConfigKind::RoutingPolicy, policy.cm.tx.clone())
        .register(ConfigKind::RoutingInstance, rib.cm.tx.clone())
        .register(ConfigKind::RouteAggregate, rib.cm.tx.clone())
        .register(ConfigKind::StaticRouteEntries, rib.cm.tx.clone())
        .register(ConfigKind::VirtualNetwork, rib.cm.tx.clone())
        .register(ConfigKind::BgpRouter, bgp.cm.tx.clone())
        .register(ConfigKind::BgpPeering, bgp.cm.tx.clone())
        .register(ConfigKind::GlobalSystemConfig, bgp.cm.tx.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let arg = Arg::parse();

    if arg.daemon {
        daemonize()?;
    }
    tracing_set(&arg);

    let policy = Policy::new();
    let rib = Rib::new(Arc::clone(&policy.config))?;
    let bgp = Bgp::attached_to(&rib.api);

    let _ingest = start(&policy, &rib, &bgp);

    policy::serve(policy);
    bgp::serve(bgp);
    rib::serve(rib);

    tracing::info!("control-node route-processing core started");

    // The config source (external to this core) drives `_ingest.dispatch`
    // as deltas arrive; nothing produces them here, so the process just
    // waits for a shutdown signal while the spawned tasks run.
    tokio::signal::ctrl_c().await?;
    tracing::info!("control-node shutting down");

    Ok(())
}
