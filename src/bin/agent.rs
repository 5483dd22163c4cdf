// fleetwatch-agent: sample the host, tail logs, push to the server, obey commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleetwatch::agent::config::{AgentConfig, CONFIG_FILE};
use fleetwatch::agent::docker::DockerRepo;
use fleetwatch::agent::process::RawProcessCell;
use fleetwatch::agent::runtime::{
    FastLoopDeps, LOG_CHANNEL_CAPACITY, spawn_connection_loop, spawn_fast_loop,
    spawn_log_forwarder, spawn_slow_loop,
};
use fleetwatch::agent::sampler::SystemSampler;
use fleetwatch::agent::sender::Sender;
use fleetwatch::agent::supervisor::StreamSupervisor;
use fleetwatch::agent::{commands, discovery, log_tailer, process, sender};
use fleetwatch::models::LogLine;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser, Debug)]
#[command(name = "fleetwatch-agent", version, about = "Fleetwatch host agent")]
struct Args {
    /// Enroll against the server (SERVER_URL, FLEETWATCH_API_KEY and
    /// optionally FLEETWATCH_MFA_CODE from the environment) and save the
    /// config.
    #[arg(long)]
    setup: bool,

    /// Override the host id reported to the server.
    #[arg(long)]
    host: Option<String>,

    /// Config file path.
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
}

fn os_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

async fn run_setup(config_path: &Path, host_override: Option<String>) -> anyhow::Result<()> {
    let server_url =
        std::env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let api_key = std::env::var("FLEETWATCH_API_KEY")
        .context("FLEETWATCH_API_KEY is required for enrollment")?;
    let hostname = host_override.unwrap_or_else(os_hostname);
    let mfa_code = std::env::var("FLEETWATCH_MFA_CODE").ok();

    let registration =
        sender::register(&server_url, &api_key, &hostname, mfa_code.as_deref()).await?;

    let mut cfg = AgentConfig {
        server_url,
        agent_id: registration.agent_id,
        agent_secret: registration.secret,
        ..Default::default()
    };
    cfg.apply_collector_defaults();
    cfg.save(config_path)?;
    info!("agent enrolled; configuration saved to {}", config_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let args = Args::parse();

    if args.setup {
        // non-zero exit on registration failure
        return run_setup(&args.config, args.host).await;
    }

    let mut cfg = match AgentConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(_) => {
            let server_url =
                std::env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
            info!("no config found; using {} (run --setup for enrollment)", server_url);
            AgentConfig {
                server_url,
                ..Default::default()
            }
        }
    };
    if let Some(host) = args.host {
        cfg.agent_id = host;
    } else if cfg.agent_id.is_empty() {
        cfg.agent_id = os_hostname();
    }
    cfg.apply_collector_defaults();
    info!("fleetwatch agent starting as {}", cfg.agent_id);

    let sender = Arc::new(Sender::new(
        &cfg.server_url,
        &cfg.agent_secret,
        &cfg.agent_id,
    )?);

    let (log_tx, log_rx) = mpsc::channel::<LogLine>(LOG_CHANNEL_CAPACITY);
    let mut handles: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    handles.push(spawn_log_forwarder(sender.clone(), log_rx));

    // file tailers
    let logs = discovery::discover_logs(&cfg.log_config);
    info!("targeting {} log sources", logs.len());
    for log in logs {
        info!("  [{}] {}", log.service, log.path.display());
        handles.push(tokio::spawn(log_tailer::tail_file(
            log.path,
            log.service,
            log_tx.clone(),
            None,
        )));
    }

    // docker: container metrics on the fast tick, log streams supervised
    let docker = if cfg.collectors.docker {
        match DockerRepo::connect() {
            Ok(repo) => {
                info!("docker collector initialized");
                Some(Arc::new(repo))
            }
            Err(e) => {
                warn!("docker collector unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };
    if let Some(repo) = &docker {
        let supervisor = StreamSupervisor::new(repo.clone(), log_tx.clone());
        handles.push(tokio::spawn(supervisor.run()));
    }

    // async raw `top` lane
    let raw_cell = RawProcessCell::default();
    handles.push(tokio::spawn(process::run_raw_collector(raw_cell.clone())));

    // slow telemetry + firewall sync, connections, command polling
    handles.push(spawn_slow_loop(sender.clone()));
    handles.push(spawn_connection_loop(sender.clone()));
    handles.push(tokio::spawn(commands::run_poller(sender.clone())));

    // service probes: plug-in seam only; no probes are registered here
    handles.push(tokio::spawn(fleetwatch::agent::probes::run_probe_loop(
        sender.clone(),
        Vec::new(),
    )));

    // fast metrics loop owns the sampler
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let fast = spawn_fast_loop(FastLoopDeps {
        sampler: cfg
            .collectors
            .system
            .then(|| SystemSampler::new(cfg.agent_id.clone())),
        docker,
        sender,
        raw_cell,
        shutdown_rx,
        host: cfg.agent_id.clone(),
    });

    // root scope: a signal cancels every child
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received");
    let _ = shutdown_tx.send(());
    let _ = fast.await;
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
