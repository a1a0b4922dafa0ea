//! pfcpiface entry point.
//!
//! Loads the configuration, connects the forwarding-plane channel lazily and
//! serves PFCP on UDP 8805 until interrupted.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use upf_fwdplane::{ForwardingPlaneChannel, SimulatedSwitch};
use upf_pfcp::PFCP_UDP_PORT;
use upf_pfcpiface::{Conf, ConfigOverrides, PfcpEngine, PfcpServer};

/// UPF PFCP agent
#[derive(Parser, Debug)]
#[command(name = "pfcpiface")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = "upf.json")]
    config: PathBuf,

    /// Forwarding-plane control server host
    #[arg(long)]
    p4rtc_server: Option<String>,

    /// Forwarding-plane control server port
    #[arg(long)]
    p4rtc_port: Option<String>,

    /// Local N4 address (0.0.0.0 to learn it from the first peer)
    #[arg(long)]
    n4_addr: Option<String>,

    /// SMF / SPGW-C address to initiate the association with
    #[arg(long)]
    peer_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG when unset
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Program an in-process simulated switch
    #[arg(long)]
    simulate: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            p4rtc_server: self.p4rtc_server.clone(),
            p4rtc_port: self.p4rtc_port.clone(),
            n4_addr: self.n4_addr.clone(),
            peer_addr: self.peer_addr.clone(),
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Received interrupt");
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut conf = Conf::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    conf.apply_overrides(&args.overrides());
    let settings = conf.resolve().context("validating configuration")?;

    if !args.simulate {
        bail!(
            "no forwarding-plane client for {}; run with --simulate",
            settings.switch.address
        );
    }
    let switch = SimulatedSwitch::new().with_access_address(settings.access.address);

    info!(
        switch = %settings.switch.address,
        device_id = settings.switch.device_id,
        access = %settings.access.address,
        prefix_len = settings.access.prefix_len,
        max_sessions = settings.max_sessions,
        "Starting pfcpiface"
    );

    let channel = Arc::new(ForwardingPlaneChannel::new(
        Arc::new(switch),
        settings.switch.clone(),
        settings.access.address,
    ));
    let engine = PfcpEngine::new(channel, settings.max_sessions, settings.n4_addr);

    let bind = SocketAddr::new(
        settings.n4_addr.unwrap_or(Ipv4Addr::UNSPECIFIED).into(),
        PFCP_UDP_PORT,
    );
    let mut server = PfcpServer::bind(bind, engine)
        .await
        .with_context(|| format!("binding {}", bind))?;
    if let Some(peer) = settings.peer_addr {
        server = server.with_peer(SocketAddr::new(peer.into(), PFCP_UDP_PORT));
    }

    let engine = server.run(shutdown_signal()).await?;
    info!(sessions = engine.registry().len(), "pfcpiface stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("pfcpiface exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
